use serde::{Deserialize, Serialize};

use crate::error::{PsolaError, Result};
use crate::util::{resize_linear, round_half_up};

pub const MIN_PSCALE: f64 = 0.1;
pub const MAX_PSCALE: f64 = 5.0;
pub const MIN_TSCALE: f64 = 0.1;
pub const MAX_TSCALE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameScales {
    pub pscale: f64,
    pub tscale: f64,
    pub escale: f64,
    pub vscale: f64,
}

impl Default for FrameScales {
    fn default() -> Self {
        Self {
            pscale: 1.0,
            tscale: 1.0,
            escale: 1.0,
            vscale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleGrid {
    pub window_size: f64,
    pub skip_size: f64,
}

impl Default for ScaleGrid {
    fn default() -> Self {
        Self {
            window_size: 0.02,
            skip_size: 0.01,
        }
    }
}

impl ScaleGrid {
    pub fn num_frames(&self, total_len: usize, sample_rate: u32) -> usize {
        let duration = total_len as f64 / sample_rate as f64;
        let n = round_half_up((duration - 0.5 * self.window_size) / self.skip_size) + 2;
        n.max(1) as usize
    }

    pub fn index_at(&self, time: f64, num_frames: usize) -> usize {
        let ind = round_half_up((time - 0.5 * self.window_size) / self.skip_size);
        ind.clamp(0, num_frames.saturating_sub(1) as i64) as usize
    }
}

/// Requested pitch, time, energy and vocal tract scales. Each vector holds one
/// value for the whole signal or one value per grid frame; an empty vector
/// means no change.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRequest {
    pub pscales: Vec<f64>,
    pub tscales: Vec<f64>,
    pub escales: Vec<f64>,
    pub vscales: Vec<f64>,
    pub grid: ScaleGrid,
}

impl Default for ScaleRequest {
    fn default() -> Self {
        Self::uniform(1.0, 1.0, 1.0, 1.0)
    }
}

impl ScaleRequest {
    pub fn uniform(pscale: f64, tscale: f64, escale: f64, vscale: f64) -> Self {
        Self {
            pscales: vec![pscale],
            tscales: vec![tscale],
            escales: vec![escale],
            vscales: vec![vscale],
            grid: ScaleGrid::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check("pscale", &self.pscales, MIN_PSCALE, MAX_PSCALE)?;
        check("tscale", &self.tscales, MIN_TSCALE, MAX_TSCALE)?;
        check("escale", &self.escales, f64::MIN_POSITIVE, f64::MAX)?;
        check("vscale", &self.vscales, f64::MIN_POSITIVE, f64::MAX)?;
        Ok(())
    }

    /// The time scale when one value applies to the whole signal, including a
    /// vector holding the same value everywhere.
    pub fn uniform_tscale(&self) -> Option<f64> {
        match self.tscales.split_first() {
            None => Some(1.0),
            Some((&first, rest)) if rest.iter().all(|&v| v == first) => Some(first),
            Some(_) => None,
        }
    }

    pub fn per_frame(
        &self,
        center_times: &[f64],
        total_len: usize,
        sample_rate: u32,
    ) -> Result<Vec<FrameScales>> {
        self.validate()?;
        let n = self.grid.num_frames(total_len, sample_rate);
        let p = fit(&self.pscales, n);
        let t = fit(&self.tscales, n);
        let e = fit(&self.escales, n);
        let v = fit(&self.vscales, n);

        Ok(center_times
            .iter()
            .map(|&time| {
                let i = self.grid.index_at(time, n);
                FrameScales {
                    pscale: p[i],
                    tscale: t[i],
                    escale: e[i],
                    vscale: v[i],
                }
            })
            .collect())
    }
}

fn check(kind: &'static str, values: &[f64], min: f64, max: f64) -> Result<()> {
    for (index, &value) in values.iter().enumerate() {
        if !value.is_finite() || value < min || value > max {
            return Err(PsolaError::InvalidScale { kind, index, value });
        }
    }
    Ok(())
}

fn fit(values: &[f64], n: usize) -> Vec<f64> {
    if values.is_empty() {
        return vec![1.0; n];
    }
    resize_linear(values, n)
}
