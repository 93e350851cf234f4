use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{PsolaError, Result};
use crate::util::{is_voiced, round_half_up};

pub const VOICING_F0_FLOOR: f64 = 10.0;

/// Fixed-rate F0 track: one value per analysis window, 0 for unvoiced.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PitchContour {
    pub window_size: f64,
    pub skip_size: f64,
    pub f0s: Vec<f64>,
}

impl PitchContour {
    pub fn new(window_size: f64, skip_size: f64, f0s: Vec<f64>) -> Result<Self> {
        if !(window_size > 0.0) || !(skip_size > 0.0) {
            return Err(PsolaError::InvalidContour(format!(
                "window {} and skip {} must be positive",
                window_size, skip_size
            )));
        }
        if let Some(bad) = f0s.iter().find(|f| !f.is_finite() || **f < 0.0) {
            return Err(PsolaError::InvalidContour(format!("bad F0 value {}", bad)));
        }
        Ok(Self {
            window_size,
            skip_size,
            f0s,
        })
    }

    /// Text form: `<window_s> <skip_s>` on the first line, then one F0 per line.
    /// Blank lines and `#` comments are ignored.
    pub fn parse_text(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(|l| l.split('#').next().unwrap_or("").trim())
            .filter(|l| !l.is_empty());

        let header = lines
            .next()
            .ok_or_else(|| PsolaError::InvalidContour("missing header".to_string()))?;
        let mut fields = header.split_whitespace().map(|v| v.parse::<f64>());
        let (window_size, skip_size) = match (fields.next(), fields.next()) {
            (Some(Ok(w)), Some(Ok(s))) => (w, s),
            _ => {
                return Err(PsolaError::InvalidContour(format!("bad header '{}'", header)));
            }
        };

        let f0s = lines
            .map(|l| {
                l.parse::<f64>()
                    .map_err(|e| PsolaError::InvalidContour(format!("bad F0 '{}': {}", l, e)))
            })
            .collect::<Result<Vec<f64>>>()?;

        Self::new(window_size, skip_size, f0s)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut buf = Vec::new();
        File::open(path)?.read_to_end(&mut buf)?;

        let is_binary = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("ptc"))
            .unwrap_or(false);

        let contour = if is_binary {
            let raw = bincode::deserialize::<PitchContour>(&buf)
                .map_err(|e| PsolaError::InvalidContour(e.to_string()))?;
            Self::new(raw.window_size, raw.skip_size, raw.f0s)?
        } else {
            let text = String::from_utf8(buf).map_err(|e| PsolaError::InvalidContour(e.to_string()))?;
            Self::parse_text(&text)?
        };
        debug!(
            "Pitch contour {}: {} frames, window={}s, skip={}s",
            path.display(),
            contour.f0s.len(),
            contour.window_size,
            contour.skip_size
        );
        Ok(contour)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self).map_err(|e| PsolaError::InvalidContour(e.to_string()))?;
        File::create(path)?.write_all(&bytes)?;
        Ok(())
    }

    pub fn frame_at(&self, time: f64) -> usize {
        let ind = round_half_up((time - 0.5 * self.window_size) / self.skip_size);
        ind.clamp(0, self.f0s.len().saturating_sub(1) as i64) as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitchMarks {
    marks: Vec<usize>,
    voicing: Vec<bool>,
    zeros_to_pad: usize,
}

impl PitchMarks {
    /// `voicing` is truncated or extended (unvoiced) to one flag per period.
    pub fn new(marks: Vec<usize>, mut voicing: Vec<bool>) -> Result<Self> {
        if marks.is_empty() {
            return Err(PsolaError::NoPitchMarks);
        }
        for (index, pair) in marks.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(PsolaError::NonMonotonicPitchMarks {
                    index: index + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        voicing.resize(marks.len() - 1, false);
        Ok(Self {
            marks,
            voicing,
            zeros_to_pad: 0,
        })
    }

    /// Marks whose voicing is decided from the signal, one period at a time over a
    /// window of `periods` periods.
    pub fn with_detected_voicing(
        marks: Vec<usize>,
        signal: &[f64],
        sample_rate: u32,
        periods: usize,
    ) -> Result<Self> {
        let mut pm = Self::new(marks, Vec::new())?;
        let last = pm.marks.len() - 1;
        for i in 0..pm.voicing.len() {
            let start = pm.marks[i].min(signal.len());
            let end = pm.marks[(i + periods.max(1)).min(last)].min(signal.len());
            pm.voicing[i] = is_voiced(&signal[start..end], sample_rate);
        }
        debug!(
            "Detected voicing: {}/{} periods voiced",
            pm.voicing.iter().filter(|v| **v).count(),
            pm.voicing.len()
        );
        Ok(pm)
    }

    /// One mark per elapsed period of the contour. Unvoiced stretches advance by
    /// `sample_rate / unvoiced_f0`. A final mark past the end is added if needed.
    pub fn from_contour(
        contour: &PitchContour,
        sample_rate: u32,
        len: usize,
        unvoiced_f0: f64,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PsolaError::InvalidSampleRate(sample_rate));
        }
        if contour.f0s.is_empty() {
            return Err(PsolaError::InvalidContour("no F0 values".to_string()));
        }
        if !(unvoiced_f0 > VOICING_F0_FLOOR) {
            return Err(PsolaError::InvalidContour(format!("unvoiced F0 {} too low", unvoiced_f0)));
        }
        let fs = sample_rate as f64;
        let nominal = fs / unvoiced_f0;

        let mut marks = vec![0usize];
        let mut voicing = Vec::new();
        let mut prev = 0usize;
        let mut period = nominal;
        let mut voiced = false;
        for i in 1..len {
            let f0 = contour.f0s[contour.frame_at(i as f64 / fs)];
            voiced = f0 > VOICING_F0_FLOOR;
            period = if voiced { fs / f0 } else { nominal };
            if (i - prev) as f64 >= period {
                marks.push(i);
                voicing.push(voiced);
                prev = i;
            }
        }

        let mut zeros_to_pad = 0;
        if len > 0 && prev != len - 1 {
            let step = if marks.len() > 1 {
                prev - marks[marks.len() - 2]
            } else {
                period.ceil() as usize
            };
            let extra = prev + step.max(1);
            marks.push(extra);
            voicing.push(voiced);
            zeros_to_pad = extra.saturating_sub(len - 1);
        }

        info!(
            "Derived {} pitch marks from {} contour frames",
            marks.len(),
            contour.f0s.len()
        );
        let mut pm = Self::new(marks, voicing)?;
        pm.zeros_to_pad = zeros_to_pad;
        Ok(pm)
    }

    pub fn parse_text(text: &str) -> Result<Vec<usize>> {
        text.lines()
            .map(|l| l.split('#').next().unwrap_or("").trim())
            .filter(|l| !l.is_empty())
            .map(|l| {
                l.parse::<usize>()
                    .map_err(|e| PsolaError::InvalidContour(format!("bad pitch mark '{}': {}", l, e)))
            })
            .collect()
    }

    /// Fills a lead-in before the first mark and a tail after the last one with
    /// unvoiced marks `nominal` samples apart, so that marks cover `0..len`.
    pub fn anchored(&self, len: usize, nominal: usize) -> Self {
        let nominal = nominal.max(1);
        let first = self.marks[0];

        let mut marks = Vec::with_capacity(self.marks.len() + 2);
        let mut voicing = Vec::with_capacity(self.voicing.len() + 2);
        let mut m = 0;
        while m < first {
            marks.push(m);
            m += nominal;
        }
        if marks.len() > 1 && first - marks[marks.len() - 1] <= nominal / 2 {
            marks.pop();
        }
        voicing.resize(marks.len(), false);
        marks.extend_from_slice(&self.marks);
        voicing.extend_from_slice(&self.voicing);

        let end = len.saturating_sub(1);
        let mut zeros_to_pad = self.zeros_to_pad;
        while marks.len() < 2 || marks[marks.len() - 1] < end {
            let next = marks[marks.len() - 1] + nominal;
            marks.push(next);
            voicing.push(false);
            zeros_to_pad = next.saturating_sub(end);
        }

        Self {
            marks,
            voicing,
            zeros_to_pad,
        }
    }

    pub fn marks(&self) -> &[usize] {
        &self.marks
    }

    pub fn voicing(&self) -> &[bool] {
        &self.voicing
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn num_periods(&self) -> usize {
        self.marks.len() - 1
    }

    pub fn zeros_to_pad(&self) -> usize {
        self.zeros_to_pad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_monotonic_marks() {
        assert!(matches!(PitchMarks::new(vec![], vec![]), Err(PsolaError::NoPitchMarks)));
        let err = PitchMarks::new(vec![0, 100, 100, 300], vec![]).unwrap_err();
        assert!(matches!(
            err,
            PsolaError::NonMonotonicPitchMarks {
                index: 2,
                previous: 100,
                current: 100
            }
        ));
    }

    #[test]
    fn test_voicing_is_resized() {
        let pm = PitchMarks::new(vec![0, 10, 20, 30], vec![true]).unwrap();
        assert_eq!(pm.voicing(), &[true, false, false]);
        assert_eq!(pm.num_periods(), 3);
    }

    #[test]
    fn test_from_contour_voiced() {
        let contour = PitchContour::new(0.02, 0.01, vec![100.0; 120]).unwrap();
        let pm = PitchMarks::from_contour(&contour, 16000, 16000, 100.0).unwrap();
        let marks = pm.marks();
        assert_eq!(marks[0], 0);
        assert_eq!(marks[1], 160);
        assert!(marks.windows(2).all(|w| w[1] - w[0] == 160));
        assert!(*marks.last().unwrap() >= 15999);
        assert!(pm.voicing().iter().all(|v| *v));
        assert_eq!(pm.zeros_to_pad(), marks.last().unwrap() - 15999);
    }

    #[test]
    fn test_from_contour_unvoiced_uses_nominal_period() {
        let mut f0s = vec![200.0; 50];
        f0s.extend(vec![0.0; 50]);
        let contour = PitchContour::new(0.02, 0.01, f0s).unwrap();
        let pm = PitchMarks::from_contour(&contour, 16000, 16000, 100.0).unwrap();
        let marks = pm.marks();
        assert_eq!(marks[1] - marks[0], 80);
        let n = marks.len();
        assert_eq!(marks[n - 2] - marks[n - 3], 160);
        assert!(!pm.voicing()[n - 2]);
    }

    #[test]
    fn test_anchoring() {
        let pm = PitchMarks::new(vec![250, 350, 450], vec![true, true]).unwrap();
        let anchored = pm.anchored(1000, 100);
        assert_eq!(anchored.marks()[..3], [0, 100, 250]);
        assert_eq!(anchored.voicing()[..3], [false, false, true]);
        assert!(*anchored.marks().last().unwrap() >= 999);
        assert!(anchored.marks().windows(2).all(|w| w[1] > w[0]));
        assert_eq!(anchored.voicing().len(), anchored.num_periods());

        let single = PitchMarks::new(vec![0], vec![]).unwrap().anchored(1, 100);
        assert_eq!(single.marks(), &[0, 100]);
    }

    #[test]
    fn test_text_contour() {
        let text = "# window skip\n0.02 0.01\n100\n0\n  120.5\n";
        let contour = PitchContour::parse_text(text).unwrap();
        assert_eq!(contour.f0s, vec![100.0, 0.0, 120.5]);
        assert_eq!(contour.frame_at(0.0), 0);
        assert_eq!(contour.frame_at(0.021), 1);
        assert_eq!(contour.frame_at(10.0), 2);
        assert!(PitchContour::parse_text("0.02\n100").is_err());
        assert!(PitchContour::parse_text("0.02 0.01\n-5").is_err());
    }

    #[test]
    fn test_mark_file() {
        assert_eq!(PitchMarks::parse_text("0\n160\n# gap\n320\n").unwrap(), vec![0, 160, 320]);
        assert!(PitchMarks::parse_text("0\nabc").is_err());
    }

    #[test]
    fn test_detected_voicing() {
        let fs = 16000;
        let mut signal: Vec<f64> = (0..1600)
            .map(|i| (2.0 * std::f64::consts::PI * 100.0 * i as f64 / fs as f64).sin())
            .collect();
        signal.extend(vec![0.0; 1600]);
        let marks: Vec<usize> = (0..=20).map(|i| i * 160).collect();
        let pm = PitchMarks::with_detected_voicing(marks, &signal, fs, 3).unwrap();
        assert!(pm.voicing()[0]);
        assert!(!pm.voicing()[19]);
    }
}
