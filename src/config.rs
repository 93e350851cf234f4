use knuffel::Decode;
use serde::{Deserialize, Serialize};

use crate::psola::{PsolaParams, ScaleGrid};

#[derive(Decode, Debug, Clone, Serialize, Deserialize)]
pub struct PsolaConfig {
    #[knuffel(child)]
    pub analysis: Option<AnalysisConfig>,
    #[knuffel(child)]
    pub grid: Option<GridConfig>,
    #[knuffel(child)]
    pub output: Option<OutputConfig>,
}

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[knuffel(property(name = "lp-order"))]
    pub lp_order: Option<usize>,
    #[knuffel(property)]
    pub preemphasis: Option<f64>,
    #[knuffel(property)]
    pub periods: Option<usize>,
    #[knuffel(property(name = "unvoiced-f0"))]
    pub unvoiced_f0: Option<f64>,
    #[knuffel(property(name = "stability-check"))]
    pub stability_check: Option<bool>,
}

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridConfig {
    #[knuffel(property)]
    pub window: Option<f64>,
    #[knuffel(property)]
    pub skip: Option<f64>,
}

#[derive(Decode, Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[knuffel(property(name = "block-size"))]
    pub block_size: Option<usize>,
    #[knuffel(property)]
    pub normalize: Option<bool>,
}

impl PsolaConfig {
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config = knuffel::parse("config.kdl", content)?;
        Ok(config)
    }

    pub fn params(&self) -> PsolaParams {
        let defaults = PsolaParams::default();
        let analysis = self.analysis.clone().unwrap_or_default();
        let output = self.output.clone().unwrap_or_default();
        PsolaParams {
            lp_order: analysis.lp_order.or(defaults.lp_order),
            preemphasis: analysis.preemphasis.unwrap_or(defaults.preemphasis),
            periods: analysis.periods.unwrap_or(defaults.periods),
            unvoiced_f0: analysis.unvoiced_f0.unwrap_or(defaults.unvoiced_f0),
            block_size: output.block_size.unwrap_or(defaults.block_size),
            stability_check: analysis.stability_check.unwrap_or(defaults.stability_check),
        }
    }

    pub fn grid(&self) -> ScaleGrid {
        let defaults = ScaleGrid::default();
        match &self.grid {
            Some(grid) => ScaleGrid {
                window_size: grid.window.unwrap_or(defaults.window_size),
                skip_size: grid.skip.unwrap_or(defaults.skip_size),
            },
            None => defaults,
        }
    }

    pub fn normalize(&self) -> bool {
        self.output.as_ref().and_then(|o| o.normalize).unwrap_or(false)
    }
}

impl Default for PsolaConfig {
    fn default() -> Self {
        let params = PsolaParams::default();
        let grid = ScaleGrid::default();
        Self {
            analysis: Some(AnalysisConfig {
                lp_order: None,
                preemphasis: Some(params.preemphasis),
                periods: Some(params.periods),
                unvoiced_f0: Some(params.unvoiced_f0),
                stability_check: Some(params.stability_check),
            }),
            grid: Some(GridConfig {
                window: Some(grid.window_size),
                skip: Some(grid.skip_size),
            }),
            output: Some(OutputConfig {
                block_size: Some(params.block_size),
                normalize: Some(false),
            }),
        }
    }
}
