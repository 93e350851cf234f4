use crate::util::{scale_list_parser, ScaleList};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "FD-PSOLA pitch, duration, energy and vocal tract modification.")]
#[command(args_conflicts_with_subcommands = true)]
#[command(allow_negative_numbers = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(index = 1)]
    pub in_file: Option<String>,
    /// Pitch contour (.ptc or text) or pitch marks (.pm, .marks)
    #[arg(index = 2)]
    pub pitch_file: Option<String>,
    #[arg(index = 3)]
    pub out_file: Option<String>,

    #[arg(long, value_parser = scale_list_parser)]
    pub pscale: Option<ScaleList>,
    #[arg(long, value_parser = scale_list_parser)]
    pub tscale: Option<ScaleList>,
    #[arg(long, value_parser = scale_list_parser)]
    pub escale: Option<ScaleList>,
    #[arg(long, value_parser = scale_list_parser)]
    pub vscale: Option<ScaleList>,
    /// Compact scales, e.g. P1.5T0.8E1V1.1
    #[arg(long)]
    pub flags: Option<String>,

    #[arg(long)]
    pub lp_order: Option<usize>,
    #[arg(long)]
    pub preemphasis: Option<f64>,
    #[arg(long)]
    pub periods: Option<usize>,
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a text pitch contour into the binary contour format
    Contour { input: String, output: String },
}

pub struct SynthesisArgs {
    pub in_file: String,
    pub pitch_file: String,
    pub out_file: String,
    pub pscale: Option<Vec<f64>>,
    pub tscale: Option<Vec<f64>>,
    pub escale: Option<Vec<f64>>,
    pub vscale: Option<Vec<f64>>,
    pub flags: Option<String>,
    pub lp_order: Option<usize>,
    pub preemphasis: Option<f64>,
    pub periods: Option<usize>,
}

impl Cli {
    pub fn to_synthesis_args(self) -> Option<SynthesisArgs> {
        Some(SynthesisArgs {
            in_file: self.in_file?,
            pitch_file: self.pitch_file?,
            out_file: self.out_file?,
            pscale: self.pscale.map(|l| l.0),
            tscale: self.tscale.map(|l| l.0),
            escale: self.escale.map(|l| l.0),
            vscale: self.vscale.map(|l| l.0),
            flags: self.flags,
            lp_order: self.lp_order,
            preemphasis: self.preemphasis,
            periods: self.periods,
        })
    }
}
