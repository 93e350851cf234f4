pub mod frame;
pub mod lpc;
pub mod lsf;
pub mod ola;
pub mod processor;
pub mod reflection;
pub mod scales;
pub mod scheduler;
pub mod spectral;
pub mod stream;

pub use frame::{AnalysisFrame, FrameProvider};
pub use lpc::{LpCoeffs, LpcAnalyzer};
pub use processor::{FdPsolaProcessor, FrameInput, PsolaParams, SynthesisStats};
pub use scales::{FrameScales, ScaleGrid, ScaleRequest};
pub use scheduler::{DurationScheduler, Schedule};
pub use stream::{OutputStreamer, SampleSink};

pub const NUM_PITCH_SYNC_PERIODS: usize = 3;
