pub mod args;
pub mod audio;
pub mod config;
pub mod error;
pub mod filter;
pub mod flags;
pub mod pitch;
pub mod pipeline;
pub mod psola;
pub mod util;

pub use error::{PsolaError, Result};
