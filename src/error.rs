use std::fmt;

/// Errors raised by the PSOLA engine when a request cannot be honoured.
#[derive(Debug)]
pub enum PsolaError {
    NoPitchMarks,
    NonMonotonicPitchMarks {
        index: usize,
        previous: usize,
        current: usize,
    },
    /// A scale factor is non-finite, non-positive or outside its allowed range.
    InvalidScale {
        kind: &'static str,
        index: usize,
        value: f64,
    },
    InvalidLpOrder(usize),
    /// LSF conversion is only defined for even prediction orders.
    OddLpOrder(usize),
    LsfOutOfRange {
        index: usize,
        value: f64,
    },
    NonMonotonicLsf {
        index: usize,
    },
    LsfNoConvergence,
    InvalidPeriods(usize),
    InvalidSampleRate(u32),
    FrameTooLong {
        len: usize,
        capacity: usize,
    },
    InvalidContour(String),
    Io(std::io::Error),
}

impl fmt::Display for PsolaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsolaError::NoPitchMarks => write!(f, "No pitch marks given"),
            PsolaError::NonMonotonicPitchMarks {
                index,
                previous,
                current,
            } => write!(
                f,
                "Pitch marks must be strictly increasing: mark {index} is {current} after {previous}"
            ),
            PsolaError::InvalidScale { kind, index, value } => {
                write!(f, "Invalid {kind} at index {index}: {value}")
            }
            PsolaError::InvalidLpOrder(order) => {
                write!(f, "LPC order must be positive, got {order}")
            }
            PsolaError::OddLpOrder(order) => {
                write!(f, "LSF conversion needs an even LPC order, got {order}")
            }
            PsolaError::LsfOutOfRange { index, value } => {
                write!(f, "LSF {index} out of bounds (0, 0.5): {value}")
            }
            PsolaError::NonMonotonicLsf { index } => {
                write!(f, "Nonmonotonic LSFs at index {index}")
            }
            PsolaError::LsfNoConvergence => write!(f, "LSF root search did not converge"),
            PsolaError::InvalidPeriods(n) => {
                write!(f, "Frames must span at least one period, got {n}")
            }
            PsolaError::InvalidSampleRate(fs) => write!(f, "Invalid sample rate: {fs}Hz"),
            PsolaError::FrameTooLong { len, capacity } => write!(
                f,
                "Frame of {len} samples exceeds synthesis buffer capacity {capacity}"
            ),
            PsolaError::InvalidContour(reason) => write!(f, "Invalid pitch contour: {reason}"),
            PsolaError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for PsolaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PsolaError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PsolaError {
    fn from(err: std::io::Error) -> Self {
        PsolaError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, PsolaError>;
