/// Hysteresis band, as a fraction of the output hop, inside which a frame is
/// emitted exactly once.
pub const DRIFT_TOLERANCE: f64 = 0.1;

/// Repeat/skip decision for one input frame. `repeat == -1` skips the frame,
/// `0` emits it once, `n` emits it `n + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub repeat: i32,
}

impl Schedule {
    pub fn is_skip(&self) -> bool {
        self.repeat < 0
    }

    pub fn emissions(&self) -> usize {
        (self.repeat + 1).max(0) as usize
    }
}

/// Tracks how far the synthesized timeline lags behind the requested one, in
/// samples, and turns that drift into repeat/skip decisions.
#[derive(Debug, Default, Clone)]
pub struct DurationScheduler {
    carried: f64,
}

impl DurationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.carried = 0.0;
    }

    pub fn carried(&self) -> f64 {
        self.carried
    }

    /// `duration` is the input hop of the frame, `new_duration` the output hop
    /// of one emission. The last frame is never skipped and absorbs all
    /// remaining drift, so the output is never shorter than requested.
    pub fn schedule(&mut self, duration: f64, new_duration: f64, tscale: f64, is_last: bool) -> Schedule {
        let hop = new_duration.max(1.0);
        let band = DRIFT_TOLERANCE * hop;

        let mut local = self.carried + duration * tscale - hop;
        let mut repeat = 0i32;

        if local < -band {
            repeat = -1;
            local += hop;
        } else if local > band {
            while local > band {
                repeat += 1;
                local -= hop;
            }
        }

        if is_last {
            if repeat < 0 {
                repeat = 0;
                local -= hop;
            }
            while local > 0.0 {
                repeat += 1;
                local -= hop;
            }
        }

        self.carried = local;
        Schedule { repeat }
    }
}
