use crate::error::{PsolaError, Result};
use crate::util::hann_window;

/// Which halves of a frame skip the synthesis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowShape {
    pub open_start: bool,
    pub open_end: bool,
}

/// Ring buffer of weighted overlap-add sums.
///
/// `y` accumulates `frame * s` and `w` accumulates `h * s`, where `h` is the
/// window the frame content already carries and `s` the synthesis window
/// (`h` itself, or 1 in an open half). Readout is `y / w`.
///
/// Positions are absolute output sample indices; slot `pos % capacity` holds
/// position `pos`. Only positions in `read_pos .. read_pos + capacity` are live.
pub struct OverlapAddBuffer {
    y: Vec<f64>,
    w: Vec<f64>,
    read_pos: usize,
}

impl OverlapAddBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            y: vec![0.0; capacity],
            w: vec![0.0; capacity],
            read_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.y.len()
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    fn slot(&self, pos: usize) -> usize {
        pos % self.y.len()
    }

    pub fn add_frame(&mut self, start: usize, frame: &[f64], shape: WindowShape) -> Result<()> {
        let capacity = self.capacity();
        if start < self.read_pos || start + frame.len() > self.read_pos + capacity {
            return Err(PsolaError::FrameTooLong {
                len: start.saturating_sub(self.read_pos) + frame.len(),
                capacity,
            });
        }

        let n = frame.len();
        let window = hann_window(n);
        let half = (n + 1) / 2;
        for (k, (&x, &h)) in frame.iter().zip(&window).enumerate() {
            let open = if k < half { shape.open_start } else { shape.open_end };
            let s = if open { 1.0 } else { h };
            let slot = self.slot(start + k);
            self.y[slot] += x * s;
            self.w[slot] += h * s;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> f64 {
        let slot = self.slot(self.read_pos);
        let w = self.w[slot];
        let out = if w > 0.0 { self.y[slot] / w } else { self.y[slot] };
        self.y[slot] = 0.0;
        self.w[slot] = 0.0;
        self.read_pos += 1;
        out
    }

    pub fn drain(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.pop()).collect()
    }

    pub fn reset(&mut self) {
        self.y.iter_mut().for_each(|v| *v = 0.0);
        self.w.iter_mut().for_each(|v| *v = 0.0);
        self.read_pos = 0;
    }
}
