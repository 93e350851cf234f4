use crate::error::{PsolaError, Result};
use crate::pitch::PitchMarks;
use crate::util::make_even;

pub const MIN_FRAME_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFrame {
    pub index: usize,
    pub start: usize,
    /// Samples between the first and the last mark of the frame, inclusive.
    pub span: usize,
    pub period: usize,
    pub periods: usize,
    pub voiced: bool,
    /// Even working copy of at least `MIN_FRAME_LEN` samples, zero past the signal end.
    pub samples: Vec<f64>,
}

/// Cursor over the frames of a signal. Frame `i` spans marks `i ..= i + periods`
/// and the cursor advances one period per call.
pub struct FrameProvider<'a> {
    signal: &'a [f64],
    marks: &'a PitchMarks,
    periods: usize,
    cursor: usize,
}

impl<'a> FrameProvider<'a> {
    pub fn new(signal: &'a [f64], marks: &'a PitchMarks, periods: usize) -> Result<Self> {
        if periods == 0 {
            return Err(PsolaError::InvalidPeriods(periods));
        }
        if marks.len() < 2 {
            return Err(PsolaError::NoPitchMarks);
        }
        Ok(Self {
            signal,
            marks,
            periods,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.marks.num_periods()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    /// Mark `j`, extrapolated with the last period once past the end.
    pub fn mark(&self, j: usize) -> usize {
        let marks = self.marks.marks();
        let last = marks.len() - 1;
        if j <= last {
            return marks[j];
        }
        let last_period = marks[last] - marks[last - 1];
        marks[last] + (j - last) * last_period
    }

    pub fn frame_span(&self, i: usize) -> usize {
        self.mark(i + self.periods) - self.mark(i) + 1
    }

    pub fn frame_len(&self, i: usize) -> usize {
        make_even(self.frame_span(i)).max(MIN_FRAME_LEN)
    }

    pub fn max_frame_len(&self) -> usize {
        (0..self.len()).map(|i| self.frame_len(i)).max().unwrap_or(MIN_FRAME_LEN)
    }

    pub fn center_time(&self, i: usize, sample_rate: u32) -> f64 {
        0.5 * (self.mark(i) + self.mark(i + self.periods)) as f64 / sample_rate as f64
    }

    pub fn center_times(&self, sample_rate: u32) -> Vec<f64> {
        (0..self.len()).map(|i| self.center_time(i, sample_rate)).collect()
    }

    pub fn frame(&self, i: usize) -> AnalysisFrame {
        let start = self.mark(i);
        let len = self.frame_len(i);
        let samples = (start..start + len)
            .map(|n| self.signal.get(n).copied().unwrap_or(0.0))
            .collect();
        AnalysisFrame {
            index: i,
            start,
            span: self.frame_span(i),
            period: self.mark(i + 1) - start,
            periods: self.periods,
            voiced: self.marks.voicing()[i],
            samples,
        }
    }

    pub fn next_frame(&mut self) -> Option<AnalysisFrame> {
        if self.cursor >= self.len() {
            return None;
        }
        let frame = self.frame(self.cursor);
        self.cursor += 1;
        Some(frame)
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for FrameProvider<'_> {
    type Item = AnalysisFrame;

    fn next(&mut self) -> Option<AnalysisFrame> {
        self.next_frame()
    }
}
