use crate::error::Result;

pub trait SampleSink {
    fn write_block(&mut self, samples: &[f64]) -> Result<()>;
}

impl SampleSink for Vec<f64> {
    fn write_block(&mut self, samples: &[f64]) -> Result<()> {
        self.extend_from_slice(samples);
        Ok(())
    }
}

/// Collects drained samples into fixed-size blocks and hands them to a sink.
/// An optional limit truncates the stream; the block size never changes the
/// samples that reach the sink.
pub struct OutputStreamer<'a, S: SampleSink> {
    sink: &'a mut S,
    block: Vec<f64>,
    block_size: usize,
    limit: Option<usize>,
    written: usize,
}

impl<'a, S: SampleSink> OutputStreamer<'a, S> {
    pub fn new(sink: &'a mut S, block_size: usize, limit: Option<usize>) -> Self {
        let block_size = block_size.max(1);
        Self {
            sink,
            block: Vec::with_capacity(block_size),
            block_size,
            limit,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_full(&self) -> bool {
        self.limit.map_or(false, |l| self.written >= l)
    }

    pub fn push(&mut self, sample: f64) -> Result<()> {
        if self.is_full() {
            return Ok(());
        }
        self.block.push(sample);
        self.written += 1;
        if self.block.len() >= self.block_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn extend(&mut self, samples: &[f64]) -> Result<()> {
        for &s in samples {
            self.push(s)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if !self.block.is_empty() {
            self.sink.write_block(&self.block)?;
            self.block.clear();
        }
        Ok(())
    }
}
