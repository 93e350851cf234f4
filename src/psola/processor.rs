use log::{debug, info, trace};
use std::borrow::Cow;

use crate::error::{PsolaError, Result};
use crate::pitch::PitchMarks;
use crate::psola::frame::{FrameProvider, MIN_FRAME_LEN};
use crate::psola::lpc::default_order;
use crate::psola::ola::{OverlapAddBuffer, WindowShape};
use crate::psola::scales::{FrameScales, ScaleRequest, MIN_PSCALE};
use crate::psola::scheduler::{DurationScheduler, Schedule};
use crate::psola::spectral::{energy_gain, SpectralModifier};
use crate::psola::stream::{OutputStreamer, SampleSink};
use crate::psola::NUM_PITCH_SYNC_PERIODS;
use crate::util::{hann_window, make_even, round_half_up};

#[derive(Debug, Clone, PartialEq)]
pub struct PsolaParams {
    /// `None` picks an order from the sample rate.
    pub lp_order: Option<usize>,
    /// Pre-emphasis before LP analysis, 0 disables it.
    pub preemphasis: f64,
    pub periods: usize,
    pub unvoiced_f0: f64,
    pub block_size: usize,
    pub stability_check: bool,
}

impl Default for PsolaParams {
    fn default() -> Self {
        Self {
            lp_order: None,
            preemphasis: 0.0,
            periods: NUM_PITCH_SYNC_PERIODS,
            unvoiced_f0: 100.0,
            block_size: 4096,
            stability_check: false,
        }
    }
}

/// One frame handed to [`FdPsolaProcessor::process_frame`].
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub samples: &'a [f64],
    pub period: usize,
    pub voiced: bool,
    pub scales: FrameScales,
    pub is_last: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisStats {
    pub frames: usize,
    pub skipped: usize,
    pub repeated: usize,
    pub max_repeat: i32,
    pub output_len: usize,
}

impl SynthesisStats {
    fn record(&mut self, schedule: Schedule) {
        self.frames += 1;
        if schedule.is_skip() {
            self.skipped += 1;
        } else if schedule.repeat > 0 {
            self.repeated += 1;
        }
        self.max_repeat = self.max_repeat.max(schedule.repeat);
    }
}

pub struct FdPsolaProcessor {
    sample_rate: u32,
    params: PsolaParams,
    lp_order: usize,
    spectral: SpectralModifier,
    scheduler: DurationScheduler,
    ola: OverlapAddBuffer,
    max_frame_len: usize,
    emitted: usize,
    finished: bool,
}

impl FdPsolaProcessor {
    pub fn new(params: PsolaParams, sample_rate: u32) -> Result<Self> {
        let nominal = make_even(params.periods * sample_rate as usize / 40);
        Self::with_max_frame_len(params, sample_rate, nominal)
    }

    /// Sizes the ring buffer for input frames of up to `max_frame_len` samples.
    pub fn with_max_frame_len(params: PsolaParams, sample_rate: u32, max_frame_len: usize) -> Result<Self> {
        if sample_rate == 0 {
            return Err(PsolaError::InvalidSampleRate(sample_rate));
        }
        if params.periods == 0 {
            return Err(PsolaError::InvalidPeriods(params.periods));
        }
        let lp_order = params.lp_order.unwrap_or_else(|| default_order(sample_rate));
        if lp_order == 0 {
            return Err(PsolaError::InvalidLpOrder(lp_order));
        }

        let nominal = make_even(params.periods * sample_rate as usize / 40);
        let max_frame_len = make_even(max_frame_len.max(nominal).max(MIN_FRAME_LEN));
        let spectral = SpectralModifier::new(lp_order, params.preemphasis, max_frame_len, params.stability_check)?;

        Ok(Self {
            sample_rate,
            lp_order,
            spectral,
            scheduler: DurationScheduler::new(),
            ola: OverlapAddBuffer::new(ring_capacity(max_frame_len)),
            max_frame_len,
            emitted: 0,
            finished: false,
            params,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn lp_order(&self) -> usize {
        self.lp_order
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn reset(&mut self) {
        self.scheduler.reset();
        self.ola.reset();
        self.emitted = 0;
        self.finished = false;
    }

    /// Schedules, modifies and overlap-adds one frame, streaming every finished
    /// output sample. Frames arriving after the last one are ignored.
    pub fn process_frame<S: SampleSink>(
        &mut self,
        input: FrameInput<'_>,
        out: &mut OutputStreamer<'_, S>,
    ) -> Result<Schedule> {
        if self.finished {
            return Ok(Schedule { repeat: -1 });
        }
        let scales = input.scales;
        check_frame_scales(&scales)?;

        let frm_len = make_even(input.samples.len()).max(MIN_FRAME_LEN);
        if frm_len > self.max_frame_len {
            return Err(PsolaError::FrameTooLong {
                len: frm_len,
                capacity: self.max_frame_len,
            });
        }
        let period = input.period.max(1);
        let pscale = if input.voiced { scales.pscale } else { 1.0 };

        let new_len = if input.voiced {
            make_even(round_half_up(frm_len as f64 / pscale) as usize).max(MIN_FRAME_LEN)
        } else {
            frm_len
        };
        let hop = if input.voiced {
            (round_half_up(period as f64 / pscale) as usize).max(1)
        } else {
            period
        };

        let schedule = self
            .scheduler
            .schedule(period as f64, hop as f64, scales.tscale, input.is_last);
        if schedule.is_skip() {
            trace!("Skipped frame (carried drift {:.1})", self.scheduler.carried());
            return Ok(schedule);
        }

        let window = hann_window(frm_len);
        let windowed: Vec<f64> = (0..frm_len)
            .map(|i| input.samples.get(i).copied().unwrap_or(0.0) * window[i])
            .collect();

        let frame: Vec<f64> = if pscale != 1.0 || scales.vscale != 1.0 {
            let modified = self.spectral.modify(&windowed, new_len, pscale, scales.vscale);
            let gain = energy_gain(&windowed, &modified, scales.escale);
            modified.into_iter().map(|v| v * gain).collect()
        } else {
            windowed.iter().map(|v| v * scales.escale).collect()
        };

        let emissions = schedule.emissions();
        for j in 0..emissions {
            let shape = WindowShape {
                open_start: self.emitted == 0,
                open_end: input.is_last && j + 1 == emissions,
            };
            let content = repetition(&frame, input.voiced, j);
            self.ola.add_frame(self.ola.read_pos(), &content, shape)?;
            for _ in 0..hop {
                out.push(self.ola.pop())?;
            }
            self.emitted += 1;
        }
        if schedule.repeat > 0 {
            trace!("Repeated frame {} times", schedule.repeat);
        } else {
            trace!("Synthesized frame");
        }

        if input.is_last {
            self.finished = true;
        }
        Ok(schedule)
    }

    /// Drains the buffer until `target` samples were written, then flushes.
    pub fn finish<S: SampleSink>(&mut self, out: &mut OutputStreamer<'_, S>, target: Option<usize>) -> Result<()> {
        if let Some(target) = target {
            while out.written() < target && !out.is_full() {
                out.push(self.ola.pop())?;
            }
        }
        out.flush()
    }

    /// Resynthesizes `signal` with the requested scales and streams the result
    /// into `sink`. Marks are anchored so that they cover the whole signal.
    pub fn process<S: SampleSink>(
        &mut self,
        signal: &[f64],
        marks: &PitchMarks,
        request: &ScaleRequest,
        sink: &mut S,
    ) -> Result<SynthesisStats> {
        request.validate()?;
        self.reset();
        let mut stats = SynthesisStats::default();
        if signal.is_empty() {
            return Ok(stats);
        }

        let fs = self.sample_rate;
        let nominal = (round_half_up(fs as f64 / self.params.unvoiced_f0) as usize).max(1);
        let marks = marks.anchored(signal.len(), nominal);
        let mut provider = FrameProvider::new(signal, &marks, self.params.periods)?;

        let needed = provider.max_frame_len();
        if needed > self.max_frame_len {
            debug!("Growing synthesis buffer for {}-sample frames", needed);
            *self = Self::with_max_frame_len(self.params.clone(), fs, needed)?;
        }

        let total_len = signal.len().max(marks.marks()[marks.len() - 1] + 1);
        let scales = request.per_frame(&provider.center_times(fs), total_len, fs)?;
        let target = match request.uniform_tscale() {
            Some(ts) => (signal.len() as f64 * ts).ceil() as usize,
            None => requested_len(&provider, &scales, signal.len()),
        };

        info!(
            "Synthesizing {} frames: {} periods per frame, LP order {}, fft size {}",
            provider.len(),
            self.params.periods,
            self.lp_order,
            self.spectral.fft_size()
        );

        let num_frames = provider.len();
        let mut out = OutputStreamer::new(sink, self.params.block_size, Some(target));
        while let Some(frame) = provider.next_frame() {
            let schedule = self.process_frame(
                FrameInput {
                    samples: &frame.samples,
                    period: frame.period,
                    voiced: frame.voiced,
                    scales: scales[frame.index],
                    is_last: frame.index + 1 == num_frames,
                },
                &mut out,
            )?;
            stats.record(schedule);
            if self.finished {
                break;
            }
        }
        self.finish(&mut out, Some(target))?;
        stats.output_len = out.written();

        debug!(
            "Schedule: {} skipped, {} repeated, max repeat {}",
            stats.skipped, stats.repeated, stats.max_repeat
        );
        info!(
            "Synthesis finished: {} input samples -> {} output samples",
            signal.len(),
            stats.output_len
        );
        Ok(stats)
    }
}

/// Each frame's first period, clipped to the signal, stretched by its time scale.
fn requested_len(provider: &FrameProvider<'_>, scales: &[FrameScales], len: usize) -> usize {
    let total: f64 = scales
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let inside = provider.mark(i + 1).min(len).saturating_sub(provider.mark(i));
            inside as f64 * s.tscale
        })
        .sum();
    total.ceil() as usize
}

fn ring_capacity(max_frame_len: usize) -> usize {
    make_even((max_frame_len as f64 / MIN_PSCALE).ceil() as usize) + MIN_FRAME_LEN
}

fn check_frame_scales(scales: &FrameScales) -> Result<()> {
    let fields = [
        ("pscale", scales.pscale),
        ("tscale", scales.tscale),
        ("escale", scales.escale),
        ("vscale", scales.vscale),
    ];
    for (kind, value) in fields {
        if !value.is_finite() || value <= 0.0 {
            return Err(PsolaError::InvalidScale { kind, index: 0, value });
        }
    }
    if scales.pscale < MIN_PSCALE {
        return Err(PsolaError::InvalidScale {
            kind: "pscale",
            index: 0,
            value: scales.pscale,
        });
    }
    Ok(())
}

/// Unvoiced frames play backwards on every other repetition.
fn repetition(frame: &[f64], voiced: bool, j: usize) -> Cow<'_, [f64]> {
    if !voiced && j % 2 == 1 {
        Cow::Owned(frame.iter().rev().copied().collect())
    } else {
        Cow::Borrowed(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::rms;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    const FS: u32 = 16000;

    fn buzz(f0: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / FS as f64;
                (1..=20).map(|h| (2.0 * PI * f0 * h as f64 * t).sin() / h as f64).sum::<f64>() * 0.3
            })
            .collect()
    }

    fn regular_marks(period: usize, len: usize, voiced: bool) -> PitchMarks {
        let marks: Vec<usize> = (0..).map(|i| i * period).take_while(|&m| m <= len).collect();
        let n = marks.len();
        PitchMarks::new(marks, vec![voiced; n - 1]).unwrap()
    }

    fn run(signal: &[f64], marks: &PitchMarks, request: &ScaleRequest) -> (Vec<f64>, SynthesisStats) {
        let mut processor = FdPsolaProcessor::new(PsolaParams::default(), FS).unwrap();
        let mut out = Vec::new();
        let stats = processor.process(signal, marks, request, &mut out).unwrap();
        assert_eq!(stats.output_len, out.len());
        (out, stats)
    }

    fn estimate_f0(x: &[f64], min_lag: usize, max_lag: usize) -> f64 {
        let mut best = (min_lag, f64::MIN);
        for lag in min_lag..=max_lag {
            let num: f64 = (0..x.len() - lag).map(|n| x[n] * x[n + lag]).sum();
            let den: f64 = (0..x.len() - lag).map(|n| x[n + lag] * x[n + lag]).sum::<f64>().sqrt()
                * (0..x.len() - lag).map(|n| x[n] * x[n]).sum::<f64>().sqrt();
            let r = num / den;
            if r > best.1 {
                best = (lag, r);
            }
        }
        FS as f64 / best.0 as f64
    }

    #[test]
    fn test_identity() {
        let signal = buzz(100.0, 16000);
        let marks = regular_marks(160, signal.len(), true);
        let (out, stats) = run(&signal, &marks, &ScaleRequest::default());
        assert_eq!(out.len(), signal.len());
        assert_eq!(stats.skipped, 0);
        let ratio = rms(&out) / rms(&signal);
        assert!((ratio - 1.0).abs() < 0.01, "RMS ratio {}", ratio);
        for (i, (a, b)) in out.iter().zip(&signal).enumerate() {
            assert!((a - b).abs() < 1e-6, "sample {}: {} vs {}", i, a, b);
        }
    }

    #[test]
    fn test_identity_with_irregular_unvoiced_marks() {
        let mut rng = StdRng::seed_from_u64(9);
        let signal: Vec<f64> = (0..5000).map(|_| rng.gen_range(-0.5..0.5)).collect();
        let mut marks = vec![37];
        while *marks.last().unwrap() < 4900 {
            let next = marks.last().unwrap() + rng.gen_range(90..220);
            marks.push(next);
        }
        let pm = PitchMarks::new(marks, vec![]).unwrap();
        let (out, _) = run(&signal, &pm, &ScaleRequest::default());
        assert_eq!(out.len(), signal.len());
        let ratio = rms(&out) / rms(&signal);
        assert!((ratio - 1.0).abs() < 0.01, "RMS ratio {}", ratio);
    }

    #[test]
    fn test_octave_up() {
        let signal = buzz(100.0, 16000);
        let marks = regular_marks(160, signal.len(), true);
        let (out, stats) = run(&signal, &marks, &ScaleRequest::uniform(2.0, 1.0, 1.0, 1.0));
        assert_eq!(out.len(), signal.len());
        assert_eq!(stats.max_repeat, 1);
        let f0 = estimate_f0(&out[4000..12000], 40, 140);
        assert!((f0 - 200.0).abs() <= 10.0, "Measured {}Hz", f0);
    }

    #[test]
    fn test_octave_down() {
        let signal = buzz(200.0, 16000);
        let marks = regular_marks(80, signal.len(), true);
        let (out, _) = run(&signal, &marks, &ScaleRequest::uniform(0.5, 1.0, 1.0, 1.0));
        assert_eq!(out.len(), signal.len());
        let f0 = estimate_f0(&out[4000..12000], 120, 260);
        assert!((f0 - 100.0).abs() <= 5.0, "Measured {}Hz", f0);
    }

    #[test]
    fn test_double_duration() {
        let signal = buzz(100.0, 16000);
        let marks = regular_marks(160, signal.len(), true);
        let (out, stats) = run(&signal, &marks, &ScaleRequest::uniform(1.0, 2.0, 1.0, 1.0));
        assert_eq!(out.len(), 32000);
        assert!(stats.max_repeat <= 3, "max repeat {}", stats.max_repeat);
        let ratio = rms(&out[1000..31000]) / rms(&signal[1000..15000]);
        assert!((ratio - 1.0).abs() < 0.05, "RMS ratio {}", ratio);
    }

    /// Requested length integrated sample by sample over the frames' time scales.
    fn integrated_len(signal: &[f64], marks: &PitchMarks, request: &ScaleRequest) -> usize {
        let anchored = marks.anchored(signal.len(), 160);
        let provider = FrameProvider::new(signal, &anchored, 3).unwrap();
        let total_len = signal.len().max(anchored.marks()[anchored.len() - 1] + 1);
        let scales = request
            .per_frame(&provider.center_times(FS), total_len, FS)
            .unwrap();
        let m = anchored.marks();
        let total: f64 = (0..signal.len())
            .map(|n| {
                let frame = m.iter().rposition(|&mark| mark <= n).unwrap();
                scales[frame].tscale
            })
            .sum();
        total.ceil() as usize
    }

    #[test]
    fn test_varying_duration_matches_request() {
        let signal = buzz(100.0, 16000);
        let marks = regular_marks(160, signal.len(), true);
        let mut request = ScaleRequest::default();
        request.tscales = (0..101).map(|i| if i < 50 { 0.5 } else { 1.5 }).collect();
        let (out, _) = run(&signal, &marks, &request);
        assert_eq!(out.len(), integrated_len(&signal, &marks, &request));
    }

    #[test]
    fn test_duration_ignores_tail_marks_past_signal_end() {
        let signal = buzz(100.0, 15950);
        let marks = regular_marks(160, 14400, true);

        let mut ones = ScaleRequest::default();
        ones.tscales = vec![1.0; 101];
        let (out, _) = run(&signal, &marks, &ones);
        assert_eq!(out.len(), 15950, "A constant vector acts like a single value");

        let mut slow = ScaleRequest::default();
        slow.tscales = vec![5.0; 101];
        let (out, _) = run(&signal, &marks, &slow);
        assert_eq!(out.len(), 79750);

        let mut varying = ScaleRequest::default();
        varying.tscales = (0..101).map(|i| if i % 2 == 0 { 0.5 } else { 2.0 }).collect();
        let (out, _) = run(&signal, &marks, &varying);
        let expected = integrated_len(&signal, &marks, &varying);
        assert_eq!(out.len(), expected, "{} samples vs {} requested", out.len(), expected);
    }

    #[test]
    fn test_energy_scale() {
        let signal = buzz(100.0, 8000);
        let marks = regular_marks(160, signal.len(), true);
        let (out, _) = run(&signal, &marks, &ScaleRequest::uniform(1.0, 1.0, 2.0, 1.0));
        let ratio = rms(&out) / rms(&signal);
        assert!((ratio - 2.0).abs() < 0.02, "RMS ratio {}", ratio);
    }

    #[test]
    fn test_vocal_tract_scale_keeps_length_and_level() {
        let signal = buzz(100.0, 8000);
        let marks = regular_marks(160, signal.len(), true);
        let (out, _) = run(&signal, &marks, &ScaleRequest::uniform(1.0, 1.0, 1.0, 1.2));
        assert_eq!(out.len(), signal.len());
        let ratio = rms(&out[800..7200]) / rms(&signal[800..7200]);
        assert!(ratio > 0.7 && ratio < 1.4, "RMS ratio {}", ratio);
        let diff: f64 = out.iter().zip(&signal).map(|(a, b)| (a - b).abs()).sum();
        assert!(diff > 1.0, "Warping should change the waveform");
    }

    #[test]
    fn test_silence_stays_silent() {
        let signal = vec![0.0; 4000];
        let marks = regular_marks(160, signal.len(), true);
        let (out, _) = run(&signal, &marks, &ScaleRequest::uniform(1.5, 1.2, 1.0, 0.9));
        assert_eq!(out.len(), 4800);
        assert!(out.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_rejects_bad_request() {
        let signal = buzz(100.0, 1600);
        let marks = regular_marks(160, signal.len(), true);
        let mut processor = FdPsolaProcessor::new(PsolaParams::default(), FS).unwrap();
        let mut out = Vec::new();
        let err = processor
            .process(&signal, &marks, &ScaleRequest::uniform(0.0, 1.0, 1.0, 1.0), &mut out)
            .unwrap_err();
        assert!(matches!(err, PsolaError::InvalidScale { kind: "pscale", .. }));
        assert!(out.is_empty());

        let params = PsolaParams {
            lp_order: Some(0),
            ..PsolaParams::default()
        };
        assert!(FdPsolaProcessor::new(params, FS).is_err());
    }

    #[test]
    fn test_single_frame_is_first_and_terminal() {
        let mut processor = FdPsolaProcessor::new(PsolaParams::default(), FS).unwrap();
        let samples = buzz(100.0, 482);
        let mut sink = Vec::new();
        let mut out = OutputStreamer::new(&mut sink, 64, None);
        let schedule = processor
            .process_frame(
                FrameInput {
                    samples: &samples,
                    period: 160,
                    voiced: true,
                    scales: FrameScales::default(),
                    is_last: true,
                },
                &mut out,
            )
            .unwrap();
        assert_eq!(schedule.repeat, 0);
        assert!(processor.is_finished());
        processor.finish(&mut out, Some(482)).unwrap();
        for (a, b) in sink.iter().zip(&samples) {
            assert!((a - b).abs() < 1e-9, "Both halves should pass unwindowed");
        }
        assert_eq!(sink.len(), 482);
    }

    #[test]
    fn test_frames_after_last_are_ignored() {
        let mut processor = FdPsolaProcessor::new(PsolaParams::default(), FS).unwrap();
        let samples = vec![0.1; 100];
        let mut sink = Vec::new();
        let mut out = OutputStreamer::new(&mut sink, 64, None);
        let input = FrameInput {
            samples: &samples,
            period: 50,
            voiced: false,
            scales: FrameScales::default(),
            is_last: true,
        };
        processor.process_frame(input, &mut out).unwrap();
        let again = processor.process_frame(input, &mut out).unwrap();
        assert!(again.is_skip());
        assert!(processor
            .process_frame(FrameInput { samples: &[0.0; 5000], is_last: false, ..input }, &mut out)
            .is_ok());
        processor.reset();
        assert!(processor
            .process_frame(FrameInput { samples: &[0.0; 5000], is_last: false, ..input }, &mut out)
            .is_err());
    }

    #[test]
    fn test_unvoiced_repetitions_alternate_direction() {
        let frame = [1.0, 2.0, 3.0];
        assert_eq!(&*repetition(&frame, false, 0), &[1.0, 2.0, 3.0]);
        assert_eq!(&*repetition(&frame, false, 1), &[3.0, 2.0, 1.0]);
        assert_eq!(&*repetition(&frame, false, 2), &[1.0, 2.0, 3.0]);
        assert_eq!(&*repetition(&frame, true, 1), &[1.0, 2.0, 3.0]);
    }
}
