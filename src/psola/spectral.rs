use log::warn;
use rustfft::num_complex::Complex;

use crate::error::Result;
use crate::psola::lpc::LpcAnalyzer;
use crate::util::{energy, make_odd, next_pow2, resize_linear, round_half_up};

/// Vocal tract scales below this collapse the envelope onto a single bin.
pub const MIN_VSCALE: f64 = 0.05;
const SILENCE: f64 = 1e-100;

/// Frequency-domain pitch and vocal tract modification of single frames.
///
/// A frame is split into its LP envelope and excitation. The excitation
/// spectrum is carried over unchanged onto a grid of `1 / pscale` times as many
/// bins, which rescales the harmonic spacing, and is then re-shaped with the
/// envelope resampled onto the new grid.
pub struct SpectralModifier {
    analyzer: LpcAnalyzer,
    fft_size: usize,
    stability_check: bool,
}

impl SpectralModifier {
    pub fn new(order: usize, preemphasis: f64, max_frame_len: usize, stability_check: bool) -> Result<Self> {
        Ok(Self {
            analyzer: LpcAnalyzer::new(order, preemphasis)?,
            fft_size: next_pow2(max_frame_len),
            stability_check,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn modified_envelope(&self, envelope: &[f64], new_max_freq: usize, vscale: f64) -> Vec<f64> {
        warp_envelope(&resize_linear(envelope, new_max_freq), vscale)
    }

    /// Returns `new_len` samples of the modified frame, before energy correction.
    /// `windowed` is the analysis-windowed input frame.
    pub fn modify(&mut self, windowed: &[f64], new_len: usize, pscale: f64, vscale: f64) -> Vec<f64> {
        if windowed.len() > self.fft_size {
            self.fft_size = next_pow2(windowed.len());
        }
        let fft_size = self.fft_size;
        let max_freq = fft_size / 2 + 1;

        let lpc = self.analyzer.analyze(windowed);
        let vt = self.analyzer.envelope(&lpc, fft_size);

        let mut spectrum: Vec<Complex<f64>> = windowed.iter().map(|&x| Complex::new(x, 0.0)).collect();
        spectrum.resize(fft_size, Complex::new(0.0, 0.0));
        self.analyzer.planner().plan_fft_forward(fft_size).process(&mut spectrum);

        let excitation: Vec<Complex<f64>> = (0..max_freq)
            .map(|k| {
                if vt[k] > SILENCE {
                    spectrum[k] / vt[k]
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();

        let new_max_freq = make_odd((round_half_up(max_freq as f64 / pscale).max(3)) as usize);
        let new_fft_size = 2 * (new_max_freq - 1);
        let target_vt = self.modified_envelope(&vt, new_max_freq, vscale);

        if self.stability_check {
            let refit = self.analyzer.fit_envelope(&target_vt);
            if !refit.is_stable() {
                warn!("Modified envelope is not stable (pscale={}, vscale={})", pscale, vscale);
            }
        }

        let mut hy = vec![Complex::new(0.0, 0.0); new_fft_size];
        let copied = max_freq.min(new_fft_size);
        hy[..copied].copy_from_slice(&excitation[..copied]);
        extend_by_mirroring(&excitation, &mut hy, new_max_freq);

        // Nyquist bin keeps its magnitude only
        let nyquist = new_max_freq - 1;
        hy[nyquist] = Complex::new(hy[nyquist].norm(), 0.0);

        for (bin, gain) in hy.iter_mut().zip(&target_vt) {
            *bin *= *gain;
        }
        for k in new_max_freq..new_fft_size {
            hy[k] = hy[2 * new_max_freq - 2 - k].conj();
        }

        self.analyzer.planner().plan_fft_inverse(new_fft_size).process(&mut hy);
        let scale = 1.0 / new_fft_size as f64;
        (0..new_len)
            .map(|i| hy.get(i).map_or(0.0, |c| c.re * scale))
            .collect()
    }
}

/// Fills the bins above the input Nyquist by alternately mirroring and copying
/// bins `1 .. max_freq - 1` of `h`, where `max_freq = h.len()`.
pub fn extend_by_mirroring(h: &[Complex<f64>], hy: &mut [Complex<f64>], new_max_freq: usize) {
    let m = h.len() as i64;
    let nmf = new_max_freq as i64;
    if m < 3 || nmf <= m {
        return;
    }

    let mut k_max = 1;
    while nmf > (k_max + 1) * (m - 2) {
        k_max += 1;
    }

    for k in 1..=k_max {
        let fix = (m - 2) * k;
        let (add, mul) = if k % 2 == 1 { (m + 2, 1) } else { (-1, -1) };
        for j in (fix + 3)..=nmf.min(m + fix) {
            let src = mul * (fix - j) + add - 1;
            if let (Some(&v), Some(dst)) = (h.get(src as usize), hy.get_mut((j - 1) as usize)) {
                *dst = v;
            }
        }
    }
}

/// `out[k] = vt[round((k + 1) / vscale) - 1]`, clamped to the available bins.
pub fn warp_envelope(vt: &[f64], vscale: f64) -> Vec<f64> {
    let n = vt.len();
    if n == 0 || vscale == 1.0 {
        return vt.to_vec();
    }
    let vscale = vscale.max(MIN_VSCALE);
    (0..n)
        .map(|k| {
            let w = round_half_up((k + 1) as f64 / vscale).clamp(1, n as i64) as usize;
            vt[w - 1]
        })
        .collect()
}

/// Gain matching the output RMS to the input RMS, times `escale`. Neutral when
/// either side is silent.
pub fn energy_gain(input: &[f64], output: &[f64], escale: f64) -> f64 {
    let e_in = energy(input);
    let e_out = energy(output);
    if e_in <= SILENCE || e_out <= SILENCE || output.is_empty() {
        return escale;
    }
    (e_in / (input.len() as f64).sqrt()) / (e_out / (output.len() as f64).sqrt()) * escale
}
