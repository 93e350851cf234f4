use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{PsolaError, Result};
use crate::filter;
use crate::psola::reflection;
use crate::util::next_pow2;

/// All-pole model `g / A(z)` with `A(z) = 1 + sum(c_i z^-i)`.
///
/// Coefficients are kept in "one minus a" form: `coeffs[0] == 1` and
/// `coeffs[i] == -a_i` for the predictor coefficients `a_i`.
#[derive(Debug, Clone, PartialEq)]
pub struct LpCoeffs {
    coeffs: Vec<f64>,
    gain: f64,
}

impl LpCoeffs {
    pub fn new(one_minus_a: Vec<f64>, gain: f64) -> Result<Self> {
        if one_minus_a.len() < 2 {
            return Err(PsolaError::InvalidLpOrder(one_minus_a.len().saturating_sub(1)));
        }
        Ok(Self { coeffs: one_minus_a, gain })
    }

    pub fn identity(order: usize, gain: f64) -> Self {
        let mut coeffs = vec![0.0; order + 1];
        coeffs[0] = 1.0;
        Self { coeffs, gain }
    }

    pub fn from_predictor(a: &[f64], gain: f64) -> Result<Self> {
        let mut coeffs = Vec::with_capacity(a.len() + 1);
        coeffs.push(1.0);
        coeffs.extend(a.iter().map(|v| -v));
        Self::new(coeffs, gain)
    }

    pub fn order(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn one_minus_a(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn predictor(&self) -> Vec<f64> {
        self.coeffs[1..].iter().map(|v| -v).collect()
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn whiten(&self, x: &[f64]) -> Vec<f64> {
        (0..x.len())
            .map(|n| {
                self.coeffs
                    .iter()
                    .enumerate()
                    .take(n + 1)
                    .map(|(i, c)| c * x[n - i])
                    .sum()
            })
            .collect()
    }

    pub fn synthesize(&self, excitation: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; excitation.len()];
        for n in 0..excitation.len() {
            let mut acc = excitation[n];
            for i in 1..=self.order().min(n) {
                acc -= self.coeffs[i] * y[n - i];
            }
            y[n] = acc;
        }
        y
    }

    pub fn is_stable(&self) -> bool {
        reflection::is_stable(&reflection::lpc_to_reflection(&self.coeffs))
    }

    /// Magnitude of `g / A(e^jw)` on the `fft_size / 2 + 1` non-negative bins.
    pub fn envelope(&self, fft_size: usize, planner: &mut FftPlanner<f64>) -> Vec<f64> {
        let fft = planner.plan_fft_forward(fft_size);
        let mut buffer = vec![Complex::new(0.0, 0.0); fft_size];
        for (dst, &c) in buffer.iter_mut().zip(&self.coeffs) {
            dst.re = c;
        }
        fft.process(&mut buffer);
        buffer
            .iter()
            .take(fft_size / 2 + 1)
            .map(|a| self.gain / a.norm().max(f64::MIN_POSITIVE))
            .collect()
    }
}

pub fn default_order(sample_rate: u32) -> usize {
    let order = sample_rate as usize / 1000 + 2;
    if order % 2 == 1 { order + 1 } else { order }
}

/// Autocorrelation for lags `0..=max_lag`, zero-padded so no circular wrap leaks in.
pub fn autocorrelation(x: &[f64], max_lag: usize, planner: &mut FftPlanner<f64>) -> Vec<f64> {
    let mut r = vec![0.0; max_lag + 1];
    if x.is_empty() {
        return r;
    }

    let n = next_pow2(2 * x.len());
    let mut buffer: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    buffer.resize(n, Complex::new(0.0, 0.0));

    planner.plan_fft_forward(n).process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(n).process(&mut buffer);

    for (lag, value) in r.iter_mut().enumerate().take(x.len()) {
        *value = buffer[lag].re / n as f64;
    }
    r
}

/// Levinson-Durbin recursion. Returns one-minus-a coefficients and the gain
/// `sqrt(sum(c_i r_i))`.
pub fn levinson(r: &[f64], order: usize) -> (Vec<f64>, f64) {
    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;
    if r.is_empty() || r[0] <= 0.0 {
        return (a, 0.0);
    }

    let lag = |i: usize| r.get(i).copied().unwrap_or(0.0);
    let mut err = r[0];
    let mut prev = a.clone();
    for m in 1..=order {
        let acc: f64 = lag(m) + (1..m).map(|i| a[i] * lag(m - i)).sum::<f64>();
        let k = -acc / err;

        prev.copy_from_slice(&a);
        for i in 1..m {
            a[i] = prev[i] + k * prev[m - i];
        }
        a[m] = k;

        err *= 1.0 - k * k;
        if err <= 0.0 {
            break;
        }
    }

    let gain = a.iter().enumerate().map(|(i, c)| c * lag(i)).sum::<f64>().max(0.0).sqrt();
    (a, gain)
}

pub struct LpcAnalyzer {
    order: usize,
    preemphasis: f64,
    planner: FftPlanner<f64>,
}

impl LpcAnalyzer {
    pub fn new(order: usize, preemphasis: f64) -> Result<Self> {
        if order == 0 {
            return Err(PsolaError::InvalidLpOrder(order));
        }
        Ok(Self {
            order,
            preemphasis,
            planner: FftPlanner::new(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn planner(&mut self) -> &mut FftPlanner<f64> {
        &mut self.planner
    }

    pub fn analyze(&mut self, frame: &[f64]) -> LpCoeffs {
        let mut x = frame.to_vec();
        filter::preemphasize(&mut x, self.preemphasis);

        let r = autocorrelation(&x, self.order, &mut self.planner);
        if r[0] <= 0.0 {
            return LpCoeffs::identity(self.order, 0.0);
        }
        let (coeffs, gain) = levinson(&r, self.order);
        LpCoeffs { coeffs, gain }
    }

    /// LP analysis plus the excitation left after inverse filtering the
    /// pre-emphasized frame.
    pub fn residual(&mut self, frame: &[f64]) -> (LpCoeffs, Vec<f64>) {
        let coeffs = self.analyze(frame);
        let mut x = frame.to_vec();
        filter::preemphasize(&mut x, self.preemphasis);
        let excitation = coeffs.whiten(&x);
        (coeffs, excitation)
    }

    pub fn resynthesize(&self, coeffs: &LpCoeffs, excitation: &[f64]) -> Vec<f64> {
        let mut y = coeffs.synthesize(excitation);
        filter::deemphasize(&mut y, self.preemphasis);
        y
    }

    pub fn envelope(&mut self, coeffs: &LpCoeffs, fft_size: usize) -> Vec<f64> {
        coeffs.envelope(fft_size, &mut self.planner)
    }

    /// Fits an all-pole model to a magnitude envelope given on `N / 2 + 1` bins.
    pub fn fit_envelope(&mut self, magnitude: &[f64]) -> LpCoeffs {
        if magnitude.len() < 2 {
            return LpCoeffs::identity(self.order, 0.0);
        }
        let n = 2 * (magnitude.len() - 1);
        let mut buffer = vec![Complex::new(0.0, 0.0); n];
        for (k, m) in magnitude.iter().enumerate() {
            let power = Complex::new(m * m, 0.0);
            buffer[k] = power;
            if k > 0 && k < n - k {
                buffer[n - k] = power;
            }
        }
        self.planner.plan_fft_inverse(n).process(&mut buffer);

        let r: Vec<f64> = buffer.iter().take(self.order + 1).map(|c| c.re / n as f64).collect();
        if r[0] <= 0.0 {
            return LpCoeffs::identity(self.order, 0.0);
        }
        let (coeffs, gain) = levinson(&r, self.order);
        LpCoeffs { coeffs, gain }
    }
}
