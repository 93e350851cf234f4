//! Line spectral frequencies, normalised to the sampling rate (values in (0, 0.5)).
//!
//! The forward direction splits `A(z)` into its symmetric and antisymmetric
//! halves, removes the trivial roots at z = -1 and z = 1, maps both halves onto
//! Chebyshev polynomials in `x = 2 cos w` and finds their real roots with a
//! simultaneous Newton iteration.

use std::f64::consts::PI;

use crate::error::{PsolaError, Result};

const ROOT_TOLERANCE: f64 = 1e-12;
const MAX_ROOT_ITERATIONS: usize = 10_000;
/// Maps the Chebyshev variable `2 cos w` back to `cos w`.
const CHEBY_FACTOR: f64 = 0.5;

/// Converts one-minus-a coefficients (`c[0] == 1`) into ascending LSFs.
pub fn lpc_to_lsf(one_minus_a: &[f64]) -> Result<Vec<f64>> {
    let order = one_minus_a.len().saturating_sub(1);
    if order == 0 {
        return Err(PsolaError::InvalidLpOrder(order));
    }
    if order % 2 == 1 {
        return Err(PsolaError::OddLpOrder(order));
    }

    let c = one_minus_a;
    let half = order / 2;
    let mut g1 = vec![0.0; half + 1];
    let mut g2 = vec![0.0; half + 1];

    g1[half] = c[0];
    g2[half] = c[0];
    for i in 1..=half {
        g1[half - i] = c[i] + c[order + 1 - i];
        g2[half - i] = c[i] - c[order + 1 - i];
    }
    // divide out (1 + z^-1) and (1 - z^-1)
    for i in 1..=half {
        g1[half - i] -= g1[half - i + 1];
        g2[half - i] += g2[half - i + 1];
    }

    cheby_reduce(&mut g1);
    cheby_reduce(&mut g2);

    let r1 = real_roots(&g1)?;
    let r2 = real_roots(&g2)?;

    let to_freq = |x: f64| (CHEBY_FACTOR * x).clamp(-1.0, 1.0).acos() / (2.0 * PI);
    let mut lsf = Vec::with_capacity(order);
    for (a, b) in r1.iter().zip(&r2) {
        lsf.push(to_freq(*a));
        lsf.push(to_freq(*b));
    }
    Ok(lsf)
}

pub fn lpc_to_lsf_hz(one_minus_a: &[f64], sample_rate: u32) -> Result<Vec<f64>> {
    Ok(lpc_to_lsf(one_minus_a)?
        .into_iter()
        .map(|f| f * sample_rate as f64)
        .collect())
}

/// Rebuilds one-minus-a coefficients from ascending LSFs in (0, 0.5).
pub fn lsf_to_lpc(lsf: &[f64]) -> Result<Vec<f64>> {
    let order = lsf.len();
    if order == 0 {
        return Err(PsolaError::InvalidLpOrder(order));
    }
    if order % 2 == 1 {
        return Err(PsolaError::OddLpOrder(order));
    }
    validate(lsf)?;

    let half = order / 2;
    let p: Vec<f64> = (0..half).map(|i| -2.0 * (2.0 * PI * lsf[2 * i]).cos()).collect();
    let q: Vec<f64> = (0..half).map(|i| -2.0 * (2.0 * PI * lsf[2 * i + 1]).cos()).collect();

    // impulse response of the cascaded second-order sections of P(z) and Q(z)
    let mut a = vec![0.0; half + 1];
    let mut a1 = vec![0.0; half];
    let mut a2 = vec![0.0; half];
    let mut b = vec![0.0; half + 1];
    let mut b1 = vec![0.0; half];
    let mut b2 = vec![0.0; half];
    let mut coeffs = vec![0.0; order + 1];
    let mut xf = 0.0;

    for i in 0..=order {
        let xx = if i == 0 { 1.0 } else { 0.0 };
        a[0] = xx + xf;
        b[0] = xx - xf;
        xf = xx;
        for j in 0..half {
            a[j + 1] = a[j] + p[j] * a1[j] + a2[j];
            b[j + 1] = b[j] + q[j] * b1[j] + b2[j];
            a2[j] = a1[j];
            a1[j] = a[j];
            b2[j] = b1[j];
            b1[j] = b[j];
        }
        if i > 0 {
            coeffs[i] = 0.5 * (a[half] + b[half]);
        }
    }
    coeffs[0] = 1.0;
    Ok(coeffs)
}

pub fn lsf_hz_to_lpc(lsf_hz: &[f64], sample_rate: u32) -> Result<Vec<f64>> {
    let normalised: Vec<f64> = lsf_hz.iter().map(|f| f / sample_rate as f64).collect();
    lsf_to_lpc(&normalised)
}

fn validate(lsf: &[f64]) -> Result<()> {
    for (index, &value) in lsf.iter().enumerate() {
        if index > 0 && value <= lsf[index - 1] {
            return Err(PsolaError::NonMonotonicLsf { index });
        }
        if !(value > 0.0 && value < 0.5) {
            return Err(PsolaError::LsfOutOfRange { index, value });
        }
    }
    Ok(())
}

/// Rewrites a polynomial in `z + 1/z` as one in `x = 2 cos w`, in place.
fn cheby_reduce(g: &mut [f64]) {
    let ord = g.len() - 1;
    for i in 2..=ord {
        let mut j = ord;
        while j > i {
            g[j - 2] -= g[j];
            j -= 1;
        }
        g[j - 2] -= 2.0 * g[j];
    }
}

/// Real roots of `sum(g[k] x^k)`, found simultaneously and returned in descending order.
fn real_roots(g: &[f64]) -> Result<Vec<f64>> {
    let ord = g.len() - 1;
    let mut roots: Vec<f64> = (0..ord)
        .map(|i| 2.0 * (i as f64 + 0.5) / ord as f64 - 1.0)
        .collect();

    let mut converged = false;
    for _ in 0..MAX_ROOT_ITERATIONS {
        let mut step = 0.0;
        for i in 0..ord {
            let root = roots[i];
            let mut val = g[ord];
            let mut deriv = g[ord];
            for k in (0..ord).rev() {
                val = val * root + g[k];
                if k != i {
                    deriv *= root - roots[k];
                }
            }
            let delta = val / deriv;
            roots[i] -= delta;
            step += delta * delta;
        }
        if !step.is_finite() {
            return Err(PsolaError::LsfNoConvergence);
        }
        if step <= ROOT_TOLERANCE {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(PsolaError::LsfNoConvergence);
    }

    roots.sort_by(|a, b| b.total_cmp(a));
    Ok(roots)
}
