//! Step-down / step-up conversion between LPC and reflection coefficients.
//!
//! Sign convention follows the Levinson recursion in [`crate::psola::lpc`]:
//! `k_m` is the last one-minus-a coefficient of the order-`m` filter.

/// Step-down recursion. Input is in one-minus-a form (`c[0] == 1`).
pub fn lpc_to_reflection(one_minus_a: &[f64]) -> Vec<f64> {
    let order = one_minus_a.len().saturating_sub(1);
    let mut k = vec![0.0; order];
    let mut a = one_minus_a.to_vec();

    for m in (1..=order).rev() {
        let km = a[m];
        k[m - 1] = km;
        let den = 1.0 - km * km;
        if den.abs() < f64::EPSILON {
            // lower orders are undefined on the unit circle
            break;
        }
        let prev = a.clone();
        for i in 1..m {
            a[i] = (prev[i] - km * prev[m - i]) / den;
        }
        a[m] = 0.0;
    }
    k
}

/// Step-up recursion, returns one-minus-a coefficients.
pub fn reflection_to_lpc(k: &[f64]) -> Vec<f64> {
    let mut a = vec![0.0; k.len() + 1];
    a[0] = 1.0;
    for (idx, &km) in k.iter().enumerate() {
        let m = idx + 1;
        let prev = a.clone();
        for i in 1..m {
            a[i] = prev[i] + km * prev[m - i];
        }
        a[m] = km;
    }
    a
}

pub fn is_stable(k: &[f64]) -> bool {
    k.iter().all(|v| (-1.0..=1.0).contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psola::lpc::levinson;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_round_trip() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let k: Vec<f64> = (0..10).map(|_| rng.gen_range(-0.9..0.9)).collect();
            let a = reflection_to_lpc(&k);
            let back = lpc_to_reflection(&a);
            for (x, y) in k.iter().zip(&back) {
                assert!((x - y).abs() < 1e-6, "{} vs {}", x, y);
            }
        }
    }

    #[test]
    fn test_levinson_coefficients_agree() {
        let r = [1.0, 0.7, 0.3, 0.1, -0.05];
        let (a, _) = levinson(&r, 4);
        let k = lpc_to_reflection(&a);
        assert!(is_stable(&k));
        assert!((k[0] + 0.7).abs() < 1e-12, "First reflection coefficient is -r1/r0");
        let rebuilt = reflection_to_lpc(&k);
        for (x, y) in a.iter().zip(&rebuilt) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unstable_filter_detected() {
        // 1 - 2.5 z^-1 + 1.5 z^-2 has a root outside the unit circle
        let k = lpc_to_reflection(&[1.0, -2.5, 1.5]);
        assert!(!is_stable(&k));
        assert!(is_stable(&lpc_to_reflection(&[1.0, -0.9, 0.2])));
    }
}
