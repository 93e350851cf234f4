use std::f64::consts::PI;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq)]
pub struct ScaleList(pub Vec<f64>);

pub fn scale_list_parser(s: &str) -> Result<ScaleList, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Scale list cannot be empty".to_string());
    }

    let mut values = Vec::new();
    for item in s.split(',') {
        let item = item.trim();
        let v = f64::from_str(item).map_err(|e| format!("Invalid scale value '{}': {}", item, e))?;
        if !v.is_finite() || v <= 0.0 {
            return Err(format!("Scale must be positive, got {}", v));
        }
        values.push(v);
    }

    Ok(ScaleList(values))
}

pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

pub fn make_even(n: usize) -> usize {
    if n % 2 == 1 { n + 1 } else { n }
}

pub fn make_odd(n: usize) -> usize {
    if n % 2 == 0 { n + 1 } else { n }
}

pub fn next_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Hann window sampled at bin centres, strictly positive everywhere.
pub fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * (i as f64 + 0.5) / n as f64).cos()))
        .collect()
}

pub fn energy(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

pub fn rms(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

pub fn resize_linear(src: &[f64], len: usize) -> Vec<f64> {
    if len == 0 || src.is_empty() {
        return Vec::new();
    }
    if src.len() == len {
        return src.to_vec();
    }
    if src.len() == 1 || len == 1 {
        return vec![src[0]; len];
    }

    let ratio = (src.len() - 1) as f64 / (len - 1) as f64;
    (0..len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let i0 = (pos.floor() as usize).min(src.len() - 1);
            let i1 = (i0 + 1).min(src.len() - 1);
            lerp(src[i0], src[i1], pos - i0 as f64)
        })
        .collect()
}

pub fn voicing_probability(frame: &[f64], sample_rate: u32) -> f64 {
    let fs = sample_rate as f64;
    let min_lag = ((fs / 400.0).floor() as usize).max(1);
    let max_lag = ((fs / 40.0).ceil() as usize).min(frame.len().saturating_sub(1));

    let mut best = 0.0f64;
    for lag in min_lag..=max_lag {
        let head = &frame[..frame.len() - lag];
        let tail = &frame[lag..];
        let num: f64 = head.iter().zip(tail).map(|(a, b)| a * b).sum();
        let den = (head.iter().map(|v| v * v).sum::<f64>() * tail.iter().map(|v| v * v).sum::<f64>()).sqrt();
        if den > 0.0 {
            best = best.max(num / den);
        }
    }
    best
}

pub const VOICING_THRESHOLD: f64 = 0.35;

pub fn is_voiced(frame: &[f64], sample_rate: u32) -> bool {
    voicing_probability(frame, sample_rate) >= VOICING_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_list_parser() {
        assert_eq!(scale_list_parser("1.5"), Ok(ScaleList(vec![1.5])));
        assert_eq!(scale_list_parser("1, 2,0.5"), Ok(ScaleList(vec![1.0, 2.0, 0.5])));
        assert!(scale_list_parser("").is_err());
        assert!(scale_list_parser("1,0").is_err());
        assert!(scale_list_parser("1,-2").is_err());
        assert!(scale_list_parser("fast").is_err());
    }

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.49), 2);
        assert_eq!(round_half_up(-0.2), 0);
        assert_eq!(make_even(481), 482);
        assert_eq!(make_even(480), 480);
        assert_eq!(make_odd(512), 513);
        assert_eq!(next_pow2(1200), 2048);
        assert_eq!(next_pow2(0), 1);
    }

    #[test]
    fn test_hann_is_symmetric_and_positive() {
        let w = hann_window(10);
        assert!(w.iter().all(|&v| v > 0.0));
        for i in 0..5 {
            assert!((w[i] - w[9 - i]).abs() < 1e-12, "Window not symmetric at {}", i);
        }
    }

    #[test]
    fn test_resize_linear() {
        assert_eq!(resize_linear(&[0.0, 1.0], 3), vec![0.0, 0.5, 1.0]);
        assert_eq!(resize_linear(&[2.0], 4), vec![2.0; 4]);
        let down = resize_linear(&[0.0, 1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(down, vec![0.0, 2.0, 4.0]);
        assert!(resize_linear(&[], 3).is_empty());
    }

    #[test]
    fn test_voicing() {
        let fs = 16000;
        let tone: Vec<f64> = (0..960).map(|i| (2.0 * PI * 120.0 * i as f64 / fs as f64).sin()).collect();
        assert!(is_voiced(&tone, fs), "A periodic tone should read as voiced");
        assert!(!is_voiced(&vec![0.0; 960], fs), "Silence is not voiced");
        assert!((energy(&[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert!((rms(&[1.0, -1.0]) - 1.0).abs() < 1e-12);
    }
}
