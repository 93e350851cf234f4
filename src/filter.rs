use biquad::{Biquad, Coefficients, DirectForm1};

pub fn run_filter<F: Biquad<f64>>(signal: &mut [f64], filter: &mut F) {
    signal.iter_mut().for_each(|x| *x = filter.run(*x));
    filter.reset_state();
}

/// First order high-pass `1 - c z^-1`.
pub fn preemphasis_coefficients(coef: f64) -> Coefficients<f64> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: -coef,
        b2: 0.0,
    }
}

pub fn deemphasis_coefficients(coef: f64) -> Coefficients<f64> {
    Coefficients {
        a1: -coef,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

pub fn preemphasize(signal: &mut [f64], coef: f64) {
    if coef <= 0.0 {
        return;
    }
    let mut filter = DirectForm1::<f64>::new(preemphasis_coefficients(coef));
    run_filter(signal, &mut filter);
}

pub fn deemphasize(signal: &mut [f64], coef: f64) {
    if coef <= 0.0 {
        return;
    }
    let mut filter = DirectForm1::<f64>::new(deemphasis_coefficients(coef));
    run_filter(signal, &mut filter);
}
