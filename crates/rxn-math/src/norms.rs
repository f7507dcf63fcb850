//! Weighted norms used for error control
//!
//! Adaptive integrators measure local error and Newton corrections in a
//! norm weighted by the per-component tolerance scale
//! `w[i] = atol[i] + rtol * |y[i]|`; an estimate is acceptable when its
//! weighted RMS norm is at most one.

/// Weighted root-mean-square norm: `sqrt(mean((v[i] / w[i])^2))`.
///
/// Returns 0.0 for empty input. Weights must be positive; callers build
/// them from validated tolerances.
pub fn weighted_rms_norm(v: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(v.len(), weights.len());
    if v.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    for (x, w) in v.iter().zip(weights.iter()) {
        let scaled = x / w;
        sum += scaled * scaled;
    }
    (sum / v.len() as f64).sqrt()
}

/// Infinity norm: the largest absolute component, 0.0 for empty input.
pub fn max_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}
