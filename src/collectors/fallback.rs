use rand::Rng;

/// Baseline value perturbed by up to `± fraction × baseline`, never negative
pub fn jittered(baseline: f64, fraction: f64) -> f64 {
    jittered_with(&mut rand::thread_rng(), baseline, fraction)
}

pub fn jittered_with<R: Rng + ?Sized>(rng: &mut R, baseline: f64, fraction: f64) -> f64 {
    let spread = (baseline * fraction).abs();
    if spread == 0.0 || !spread.is_finite() {
        return baseline.max(0.0);
    }
    (baseline + rng.gen_range(-spread..=spread)).max(0.0)
}
