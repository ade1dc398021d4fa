//! Exponentially weighted mean and variance

/// Floor for the variance when computing z-scores
const MIN_VARIANCE: f32 = 1e-12;

/// Exponential moving average and variance with a z-score of the latest sample
///
/// The z-score is taken against the statistics *before* the sample is folded in,
/// so a single outlier after a stable baseline stands out clearly.
///
/// # Example
/// ```
/// # use lumen_core::analyzer::EmaTracker;
/// let mut ema = EmaTracker::with_window(3);
/// for _ in 0..10 {
///     ema.update(1.0);
/// }
/// assert_eq!(ema.z_score(), 0.0);
/// ema.update(5.0);
/// assert!(ema.z_score() > 100.0);
/// ```
#[derive(Debug, Clone)]
pub struct EmaTracker {
    alpha: f32,
    ema: f32,
    variance: f32,
    z_score: f32,
    initialized: bool,
}

impl EmaTracker {
    /// `alpha` is the weight of a new sample, in `(0, 1]`
    pub fn new(alpha: f32) -> EmaTracker {
        EmaTracker {
            alpha: alpha.max(f32::EPSILON).min(1.0),
            ema: 0.0,
            variance: 0.0,
            z_score: 0.0,
            initialized: false,
        }
    }

    /// Smoothing roughly equivalent to an `n` sample moving average
    pub fn with_window(n: usize) -> EmaTracker {
        EmaTracker::new(2.0 / (n as f32 + 1.0))
    }

    pub fn update(&mut self, x: f32) -> f32 {
        if !self.initialized {
            self.ema = x;
            self.variance = 0.0;
            self.z_score = 0.0;
            self.initialized = true;
            return self.z_score;
        }

        let diff = x - self.ema;
        self.z_score = diff / self.variance.max(MIN_VARIANCE).sqrt();

        let incr = self.alpha * diff;
        self.ema += incr;
        self.variance = (1.0 - self.alpha) * (self.variance + diff * incr);

        self.z_score
    }

    pub fn ema(&self) -> f32 {
        self.ema
    }

    pub fn variance(&self) -> f32 {
        self.variance
    }

    /// Z-score of the most recent sample, 0 until the tracker has seen one
    pub fn z_score(&self) -> f32 {
        self.z_score
    }

    pub fn reset(&mut self) {
        *self = EmaTracker::new(self.alpha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseeded() {
        let ema = EmaTracker::new(0.3);
        assert_eq!(ema.z_score(), 0.0);
        assert_eq!(ema.ema(), 0.0);
    }

    #[test]
    fn test_first_update_seeds() {
        let mut ema = EmaTracker::new(0.3);
        assert_eq!(ema.update(42.0), 0.0);
        assert_eq!(ema.ema(), 42.0);
        assert_eq!(ema.variance(), 0.0);
    }

    #[test]
    fn test_constant_converges() {
        let mut ema = EmaTracker::new(0.2);
        ema.update(0.0);
        for _ in 0..200 {
            ema.update(3.0);
        }
        assert!((ema.ema() - 3.0).abs() < 1e-3);
        assert!(ema.z_score().abs() < 0.01);
    }

    #[test]
    fn test_single_outlier() {
        let mut ema = EmaTracker::with_window(3);
        for i in 0..100 {
            ema.update(if i % 2 == 0 { 1.0 } else { 1.1 });
        }
        let baseline = ema.z_score().abs();
        assert!(baseline < 2.0);

        let spike = ema.update(50.0);
        assert!(spike > 50.0, "spike z = {}", spike);

        let after = ema.update(1.0);
        assert!(after.abs() < 2.0, "after z = {}", after);
    }
}
