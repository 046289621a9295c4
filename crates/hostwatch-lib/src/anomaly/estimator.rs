//! Exponentially weighted baseline estimation
//!
//! Maintains an adaptive mean and variance for one metric stream in
//! constant memory, and scores new samples against it.

/// Default smoothing factor
pub const DEFAULT_ALPHA: f64 = 0.01;

/// Default variance floor below which z-scores are reported as zero
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// EWMA mean/variance estimator for a single metric
#[derive(Debug, Clone)]
pub struct EwmaEstimator {
    /// Smoothing factor in (0, 1); smaller adapts slower
    alpha: f64,
    /// Variance guard
    epsilon: f64,
    mean: f64,
    variance: f64,
    initialized: bool,
}

impl EwmaEstimator {
    /// Create an estimator; `alpha` must lie in (0, 1) and `epsilon` be positive.
    /// Callers validate these through [`DetectorConfig`](super::DetectorConfig).
    pub fn new(alpha: f64, epsilon: f64) -> Self {
        Self {
            alpha,
            epsilon,
            mean: 0.0,
            variance: 0.0,
            initialized: false,
        }
    }

    /// Incorporate one sample
    pub fn update(&mut self, x: f64) {
        if !self.initialized {
            self.mean = x;
            self.variance = 0.0;
            self.initialized = true;
            return;
        }

        let delta = x - self.mean;
        self.mean += self.alpha * delta;
        self.variance = self.alpha * delta * delta + (1.0 - self.alpha) * self.variance;
    }

    /// Signed number of standard deviations `x` lies from the current mean
    ///
    /// Returns 0 before the first sample and while the variance is below
    /// epsilon, so a perfectly flat stream never amplifies noise.
    pub fn z_score(&self, x: f64) -> f64 {
        if !self.initialized || self.variance < self.epsilon {
            return 0.0;
        }
        (x - self.mean) / (self.variance + self.epsilon).sqrt()
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Default for EwmaEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA, DEFAULT_EPSILON)
    }
}
