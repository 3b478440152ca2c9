//! Running statistics
//!
//! Incremental min/max/mean/variance over a stream of integer samples,
//! using Welford's method for the variance.

/// Running statistics accumulator
#[derive(Debug, Clone, Default)]
pub struct RunningStat {
    count: u32,
    min: i32,
    max: i32,
    mean: i32,
    fmean: f64,
    m2: f64,
}

impl RunningStat {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample
    pub fn update(&mut self, value: i32) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.fmean = value as f64;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value as f64 - self.fmean;
        self.fmean += delta / self.count as f64;
        self.mean = (self.fmean + 0.5).floor() as i32;
        self.m2 += delta * (value as f64 - self.fmean);
    }

    /// Number of samples
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Smallest sample, 0 when empty
    pub fn min(&self) -> i32 {
        self.min
    }

    /// Largest sample, 0 when empty
    pub fn max(&self) -> i32 {
        self.max
    }

    /// Rounded mean
    pub fn mean(&self) -> i32 {
        self.mean
    }

    /// Population standard deviation, rounded
    pub fn stddev(&self) -> i32 {
        if self.count == 0 {
            return 0;
        }
        (self.m2 / self.count as f64).sqrt().round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let stat = RunningStat::new();
        assert_eq!(stat.count(), 0);
        assert_eq!(stat.mean(), 0);
        assert_eq!(stat.stddev(), 0);
    }

    #[test]
    fn test_single_sample() {
        let mut stat = RunningStat::new();
        stat.update(42);
        assert_eq!(stat.min(), 42);
        assert_eq!(stat.max(), 42);
        assert_eq!(stat.mean(), 42);
        assert_eq!(stat.stddev(), 0);
    }

    #[test]
    fn test_known_distribution() {
        let mut stat = RunningStat::new();
        for v in [2, 4, 4, 4, 5, 5, 7, 9] {
            stat.update(v);
        }
        assert_eq!(stat.count(), 8);
        assert_eq!(stat.min(), 2);
        assert_eq!(stat.max(), 9);
        assert_eq!(stat.mean(), 5);
        assert_eq!(stat.stddev(), 2);
    }

    #[test]
    fn test_mean_rounds() {
        let mut stat = RunningStat::new();
        stat.update(1);
        stat.update(2);
        assert_eq!(stat.mean(), 2);
    }
}
