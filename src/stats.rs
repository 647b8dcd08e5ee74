//! Streaming statistics over temperature values.

use std::ops::AddAssign;

use serde_derive::*;

/// Running count / mean / variance / extrema.
///
/// Values are folded in with `stats += value` and partial
/// accumulators (e.g. from rayon folds) merged with `stats
/// += &other`. Mean and variance use Welford's update and
/// Chan's merge.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            count: 0,
            mean: 0.,
            m2: 0.,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Stats {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn summary(&self) -> Option<RoiStatistics> {
        (!self.is_empty()).then(|| RoiStatistics {
            mean: self.mean,
            min: self.min,
            max: self.max,
            stddev: self.stddev(),
            count: self.count,
        })
    }
}

impl AddAssign<f64> for Stats {
    fn add_assign(&mut self, val: f64) {
        self.count += 1;
        let delta = val - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (val - self.mean);
        self.min = self.min.min(val);
        self.max = self.max.max(val);
    }
}

impl AddAssign<&Stats> for Stats {
    fn add_assign(&mut self, other: &Stats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let weight = other.count as f64 / count as f64;
        self.m2 += other.m2 + delta * delta * self.count as f64 * weight;
        self.mean += delta * weight;
        self.count = count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

/// Aggregate statistics of a region (or the whole grid).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RoiStatistics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates() {
        let mut stats = Stats::default();
        for v in [2., 4., 4., 4., 5., 5., 7., 9.] {
            stats += v;
        }
        assert_eq!(stats.count(), 8);
        assert!((stats.mean() - 5.).abs() < 1e-12);
        assert!((stats.stddev() - 2.).abs() < 1e-12);
        assert_eq!(stats.min(), 2.);
        assert_eq!(stats.max(), 9.);
    }

    #[test]
    fn merge_matches_sequential() {
        let values: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin() * 10. + 30.).collect();
        let mut all = Stats::default();
        values.iter().for_each(|v| all += *v);

        let (left, right) = values.split_at(37);
        let mut a = Stats::default();
        let mut b = Stats::default();
        left.iter().for_each(|v| a += *v);
        right.iter().for_each(|v| b += *v);
        a += &b;

        assert_eq!(a.count(), all.count());
        assert!((a.mean() - all.mean()).abs() < 1e-9);
        assert!((a.variance() - all.variance()).abs() < 1e-9);
        assert_eq!(a.min(), all.min());
        assert_eq!(a.max(), all.max());
    }

    #[test]
    fn empty_has_no_summary() {
        assert!(Stats::default().summary().is_none());
        let mut s = Stats::default();
        s += &Stats::default();
        assert!(s.is_empty());
    }
}
