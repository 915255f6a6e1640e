//! Bounded response history with rolling statistics and severity classification.

use std::collections::VecDeque;

use pingthing_types::{
    config::clamp_history_size,
    sample::{Sample, SeverityBand},
};
use serde::{Deserialize, Serialize};

/// Band thresholds in milliseconds. They stack: the medium band spans
/// `fast..fast + medium` and the slow band starts after that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub fast_ms: f64,
    pub medium_ms: f64,
    pub slow_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fast_ms: 40.0,
            medium_ms: 100.0,
            slow_ms: 200.0,
        }
    }
}

/// Fill fraction (0.0..=1.0) of each stacked portion of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BarFill {
    pub fast: f64,
    pub medium: f64,
    pub slow: f64,
}

impl Thresholds {
    pub fn band_for_ms(&self, ms: f64) -> SeverityBand {
        if ms <= self.fast_ms {
            SeverityBand::Fast
        } else if ms <= self.fast_ms + self.medium_ms {
            SeverityBand::Medium
        } else {
            SeverityBand::Slow
        }
    }

    pub fn fill_for_ms(&self, ms: f64) -> BarFill {
        let ms = ms.max(0.0);
        match self.band_for_ms(ms) {
            SeverityBand::Fast => BarFill {
                fast: ms / self.fast_ms,
                ..BarFill::default()
            },
            SeverityBand::Medium => BarFill {
                fast: 1.0,
                medium: (ms - self.fast_ms) / self.medium_ms,
                slow: 0.0,
            },
            _ => BarFill {
                fast: 1.0,
                medium: 1.0,
                slow: ((ms - self.fast_ms - self.medium_ms) / self.slow_ms).min(1.0),
            },
        }
    }
}

/// Fixed-capacity FIFO of probe samples.
#[derive(Debug, Clone)]
pub struct ResponseHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
    thresholds: Thresholds,
}

impl ResponseHistory {
    pub fn new(capacity: usize) -> Self {
        Self::with_thresholds(capacity, Thresholds::default())
    }

    pub fn with_thresholds(capacity: usize, thresholds: Thresholds) -> Self {
        let capacity = clamp_history_size(capacity);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            thresholds,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    pub fn record(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        self.evict_overflow();
    }

    /// Clamps to the supported range; shrinking drops the oldest samples.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = clamp_history_size(capacity);
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Mean round trip in seconds over retained replies. Timeouts are excluded.
    pub fn average(&self) -> Option<f64> {
        let (sum, count) = self
            .samples
            .iter()
            .filter(|sample| !sample.is_timeout)
            .filter_map(|sample| sample.round_trip_secs)
            .fold((0.0, 0usize), |(sum, count), secs| (sum + secs, count + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    pub fn average_ms(&self) -> Option<f64> {
        self.average().map(|secs| secs * 1000.0)
    }

    pub fn timeout_count(&self) -> usize {
        self.samples.iter().filter(|sample| sample.is_timeout).count()
    }

    pub fn classify(&self, sample: &Sample) -> SeverityBand {
        match sample.round_trip_ms() {
            Some(ms) => self.thresholds.band_for_ms(ms),
            None => SeverityBand::Timeout,
        }
    }

    /// Stacked bar fill for rendering; `None` for timeouts, which always
    /// render in the failure color.
    pub fn fill(&self, sample: &Sample) -> Option<BarFill> {
        sample
            .round_trip_ms()
            .map(|ms| self.thresholds.fill_for_ms(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn record_keeps_most_recent_samples_in_order() {
        let mut history = ResponseHistory::new(16);
        for n in 0..40 {
            history.record(Sample::reply(n as f64));
            assert!(history.len() <= history.capacity());
        }
        let kept: Vec<f64> = history
            .samples()
            .filter_map(|sample| sample.round_trip_secs)
            .collect();
        let expected: Vec<f64> = (24..40).map(|n| n as f64).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn short_sequences_are_kept_whole() {
        let mut history = ResponseHistory::new(24);
        history.record(Sample::reply(0.01));
        history.record(Sample::timeout());
        assert_eq!(history.len(), 2);
        assert_eq!(history.timeout_count(), 1);
    }

    #[test]
    fn average_ignores_timeouts() {
        let mut history = ResponseHistory::new(16);
        assert_eq!(history.average(), None);

        history.record(Sample::reply(0.010));
        history.record(Sample::timeout());
        history.record(Sample::reply(0.020));
        history.record(Sample::reply(0.030));
        let avg = history.average_ms().expect("average");
        assert!(close(avg, 20.0), "avg was {avg}");

        let mut only_timeouts = ResponseHistory::new(16);
        only_timeouts.record(Sample::timeout());
        assert_eq!(only_timeouts.average(), None);
    }

    #[test]
    fn classification_uses_stacked_thresholds() {
        let thresholds = Thresholds::default();

        assert_eq!(thresholds.band_for_ms(30.0), SeverityBand::Fast);
        let fill = thresholds.fill_for_ms(30.0);
        assert!(close(fill.fast, 0.75));
        assert_eq!(fill.medium, 0.0);

        assert_eq!(thresholds.band_for_ms(70.0), SeverityBand::Medium);
        let fill = thresholds.fill_for_ms(70.0);
        assert_eq!(fill.fast, 1.0);
        assert!(close(fill.medium, 0.3));
        assert_eq!(fill.slow, 0.0);

        assert_eq!(thresholds.band_for_ms(120.0), SeverityBand::Medium);

        assert_eq!(thresholds.band_for_ms(350.0), SeverityBand::Slow);
        let fill = thresholds.fill_for_ms(350.0);
        assert_eq!(fill.medium, 1.0);
        assert_eq!(fill.slow, 1.0);
    }

    #[test]
    fn timeouts_bypass_classification() {
        let history = ResponseHistory::new(16);
        let timeout = Sample::timeout();
        assert_eq!(history.classify(&timeout), SeverityBand::Timeout);
        assert!(history.fill(&timeout).is_none());

        let reply = Sample::reply(0.030);
        assert_eq!(history.classify(&reply), SeverityBand::Fast);
        assert!(history.fill(&reply).is_some());
    }

    #[test]
    fn set_capacity_clamps_and_truncates_oldest() {
        let mut history = ResponseHistory::new(64);
        for n in 0..64 {
            history.record(Sample::reply(n as f64));
        }
        history.set_capacity(3);
        assert_eq!(history.capacity(), 16);
        assert_eq!(history.len(), 16);
        assert_eq!(
            history.samples().next().and_then(|s| s.round_trip_secs),
            Some(48.0)
        );

        history.set_capacity(1_000);
        assert_eq!(history.capacity(), 64);
        assert_eq!(history.len(), 16);
    }
}
