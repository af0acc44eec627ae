// THEORY:
// A `TemporalCache` is the memory of a single cell. It keeps the cell's recent
// brightness ratios as `(timestamp, ratio)` samples and forgets anything older
// than a fixed duration. Unlike a fixed-length history, the window is bounded
// by time, so a slow frame rate yields a short window instead of a stale one.
//
// Invariants:
// - Samples are ordered by timestamp. An out-of-order append is inserted at its
//   sorted position.
// - After `prune(now)`, every retained sample satisfies `now - t <= duration`.

use std::collections::VecDeque;

/// One brightness observation of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessSample {
    /// Seconds on the owning session's clock.
    pub timestamp: f64,
    /// Bright-pixel ratio in `[0, 1]`.
    pub ratio: f64,
}

/// Time-bounded sliding window of samples for one cell.
#[derive(Debug, Clone)]
pub struct TemporalCache {
    duration: f64,
    samples: VecDeque<BrightnessSample>,
}

impl TemporalCache {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration: duration_secs,
            samples: VecDeque::new(),
        }
    }

    pub fn append(&mut self, timestamp: f64, ratio: f64) {
        let sample = BrightnessSample { timestamp, ratio };
        match self.samples.back() {
            Some(last) if last.timestamp > timestamp => {
                let at = self.samples.partition_point(|s| s.timestamp <= timestamp);
                self.samples.insert(at, sample);
            }
            _ => self.samples.push_back(sample),
        }
    }

    /// Drops every sample older than the window duration relative to `now`.
    pub fn prune(&mut self, now: f64) {
        while let Some(front) = self.samples.front() {
            if now - front.timestamp > self.duration {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// The retained ratios in timestamp order.
    pub fn snapshot(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.ratio).collect()
    }

    pub fn samples(&self) -> impl Iterator<Item = &BrightnessSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_keeps_only_samples_within_duration() {
        let mut cache = TemporalCache::new(4.0);
        for i in 0..10 {
            cache.append(100.0 + i as f64, i as f64 / 100.0);
        }
        cache.prune(109.0);

        // 105..=109 are within 4 seconds of 109.
        assert_eq!(cache.snapshot(), vec![0.05, 0.06, 0.07, 0.08, 0.09]);
        assert!(cache.samples().all(|s| 109.0 - s.timestamp <= 4.0));
    }

    #[test]
    fn sample_exactly_at_boundary_is_kept() {
        let mut cache = TemporalCache::new(4.0);
        cache.append(10.0, 0.5);
        cache.prune(14.0);
        assert_eq!(cache.len(), 1);
        cache.prune(14.001);
        assert!(cache.is_empty());
    }

    #[test]
    fn out_of_order_append_preserves_ordering() {
        let mut cache = TemporalCache::new(10.0);
        cache.append(1.0, 0.1);
        cache.append(3.0, 0.3);
        cache.append(2.0, 0.2);
        cache.append(3.0, 0.35);
        let stamps: Vec<f64> = cache.samples().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![1.0, 2.0, 3.0, 3.0]);
        assert_eq!(cache.snapshot(), vec![0.1, 0.2, 0.3, 0.35]);
    }

    #[test]
    fn prune_on_empty_cache_is_a_no_op() {
        let mut cache = TemporalCache::new(4.0);
        cache.prune(1_000.0);
        assert!(cache.snapshot().is_empty());
    }
}
