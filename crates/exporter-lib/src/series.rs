//! Stale series tracking
//!
//! Gauge series for pods and functions that disappear would otherwise stay
//! in the registry forever. The tracker remembers the last cycle each series
//! was set in and reports the ones that have gone quiet.

use std::collections::HashMap;

/// Labeled gauge families the sampler writes every cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    BootDuration,
    CpuUsage,
    MemoryUsage,
    ContainerStartedAt,
    PodCount,
    ScaledDifference,
}

/// Last-seen bookkeeping for published series
#[derive(Debug, Default)]
pub struct SeriesTracker {
    /// Cycles without a refresh before a series expires; 0 disables expiry
    stale_after: u64,
    last_seen: HashMap<(Family, Vec<String>), u64>,
}

impl SeriesTracker {
    pub fn new(stale_after: u64) -> Self {
        Self {
            stale_after,
            last_seen: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.stale_after > 0
    }

    /// Record that a series was set during `cycle`
    pub fn touch(&mut self, family: Family, labels: &[&str], cycle: u64) {
        if !self.is_enabled() {
            return;
        }
        let key = (family, labels.iter().map(|l| l.to_string()).collect());
        self.last_seen.insert(key, cycle);
    }

    /// Drain series not refreshed within the window ending at `cycle`
    pub fn expire(&mut self, cycle: u64) -> Vec<(Family, Vec<String>)> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let stale_after = self.stale_after;
        let mut expired = Vec::new();
        self.last_seen.retain(|key, last| {
            if cycle.saturating_sub(*last) >= stale_after {
                expired.push(key.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_tracker_never_expires() {
        let mut tracker = SeriesTracker::new(0);
        tracker.touch(Family::CpuUsage, &["ns", "pod", "fn"], 1);
        assert!(tracker.is_empty());
        assert!(tracker.expire(100).is_empty());
    }

    #[test]
    fn test_series_expires_after_missed_cycles() {
        let mut tracker = SeriesTracker::new(2);
        tracker.touch(Family::PodCount, &["knative", "foo", "default"], 1);
        tracker.touch(Family::PodCount, &["knative", "bar", "default"], 1);

        tracker.touch(Family::PodCount, &["knative", "foo", "default"], 2);
        assert!(tracker.expire(2).is_empty());

        tracker.touch(Family::PodCount, &["knative", "foo", "default"], 3);
        let expired = tracker.expire(3);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, Family::PodCount);
        assert_eq!(expired[0].1[1], "bar");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_families_are_tracked_separately() {
        let mut tracker = SeriesTracker::new(1);
        let labels = ["default", "foo-1", "foo"];
        tracker.touch(Family::CpuUsage, &labels, 1);
        tracker.touch(Family::MemoryUsage, &labels, 1);

        tracker.touch(Family::CpuUsage, &labels, 2);
        let expired = tracker.expire(2);
        let labels = vec!["default".to_string(), "foo-1".to_string(), "foo".to_string()];
        assert_eq!(expired, vec![(Family::MemoryUsage, labels)]);
    }
}
