//! In-flight load tracking.

use dashmap::DashMap;
use router_core::{AgentId, LoadLevel};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Tracks in-flight requests per agent.
///
/// The selector increments a counter only when it returns a successful
/// selection; the outcome recorder decrements it when the matching outcome
/// arrives. The capacity bound is a scoring parameter, not a hard ceiling:
/// counts above capacity are allowed and simply classify as overloaded.
pub struct LoadTracker {
    counters: DashMap<AgentId, AtomicU32>,
    capacity: u32,
}

impl LoadTracker {
    /// Create a tracker with the given per-agent capacity bound.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            counters: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// The configured capacity bound.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Record a dispatched request.
    pub fn increment(&self, agent_id: AgentId) {
        let count = self
            .counters
            .entry(agent_id)
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        debug!(agent_id = %agent_id, in_flight = count, "Load incremented");
    }

    /// Record a completed request, flooring at zero.
    pub fn decrement(&self, agent_id: AgentId) {
        if let Some(counter) = self.counters.get(&agent_id) {
            let mut current = counter.load(Ordering::SeqCst);
            while current > 0 {
                match counter.compare_exchange(
                    current,
                    current - 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => {
                        debug!(agent_id = %agent_id, in_flight = current - 1, "Load decremented");
                        return;
                    }
                    Err(observed) => current = observed,
                }
            }
        }
    }

    /// Current in-flight count for an agent.
    #[must_use]
    pub fn count(&self, agent_id: AgentId) -> u32 {
        self.counters
            .get(&agent_id)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// In-flight count over capacity.
    #[must_use]
    pub fn ratio(&self, agent_id: AgentId) -> f64 {
        f64::from(self.count(agent_id)) / f64::from(self.capacity)
    }

    /// Qualitative load band for an agent.
    #[must_use]
    pub fn load_level(&self, agent_id: AgentId) -> LoadLevel {
        LoadLevel::from_ratio(self.ratio(agent_id))
    }

    /// Sum of in-flight counts across every agent.
    #[must_use]
    pub fn total_in_flight(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| u64::from(c.load(Ordering::SeqCst)))
            .sum()
    }

    /// Snapshot of the current load distribution.
    #[must_use]
    pub fn distribution(&self) -> HashMap<AgentId, u32> {
        self.counters
            .iter()
            .map(|entry| (*entry.key(), entry.load(Ordering::SeqCst)))
            .collect()
    }

    /// For testing and restore: force a counter to a value.
    pub fn set_count(&self, agent_id: AgentId, count: u32) {
        self.counters
            .entry(agent_id)
            .or_insert_with(|| AtomicU32::new(0))
            .store(count, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_decrement() {
        let tracker = LoadTracker::new(10);
        let agent = AgentId::new();

        assert_eq!(tracker.count(agent), 0);
        tracker.increment(agent);
        tracker.increment(agent);
        assert_eq!(tracker.count(agent), 2);

        tracker.decrement(agent);
        assert_eq!(tracker.count(agent), 1);
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let tracker = LoadTracker::new(10);
        let agent = AgentId::new();

        tracker.decrement(agent);
        assert_eq!(tracker.count(agent), 0);

        tracker.increment(agent);
        tracker.decrement(agent);
        tracker.decrement(agent);
        assert_eq!(tracker.count(agent), 0);
    }

    #[test]
    fn test_ratio_and_levels() {
        let tracker = LoadTracker::new(10);
        let agent = AgentId::new();

        assert_eq!(tracker.load_level(agent), LoadLevel::Low);

        tracker.set_count(agent, 5);
        assert!((tracker.ratio(agent) - 0.5).abs() < f64::EPSILON);
        assert_eq!(tracker.load_level(agent), LoadLevel::Medium);

        tracker.set_count(agent, 8);
        assert_eq!(tracker.load_level(agent), LoadLevel::High);

        tracker.set_count(agent, 9);
        assert_eq!(tracker.load_level(agent), LoadLevel::Overloaded);

        // Counts above capacity are allowed.
        tracker.set_count(agent, 14);
        assert!((tracker.ratio(agent) - 1.4).abs() < f64::EPSILON);
        assert_eq!(tracker.load_level(agent), LoadLevel::Overloaded);
    }

    #[test]
    fn test_total_and_distribution() {
        let tracker = LoadTracker::new(10);
        let a1 = AgentId::new();
        let a2 = AgentId::new();

        tracker.increment(a1);
        tracker.increment(a1);
        tracker.increment(a2);

        assert_eq!(tracker.total_in_flight(), 3);
        let distribution = tracker.distribution();
        assert_eq!(distribution[&a1], 2);
        assert_eq!(distribution[&a2], 1);
    }

    #[test]
    fn test_concurrent_counting() {
        use std::sync::Arc;

        let tracker = Arc::new(LoadTracker::new(10));
        let agent = AgentId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.increment(agent);
                    }
                    for _ in 0..50 {
                        tracker.decrement(agent);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.count(agent), 8 * 50);
    }
}
