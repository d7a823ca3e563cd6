//! Circuit breaker pattern implementation.
//!
//! Each agent carries a breaker that excludes it from candidate sets
//! after repeated failures and gradually re-admits it. Outcome recording
//! only moves counters; state transitions happen on threshold crossings
//! (arming the retry time) and during filter scans, so two concurrent
//! filters cannot both move a breaker out of OPEN.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use router_core::AgentId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Agent is excluded from candidacy.
    Open,
    /// Agent is provisionally re-admitted while recovery is tested.
    HalfOpen,
}

impl CircuitState {
    /// Stable string form used in persistence.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    /// Parse from the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLOSED" => Some(Self::Closed),
            "OPEN" => Some(Self::Open),
            "HALF_OPEN" => Some(Self::HalfOpen),
            _ => None,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures before the breaker opens.
    pub failure_threshold: u32,
    /// Successes required to close a half-open breaker.
    pub success_threshold: u32,
    /// How long an open breaker waits before admitting a probe.
    pub recovery_timeout: std::time::Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: std::time::Duration::from_millis(60_000),
        }
    }
}

/// Point-in-time view of one breaker, also the durable row shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    /// The gated agent.
    pub agent_id: AgentId,
    /// Current state.
    pub state: CircuitState,
    /// Accumulated failures.
    pub failure_count: u32,
    /// Accumulated successes (meaningful in HALF_OPEN).
    pub success_count: u32,
    /// When the last failure was recorded.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// When an open breaker next admits a probe.
    pub next_retry_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    next_retry_time: Option<DateTime<Utc>>,
}

/// Circuit breaker for a single agent.
pub struct CircuitBreaker {
    agent_id: AgentId,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(agent_id: AgentId, config: CircuitBreakerConfig) -> Self {
        Self {
            agent_id,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                next_retry_time: None,
            }),
        }
    }

    /// Restore a breaker from a durable snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &CircuitBreakerSnapshot, config: CircuitBreakerConfig) -> Self {
        Self {
            agent_id: snapshot.agent_id,
            config,
            inner: Mutex::new(BreakerInner {
                state: snapshot.state,
                failure_count: snapshot.failure_count,
                success_count: snapshot.success_count,
                last_failure_time: snapshot.last_failure_time,
                next_retry_time: snapshot.next_retry_time,
            }),
        }
    }

    /// The gated agent.
    #[must_use]
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Record a successful execution. Moves the counter only; the
    /// transition scan closes the breaker once the threshold is reached.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.success_count += 1;
        if inner.state == CircuitState::HalfOpen {
            debug!(
                agent_id = %self.agent_id,
                successes = inner.success_count,
                threshold = self.config.success_threshold,
                "Half-open success recorded"
            );
        }
    }

    /// Record a failed execution at the given instant.
    ///
    /// Threshold crossings that require arming `next_retry_time` happen
    /// here: CLOSED breakers open at the failure threshold, and any
    /// half-open failure reopens immediately.
    pub fn record_failure(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(now);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.open_locked(&mut inner, now);
                }
            }
            CircuitState::HalfOpen => {
                inner.success_count = 0;
                self.open_locked(&mut inner, now);
            }
            CircuitState::Open => {}
        }
    }

    /// Whether the agent may be offered traffic at the given instant.
    ///
    /// An OPEN breaker whose retry time has elapsed transitions to
    /// HALF_OPEN inside this call; the transition is keyed on the observed
    /// state, so a concurrent caller's transition is a no-op.
    pub fn allow_request(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match inner.next_retry_time {
                Some(retry) if now >= retry => {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    info!(agent_id = %self.agent_id, "Circuit breaker half-open, probing");
                    true
                }
                _ => false,
            },
        }
    }

    /// Apply scan-driven transitions: CLOSED→OPEN at the failure
    /// threshold and HALF_OPEN→CLOSED at the success threshold.
    /// Returns true when the state changed.
    pub fn apply_transitions(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                self.open_locked(&mut inner, now);
                true
            }
            CircuitState::HalfOpen if inner.success_count >= self.config.success_threshold => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.next_retry_time = None;
                info!(agent_id = %self.agent_id, "Circuit breaker closed");
                true
            }
            _ => false,
        }
    }

    /// Point-in-time snapshot for persistence or reporting.
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock();
        CircuitBreakerSnapshot {
            agent_id: self.agent_id,
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_time,
            next_retry_time: inner.next_retry_time,
        }
    }

    fn open_locked(&self, inner: &mut BreakerInner, now: DateTime<Utc>) {
        inner.state = CircuitState::Open;
        inner.next_retry_time = Some(
            now + Duration::milliseconds(self.config.recovery_timeout.as_millis() as i64),
        );
        warn!(
            agent_id = %self.agent_id,
            failures = inner.failure_count,
            "Circuit breaker opened"
        );
    }
}

/// Registry of per-agent circuit breakers.
///
/// Agents without a breaker row are treated as CLOSED: a breaker is only
/// materialized on first use.
pub struct BreakerRegistry {
    breakers: DashMap<AgentId, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Fetch or create the breaker for an agent.
    #[must_use]
    pub fn get_or_create(&self, agent_id: AgentId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(agent_id)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(agent_id, self.config.clone())))
            .clone()
    }

    /// Fetch the breaker for an agent if one has been materialized.
    #[must_use]
    pub fn get(&self, agent_id: AgentId) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(&agent_id).map(|b| b.value().clone())
    }

    /// Restore breakers from durable snapshots at startup.
    pub fn restore(&self, snapshots: Vec<CircuitBreakerSnapshot>) {
        for snapshot in snapshots {
            let breaker = CircuitBreaker::from_snapshot(&snapshot, self.config.clone());
            self.breakers.insert(snapshot.agent_id, Arc::new(breaker));
        }
    }

    /// Split candidates into eligible and rejected at the given instant.
    ///
    /// Candidates without a breaker row pass. OPEN breakers whose retry
    /// time has elapsed become HALF_OPEN inside this call.
    #[must_use]
    pub fn filter(&self, candidates: &[AgentId], now: DateTime<Utc>) -> Vec<AgentId> {
        candidates
            .iter()
            .copied()
            .filter(|agent_id| match self.breakers.get(agent_id) {
                Some(breaker) => breaker.allow_request(now),
                None => true,
            })
            .collect()
    }

    /// Run scan-driven transitions across all breakers. Returns the ids
    /// whose state changed.
    pub fn apply_transitions(&self, now: DateTime<Utc>) -> Vec<AgentId> {
        self.breakers
            .iter()
            .filter(|entry| entry.apply_transitions(now))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Snapshots of every materialized breaker.
    #[must_use]
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers.iter().map(|entry| entry.snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
    }

    #[test]
    fn test_initial_state_closed() {
        let breaker = CircuitBreaker::new(AgentId::new(), config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request(Utc::now()));
    }

    #[test]
    fn test_opens_at_failure_threshold() {
        let breaker = CircuitBreaker::new(AgentId::new(), config());
        let now = Utc::now();

        for _ in 0..4 {
            breaker.record_failure(now);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure(now);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request(now));

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.failure_count, 5);
        assert_eq!(
            snapshot.next_retry_time.unwrap(),
            now + Duration::milliseconds(60_000)
        );
    }

    #[test]
    fn test_open_transitions_half_open_after_retry_time() {
        let breaker = CircuitBreaker::new(AgentId::new(), config());
        let now = Utc::now();
        for _ in 0..5 {
            breaker.record_failure(now);
        }

        // Before the retry time: still rejected.
        assert!(!breaker.allow_request(now + Duration::seconds(30)));
        assert_eq!(breaker.state(), CircuitState::Open);

        // After the retry time: admitted and half-open.
        assert!(breaker.allow_request(now + Duration::seconds(61)));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // A second filter call sees HALF_OPEN and passes through.
        assert!(breaker.allow_request(now + Duration::seconds(61)));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_after_successes() {
        let breaker = CircuitBreaker::new(AgentId::new(), config());
        let now = Utc::now();
        for _ in 0..5 {
            breaker.record_failure(now);
        }
        assert!(breaker.allow_request(now + Duration::seconds(61)));

        breaker.record_success();
        breaker.record_success();
        assert!(!breaker.apply_transitions(now + Duration::seconds(62)));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert!(breaker.apply_transitions(now + Duration::seconds(63)));
        assert_eq!(breaker.state(), CircuitState::Closed);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(AgentId::new(), config());
        let now = Utc::now();
        for _ in 0..5 {
            breaker.record_failure(now);
        }
        assert!(breaker.allow_request(now + Duration::seconds(61)));
        breaker.record_success();

        let failure_time = now + Duration::seconds(62);
        breaker.record_failure(failure_time);
        assert_eq!(breaker.state(), CircuitState::Open);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.success_count, 0);
        assert_eq!(
            snapshot.next_retry_time.unwrap(),
            failure_time + Duration::milliseconds(60_000)
        );
    }

    #[test]
    fn test_registry_filter_treats_unknown_as_closed() {
        let registry = BreakerRegistry::new(config());
        let a1 = AgentId::new();
        let a2 = AgentId::new();
        let now = Utc::now();

        // a2 is broken; a1 has no breaker row.
        let breaker = registry.get_or_create(a2);
        for _ in 0..5 {
            breaker.record_failure(now);
        }

        let eligible = registry.filter(&[a1, a2], now);
        assert_eq!(eligible, vec![a1]);

        // After the recovery timeout the filter itself re-admits a2.
        let eligible = registry.filter(&[a1, a2], now + Duration::seconds(61));
        assert_eq!(eligible, vec![a1, a2]);
        assert_eq!(registry.get(a2).unwrap().state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_registry_apply_transitions() {
        let registry = BreakerRegistry::new(config());
        let agent = AgentId::new();
        let now = Utc::now();

        let breaker = registry.get_or_create(agent);
        for _ in 0..5 {
            breaker.record_failure(now);
        }
        assert!(breaker.allow_request(now + Duration::seconds(61)));
        for _ in 0..3 {
            breaker.record_success();
        }

        let changed = registry.apply_transitions(now + Duration::seconds(62));
        assert_eq!(changed, vec![agent]);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_restore_from_snapshot() {
        let agent = AgentId::new();
        let now = Utc::now();
        let snapshot = CircuitBreakerSnapshot {
            agent_id: agent,
            state: CircuitState::Open,
            failure_count: 7,
            success_count: 0,
            last_failure_time: Some(now),
            next_retry_time: Some(now + Duration::seconds(30)),
        };

        let registry = BreakerRegistry::new(config());
        registry.restore(vec![snapshot]);

        let breaker = registry.get(agent).unwrap();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request(now));
        assert!(breaker.allow_request(now + Duration::seconds(31)));
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in [CircuitState::Closed, CircuitState::Open, CircuitState::HalfOpen] {
            assert_eq!(CircuitState::parse(state.as_str()), Some(state));
        }
        assert_eq!(CircuitState::parse("BROKEN"), None);
    }
}
