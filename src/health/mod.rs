//! Health Prober: HealthSample table and the scheduling and probe-dispatch
//! logic that keeps it current.

pub mod probe;
pub mod ticker;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::crd::ObjectId;

/// Identifies one `(config, record, target)` triple.
pub type TargetId = (ObjectId, usize, usize);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HealthStatus {
    Up,
    Down,
    /// Never completed a probe since the target first appeared; treated as
    /// `Down` for zone eligibility (fail-closed).
    Unknown,
}

#[derive(Clone, Debug)]
pub struct HealthSample {
    pub status: HealthStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl HealthSample {
    fn unknown() -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_checked: None,
            consecutive_failures: 0,
        }
    }

    /// Eligible iff `up`; `unknown` counts as `down`.
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

/// Immutable point-in-time copy of the HealthSample table, published once
/// per completed tick.
pub type HealthSnapshot = std::sync::Arc<HashMap<TargetId, HealthSample>>;

/// Written only by the Prober, read only via `snapshot()`.
#[derive(Default)]
pub struct HealthTable {
    samples: RwLock<HashMap<TargetId, HealthSample>>,
}

impl HealthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles the table against the current set of targets: new targets
    /// get an `Unknown` sample, targets no longer present are removed
    /// entirely. Must run before dispatching probes for a tick.
    pub fn reconcile(&self, current: &HashSet<TargetId>) {
        let mut samples = self.samples.write().unwrap();
        samples.retain(|id, _| current.contains(id));
        for id in current {
            samples
                .entry(id.clone())
                .or_insert_with(HealthSample::unknown);
        }
    }

    pub fn record_success(&self, id: &TargetId, at: DateTime<Utc>) {
        let mut samples = self.samples.write().unwrap();
        if let Some(sample) = samples.get_mut(id) {
            sample.status = HealthStatus::Up;
            sample.consecutive_failures = 0;
            sample.last_checked = Some(at);
        }
    }

    pub fn record_failure(&self, id: &TargetId, at: DateTime<Utc>) {
        let mut samples = self.samples.write().unwrap();
        if let Some(sample) = samples.get_mut(id) {
            sample.status = HealthStatus::Down;
            sample.consecutive_failures += 1;
            sample.last_checked = Some(at);
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        std::sync::Arc::new(self.samples.read().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> TargetId {
        (("default".to_string(), "a".to_string()), 0, n)
    }

    #[test]
    fn new_target_starts_unknown() {
        let table = HealthTable::new();
        let mut current = HashSet::new();
        current.insert(id(0));
        table.reconcile(&current);
        let snap = table.snapshot();
        assert_eq!(snap.get(&id(0)).unwrap().status, HealthStatus::Unknown);
        assert!(!snap.get(&id(0)).unwrap().is_up());
    }

    #[test]
    fn removed_target_drops_sample() {
        let table = HealthTable::new();
        let mut current = HashSet::new();
        current.insert(id(0));
        table.reconcile(&current);
        table.reconcile(&HashSet::new());
        assert!(table.snapshot().get(&id(0)).is_none());
    }

    #[test]
    fn success_then_failure_transitions_immediately() {
        let table = HealthTable::new();
        let mut current = HashSet::new();
        current.insert(id(0));
        table.reconcile(&current);

        table.record_success(&id(0), Utc::now());
        assert!(table.snapshot().get(&id(0)).unwrap().is_up());

        table.record_failure(&id(0), Utc::now());
        let snap = table.snapshot();
        let sample = snap.get(&id(0)).unwrap();
        assert!(!sample.is_up());
        assert_eq!(sample.consecutive_failures, 1);
    }

    #[test]
    fn consecutive_failures_increment_and_reset() {
        let table = HealthTable::new();
        let mut current = HashSet::new();
        current.insert(id(0));
        table.reconcile(&current);

        table.record_failure(&id(0), Utc::now());
        table.record_failure(&id(0), Utc::now());
        assert_eq!(
            table.snapshot().get(&id(0)).unwrap().consecutive_failures,
            2
        );

        table.record_success(&id(0), Utc::now());
        assert_eq!(
            table.snapshot().get(&id(0)).unwrap().consecutive_failures,
            0
        );
    }
}
