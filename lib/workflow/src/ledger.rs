//! Execution Ledger: bounded history of executions.

use crate::execution::Execution;
use aura_core::ExecutionId;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Bounds on how much history the ledger keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of records.
    pub max_entries: usize,
    /// Finished records older than this are evicted.
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_age: None,
        }
    }
}

#[derive(Debug, Default)]
struct Entries {
    /// Insertion order, oldest first.
    order: VecDeque<ExecutionId>,
    records: HashMap<ExecutionId, Execution>,
}

impl Entries {
    fn evict(&mut self, id: ExecutionId) {
        self.records.remove(&id);
        self.order.retain(|candidate| *candidate != id);
    }
}

/// In-memory execution history.
///
/// Running executions are never evicted, and a finished record is never
/// overwritten.
#[derive(Debug, Default)]
pub struct ExecutionLedger {
    entries: RwLock<Entries>,
    policy: RetentionPolicy,
}

impl ExecutionLedger {
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            entries: RwLock::default(),
            policy,
        }
    }

    /// Inserts or replaces a record, then applies retention.
    ///
    /// Returns false if a finished record with the same id already exists.
    pub fn upsert(&self, execution: Execution) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entries = &mut *guard;
        match entries.records.get(&execution.id).map(|e| e.finished) {
            Some(true) => return false,
            Some(false) => {}
            None => entries.order.push_back(execution.id),
        }
        entries.records.insert(execution.id, execution);
        self.prune_locked(entries, Utc::now());
        true
    }

    #[must_use]
    pub fn get(&self, id: ExecutionId) -> Option<Execution> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .get(&id)
            .cloned()
    }

    /// Removes a record.
    pub fn remove(&self, id: ExecutionId) -> Option<Execution> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.records.remove(&id)?;
        entries.order.retain(|candidate| *candidate != id);
        Some(removed)
    }

    /// Returns all records, most recent first.
    #[must_use]
    pub fn list(&self) -> Vec<Execution> {
        self.recent(usize::MAX)
    }

    /// Returns up to `n` records, most recent first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<Execution> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .order
            .iter()
            .rev()
            .filter_map(|id| entries.records.get(id))
            .take(n)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies retention as of `now`, returning the number of evicted records.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.prune_locked(&mut entries, now)
    }

    fn prune_locked(&self, entries: &mut Entries, now: DateTime<Utc>) -> usize {
        let mut evicted = 0;

        if let Some(cutoff) = self
            .policy
            .max_age
            .and_then(|max_age| now.checked_sub_signed(max_age))
        {
            let expired: Vec<ExecutionId> = entries
                .order
                .iter()
                .filter(|id| {
                    entries.records.get(*id).is_some_and(|e| {
                        e.finished && e.stopped_at.is_some_and(|stopped| stopped < cutoff)
                    })
                })
                .copied()
                .collect();
            for id in expired {
                entries.evict(id);
                evicted += 1;
            }
        }

        while entries.records.len() > self.policy.max_entries {
            let oldest_finished = entries
                .order
                .iter()
                .find(|id| entries.records.get(*id).is_some_and(|e| e.finished))
                .copied();
            let Some(id) = oldest_finished else {
                break;
            };
            entries.evict(id);
            evicted += 1;
        }

        if evicted > 0 {
            debug!(evicted, remaining = entries.records.len(), "pruned execution ledger");
        }
        evicted
    }
}
