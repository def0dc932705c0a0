//! # Runtime-Id Tracking
//!
//! Last sequence seen per publisher runtime id, used to count lost events.
//!
//! ## Bound
//!
//! - Soft capacity of `MAX_PUBLISHERS_COUNT` entries
//! - Pruning starts only once the table exceeds capacity plus a slack of 10
//! - Pruning evicts least recently seen entries until the table is back at
//!   capacity, never the id being recorded
//!
//! Eviction only costs loss-counting accuracy for the evicted id; delivery is
//! unaffected.

use crate::{MAX_PUBLISHERS_COUNT, PRUNE_SLACK};
use events_types::Sequence;
use std::collections::HashMap;

/// What is remembered about one runtime id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEntry {
    /// Last delivered sequence.
    pub sequence: Sequence,
    /// When that sequence was delivered, in seconds since the Unix epoch.
    pub last_seen_secs: u64,
}

/// Bounded table of [`TrackEntry`] by runtime id.
#[derive(Debug)]
pub struct RuntimeIdTracker {
    entries: HashMap<String, TrackEntry>,
    capacity: usize,
    slack: usize,
}

impl RuntimeIdTracker {
    /// Create a tracker with the default bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_PUBLISHERS_COUNT, PRUNE_SLACK)
    }

    /// Create a tracker with a custom bound.
    #[must_use]
    pub fn with_capacity(capacity: usize, slack: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            slack,
        }
    }

    /// Look up a runtime id.
    #[must_use]
    pub fn get(&self, runtime_id: &str) -> Option<&TrackEntry> {
        self.entries.get(runtime_id)
    }

    /// Record a delivered sequence. Prunes when the table grows past its
    /// bound and returns how many entries were evicted.
    pub fn record(&mut self, runtime_id: &str, sequence: Sequence, now_secs: u64) -> usize {
        let entry = TrackEntry {
            sequence,
            last_seen_secs: now_secs,
        };
        match self.entries.get_mut(runtime_id) {
            Some(existing) => {
                *existing = entry;
                0
            }
            None => {
                self.entries.insert(runtime_id.to_string(), entry);
                if self.entries.len() > self.capacity + self.slack {
                    self.evict_down_to_capacity(Some(runtime_id))
                } else {
                    0
                }
            }
        }
    }

    /// Forget a runtime id. `true` if it was tracked.
    pub fn remove(&mut self, runtime_id: &str) -> bool {
        self.entries.remove(runtime_id).is_some()
    }

    /// Evict least recently seen entries down to capacity.
    pub fn prune(&mut self) -> usize {
        self.evict_down_to_capacity(None)
    }

    fn evict_down_to_capacity(&mut self, keep: Option<&str>) -> usize {
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return 0;
        }

        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != keep)
            .map(|(id, e)| (e.last_seen_secs, id.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(secs, _)| *secs);

        let evicted = by_age.len().min(excess);
        for (_, id) in by_age.into_iter().take(excess) {
            self.entries.remove(&id);
        }
        tracing::debug!(evicted, remaining = self.entries.len(), "Pruned runtime-id table");
        evicted
    }

    /// Number of tracked runtime ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RuntimeIdTracker {
    fn default() -> Self {
        Self::new()
    }
}
