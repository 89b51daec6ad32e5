//! Flag registry: users under a standing suspicion flag.
//!
//! A flagged user cannot vote until a moderator clears the flag (or, with an
//! expiring [`FlagExpiry`] policy, until it lapses). Flags are raised on a
//! "block first, review later" basis: a `vote_manipulation` report or a
//! high-severity finding is enough to stop further votes while a human looks
//! at it. That is a hold pending review, not a verdict.

use crate::config::FlagExpiry;
use crate::types::FindingKind;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What raised a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlagSource {
    /// A vote_manipulation report against the user or one of their votes.
    Report {
        /// Report that raised the flag
        report_id: String,
    },
    /// A high-severity finding.
    Finding {
        /// Kind of finding
        kind: FindingKind,
    },
    /// An operator flagged the user directly.
    Manual {
        /// Operator id
        actor: String,
    },
}

/// A flagged user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEntry {
    /// Flagged user id.
    pub user_id: String,
    /// When the flag was raised, ms since epoch.
    pub flagged_at_ms: u64,
    /// What raised it.
    pub source: FlagSource,
}

/// Storage for flag entries. Swap in a durable implementation for production.
pub trait FlagStore: Send + Sync {
    /// Store `entry` unless the current entry for its user satisfies `keep`.
    /// Check and write are atomic per user. Returns true when `entry` was stored.
    fn insert_unless(&self, entry: FlagEntry, keep: &dyn Fn(&FlagEntry) -> bool) -> bool;
    /// Entry for `user_id`.
    fn get(&self, user_id: &str) -> Option<FlagEntry>;
    /// Remove and return the entry for `user_id`.
    fn remove(&self, user_id: &str) -> Option<FlagEntry>;
    /// Remove the entry for `user_id` only if it satisfies `pred`, atomically.
    fn remove_if(&self, user_id: &str, pred: &dyn Fn(&FlagEntry) -> bool) -> Option<FlagEntry>;
    /// All entries, unordered.
    fn entries(&self) -> Vec<FlagEntry>;
}

/// `DashMap`-backed flag store.
#[derive(Debug, Default)]
pub struct InMemoryFlagStore {
    entries: DashMap<String, FlagEntry>,
}

impl InMemoryFlagStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for InMemoryFlagStore {
    fn insert_unless(&self, entry: FlagEntry, keep: &dyn Fn(&FlagEntry) -> bool) -> bool {
        match self.entries.entry(entry.user_id.clone()) {
            Entry::Occupied(mut current) => {
                if keep(current.get()) {
                    return false;
                }
                current.insert(entry);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    fn get(&self, user_id: &str) -> Option<FlagEntry> {
        self.entries.get(user_id).map(|e| e.value().clone())
    }

    fn remove(&self, user_id: &str) -> Option<FlagEntry> {
        self.entries.remove(user_id).map(|(_, e)| e)
    }

    fn remove_if(&self, user_id: &str, pred: &dyn Fn(&FlagEntry) -> bool) -> Option<FlagEntry> {
        self.entries
            .remove_if(user_id, |_, e| pred(e))
            .map(|(_, e)| e)
    }

    fn entries(&self) -> Vec<FlagEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}

/// Flag registry with an expiry policy applied on every read.
pub struct FlagRegistry {
    store: Arc<dyn FlagStore>,
    expiry: FlagExpiry,
}

impl FlagRegistry {
    /// Registry over `store`.
    pub fn new(store: Arc<dyn FlagStore>, expiry: FlagExpiry) -> Self {
        Self { store, expiry }
    }

    /// Registry over a fresh in-memory store.
    pub fn in_memory(expiry: FlagExpiry) -> Self {
        Self::new(Arc::new(InMemoryFlagStore::new()), expiry)
    }

    fn active_entry(&self, user_id: &str, now_ms: u64) -> Option<FlagEntry> {
        self.store
            .get(user_id)
            .filter(|e| !self.expiry.is_expired(e.flagged_at_ms, now_ms))
    }

    /// Flag `user_id`. An active flag is left untouched; returns true when a
    /// new flag was raised.
    pub fn flag(&self, user_id: &str, source: FlagSource, now_ms: u64) -> bool {
        let entry = FlagEntry {
            user_id: user_id.to_string(),
            flagged_at_ms: now_ms,
            source: source.clone(),
        };
        let expiry = self.expiry;
        let raised = self.store.insert_unless(entry, &|current| {
            !expiry.is_expired(current.flagged_at_ms, now_ms)
        });
        if raised {
            tracing::warn!(user_id, ?source, "user flagged");
        }
        raised
    }

    /// Whether `user_id` is currently flagged.
    pub fn is_flagged(&self, user_id: &str, now_ms: u64) -> bool {
        self.active_entry(user_id, now_ms).is_some()
    }

    /// Active entry for `user_id`.
    pub fn get(&self, user_id: &str, now_ms: u64) -> Option<FlagEntry> {
        self.active_entry(user_id, now_ms)
    }

    /// Clear the flag on `user_id`, returning the removed entry.
    pub fn clear(&self, user_id: &str) -> Option<FlagEntry> {
        let removed = self.store.remove(user_id);
        if removed.is_some() {
            tracing::info!(user_id, "flag cleared");
        }
        removed
    }

    /// Clear the flag on `user_id` only if `source` raised it.
    pub fn clear_from(&self, user_id: &str, source: &FlagSource) -> Option<FlagEntry> {
        let removed = self.store.remove_if(user_id, &|e| &e.source == source);
        if removed.is_some() {
            tracing::info!(user_id, ?source, "flag released");
        }
        removed
    }

    /// Active flags, most recently raised first.
    pub fn active(&self, now_ms: u64) -> Vec<FlagEntry> {
        let mut entries: Vec<FlagEntry> = self
            .store
            .entries()
            .into_iter()
            .filter(|e| !self.expiry.is_expired(e.flagged_at_ms, now_ms))
            .collect();
        entries.sort_by(|a, b| {
            b.flagged_at_ms
                .cmp(&a.flagged_at_ms)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        entries
    }

    /// Number of active flags.
    pub fn active_count(&self, now_ms: u64) -> usize {
        self.store
            .entries()
            .iter()
            .filter(|e| !self.expiry.is_expired(e.flagged_at_ms, now_ms))
            .count()
    }

    /// Remove lapsed flags from the store. Returns how many were removed.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        if self.expiry == FlagExpiry::Never {
            return 0;
        }
        let expiry = self.expiry;
        let mut purged = 0;
        for entry in self.store.entries() {
            if !expiry.is_expired(entry.flagged_at_ms, now_ms) {
                continue;
            }
            // The snapshot may be stale: a flag raised again since must survive.
            let removed = self.store.remove_if(&entry.user_id, &|current| {
                expiry.is_expired(current.flagged_at_ms, now_ms)
            });
            if removed.is_some() {
                purged += 1;
            }
        }
        purged
    }

    /// The expiry policy in force.
    pub fn expiry(&self) -> FlagExpiry {
        self.expiry
    }
}
