//! Per-user and per-address vote histories with windowed counting.
//!
//! Each user ledger keeps its records ordered by timestamp together with
//! running direction counters, so window counts are a binary search rather
//! than a scan. Address ledgers only keep timestamps and decay from the front.
//!
//! Ledgers live behind their own mutex inside a `DashMap`; callers take the
//! `Arc` out of the map and lock it, which gives per-key mutual exclusion
//! without holding a shard lock for the duration of a check.

use crate::types::{VoteDirection, VoteRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Time-ordered votes of a single user.
#[derive(Debug, Default)]
pub struct UserLedger {
    votes: VecDeque<VoteRecord>,
    up: usize,
    down: usize,
}

impl UserLedger {
    /// Append a record, keeping timestamp order.
    pub fn push(&mut self, record: VoteRecord) {
        match record.direction {
            VoteDirection::Up => self.up += 1,
            VoteDirection::Down => self.down += 1,
        }
        let in_order = self
            .votes
            .back()
            .map_or(true, |last| last.timestamp_ms <= record.timestamp_ms);
        if in_order {
            self.votes.push_back(record);
        } else {
            let at = self
                .votes
                .partition_point(|v| v.timestamp_ms <= record.timestamp_ms);
            self.votes.insert(at, record);
        }
    }

    /// Number of votes with `timestamp_ms >= since_ms`.
    pub fn count_since(&self, since_ms: u64) -> usize {
        self.votes.len() - self.votes.partition_point(|v| v.timestamp_ms < since_ms)
    }

    /// Most recent vote on `content_id` at or after `since_ms`.
    pub fn last_vote_on(&self, content_id: &str, since_ms: u64) -> Option<&VoteRecord> {
        self.votes
            .iter()
            .rev()
            .take_while(|v| v.timestamp_ms >= since_ms)
            .find(|v| v.content_id == content_id)
    }

    /// `(up, down)` over the retained history.
    pub fn direction_counts(&self) -> (usize, usize) {
        (self.up, self.down)
    }

    /// Drop records older than `cutoff_ms`. Returns how many were removed.
    pub fn evict_before(&mut self, cutoff_ms: u64) -> usize {
        let mut removed = 0;
        while let Some(front) = self.votes.front() {
            if front.timestamp_ms >= cutoff_ms {
                break;
            }
            if let Some(old) = self.votes.pop_front() {
                match old.direction {
                    VoteDirection::Up => self.up -= 1,
                    VoteDirection::Down => self.down -= 1,
                }
                removed += 1;
            }
        }
        removed
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &VoteRecord> {
        self.votes.iter()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

/// Vote timestamps from one network address.
#[derive(Debug, Default)]
pub struct AddressLedger {
    stamps: VecDeque<u64>,
}

impl AddressLedger {
    /// Forget stamps older than `cutoff_ms`. Returns how many were removed.
    pub fn decay(&mut self, cutoff_ms: u64) -> usize {
        let before = self.stamps.len();
        while self.stamps.front().is_some_and(|&ts| ts < cutoff_ms) {
            self.stamps.pop_front();
        }
        before - self.stamps.len()
    }

    /// Record a vote at `timestamp_ms`.
    pub fn push(&mut self, timestamp_ms: u64) {
        if self.stamps.back().map_or(true, |&last| last <= timestamp_ms) {
            self.stamps.push_back(timestamp_ms);
        } else {
            let at = self.stamps.partition_point(|&ts| ts <= timestamp_ms);
            self.stamps.insert(at, timestamp_ms);
        }
    }

    /// Number of stamps at or after `since_ms`.
    pub fn count_since(&self, since_ms: u64) -> usize {
        self.stamps.len() - self.stamps.partition_point(|&ts| ts < since_ms)
    }

    /// Number of retained stamps.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// Result of a retention pass over the histories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Vote records removed from user ledgers.
    pub records_evicted: usize,
    /// Address stamps removed.
    pub stamps_evicted: usize,
    /// Empty ledgers dropped from the indexes.
    pub ledgers_dropped: usize,
}

/// Vote indexes by user and by source address.
#[derive(Debug, Default)]
pub struct VoteHistory {
    users: DashMap<String, Arc<Mutex<UserLedger>>>,
    addresses: DashMap<String, Arc<Mutex<AddressLedger>>>,
}

impl VoteHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger for `user_id`, created on first use.
    pub fn user_ledger(&self, user_id: &str) -> Arc<Mutex<UserLedger>> {
        if let Some(ledger) = self.users.get(user_id) {
            return Arc::clone(ledger.value());
        }
        Arc::clone(self.users.entry(user_id.to_string()).or_default().value())
    }

    /// Ledger for `address`, created on first use.
    pub fn address_ledger(&self, address: &str) -> Arc<Mutex<AddressLedger>> {
        if let Some(ledger) = self.addresses.get(address) {
            return Arc::clone(ledger.value());
        }
        Arc::clone(self.addresses.entry(address.to_string()).or_default().value())
    }

    /// Copy of a user's retained votes, oldest first.
    pub fn user_votes(&self, user_id: &str) -> Vec<VoteRecord> {
        let ledger = match self.users.get(user_id) {
            Some(l) => Arc::clone(l.value()),
            None => return Vec::new(),
        };
        let guard = ledger.lock();
        guard.records().cloned().collect()
    }

    /// Insert a record into both indexes without any policy check.
    pub fn import(&self, record: VoteRecord) {
        let ledger = self.user_ledger(&record.user_id);
        let mut ledger = ledger.lock();
        if let Some(address) = record.source_address.as_deref() {
            let addr = self.address_ledger(address);
            addr.lock().push(record.timestamp_ms);
        }
        ledger.push(record);
    }

    /// Drop everything older than `cutoff_ms` and forget empty ledgers.
    ///
    /// A ledger is only removed while nobody else holds a handle to it, so an
    /// in-flight validation never writes into a detached ledger.
    pub fn evict_before(&self, cutoff_ms: u64) -> EvictionStats {
        let mut stats = EvictionStats::default();

        let user_ids: Vec<String> = self.users.iter().map(|e| e.key().clone()).collect();
        for user_id in user_ids {
            if let Some(ledger) = self.users.get(&user_id).map(|l| Arc::clone(l.value())) {
                stats.records_evicted += ledger.lock().evict_before(cutoff_ms);
            }
            let dropped = self.users.remove_if(&user_id, |_, ledger| {
                Arc::strong_count(ledger) == 1 && ledger.lock().is_empty()
            });
            if dropped.is_some() {
                stats.ledgers_dropped += 1;
            }
        }

        let addresses: Vec<String> = self.addresses.iter().map(|e| e.key().clone()).collect();
        for address in addresses {
            if let Some(ledger) = self.addresses.get(&address).map(|l| Arc::clone(l.value())) {
                stats.stamps_evicted += ledger.lock().decay(cutoff_ms);
            }
            let dropped = self.addresses.remove_if(&address, |_, ledger| {
                Arc::strong_count(ledger) == 1 && ledger.lock().is_empty()
            });
            if dropped.is_some() {
                stats.ledgers_dropped += 1;
            }
        }

        stats
    }

    /// Number of users with a ledger.
    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    /// Number of addresses with a ledger.
    pub fn tracked_addresses(&self) -> usize {
        self.addresses.len()
    }
}
