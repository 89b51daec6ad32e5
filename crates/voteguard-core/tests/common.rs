//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use voteguard_core::{
    GuardConfig, ManualClock, ModerationEngine, VoteDirection, VoteRecord, VoteRequest,
};

/// Start of the test timeline: 2024-01-01T00:00:00Z.
pub const T0: u64 = 1_704_067_200_000;

/// Engine plus the clock driving it.
pub struct TestEngine {
    pub engine: Arc<ModerationEngine>,
    pub clock: Arc<ManualClock>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(GuardConfig::default())
    }

    pub fn with_config(config: GuardConfig) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let engine = ModerationEngine::builder(config)
            .clock(clock.clone())
            .build()
            .expect("valid config");
        Self {
            engine: Arc::new(engine),
            clock,
        }
    }

    pub fn vote(&self, user: &str, content: &str, direction: VoteDirection) -> bool {
        self.engine
            .validate_vote(VoteRequest::new(user, content, direction))
            .allowed
    }

    /// Seed history directly, bypassing the gates.
    pub fn seed(&self, user: &str, direction: VoteDirection, stamps: impl IntoIterator<Item = u64>) {
        for (i, ts) in stamps.into_iter().enumerate() {
            self.engine.import_vote(VoteRecord {
                user_id: user.to_string(),
                content_id: format!("seed-{}", i),
                direction,
                timestamp_ms: ts,
                source_address: None,
                client_signature: None,
            });
        }
    }
}
