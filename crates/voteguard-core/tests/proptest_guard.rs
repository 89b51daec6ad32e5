//! Property-based tests for voteguard-core using proptest.
//!
//! These check the window counting and analysis invariants over arbitrary
//! vote timelines rather than hand-picked ones.

use proptest::prelude::*;
use std::sync::Arc;
use voteguard_core::{
    history::{AddressLedger, UserLedger},
    ActivityAnalyzer, AnalysisConfig, GuardConfig, ManualClock, ModerationEngine, VoteDirection,
    VoteRecord, VoteRequest,
};

fn any_direction() -> impl Strategy<Value = VoteDirection> {
    prop_oneof![Just(VoteDirection::Up), Just(VoteDirection::Down)]
}

/// Generator for an unordered batch of votes from one user.
fn any_votes(max: usize) -> impl Strategy<Value = Vec<VoteRecord>> {
    prop::collection::vec((0u64..10_000_000, any_direction(), 0u8..20), 0..max).prop_map(
        |items| {
            items
                .into_iter()
                .map(|(ts, direction, item)| VoteRecord {
                    user_id: "p".to_string(),
                    content_id: format!("a{}", item),
                    direction,
                    timestamp_ms: ts,
                    source_address: None,
                    client_signature: None,
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn prop_user_ledger_count_matches_scan(votes in any_votes(200), since in 0u64..10_000_000) {
        let mut ledger = UserLedger::default();
        for v in &votes {
            ledger.push(v.clone());
        }
        let expected = votes.iter().filter(|v| v.timestamp_ms >= since).count();
        prop_assert_eq!(ledger.count_since(since), expected);

        let stamps: Vec<u64> = ledger.records().map(|v| v.timestamp_ms).collect();
        prop_assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn prop_user_ledger_direction_counts_after_evict(votes in any_votes(200), cutoff in 0u64..10_000_000) {
        let mut ledger = UserLedger::default();
        for v in &votes {
            ledger.push(v.clone());
        }
        let removed = ledger.evict_before(cutoff);
        let kept: Vec<&VoteRecord> = votes.iter().filter(|v| v.timestamp_ms >= cutoff).collect();
        prop_assert_eq!(removed, votes.len() - kept.len());
        let up = kept.iter().filter(|v| v.direction == VoteDirection::Up).count();
        prop_assert_eq!(ledger.direction_counts(), (up, kept.len() - up));
    }

    #[test]
    fn prop_address_ledger_decay_matches_count(stamps in prop::collection::vec(0u64..1_000_000, 0..100), cutoff in 0u64..1_000_000) {
        let mut ledger = AddressLedger::default();
        for ts in &stamps {
            ledger.push(*ts);
        }
        let live = ledger.count_since(cutoff);
        ledger.decay(cutoff);
        prop_assert_eq!(ledger.len(), live);
    }

    #[test]
    fn prop_analysis_ignores_input_order(votes in any_votes(60), seed in any::<u64>()) {
        let analyzer = ActivityAnalyzer::new(AnalysisConfig::default());
        let mut shuffled = votes.clone();
        // Deterministic rotate-and-reverse permutation.
        if !shuffled.is_empty() {
            let k = (seed as usize) % shuffled.len();
            shuffled.rotate_left(k);
            shuffled.reverse();
        }
        let first = analyzer.analyze("p", &votes);
        prop_assert_eq!(&first, &analyzer.analyze("p", &shuffled));
        prop_assert_eq!(&first, &analyzer.analyze("p", &votes));
    }

    #[test]
    fn prop_accepted_votes_respect_burst_window(gaps in prop::collection::vec(0u64..60_000, 1..80)) {
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let engine = ModerationEngine::builder(GuardConfig::default())
            .clock(clock.clone())
            .build()
            .unwrap();
        let window_ms = engine.config().burst_window_secs * 1_000;
        let threshold = engine.config().burst_threshold;

        for (i, gap) in gaps.iter().enumerate() {
            clock.advance_ms(*gap);
            let direction = if i % 2 == 0 { VoteDirection::Up } else { VoteDirection::Down };
            engine.validate_vote(VoteRequest::new("p", format!("a{}", i), direction));
        }

        let accepted: Vec<u64> = engine
            .user_votes("p")
            .iter()
            .map(|v| v.timestamp_ms)
            .collect();
        for (i, ts) in accepted.iter().enumerate() {
            let in_window = accepted[..=i]
                .iter()
                .filter(|t| **t + window_ms > *ts)
                .count();
            prop_assert!(in_window <= threshold);
        }
    }
}
