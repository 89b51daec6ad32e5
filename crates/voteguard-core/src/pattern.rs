//! Duplicate-vote and directional-bias checks over a user's ledger.

use crate::config::GuardConfig;
use crate::history::UserLedger;
use crate::types::VoteDirection;

/// Result of the pattern check.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternVerdict {
    /// Nothing suspicious.
    Clean,
    /// The user voted on the same content inside the duplicate window.
    Duplicate {
        /// Direction of the earlier vote
        previous: VoteDirection,
        /// Age of the earlier vote
        age_ms: u64,
    },
    /// History is overwhelmingly in one direction.
    Biased {
        /// Up votes in history
        up: usize,
        /// Down votes in history
        down: usize,
        /// Majority share
        ratio: f64,
        /// Majority direction
        direction: VoteDirection,
    },
}

/// Checks applied after the rate gates.
#[derive(Debug, Clone)]
pub struct PatternChecker {
    duplicate_window_ms: u64,
    bias_min_votes: usize,
    bias_deny_ratio: f64,
}

impl PatternChecker {
    /// Checker using the thresholds in `config`.
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            duplicate_window_ms: config.duplicate_window_ms(),
            bias_min_votes: config.bias_min_votes,
            bias_deny_ratio: config.bias_deny_ratio,
        }
    }

    /// Inspect `ledger` for a vote on `content_id` at `now_ms`.
    ///
    /// A duplicate takes precedence over bias: it is the more certain denial.
    pub fn check(&self, ledger: &UserLedger, content_id: &str, now_ms: u64) -> PatternVerdict {
        let since = now_ms.saturating_sub(self.duplicate_window_ms);
        if let Some(previous) = ledger.last_vote_on(content_id, since) {
            return PatternVerdict::Duplicate {
                previous: previous.direction,
                age_ms: now_ms.saturating_sub(previous.timestamp_ms),
            };
        }

        let (up, down) = ledger.direction_counts();
        let total = up + down;
        if total >= self.bias_min_votes && total > 0 {
            let majority = up.max(down);
            let ratio = majority as f64 / total as f64;
            if ratio > self.bias_deny_ratio {
                let direction = if up >= down {
                    VoteDirection::Up
                } else {
                    VoteDirection::Down
                };
                return PatternVerdict::Biased {
                    up,
                    down,
                    ratio,
                    direction,
                };
            }
        }

        PatternVerdict::Clean
    }
}
