//! Vote validation pipeline.
//!
//! Gates run in a fixed order and stop at the first denial:
//!
//! 1. flag gate
//! 2. burst window (registers a high-severity burst finding)
//! 3. per-user hourly quota
//! 4. per-address hourly quota
//! 5. duplicate vote / directional bias (bias registers a medium finding)
//! 6. accept and record
//!
//! Steps 2 through 6 run under the user's ledger lock, so the duplicate check
//! and the append are one atomic unit: two concurrent votes from one user on
//! one item cannot both pass.

use crate::config::GuardConfig;
use crate::flags::{FlagRegistry, FlagSource};
use crate::history::VoteHistory;
use crate::pattern::{PatternChecker, PatternVerdict};
use crate::types::{
    DenialKind, Finding, FindingKind, Severity, VoteDecision, VoteRecord, VoteRequest,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Flagged account.
pub const REASON_FLAGGED: &str = "Account flagged for suspicious activity";
/// Burst window exceeded.
pub const REASON_BURST: &str = "Too many votes in a short time";
/// Per-user hourly quota exceeded.
pub const REASON_HOURLY: &str = "Hourly vote limit exceeded";
/// Per-address hourly quota exceeded.
pub const REASON_ADDRESS: &str = "Too many votes from this network address";
/// Directional bias gate.
pub const REASON_BIAS: &str = "Suspicious voting pattern detected";
/// Repeat vote on the same item.
pub const REASON_DUPLICATE: &str = "Duplicate vote on this content";

/// Decision plus whatever the pipeline detected on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    /// Allow/deny outcome.
    pub decision: VoteDecision,
    /// Finding raised by the denying gate, if any.
    pub finding: Option<Finding>,
    /// The recorded vote when accepted.
    pub recorded: Option<VoteRecord>,
}

impl Validation {
    fn denied(kind: DenialKind, reason: &str, confidence: f64) -> Self {
        Self {
            decision: VoteDecision::deny(kind, reason, confidence),
            finding: None,
            recorded: None,
        }
    }

    fn with_finding(mut self, finding: Finding) -> Self {
        self.finding = Some(finding);
        self
    }
}

/// Runs the validation gates against shared history and flags.
pub struct VoteValidator {
    config: GuardConfig,
    history: Arc<VoteHistory>,
    flags: Arc<FlagRegistry>,
    pattern: PatternChecker,
}

impl VoteValidator {
    /// Validator over the given history and flag registry.
    pub fn new(config: GuardConfig, history: Arc<VoteHistory>, flags: Arc<FlagRegistry>) -> Self {
        let pattern = PatternChecker::new(&config);
        Self {
            config,
            history,
            flags,
            pattern,
        }
    }

    /// Validate `request` at `now_ms`, recording it when accepted.
    pub fn evaluate(&self, request: VoteRequest, now_ms: u64) -> Validation {
        let user_id = request.user_id.as_str();

        if let Some(flag) = self.flags.get(user_id, now_ms) {
            // A burst hold keeps reporting the burst while the window is still full.
            if flag.source == (FlagSource::Finding { kind: FindingKind::Burst }) {
                let since = now_ms.saturating_sub(self.config.burst_window_ms());
                let in_burst = self.history.user_ledger(user_id).lock().count_since(since);
                if in_burst >= self.config.burst_threshold {
                    return Validation::denied(DenialKind::Burst, REASON_BURST, 0.8);
                }
            }
            return Validation::denied(DenialKind::Flagged, REASON_FLAGGED, 0.9);
        }

        let ledger = self.history.user_ledger(user_id);
        let mut ledger = ledger.lock();

        let burst_since = now_ms.saturating_sub(self.config.burst_window_ms());
        let in_burst = ledger.count_since(burst_since);
        if in_burst >= self.config.burst_threshold {
            let mut evidence = BTreeMap::new();
            evidence.insert("votesInWindow".to_string(), json!(in_burst));
            evidence.insert("windowSecs".to_string(), json!(self.config.burst_window_secs));
            evidence.insert("threshold".to_string(), json!(self.config.burst_threshold));
            let finding = Finding {
                user_id: user_id.to_string(),
                kind: FindingKind::Burst,
                severity: Severity::High,
                confidence: 0.8,
                evidence,
                detected_at_ms: now_ms,
            };
            return Validation::denied(DenialKind::Burst, REASON_BURST, 0.8).with_finding(finding);
        }

        let hourly_since = now_ms.saturating_sub(self.config.hourly_window_ms());
        if ledger.count_since(hourly_since) >= self.config.user_hourly_cap {
            return Validation::denied(DenialKind::HourlyQuota, REASON_HOURLY, 0.9);
        }

        // Lock order: user ledger, then address ledger.
        let address_ledger = request
            .source_address
            .as_deref()
            .map(|addr| self.history.address_ledger(addr));
        let mut address_guard = address_ledger.as_ref().map(|l| l.lock());
        if let Some(addr) = address_guard.as_mut() {
            addr.decay(hourly_since);
            if addr.count_since(hourly_since) >= self.config.address_hourly_cap {
                return Validation::denied(DenialKind::AddressQuota, REASON_ADDRESS, 0.7);
            }
        }

        match self.pattern.check(&ledger, &request.content_id, now_ms) {
            PatternVerdict::Duplicate { .. } => {
                return Validation::denied(DenialKind::Duplicate, REASON_DUPLICATE, 1.0);
            }
            PatternVerdict::Biased {
                up,
                down,
                ratio,
                direction,
            } => {
                let mut evidence = BTreeMap::new();
                evidence.insert("upCount".to_string(), json!(up));
                evidence.insert("downCount".to_string(), json!(down));
                evidence.insert("bias".to_string(), json!(ratio));
                evidence.insert("direction".to_string(), json!(direction.as_str()));
                let finding = Finding {
                    user_id: user_id.to_string(),
                    kind: FindingKind::Bias,
                    severity: Severity::Medium,
                    confidence: 0.8,
                    evidence,
                    detected_at_ms: now_ms,
                };
                return Validation::denied(DenialKind::DirectionalBias, REASON_BIAS, 0.8)
                    .with_finding(finding);
            }
            PatternVerdict::Clean => {}
        }

        let record = request.into_record(now_ms);
        if let Some(addr) = address_guard.as_mut() {
            addr.push(now_ms);
        }
        ledger.push(record.clone());

        Validation {
            decision: VoteDecision::allow(),
            finding: None,
            recorded: Some(record),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlagExpiry;
    use crate::types::VoteDirection;

    fn validator() -> (VoteValidator, Arc<VoteHistory>, Arc<FlagRegistry>) {
        let history = Arc::new(VoteHistory::new());
        let flags = Arc::new(FlagRegistry::in_memory(FlagExpiry::Never));
        let v = VoteValidator::new(GuardConfig::default(), history.clone(), flags.clone());
        (v, history, flags)
    }

    fn up(user: &str, content: &str) -> VoteRequest {
        VoteRequest::new(user, content, VoteDirection::Up)
    }

    #[test]
    fn test_accept_records_vote() {
        let (v, history, _) = validator();
        let result = v.evaluate(up("u1", "a1").with_source_address("10.0.0.1"), 1_000);
        assert!(result.decision.allowed);
        assert_eq!(result.decision.confidence, 1.0);
        assert_eq!(result.recorded.unwrap().timestamp_ms, 1_000);
        assert_eq!(history.user_votes("u1").len(), 1);
        assert_eq!(history.address_ledger("10.0.0.1").lock().len(), 1);
    }

    #[test]
    fn test_flagged_user_denied_first() {
        let (v, history, flags) = validator();
        flags.flag(
            "u1",
            FlagSource::Manual {
                actor: "ops".to_string(),
            },
            0,
        );
        let result = v.evaluate(up("u1", "a1"), 1_000);
        assert_eq!(result.decision.denial, Some(DenialKind::Flagged));
        assert_eq!(result.decision.confidence, 0.9);
        assert!(result.finding.is_none());
        assert!(history.user_votes("u1").is_empty());
    }

    #[test]
    fn test_burst_flag_reports_burst_while_window_full() {
        let (v, _, flags) = validator();
        for i in 0..10 {
            assert!(v.evaluate(up("u1", &format!("a{}", i)), i * 1_000).decision.allowed);
        }
        flags.flag(
            "u1",
            FlagSource::Finding {
                kind: FindingKind::Burst,
            },
            10_000,
        );
        let result = v.evaluate(up("u1", "b1"), 20_000);
        assert_eq!(result.decision.denial, Some(DenialKind::Burst));
        assert_eq!(result.decision.reason.as_deref(), Some(REASON_BURST));
        assert!(result.finding.is_none());

        let result = v.evaluate(up("u1", "b2"), 400_000);
        assert_eq!(result.decision.denial, Some(DenialKind::Flagged));
    }

    #[test]
    fn test_burst_gate_emits_high_finding() {
        let (v, _, _) = validator();
        for i in 0..10 {
            assert!(v.evaluate(up("u1", &format!("a{}", i)), i * 1_000).decision.allowed);
        }
        let result = v.evaluate(up("u1", "a10"), 10_000);
        assert_eq!(result.decision.denial, Some(DenialKind::Burst));
        assert_eq!(result.decision.confidence, 0.8);
        let finding = result.finding.unwrap();
        assert_eq!(finding.kind, FindingKind::Burst);
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.evidence("votesInWindow"), Some(&json!(10)));
    }

    #[test]
    fn test_hourly_quota_without_finding() {
        let (v, _, _) = validator();
        // 9 votes every 5 minutes stays under the burst gate.
        let mut t = 0;
        let mut n = 0;
        while n < 50 {
            for _ in 0..9 {
                if n == 50 {
                    break;
                }
                let result = v.evaluate(VoteRequest::new(
                    "u1",
                    format!("a{}", n),
                    if n % 2 == 0 { VoteDirection::Up } else { VoteDirection::Down },
                ), t);
                assert!(result.decision.allowed, "vote {} should pass", n);
                n += 1;
                t += 1_000;
            }
            t += 300_000;
        }
        assert!(t < 3_600_000);
        let result = v.evaluate(up("u1", "over"), t);
        assert_eq!(result.decision.denial, Some(DenialKind::HourlyQuota));
        assert_eq!(result.decision.confidence, 0.9);
        assert!(result.finding.is_none());
    }

    #[test]
    fn test_address_quota_and_decay() {
        let (v, _, _) = validator();
        for i in 0..20 {
            let req = up(&format!("user{}", i), "a1").with_source_address("192.0.2.7");
            assert!(v.evaluate(req, i * 1_000).decision.allowed);
        }
        let denied = v.evaluate(up("late", "a1").with_source_address("192.0.2.7"), 30_000);
        assert_eq!(denied.decision.denial, Some(DenialKind::AddressQuota));
        assert_eq!(denied.decision.confidence, 0.7);

        let later = v.evaluate(
            up("late", "a1").with_source_address("192.0.2.7"),
            19_000 + 3_600_000 + 1,
        );
        assert!(later.decision.allowed);
    }

    #[test]
    fn test_duplicate_regardless_of_direction() {
        let (v, _, _) = validator();
        assert!(v.evaluate(up("u1", "a1"), 0).decision.allowed);
        let result = v.evaluate(VoteRequest::new("u1", "a1", VoteDirection::Down), 59_999);
        assert_eq!(result.decision.denial, Some(DenialKind::Duplicate));
        assert_eq!(result.decision.confidence, 1.0);
        assert_eq!(result.decision.reason.as_deref(), Some(REASON_DUPLICATE));
        assert!(v.evaluate(up("u1", "a1"), 60_001).decision.allowed);
    }

    #[test]
    fn test_bias_gate_emits_medium_finding() {
        let (v, history, _) = validator();
        for i in 0..20u64 {
            history.import(VoteRecord {
                user_id: "u1".to_string(),
                content_id: format!("a{}", i),
                direction: VoteDirection::Up,
                timestamp_ms: i * 120_000,
                source_address: None,
                client_signature: None,
            });
        }
        let result = v.evaluate(up("u1", "fresh"), 3_000_000);
        assert_eq!(result.decision.denial, Some(DenialKind::DirectionalBias));
        assert_eq!(result.decision.confidence, 0.8);
        let finding = result.finding.unwrap();
        assert_eq!(finding.kind, FindingKind::Bias);
        assert_eq!(finding.severity, Severity::Medium);
    }

    #[test]
    fn test_denied_vote_is_not_recorded() {
        let (v, history, _) = validator();
        v.evaluate(up("u1", "a1").with_source_address("10.1.1.1"), 0);
        v.evaluate(up("u1", "a1").with_source_address("10.1.1.1"), 10);
        assert_eq!(history.user_votes("u1").len(), 1);
        assert_eq!(history.address_ledger("10.1.1.1").lock().len(), 1);
    }
}
