//! The moderation engine: one handle over validation, analysis, flags and reports.

use crate::analyzer::ActivityAnalyzer;
use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::error::Result;
use crate::flags::{FlagEntry, FlagRegistry, FlagSource, FlagStore, InMemoryFlagStore};
use crate::history::VoteHistory;
use crate::metrics::GuardMetrics;
use crate::pipeline::VoteValidator;
use crate::reports::{
    InMemoryReportStore, LoggingSink, ModerationSink, ReportFilter, ReportManager, ReportStore,
    SYSTEM_REPORTER,
};
use crate::stats::GuardStats;
use crate::types::{
    Finding, ModerationAction, Report, ReportReason, Severity, TargetType, VoteDecision,
    VoteRecord, VoteRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a retention sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Vote records dropped.
    pub records_evicted: usize,
    /// Address stamps dropped.
    pub stamps_evicted: usize,
    /// Empty ledgers forgotten.
    pub ledgers_dropped: usize,
    /// Lapsed flags removed.
    pub flags_expired: usize,
}

/// Builder for [`ModerationEngine`] with injectable stores, sink and clock.
pub struct EngineBuilder {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    flag_store: Arc<dyn FlagStore>,
    report_store: Arc<dyn ReportStore>,
    sink: Arc<dyn ModerationSink>,
}

impl EngineBuilder {
    /// Builder with in-memory stores, a logging sink and the system clock.
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            flag_store: Arc::new(InMemoryFlagStore::new()),
            report_store: Arc::new(InMemoryReportStore::new()),
            sink: Arc::new(LoggingSink),
        }
    }

    /// Use `clock` as the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Keep flags in `store`.
    pub fn flag_store(mut self, store: Arc<dyn FlagStore>) -> Self {
        self.flag_store = store;
        self
    }

    /// Keep reports in `store`.
    pub fn report_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.report_store = store;
        self
    }

    /// Send moderation actions to `sink`.
    pub fn sink(mut self, sink: Arc<dyn ModerationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validate the configuration and assemble the engine.
    pub fn build(self) -> Result<ModerationEngine> {
        self.config.validate()?;
        let history = Arc::new(VoteHistory::new());
        let flags = Arc::new(FlagRegistry::new(self.flag_store, self.config.flag_expiry));
        let validator = VoteValidator::new(self.config.clone(), history.clone(), flags.clone());
        let analyzer = ActivityAnalyzer::new(self.config.analysis.clone());
        let reports = ReportManager::new(
            self.report_store,
            flags.clone(),
            self.sink,
            self.config.release_flag_on_dismiss,
        );
        tracing::info!(
            burst_threshold = self.config.burst_threshold,
            user_hourly_cap = self.config.user_hourly_cap,
            address_hourly_cap = self.config.address_hourly_cap,
            flag_expiry = ?self.config.flag_expiry,
            "moderation engine ready"
        );
        Ok(ModerationEngine {
            config: self.config,
            clock: self.clock,
            history,
            flags,
            validator,
            analyzer,
            reports,
            metrics: GuardMetrics::new(),
        })
    }
}

/// Vote integrity and moderation engine. Share it behind an `Arc`.
pub struct ModerationEngine {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    history: Arc<VoteHistory>,
    flags: Arc<FlagRegistry>,
    validator: VoteValidator,
    analyzer: ActivityAnalyzer,
    reports: ReportManager,
    metrics: GuardMetrics,
}

impl ModerationEngine {
    /// Engine with in-memory stores and the system clock.
    pub fn new(config: GuardConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    /// Builder for custom stores, sink or clock.
    pub fn builder(config: GuardConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Decide whether a vote may count, recording it when it does.
    ///
    /// Denials are ordinary results. Findings raised along the way are
    /// escalated before returning.
    pub fn validate_vote(&self, request: VoteRequest) -> VoteDecision {
        let now = self.now();
        let user_id = request.user_id.clone();
        let content_id = request.content_id.clone();
        let validation = self.validator.evaluate(request, now);

        match validation.decision.denial {
            None => {
                self.metrics.votes_allowed.inc();
                tracing::debug!(%user_id, %content_id, "vote accepted");
            }
            Some(kind) => {
                self.metrics.denied(kind).inc();
                tracing::debug!(%user_id, %content_id, denial = kind.as_str(), "vote denied");
            }
        }

        if let Some(finding) = validation.finding {
            self.escalate(finding);
        }
        validation.decision
    }

    /// Register a finding and, if it is high severity, flag the user and
    /// optionally file a report on their behalf. Returns true when a new flag
    /// was raised. A user already on hold gets no further auto-report.
    fn escalate(&self, finding: Finding) -> bool {
        self.metrics.findings_registered.inc();
        tracing::warn!(
            user_id = %finding.user_id,
            kind = %finding.kind,
            severity = %finding.severity,
            confidence = finding.confidence,
            "suspicious activity finding"
        );

        let mut raised = false;
        if finding.severity == Severity::High {
            let now = self.now();
            raised = self.flags.flag(
                &finding.user_id,
                FlagSource::Finding { kind: finding.kind },
                now,
            );
            if raised {
                self.metrics.flags_raised.inc();
            }
            if raised && self.config.auto_report_high_severity {
                let description = format!(
                    "auto-filed: {} finding (confidence {:.2})",
                    finding.kind, finding.confidence
                );
                self.reports.submit(
                    SYSTEM_REPORTER,
                    TargetType::User,
                    &finding.user_id,
                    ReportReason::VoteManipulation,
                    &description,
                    now,
                );
                self.metrics.reports_submitted.inc();
            }
        }

        self.analyzer.record(finding);
        raised
    }

    /// Load a vote into history without validation (e.g. replay from storage).
    pub fn import_vote(&self, record: VoteRecord) {
        self.history.import(record);
    }

    /// A user's retained votes, oldest first.
    pub fn user_votes(&self, user_id: &str) -> Vec<VoteRecord> {
        self.history.user_votes(user_id)
    }

    /// Run the analyzer over a user's history. Changes nothing.
    pub fn analyze_user(&self, user_id: &str) -> Vec<Finding> {
        let votes = self.history.user_votes(user_id);
        self.analyzer.analyze(user_id, &votes)
    }

    /// Register findings from an operator flow. Returns how many flags were raised.
    pub fn apply_findings(&self, findings: Vec<Finding>) -> usize {
        findings
            .into_iter()
            .map(|finding| self.escalate(finding))
            .filter(|raised| *raised)
            .count()
    }

    /// Register a single finding.
    pub fn record_finding(&self, finding: Finding) {
        self.escalate(finding);
    }

    /// Registered findings, newest first.
    pub fn recent_findings(&self, limit: usize) -> Vec<Finding> {
        self.analyzer.recent(limit)
    }

    /// File an abuse report. See [`ReportManager::submit`] for flagging rules.
    pub fn submit_report(
        &self,
        reporter_id: &str,
        target_type: TargetType,
        target_id: &str,
        reason: ReportReason,
        description: &str,
    ) -> Report {
        let now = self.now();
        let (report, flagged) = self
            .reports
            .file(reporter_id, target_type, target_id, reason, description, now);
        self.metrics.reports_submitted.inc();
        if flagged {
            self.metrics.flags_raised.inc();
        }
        report
    }

    /// Pending reports, newest first.
    pub fn list_pending(&self) -> Vec<Report> {
        self.reports.list_pending()
    }

    /// Reports matching `filter`, newest first.
    pub fn list_reports(&self, filter: &ReportFilter) -> Vec<Report> {
        self.reports.list(filter)
    }

    /// Report by id.
    pub fn get_report(&self, report_id: &str) -> Option<Report> {
        self.reports.get(report_id)
    }

    /// Review a pending report. See [`ReportManager::review`].
    pub fn review(
        &self,
        report_id: &str,
        reviewer_id: &str,
        action: ModerationAction,
        notes: &str,
    ) -> Result<Report> {
        let report = self
            .reports
            .review(report_id, reviewer_id, action, notes, self.now())?;
        self.metrics.reports_reviewed.inc();
        Ok(report)
    }

    /// Flag a user directly. Returns true when a new flag was raised.
    pub fn flag_user(&self, user_id: &str, actor: &str) -> bool {
        let raised = self.flags.flag(
            user_id,
            FlagSource::Manual {
                actor: actor.to_string(),
            },
            self.now(),
        );
        if raised {
            self.metrics.flags_raised.inc();
        }
        raised
    }

    /// Lift a user's flag. Returns true when a flag was removed.
    pub fn clear_flag(&self, user_id: &str, actor: &str) -> bool {
        let cleared = self.flags.clear(user_id).is_some();
        if cleared {
            tracing::info!(user_id, actor, "flag lifted by moderator");
        }
        cleared
    }

    /// Whether a user is currently flagged.
    pub fn is_flagged(&self, user_id: &str) -> bool {
        self.flags.is_flagged(user_id, self.now())
    }

    /// Active flags, most recent first.
    pub fn flagged_users(&self) -> Vec<FlagEntry> {
        self.flags.active(self.now())
    }

    /// Moderation statistics as of now.
    pub fn get_stats(&self) -> GuardStats {
        let now = self.now();
        GuardStats::collect(
            &self.reports.all(),
            self.flags.active_count(now),
            now,
            self.config.stats_window_secs.saturating_mul(1000),
        )
    }

    /// Drop votes past retention and lapsed flags.
    pub fn sweep(&self) -> SweepReport {
        let now = self.now();
        let cutoff = now.saturating_sub(self.config.retention_secs.saturating_mul(1000));
        let evicted = self.history.evict_before(cutoff);
        let flags_expired = self.flags.purge_expired(now);
        self.metrics
            .sweep_records_evicted
            .add(evicted.records_evicted as u64);
        let report = SweepReport {
            records_evicted: evicted.records_evicted,
            stamps_evicted: evicted.stamps_evicted,
            ledgers_dropped: evicted.ledgers_dropped,
            flags_expired,
        };
        tracing::debug!(?report, "retention sweep complete");
        report
    }

    /// Prometheus text for the engine counters and current stats.
    pub fn render_metrics(&self) -> String {
        self.metrics.render_prometheus(&self.get_stats())
    }

    /// Engine counters.
    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// Configuration in use.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Number of users with retained history.
    pub fn tracked_users(&self) -> usize {
        self.history.tracked_users()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::GuardError;
    use crate::types::{FindingKind, VoteDirection};

    fn engine_at(start_ms: u64) -> (ModerationEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let engine = ModerationEngine::builder(GuardConfig::default())
            .clock(clock.clone())
            .build()
            .unwrap();
        (engine, clock)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GuardConfig {
            retention_secs: 1,
            ..GuardConfig::default()
        };
        assert!(matches!(
            ModerationEngine::new(config),
            Err(GuardError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_burst_flags_and_auto_reports() {
        let (engine, clock) = engine_at(1_000_000);
        for i in 0..10 {
            let d = engine.validate_vote(VoteRequest::new("u1", format!("a{}", i), VoteDirection::Up));
            assert!(d.allowed);
            clock.advance_ms(1_000);
        }
        let d = engine.validate_vote(VoteRequest::new("u1", "a10", VoteDirection::Up));
        assert!(!d.allowed);
        assert!(engine.is_flagged("u1"));

        let pending = engine.list_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reporter_id, SYSTEM_REPORTER);
        assert_eq!(pending[0].reason, ReportReason::VoteManipulation);
        assert_eq!(pending[0].target_id, "u1");

        let recent = engine.recent_findings(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, FindingKind::Burst);
        assert_eq!(engine.metrics().flags_raised.get(), 1);
    }

    #[test]
    fn test_auto_report_can_be_disabled() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = ModerationEngine::builder(GuardConfig {
            auto_report_high_severity: false,
            ..GuardConfig::default()
        })
        .clock(clock.clone())
        .build()
        .unwrap();
        for i in 0..11 {
            engine.validate_vote(VoteRequest::new("u1", format!("a{}", i), VoteDirection::Up));
        }
        assert!(engine.is_flagged("u1"));
        assert!(engine.list_pending().is_empty());
    }

    #[test]
    fn test_bias_finding_does_not_flag() {
        let (engine, _) = engine_at(5_000_000);
        for i in 0..20u64 {
            engine.import_vote(VoteRecord {
                user_id: "u1".to_string(),
                content_id: format!("a{}", i),
                direction: VoteDirection::Down,
                timestamp_ms: 5_000_000 - 3_000_000 + i * 100_000,
                source_address: None,
                client_signature: None,
            });
        }
        let d = engine.validate_vote(VoteRequest::new("u1", "x", VoteDirection::Down));
        assert!(!d.allowed);
        assert!(!engine.is_flagged("u1"));
        assert_eq!(engine.recent_findings(5)[0].kind, FindingKind::Bias);
        assert!(engine.list_pending().is_empty());
    }

    #[test]
    fn test_apply_findings_flags_high_only() {
        let (engine, clock) = engine_at(0);
        for i in 0..8u64 {
            engine.import_vote(VoteRecord {
                user_id: "bot".to_string(),
                content_id: format!("a{}", i),
                direction: VoteDirection::Up,
                timestamp_ms: i * 500,
                source_address: None,
                client_signature: None,
            });
        }
        clock.set(10_000);
        let findings = engine.analyze_user("bot");
        assert_eq!(findings.len(), 1);
        assert_eq!(engine.apply_findings(findings), 1);
        assert!(engine.is_flagged("bot"));
        assert_eq!(engine.apply_findings(Vec::new()), 0);
    }

    #[test]
    fn test_repeated_findings_file_one_report() {
        let (engine, clock) = engine_at(0);
        for i in 0..8u64 {
            engine.import_vote(VoteRecord {
                user_id: "bot".to_string(),
                content_id: format!("a{}", i),
                direction: VoteDirection::Up,
                timestamp_ms: i * 500,
                source_address: None,
                client_signature: None,
            });
        }
        clock.set(10_000);
        let raised: Vec<usize> = (0..3)
            .map(|_| engine.apply_findings(engine.analyze_user("bot")))
            .collect();
        assert_eq!(raised, vec![1, 0, 0]);
        assert_eq!(engine.list_pending().len(), 1);
        assert_eq!(engine.metrics().reports_submitted.get(), 1);
        assert_eq!(engine.recent_findings(10).len(), 3);
    }

    #[test]
    fn test_submit_report_counts_only_new_flags() {
        let (engine, _) = engine_at(0);
        engine.flag_user("u1", "admin");
        let before = engine.metrics().flags_raised.get();
        engine.submit_report("r", TargetType::User, "u1", ReportReason::VoteManipulation, "");
        assert_eq!(engine.metrics().flags_raised.get(), before);
        engine.submit_report("r", TargetType::User, "u2", ReportReason::VoteManipulation, "");
        assert_eq!(engine.metrics().flags_raised.get(), before + 1);
    }

    #[test]
    fn test_huge_windows_saturate() {
        let engine = ModerationEngine::builder(GuardConfig {
            burst_window_secs: u64::MAX,
            hourly_window_secs: u64::MAX,
            duplicate_window_secs: u64::MAX,
            retention_secs: u64::MAX,
            stats_window_secs: u64::MAX,
            ..GuardConfig::default()
        })
        .clock(Arc::new(ManualClock::new(1_000_000)))
        .build()
        .unwrap();
        assert!(engine
            .validate_vote(VoteRequest::new("u1", "a1", VoteDirection::Up))
            .allowed);
        assert_eq!(engine.sweep().records_evicted, 0);
        assert_eq!(engine.get_stats().actions_this_week, 0);
    }

    #[test]
    fn test_sweep_evicts_and_expires() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = ModerationEngine::builder(GuardConfig {
            flag_expiry: crate::config::FlagExpiry::AfterSecs { secs: 600 },
            ..GuardConfig::default()
        })
        .clock(clock.clone())
        .build()
        .unwrap();
        engine.validate_vote(
            VoteRequest::new("u1", "a1", VoteDirection::Up).with_source_address("10.0.0.9"),
        );
        engine.flag_user("u2", "ops");
        clock.advance_ms(3_600_001);
        let report = engine.sweep();
        assert_eq!(report.records_evicted, 1);
        assert_eq!(report.stamps_evicted, 1);
        assert_eq!(report.ledgers_dropped, 2);
        assert_eq!(report.flags_expired, 1);
        assert_eq!(engine.tracked_users(), 0);
        assert_eq!(engine.metrics().sweep_records_evicted.get(), 1);
    }

    #[test]
    fn test_clear_flag_restores_voting() {
        let (engine, _) = engine_at(0);
        assert!(engine.flag_user("u1", "ops"));
        assert!(!engine.flag_user("u1", "ops"));
        assert!(!engine.validate_vote(VoteRequest::new("u1", "a", VoteDirection::Up)).allowed);
        assert!(engine.clear_flag("u1", "ops"));
        assert!(!engine.clear_flag("u1", "ops"));
        assert!(engine.validate_vote(VoteRequest::new("u1", "a", VoteDirection::Up)).allowed);
    }

    #[test]
    fn test_metrics_rendered() {
        let (engine, _) = engine_at(0);
        engine.validate_vote(VoteRequest::new("u1", "a", VoteDirection::Up));
        engine.validate_vote(VoteRequest::new("u1", "a", VoteDirection::Up));
        let text = engine.render_metrics();
        assert!(text.contains("voteguard_votes_allowed_total 1"));
        assert!(text.contains("voteguard_votes_denied_total{reason=\"duplicate\"} 1"));
    }
}
