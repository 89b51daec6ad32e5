//! Abuse report lifecycle: submit, queue, review.
//!
//! Reports move `pending -> resolved | dismissed` exactly once. The store's
//! [`ReportStore::transition`] does the status check and the write under one
//! lock, so two reviewers racing on the same report cannot both succeed; the
//! loser sees [`GuardError::ReportAlreadyReviewed`].

use crate::error::{GuardError, Result};
use crate::flags::{FlagRegistry, FlagSource};
use crate::types::{ModerationAction, Report, ReportReason, ReportStatus, TargetType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Reporter id used for reports the engine files on its own.
pub const SYSTEM_REPORTER: &str = "system";

/// A reviewer's decision, applied by [`ReportStore::transition`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDecision {
    /// Reviewer id.
    pub reviewer_id: String,
    /// Action taken.
    pub action: ModerationAction,
    /// Free-form notes.
    pub notes: String,
    /// Review time, ms since epoch.
    pub reviewed_at_ms: u64,
}

/// Storage for reports. Swap in a durable implementation for production.
pub trait ReportStore: Send + Sync {
    /// Store a new report.
    fn insert(&self, report: Report);
    /// Report by id.
    fn get(&self, id: &str) -> Option<Report>;
    /// All reports in insertion order.
    fn list(&self) -> Vec<Report>;
    /// Atomically move a pending report to its terminal state.
    fn transition(&self, id: &str, decision: ReviewDecision) -> Result<Report>;
}

#[derive(Default)]
struct ReportTable {
    by_id: HashMap<String, Report>,
    order: Vec<String>,
}

/// Report store guarded by a single table-wide lock.
#[derive(Default)]
pub struct InMemoryReportStore {
    table: RwLock<ReportTable>,
}

impl InMemoryReportStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for InMemoryReportStore {
    fn insert(&self, report: Report) {
        let mut table = self.table.write();
        if table.by_id.insert(report.id.clone(), report.clone()).is_none() {
            table.order.push(report.id);
        }
    }

    fn get(&self, id: &str) -> Option<Report> {
        self.table.read().by_id.get(id).cloned()
    }

    fn list(&self) -> Vec<Report> {
        let table = self.table.read();
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect()
    }

    fn transition(&self, id: &str, decision: ReviewDecision) -> Result<Report> {
        let mut table = self.table.write();
        let report = table
            .by_id
            .get_mut(id)
            .ok_or_else(|| GuardError::ReportNotFound(id.to_string()))?;
        if report.status.is_terminal() {
            return Err(GuardError::ReportAlreadyReviewed {
                id: id.to_string(),
                status: report.status,
            });
        }
        report.status = decision.action.resulting_status();
        report.reviewer_id = Some(decision.reviewer_id);
        report.review_notes = Some(decision.notes);
        report.action_taken = Some(decision.action);
        report.reviewed_at_ms = Some(decision.reviewed_at_ms);
        Ok(report.clone())
    }
}

/// Enforcement request emitted when a report is resolved with an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationCommand {
    /// Report that produced the action.
    pub report_id: String,
    /// Kind of target.
    pub target_type: TargetType,
    /// Target id.
    pub target_id: String,
    /// Action to enforce.
    pub action: ModerationAction,
    /// Reviewer who decided it.
    pub reviewer_id: String,
}

/// Receiver for moderation actions. Enforcement itself happens elsewhere.
pub trait ModerationSink: Send + Sync {
    /// Hand off an action for enforcement.
    fn dispatch(&self, command: &ModerationCommand);
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl ModerationSink for LoggingSink {
    fn dispatch(&self, command: &ModerationCommand) {
        tracing::info!(
            report_id = %command.report_id,
            target_type = %command.target_type,
            target_id = %command.target_id,
            action = %command.action,
            reviewer_id = %command.reviewer_id,
            "moderation action dispatched"
        );
    }
}

/// Query over stored reports. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    /// Only this status.
    pub status: Option<ReportStatus>,
    /// Only this reason.
    pub reason: Option<ReportReason>,
    /// Only this target type.
    pub target_type: Option<TargetType>,
    /// Only this target id.
    pub target_id: Option<String>,
    /// Only this reporter.
    pub reporter_id: Option<String>,
    /// Only reports created at or after this time.
    pub since_ms: Option<u64>,
}

impl ReportFilter {
    /// Filter matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on status only.
    pub fn with_status(status: ReportStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether `report` passes the filter.
    pub fn matches(&self, report: &Report) -> bool {
        if let Some(status) = self.status {
            if report.status != status {
                return false;
            }
        }
        if let Some(reason) = self.reason {
            if report.reason != reason {
                return false;
            }
        }
        if let Some(target_type) = self.target_type {
            if report.target_type != target_type {
                return false;
            }
        }
        if let Some(ref target_id) = self.target_id {
            if &report.target_id != target_id {
                return false;
            }
        }
        if let Some(ref reporter_id) = self.reporter_id {
            if &report.reporter_id != reporter_id {
                return false;
            }
        }
        if let Some(since) = self.since_ms {
            if report.created_at_ms < since {
                return false;
            }
        }
        true
    }
}

/// Report lifecycle manager.
pub struct ReportManager {
    store: Arc<dyn ReportStore>,
    flags: Arc<FlagRegistry>,
    sink: Arc<dyn ModerationSink>,
    release_flag_on_dismiss: bool,
}

impl ReportManager {
    /// Manager over `store`, flagging through `flags` and enforcing via `sink`.
    pub fn new(
        store: Arc<dyn ReportStore>,
        flags: Arc<FlagRegistry>,
        sink: Arc<dyn ModerationSink>,
        release_flag_on_dismiss: bool,
    ) -> Self {
        Self {
            store,
            flags,
            sink,
            release_flag_on_dismiss,
        }
    }

    /// File a new pending report.
    ///
    /// A `vote_manipulation` report against a user or a vote flags the target
    /// immediately. This errs towards false positives: the flag holds the
    /// account until a reviewer looks at the report.
    pub fn submit(
        &self,
        reporter_id: &str,
        target_type: TargetType,
        target_id: &str,
        reason: ReportReason,
        description: &str,
        now_ms: u64,
    ) -> Report {
        self.file(reporter_id, target_type, target_id, reason, description, now_ms)
            .0
    }

    /// Like [`submit`](Self::submit), also returning whether this report
    /// raised a new flag on the target.
    pub fn file(
        &self,
        reporter_id: &str,
        target_type: TargetType,
        target_id: &str,
        reason: ReportReason,
        description: &str,
        now_ms: u64,
    ) -> (Report, bool) {
        let report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            reporter_id: reporter_id.to_string(),
            target_type,
            target_id: target_id.to_string(),
            reason,
            description: description.to_string(),
            created_at_ms: now_ms,
            status: ReportStatus::Pending,
            reviewer_id: None,
            review_notes: None,
            action_taken: None,
            reviewed_at_ms: None,
        };
        self.store.insert(report.clone());
        tracing::info!(
            report_id = %report.id,
            reporter_id,
            target_type = %target_type,
            target_id,
            reason = %reason,
            "report submitted"
        );

        let flagged = reason == ReportReason::VoteManipulation
            && matches!(target_type, TargetType::User | TargetType::Vote)
            && self.flags.flag(
                target_id,
                FlagSource::Report {
                    report_id: report.id.clone(),
                },
                now_ms,
            );

        (report, flagged)
    }

    /// Report by id.
    pub fn get(&self, id: &str) -> Option<Report> {
        self.store.get(id)
    }

    /// Pending reports, newest first.
    pub fn list_pending(&self) -> Vec<Report> {
        self.list(&ReportFilter::with_status(ReportStatus::Pending))
    }

    /// Reports matching `filter`, newest first. Ties keep the later submission first.
    pub fn list(&self, filter: &ReportFilter) -> Vec<Report> {
        let mut reports: Vec<Report> = self
            .store
            .list()
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        reports.reverse();
        reports.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        reports
    }

    /// All reports in insertion order.
    pub fn all(&self) -> Vec<Report> {
        self.store.list()
    }

    /// Review a pending report.
    ///
    /// Fails with [`GuardError::ReportNotFound`] for unknown ids and
    /// [`GuardError::ReportAlreadyReviewed`] once the report is terminal;
    /// re-review is rejected rather than ignored so the audit trail stays exact.
    pub fn review(
        &self,
        report_id: &str,
        reviewer_id: &str,
        action: ModerationAction,
        notes: &str,
        now_ms: u64,
    ) -> Result<Report> {
        let report = self.store.transition(
            report_id,
            ReviewDecision {
                reviewer_id: reviewer_id.to_string(),
                action,
                notes: notes.to_string(),
                reviewed_at_ms: now_ms,
            },
        )?;

        tracing::info!(
            report_id,
            reviewer_id,
            action = %action,
            status = %report.status,
            "report reviewed"
        );

        if action == ModerationAction::Dismiss {
            // Only the hold this report placed is lifted.
            if self.release_flag_on_dismiss
                && report.reason == ReportReason::VoteManipulation
                && matches!(report.target_type, TargetType::User | TargetType::Vote)
            {
                self.flags.clear_from(
                    &report.target_id,
                    &FlagSource::Report {
                        report_id: report.id.clone(),
                    },
                );
            }
        } else {
            self.sink.dispatch(&ModerationCommand {
                report_id: report.id.clone(),
                target_type: report.target_type,
                target_id: report.target_id.clone(),
                action,
                reviewer_id: reviewer_id.to_string(),
            });
        }

        Ok(report)
    }
}
