//! Point-in-time moderation statistics, derived read-only from report and flag state.

use crate::types::{Report, ReportReason, ReportStatus};
use serde::{Deserialize, Serialize};

/// Moderation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardStats {
    /// Every report ever filed.
    pub total_reports: usize,
    /// Reports awaiting review.
    pub pending_reports: usize,
    /// Reports resolved with an action.
    pub resolved_reports: usize,
    /// Reports dismissed.
    pub dismissed_reports: usize,
    /// Users currently flagged.
    pub suspicious_users: usize,
    /// Reports filed for vote manipulation.
    pub vote_manipulation_detected: usize,
    /// Reviewed reports created within the trailing stats window.
    pub actions_this_week: usize,
}

impl GuardStats {
    /// Tally `reports` and the flag count as of `now_ms`.
    ///
    /// `actions_this_week` keys off report creation time, not review time: a
    /// report filed eight days ago and reviewed today is not counted.
    pub fn collect(
        reports: &[Report],
        suspicious_users: usize,
        now_ms: u64,
        window_ms: u64,
    ) -> Self {
        let week_start = now_ms.saturating_sub(window_ms);
        let mut stats = GuardStats {
            total_reports: reports.len(),
            suspicious_users,
            ..GuardStats::default()
        };
        for report in reports {
            match report.status {
                ReportStatus::Pending => stats.pending_reports += 1,
                ReportStatus::Resolved => stats.resolved_reports += 1,
                ReportStatus::Dismissed => stats.dismissed_reports += 1,
            }
            if report.reason == ReportReason::VoteManipulation {
                stats.vote_manipulation_detected += 1;
            }
            if report.status.is_terminal() && report.created_at_ms >= week_start {
                stats.actions_this_week += 1;
            }
        }
        stats
    }
}
