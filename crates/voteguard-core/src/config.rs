//! Engine policy configuration.

use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};

/// How long a flag stays in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FlagExpiry {
    /// Flags stay until explicitly cleared by a moderator.
    Never,
    /// Flags lapse `secs` seconds after they were raised.
    AfterSecs {
        /// Lifetime of a flag in seconds.
        secs: u64,
    },
}

impl Default for FlagExpiry {
    fn default() -> Self {
        FlagExpiry::Never
    }
}

impl FlagExpiry {
    /// Whether a flag raised at `flagged_at_ms` has lapsed at `now_ms`.
    pub fn is_expired(&self, flagged_at_ms: u64, now_ms: u64) -> bool {
        match self {
            FlagExpiry::Never => false,
            FlagExpiry::AfterSecs { secs } => {
                now_ms.saturating_sub(flagged_at_ms) >= secs.saturating_mul(1000)
            }
        }
    }
}

/// Thresholds for the on-demand activity analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Adjacent votes closer than this count as rapid-fire.
    pub rapid_gap_ms: u64,
    /// Rapid-fire pairs above this emit a burst finding.
    pub rapid_pair_threshold: usize,
    /// Minimum votes before directional bias is evaluated.
    pub bias_min_votes: usize,
    /// Majority share above which a bias finding is emitted.
    pub bias_ratio: f64,
    /// Minimum votes before timing regularity is evaluated.
    pub regularity_min_votes: usize,
    /// Coefficient of variation below which timing counts as automated.
    pub regularity_max_cv: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rapid_gap_ms: 2_000,
            rapid_pair_threshold: 5,
            bias_min_votes: 10,
            bias_ratio: 0.95,
            regularity_min_votes: 10,
            regularity_max_cv: 0.2,
        }
    }
}

/// Policy knobs for vote validation, flagging and retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Trailing window for the burst gate.
    pub burst_window_secs: u64,
    /// Votes within the burst window that trip the burst gate.
    pub burst_threshold: usize,
    /// Trailing window for the hourly quotas.
    pub hourly_window_secs: u64,
    /// Per-user votes allowed in the hourly window.
    pub user_hourly_cap: usize,
    /// Per-address votes allowed in the hourly window.
    pub address_hourly_cap: usize,
    /// Repeat votes on one content item inside this window are rejected.
    pub duplicate_window_secs: u64,
    /// Minimum history before the bias gate applies.
    pub bias_min_votes: usize,
    /// Majority share above which the bias gate denies.
    pub bias_deny_ratio: f64,
    /// Analyzer thresholds.
    pub analysis: AnalysisConfig,
    /// Flag lifetime policy.
    pub flag_expiry: FlagExpiry,
    /// Vote records older than this are dropped by the sweep.
    pub retention_secs: u64,
    /// File a vote_manipulation report for every high-severity finding.
    pub auto_report_high_severity: bool,
    /// Lift the target's flag when a reviewer dismisses a report.
    pub release_flag_on_dismiss: bool,
    /// Trailing window for the "actions this week" statistic.
    pub stats_window_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            burst_window_secs: 300,
            burst_threshold: 10,
            hourly_window_secs: 3_600,
            user_hourly_cap: 50,
            address_hourly_cap: 20,
            duplicate_window_secs: 60,
            bias_min_votes: 20,
            bias_deny_ratio: 0.9,
            analysis: AnalysisConfig::default(),
            flag_expiry: FlagExpiry::Never,
            retention_secs: 3_600,
            auto_report_high_severity: true,
            release_flag_on_dismiss: false,
            stats_window_secs: 7 * 24 * 3_600,
        }
    }
}

impl GuardConfig {
    /// Reject configurations under which the windows would be miscounted.
    pub fn validate(&self) -> Result<()> {
        if self.burst_window_secs == 0
            || self.hourly_window_secs == 0
            || self.duplicate_window_secs == 0
        {
            return Err(GuardError::InvalidConfig(
                "rate windows must be non-zero".to_string(),
            ));
        }
        if self.burst_threshold == 0 || self.user_hourly_cap == 0 || self.address_hourly_cap == 0
        {
            return Err(GuardError::InvalidConfig(
                "vote caps must be non-zero".to_string(),
            ));
        }
        let longest = self.longest_window_secs();
        if self.retention_secs < longest {
            return Err(GuardError::InvalidConfig(format!(
                "retention_secs ({}) shorter than longest window ({})",
                self.retention_secs, longest
            )));
        }
        for (name, ratio) in [
            ("bias_deny_ratio", self.bias_deny_ratio),
            ("analysis.bias_ratio", self.analysis.bias_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(GuardError::InvalidConfig(format!(
                    "{} must be in (0, 1], got {}",
                    name, ratio
                )));
            }
        }
        if !(self.analysis.regularity_max_cv >= 0.0) {
            return Err(GuardError::InvalidConfig(
                "analysis.regularity_max_cv must be non-negative".to_string(),
            ));
        }
        if let FlagExpiry::AfterSecs { secs: 0 } = self.flag_expiry {
            return Err(GuardError::InvalidConfig(
                "flag expiry of zero seconds would never block".to_string(),
            ));
        }
        Ok(())
    }

    /// Longest window any gate looks back over.
    pub fn longest_window_secs(&self) -> u64 {
        self.burst_window_secs
            .max(self.hourly_window_secs)
            .max(self.duplicate_window_secs)
    }

    pub(crate) fn burst_window_ms(&self) -> u64 {
        self.burst_window_secs.saturating_mul(1000)
    }

    pub(crate) fn hourly_window_ms(&self) -> u64 {
        self.hourly_window_secs.saturating_mul(1000)
    }

    pub(crate) fn duplicate_window_ms(&self) -> u64 {
        self.duplicate_window_secs.saturating_mul(1000)
    }
}
