//! Statistical scans over a user's vote history.
//!
//! Three detectors run on demand, independent of the validation path:
//!
//! - rapid fire: adjacent votes less than `rapid_gap_ms` apart;
//! - directional bias: nearly every vote in the same direction;
//! - timing regularity: inter-vote intervals with a coefficient of variation
//!   below `regularity_max_cv`. Human timing is noisy, so near-constant
//!   intervals point at automation even at low volume.
//!
//! Analysis is a pure function of the history. Detection time is taken from
//! the newest vote so repeated runs over the same history agree.

use crate::config::AnalysisConfig;
use crate::types::{Finding, FindingKind, Severity, VoteDirection, VoteRecord};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};

/// Findings kept in the recent log.
pub const MAX_RECENT_FINDINGS: usize = 1_000;

/// On-demand analyzer plus a bounded log of registered findings.
pub struct ActivityAnalyzer {
    config: AnalysisConfig,
    recent: Mutex<VecDeque<Finding>>,
}

impl ActivityAnalyzer {
    /// Analyzer with the given thresholds.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            recent: Mutex::new(VecDeque::with_capacity(64)),
        }
    }

    /// Run every detector over `votes`. Does not touch any state.
    pub fn analyze(&self, user_id: &str, votes: &[VoteRecord]) -> Vec<Finding> {
        let mut sorted: Vec<&VoteRecord> = votes.iter().collect();
        sorted.sort_by_key(|v| v.timestamp_ms);

        let detected_at_ms = sorted.last().map(|v| v.timestamp_ms).unwrap_or(0);
        let mut findings = Vec::new();

        if let Some(f) = self.rapid_fire(user_id, &sorted, detected_at_ms) {
            findings.push(f);
        }
        if let Some(f) = self.directional_bias(user_id, &sorted, detected_at_ms) {
            findings.push(f);
        }
        if let Some(f) = self.timing_regularity(user_id, &sorted, detected_at_ms) {
            findings.push(f);
        }

        if !findings.is_empty() {
            tracing::debug!(user_id, count = findings.len(), "analysis produced findings");
        }
        findings
    }

    fn rapid_fire(&self, user_id: &str, sorted: &[&VoteRecord], at: u64) -> Option<Finding> {
        let rapid = sorted
            .windows(2)
            .filter(|w| w[1].timestamp_ms - w[0].timestamp_ms < self.config.rapid_gap_ms)
            .count();
        if rapid <= self.config.rapid_pair_threshold {
            return None;
        }
        let mut evidence = BTreeMap::new();
        evidence.insert("adjacentRapidCount".to_string(), json!(rapid));
        evidence.insert("totalVotes".to_string(), json!(sorted.len()));
        Some(Finding {
            user_id: user_id.to_string(),
            kind: FindingKind::Burst,
            severity: Severity::High,
            confidence: 0.9,
            evidence,
            detected_at_ms: at,
        })
    }

    fn directional_bias(&self, user_id: &str, sorted: &[&VoteRecord], at: u64) -> Option<Finding> {
        let total = sorted.len();
        if total < self.config.bias_min_votes || total == 0 {
            return None;
        }
        let up = sorted
            .iter()
            .filter(|v| v.direction == VoteDirection::Up)
            .count();
        let down = total - up;
        let bias = up.max(down) as f64 / total as f64;
        if bias <= self.config.bias_ratio {
            return None;
        }
        let (direction, pattern) = if up >= down {
            (VoteDirection::Up, "always_positive")
        } else {
            (VoteDirection::Down, "always_negative")
        };
        let mut evidence = BTreeMap::new();
        evidence.insert("upCount".to_string(), json!(up));
        evidence.insert("downCount".to_string(), json!(down));
        evidence.insert("bias".to_string(), json!(bias));
        evidence.insert("direction".to_string(), json!(direction.as_str()));
        evidence.insert("pattern".to_string(), json!(pattern));
        Some(Finding {
            user_id: user_id.to_string(),
            kind: FindingKind::Bias,
            severity: Severity::Medium,
            confidence: 0.8,
            evidence,
            detected_at_ms: at,
        })
    }

    fn timing_regularity(&self, user_id: &str, sorted: &[&VoteRecord], at: u64) -> Option<Finding> {
        if sorted.len() < self.config.regularity_min_votes || sorted.len() < 2 {
            return None;
        }
        let intervals: Vec<f64> = sorted
            .windows(2)
            .map(|w| (w[1].timestamp_ms - w[0].timestamp_ms) as f64)
            .collect();
        let n = intervals.len() as f64;
        let mean = intervals.iter().sum::<f64>() / n;
        let variance = intervals.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();
        // All votes at one instant: no spread at all.
        let cv = if mean > 0.0 { stddev / mean } else { 0.0 };
        if cv >= self.config.regularity_max_cv {
            return None;
        }
        let mut evidence = BTreeMap::new();
        evidence.insert("meanIntervalMs".to_string(), json!(mean));
        evidence.insert("stddevMs".to_string(), json!(stddev));
        evidence.insert("cv".to_string(), json!(cv));
        evidence.insert("sampleCount".to_string(), json!(intervals.len()));
        Some(Finding {
            user_id: user_id.to_string(),
            kind: FindingKind::TimingRegularity,
            severity: Severity::Medium,
            confidence: 0.7,
            evidence,
            detected_at_ms: at,
        })
    }

    /// Append a finding to the recent log, dropping the oldest when full.
    pub fn record(&self, finding: Finding) {
        let mut recent = self.recent.lock();
        if recent.len() >= MAX_RECENT_FINDINGS {
            recent.pop_front();
        }
        recent.push_back(finding);
    }

    /// Up to `limit` recorded findings, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Finding> {
        self.recent.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Recorded findings for one user, newest first.
    pub fn recent_for_user(&self, user_id: &str) -> Vec<Finding> {
        self.recent
            .lock()
            .iter()
            .rev()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Thresholds in use.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }
}
