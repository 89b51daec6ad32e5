//! Engine counters and Prometheus text rendering.

use crate::stats::GuardStats;
use crate::types::DenialKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

#[allow(missing_docs)]
impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Engine counters, rendered in Prometheus text format.
#[allow(missing_docs)]
#[derive(Debug, Default)]
pub struct GuardMetrics {
    pub votes_allowed: Counter,
    pub votes_denied_flagged: Counter,
    pub votes_denied_burst: Counter,
    pub votes_denied_hourly: Counter,
    pub votes_denied_address: Counter,
    pub votes_denied_bias: Counter,
    pub votes_denied_duplicate: Counter,
    pub findings_registered: Counter,
    pub flags_raised: Counter,
    pub reports_submitted: Counter,
    pub reports_reviewed: Counter,
    pub sweep_records_evicted: Counter,
}

#[allow(missing_docs)]
impl GuardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied(&self, kind: DenialKind) -> &Counter {
        match kind {
            DenialKind::Flagged => &self.votes_denied_flagged,
            DenialKind::Burst => &self.votes_denied_burst,
            DenialKind::HourlyQuota => &self.votes_denied_hourly,
            DenialKind::AddressQuota => &self.votes_denied_address,
            DenialKind::DirectionalBias => &self.votes_denied_bias,
            DenialKind::Duplicate => &self.votes_denied_duplicate,
        }
    }

    pub fn votes_denied_total(&self) -> u64 {
        DenialKind::ALL.iter().map(|k| self.denied(*k).get()).sum()
    }

    pub fn render_prometheus(&self, stats: &GuardStats) -> String {
        let mut output = String::new();

        output.push_str("# TYPE voteguard_votes_allowed_total counter\n");
        output.push_str(&format!(
            "voteguard_votes_allowed_total {}\n\n",
            self.votes_allowed.get()
        ));

        output.push_str("# TYPE voteguard_votes_denied_total counter\n");
        for kind in DenialKind::ALL {
            output.push_str(&format!(
                "voteguard_votes_denied_total{{reason=\"{}\"}} {}\n",
                kind.as_str(),
                self.denied(kind).get()
            ));
        }
        output.push('\n');

        for (name, counter) in [
            ("voteguard_findings_registered_total", &self.findings_registered),
            ("voteguard_flags_raised_total", &self.flags_raised),
            ("voteguard_reports_submitted_total", &self.reports_submitted),
            ("voteguard_reports_reviewed_total", &self.reports_reviewed),
            ("voteguard_sweep_records_evicted_total", &self.sweep_records_evicted),
        ] {
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n\n", name, counter.get()));
        }

        for (name, value) in [
            ("voteguard_reports_pending", stats.pending_reports),
            ("voteguard_reports_total", stats.total_reports),
            ("voteguard_flagged_users", stats.suspicious_users),
        ] {
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{} {}\n\n", name, value));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_counters_by_kind() {
        let metrics = GuardMetrics::new();
        metrics.denied(DenialKind::Burst).inc();
        metrics.denied(DenialKind::Burst).inc();
        metrics.denied(DenialKind::Duplicate).add(3);
        assert_eq!(metrics.votes_denied_burst.get(), 2);
        assert_eq!(metrics.votes_denied_total(), 5);
    }

    #[test]
    fn test_render_prometheus() {
        let metrics = GuardMetrics::new();
        metrics.votes_allowed.add(7);
        metrics.denied(DenialKind::Flagged).inc();
        let stats = GuardStats {
            pending_reports: 4,
            suspicious_users: 2,
            ..GuardStats::default()
        };
        let output = metrics.render_prometheus(&stats);
        assert!(output.contains("# TYPE voteguard_votes_allowed_total counter"));
        assert!(output.contains("voteguard_votes_allowed_total 7"));
        assert!(output.contains("voteguard_votes_denied_total{reason=\"flagged\"} 1"));
        assert!(output.contains("voteguard_reports_pending 4"));
        assert!(output.contains("voteguard_flagged_users 2"));
    }
}
