use crate::api::AdminApi;
use crate::config::MgmtConfig;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use voteguard_core::ModerationEngine;

/// Load config, build the engine, then run the admin API and the retention
/// sweeper until either stops.
pub async fn serve(config_path: &Path) -> Result<()> {
    let config = if config_path.exists() {
        MgmtConfig::from_file(config_path)?
    } else {
        tracing::warn!("Config file not found, using defaults: {}", config_path.display());
        MgmtConfig::default()
    };

    let engine = Arc::new(ModerationEngine::new(config.guard.clone())?);
    let config = Arc::new(config);
    let api = AdminApi::new(engine.clone(), config.clone());

    let sweep_api = api.clone();
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    let sweep_handle = tokio::spawn(async move {
        sweep_loop(engine, sweep_api, sweep_interval).await;
    });

    let api_handle = tokio::spawn(async move {
        if let Err(e) = api.serve().await {
            tracing::error!("API serve error: {}", e);
        }
    });

    tokio::select! {
        _ = sweep_handle => {}
        _ = api_handle => {}
    }

    Ok(())
}

/// Periodically evict expired history and lapsed flags.
pub async fn sweep_loop(engine: Arc<ModerationEngine>, api: AdminApi, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let report = engine.sweep();
        api.prune_auth();
        if report.records_evicted > 0 || report.flags_expired > 0 {
            tracing::info!(
                records = report.records_evicted,
                stamps = report.stamps_evicted,
                ledgers = report.ledgers_dropped,
                flags = report.flags_expired,
                "retention sweep"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voteguard_core::{GuardConfig, ManualClock, VoteDirection, VoteRequest};

    #[tokio::test(start_paused = true)]
    async fn test_sweep_loop_evicts_on_tick() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = Arc::new(
            ModerationEngine::builder(GuardConfig::default())
                .clock(clock.clone())
                .build()
                .unwrap(),
        );
        engine.validate_vote(VoteRequest::new("u1", "a1", VoteDirection::Up));
        clock.advance_ms(3_600_001);

        let api = AdminApi::new(engine.clone(), Arc::new(MgmtConfig::default()));
        let handle = tokio::spawn(sweep_loop(engine.clone(), api, Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(engine.tracked_users(), 0);
        assert_eq!(engine.metrics().sweep_records_evicted.get(), 1);
        handle.abort();
    }
}
