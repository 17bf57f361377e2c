use anyhow::Result;
use chrono::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::TokenConfig;
use crate::services::refresh_ledger::RefreshLedger;

/// Background jobs. Currently only refresh token pruning.
pub struct Scheduler {
    ledger: RefreshLedger,
    config: TokenConfig,
    running: Mutex<Option<JobScheduler>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(ledger: RefreshLedger, config: TokenConfig) -> Self {
        Self {
            ledger,
            config,
            running: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.prune_enabled {
            info!("Refresh token pruning is disabled in config");
            return Ok(());
        }

        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let sched = JobScheduler::new().await?;
        let ledger = self.ledger.clone();
        let retention = Duration::days(i64::from(self.config.prune_retention_days));

        let job = Job::new_async(self.config.prune_cron.as_str(), move |_uuid, _lock| {
            let ledger = ledger.clone();
            Box::pin(async move {
                if let Err(e) = prune_once(&ledger, retention).await {
                    error!(event = "job_failed", job_name = "prune_refresh_tokens", error = %e, "Refresh token pruning failed");
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;
        info!("Refresh token pruning scheduled: {}", self.config.prune_cron);

        *running = Some(sched);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(mut sched) = self.running.lock().await.take() {
            sched.shutdown().await?;
            info!("Scheduler stopped");
        }
        Ok(())
    }
}

/// Deletes refresh tokens that expired more than `retention` ago.
pub async fn prune_once(ledger: &RefreshLedger, retention: Duration) -> Result<u64> {
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "prune_refresh_tokens", "Pruning expired refresh tokens");

    let removed = ledger.prune(retention).await?;

    info!(
        event = "job_finished",
        job_name = "prune_refresh_tokens",
        removed,
        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Refresh token pruning finished"
    );
    Ok(removed)
}
