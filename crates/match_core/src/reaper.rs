use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ReaperConfig;
use crate::context::EngineContext;
use crate::error::MatchError;
use crate::model::RequestStatus;
use crate::orchestrator::expire_request;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// `Pending` requests that never got a matching pass in time.
    pub expired_pending: usize,
    /// `Matched` requests nobody accepted before `max_wait`.
    pub expired_matched: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired_pending + self.expired_matched
    }
}

/// Expires requests that outlived their `max_wait`.
///
/// A `Matched` request is only expired while none of its results is reserved
/// or accepted.
pub struct ExpiryReaper {
    ctx: Arc<EngineContext>,
    config: ReaperConfig,
}

impl ExpiryReaper {
    pub fn new(ctx: Arc<EngineContext>, config: ReaperConfig) -> Self {
        Self { ctx, config }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, MatchError> {
        let ctx = &self.ctx;
        let now = ctx.now();
        let mut report = SweepReport::default();

        let pending = ctx
            .requests
            .list_by_status(RequestStatus::Pending, self.config.batch_limit)
            .await?;
        for request in pending.iter().filter(|r| r.is_stale(now)) {
            if expire_request(ctx, request.id, true).await? {
                report.expired_pending += 1;
            }
        }

        let matched = ctx
            .requests
            .list_by_status(RequestStatus::Matched, self.config.batch_limit)
            .await?;
        for request in matched.iter().filter(|r| r.is_stale(now)) {
            if expire_request(ctx, request.id, false).await? {
                report.expired_matched += 1;
            }
        }

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` flips to `true` or its sender drops.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("expiry reaper started interval_secs={}", period.as_secs());
            loop {
                tokio::select! {
                    _ = ticker.tick() => match self.sweep_once().await {
                        Ok(report) if report.total() > 0 => info!(
                            "reaper sweep expired_pending={} expired_matched={}",
                            report.expired_pending, report.expired_matched
                        ),
                        Ok(_) => debug!("reaper sweep found nothing to expire"),
                        Err(err) => warn!("reaper sweep failed: {err}"),
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("expiry reaper stopped");
        })
    }
}
