use std::sync::Arc;

use log::{error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::acceptance::AcceptanceCoordinator;
use crate::config::{ConfigError, EngineConfig};
use crate::context::{EngineContext, EngineDeps};
use crate::orchestrator::MatchOrchestrator;
use crate::pool::CandidatePool;
use crate::reaper::ExpiryReaper;
use crate::worker::MatchWorkerPool;

/// A running matching engine: workers, reaper and the façades over them.
///
/// Must be started inside a tokio runtime.
pub struct MatchEngine {
    ctx: Arc<EngineContext>,
    orchestrator: MatchOrchestrator,
    acceptance: AcceptanceCoordinator,
    workers: MatchWorkerPool,
    reaper: Option<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl MatchEngine {
    pub fn start(deps: EngineDeps, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ctx = Arc::new(EngineContext::new(deps, &config));
        let workers = MatchWorkerPool::start(Arc::clone(&ctx), &config.workers);
        let orchestrator = MatchOrchestrator::new(Arc::clone(&ctx), workers.sender());
        let acceptance = AcceptanceCoordinator::new(Arc::clone(&ctx));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let reaper = config
            .reaper
            .enabled
            .then(|| ExpiryReaper::new(Arc::clone(&ctx), config.reaper).spawn(shutdown_rx));

        info!(
            "matching engine started strategy={} max_results={} radius_km={}",
            ctx.strategy.name(),
            ctx.config.max_results,
            ctx.config.search_radius_km
        );
        Ok(Self {
            ctx,
            orchestrator,
            acceptance,
            workers,
            reaper,
            shutdown,
        })
    }

    pub fn orchestrator(&self) -> &MatchOrchestrator {
        &self.orchestrator
    }

    pub fn acceptance(&self) -> &AcceptanceCoordinator {
        &self.acceptance
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.ctx.pool
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Stop the reaper, drain queued jobs and join the workers.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Some(reaper) = self.reaper {
            if let Err(err) = reaper.await {
                error!("expiry reaper panicked: {err}");
            }
        }
        self.workers.shutdown().await;
        info!("matching engine stopped");
    }
}
