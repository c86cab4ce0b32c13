#![allow(dead_code)]

use std::sync::Arc;

use match_core::clock::ManualClock;
use match_core::config::{EngineConfig, ReaperConfig};
use match_core::context::EngineDeps;
use match_core::model::{Driver, MatchRequest, MatchResult, NewMatchRequest, RequestStatus};
use match_core::test_helpers::{eventually, fixture_now, RecordingNotifier};
use match_core::MatchEngine;
use uuid::Uuid;

/// Engine defaults with the periodic reaper off, so tests drive expiry explicitly.
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_reaper(ReaperConfig {
        enabled: false,
        ..ReaperConfig::default()
    })
}

/// A started engine plus handles on its recording notifier and manual clock.
pub struct Harness {
    pub engine: MatchEngine,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn start(config: EngineConfig) -> Self {
        Self::start_with(EngineDeps::in_memory(), config)
    }

    pub fn start_with(deps: EngineDeps, config: EngineConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(fixture_now()));
        let deps = deps
            .with_notifier(notifier.clone())
            .with_clock(clock.clone());
        let engine = MatchEngine::start(deps, config).expect("test config is valid");
        Self {
            engine,
            notifier,
            clock,
        }
    }

    pub async fn add_drivers(&self, drivers: impl IntoIterator<Item = Driver>) {
        for driver in drivers {
            self.engine
                .pool()
                .register(driver)
                .await
                .expect("driver is valid");
        }
    }

    pub async fn status(&self, request_id: Uuid) -> RequestStatus {
        self.engine
            .orchestrator()
            .get_request(request_id)
            .await
            .expect("request exists")
            .request
            .status
    }

    pub async fn wait_for_status(&self, request_id: Uuid, expected: RequestStatus) -> bool {
        let requests = Arc::clone(&self.engine.context().requests);
        eventually(|| {
            let requests = Arc::clone(&requests);
            async move {
                matches!(requests.get(request_id).await, Ok(request) if request.status == expected)
            }
        })
        .await
    }

    /// Notifications are sent after the status change, so poll for them too.
    pub async fn wait_for_timeout_notice(&self, request_id: Uuid) -> bool {
        let notifier = Arc::clone(&self.notifier);
        eventually(|| {
            let notifier = Arc::clone(&notifier);
            async move { notifier.timeouts().contains(&request_id) }
        })
        .await
    }

    pub async fn wait_for_passenger_notices(&self, count: usize) -> bool {
        let notifier = Arc::clone(&self.notifier);
        eventually(|| {
            let notifier = Arc::clone(&notifier);
            async move { notifier.passenger_notifications().len() >= count }
        })
        .await
    }

    /// Submit `new` and wait until background matching marks it `Matched`.
    pub async fn matched_request(&self, new: NewMatchRequest) -> (MatchRequest, Vec<MatchResult>) {
        let view = self
            .engine
            .orchestrator()
            .create_request(new)
            .await
            .expect("request accepted");
        assert!(
            self.wait_for_status(view.request.id, RequestStatus::Matched)
                .await,
            "request {} never matched",
            view.request.id
        );
        let results = self
            .engine
            .orchestrator()
            .list_results(view.request.id)
            .await
            .expect("results listed");
        (view.request, results)
    }

    pub async fn stop(self) {
        self.engine.shutdown().await;
    }
}
