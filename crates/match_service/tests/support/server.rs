#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use match_core::clock::ManualClock;
use match_core::config::{EngineConfig, ReaperConfig};
use match_core::context::EngineDeps;
use match_core::model::GeoPoint;
use match_core::test_helpers::{driver_km_north_of, fixture_now, pickup_point};
use match_core::MatchEngine;
use match_service::api::{self, AppState};
use match_service::dto::{DriverResponse, MatchRequestResponse};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// The API router served on an ephemeral local port.
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
    pub engine: Arc<MatchEngine>,
    pub clock: Arc<ManualClock>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let clock = Arc::new(ManualClock::new(fixture_now()));
        let config = EngineConfig::default().with_reaper(ReaperConfig {
            enabled: false,
            ..ReaperConfig::default()
        });
        let engine = MatchEngine::start(EngineDeps::in_memory().with_clock(clock.clone()), config)
            .expect("test config is valid");
        let engine = Arc::new(engine);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = api::router(AppState::new(Arc::clone(&engine)));
        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    signal.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: Client::new(),
            engine,
            clock,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.client.post(self.url(path)).json(&body).send().await.unwrap()
    }

    pub async fn post_empty(&self, path: &str) -> Response {
        self.client.post(self.url(path)).send().await.unwrap()
    }

    pub async fn put(&self, path: &str, body: Value) -> Response {
        self.client.put(self.url(path)).json(&body).send().await.unwrap()
    }

    /// Register a car driver `km` north of the shared pickup point.
    pub async fn register_driver_km_north(&self, km: f64) -> DriverResponse {
        let location = driver_km_north_of(&pickup_point(), km).location;
        let response = self
            .post(
                "/api/v1/matching/drivers",
                json!({"current_location": location, "car_type": "car_4_seat", "rating": 4.6}),
            )
            .await;
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    pub async fn create_request(&self, passenger_id: Uuid) -> MatchRequestResponse {
        let response = self
            .post(
                "/api/v1/matching/requests",
                create_body(passenger_id, &pickup_point()),
            )
            .await;
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    /// Poll the request until it reaches `status`; false after two seconds.
    pub async fn wait_for_status(&self, request_id: Uuid, status: &str) -> bool {
        for _ in 0..200 {
            let body: Value = json_of(self.get(&format!("/api/v1/matching/requests/{request_id}")).await).await;
            if body["status"] == status {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap();
        if let Ok(engine) = Arc::try_unwrap(self.engine) {
            engine.shutdown().await;
        }
    }
}

pub fn create_body(passenger_id: Uuid, pickup: &GeoPoint) -> Value {
    json!({
        "passenger_id": passenger_id,
        "pickup_location": pickup,
        "dropoff_location": {"latitude": 10.7626, "longitude": 106.6822, "address": "Ben Thanh Market"},
    })
}

pub async fn json_of<T: DeserializeOwned>(response: Response) -> T {
    response.json().await.unwrap()
}
