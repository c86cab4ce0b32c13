use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header, Method};
use dotenv::dotenv;
use log::{info, warn};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer, MaxAge};

use match_core::context::EngineDeps;
use match_core::MatchEngine;
use match_service::api::{self, AppState};
use match_service::config::ServiceConfig;
use match_service::seed;

fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT])
        .allow_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
        ])
        .max_age(MaxAge::exact(Duration::from_secs(3600)));

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    layer.allow_origin(AllowOrigin::list(
        origins.iter().filter_map(|origin| match origin.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!("ignoring malformed CORS origin {origin:?}");
                None
            }
        }),
    ))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing `.env` is fine; the process environment still applies.
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::from_env().context("invalid service configuration")?;
    let engine = MatchEngine::start(EngineDeps::in_memory(), config.to_engine_config())
        .context("failed to start matching engine")?;

    if let Some(path) = &config.driver_seed {
        let entries = seed::read_seed(path)?;
        let added = seed::seed_pool(engine.pool(), entries, engine.context().now()).await?;
        info!("seeded driver pool path={} drivers={added}", path.display());
    }

    let engine = Arc::new(engine);
    let app = api::router(AppState::new(Arc::clone(&engine))).layer(cors(&config.allowed_origins));

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("match service listening addr={}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.shutdown().await,
        Err(_) => warn!("engine still shared at exit; skipping queue drain"),
    }
    info!("match service stopped");
    Ok(())
}
