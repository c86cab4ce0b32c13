//! HTTP surface over the matching engine.

pub mod error;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use log::info;
use match_core::{MatchEngine, MatchError};
use uuid::Uuid;

use crate::dto::{
    AcceptMatchResponse, CreateMatchRequest, DriverResponse, HealthResponse, LimitQuery,
    MatchRequestResponse, MatchResultResponse, RegisterDriver, UpdateDriverAvailability,
    UpdateDriverLocation,
};
pub use error::{ApiError, ErrorBody};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<MatchEngine>,
}

impl AppState {
    pub fn new(engine: Arc<MatchEngine>) -> Self {
        Self { engine }
    }
}

pub fn router(state: AppState) -> Router {
    let matching = Router::new()
        .route("/requests", post(create_request))
        .route("/requests/:request_id", get(get_request))
        .route("/requests/:request_id/results", get(list_request_results))
        .route(
            "/passengers/:passenger_id/requests",
            get(list_passenger_requests),
        )
        .route(
            "/passengers/:passenger_id/requests/:request_id/cancel",
            post(cancel_request),
        )
        .route("/drivers", post(register_driver))
        .route("/drivers/:driver_id/matches", get(list_driver_matches))
        .route(
            "/drivers/:driver_id/matches/:match_result_id/accept",
            post(accept_match),
        )
        .route("/drivers/:driver_id/location", put(update_driver_location))
        .route(
            "/drivers/:driver_id/availability",
            put(update_driver_availability),
        );

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .nest("/api/v1/matching", matching)
        .with_state(state)
}

fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| MatchError::validation(format!("invalid {what} id '{raw}'")).into())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.engine.context().now()))
}

async fn create_request(
    State(state): State<AppState>,
    payload: Result<Json<CreateMatchRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MatchRequestResponse>)> {
    let Json(body) = payload?;
    let view = state
        .engine
        .orchestrator()
        .create_request(body.into_new_request())
        .await?;
    info!(
        "match request created request_id={} passenger_id={}",
        view.request.id, view.request.passenger_id
    );
    Ok((StatusCode::CREATED, Json(view.into())))
}

async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<MatchRequestResponse>> {
    let request_id = parse_id(&request_id, "request")?;
    let view = state.engine.orchestrator().get_request(request_id).await?;
    Ok(Json(view.into()))
}

async fn list_request_results(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<Vec<MatchResultResponse>>> {
    let request_id = parse_id(&request_id, "request")?;
    let orchestrator = state.engine.orchestrator();
    // 404 for unknown requests rather than an empty list.
    orchestrator.get_request(request_id).await?;
    let results = orchestrator.list_results(request_id).await?;
    Ok(Json(results.into_iter().map(Into::into).collect()))
}

async fn list_passenger_requests(
    State(state): State<AppState>,
    Path(passenger_id): Path<String>,
) -> ApiResult<Json<Vec<MatchRequestResponse>>> {
    let passenger_id = parse_id(&passenger_id, "passenger")?;
    let views = state
        .engine
        .orchestrator()
        .list_passenger_requests(passenger_id)
        .await?;
    Ok(Json(views.into_iter().map(Into::into).collect()))
}

async fn cancel_request(
    State(state): State<AppState>,
    Path((passenger_id, request_id)): Path<(String, String)>,
) -> ApiResult<Json<MatchRequestResponse>> {
    let passenger_id = parse_id(&passenger_id, "passenger")?;
    let request_id = parse_id(&request_id, "request")?;
    let view = state
        .engine
        .orchestrator()
        .cancel_request(passenger_id, request_id)
        .await?;
    Ok(Json(view.into()))
}

async fn register_driver(
    State(state): State<AppState>,
    payload: Result<Json<RegisterDriver>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DriverResponse>)> {
    let Json(body) = payload?;
    let driver = body.into_driver(state.engine.context().now())?;
    state.engine.pool().register(driver.clone()).await?;
    info!(
        "driver registered driver_id={} vehicle={}",
        driver.id, driver.vehicle_class
    );
    Ok((StatusCode::CREATED, Json(driver.into())))
}

async fn list_driver_matches(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<MatchResultResponse>>> {
    let driver_id = parse_id(&driver_id, "driver")?;
    let matches = state
        .engine
        .orchestrator()
        .list_driver_matches(driver_id, query.value())
        .await?;
    Ok(Json(matches.into_iter().map(Into::into).collect()))
}

async fn accept_match(
    State(state): State<AppState>,
    Path((driver_id, match_result_id)): Path<(String, String)>,
) -> ApiResult<Json<AcceptMatchResponse>> {
    let driver_id = parse_id(&driver_id, "driver")?;
    let match_result_id = parse_id(&match_result_id, "match result")?;
    let outcome = state
        .engine
        .acceptance()
        .accept(driver_id, match_result_id)
        .await?;
    info!(
        "match accepted match_result_id={match_result_id} driver_id={driver_id} trip_id={}",
        outcome.trip.id
    );
    Ok(Json(outcome.into()))
}

async fn update_driver_location(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    payload: Result<Json<UpdateDriverLocation>, JsonRejection>,
) -> ApiResult<Json<DriverResponse>> {
    let driver_id = parse_id(&driver_id, "driver")?;
    let Json(body) = payload?;
    body.location.validate("location")?;
    let now = state.engine.context().now();
    let driver = state
        .engine
        .pool()
        .update_location(driver_id, body.location, now)
        .await?;
    Ok(Json(driver.into()))
}

async fn update_driver_availability(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    payload: Result<Json<UpdateDriverAvailability>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let driver_id = parse_id(&driver_id, "driver")?;
    let Json(body) = payload?;
    state
        .engine
        .pool()
        .set_availability(driver_id, body.available)
        .await?;
    info!(
        "driver availability changed driver_id={driver_id} available={}",
        body.available
    );
    Ok(StatusCode::NO_CONTENT)
}
