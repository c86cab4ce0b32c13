mod support;

use match_core::test_helpers::pickup_point;
use match_service::api::ErrorBody;
use match_service::dto::{
    AcceptMatchResponse, DriverResponse, HealthResponse, MatchRequestResponse,
    MatchResultResponse,
};
use serde_json::json;
use support::server::{create_body, json_of, TestServer};
use uuid::Uuid;

#[tokio::test]
async fn health_endpoints_report_healthy() {
    let server = TestServer::start().await;

    for path in ["/health", "/api/v1/health"] {
        let response = server.get(path).await;
        assert_eq!(response.status(), 200);
        let body: HealthResponse = json_of(response).await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.service, "match-service");
    }

    server.stop().await;
}

#[test_log::test(tokio::test)]
async fn request_match_and_accept_over_http() {
    let server = TestServer::start().await;
    let near = server.register_driver_km_north(1.0).await;
    let far = server.register_driver_km_north(3.0).await;
    let passenger = Uuid::new_v4();

    let created = server.create_request(passenger).await;
    assert_eq!(created.status.as_str(), "pending");
    assert_eq!(created.estimated_matches, 0);
    assert_eq!(created.max_wait_seconds, 600);
    assert_eq!(created.max_distance, 15.0);
    assert!(server.wait_for_status(created.id, "matched").await);

    let results: Vec<MatchResultResponse> = json_of(
        server
            .get(&format!("/api/v1/matching/requests/{}/results", created.id))
            .await,
    )
    .await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].driver_id, near.id);
    assert_eq!(results[1].driver_id, far.id);

    let offers: Vec<MatchResultResponse> = json_of(
        server
            .get(&format!("/api/v1/matching/drivers/{}/matches", far.id))
            .await,
    )
    .await;
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].passenger_id, Some(passenger));
    let pickup = offers[0].pickup_location.clone().unwrap();
    assert!((pickup.latitude - pickup_point().latitude).abs() < 1e-9);
    assert_eq!(pickup.address, pickup_point().address);

    let response = server
        .post_empty(&format!(
            "/api/v1/matching/drivers/{}/matches/{}/accept",
            far.id, offers[0].id
        ))
        .await;
    assert_eq!(response.status(), 200);
    let accepted: AcceptMatchResponse = json_of(response).await;
    assert_eq!(accepted.passenger_id, passenger);
    assert_eq!(accepted.driver_id, far.id);
    assert_eq!(accepted.status.as_str(), "accepted");

    // The sibling offer to the nearer driver is gone.
    let response = server
        .post_empty(&format!(
            "/api/v1/matching/drivers/{}/matches/{}/accept",
            near.id, results[0].id
        ))
        .await;
    assert_eq!(response.status(), 409);
    let error: ErrorBody = json_of(response).await;
    assert_eq!(error.code, "conflict");

    let history: Vec<MatchRequestResponse> = json_of(
        server
            .get(&format!("/api/v1/matching/passengers/{passenger}/requests"))
            .await,
    )
    .await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].estimated_matches, 2);

    server.stop().await;
}

#[tokio::test]
async fn malformed_input_is_a_validation_error() {
    let server = TestServer::start().await;

    let cases = [
        server.get("/api/v1/matching/requests/not-a-uuid").await,
        server
            .get("/api/v1/matching/passengers/123/requests")
            .await,
        server
            .post_empty(&format!(
                "/api/v1/matching/drivers/{}/matches/nope/accept",
                Uuid::new_v4()
            ))
            .await,
        server
            .post("/api/v1/matching/requests", json!({"passenger_id": "x"}))
            .await,
        server
            .post(
                "/api/v1/matching/requests",
                create_body(
                    Uuid::new_v4(),
                    &match_core::model::GeoPoint::new(12.0, 190.0),
                ),
            )
            .await,
    ];
    for response in cases {
        assert_eq!(response.status(), 400);
        let error: ErrorBody = json_of(response).await;
        assert_eq!(error.code, "validation_error");
    }

    server.stop().await;
}

#[tokio::test]
async fn unbounded_max_wait_is_rejected_and_not_stored() {
    let server = TestServer::start().await;
    let passenger_id = Uuid::new_v4();
    let mut body = create_body(passenger_id, &pickup_point());
    body["max_wait_seconds"] = json!(u64::MAX);

    let response = server.post("/api/v1/matching/requests", body).await;
    assert_eq!(response.status(), 400);
    let error: ErrorBody = json_of(response).await;
    assert_eq!(error.code, "validation_error");

    let history: Vec<MatchRequestResponse> = json_of(
        server
            .get(&format!("/api/v1/matching/passengers/{passenger_id}/requests"))
            .await,
    )
    .await;
    assert!(history.is_empty());

    // The server is still serving after the rejected request.
    let created = server.create_request(passenger_id).await;
    assert_eq!(created.max_wait_seconds, 600);

    server.stop().await;
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let server = TestServer::start().await;
    let id = Uuid::new_v4();

    let cases = [
        server.get(&format!("/api/v1/matching/requests/{id}")).await,
        server
            .get(&format!("/api/v1/matching/requests/{id}/results"))
            .await,
        server
            .get(&format!("/api/v1/matching/drivers/{id}/matches"))
            .await,
        server
            .put(
                &format!("/api/v1/matching/drivers/{id}/availability"),
                json!({"available": false}),
            )
            .await,
    ];
    for response in cases {
        assert_eq!(response.status(), 404);
        let error: ErrorBody = json_of(response).await;
        assert_eq!(error.code, "not_found");
    }

    server.stop().await;
}

#[tokio::test]
async fn cancel_requires_the_owning_passenger() {
    let server = TestServer::start().await;
    let passenger = Uuid::new_v4();
    let created = server.create_request(passenger).await;
    // Empty pool: the request expires, which is no longer cancellable.
    assert!(server.wait_for_status(created.id, "expired").await);

    let response = server
        .post_empty(&format!(
            "/api/v1/matching/passengers/{}/requests/{}/cancel",
            Uuid::new_v4(),
            created.id
        ))
        .await;
    assert_eq!(response.status(), 401);

    let response = server
        .post_empty(&format!(
            "/api/v1/matching/passengers/{passenger}/requests/{}/cancel",
            created.id
        ))
        .await;
    assert_eq!(response.status(), 409);

    server.register_driver_km_north(1.0).await;
    let open = server.create_request(passenger).await;
    assert!(server.wait_for_status(open.id, "matched").await);
    let response = server
        .post_empty(&format!(
            "/api/v1/matching/passengers/{passenger}/requests/{}/cancel",
            open.id
        ))
        .await;
    assert_eq!(response.status(), 200);
    let cancelled: MatchRequestResponse = json_of(response).await;
    assert_eq!(cancelled.status.as_str(), "cancelled");

    server.stop().await;
}

#[tokio::test]
async fn driver_location_and_availability_updates() {
    let server = TestServer::start().await;
    let driver = server.register_driver_km_north(1.0).await;
    let created = server.create_request(Uuid::new_v4()).await;
    assert!(server.wait_for_status(created.id, "matched").await);

    let response = server
        .put(
            &format!("/api/v1/matching/drivers/{}/location", driver.id),
            json!({"location": {"latitude": 10.78, "longitude": 106.70, "address": "District 1"}}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let moved: DriverResponse = json_of(response).await;
    assert!((moved.current_location.latitude - 10.78).abs() < 1e-9);
    assert_eq!(moved.current_location.address, "District 1");

    let response = server
        .put(
            &format!("/api/v1/matching/drivers/{}/location", driver.id),
            json!({"location": {"latitude": -91.0, "longitude": 106.70}}),
        )
        .await;
    assert_eq!(response.status(), 400);

    let offers: Vec<MatchResultResponse> = json_of(
        server
            .get(&format!(
                "/api/v1/matching/drivers/{}/matches?limit=junk",
                driver.id
            ))
            .await,
    )
    .await;
    assert_eq!(offers.len(), 1);

    let response = server
        .put(
            &format!("/api/v1/matching/drivers/{}/availability", driver.id),
            json!({"available": false}),
        )
        .await;
    assert_eq!(response.status(), 204);
    let offers: Vec<MatchResultResponse> = json_of(
        server
            .get(&format!("/api/v1/matching/drivers/{}/matches", driver.id))
            .await,
    )
    .await;
    assert!(offers.is_empty());

    server.stop().await;
}
