//! Outbound collaborators: identity lookups, trip creation and notifications.
//!
//! The engine holds these as trait objects. `local` provides in-process
//! implementations that log instead of calling remote services.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::MatchError;
use crate::model::{MatchRequest, MatchResult, Trip, TripDraft, UserProfile};

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<UserProfile, MatchError>;
}

#[async_trait]
pub trait TripService: Send + Sync {
    async fn create_trip(&self, draft: TripDraft) -> Result<Trip, MatchError>;
}

/// Best-effort delivery; the engine logs failures and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_driver_match(
        &self,
        driver_id: Uuid,
        request: &MatchRequest,
        result: &MatchResult,
    ) -> Result<(), MatchError>;

    async fn notify_passenger_match(
        &self,
        passenger_id: Uuid,
        result: &MatchResult,
        trip: &Trip,
    ) -> Result<(), MatchError>;

    async fn notify_match_timeout(
        &self,
        passenger_id: Uuid,
        request: &MatchRequest,
    ) -> Result<(), MatchError>;
}

pub mod local {
    use chrono::Utc;
    use log::info;

    use super::*;

    /// Resolves any id to a placeholder profile.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LocalIdentityService;

    #[async_trait]
    impl IdentityService for LocalIdentityService {
        async fn get_user(&self, user_id: Uuid) -> Result<UserProfile, MatchError> {
            info!("identity lookup user_id={user_id}");
            Ok(UserProfile {
                id: user_id,
                name: format!("user-{}", &user_id.simple().to_string()[..8]),
                phone: String::new(),
                email: String::new(),
                rating: 5.0,
            })
        }
    }

    /// Issues a fresh trip id for every draft.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LocalTripService;

    #[async_trait]
    impl TripService for LocalTripService {
        async fn create_trip(&self, draft: TripDraft) -> Result<Trip, MatchError> {
            let trip = Trip {
                id: Uuid::new_v4(),
                passenger_id: draft.passenger_id,
                driver_id: draft.driver_id,
                status: "requested".to_string(),
                pickup: draft.pickup,
                dropoff: draft.dropoff,
                created_at: Utc::now(),
            };
            info!(
                "trip created trip_id={} passenger_id={} driver_id={} price={:.0}",
                trip.id, trip.passenger_id, trip.driver_id, draft.estimated_price
            );
            Ok(trip)
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct LogNotifier;

    #[async_trait]
    impl Notifier for LogNotifier {
        async fn notify_driver_match(
            &self,
            driver_id: Uuid,
            request: &MatchRequest,
            result: &MatchResult,
        ) -> Result<(), MatchError> {
            info!(
                "notify driver driver_id={driver_id} request_id={} result_id={} score={:.3}",
                request.id, result.id, result.score
            );
            Ok(())
        }

        async fn notify_passenger_match(
            &self,
            passenger_id: Uuid,
            result: &MatchResult,
            trip: &Trip,
        ) -> Result<(), MatchError> {
            info!(
                "notify passenger passenger_id={passenger_id} driver_id={} trip_id={}",
                result.driver_id, trip.id
            );
            Ok(())
        }

        async fn notify_match_timeout(
            &self,
            passenger_id: Uuid,
            request: &MatchRequest,
        ) -> Result<(), MatchError> {
            info!(
                "notify timeout passenger_id={passenger_id} request_id={}",
                request.id
            );
            Ok(())
        }
    }
}
