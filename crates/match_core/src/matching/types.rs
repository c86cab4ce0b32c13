use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{MatchResult, ResultStatus};

/// A driver scored against one request, with the estimates shown to both parties.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub driver_id: Uuid,
    /// Always within [0, 1].
    pub score: f64,
    /// Driver to pickup.
    pub distance_km: f64,
    pub pickup_time: Duration,
    /// Pickup to dropoff fare for the driver's vehicle class.
    pub price: f64,
}

impl ScoredCandidate {
    /// Materialise a `Pending` result row for `request_id`.
    pub fn into_result(self, request_id: Uuid, now: DateTime<Utc>) -> MatchResult {
        MatchResult {
            id: Uuid::new_v4(),
            request_id,
            driver_id: self.driver_id,
            score: self.score,
            estimated_distance_km: self.distance_km,
            estimated_pickup_time: self.pickup_time,
            estimated_price: self.price,
            status: ResultStatus::Pending,
            match_time: now,
            created_at: now,
        }
    }
}
