use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, warn};
use match_core::MatchError;
use serde::{Deserialize, Serialize};

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Engine error on its way to an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub MatchError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            MatchError::NotFound(_) => StatusCode::NOT_FOUND,
            MatchError::Validation(_) => StatusCode::BAD_REQUEST,
            MatchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MatchError::Conflict(_) => StatusCode::CONFLICT,
            MatchError::ExternalService(_) | MatchError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<MatchError> for ApiError {
    fn from(err: MatchError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(MatchError::validation(format!(
            "invalid request body: {}",
            rejection.body_text()
        )))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed code={} error={}", self.0.code(), self.0);
        } else {
            warn!("request rejected code={} error={}", self.0.code(), self.0);
        }

        let body = ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
