//! Error kinds surfaced by the matching engine.

use thiserror::Error;

/// Errors returned by engine operations.
///
/// Every variant maps to a stable machine-readable [`code`](MatchError::code)
/// that the HTTP surface forwards to clients.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("external service error: {0}")]
    ExternalService(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl MatchError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::ExternalService(_) => "external_service_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Failures of the TTL cache. Callers treat these as misses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(MatchError::not_found("result").code(), "not_found");
        assert_eq!(MatchError::validation("bad").code(), "validation_error");
        assert_eq!(MatchError::Unauthorized("x".into()).code(), "unauthorized");
        assert_eq!(MatchError::conflict("x").code(), "conflict");
        assert_eq!(
            MatchError::ExternalService("x".into()).code(),
            "external_service_error"
        );
        assert_eq!(MatchError::Internal("x".into()).code(), "internal_error");
    }

    #[test]
    fn display_includes_context() {
        assert_eq!(
            MatchError::not_found("match result 42").to_string(),
            "match result 42 not found"
        );
    }
}
