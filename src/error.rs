use crate::domain::{Role, ServiceStatus, ShareError};
use crate::engine::PricingError;
use crate::upstream::UpstreamError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of an engine operation. No partial state is committed on any variant.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Current status does not allow the requested move. Re-fetch and retry.
    #[error("cannot {action} from status {from}")]
    InvalidTransition {
        from: ServiceStatus,
        action: &'static str,
    },
    #[error("{role} {actor_id} may not {action}")]
    Unauthorized {
        actor_id: i64,
        role: Role,
        action: &'static str,
    },
    /// Caller bug; never silently corrected.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl EngineError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        EngineError::NotFound(format!("{} {}", entity, id))
    }
}

impl From<ShareError> for EngineError {
    fn from(err: ShareError) -> Self {
        EngineError::InvariantViolation(err.to_string())
    }
}

impl From<PricingError> for EngineError {
    fn from(err: PricingError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<UpstreamError> for EngineError {
    fn from(err: UpstreamError) -> Self {
        EngineError::UpstreamUnavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Too many requests")]
    RateLimited,
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let msg = err.to_string();
        match err {
            EngineError::InvalidTransition { .. } => AppError::Conflict(msg),
            EngineError::Unauthorized { .. } => AppError::Forbidden(msg),
            EngineError::InvariantViolation(_) | EngineError::Db(_) => AppError::Internal(msg),
            EngineError::UpstreamUnavailable(_) => AppError::Unavailable(msg),
            EngineError::NotFound(_) => AppError::NotFound(msg),
            EngineError::Validation(_) => AppError::BadRequest(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate limit exceeded, try again later".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
