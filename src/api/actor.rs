//! Caller identity from the headers set by the upstream auth layer.

use crate::domain::{Actor, Role};
use crate::error::{AppError, EngineError};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// `Ok(None)` when neither header is present.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Option<Actor>, AppError> {
    let header = |name: &str| -> Result<Option<String>, AppError> {
        headers
            .get(name)
            .map(|v| {
                v.to_str()
                    .map(|s| s.trim().to_string())
                    .map_err(|_| AppError::BadRequest(format!("{} is not valid text", name)))
            })
            .transpose()
    };

    match (header(ACTOR_ID_HEADER)?, header(ACTOR_ROLE_HEADER)?) {
        (None, None) => Ok(None),
        (Some(id), Some(role)) => {
            let id = id
                .parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("invalid {}: {}", ACTOR_ID_HEADER, id)))?;
            let role = role.parse::<Role>().map_err(AppError::BadRequest)?;
            Ok(Some(Actor { id, role }))
        }
        _ => Err(AppError::Unauthenticated(format!(
            "both {} and {} are required",
            ACTOR_ID_HEADER, ACTOR_ROLE_HEADER
        ))),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)?.ok_or_else(|| {
            AppError::Unauthenticated(format!("missing {} header", ACTOR_ID_HEADER))
        })
    }
}

pub fn require_admin(actor: &Actor, action: &'static str) -> Result<(), AppError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(EngineError::Unauthorized {
            actor_id: actor.id,
            role: actor.role,
            action,
        }
        .into())
    }
}
