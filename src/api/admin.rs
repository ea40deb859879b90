//! Fraud review and ledger endpoints. Admin only.

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::actor::require_admin;
use super::AppState;
use crate::domain::{Actor, AntifraudFlag, PaymentEscrow, ServiceStatus};
use crate::error::{AppError, EngineError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagsQuery {
    /// Defaults to true.
    pub pending: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub released: bool,
    pub escrow: PaymentEscrow,
}

pub async fn list_flags(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<FlagsQuery>,
) -> Result<Json<Vec<AntifraudFlag>>, AppError> {
    let pending_only = params.pending.unwrap_or(true);
    Ok(Json(
        state
            .lifecycle
            .antifraud()
            .list_flags(&actor, pending_only)
            .await?,
    ))
}

pub async fn resolve_flag(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<AntifraudFlag>, AppError> {
    Ok(Json(state.lifecycle.antifraud().resolve(&actor, id).await?))
}

pub async fn export_escrows(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&actor, "export escrows")?;
    let body = state.lifecycle.ledger().export_escrows_csv().await?;
    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"escrows.csv\""),
        ],
        body,
    ))
}

/// Retry a release that failed after completion. Idempotent.
pub async fn release_escrow(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<ReleaseResponse>, AppError> {
    require_admin(&actor, "release escrow")?;
    let escrow = state
        .repo
        .get_escrow(id)
        .await?
        .ok_or_else(|| EngineError::not_found("escrow", id))?;
    let request = state
        .repo
        .get_request(escrow.service_request_id)
        .await?
        .ok_or_else(|| EngineError::not_found("service request", escrow.service_request_id))?;
    if request.status != ServiceStatus::Completed {
        return Err(EngineError::InvalidTransition {
            from: request.status,
            action: "release escrow",
        }
        .into());
    }

    let released = state.lifecycle.ledger().release_escrow(id).await?;
    let escrow = state
        .repo
        .get_escrow(id)
        .await?
        .ok_or_else(|| EngineError::not_found("escrow", id))?;
    Ok(Json(ReleaseResponse { released, escrow }))
}
