//! Gateway webhooks.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use super::AppState;
use crate::domain::Payment;
use crate::error::AppError;
use crate::upstream::PaymentConfirmation;

/// Queue a confirmation for the worker. Accepted even if the payment was
/// already confirmed; the worker treats replays as no-ops.
pub async fn confirm(
    State(state): State<AppState>,
    Json(body): Json<PaymentConfirmation>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if body.payment_ref.trim().is_empty() {
        return Err(AppError::BadRequest("paymentRef must not be empty".to_string()));
    }
    let payment_ref = body.payment_ref.clone();
    state.confirmations.send(body).await.map_err(|_| {
        warn!("Confirmation worker is gone, dropping {}", payment_ref);
        AppError::Unavailable("confirmation worker stopped".to_string())
    })?;
    info!("Queued confirmation for {}", payment_ref);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"status": "queued", "paymentRef": payment_ref})),
    ))
}

pub async fn fail(
    State(state): State<AppState>,
    Json(body): Json<PaymentConfirmation>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.lifecycle.fail_payment(&body.payment_ref).await?))
}
