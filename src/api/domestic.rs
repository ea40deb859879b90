use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::requests::PayBody;
use super::AppState;
use crate::domain::{Actor, DomesticDetails, Payment};
use crate::engine::DomesticQuote;
use crate::error::AppError;
use crate::orchestration::{DomesticBooking, NewDomesticRequest};

/// Price a domestic job without booking it.
pub async fn quote(
    State(state): State<AppState>,
    Json(details): Json<DomesticDetails>,
) -> Json<DomesticQuote> {
    Json(state.lifecycle.quote_domestic(&details))
}

pub async fn create_request(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewDomesticRequest>,
) -> Result<(StatusCode, Json<DomesticBooking>), AppError> {
    let booking = state.lifecycle.create_domestic_request(&actor, body).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn pay(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<PayBody>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state.lifecycle.pay_domestic(&actor, id, body.method).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}
