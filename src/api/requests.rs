//! Repair lifecycle endpoints.

use axum::extract::{Path, State};
use axum::http::{header::USER_AGENT, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{
    AcceptanceMetadata, Actor, AiDiagnosis, Checkpoint, ExecutionLog, NewReview,
    NewServiceRequest, Payment, PaymentMethod, ProviderDiagnosis, ProviderFindings, Reputation,
    Review, ServiceRequest,
};
use crate::error::AppError;
use crate::orchestration::{AcceptanceReceipt, CompletionReport, ProviderCandidate, RequestView};
use crate::upstream::DiagnosisPrompt;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayBody {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub provider_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    pub method: PaymentMethod,
    #[serde(default)]
    pub origin_address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub review: Review,
    pub reputation: Reputation,
}

pub async fn create_request(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewServiceRequest>,
) -> Result<(StatusCode, Json<ServiceRequest>), AppError> {
    let request = state.lifecycle.create_request(&actor, body).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<RequestView>, AppError> {
    Ok(Json(state.lifecycle.view(&actor, id).await?))
}

pub async fn diagnose(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    body: Option<Json<DiagnosisPrompt>>,
) -> Result<Json<AiDiagnosis>, AppError> {
    let prompt = body.map(|Json(p)| p).unwrap_or_default();
    Ok(Json(state.lifecycle.diagnose(&actor, id, prompt).await?))
}

pub async fn request_diagnosis_fee(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<PayBody>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state
        .lifecycle
        .request_diagnosis_fee(&actor, id, body.method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn candidate_providers(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ProviderCandidate>>, AppError> {
    Ok(Json(state.lifecycle.candidate_providers(&actor, id).await?))
}

pub async fn assign_provider(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<AssignBody>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(
        state
            .lifecycle
            .assign_provider(&actor, id, body.provider_id)
            .await?,
    ))
}

pub async fn submit_provider_diagnosis(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<ProviderFindings>,
) -> Result<Json<ProviderDiagnosis>, AppError> {
    Ok(Json(
        state
            .lifecycle
            .submit_provider_diagnosis(&actor, id, body)
            .await?,
    ))
}

pub async fn send_quote(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(state.lifecycle.send_quote(&actor, id).await?))
}

pub async fn accept_quote(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<AcceptBody>,
) -> Result<Json<AcceptanceReceipt>, AppError> {
    let metadata = AcceptanceMetadata {
        origin_address: body.origin_address.or_else(|| forwarded_for(&headers)),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    Ok(Json(
        state
            .lifecycle
            .accept_quote(&actor, id, body.method, metadata)
            .await?,
    ))
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub async fn start_execution(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    body: Option<Json<Checkpoint>>,
) -> Result<Json<ExecutionLog>, AppError> {
    let checkpoint = body.map(|Json(c)| c).unwrap_or_default();
    Ok(Json(
        state
            .lifecycle
            .start_execution(&actor, id, checkpoint)
            .await?,
    ))
}

pub async fn complete_execution(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    body: Option<Json<Checkpoint>>,
) -> Result<Json<CompletionReport>, AppError> {
    let checkpoint = body.map(|Json(c)| c).unwrap_or_default();
    Ok(Json(
        state
            .lifecycle
            .complete_execution(&actor, id, checkpoint)
            .await?,
    ))
}

pub async fn confirm_completion(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(state.lifecycle.confirm_completion(&actor, id).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(state.lifecycle.cancel(&actor, id).await?))
}

pub async fn submit_review(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<NewReview>,
) -> Result<(StatusCode, Json<ReviewResponse>), AppError> {
    let (review, reputation) = state.rating.submit(&actor, id, &body).await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse { review, reputation })))
}
