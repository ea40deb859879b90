pub mod actor;
pub mod admin;
pub mod domestic;
pub mod health;
pub mod payments;
pub mod rate_limit;
pub mod requests;

use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::{LifecycleController, RatingAggregator};
use crate::upstream::PaymentConfirmation;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

pub use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub lifecycle: Arc<LifecycleController>,
    pub rating: Arc<RatingAggregator>,
    pub confirmations: mpsc::Sender<PaymentConfirmation>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        lifecycle: Arc<LifecycleController>,
        confirmations: mpsc::Sender<PaymentConfirmation>,
    ) -> Self {
        let rate_limiter = RateLimiter::per_minute(config.rate_limit_per_minute);
        Self {
            rating: Arc::new(RatingAggregator::new(repo.clone())),
            repo,
            config,
            lifecycle,
            confirmations,
            rate_limiter,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/requests", post(requests::create_request))
        .route("/requests/:id", get(requests::get_request))
        .route("/requests/:id/diagnose", post(requests::diagnose))
        .route(
            "/requests/:id/diagnosis-fee",
            post(requests::request_diagnosis_fee),
        )
        .route("/requests/:id/providers", get(requests::candidate_providers))
        .route("/requests/:id/assign", post(requests::assign_provider))
        .route(
            "/requests/:id/provider-diagnosis",
            post(requests::submit_provider_diagnosis),
        )
        .route("/requests/:id/quote", post(requests::send_quote))
        .route("/requests/:id/accept", post(requests::accept_quote))
        .route("/requests/:id/start", post(requests::start_execution))
        .route("/requests/:id/complete", post(requests::complete_execution))
        .route("/requests/:id/confirm", post(requests::confirm_completion))
        .route("/requests/:id/cancel", post(requests::cancel))
        .route("/requests/:id/review", post(requests::submit_review))
        .route("/domestic/quote", post(domestic::quote))
        .route("/domestic/requests", post(domestic::create_request))
        .route("/domestic/requests/:id/pay", post(domestic::pay))
        .route("/payments/confirm", post(payments::confirm))
        .route("/payments/fail", post(payments::fail))
        .route("/admin/flags", get(admin::list_flags))
        .route("/admin/flags/:id/resolve", post(admin::resolve_flag))
        .route("/admin/escrows.csv", get(admin::export_escrows))
        .route("/admin/escrows/:id/release", post(admin::release_escrow))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit::limit_mutations,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .nest("/v1", v1)
        .layer(cors)
        .with_state(state)
}
