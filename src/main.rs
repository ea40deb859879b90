use anyhow::Context;
use homeserv::api::{self, rate_limit::spawn_purge_task, AppState};
use homeserv::config::{Config, PaymentMode};
use homeserv::orchestration::{
    confirmation_channel, spawn_confirmation_worker, spawn_event_logger, AntifraudMonitor,
    EventBus, LedgerManager, LifecycleController,
};
use homeserv::upstream::{
    DbCatalog, HttpDiagnosisService, ManualGateway, PaymentGateway, SimulatedGateway,
};
use homeserv::{init_db, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));

    let events = EventBus::default();
    let _event_logger = spawn_event_logger(&events);

    let (confirm_tx, confirm_rx) = confirmation_channel(256);
    let gateway: Arc<dyn PaymentGateway> = match config.payment_mode {
        PaymentMode::Simulated => Arc::new(SimulatedGateway::new(
            confirm_tx.clone(),
            Duration::from_millis(config.simulated_confirm_delay_ms),
        )),
        PaymentMode::External => Arc::new(ManualGateway::new()),
    };

    let ledger = Arc::new(LedgerManager::new(repo.clone(), gateway, events.clone()));
    let antifraud = Arc::new(AntifraudMonitor::from_config(
        repo.clone(),
        events.clone(),
        &config.fraud,
    ));
    let lifecycle = Arc::new(LifecycleController::new(
        repo.clone(),
        Arc::new(HttpDiagnosisService::new(config.diagnosis_api_url.clone())),
        Arc::new(DbCatalog::new(repo.clone())),
        ledger,
        antifraud,
        events,
        config.pricing.clone(),
    ));
    let _confirmation_worker = spawn_confirmation_worker(lifecycle.clone(), confirm_rx);

    let state = AppState::new(repo, config, lifecycle, confirm_tx);
    let _purge = spawn_purge_task(state.rate_limiter.clone());
    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
