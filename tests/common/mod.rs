#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use homeserv::api::{self, AppState};
use homeserv::config::{Config, FraudConfig, PaymentMode, PricingConfig};
use homeserv::domain::{Category, CategoryKind, ManualClock, PaymentStatus, ServiceStatus, TimeMs};
use homeserv::orchestration::{
    confirmation_channel, spawn_confirmation_worker, AntifraudMonitor, EventBus, LedgerManager,
    LifecycleController,
};
use homeserv::upstream::{DbCatalog, ManualGateway, MockDiagnosisService};
use homeserv::{init_db, Decimal, Repository};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<Repository>,
    pub lifecycle: Arc<LifecycleController>,
    pub clock: ManualClock,
    _temp: TempDir,
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with_limit(1000).await
}

pub async fn setup_test_app_with_limit(rate_limit_per_minute: u32) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        diagnosis_api_url: "http://example.invalid".to_string(),
        payment_mode: PaymentMode::External,
        simulated_confirm_delay_ms: 0,
        pricing: PricingConfig::default(),
        fraud: FraudConfig::default(),
        rate_limit_per_minute,
    };

    let events = EventBus::default();
    let ledger = Arc::new(LedgerManager::new(
        repo.clone(),
        Arc::new(ManualGateway::new()),
        events.clone(),
    ));
    let antifraud = Arc::new(AntifraudMonitor::from_config(
        repo.clone(),
        events.clone(),
        &config.fraud,
    ));
    let clock = ManualClock::at(TimeMs::now());
    let lifecycle = Arc::new(
        LifecycleController::new(
            repo.clone(),
            Arc::new(MockDiagnosisService::plumbing()),
            Arc::new(DbCatalog::new(repo.clone())),
            ledger,
            antifraud,
            events,
            config.pricing.clone(),
        )
        .with_clock(Arc::new(clock.clone())),
    );

    let (tx, rx) = confirmation_channel(16);
    spawn_confirmation_worker(lifecycle.clone(), rx);
    let state = AppState::new(repo.clone(), config, lifecycle.clone(), tx);

    TestApp {
        router: api::create_router(state),
        repo,
        lifecycle,
        clock,
        _temp: temp_dir,
    }
}

/// `(id, role)` actor headers.
pub type As = Option<(i64, &'static str)>;

impl TestApp {
    pub async fn call(&self, method: &str, uri: &str, actor: As, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.call_raw(method, uri, actor, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn call_raw(
        &self,
        method: &str,
        uri: &str,
        actor: As,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = actor {
            builder = builder
                .header("x-actor-id", id.to_string())
                .header("x-actor-role", role);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    pub async fn repair_category(&self) -> Category {
        self.repo
            .insert_category("Plumbing", Decimal::from_units(15000), CategoryKind::Repair)
            .await
            .unwrap()
    }

    pub async fn status_of(&self, id: i64) -> ServiceStatus {
        self.repo.get_request(id).await.unwrap().unwrap().status
    }

    /// Send the gateway webhook and wait until the worker has recorded it.
    pub async fn confirm_payment(&self, payment_ref: &str) {
        let (status, _) = self
            .call(
                "POST",
                "/v1/payments/confirm",
                None,
                Some(serde_json::json!({ "paymentRef": payment_ref })),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        for _ in 0..200 {
            let payment = self.repo.get_payment_by_ref(payment_ref).await.unwrap().unwrap();
            if payment.status == PaymentStatus::Completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("payment {} never confirmed", payment_ref);
    }

    /// Poll until the confirmation worker has moved the request.
    pub async fn wait_for_status(&self, id: i64, expected: ServiceStatus) {
        for _ in 0..200 {
            if self.status_of(id).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "request {} stuck at {}, expected {}",
            id,
            self.status_of(id).await,
            expected
        );
    }
}

pub fn client(id: i64) -> As {
    Some((id, "client"))
}

pub fn provider(id: i64) -> As {
    Some((id, "provider"))
}

pub fn admin(id: i64) -> As {
    Some((id, "admin"))
}
