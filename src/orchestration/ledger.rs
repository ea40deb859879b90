//! Payments and escrow: creation, confirmation bookkeeping, release and export.

use crate::db::repo::is_unique_violation;
use crate::db::Repository;
use crate::domain::{
    Decimal, DomainEvent, EscrowShares, Payment, PaymentEscrow, PaymentKind, PaymentMethod,
    PaymentStatus, TimeMs,
};
use crate::error::EngineError;
use crate::upstream::PaymentGateway;
use sqlx::sqlite::Sqlite;
use sqlx::Executor;
use std::sync::Arc;
use tracing::{info, warn};

use super::events::EventBus;

#[derive(Debug, Clone)]
pub struct LedgerManager {
    repo: Arc<Repository>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventBus,
}

impl LedgerManager {
    pub fn new(repo: Arc<Repository>, gateway: Arc<dyn PaymentGateway>, events: EventBus) -> Self {
        Self {
            repo,
            gateway,
            events,
        }
    }

    /// Ask the gateway for a charge reference. Nothing is persisted.
    pub async fn initiate(&self, amount: Decimal, method: PaymentMethod) -> Result<String, EngineError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(EngineError::Validation(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        Ok(self.gateway.initiate(amount, method).await?)
    }

    /// Tell the gateway a payment row is committed. Call after commit only.
    pub async fn payment_recorded(&self, payment: &Payment) {
        self.gateway.payment_recorded(&payment.payment_ref).await;
    }

    /// Create a pending payment of `kind` for a request.
    ///
    /// If the request already has a pending or completed payment of that kind,
    /// that payment is returned and the gateway is not charged again.
    pub async fn create_payment(
        &self,
        service_request_id: i64,
        kind: PaymentKind,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Payment, EngineError> {
        if let Some(existing) = self.repo.active_payment(service_request_id, kind).await? {
            return Ok(existing);
        }

        let payment_ref = self.initiate(amount, method).await?;
        let inserted = Repository::insert_payment(
            self.repo.pool(),
            service_request_id,
            kind,
            amount,
            method,
            &payment_ref,
            TimeMs::now(),
        )
        .await;

        match inserted {
            Ok(payment) => {
                info!(
                    "Payment {} ({}) of {} created for request {}",
                    payment.id,
                    kind.as_str(),
                    amount,
                    service_request_id
                );
                self.payment_recorded(&payment).await;
                Ok(payment)
            }
            Err(e) if is_unique_violation(&e) => self
                .repo
                .active_payment(service_request_id, kind)
                .await?
                .ok_or_else(|| {
                    EngineError::InvariantViolation(format!(
                        "payment slot for request {} taken but no active payment found",
                        service_request_id
                    ))
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Escrow funds for a recorded payment. The hold must equal the payment amount.
    pub async fn create_escrow<'e, E>(
        executor: E,
        payment: &Payment,
        shares: &EscrowShares,
        at: TimeMs,
    ) -> Result<PaymentEscrow, EngineError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if shares.hold_amount() != payment.amount {
            return Err(EngineError::InvariantViolation(format!(
                "escrow hold {} does not match payment {} amount {}",
                shares.hold_amount(),
                payment.id,
                payment.amount
            )));
        }
        Ok(Repository::insert_escrow(
            executor,
            payment.id,
            payment.service_request_id,
            shares,
            at,
        )
        .await?)
    }

    /// Mark a pending payment failed. Completed payments are left alone.
    pub async fn fail_payment(&self, payment_ref: &str) -> Result<Payment, EngineError> {
        let payment = self
            .repo
            .get_payment_by_ref(payment_ref)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", payment_ref))?;

        if payment.status == PaymentStatus::Completed {
            return Err(EngineError::Validation(format!(
                "payment {} already completed",
                payment_ref
            )));
        }
        if Repository::mark_payment_failed(self.repo.pool(), payment_ref).await? {
            warn!("Payment {} marked failed", payment_ref);
        }
        self.repo
            .get_payment_by_ref(payment_ref)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", payment_ref))
    }

    /// holding -> released. Releasing twice is a no-op; returns whether this call released it.
    ///
    /// Refused unless the escrowed payment has been collected.
    pub async fn release_escrow(&self, escrow_id: i64) -> Result<bool, EngineError> {
        let escrow = self
            .repo
            .get_escrow(escrow_id)
            .await?
            .ok_or_else(|| EngineError::not_found("escrow", escrow_id))?;
        let payment = self
            .repo
            .get_payment(escrow.payment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", escrow.payment_id))?;
        if payment.status != PaymentStatus::Completed {
            return Err(EngineError::InvariantViolation(format!(
                "escrow {} holds payment {} which is {}, not collected",
                escrow_id,
                payment.id,
                payment.status.as_str()
            )));
        }

        let released = self.repo.release_escrow(escrow_id, TimeMs::now()).await?;
        if released {
            info!(
                "Escrow {} released for request {} ({} held)",
                escrow_id,
                escrow.service_request_id,
                escrow.shares.hold_amount()
            );
            self.events.publish(DomainEvent::EscrowReleased {
                service_request_id: escrow.service_request_id,
                escrow_id,
            });
        }
        Ok(released)
    }

    /// Release the escrow attached to a request, if there is one.
    pub async fn release_for_request(&self, service_request_id: i64) -> Result<bool, EngineError> {
        match self.repo.get_escrow_for_request(service_request_id).await? {
            Some(escrow) => self.release_escrow(escrow.id).await,
            None => {
                warn!("Request {} completed without an escrow", service_request_id);
                Ok(false)
            }
        }
    }

    /// Every escrow as CSV, one row per escrow.
    pub async fn export_escrows_csv(&self) -> Result<String, EngineError> {
        let escrows = self.repo.list_escrows().await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        let csv_err = |e: csv::Error| EngineError::InvariantViolation(format!("csv export: {}", e));

        writer
            .write_record([
                "escrow_id",
                "payment_id",
                "service_request_id",
                "hold_amount",
                "platform_share",
                "provider_share",
                "supplier_share",
                "status",
                "created_at",
                "released_at",
            ])
            .map_err(csv_err)?;

        for escrow in &escrows {
            writer
                .write_record([
                    escrow.id.to_string(),
                    escrow.payment_id.to_string(),
                    escrow.service_request_id.to_string(),
                    escrow.shares.hold_amount().to_canonical_string(),
                    escrow.shares.platform_share().to_canonical_string(),
                    escrow.shares.provider_share().to_canonical_string(),
                    escrow.shares.supplier_share().to_canonical_string(),
                    escrow.status.as_str().to_string(),
                    escrow.created_at.as_ms().to_string(),
                    escrow
                        .released_at
                        .map(|t| t.as_ms().to_string())
                        .unwrap_or_default(),
                ])
                .map_err(csv_err)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| EngineError::InvariantViolation(format!("csv export: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| EngineError::InvariantViolation(format!("csv export: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::setup_repo;
    use crate::domain::{CategoryKind, EscrowStatus, NewServiceRequest, ServiceStatus};
    use crate::upstream::ManualGateway;

    async fn seed_request(repo: &Repository) -> i64 {
        let client = repo.insert_client("Carla", None).await.unwrap();
        let category = repo
            .insert_category("Plumbing", Decimal::from_units(15000), CategoryKind::Repair)
            .await
            .unwrap();
        let new = NewServiceRequest {
            category_id: category.id,
            title: "t".to_string(),
            description: "d".to_string(),
            sla_priority: Default::default(),
            location: None,
        };
        Repository::insert_request(
            repo.pool(),
            client.id,
            &category,
            &new,
            ServiceStatus::AiDiagnosed,
            None,
            None,
            TimeMs::new(0),
        )
        .await
        .unwrap()
        .id
    }

    fn ledger(repo: Arc<Repository>, gateway: ManualGateway) -> LedgerManager {
        LedgerManager::new(repo, Arc::new(gateway), EventBus::default())
    }

    #[tokio::test]
    async fn test_create_payment_reuses_active_payment() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        let ledger = ledger(repo.clone(), ManualGateway::new());

        let first = ledger
            .create_payment(req, PaymentKind::DiagnosisFee, Decimal::from_units(3000), PaymentMethod::Pix)
            .await
            .unwrap();
        let second = ledger
            .create_payment(req, PaymentKind::DiagnosisFee, Decimal::from_units(3000), PaymentMethod::Card)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, PaymentStatus::Pending);
        assert_eq!(repo.list_payments(req).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_records_nothing() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        let ledger = ledger(repo.clone(), ManualGateway::unavailable("down"));

        let err = ledger
            .create_payment(req, PaymentKind::DiagnosisFee, Decimal::from_units(3000), PaymentMethod::Pix)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UpstreamUnavailable(_)));
        assert!(repo.list_payments(req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_escrow_hold_must_match_payment() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        let ledger = ledger(repo.clone(), ManualGateway::new());
        let payment = ledger
            .create_payment(req, PaymentKind::Service, Decimal::from_units(22000), PaymentMethod::Pix)
            .await
            .unwrap();

        let wrong = EscrowShares::new(
            Decimal::from_units(20000),
            Decimal::from_units(2000),
            Decimal::from_units(18000),
            Decimal::zero(),
        )
        .unwrap();
        let err = LedgerManager::create_escrow(repo.pool(), &payment, &wrong, TimeMs::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
        assert!(repo.get_escrow_for_request(req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_twice_is_noop_and_exports() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        let ledger = ledger(repo.clone(), ManualGateway::new());
        let mut events = ledger.events.subscribe();
        let payment = ledger
            .create_payment(req, PaymentKind::Service, Decimal::from_units(22000), PaymentMethod::Pix)
            .await
            .unwrap();
        let shares = EscrowShares::new(
            Decimal::from_units(22000),
            Decimal::from_units(2000),
            Decimal::from_units(15000),
            Decimal::from_units(5000),
        )
        .unwrap();
        let escrow = LedgerManager::create_escrow(repo.pool(), &payment, &shares, TimeMs::new(1))
            .await
            .unwrap();
        Repository::mark_payment_completed(repo.pool(), &payment.payment_ref, TimeMs::new(2))
            .await
            .unwrap();

        assert!(ledger.release_escrow(escrow.id).await.unwrap());
        assert!(!ledger.release_escrow(escrow.id).await.unwrap());
        assert_eq!(events.recv().await.unwrap().name(), "escrow_released");
        assert!(events.try_recv().is_err());

        let csv = ledger.export_escrows_csv().await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("escrow_id,payment_id"));
        assert!(lines[1].contains(",22000,2000,15000,5000,released,"));
    }

    #[tokio::test]
    async fn test_release_refuses_uncollected_payment() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        let ledger = ledger(repo.clone(), ManualGateway::new());
        let payment = ledger
            .create_payment(req, PaymentKind::Service, Decimal::from_units(22000), PaymentMethod::Pix)
            .await
            .unwrap();
        let shares = EscrowShares::new(
            Decimal::from_units(22000),
            Decimal::from_units(2000),
            Decimal::from_units(20000),
            Decimal::zero(),
        )
        .unwrap();
        let escrow = LedgerManager::create_escrow(repo.pool(), &payment, &shares, TimeMs::new(1))
            .await
            .unwrap();

        // Pending.
        assert!(matches!(
            ledger.release_escrow(escrow.id).await,
            Err(EngineError::InvariantViolation(_))
        ));

        ledger.fail_payment(&payment.payment_ref).await.unwrap();
        assert!(matches!(
            ledger.release_for_request(req).await,
            Err(EngineError::InvariantViolation(_))
        ));
        let stored = repo.get_escrow(escrow.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EscrowStatus::Holding);
        assert!(stored.released_at.is_none());
    }

    #[tokio::test]
    async fn test_fail_payment_refuses_completed() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        let ledger = ledger(repo.clone(), ManualGateway::new());
        let payment = ledger
            .create_payment(req, PaymentKind::DiagnosisFee, Decimal::from_units(3000), PaymentMethod::Pix)
            .await
            .unwrap();

        Repository::mark_payment_completed(repo.pool(), &payment.payment_ref, TimeMs::new(2))
            .await
            .unwrap();
        assert!(matches!(
            ledger.fail_payment(&payment.payment_ref).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            ledger.fail_payment("missing").await,
            Err(EngineError::NotFound(_))
        ));
    }
}
