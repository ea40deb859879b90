//! Payments, escrows and digital acceptances.

use crate::domain::{
    AcceptanceMetadata, DigitalAcceptance, EscrowShares, EscrowStatus, Payment, PaymentEscrow,
    PaymentKind, PaymentMethod, PaymentStatus, QuoteBreakdown, TimeMs,
};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row};

use super::{parsed, Repository};

const PAYMENT_COLUMNS: &str =
    "id, service_request_id, kind, amount, method, status, payment_ref, created_at, confirmed_at";

const ESCROW_COLUMNS: &str = r#"
    id, payment_id, service_request_id, hold_amount, platform_share, provider_share,
    supplier_share, status, created_at, released_at
"#;

fn payment_from_row(row: &SqliteRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        id: row.try_get("id")?,
        service_request_id: row.try_get("service_request_id")?,
        kind: parsed(row, "kind")?,
        amount: parsed(row, "amount")?,
        method: parsed(row, "method")?,
        status: parsed(row, "status")?,
        payment_ref: row.try_get("payment_ref")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        confirmed_at: row.try_get::<Option<i64>, _>("confirmed_at")?.map(TimeMs::new),
    })
}

fn escrow_from_row(row: &SqliteRow) -> Result<PaymentEscrow, sqlx::Error> {
    let shares = EscrowShares::new(
        parsed(row, "hold_amount")?,
        parsed(row, "platform_share")?,
        parsed(row, "provider_share")?,
        parsed(row, "supplier_share")?,
    )
    .map_err(|e| sqlx::Error::Decode(format!("stored escrow is inconsistent: {}", e).into()))?;

    Ok(PaymentEscrow {
        id: row.try_get("id")?,
        payment_id: row.try_get("payment_id")?,
        service_request_id: row.try_get("service_request_id")?,
        shares,
        status: parsed(row, "status")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        released_at: row.try_get::<Option<i64>, _>("released_at")?.map(TimeMs::new),
    })
}

fn acceptance_from_row(row: &SqliteRow) -> Result<DigitalAcceptance, sqlx::Error> {
    Ok(DigitalAcceptance {
        id: row.try_get("id")?,
        service_request_id: row.try_get("service_request_id")?,
        client_id: row.try_get("client_id")?,
        breakdown: QuoteBreakdown {
            labor_cost: parsed(row, "labor_cost")?,
            materials_cost: parsed(row, "materials_cost")?,
            platform_fee: parsed(row, "platform_fee")?,
            total_price: parsed(row, "total_price")?,
        },
        metadata: AcceptanceMetadata {
            origin_address: row.try_get("origin_address")?,
            user_agent: row.try_get("user_agent")?,
        },
        fingerprint: row.try_get("fingerprint")?,
        accepted_at: TimeMs::new(row.try_get("accepted_at")?),
    })
}

impl Repository {
    // =========================================================================
    // Payments
    // =========================================================================

    /// Insert a pending payment. Fails with a unique violation if the request
    /// already has a non-failed payment of the same kind.
    pub async fn insert_payment<'e, E>(
        executor: E,
        service_request_id: i64,
        kind: PaymentKind,
        amount: crate::domain::Decimal,
        method: PaymentMethod,
        payment_ref: &str,
        at: TimeMs,
    ) -> Result<Payment, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = sqlx::query(
            r#"
            INSERT INTO payments
            (service_request_id, kind, amount, method, status, payment_ref, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(service_request_id)
        .bind(kind.as_str())
        .bind(amount.to_canonical_string())
        .bind(method.as_str())
        .bind(payment_ref)
        .bind(at.as_ms())
        .execute(executor)
        .await?
        .last_insert_rowid();

        Ok(Payment {
            id,
            service_request_id,
            kind,
            amount,
            method,
            status: PaymentStatus::Pending,
            payment_ref: payment_ref.to_string(),
            created_at: at,
            confirmed_at: None,
        })
    }

    pub async fn get_payment(&self, id: i64) -> Result<Option<Payment>, sqlx::Error> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| payment_from_row(&row))
            .transpose()
    }

    pub async fn get_payment_by_ref(&self, payment_ref: &str) -> Result<Option<Payment>, sqlx::Error> {
        Self::fetch_payment_by_ref(&self.pool, payment_ref).await
    }

    pub async fn fetch_payment_by_ref<'e, E>(
        executor: E,
        payment_ref: &str,
    ) -> Result<Option<Payment>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {} FROM payments WHERE payment_ref = ?", PAYMENT_COLUMNS);
        sqlx::query(&sql)
            .bind(payment_ref)
            .fetch_optional(executor)
            .await?
            .map(|row| payment_from_row(&row))
            .transpose()
    }

    /// The pending or completed payment of `kind` for a request, if any.
    pub async fn active_payment(
        &self,
        service_request_id: i64,
        kind: PaymentKind,
    ) -> Result<Option<Payment>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payments WHERE service_request_id = ? AND kind = ? AND status != 'failed'",
            PAYMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(service_request_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| payment_from_row(&row))
            .transpose()
    }

    pub async fn list_payments(&self, service_request_id: i64) -> Result<Vec<Payment>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payments WHERE service_request_id = ? ORDER BY id ASC",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(service_request_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(payment_from_row).collect()
    }

    /// pending -> completed. Returns false if the payment was not pending.
    pub async fn mark_payment_completed<'e, E>(
        executor: E,
        payment_ref: &str,
        at: TimeMs,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE payments SET status = 'completed', confirmed_at = ?
            WHERE payment_ref = ? AND status = 'pending'
            "#,
        )
        .bind(at.as_ms())
        .bind(payment_ref)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// pending -> failed. Returns false if the payment was not pending.
    pub async fn mark_payment_failed<'e, E>(executor: E, payment_ref: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE payments SET status = 'failed' WHERE payment_ref = ? AND status = 'pending'",
        )
        .bind(payment_ref)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Escrows
    // =========================================================================

    pub async fn insert_escrow<'e, E>(
        executor: E,
        payment_id: i64,
        service_request_id: i64,
        shares: &EscrowShares,
        at: TimeMs,
    ) -> Result<PaymentEscrow, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = sqlx::query(
            r#"
            INSERT INTO payment_escrows
            (payment_id, service_request_id, hold_amount, platform_share, provider_share,
             supplier_share, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'holding', ?)
            "#,
        )
        .bind(payment_id)
        .bind(service_request_id)
        .bind(shares.hold_amount().to_canonical_string())
        .bind(shares.platform_share().to_canonical_string())
        .bind(shares.provider_share().to_canonical_string())
        .bind(shares.supplier_share().to_canonical_string())
        .bind(at.as_ms())
        .execute(executor)
        .await?
        .last_insert_rowid();

        Ok(PaymentEscrow {
            id,
            payment_id,
            service_request_id,
            shares: *shares,
            status: EscrowStatus::Holding,
            created_at: at,
            released_at: None,
        })
    }

    pub async fn get_escrow(&self, id: i64) -> Result<Option<PaymentEscrow>, sqlx::Error> {
        let sql = format!("SELECT {} FROM payment_escrows WHERE id = ?", ESCROW_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| escrow_from_row(&row))
            .transpose()
    }

    pub async fn get_escrow_for_request(
        &self,
        service_request_id: i64,
    ) -> Result<Option<PaymentEscrow>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payment_escrows WHERE service_request_id = ?",
            ESCROW_COLUMNS
        );
        sqlx::query(&sql)
            .bind(service_request_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| escrow_from_row(&row))
            .transpose()
    }

    pub async fn list_escrows(&self) -> Result<Vec<PaymentEscrow>, sqlx::Error> {
        let sql = format!("SELECT {} FROM payment_escrows ORDER BY id ASC", ESCROW_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(escrow_from_row).collect()
    }

    /// holding -> released. Returns false if already released.
    pub async fn release_escrow(&self, id: i64, at: TimeMs) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payment_escrows SET status = 'released', released_at = ?
            WHERE id = ? AND status = 'holding'
            "#,
        )
        .bind(at.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Digital acceptances
    // =========================================================================

    pub async fn insert_acceptance<'e, E>(
        executor: E,
        acceptance: &DigitalAcceptance,
    ) -> Result<DigitalAcceptance, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let b = &acceptance.breakdown;
        let id = sqlx::query(
            r#"
            INSERT INTO digital_acceptances
            (service_request_id, client_id, labor_cost, materials_cost, platform_fee, total_price,
             origin_address, user_agent, fingerprint, accepted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(acceptance.service_request_id)
        .bind(acceptance.client_id)
        .bind(b.labor_cost.to_canonical_string())
        .bind(b.materials_cost.to_canonical_string())
        .bind(b.platform_fee.to_canonical_string())
        .bind(b.total_price.to_canonical_string())
        .bind(acceptance.metadata.origin_address.as_deref())
        .bind(acceptance.metadata.user_agent.as_deref())
        .bind(&acceptance.fingerprint)
        .bind(acceptance.accepted_at.as_ms())
        .execute(executor)
        .await?
        .last_insert_rowid();

        Ok(DigitalAcceptance {
            id,
            ..acceptance.clone()
        })
    }

    pub async fn get_acceptance(
        &self,
        service_request_id: i64,
    ) -> Result<Option<DigitalAcceptance>, sqlx::Error> {
        sqlx::query(
            r#"
            SELECT id, service_request_id, client_id, labor_cost, materials_cost, platform_fee,
                   total_price, origin_address, user_agent, fingerprint, accepted_at
            FROM digital_acceptances WHERE service_request_id = ?
            "#,
        )
        .bind(service_request_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| acceptance_from_row(&row))
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::super::is_unique_violation;
    use super::super::test_support::setup_repo;
    use super::*;
    use crate::domain::{CategoryKind, Decimal, NewServiceRequest, ServiceStatus};

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

    #[tokio::test]
    async fn test_one_active_payment_per_kind() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;

        Repository::insert_payment(
            repo.pool(),
            req,
            PaymentKind::DiagnosisFee,
            Decimal::from_units(3000),
            PaymentMethod::Pix,
            "ref-1",
            TimeMs::new(1),
        )
        .await
        .unwrap();

        let dup = Repository::insert_payment(
            repo.pool(),
            req,
            PaymentKind::DiagnosisFee,
            Decimal::from_units(3000),
            PaymentMethod::Pix,
            "ref-2",
            TimeMs::new(2),
        )
        .await
        .unwrap_err();
        assert!(is_unique_violation(&dup));

        // A failed payment frees the slot.
        assert!(Repository::mark_payment_failed(repo.pool(), "ref-1").await.unwrap());
        Repository::insert_payment(
            repo.pool(),
            req,
            PaymentKind::DiagnosisFee,
            Decimal::from_units(3000),
            PaymentMethod::Card,
            "ref-3",
            TimeMs::new(3),
        )
        .await
        .unwrap();

        let active = repo
            .active_payment(req, PaymentKind::DiagnosisFee)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.payment_ref, "ref-3");
        assert_eq!(repo.list_payments(req).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_payment_completes_once() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        Repository::insert_payment(
            repo.pool(),
            req,
            PaymentKind::Service,
            Decimal::from_units(23000),
            PaymentMethod::Pix,
            "ref-1",
            TimeMs::new(1),
        )
        .await
        .unwrap();

        assert!(Repository::mark_payment_completed(repo.pool(), "ref-1", TimeMs::new(5))
            .await
            .unwrap());
        assert!(!Repository::mark_payment_completed(repo.pool(), "ref-1", TimeMs::new(6))
            .await
            .unwrap());
        assert!(!Repository::mark_payment_failed(repo.pool(), "ref-1").await.unwrap());

        let payment = repo.get_payment_by_ref("ref-1").await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.confirmed_at, Some(TimeMs::new(5)));
    }

    #[tokio::test]
    async fn test_escrow_release_is_one_way() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        let payment = Repository::insert_payment(
            repo.pool(),
            req,
            PaymentKind::Service,
            Decimal::from_units(23000),
            PaymentMethod::Pix,
            "ref-1",
            TimeMs::new(1),
        )
        .await
        .unwrap();
        let shares = EscrowShares::new(
            Decimal::from_units(23000),
            Decimal::from_units(3000),
            Decimal::from_units(15000),
            Decimal::from_units(5000),
        )
        .unwrap();
        let escrow = Repository::insert_escrow(repo.pool(), payment.id, req, &shares, TimeMs::new(2))
            .await
            .unwrap();

        assert!(repo.release_escrow(escrow.id, TimeMs::new(10)).await.unwrap());
        assert!(!repo.release_escrow(escrow.id, TimeMs::new(11)).await.unwrap());

        let stored = repo.get_escrow_for_request(req).await.unwrap().unwrap();
        assert_eq!(stored.status, EscrowStatus::Released);
        assert_eq!(stored.released_at, Some(TimeMs::new(10)));
        assert_eq!(stored.shares, shares);
    }

    #[tokio::test]
    async fn test_acceptance_unique_per_request() {
        let (repo, _temp) = setup_repo().await;
        let req = seed_request(&repo).await;
        let breakdown = QuoteBreakdown {
            labor_cost: Decimal::from_units(15000),
            materials_cost: Decimal::from_units(5000),
            platform_fee: Decimal::from_units(2000),
            total_price: Decimal::from_units(22000),
        };
        let metadata = AcceptanceMetadata {
            origin_address: Some("10.0.0.1".to_string()),
            user_agent: None,
        };
        let acceptance = DigitalAcceptance {
            id: 0,
            service_request_id: req,
            client_id: 1,
            breakdown,
            fingerprint: DigitalAcceptance::compute_fingerprint(
                req,
                1,
                &breakdown,
                &metadata,
                TimeMs::new(7),
            ),
            metadata,
            accepted_at: TimeMs::new(7),
        };

        let stored = Repository::insert_acceptance(repo.pool(), &acceptance)
            .await
            .unwrap();
        assert_eq!(repo.get_acceptance(req).await.unwrap(), Some(stored));

        let err = Repository::insert_acceptance(repo.pool(), &acceptance)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
