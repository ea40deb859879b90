//! Service request, diagnosis, domestic detail and execution log operations.

use crate::domain::{
    AiDiagnosis, Category, Decimal, DomesticDetails, ExecutionLog, GeoPoint, MaterialItem,
    NewServiceRequest, ProviderDiagnosis, ServiceRequest, ServiceStatus, TimeMs,
};
use crate::engine::DomesticQuote;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteRow};
use sqlx::{Executor, Row};

use super::{parsed, parsed_opt, Repository};

const REQUEST_COLUMNS: &str = r#"
    id, client_id, provider_id, category_id, kind, title, description, sla_priority,
    status, estimated_price, final_price, location_lat, location_lon, created_at, completed_at
"#;

/// Field changes applied together with a status check-and-set.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub to: ServiceStatus,
    pub at: TimeMs,
    /// Attach this provider; the update only matches if no other provider is attached.
    pub provider_id: Option<i64>,
    pub estimated_price: Option<Decimal>,
    pub final_price: Option<Decimal>,
    pub completed_at: Option<TimeMs>,
}

impl StatusUpdate {
    pub fn to(status: ServiceStatus, at: TimeMs) -> Self {
        Self {
            to: status,
            at,
            provider_id: None,
            estimated_price: None,
            final_price: None,
            completed_at: None,
        }
    }

    pub fn with_provider(mut self, provider_id: i64) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    pub fn with_estimated_price(mut self, price: Decimal) -> Self {
        self.estimated_price = Some(price);
        self
    }

    pub fn with_final_price(mut self, price: Decimal) -> Self {
        self.final_price = Some(price);
        self
    }

    pub fn completed(mut self) -> Self {
        self.completed_at = Some(self.at);
        self
    }
}

fn point(row: &SqliteRow, lat: &str, lon: &str) -> Result<Option<GeoPoint>, sqlx::Error> {
    let lat: Option<f64> = row.try_get(lat)?;
    let lon: Option<f64> = row.try_get(lon)?;
    Ok(lat.zip(lon).map(|(lat, lon)| GeoPoint::new(lat, lon)))
}

fn request_from_row(row: &SqliteRow) -> Result<ServiceRequest, sqlx::Error> {
    Ok(ServiceRequest {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        provider_id: row.try_get("provider_id")?,
        category_id: row.try_get("category_id")?,
        kind: parsed(row, "kind")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        sla_priority: parsed(row, "sla_priority")?,
        status: parsed(row, "status")?,
        estimated_price: parsed_opt(row, "estimated_price")?,
        final_price: parsed_opt(row, "final_price")?,
        location: point(row, "location_lat", "location_lon")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        completed_at: row.try_get::<Option<i64>, _>("completed_at")?.map(TimeMs::new),
    })
}

fn execution_from_row(row: &SqliteRow) -> Result<ExecutionLog, sqlx::Error> {
    Ok(ExecutionLog {
        service_request_id: row.try_get("service_request_id")?,
        provider_id: row.try_get("provider_id")?,
        started_at: TimeMs::new(row.try_get("started_at")?),
        start_location: point(row, "start_lat", "start_lon")?,
        ended_at: row.try_get::<Option<i64>, _>("ended_at")?.map(TimeMs::new),
        end_location: point(row, "end_lat", "end_lon")?,
        duration_minutes: row.try_get("duration_minutes")?,
    })
}

impl Repository {
    // =========================================================================
    // Service requests
    // =========================================================================

    /// Insert a request in its initial status.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_request<'e, E>(
        executor: E,
        client_id: i64,
        category: &Category,
        new: &NewServiceRequest,
        status: ServiceStatus,
        provider_id: Option<i64>,
        estimated_price: Option<Decimal>,
        at: TimeMs,
    ) -> Result<ServiceRequest, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = sqlx::query(
            r#"
            INSERT INTO service_requests
            (client_id, provider_id, category_id, kind, title, description, sla_priority, status,
             estimated_price, location_lat, location_lon, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(client_id)
        .bind(provider_id)
        .bind(category.id)
        .bind(category.kind.as_str())
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.sla_priority.as_str())
        .bind(status.as_str())
        .bind(estimated_price.map(|p| p.to_canonical_string()))
        .bind(new.location.map(|p| p.lat))
        .bind(new.location.map(|p| p.lon))
        .bind(at.as_ms())
        .bind(at.as_ms())
        .execute(executor)
        .await?
        .last_insert_rowid();

        Ok(ServiceRequest {
            id,
            client_id,
            provider_id,
            category_id: category.id,
            kind: category.kind,
            title: new.title.clone(),
            description: new.description.clone(),
            sla_priority: new.sla_priority,
            status,
            estimated_price,
            final_price: None,
            location: new.location,
            created_at: at,
            completed_at: None,
        })
    }

    pub async fn get_request(&self, id: i64) -> Result<Option<ServiceRequest>, sqlx::Error> {
        Self::fetch_request(&self.pool, id).await
    }

    pub async fn fetch_request<'e, E>(
        executor: E,
        id: i64,
    ) -> Result<Option<ServiceRequest>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {} FROM service_requests WHERE id = ?", REQUEST_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?
            .map(|row| request_from_row(&row))
            .transpose()
    }

    pub async fn list_requests_for_client(
        &self,
        client_id: i64,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM service_requests WHERE client_id = ? ORDER BY id ASC",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(client_id).fetch_all(&self.pool).await?;
        rows.iter().map(request_from_row).collect()
    }

    /// Move a request to `update.to` only if its current status is one of `from`.
    ///
    /// Returns false when the row did not match (status moved on, or another
    /// provider is already attached); nothing is written in that case.
    pub async fn cas_status<'e, E>(
        executor: E,
        id: i64,
        from: &[ServiceStatus],
        update: &StatusUpdate,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE service_requests
            SET status = ?,
                updated_at = ?,
                provider_id = COALESCE(?, provider_id),
                estimated_price = COALESCE(?, estimated_price),
                final_price = COALESCE(?, final_price),
                completed_at = COALESCE(?, completed_at)
            WHERE id = ?
              AND status IN ({})
              AND (? IS NULL OR provider_id IS NULL OR provider_id = ?)
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(update.to.as_str())
            .bind(update.at.as_ms())
            .bind(update.provider_id)
            .bind(update.estimated_price.map(|p| p.to_canonical_string()))
            .bind(update.final_price.map(|p| p.to_canonical_string()))
            .bind(update.completed_at.map(|t| t.as_ms()))
            .bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }
        let result = query
            .bind(update.provider_id)
            .bind(update.provider_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn count_client_cancellations(&self, client_id: i64) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM service_requests WHERE client_id = ? AND status = 'cancelled'",
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_get("n")
    }

    /// Other client accounts with the same document that hold non-terminal requests.
    pub async fn count_clients_sharing_document(&self, client_id: i64) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT other.id) AS n
            FROM clients me
            JOIN clients other
              ON other.document = me.document AND other.id != me.id
            JOIN service_requests sr
              ON sr.client_id = other.id AND sr.status NOT IN ('completed', 'cancelled')
            WHERE me.id = ? AND me.document IS NOT NULL AND me.document != ''
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_get("n")
    }

    // =========================================================================
    // Diagnoses
    // =========================================================================

    pub async fn insert_ai_diagnosis(
        conn: &mut SqliteConnection,
        diagnosis: &AiDiagnosis,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO ai_diagnoses
            (service_request_id, classification, urgency_level, estimated_duration,
             price_range_min, price_range_max, diagnosis_fee, explanation, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(diagnosis.service_request_id)
        .bind(&diagnosis.classification)
        .bind(&diagnosis.urgency_level)
        .bind(diagnosis.estimated_duration.as_deref())
        .bind(diagnosis.price_range_min.to_canonical_string())
        .bind(diagnosis.price_range_max.to_canonical_string())
        .bind(diagnosis.diagnosis_fee.to_canonical_string())
        .bind(&diagnosis.explanation)
        .bind(diagnosis.created_at.as_ms())
        .execute(&mut *conn)
        .await?;

        for (position, name) in diagnosis.materials.iter().enumerate() {
            sqlx::query(
                "INSERT INTO ai_diagnosis_materials (service_request_id, position, name) VALUES (?, ?, ?)",
            )
            .bind(diagnosis.service_request_id)
            .bind(position as i64)
            .bind(name)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn get_ai_diagnosis(
        &self,
        service_request_id: i64,
    ) -> Result<Option<AiDiagnosis>, sqlx::Error> {
        let Some(row) = sqlx::query(
            r#"
            SELECT service_request_id, classification, urgency_level, estimated_duration,
                   price_range_min, price_range_max, diagnosis_fee, explanation, created_at
            FROM ai_diagnoses WHERE service_request_id = ?
            "#,
        )
        .bind(service_request_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let materials = sqlx::query(
            "SELECT name FROM ai_diagnosis_materials WHERE service_request_id = ? ORDER BY position ASC",
        )
        .bind(service_request_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| r.try_get::<String, _>("name"))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(AiDiagnosis {
            service_request_id: row.try_get("service_request_id")?,
            classification: row.try_get("classification")?,
            urgency_level: row.try_get("urgency_level")?,
            estimated_duration: row.try_get("estimated_duration")?,
            materials,
            price_range_min: parsed(&row, "price_range_min")?,
            price_range_max: parsed(&row, "price_range_max")?,
            diagnosis_fee: parsed(&row, "diagnosis_fee")?,
            explanation: row.try_get("explanation")?,
            created_at: TimeMs::new(row.try_get("created_at")?),
        }))
    }

    pub async fn insert_provider_diagnosis(
        conn: &mut SqliteConnection,
        diagnosis: &ProviderDiagnosis,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO provider_diagnoses
            (service_request_id, provider_id, findings, labor_cost, materials_cost, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(diagnosis.service_request_id)
        .bind(diagnosis.provider_id)
        .bind(&diagnosis.findings)
        .bind(diagnosis.labor_cost.to_canonical_string())
        .bind(diagnosis.materials_cost.to_canonical_string())
        .bind(diagnosis.created_at.as_ms())
        .execute(&mut *conn)
        .await?;

        for (position, item) in diagnosis.materials.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO provider_diagnosis_materials
                (service_request_id, position, name, quantity, unit_price)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(diagnosis.service_request_id)
            .bind(position as i64)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price.to_canonical_string())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn get_provider_diagnosis(
        &self,
        service_request_id: i64,
    ) -> Result<Option<ProviderDiagnosis>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_provider_diagnosis(&mut conn, service_request_id).await
    }

    pub async fn fetch_provider_diagnosis(
        conn: &mut SqliteConnection,
        service_request_id: i64,
    ) -> Result<Option<ProviderDiagnosis>, sqlx::Error> {
        let Some(row) = sqlx::query(
            r#"
            SELECT service_request_id, provider_id, findings, labor_cost, materials_cost, created_at
            FROM provider_diagnoses WHERE service_request_id = ?
            "#,
        )
        .bind(service_request_id)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let materials = sqlx::query(
            r#"
            SELECT name, quantity, unit_price FROM provider_diagnosis_materials
            WHERE service_request_id = ? ORDER BY position ASC
            "#,
        )
        .bind(service_request_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|r| {
            Ok(MaterialItem {
                name: r.try_get("name")?,
                quantity: r.try_get("quantity")?,
                unit_price: parsed(r, "unit_price")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(Some(ProviderDiagnosis {
            service_request_id: row.try_get("service_request_id")?,
            provider_id: row.try_get("provider_id")?,
            findings: row.try_get("findings")?,
            labor_cost: parsed(&row, "labor_cost")?,
            materials_cost: parsed(&row, "materials_cost")?,
            materials,
            created_at: TimeMs::new(row.try_get("created_at")?),
        }))
    }

    // =========================================================================
    // Domestic details
    // =========================================================================

    pub async fn insert_domestic_details<'e, E>(
        executor: E,
        service_request_id: i64,
        details: &DomesticDetails,
        quote: &DomesticQuote,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO domestic_details
            (service_request_id, house_size, service_type, frequency, base_price, final_price, platform_fee)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service_request_id)
        .bind(details.house_size.label())
        .bind(details.service_type.label())
        .bind(details.frequency.label())
        .bind(quote.base_price.to_canonical_string())
        .bind(quote.final_price.to_canonical_string())
        .bind(quote.platform_fee.to_canonical_string())
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn get_domestic_details(
        &self,
        service_request_id: i64,
    ) -> Result<Option<(DomesticDetails, DomesticQuote)>, sqlx::Error> {
        sqlx::query(
            r#"
            SELECT house_size, service_type, frequency, base_price, final_price, platform_fee
            FROM domestic_details WHERE service_request_id = ?
            "#,
        )
        .bind(service_request_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| {
            Ok((
                DomesticDetails {
                    house_size: parsed(&row, "house_size")?,
                    service_type: parsed(&row, "service_type")?,
                    frequency: parsed(&row, "frequency")?,
                },
                DomesticQuote {
                    base_price: parsed(&row, "base_price")?,
                    final_price: parsed(&row, "final_price")?,
                    platform_fee: parsed(&row, "platform_fee")?,
                },
            ))
        })
        .transpose()
    }

    // =========================================================================
    // Execution logs
    // =========================================================================

    pub async fn open_execution<'e, E>(executor: E, log: &ExecutionLog) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO execution_logs
            (service_request_id, provider_id, started_at, start_lat, start_lon)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.service_request_id)
        .bind(log.provider_id)
        .bind(log.started_at.as_ms())
        .bind(log.start_location.map(|p| p.lat))
        .bind(log.start_location.map(|p| p.lon))
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Close an open log. Returns false if there is no open log for the request.
    pub async fn close_execution<'e, E>(
        executor: E,
        service_request_id: i64,
        ended_at: TimeMs,
        location: Option<GeoPoint>,
        duration_minutes: i64,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE execution_logs
            SET ended_at = ?, end_lat = ?, end_lon = ?, duration_minutes = ?
            WHERE service_request_id = ? AND ended_at IS NULL
            "#,
        )
        .bind(ended_at.as_ms())
        .bind(location.map(|p| p.lat))
        .bind(location.map(|p| p.lon))
        .bind(duration_minutes)
        .bind(service_request_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get_execution_log(
        &self,
        service_request_id: i64,
    ) -> Result<Option<ExecutionLog>, sqlx::Error> {
        Self::fetch_execution_log(&self.pool, service_request_id).await
    }

    pub async fn fetch_execution_log<'e, E>(
        executor: E,
        service_request_id: i64,
    ) -> Result<Option<ExecutionLog>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            SELECT service_request_id, provider_id, started_at, start_lat, start_lon,
                   ended_at, end_lat, end_lon, duration_minutes
            FROM execution_logs WHERE service_request_id = ?
            "#,
        )
        .bind(service_request_id)
        .fetch_optional(executor)
        .await?
        .map(|row| execution_from_row(&row))
        .transpose()
    }
}
