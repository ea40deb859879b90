//! Anti-fraud flag persistence.

use crate::domain::{AntifraudFlag, FlagDraft, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parsed, Repository};

const FLAG_COLUMNS: &str = r#"
    id, service_request_id, user_id, reason, severity, details, resolved, resolved_by,
    created_at, resolved_at
"#;

fn flag_from_row(row: &SqliteRow) -> Result<AntifraudFlag, sqlx::Error> {
    Ok(AntifraudFlag {
        id: row.try_get("id")?,
        service_request_id: row.try_get("service_request_id")?,
        user_id: row.try_get("user_id")?,
        reason: parsed(row, "reason")?,
        severity: parsed(row, "severity")?,
        details: row.try_get("details")?,
        resolved: row.try_get::<i64, _>("resolved")? != 0,
        resolved_by: row.try_get("resolved_by")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        resolved_at: row.try_get::<Option<i64>, _>("resolved_at")?.map(TimeMs::new),
    })
}

impl Repository {
    /// Insert a flag unless the request already carries one for the same reason.
    ///
    /// Returns `None` when the flag already existed.
    pub async fn insert_flag(
        &self,
        service_request_id: i64,
        draft: &FlagDraft,
        at: TimeMs,
    ) -> Result<Option<AntifraudFlag>, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO antifraud_flags
            (service_request_id, user_id, reason, severity, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (service_request_id, reason) DO NOTHING
            "#,
        )
        .bind(service_request_id)
        .bind(draft.user_id)
        .bind(draft.reason.as_str())
        .bind(draft.severity.as_str())
        .bind(&draft.details)
        .bind(at.as_ms())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(AntifraudFlag {
            id: result.last_insert_rowid(),
            service_request_id,
            user_id: draft.user_id,
            reason: draft.reason,
            severity: draft.severity,
            details: draft.details.clone(),
            resolved: false,
            resolved_by: None,
            created_at: at,
            resolved_at: None,
        }))
    }

    pub async fn get_flag(&self, id: i64) -> Result<Option<AntifraudFlag>, sqlx::Error> {
        let sql = format!("SELECT {} FROM antifraud_flags WHERE id = ?", FLAG_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| flag_from_row(&row))
            .transpose()
    }

    /// Flags ordered newest first.
    pub async fn list_flags(&self, pending_only: bool) -> Result<Vec<AntifraudFlag>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM antifraud_flags WHERE (? = 0 OR resolved = 0) ORDER BY created_at DESC, id DESC",
            FLAG_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(pending_only as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(flag_from_row).collect()
    }

    pub async fn flags_for_request(
        &self,
        service_request_id: i64,
    ) -> Result<Vec<AntifraudFlag>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM antifraud_flags WHERE service_request_id = ? ORDER BY id ASC",
            FLAG_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(service_request_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(flag_from_row).collect()
    }

    /// Mark a flag resolved. Returns false if it was already resolved or does not exist.
    pub async fn resolve_flag(&self, id: i64, admin_id: i64, at: TimeMs) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE antifraud_flags SET resolved = 1, resolved_by = ?, resolved_at = ?
            WHERE id = ? AND resolved = 0
            "#,
        )
        .bind(admin_id)
        .bind(at.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
