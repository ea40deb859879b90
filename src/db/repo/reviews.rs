//! Reviews.

use crate::domain::{Decimal, Review, TimeMs};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row};

use super::{parsed, Repository};

fn review_from_row(row: &SqliteRow) -> Result<Review, sqlx::Error> {
    Ok(Review {
        id: row.try_get("id")?,
        service_request_id: row.try_get("service_request_id")?,
        client_id: row.try_get("client_id")?,
        provider_id: row.try_get("provider_id")?,
        rating: parsed(row, "rating")?,
        comment: row.try_get("comment")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
    })
}

impl Repository {
    /// Insert a review. A second review for the same request is a unique violation.
    pub async fn insert_review<'e, E>(
        executor: E,
        service_request_id: i64,
        client_id: i64,
        provider_id: i64,
        rating: Decimal,
        comment: Option<&str>,
        at: TimeMs,
    ) -> Result<Review, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = sqlx::query(
            r#"
            INSERT INTO reviews (service_request_id, client_id, provider_id, rating, comment, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service_request_id)
        .bind(client_id)
        .bind(provider_id)
        .bind(rating.to_canonical_string())
        .bind(comment)
        .bind(at.as_ms())
        .execute(executor)
        .await?
        .last_insert_rowid();

        Ok(Review {
            id,
            service_request_id,
            client_id,
            provider_id,
            rating,
            comment: comment.map(str::to_string),
            created_at: at,
        })
    }

    pub async fn get_review(&self, service_request_id: i64) -> Result<Option<Review>, sqlx::Error> {
        sqlx::query(
            r#"
            SELECT id, service_request_id, client_id, provider_id, rating, comment, created_at
            FROM reviews WHERE service_request_id = ?
            "#,
        )
        .bind(service_request_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| review_from_row(&row))
        .transpose()
    }

    pub async fn list_reviews_for_provider(&self, provider_id: i64) -> Result<Vec<Review>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, service_request_id, client_id, provider_id, rating, comment, created_at
            FROM reviews WHERE provider_id = ? ORDER BY id ASC
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(review_from_row).collect()
    }
}
