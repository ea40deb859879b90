//! Repository layer for database operations.
//!
//! `Repository` owns the pool. Methods are organized across submodules:
//! - `requests.rs` - service requests, diagnoses, domestic details, execution logs
//! - `ledger.rs` - payments, escrows, digital acceptances
//! - `fraud.rs` - anti-fraud flags
//! - `reviews.rs` - reviews and provider reputation
//!
//! Associated functions taking a connection or executor are meant to run
//! inside a transaction opened with [`Repository::begin`].

mod fraud;
mod ledger;
mod requests;
mod reviews;

pub use requests::StatusUpdate;

use crate::domain::{Category, CategoryKind, Client, Decimal, Provider, Reputation};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Executor, Row, Transaction};
use std::fmt::Display;
use std::str::FromStr;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

/// Parse a text column through `FromStr`, surfacing failures as decode errors.
pub(crate) fn parsed<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| {
        sqlx::Error::Decode(format!("column {} has invalid value {:?}: {}", column, raw, e).into())
    })
}

pub(crate) fn parsed_opt<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| {
        raw.parse::<T>().map_err(|e| {
            sqlx::Error::Decode(
                format!("column {} has invalid value {:?}: {}", column, raw, e).into(),
            )
        })
    })
    .transpose()
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

fn category_from_row(row: &SqliteRow) -> Result<Category, sqlx::Error> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        base_price: parsed(row, "base_price")?,
        kind: parsed(row, "kind")?,
    })
}

fn client_from_row(row: &SqliteRow) -> Result<Client, sqlx::Error> {
    Ok(Client {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        document: row.try_get("document")?,
    })
}

fn provider_from_row(row: &SqliteRow) -> Result<Provider, sqlx::Error> {
    Ok(Provider {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        specialty: row.try_get("specialty")?,
        available: row.try_get::<i64, _>("available")? != 0,
        rating: parsed(row, "rating")?,
        total_ratings: row.try_get("total_ratings")?,
    })
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub async fn insert_category(
        &self,
        name: &str,
        base_price: Decimal,
        kind: CategoryKind,
    ) -> Result<Category, sqlx::Error> {
        let id = sqlx::query("INSERT INTO categories (name, base_price, kind) VALUES (?, ?, ?)")
            .bind(name)
            .bind(base_price.to_canonical_string())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(Category {
            id,
            name: name.to_string(),
            base_price,
            kind,
        })
    }

    pub async fn get_category(&self, id: i64) -> Result<Option<Category>, sqlx::Error> {
        sqlx::query("SELECT id, name, base_price, kind FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| category_from_row(&row))
            .transpose()
    }

    // =========================================================================
    // Parties
    // =========================================================================

    pub async fn insert_client(
        &self,
        name: &str,
        document: Option<&str>,
    ) -> Result<Client, sqlx::Error> {
        let id = sqlx::query("INSERT INTO clients (name, document) VALUES (?, ?)")
            .bind(name)
            .bind(document)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(Client {
            id,
            name: name.to_string(),
            document: document.map(str::to_string),
        })
    }

    pub async fn get_client(&self, id: i64) -> Result<Option<Client>, sqlx::Error> {
        sqlx::query("SELECT id, name, document FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| client_from_row(&row))
            .transpose()
    }

    pub async fn insert_provider(
        &self,
        name: &str,
        specialty: &str,
    ) -> Result<Provider, sqlx::Error> {
        let id = sqlx::query("INSERT INTO providers (name, specialty) VALUES (?, ?)")
            .bind(name)
            .bind(specialty)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(Provider {
            id,
            name: name.to_string(),
            specialty: specialty.to_string(),
            available: true,
            rating: Decimal::zero(),
            total_ratings: 0,
        })
    }

    pub async fn get_provider(&self, id: i64) -> Result<Option<Provider>, sqlx::Error> {
        Self::fetch_provider(&self.pool, id).await
    }

    pub async fn fetch_provider<'e, E>(executor: E, id: i64) -> Result<Option<Provider>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            SELECT id, name, specialty, available, rating, total_ratings
            FROM providers WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(|row| provider_from_row(&row))
        .transpose()
    }

    pub async fn set_provider_available(&self, id: i64, available: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE providers SET available = ? WHERE id = ?")
            .bind(available as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_available_providers(&self) -> Result<Vec<Provider>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, specialty, available, rating, total_ratings
            FROM providers
            WHERE available = 1
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(provider_from_row).collect()
    }

    pub async fn set_reputation<'e, E>(
        executor: E,
        provider_id: i64,
        reputation: &Reputation,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result =
            sqlx::query("UPDATE providers SET rating = ?, total_ratings = ? WHERE id = ?")
                .bind(reputation.rating.to_canonical_string())
                .bind(reputation.total_ratings)
                .bind(provider_id)
                .execute(executor)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Repository;
    use crate::db::init_db;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub async fn setup_repo() -> (Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Arc::new(Repository::new(pool)), temp_dir)
    }
}
