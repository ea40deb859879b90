//! Category lookup backed by the local database, plus specialty matching.

use super::{CategoryCatalog, UpstreamError};
use crate::db::Repository;
use crate::domain::domestic::fold_text;
use crate::domain::Category;
use async_trait::async_trait;
use std::sync::Arc;

/// True if any comma/semicolon/slash separated part of the provider's
/// specialty contains the category name or is contained in it.
///
/// Comparison ignores case and Portuguese diacritics.
pub fn matches_specialty(provider_specialty: &str, category_name: &str) -> bool {
    let category = fold_text(category_name);
    if category.is_empty() {
        return false;
    }
    provider_specialty
        .split([',', ';', '/'])
        .map(fold_text)
        .filter(|part| !part.is_empty())
        .any(|part| part.contains(&category) || category.contains(&part))
}

#[derive(Debug, Clone)]
pub struct DbCatalog {
    repo: Arc<Repository>,
}

impl DbCatalog {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CategoryCatalog for DbCatalog {
    async fn resolve_category(&self, id: i64) -> Result<Option<Category>, UpstreamError> {
        self.repo
            .get_category(id)
            .await
            .map_err(|e| UpstreamError::Other(format!("category lookup failed: {}", e)))
    }
}
