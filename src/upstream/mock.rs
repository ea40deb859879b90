//! In-memory collaborators for tests and local runs without network calls.

use super::{CategoryCatalog, DiagnosisOutcome, DiagnosisPrompt, DiagnosisService, UpstreamError};
use crate::domain::{Category, Decimal};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Diagnosis service returning a fixed outcome, or failing every call.
#[derive(Debug, Clone)]
pub struct MockDiagnosisService {
    outcome: Result<DiagnosisOutcome, UpstreamError>,
    calls: Arc<AtomicUsize>,
}

impl MockDiagnosisService {
    pub fn new(outcome: DiagnosisOutcome) -> Self {
        Self {
            outcome: Ok(outcome),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A plumbing diagnosis with a [10000, 20000] price range.
    pub fn plumbing() -> Self {
        Self::new(DiagnosisOutcome {
            classification: "plumbing".to_string(),
            urgency_level: "medium".to_string(),
            estimated_duration: Some("2h".to_string()),
            materials: vec!["siphon".to_string(), "sealing tape".to_string()],
            price_range_min: Decimal::from_units(10000),
            price_range_max: Decimal::from_units(20000),
            explanation: "Worn siphon under the sink.".to_string(),
        })
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            outcome: Err(UpstreamError::Network(message.to_string())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiagnosisService for MockDiagnosisService {
    async fn diagnose(&self, _prompt: &DiagnosisPrompt) -> Result<DiagnosisOutcome, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Catalog holding a fixed list of categories.
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    categories: Vec<Category>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }
}

#[async_trait]
impl CategoryCatalog for MockCatalog {
    async fn resolve_category(&self, id: i64) -> Result<Option<Category>, UpstreamError> {
        Ok(self.categories.iter().find(|c| c.id == id).cloned())
    }
}
