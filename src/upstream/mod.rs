//! Boundary contracts for the collaborators the engine consumes:
//! the diagnosis completion service, the payment gateway and the category catalog.

use crate::domain::{Category, Decimal, PaymentMethod};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod catalog;
pub mod diagnosis;
pub mod gateway;
pub mod mock;

pub use catalog::{matches_specialty, DbCatalog};
pub use diagnosis::HttpDiagnosisService;
pub use gateway::{ManualGateway, PaymentConfirmation, SimulatedGateway};
pub use mock::{MockCatalog, MockDiagnosisService};

/// One question/answer pair from the guided intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidedAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisPrompt {
    pub description: String,
    #[serde(default)]
    pub guided_answers: Vec<GuidedAnswer>,
    #[serde(default)]
    pub media_refs: Vec<String>,
}

/// Numeric fields are used by the engine; the explanation is stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisOutcome {
    pub classification: String,
    pub urgency_level: String,
    #[serde(default)]
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub materials: Vec<String>,
    pub price_range_min: Decimal,
    pub price_range_max: Decimal,
    #[serde(default, alias = "explanationText")]
    pub explanation: String,
}

impl DiagnosisOutcome {
    /// Reject ranges the pricing engine cannot use.
    pub fn validate(self) -> Result<Self, UpstreamError> {
        if self.price_range_min.is_negative() || self.price_range_min > self.price_range_max {
            return Err(UpstreamError::Parse(format!(
                "invalid price range [{}, {}]",
                self.price_range_min, self.price_range_max
            )));
        }
        Ok(self)
    }
}

#[async_trait]
pub trait DiagnosisService: Send + Sync + fmt::Debug {
    async fn diagnose(&self, prompt: &DiagnosisPrompt) -> Result<DiagnosisOutcome, UpstreamError>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + fmt::Debug {
    /// Start a charge and return the gateway reference.
    async fn initiate(&self, amount: Decimal, method: PaymentMethod) -> Result<String, UpstreamError>;

    /// Called once the payment carrying `payment_ref` is durably recorded.
    async fn payment_recorded(&self, _payment_ref: &str) {}
}

#[async_trait]
pub trait CategoryCatalog: Send + Sync + fmt::Debug {
    async fn resolve_category(&self, id: i64) -> Result<Option<Category>, UpstreamError>;

    fn matches_specialty(&self, provider_specialty: &str, category_name: &str) -> bool {
        matches_specialty(provider_specialty, category_name)
    }
}

/// Error type for upstream calls.
#[derive(Debug, Clone)]
pub enum UpstreamError {
    /// Network error (e.g., connection timeout, DNS failure)
    Network(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    Http { status: u16, message: String },
    /// Invalid JSON or unusable response
    Parse(String),
    RateLimited,
    Other(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Network(msg) => write!(f, "Network error: {}", msg),
            UpstreamError::Http { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            UpstreamError::Parse(msg) => write!(f, "Parse error: {}", msg),
            UpstreamError::RateLimited => write!(f, "Rate limited"),
            UpstreamError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for UpstreamError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_display() {
        let err = UpstreamError::Network("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = UpstreamError::Http {
            status: 503,
            message: "Server error".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: Server error");

        assert_eq!(UpstreamError::RateLimited.to_string(), "Rate limited");
    }

    #[test]
    fn test_outcome_accepts_explanation_text_alias() {
        let outcome: DiagnosisOutcome = serde_json::from_value(serde_json::json!({
            "classification": "plumbing",
            "urgencyLevel": "high",
            "priceRangeMin": 10000,
            "priceRangeMax": 20000,
            "explanationText": "Likely a worn washer."
        }))
        .unwrap();
        assert_eq!(outcome.explanation, "Likely a worn washer.");
        assert!(outcome.materials.is_empty());
    }

    #[test]
    fn test_outcome_rejects_inverted_range() {
        let outcome = DiagnosisOutcome {
            classification: "x".into(),
            urgency_level: "low".into(),
            estimated_duration: None,
            materials: vec![],
            price_range_min: Decimal::from_units(5),
            price_range_max: Decimal::from_units(1),
            explanation: String::new(),
        };
        assert!(matches!(outcome.validate(), Err(UpstreamError::Parse(_))));
    }
}
