//! Automated and in-person diagnoses attached to a service request.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};

/// One itemized material line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialItem {
    pub name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl MaterialItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from_units(self.quantity)
    }
}

/// The automated estimate. One per request, immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiDiagnosis {
    pub service_request_id: i64,
    pub classification: String,
    pub urgency_level: String,
    pub estimated_duration: Option<String>,
    pub materials: Vec<String>,
    pub price_range_min: Decimal,
    pub price_range_max: Decimal,
    pub diagnosis_fee: Decimal,
    pub explanation: String,
    pub created_at: TimeMs,
}

/// The assigned provider's on-site findings and cost breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDiagnosis {
    pub service_request_id: i64,
    pub provider_id: i64,
    pub findings: String,
    pub labor_cost: Decimal,
    pub materials_cost: Decimal,
    pub materials: Vec<MaterialItem>,
    pub created_at: TimeMs,
}

/// Provider-submitted findings, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFindings {
    pub findings: String,
    pub labor_cost: Decimal,
    /// Defaults to the sum of the itemized lines when omitted.
    #[serde(default)]
    pub materials_cost: Option<Decimal>,
    #[serde(default)]
    pub materials: Vec<MaterialItem>,
}

impl ProviderFindings {
    pub fn resolved_materials_cost(&self) -> Decimal {
        self.materials_cost
            .unwrap_or_else(|| self.materials.iter().map(MaterialItem::line_total).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materials_cost_defaults_to_items() {
        let findings = ProviderFindings {
            findings: "Broken siphon".to_string(),
            labor_cost: Decimal::from_units(15000),
            materials_cost: None,
            materials: vec![
                MaterialItem {
                    name: "siphon".to_string(),
                    quantity: 1,
                    unit_price: Decimal::from_units(3000),
                },
                MaterialItem {
                    name: "sealant".to_string(),
                    quantity: 2,
                    unit_price: Decimal::from_units(1000),
                },
            ],
        };
        assert_eq!(findings.resolved_materials_cost(), Decimal::from_units(5000));
    }

    #[test]
    fn test_explicit_materials_cost_wins() {
        let findings = ProviderFindings {
            findings: "x".to_string(),
            labor_cost: Decimal::from_units(100),
            materials_cost: Some(Decimal::from_units(7)),
            materials: vec![],
        };
        assert_eq!(findings.resolved_materials_cost(), Decimal::from_units(7));
    }
}
