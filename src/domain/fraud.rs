//! Anti-fraud flags and execution logs.

use crate::domain::{GeoPoint, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    ShortExecutionDuration,
    ValueAboveCategoryNorm,
    ExcessiveCancellations,
    LocationMismatch,
    DuplicateDocument,
}

impl FlagReason {
    pub const ALL: [FlagReason; 5] = [
        FlagReason::ShortExecutionDuration,
        FlagReason::ValueAboveCategoryNorm,
        FlagReason::ExcessiveCancellations,
        FlagReason::LocationMismatch,
        FlagReason::DuplicateDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagReason::ShortExecutionDuration => "short_execution_duration",
            FlagReason::ValueAboveCategoryNorm => "value_above_category_norm",
            FlagReason::ExcessiveCancellations => "excessive_cancellations",
            FlagReason::LocationMismatch => "location_mismatch",
            FlagReason::DuplicateDocument => "duplicate_document",
        }
    }
}

impl FromStr for FlagReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlagReason::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown flag reason: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// A flag a rule wants raised, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDraft {
    pub user_id: i64,
    pub reason: FlagReason,
    pub severity: Severity,
    pub details: String,
}

/// A raised concern awaiting administrator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntifraudFlag {
    pub id: i64,
    pub service_request_id: i64,
    pub user_id: i64,
    pub reason: FlagReason,
    pub severity: Severity,
    pub details: String,
    pub resolved: bool,
    pub resolved_by: Option<i64>,
    pub created_at: TimeMs,
    pub resolved_at: Option<TimeMs>,
}

/// Start/stop record of on-site execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub service_request_id: i64,
    pub provider_id: i64,
    pub started_at: TimeMs,
    pub start_location: Option<GeoPoint>,
    pub ended_at: Option<TimeMs>,
    pub end_location: Option<GeoPoint>,
    pub duration_minutes: Option<i64>,
}

/// Position reported by the provider's device. The time is always the server's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(default)]
    pub location: Option<GeoPoint>,
}
