//! Service requests and the parties and catalog records they reference.

use crate::domain::{Decimal, GeoPoint, ServiceStatus, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Client-selected urgency tier. Scales the estimate shown before assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaPriority {
    #[default]
    Standard,
    Express,
    Urgent,
}

impl SlaPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlaPriority::Standard => "standard",
            SlaPriority::Express => "express",
            SlaPriority::Urgent => "urgent",
        }
    }

    /// Estimate multiplier: standard 1.0, express 1.5, urgent 2.0.
    pub fn multiplier(&self) -> Decimal {
        match self {
            SlaPriority::Standard => Decimal::one(),
            SlaPriority::Express => Decimal::from_parts(15, 1),
            SlaPriority::Urgent => Decimal::from_parts(2, 0),
        }
    }
}

impl FromStr for SlaPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(SlaPriority::Standard),
            "express" => Ok(SlaPriority::Express),
            "urgent" => Ok(SlaPriority::Urgent),
            other => Err(format!("unknown sla priority: {}", other)),
        }
    }
}

/// How a category is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    /// Priced by the provider after an in-person diagnosis.
    Repair,
    /// Priced automatically from the declared house profile.
    Domestic,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Repair => "repair",
            CategoryKind::Domestic => "domestic",
        }
    }
}

impl FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repair" => Ok(CategoryKind::Repair),
            "domestic" => Ok(CategoryKind::Domestic),
            other => Err(format!("unknown category kind: {}", other)),
        }
    }
}

/// Catalog entry resolved through the category catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub base_price: Decimal,
    pub kind: CategoryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i64,
    pub name: String,
    /// National document (CPF); used by the duplicate-document fraud heuristic.
    pub document: Option<String>,
}

/// Provider profile, including the running reputation pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub specialty: String,
    pub available: bool,
    pub rating: Decimal,
    pub total_ratings: i64,
}

/// A client's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: i64,
    pub client_id: i64,
    pub provider_id: Option<i64>,
    pub category_id: i64,
    pub kind: CategoryKind,
    pub title: String,
    pub description: String,
    pub sla_priority: SlaPriority,
    pub status: ServiceStatus,
    pub estimated_price: Option<Decimal>,
    pub final_price: Option<Decimal>,
    /// Geocoded service address, when the client supplied one.
    pub location: Option<GeoPoint>,
    pub created_at: TimeMs,
    pub completed_at: Option<TimeMs>,
}

impl ServiceRequest {
    pub fn is_owned_by(&self, client_id: i64) -> bool {
        self.client_id == client_id
    }

    pub fn is_assigned_to(&self, provider_id: i64) -> bool {
        self.provider_id == Some(provider_id)
    }
}

/// Input for creating a service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewServiceRequest {
    pub category_id: i64,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub sla_priority: SlaPriority,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}
