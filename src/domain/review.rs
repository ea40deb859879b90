//! Reviews and the provider reputation pair they feed.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};

/// Running `(rating, totalRatings)` pair stored on the provider profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reputation {
    pub rating: Decimal,
    pub total_ratings: i64,
}

impl Reputation {
    pub fn new(rating: Decimal, total_ratings: i64) -> Self {
        Self {
            rating,
            total_ratings,
        }
    }

    pub fn unrated() -> Self {
        Self::new(Decimal::zero(), 0)
    }
}

/// A 0-10 rating of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub service_request_id: i64,
    pub client_id: i64,
    pub provider_id: i64,
    pub rating: Decimal,
    pub comment: Option<String>,
    pub created_at: TimeMs,
}

/// Client-submitted review payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub provider_id: i64,
    pub rating: Decimal,
    #[serde(default)]
    pub comment: Option<String>,
}
