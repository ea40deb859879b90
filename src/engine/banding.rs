//! Reputation-based provider price banding.
//!
//! Every candidate gets a sub-band of width `10% × range` inside the estimated
//! `[min, max]`, anchored by reputation tier. Band tops are capped at
//! `max + 10% × range`.

use crate::domain::{Decimal, Reputation};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationTier {
    New,
    Beginner,
    Regular,
    Experienced,
    Premium,
}

impl ReputationTier {
    /// Tier for a reputation pair. Ratings are clamped to `[0, 10]` first.
    pub fn classify(reputation: &Reputation) -> Self {
        if reputation.total_ratings == 0 {
            return ReputationTier::New;
        }
        let rating = clamp_rating(reputation.rating);
        if rating >= Decimal::from_units(9) {
            ReputationTier::Premium
        } else if rating >= Decimal::from_units(8) {
            ReputationTier::Experienced
        } else if rating >= Decimal::from_parts(51, 1) {
            ReputationTier::Regular
        } else {
            ReputationTier::Beginner
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBand {
    pub tier: ReputationTier,
    pub band_min: Decimal,
    pub band_max: Decimal,
}

impl PriceBand {
    pub fn midpoint(&self) -> Decimal {
        (self.band_min + self.band_max) / Decimal::from_units(2)
    }
}

fn clamp_rating(rating: Decimal) -> Decimal {
    rating.clamp(Decimal::zero(), Decimal::from_units(10))
}

fn pct(n: i64) -> Decimal {
    Decimal::from_parts(n, 2)
}

/// Fraction in `[0, 1]` of how far `rating` sits inside `[lo, hi)`.
fn progress(rating: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    ((rating - lo) / (hi - lo)).clamp(Decimal::zero(), Decimal::one())
}

/// Band for one provider over the estimated range `[min, max]`.
///
/// An inverted range is treated as its swap.
pub fn price_band(min: Decimal, max: Decimal, reputation: &Reputation) -> PriceBand {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    let range = max - min;
    let width = range * pct(10);
    let ceiling = max + range * pct(10);
    let rating = clamp_rating(reputation.rating);
    let tier = ReputationTier::classify(reputation);

    let offset = match tier {
        ReputationTier::New => Decimal::zero(),
        ReputationTier::Premium => {
            range * pct(35)
                + range * pct(15) * progress(rating, Decimal::from_units(9), Decimal::from_units(10))
        }
        ReputationTier::Experienced => {
            range * pct(25)
                + range * pct(8) * progress(rating, Decimal::from_units(8), Decimal::from_units(9))
        }
        ReputationTier::Regular => {
            range * pct(10)
                + range
                    * pct(12)
                    * progress(rating, Decimal::from_parts(51, 1), Decimal::from_units(8))
        }
        ReputationTier::Beginner => {
            range * pct(5) * (rating / Decimal::from_units(5)).clamp(Decimal::zero(), Decimal::one())
        }
    };

    let band_max = (min + offset + width).min(ceiling);
    let band_min = (min + offset).min(band_max);
    PriceBand {
        tier,
        band_min,
        band_max,
    }
}
