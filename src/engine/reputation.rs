//! Running weighted-average reputation.

use crate::domain::{Decimal, Reputation};

/// Fold one submitted rating into the running average and bump the count.
///
/// `new = (old × n + submitted) / (n + 1)`, clamped to `[0, 10]`.
pub fn apply_rating(current: Reputation, submitted: Decimal) -> Reputation {
    let lo = Decimal::zero();
    let hi = Decimal::from_units(10);
    let submitted = submitted.clamp(lo, hi);
    let n = Decimal::from_units(current.total_ratings.max(0));
    let rating = (current.rating.clamp(lo, hi) * n + submitted) / (n + Decimal::one());
    Reputation::new(rating.clamp(lo, hi), current.total_ratings.max(0) + 1)
}
