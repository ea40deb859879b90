//! Pure computation engines: pricing, banding, reputation and fraud heuristics.
//!
//! Nothing here performs I/O or holds state.

pub mod antifraud;
pub mod banding;
pub mod domestic;
pub mod pricing;
pub mod reputation;

pub use antifraud::{
    evaluate_all, DuplicateDocumentRule, ExcessiveCancellationsRule, FraudContext, FraudRule,
    LocationMismatchRule, ShortExecutionRule, ValueAboveNormRule,
};
pub use banding::{price_band, PriceBand, ReputationTier};
pub use domestic::{price_domestic, DomesticQuote};
pub use pricing::{platform_fee, repair_quote, sla_estimate, sla_range, PricingError};
pub use reputation::apply_rating;
