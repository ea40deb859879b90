//! Anti-fraud heuristics as independent predicates over a job snapshot.
//!
//! Rules never fail and never block the lifecycle; each returns at most one
//! draft flag and any subset may fire for the same job.

use crate::domain::{
    Decimal, ExecutionLog, FlagDraft, FlagReason, GeoPoint, ServiceRequest, Severity,
};
use std::fmt;

/// Everything the rules may look at for one job.
#[derive(Debug, Clone)]
pub struct FraudContext<'a> {
    pub request: &'a ServiceRequest,
    pub execution: Option<&'a ExecutionLog>,
    pub category_base_price: Option<Decimal>,
    /// Cancelled requests owned by the same client.
    pub client_cancellations: i64,
    /// Other client accounts sharing this client's document that have open jobs.
    pub clients_sharing_document: i64,
}

pub trait FraudRule: Send + Sync + fmt::Debug {
    fn reason(&self) -> FlagReason;

    fn evaluate(&self, ctx: &FraudContext<'_>) -> Option<FlagDraft>;
}

/// Execution finished implausibly fast.
#[derive(Debug, Clone)]
pub struct ShortExecutionRule {
    pub min_minutes: i64,
}

impl FraudRule for ShortExecutionRule {
    fn reason(&self) -> FlagReason {
        FlagReason::ShortExecutionDuration
    }

    fn evaluate(&self, ctx: &FraudContext<'_>) -> Option<FlagDraft> {
        let log = ctx.execution?;
        let minutes = log.duration_minutes?;
        (minutes < self.min_minutes).then(|| FlagDraft {
            user_id: log.provider_id,
            reason: self.reason(),
            severity: Severity::Medium,
            details: format!(
                "execution took {} minutes (minimum {})",
                minutes, self.min_minutes
            ),
        })
    }
}

/// Final price far above the category's base price.
#[derive(Debug, Clone)]
pub struct ValueAboveNormRule {
    pub max_multiple: Decimal,
}

impl FraudRule for ValueAboveNormRule {
    fn reason(&self) -> FlagReason {
        FlagReason::ValueAboveCategoryNorm
    }

    fn evaluate(&self, ctx: &FraudContext<'_>) -> Option<FlagDraft> {
        let base = ctx.category_base_price.filter(|b| !b.is_zero())?;
        let price = ctx.request.final_price.or(ctx.request.estimated_price)?;
        let provider_id = ctx.request.provider_id?;
        (price > base * self.max_multiple).then(|| FlagDraft {
            user_id: provider_id,
            reason: self.reason(),
            severity: Severity::High,
            details: format!(
                "price {} exceeds {}x category base {}",
                price, self.max_multiple, base
            ),
        })
    }
}

/// Client cancels too often.
#[derive(Debug, Clone)]
pub struct ExcessiveCancellationsRule {
    pub max_cancellations: i64,
}

impl FraudRule for ExcessiveCancellationsRule {
    fn reason(&self) -> FlagReason {
        FlagReason::ExcessiveCancellations
    }

    fn evaluate(&self, ctx: &FraudContext<'_>) -> Option<FlagDraft> {
        (ctx.client_cancellations >= self.max_cancellations).then(|| FlagDraft {
            user_id: ctx.request.client_id,
            reason: self.reason(),
            severity: Severity::Low,
            details: format!("client has {} cancelled requests", ctx.client_cancellations),
        })
    }
}

/// Execution reported far from the declared service address.
#[derive(Debug, Clone)]
pub struct LocationMismatchRule {
    pub max_distance_km: f64,
}

impl FraudRule for LocationMismatchRule {
    fn reason(&self) -> FlagReason {
        FlagReason::LocationMismatch
    }

    fn evaluate(&self, ctx: &FraudContext<'_>) -> Option<FlagDraft> {
        let declared = ctx.request.location?;
        let log = ctx.execution?;
        let farthest = [log.start_location, log.end_location]
            .into_iter()
            .flatten()
            .map(|p: GeoPoint| declared.distance_km(&p))
            .reduce(f64::max)?;
        (farthest > self.max_distance_km).then(|| FlagDraft {
            user_id: log.provider_id,
            reason: self.reason(),
            severity: Severity::High,
            details: format!(
                "execution reported {:.1} km from the service address",
                farthest
            ),
        })
    }
}

/// Same national document behind several accounts with open jobs.
#[derive(Debug, Clone)]
pub struct DuplicateDocumentRule;

impl FraudRule for DuplicateDocumentRule {
    fn reason(&self) -> FlagReason {
        FlagReason::DuplicateDocument
    }

    fn evaluate(&self, ctx: &FraudContext<'_>) -> Option<FlagDraft> {
        (ctx.clients_sharing_document > 0).then(|| FlagDraft {
            user_id: ctx.request.client_id,
            reason: self.reason(),
            severity: Severity::High,
            details: format!(
                "document shared with {} other account(s) holding open jobs",
                ctx.clients_sharing_document
            ),
        })
    }
}

/// Run every rule; output keeps rule order.
pub fn evaluate_all(rules: &[Box<dyn FraudRule>], ctx: &FraudContext<'_>) -> Vec<FlagDraft> {
    rules.iter().filter_map(|rule| rule.evaluate(ctx)).collect()
}
