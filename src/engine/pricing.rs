//! Repair-category pricing: SLA-scaled estimates and provider quote breakdowns.

use crate::domain::{Decimal, QuoteBreakdown, SlaPriority};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: Decimal },
    #[error("price range is inverted: min {min} > max {max}")]
    InvertedRange { min: Decimal, max: Decimal },
}

fn non_negative(field: &'static str, value: Decimal) -> Result<Decimal, PricingError> {
    if value.is_negative() {
        Err(PricingError::Negative { field, value })
    } else {
        Ok(value)
    }
}

/// Estimate displayed before a provider is assigned: `round(base × sla multiplier)`.
pub fn sla_estimate(base_price: Decimal, sla: SlaPriority) -> Result<Decimal, PricingError> {
    let base = non_negative("base_price", base_price)?;
    Ok((base * sla.multiplier()).round_money())
}

/// SLA-scaled copy of an estimated `[min, max]` range.
pub fn sla_range(
    min: Decimal,
    max: Decimal,
    sla: SlaPriority,
) -> Result<(Decimal, Decimal), PricingError> {
    let min = non_negative("price_range_min", min)?;
    let max = non_negative("price_range_max", max)?;
    if min > max {
        return Err(PricingError::InvertedRange { min, max });
    }
    Ok((
        (min * sla.multiplier()).round_money(),
        (max * sla.multiplier()).round_money(),
    ))
}

/// `round((labor + materials) × fee_percent / 100)`.
pub fn platform_fee(
    labor_cost: Decimal,
    materials_cost: Decimal,
    fee_percent: Decimal,
) -> Result<Decimal, PricingError> {
    let labor = non_negative("labor_cost", labor_cost)?;
    let materials = non_negative("materials_cost", materials_cost)?;
    let percent = non_negative("fee_percent", fee_percent)?;
    Ok((labor + materials).percent_of(percent).round_money())
}

/// Provider-quoted total: labor + materials + platform fee. SLA does not apply here.
pub fn repair_quote(
    labor_cost: Decimal,
    materials_cost: Decimal,
    fee_percent: Decimal,
) -> Result<QuoteBreakdown, PricingError> {
    let platform_fee = platform_fee(labor_cost, materials_cost, fee_percent)?;
    Ok(QuoteBreakdown {
        labor_cost,
        materials_cost,
        platform_fee,
        total_price: labor_cost + materials_cost + platform_fee,
    })
}
