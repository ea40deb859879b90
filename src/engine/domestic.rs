//! Fully automated domestic pricing.
//!
//! `price = (basePrice(houseSize) + addOnSurcharge) × serviceMultiplier × frequencyMultiplier`,
//! rounded to whole units; the platform fee is a percentage of that price.

use crate::domain::{Decimal, DomesticDetails, DomesticServiceType, Frequency, HouseSize};
use serde::Serialize;

pub fn base_price(size: HouseSize) -> Decimal {
    Decimal::from_units(match size {
        HouseSize::OneBedroom => 12000,
        HouseSize::TwoBedrooms => 15000,
        HouseSize::ThreeToFourBedrooms => 20000,
        HouseSize::FivePlusBedrooms => 28000,
    })
}

/// Multiplier for bundled services (1.0 for add-ons).
pub fn service_multiplier(service: DomesticServiceType) -> Decimal {
    match service {
        DomesticServiceType::Complete => Decimal::from_parts(15, 1),
        DomesticServiceType::PostConstruction => Decimal::from_parts(18, 1),
        DomesticServiceType::Standard
        | DomesticServiceType::Ironing
        | DomesticServiceType::Windows => Decimal::one(),
    }
}

/// Flat surcharge for single-task add-ons.
pub fn addon_surcharge(service: DomesticServiceType) -> Decimal {
    Decimal::from_units(match service {
        DomesticServiceType::Ironing => 5000,
        DomesticServiceType::Windows => 3000,
        _ => 0,
    })
}

pub fn frequency_multiplier(frequency: Frequency) -> Decimal {
    match frequency {
        Frequency::Daily => Decimal::from_parts(80, 2),
        Frequency::Weekly => Decimal::from_parts(85, 2),
        Frequency::Biweekly => Decimal::from_parts(90, 2),
        Frequency::Monthly => Decimal::from_parts(95, 2),
        Frequency::OneOff => Decimal::one(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomesticQuote {
    pub base_price: Decimal,
    pub final_price: Decimal,
    pub platform_fee: Decimal,
}

pub fn price_domestic(details: &DomesticDetails, fee_percent: Decimal) -> DomesticQuote {
    let base = base_price(details.house_size);
    let final_price = ((base + addon_surcharge(details.service_type))
        * service_multiplier(details.service_type)
        * frequency_multiplier(details.frequency))
    .round_money();
    DomesticQuote {
        base_price: base,
        final_price,
        platform_fee: final_price.percent_of(fee_percent).round_money(),
    }
}
