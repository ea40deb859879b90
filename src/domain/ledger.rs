//! Payments, escrows and the binding digital acceptance.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Pix,
    Card,
    Boleto,
}

/// What a payment pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    DiagnosisFee,
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Holding,
    Released,
}

macro_rules! str_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($ty::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($ty), ": {}"), other)),
                }
            }
        }
    };
}

str_enum!(PaymentStatus { Pending => "pending", Completed => "completed", Failed => "failed" });
str_enum!(PaymentMethod { Pix => "pix", Card => "card", Boleto => "boleto" });
str_enum!(PaymentKind { DiagnosisFee => "diagnosis_fee", Service => "service" });
str_enum!(EscrowStatus { Holding => "holding", Released => "released" });

/// A monetary transaction linked to a service request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub service_request_id: i64,
    pub kind: PaymentKind,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Gateway reference used to correlate confirmations.
    pub payment_ref: String,
    pub created_at: TimeMs,
    pub confirmed_at: Option<TimeMs>,
}

/// Split of an escrowed amount. Deserialization goes through [`EscrowShares::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEscrowShares")]
pub struct EscrowShares {
    hold_amount: Decimal,
    platform_share: Decimal,
    provider_share: Decimal,
    supplier_share: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEscrowShares {
    hold_amount: Decimal,
    platform_share: Decimal,
    provider_share: Decimal,
    supplier_share: Decimal,
}

impl TryFrom<RawEscrowShares> for EscrowShares {
    type Error = ShareError;

    fn try_from(raw: RawEscrowShares) -> Result<Self, Self::Error> {
        EscrowShares::new(
            raw.hold_amount,
            raw.platform_share,
            raw.provider_share,
            raw.supplier_share,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("escrow shares sum to {sum} but hold amount is {hold}")]
    Mismatch { hold: Decimal, sum: Decimal },
    #[error("escrow share must not be negative: {0}")]
    Negative(Decimal),
}

impl EscrowShares {
    /// Build a share split. Shares must be non-negative and sum exactly to `hold_amount`.
    pub fn new(
        hold_amount: Decimal,
        platform_share: Decimal,
        provider_share: Decimal,
        supplier_share: Decimal,
    ) -> Result<Self, ShareError> {
        for share in [platform_share, provider_share, supplier_share] {
            if share.is_negative() {
                return Err(ShareError::Negative(share));
            }
        }
        let sum = platform_share + provider_share + supplier_share;
        if sum != hold_amount {
            return Err(ShareError::Mismatch {
                hold: hold_amount,
                sum,
            });
        }
        Ok(Self {
            hold_amount,
            platform_share,
            provider_share,
            supplier_share,
        })
    }

    pub fn hold_amount(&self) -> Decimal {
        self.hold_amount
    }

    pub fn platform_share(&self) -> Decimal {
        self.platform_share
    }

    pub fn provider_share(&self) -> Decimal {
        self.provider_share
    }

    pub fn supplier_share(&self) -> Decimal {
        self.supplier_share
    }
}

/// Funds held for a payment until the client confirms completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEscrow {
    pub id: i64,
    pub payment_id: i64,
    pub service_request_id: i64,
    #[serde(flatten)]
    pub shares: EscrowShares,
    pub status: EscrowStatus,
    pub created_at: TimeMs,
    pub released_at: Option<TimeMs>,
}

/// Quote breakdown the client binds to when accepting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteBreakdown {
    pub labor_cost: Decimal,
    pub materials_cost: Decimal,
    pub platform_fee: Decimal,
    pub total_price: Decimal,
}

impl QuoteBreakdown {
    /// Escrow split: platform keeps the fee, provider the labor, supplier the materials.
    pub fn escrow_shares(&self) -> Result<EscrowShares, ShareError> {
        EscrowShares::new(
            self.total_price,
            self.platform_fee,
            self.labor_cost,
            self.materials_cost,
        )
    }
}

/// Audit metadata captured at acceptance time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceMetadata {
    pub origin_address: Option<String>,
    pub user_agent: Option<String>,
}

/// The client's binding acceptance. Exactly one per request, immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalAcceptance {
    pub id: i64,
    pub service_request_id: i64,
    pub client_id: i64,
    #[serde(flatten)]
    pub breakdown: QuoteBreakdown,
    #[serde(flatten)]
    pub metadata: AcceptanceMetadata,
    /// SHA-256 over the accepted terms and metadata.
    pub fingerprint: String,
    pub accepted_at: TimeMs,
}

impl DigitalAcceptance {
    /// Stable digest of what was accepted, by whom and from where.
    pub fn compute_fingerprint(
        service_request_id: i64,
        client_id: i64,
        breakdown: &QuoteBreakdown,
        metadata: &AcceptanceMetadata,
        accepted_at: TimeMs,
    ) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hasher.update(service_request_id.to_le_bytes());
        hasher.update(client_id.to_le_bytes());
        for amount in [
            breakdown.labor_cost,
            breakdown.materials_cost,
            breakdown.platform_fee,
            breakdown.total_price,
        ] {
            hash_var(&mut hasher, &amount.to_canonical_string());
        }
        hash_var(&mut hasher, metadata.origin_address.as_deref().unwrap_or(""));
        hash_var(&mut hasher, metadata.user_agent.as_deref().unwrap_or(""));
        hasher.update(accepted_at.as_ms().to_le_bytes());

        hex::encode(hasher.finalize())
    }
}
