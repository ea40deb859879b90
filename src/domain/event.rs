//! Domain events published to external subscribers (notifiers).

use crate::domain::{Decimal, FlagReason, ServiceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    StatusChanged {
        service_request_id: i64,
        from: ServiceStatus,
        to: ServiceStatus,
    },
    ProviderAssigned {
        service_request_id: i64,
        provider_id: i64,
    },
    ServiceAccepted {
        service_request_id: i64,
        total_price: Decimal,
    },
    PaymentConfirmed {
        service_request_id: i64,
        payment_id: i64,
    },
    EscrowReleased {
        service_request_id: i64,
        escrow_id: i64,
    },
    AntifraudFlagRaised {
        service_request_id: i64,
        flag_id: i64,
        reason: FlagReason,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::StatusChanged { .. } => "status_changed",
            DomainEvent::ProviderAssigned { .. } => "provider_assigned",
            DomainEvent::ServiceAccepted { .. } => "service_accepted",
            DomainEvent::PaymentConfirmed { .. } => "payment_confirmed",
            DomainEvent::EscrowReleased { .. } => "escrow_released",
            DomainEvent::AntifraudFlagRaised { .. } => "antifraud_flag_raised",
        }
    }

    pub fn service_request_id(&self) -> i64 {
        match self {
            DomainEvent::StatusChanged { service_request_id, .. }
            | DomainEvent::ProviderAssigned { service_request_id, .. }
            | DomainEvent::ServiceAccepted { service_request_id, .. }
            | DomainEvent::PaymentConfirmed { service_request_id, .. }
            | DomainEvent::EscrowReleased { service_request_id, .. }
            | DomainEvent::AntifraudFlagRaised { service_request_id, .. } => *service_request_id,
        }
    }
}
