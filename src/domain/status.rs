//! Service request status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a service request.
///
/// Declaration order is lifecycle order; `Cancelled` is terminal and sits outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    AiDiagnosed,
    FeePaid,
    ProviderAssigned,
    ProviderDiagnosed,
    QuoteSent,
    Accepted,
    InProgress,
    AwaitingConfirmation,
    Completed,
    Cancelled,
}

impl ServiceStatus {
    pub const ALL: [ServiceStatus; 11] = [
        ServiceStatus::Pending,
        ServiceStatus::AiDiagnosed,
        ServiceStatus::FeePaid,
        ServiceStatus::ProviderAssigned,
        ServiceStatus::ProviderDiagnosed,
        ServiceStatus::QuoteSent,
        ServiceStatus::Accepted,
        ServiceStatus::InProgress,
        ServiceStatus::AwaitingConfirmation,
        ServiceStatus::Completed,
        ServiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::AiDiagnosed => "ai_diagnosed",
            ServiceStatus::FeePaid => "fee_paid",
            ServiceStatus::ProviderAssigned => "provider_assigned",
            ServiceStatus::ProviderDiagnosed => "provider_diagnosed",
            ServiceStatus::QuoteSent => "quote_sent",
            ServiceStatus::Accepted => "accepted",
            ServiceStatus::InProgress => "in_progress",
            ServiceStatus::AwaitingConfirmation => "awaiting_confirmation",
            ServiceStatus::Completed => "completed",
            ServiceStatus::Cancelled => "cancelled",
        }
    }

    /// Position in the lifecycle order. `None` for `Cancelled`.
    pub fn rank(&self) -> Option<u8> {
        match self {
            ServiceStatus::Cancelled => None,
            other => Some(*other as u8),
        }
    }

    /// Whether a provider must be attached in this status.
    pub fn requires_provider(&self) -> bool {
        match self.rank() {
            Some(rank) => rank >= ServiceStatus::ProviderAssigned as u8,
            None => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::Completed | ServiceStatus::Cancelled)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown service status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all() {
        for status in ServiceStatus::ALL {
            assert_eq!(status.as_str().parse::<ServiceStatus>().unwrap(), status);
        }
        assert!("quoted".parse::<ServiceStatus>().is_err());
    }

    #[test]
    fn test_requires_provider() {
        assert!(!ServiceStatus::FeePaid.requires_provider());
        assert!(ServiceStatus::ProviderAssigned.requires_provider());
        assert!(ServiceStatus::Completed.requires_provider());
        assert!(!ServiceStatus::Cancelled.requires_provider());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ServiceStatus::AwaitingConfirmation).unwrap();
        assert_eq!(json, "\"awaiting_confirmation\"");
    }
}
