//! Payment gateway adapters.
//!
//! Confirmations from any gateway are delivered as [`PaymentConfirmation`]
//! messages on one channel, consumed by the confirmation worker.

use super::{PaymentGateway, UpstreamError};
use crate::domain::{Decimal, PaymentMethod};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// "Payment `payment_ref` succeeded." Replaying one is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub payment_ref: String,
}

fn new_payment_ref(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Confirms every recorded payment after a fixed delay.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    confirmations: mpsc::Sender<PaymentConfirmation>,
    delay: Duration,
}

impl SimulatedGateway {
    pub fn new(confirmations: mpsc::Sender<PaymentConfirmation>, delay: Duration) -> Self {
        Self {
            confirmations,
            delay,
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn initiate(&self, amount: Decimal, method: PaymentMethod) -> Result<String, UpstreamError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(UpstreamError::Other(format!("cannot charge {}", amount)));
        }
        let payment_ref = new_payment_ref("sim");
        debug!(
            "Simulated charge {} via {} -> {}",
            amount,
            method.as_str(),
            payment_ref
        );
        Ok(payment_ref)
    }

    async fn payment_recorded(&self, payment_ref: &str) {
        let tx = self.confirmations.clone();
        let delay = self.delay;
        let confirmation = PaymentConfirmation {
            payment_ref: payment_ref.to_string(),
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(confirmation).await.is_err() {
                warn!("Confirmation channel closed; simulated confirmation dropped");
            }
        });
    }
}

/// Gateway whose confirmations arrive externally (webhook). Also used in tests.
#[derive(Debug, Clone, Default)]
pub struct ManualGateway {
    fail_with: Option<String>,
}

impl ManualGateway {
    pub fn new() -> Self {
        Self { fail_with: None }
    }

    /// Every `initiate` call fails with an upstream error.
    pub fn unavailable(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl PaymentGateway for ManualGateway {
    async fn initiate(&self, amount: Decimal, method: PaymentMethod) -> Result<String, UpstreamError> {
        if let Some(msg) = &self.fail_with {
            return Err(UpstreamError::Network(msg.clone()));
        }
        debug!("Charge {} via {} awaiting webhook", amount, method.as_str());
        Ok(new_payment_ref("pay"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_gateway_confirms_after_record() {
        let (tx, mut rx) = mpsc::channel(4);
        let gateway = SimulatedGateway::new(tx, Duration::from_millis(5));

        let payment_ref = gateway
            .initiate(Decimal::from_units(3000), PaymentMethod::Pix)
            .await
            .unwrap();
        assert!(payment_ref.starts_with("sim_"));

        gateway.payment_recorded(&payment_ref).await;
        let confirmation = rx.recv().await.unwrap();
        assert_eq!(confirmation.payment_ref, payment_ref);
    }

    #[tokio::test]
    async fn test_simulated_gateway_rejects_zero_amount() {
        let (tx, _rx) = mpsc::channel(1);
        let gateway = SimulatedGateway::new(tx, Duration::ZERO);
        assert!(gateway
            .initiate(Decimal::zero(), PaymentMethod::Card)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_manual_gateway_unavailable() {
        let gateway = ManualGateway::unavailable("gateway down");
        let err = gateway
            .initiate(Decimal::from_units(1), PaymentMethod::Boleto)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Network error: gateway down");
    }
}
