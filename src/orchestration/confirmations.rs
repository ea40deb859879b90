//! Single consumer for gateway payment confirmations.

use crate::upstream::PaymentConfirmation;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lifecycle::LifecycleController;

pub fn confirmation_channel(
    capacity: usize,
) -> (
    mpsc::Sender<PaymentConfirmation>,
    mpsc::Receiver<PaymentConfirmation>,
) {
    mpsc::channel(capacity.max(1))
}

/// Apply confirmations one at a time until every sender is dropped.
pub fn spawn_confirmation_worker(
    lifecycle: Arc<LifecycleController>,
    mut rx: mpsc::Receiver<PaymentConfirmation>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(confirmation) = rx.recv().await {
            match lifecycle.on_payment_confirmed(&confirmation.payment_ref).await {
                Ok(true) => info!("Applied confirmation for {}", confirmation.payment_ref),
                Ok(false) => debug!("Duplicate confirmation for {}", confirmation.payment_ref),
                Err(e) => warn!(
                    "Confirmation for {} rejected: {}",
                    confirmation.payment_ref, e
                ),
            }
        }
        info!("Confirmation channel closed, worker exiting");
    })
}
