//! Stateful coordination on top of the repository and the pure engines.
//!
//! This module provides:
//! - The lifecycle controller and its declarative transition table
//! - Ledger/escrow management and the payment-confirmation worker
//! - The anti-fraud monitor and the rating aggregator
//! - The post-commit domain event bus

pub mod antifraud;
pub mod confirmations;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod rating;
pub mod transitions;

pub use antifraud::AntifraudMonitor;
pub use confirmations::{confirmation_channel, spawn_confirmation_worker};
pub use events::{spawn_event_logger, EventBus};
pub use ledger::LedgerManager;
pub use lifecycle::{
    AcceptanceReceipt, CompletionReport, DomesticBooking, DomesticBookingDetails,
    LifecycleController, NewDomesticRequest, ProviderCandidate, RequestView,
};
pub use rating::RatingAggregator;
pub use transitions::{authorize, Caller, Party, Transition};
