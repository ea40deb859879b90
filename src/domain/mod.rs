//! Domain types for the service-request transaction engine.
//!
//! This module provides:
//! - Lossless money/rating arithmetic via the Decimal wrapper
//! - Primitives: TimeMs, GeoPoint, Role, Actor
//! - The ServiceRequest aggregate and its status enum
//! - Diagnosis, ledger, fraud and review records (related by id only)
//! - Domain events emitted after commits

pub mod decimal;
pub mod diagnosis;
pub mod domestic;
pub mod event;
pub mod fraud;
pub mod ledger;
pub mod primitives;
pub mod request;
pub mod review;
pub mod status;

pub use decimal::Decimal;
pub use diagnosis::{AiDiagnosis, MaterialItem, ProviderDiagnosis, ProviderFindings};
pub use domestic::{DomesticDetails, DomesticServiceType, Frequency, HouseSize};
pub use event::DomainEvent;
pub use fraud::{AntifraudFlag, Checkpoint, ExecutionLog, FlagDraft, FlagReason, Severity};
pub use ledger::{
    AcceptanceMetadata, DigitalAcceptance, EscrowShares, EscrowStatus, Payment, PaymentEscrow,
    PaymentKind, PaymentMethod, PaymentStatus, QuoteBreakdown, ShareError,
};
pub use primitives::{Actor, Clock, GeoPoint, ManualClock, Role, SystemClock, TimeMs};
pub use request::{
    Category, CategoryKind, Client, NewServiceRequest, Provider, ServiceRequest, SlaPriority,
};
pub use review::{NewReview, Reputation, Review};
pub use status::ServiceStatus;
