pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod upstream;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{Actor, Decimal, Role, ServiceStatus, TimeMs};
pub use error::{AppError, EngineError};
pub use orchestration::{
    AntifraudMonitor, EventBus, LedgerManager, LifecycleController, RatingAggregator,
};
