pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod distribution;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod sinks;

pub use config::Config;
pub use db::{init_db, MemoryStore, RecordStore, Repository, StoreError};
pub use directory::{InMemoryDirectory, QuoteBook, UserDirectory};
pub use distribution::{Disposition, Distributor, RewardSettings};
pub use domain::{
    Address, BusinessKey, Decimal, DistributionKind, EventId, OrderStatus, Payload, TimeMs,
    TransactionRecord, TxStatus, UserId,
};
pub use engine::{EnginePolicy, LifecycleEngine, Outcome};
pub use error::AppError;
pub use execution::{ExecutionClient, HttpExecutionClient, MockExecutionClient};
pub use sinks::SideEffectSink;
