//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - The `RecordStore` contract and its SQLite and in-memory implementations
//! - Directory tables for users, wallets and quotes

pub mod memory;
pub mod migrations;
pub mod repo;
pub mod store;

pub use memory::{MemoryStore, StoreCall};
pub use migrations::init_db;
pub use repo::Repository;
pub use store::{InsertOutcome, RecordStore, ReferralClaim, StoreError};
