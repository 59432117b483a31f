//! Storage abstraction layer for the wallet ledger
//!
//! The [`WalletStore`] trait defines the full operation surface; the SQLite
//! implementation in [`sqlite`] is the production backend. One store handle
//! wraps one connection worker, which serializes all access and gives the
//! single-writer discipline the reconciliation algorithms rely on.

pub mod schema;
pub mod sqlite;
pub mod storage_trait;

pub use schema::{SCHEMA_VERSION, SCHEMA_VERSION_KEY};
pub use sqlite::*;
pub use storage_trait::*;
