//! Ledger store for hierarchical-deterministic wallets
//!
//! This crate maintains a local, queryable view of a BIP32-style wallet
//! reconciled against blockchain data pushed in by an external
//! synchronization engine. It tracks accounts, derived addresses, observed
//! blocks, transactions with their inputs and outputs, computed balances,
//! user-facing operations, and double-spend conflict edges.
//!
//! The store itself performs no network I/O and holds no keys: the sync
//! engine decides what to fetch and when, then drives the write operations
//! exposed here. Every write is idempotent, so a failed batch can simply be
//! re-driven.
//!
//! ## Storage
//!
//! Persistence is SQLite through [`storage::SqliteStore`], which implements
//! the [`storage::WalletStore`] trait. The store is an explicit handle owned
//! by the caller; isolated in-memory instances are available for testing:
//!
//! ```no_run
//! # async fn demo() -> wallet_ledger_store::StoreResult<()> {
//! use wallet_ledger_store::storage::{SqliteStore, WalletStore};
//!
//! let store = SqliteStore::open_in_memory().await?;
//! store.initialize().await?;
//! let accounts = store.list_accounts().await?;
//! # drop(accounts);
//! # Ok(())
//! # }
//! ```

pub mod data_structures;
pub mod errors;
pub mod storage;

pub use errors::*;
pub use storage::*;
