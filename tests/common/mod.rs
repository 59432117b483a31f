//! Shared helpers for the integration tests

use wallet_ledger_store::storage::{SqliteStore, WalletStore};

/// Create an initialized in-memory store, isolated per test
pub async fn create_test_store() -> Result<SqliteStore, Box<dyn std::error::Error>> {
    let store = SqliteStore::open_in_memory().await?;
    store.initialize().await?;
    Ok(store)
}
