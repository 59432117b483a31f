//! Tests for schema version gating and metadata upserts.

mod common;

use std::collections::HashMap;

use common::create_test_store;
use wallet_ledger_store::errors::StoreError;
use wallet_ledger_store::storage::{SqliteStore, WalletStore, SCHEMA_VERSION, SCHEMA_VERSION_KEY};

fn pairs(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn schema_version_is_seeded_on_initialize() -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;
    assert_eq!(store.schema_version().await?, SCHEMA_VERSION);
    Ok(())
}

#[tokio::test]
async fn schema_version_fails_without_metadata_row() -> Result<(), Box<dyn std::error::Error>> {
    // Schema created by hand, version row never seeded
    let store = SqliteStore::open_in_memory().await?;
    let result = store.schema_version().await;
    assert!(matches!(result, Err(StoreError::StorageError(_))));

    Ok(())
}

#[tokio::test]
async fn reinitializing_preserves_a_migrated_version() -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;

    store
        .update_metadata(&pairs(&[(SCHEMA_VERSION_KEY, "5")]))
        .await?;
    assert_eq!(store.schema_version().await?, 5);

    // A second initialize must not reset the version
    store.initialize().await?;
    assert_eq!(store.schema_version().await?, 5);

    Ok(())
}

#[tokio::test]
async fn non_positive_schema_version_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;

    store
        .update_metadata(&pairs(&[(SCHEMA_VERSION_KEY, "0")]))
        .await?;
    assert!(store.schema_version().await.is_err());

    store
        .update_metadata(&pairs(&[(SCHEMA_VERSION_KEY, "not-a-number")]))
        .await?;
    assert!(store.schema_version().await.is_err());

    Ok(())
}

#[tokio::test]
async fn update_metadata_upserts_and_ignores_empty_input(
) -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;

    // Empty input is a no-op
    store.update_metadata(&HashMap::new()).await?;

    // Insert then update the same key through the same call
    store
        .update_metadata(&pairs(&[(SCHEMA_VERSION_KEY, "2"), ("wallet_name", "main")]))
        .await?;
    assert_eq!(store.schema_version().await?, 2);

    store
        .update_metadata(&pairs(&[(SCHEMA_VERSION_KEY, "3")]))
        .await?;
    assert_eq!(store.schema_version().await?, 3);

    Ok(())
}
