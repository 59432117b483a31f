//! Tests for operation storage: the upsert-by-UID pattern and the joined,
//! hydrated account-operations listing.

mod common;

use common::create_test_store;
use wallet_ledger_store::data_structures::{
    Account, Block, Operation, OperationKind, TransactionBundle, TransactionInput,
    TransactionOutput, WalletTransaction,
};
use wallet_ledger_store::errors::StoreError;
use wallet_ledger_store::storage::{FetchOrder, SqliteStore, WalletStore};

fn transaction(hash: &str, received_at: i64) -> WalletTransaction {
    WalletTransaction {
        hash: hash.to_string(),
        received_at,
        lock_time: 0,
        fees: 100,
        block_hash: None,
    }
}

fn receive_bundle(hash: &str, received_at: i64, block: Option<Block>) -> TransactionBundle {
    TransactionBundle {
        transaction: transaction(hash, received_at),
        inputs: vec![TransactionInput::coinbase(hash, 0, "cb")],
        outputs: vec![TransactionOutput {
            transaction_hash: hash.to_string(),
            output_index: 0,
            value: 1000,
            script_hex: format!("script-{hash}"),
            address: Some("addr-a".to_string()),
        }],
        block,
    }
}

async fn setup_accounts(store: &SqliteStore) -> Result<(), Box<dyn std::error::Error>> {
    for index in [0u32, 1] {
        let mut account = Account::new(index, format!("xpub-{index}"));
        account.next_external_index = 1;
        store.insert_account(&account).await?;
    }
    Ok(())
}

#[tokio::test]
async fn saving_an_operation_twice_updates_the_amount_in_place(
) -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;
    setup_accounts(&store).await?;
    store
        .save_transactions(&[receive_bundle("t1", 10, None)])
        .await?;

    let operation = Operation::new("t1", 0, OperationKind::Receive, 1000);
    store.save_operations(&[operation.clone()]).await?;

    let amended = Operation::new("t1", 0, OperationKind::Receive, 900);
    assert_eq!(amended.uid, operation.uid);
    store.save_operations(&[amended]).await?;

    assert_eq!(store.count_account_operations(Some(0)).await?, 1);
    let listed = store
        .list_account_operations(Some(0), 0, 10, FetchOrder::Ascending)
        .await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].operation.amount, 900);

    Ok(())
}

#[tokio::test]
async fn listing_orders_by_reception_time_and_paginates(
) -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;
    setup_accounts(&store).await?;

    store
        .save_transactions(&[
            receive_bundle("t1", 30, None),
            receive_bundle("t2", 10, None),
            receive_bundle("t3", 20, None),
        ])
        .await?;
    store
        .save_operations(&[
            Operation::new("t1", 0, OperationKind::Receive, 1000),
            Operation::new("t2", 0, OperationKind::Receive, 1000),
            Operation::new("t3", 0, OperationKind::Receive, 1000),
        ])
        .await?;

    let ascending = store
        .list_account_operations(Some(0), 0, 10, FetchOrder::Ascending)
        .await?;
    let hashes: Vec<&str> = ascending
        .iter()
        .map(|o| o.transaction.transaction.hash.as_str())
        .collect();
    assert_eq!(hashes, vec!["t2", "t3", "t1"]);

    let descending = store
        .list_account_operations(Some(0), 0, 10, FetchOrder::Descending)
        .await?;
    let hashes: Vec<&str> = descending
        .iter()
        .map(|o| o.transaction.transaction.hash.as_str())
        .collect();
    assert_eq!(hashes, vec!["t1", "t3", "t2"]);

    // Slice [1, 3) of the ascending order
    let page = store
        .list_account_operations(Some(0), 1, 2, FetchOrder::Ascending)
        .await?;
    let hashes: Vec<&str> = page
        .iter()
        .map(|o| o.transaction.transaction.hash.as_str())
        .collect();
    assert_eq!(hashes, vec!["t3", "t1"]);

    Ok(())
}

#[tokio::test]
async fn listing_hydrates_the_full_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;
    setup_accounts(&store).await?;

    let block = Block::new("b1", 50, 1_700_000_000);
    store
        .save_transactions(&[receive_bundle("t1", 10, Some(block.clone()))])
        .await?;
    store
        .save_operations(&[Operation::new("t1", 0, OperationKind::Receive, 1000)])
        .await?;

    let listed = store
        .list_account_operations(None, 0, 10, FetchOrder::Ascending)
        .await?;
    assert_eq!(listed.len(), 1);

    let entry = &listed[0];
    assert_eq!(entry.account.account_index, 0);
    assert_eq!(entry.operation.kind, OperationKind::Receive);
    assert_eq!(entry.transaction.block.as_ref().map(|b| b.height), Some(50));
    assert_eq!(entry.transaction.inputs.len(), 1);
    assert!(entry.transaction.inputs[0].is_coinbase());
    assert_eq!(entry.transaction.outputs.len(), 1);
    assert_eq!(entry.transaction.outputs[0].value, 1000);

    Ok(())
}

#[tokio::test]
async fn listing_filters_and_counts_per_account() -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;
    setup_accounts(&store).await?;

    store
        .save_transactions(&[
            receive_bundle("t1", 10, None),
            receive_bundle("t2", 20, None),
        ])
        .await?;
    store
        .save_operations(&[
            Operation::new("t1", 0, OperationKind::Receive, 1000),
            Operation::new("t2", 1, OperationKind::Receive, 1000),
            Operation::new("t2", 1, OperationKind::Send, -500),
        ])
        .await?;

    assert_eq!(store.count_account_operations(None).await?, 3);
    assert_eq!(store.count_account_operations(Some(0)).await?, 1);
    assert_eq!(store.count_account_operations(Some(1)).await?, 2);

    let account_one = store
        .list_account_operations(Some(1), 0, 10, FetchOrder::Ascending)
        .await?;
    assert_eq!(account_one.len(), 2);
    assert!(account_one.iter().all(|o| o.account.account_index == 1));

    Ok(())
}

#[tokio::test]
async fn hydration_rejects_a_gutted_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let store = create_test_store().await?;
    setup_accounts(&store).await?;

    // A transaction stored with neither inputs nor outputs is corrupt state
    store
        .save_transactions(&[TransactionBundle {
            transaction: transaction("t1", 10),
            inputs: Vec::new(),
            outputs: Vec::new(),
            block: None,
        }])
        .await?;
    store
        .save_operations(&[Operation::new("t1", 0, OperationKind::Receive, 1000)])
        .await?;

    let result = store
        .list_account_operations(Some(0), 0, 10, FetchOrder::Ascending)
        .await;
    assert!(matches!(result, Err(StoreError::IntegrityError(_))));

    Ok(())
}
