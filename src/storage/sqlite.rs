//! SQLite implementation of the wallet ledger store
//!
//! One [`SqliteStore`] wraps one `tokio-rusqlite` connection worker. The
//! worker thread serializes every statement, which provides the
//! single-writer discipline the reconciliation algorithms assume; readers
//! simply queue behind writers on the same worker.
//!
//! Write operations follow two idempotency patterns throughout:
//! check-before-insert for entities observed exactly once (addresses,
//! blocks, conflict edges) and update-then-insert for entities that may be
//! re-observed with new state (transactions, operations, metadata). Batches
//! are applied item by item; a failure stops the batch but keeps the items
//! already committed, so callers recover by re-driving the same batch.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::data_structures::{
    Account, Address, Block, BlockBundle, DerivationPath, DoubleSpendConflict, InputSource,
    Operation, OperationKind, TransactionBundle, TransactionInput, TransactionOutput,
    WalletTransaction,
};
use crate::errors::{StoreError, StoreResult};
use crate::storage::schema::{CREATE_SCHEMA_SQL, SCHEMA_VERSION, SCHEMA_VERSION_KEY};
use crate::storage::storage_trait::{AccountOperation, FetchOrder, SpendableOutput, WalletStore};

/// Log a failed statement and wrap the driver error with its intent
fn storage_error(intent: &str, err: impl std::fmt::Display) -> StoreError {
    tracing::error!("{intent}: {err}");
    StoreError::StorageError(format!("{intent}: {err}"))
}

/// Comma-separated positional placeholders for an IN clause
fn placeholders(count: usize) -> String {
    (0..count).map(|_| "?").collect::<Vec<_>>().join(", ")
}

/// Joined row of the account-operations listing before hydration
struct AccountOperationRow {
    account: Account,
    operation: Operation,
    transaction: WalletTransaction,
    block: Option<Block>,
}

/// SQLite-backed wallet ledger store
///
/// The store is an explicit handle owned by the caller; construct one at
/// startup, pass it wherever ledger access is needed, and drop it at
/// shutdown. Isolated in-memory instances keep tests hermetic.
pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    /// Open a file-backed store
    pub async fn open<P: AsRef<Path>>(database_path: P) -> StoreResult<Self> {
        let connection = Connection::open(database_path)
            .await
            .map_err(|e| storage_error("Failed to open SQLite database", e))?;
        let store = Self { connection };
        store.enable_wal_mode().await?;
        Ok(store)
    }

    /// Open an in-memory store, mostly useful for testing
    pub async fn open_in_memory() -> StoreResult<Self> {
        let connection = Connection::open(":memory:")
            .await
            .map_err(|e| storage_error("Failed to create in-memory database", e))?;
        Ok(Self { connection })
    }

    /// WAL keeps concurrent readers from blocking the single writer
    async fn enable_wal_mode(&self) -> StoreResult<()> {
        self.connection
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                Ok(())
            })
            .await
            .map_err(|e| storage_error("Failed to enable WAL mode", e))
    }

    // === Row converters ===

    fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
        Ok(Account {
            account_index: row.get::<_, i64>("account_index")? as u32,
            name: row.get("name")?,
            extended_public_key: row.get("extended_public_key")?,
            next_external_index: row.get::<_, i64>("next_external_index")? as u32,
            next_internal_index: row.get::<_, i64>("next_internal_index")? as u32,
            balance: row.get("balance")?,
            hidden: row.get("hidden")?,
        })
    }

    fn row_to_address(row: &Row) -> rusqlite::Result<Address> {
        Ok(Address {
            address: row.get("address")?,
            path: DerivationPath::new(
                row.get::<_, i64>("account_index")? as u32,
                row.get::<_, i64>("chain_index")? as u32,
                row.get::<_, i64>("key_index")? as u32,
            ),
        })
    }

    fn row_to_block(row: &Row) -> rusqlite::Result<Block> {
        Ok(Block {
            hash: row.get("hash")?,
            height: row.get::<_, i64>("height")? as u64,
            timestamp: row.get("timestamp")?,
        })
    }

    fn row_to_transaction(row: &Row) -> rusqlite::Result<WalletTransaction> {
        Ok(WalletTransaction {
            hash: row.get("hash")?,
            received_at: row.get("received_at")?,
            lock_time: row.get::<_, i64>("lock_time")? as u32,
            fees: row.get("fees")?,
            block_hash: row.get("block_hash")?,
        })
    }

    fn row_to_input(row: &Row) -> rusqlite::Result<TransactionInput> {
        let coinbase: bool = row.get("coinbase")?;
        let source = if coinbase {
            InputSource::Coinbase {
                script_signature: row.get("script_signature")?,
            }
        } else {
            InputSource::Outpoint {
                uid: row.get("uid")?,
                output_hash: row.get("output_hash")?,
                output_index: row.get::<_, i64>("output_index")? as u32,
                value: row.get("value")?,
                script_signature: row.get("script_signature")?,
                address: row.get("address")?,
            }
        };
        Ok(TransactionInput {
            transaction_hash: row.get("transaction_hash")?,
            input_index: row.get::<_, i64>("input_index")? as u32,
            source,
        })
    }

    fn row_to_output(row: &Row) -> rusqlite::Result<TransactionOutput> {
        Ok(TransactionOutput {
            transaction_hash: row.get("transaction_hash")?,
            output_index: row.get::<_, i64>("output_index")? as u32,
            value: row.get("value")?,
            script_hex: row.get("script_hex")?,
            address: row.get("address")?,
        })
    }

    fn row_to_spendable_output(row: &Row) -> rusqlite::Result<SpendableOutput> {
        let address: String = row.get("address")?;
        let path = DerivationPath::new(
            row.get::<_, i64>("account_index")? as u32,
            row.get::<_, i64>("chain_index")? as u32,
            row.get::<_, i64>("key_index")? as u32,
        );
        Ok(SpendableOutput {
            output: TransactionOutput {
                transaction_hash: row.get("transaction_hash")?,
                output_index: row.get::<_, i64>("output_index")? as u32,
                value: row.get("value")?,
                script_hex: row.get("script_hex")?,
                address: Some(address.clone()),
            },
            address: Address::new(address, path),
            block_height: row.get::<_, Option<i64>>("block_height")?.map(|h| h as u64),
        })
    }

    fn row_to_operation(row: &Row) -> rusqlite::Result<Operation> {
        let kind_text: String = row.get("kind")?;
        let kind: OperationKind = kind_text
            .parse()
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(Operation {
            uid: row.get("uid")?,
            amount: row.get("amount")?,
            kind,
            transaction_hash: row.get("transaction_hash")?,
            account_index: row.get::<_, i64>("account_index")? as u32,
        })
    }

    fn row_to_account_operation_row(row: &Row) -> rusqlite::Result<AccountOperationRow> {
        let kind_text: String = row.get("op_kind")?;
        let kind: OperationKind = kind_text
            .parse()
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let block = match row.get::<_, Option<String>>("blk_hash")? {
            Some(hash) => Some(Block {
                hash,
                height: row.get::<_, i64>("blk_height")? as u64,
                timestamp: row.get("blk_timestamp")?,
            }),
            None => None,
        };
        Ok(AccountOperationRow {
            account: Account {
                account_index: row.get::<_, i64>("acc_account_index")? as u32,
                name: row.get("acc_name")?,
                extended_public_key: row.get("acc_extended_public_key")?,
                next_external_index: row.get::<_, i64>("acc_next_external_index")? as u32,
                next_internal_index: row.get::<_, i64>("acc_next_internal_index")? as u32,
                balance: row.get("acc_balance")?,
                hidden: row.get("acc_hidden")?,
            },
            operation: Operation {
                uid: row.get("op_uid")?,
                amount: row.get("op_amount")?,
                kind,
                transaction_hash: row.get("op_transaction_hash")?,
                account_index: row.get::<_, i64>("op_account_index")? as u32,
            },
            transaction: WalletTransaction {
                hash: row.get("tx_hash")?,
                received_at: row.get("tx_received_at")?,
                lock_time: row.get::<_, i64>("tx_lock_time")? as u32,
                fees: row.get("tx_fees")?,
                block_hash: row.get("tx_block_hash")?,
            },
            block,
        })
    }

    // === Statement helpers shared by the upsert paths ===

    fn insert_block_if_absent(conn: &rusqlite::Connection, block: &Block) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare("SELECT 1 FROM blocks WHERE hash = ?1 LIMIT 1")?;
        if stmt.exists(params![block.hash])? {
            return Ok(());
        }
        conn.execute(
            "INSERT INTO blocks (hash, height, timestamp) VALUES (?1, ?2, ?3)",
            params![block.hash, block.height as i64, block.timestamp],
        )?;
        Ok(())
    }

    fn insert_transaction_input(
        conn: &rusqlite::Connection,
        input: &TransactionInput,
    ) -> rusqlite::Result<()> {
        let sql = "INSERT INTO transaction_inputs \
                   (uid, output_hash, output_index, value, script_signature, address, coinbase, input_index, transaction_hash) \
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
        match &input.source {
            InputSource::Outpoint {
                uid,
                output_hash,
                output_index,
                value,
                script_signature,
                address,
            } => conn.execute(
                sql,
                params![
                    uid,
                    output_hash,
                    *output_index as i64,
                    value,
                    script_signature,
                    address,
                    false,
                    input.input_index as i64,
                    input.transaction_hash,
                ],
            )?,
            InputSource::Coinbase { script_signature } => conn.execute(
                sql,
                params![
                    None::<String>,
                    None::<String>,
                    None::<i64>,
                    None::<i64>,
                    script_signature,
                    None::<String>,
                    true,
                    input.input_index as i64,
                    input.transaction_hash,
                ],
            )?,
        };
        Ok(())
    }

    fn insert_transaction_output(
        conn: &rusqlite::Connection,
        output: &TransactionOutput,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO transaction_outputs \
             (script_hex, value, address, output_index, transaction_hash) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                output.script_hex,
                output.value,
                output.address,
                output.output_index as i64,
                output.transaction_hash,
            ],
        )?;
        Ok(())
    }

    // === Private single-item operations ===

    async fn read_metadata_value(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.connection
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM metadata WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(|e| storage_error("Failed to read metadata value", e))
    }

    async fn insert_address(&self, address: &Address) -> StoreResult<()> {
        let address_string = address.address.clone();
        let relative_path = address.path.to_string();
        let exists = self
            .connection
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT 1 FROM addresses WHERE address = ?1 OR relative_path = ?2 LIMIT 1",
                )?;
                Ok(stmt.exists(params![address_string, relative_path])?)
            })
            .await
            .map_err(|e| storage_error("Failed to check address existence", e))?;
        if exists {
            return Ok(());
        }

        if !address.path.conforms_to_bip32() {
            tracing::error!(
                address = %address.address,
                path = %address.path,
                "rejecting address whose derivation path is not BIP32 conformant"
            );
            return Err(StoreError::ConstraintViolation(format!(
                "derivation path {} of address {} is not BIP32 conformant",
                address.path, address.address
            )));
        }

        let address = address.clone();
        self.connection
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO addresses \
                     (address, account_index, chain_index, key_index, relative_path) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        address.address,
                        address.path.account_index as i64,
                        address.path.chain_index as i64,
                        address.path.key_index as i64,
                        address.path.to_string(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| storage_error("Failed to insert address", e))
    }

    async fn insert_block(&self, block: &Block) -> StoreResult<()> {
        let block = block.clone();
        let hash = block.hash.clone();
        self.connection
            .call(move |conn| {
                Self::insert_block_if_absent(conn, &block)?;
                Ok(())
            })
            .await
            .map_err(|e| storage_error(&format!("Failed to insert block {hash}"), e))
    }

    async fn save_transaction(&self, bundle: &TransactionBundle) -> StoreResult<()> {
        let bundle = bundle.clone();
        let hash = bundle.transaction.hash.clone();
        self.connection
            .call(move |conn| {
                let tx = conn.transaction()?;
                if let Some(block) = &bundle.block {
                    Self::insert_block_if_absent(&tx, block)?;
                }
                let block_hash = bundle.block.as_ref().map(|block| block.hash.clone());
                let updated = tx.execute(
                    "UPDATE transactions SET block_hash = ?1 WHERE hash = ?2",
                    params![block_hash, bundle.transaction.hash],
                )?;
                if updated == 0 {
                    tx.execute(
                        "INSERT INTO transactions \
                         (hash, received_at, lock_time, fees, block_hash) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            bundle.transaction.hash,
                            bundle.transaction.received_at,
                            bundle.transaction.lock_time as i64,
                            bundle.transaction.fees,
                            block_hash,
                        ],
                    )?;
                    for input in &bundle.inputs {
                        Self::insert_transaction_input(&tx, input)?;
                    }
                    for output in &bundle.outputs {
                        Self::insert_transaction_output(&tx, output)?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| storage_error(&format!("Failed to save transaction {hash}"), e))
    }

    async fn save_block(&self, bundle: &BlockBundle) -> StoreResult<()> {
        let bundle = bundle.clone();
        let hash = bundle.block.hash.clone();
        self.connection
            .call(move |conn| {
                let tx = conn.transaction()?;
                Self::insert_block_if_absent(&tx, &bundle.block)?;
                if !bundle.transaction_hashes.is_empty() {
                    let sql = format!(
                        "UPDATE transactions SET block_hash = ? WHERE hash IN ({})",
                        placeholders(bundle.transaction_hashes.len())
                    );
                    let values = std::iter::once(bundle.block.hash.clone())
                        .chain(bundle.transaction_hashes.iter().cloned());
                    tx.execute(&sql, params_from_iter(values))?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| storage_error(&format!("Failed to store block {hash}"), e))
    }

    async fn record_conflict(&self, conflict: &DoubleSpendConflict) -> StoreResult<()> {
        let conflict = conflict.clone();
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT 1 FROM double_spend_conflicts \
                     WHERE left_transaction_hash = ?1 AND right_transaction_hash = ?2 LIMIT 1",
                )?;
                if stmt.exists(params![
                    conflict.left_transaction_hash,
                    conflict.right_transaction_hash
                ])? {
                    return Ok(());
                }
                conn.execute(
                    "INSERT INTO double_spend_conflicts \
                     (left_transaction_hash, right_transaction_hash) VALUES (?1, ?2)",
                    params![
                        conflict.left_transaction_hash,
                        conflict.right_transaction_hash
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| storage_error("Failed to record double spend conflict", e))
    }

    async fn save_operation(&self, operation: &Operation) -> StoreResult<()> {
        let operation = operation.clone();
        let uid = operation.uid.clone();
        self.connection
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE operations SET amount = ?1 WHERE uid = ?2",
                    params![operation.amount, operation.uid],
                )?;
                if updated == 0 {
                    conn.execute(
                        "INSERT INTO operations \
                         (uid, amount, kind, transaction_hash, account_index) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            operation.uid,
                            operation.amount,
                            operation.kind.as_str(),
                            operation.transaction_hash,
                            operation.account_index as i64,
                        ],
                    )?;
                }
                Ok(())
            })
            .await
            .map_err(|e| storage_error(&format!("Failed to save operation {uid}"), e))
    }

    // === Balance subqueries ===

    async fn total_received(&self, account_index: u32) -> StoreResult<i64> {
        self.connection
            .call(move |conn| {
                let total = conn.query_row(
                    "SELECT IFNULL(SUM(o.value), 0) FROM transaction_outputs o \
                     INNER JOIN addresses a ON a.address = o.address \
                     WHERE a.account_index = ?1 AND o.transaction_hash NOT IN \
                     (SELECT DISTINCT right_transaction_hash FROM double_spend_conflicts)",
                    params![account_index as i64],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(|e| {
                storage_error(
                    &format!("Failed to compute total received amount of account {account_index}"),
                    e,
                )
            })
    }

    async fn total_sent(&self, account_index: u32) -> StoreResult<i64> {
        self.connection
            .call(move |conn| {
                let total = conn.query_row(
                    "SELECT IFNULL(SUM(i.value), 0) FROM transaction_inputs i \
                     INNER JOIN addresses a ON a.address = i.address \
                     WHERE a.account_index = ?1 AND i.transaction_hash NOT IN \
                     (SELECT DISTINCT right_transaction_hash FROM double_spend_conflicts)",
                    params![account_index as i64],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(|e| {
                storage_error(
                    &format!("Failed to compute total sent amount of account {account_index}"),
                    e,
                )
            })
    }

    async fn set_balance(&self, account_index: u32, balance: i64) -> StoreResult<()> {
        self.connection
            .call(move |conn| {
                conn.execute(
                    "UPDATE accounts SET balance = ?1 WHERE account_index = ?2",
                    params![balance, account_index as i64],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                storage_error(&format!("Failed to set balance of account {account_index}"), e)
            })
    }
}

#[async_trait]
impl WalletStore for SqliteStore {
    async fn initialize(&self) -> StoreResult<()> {
        self.connection
            .call(|conn| Ok(conn.execute_batch(CREATE_SCHEMA_SQL)?))
            .await
            .map_err(|e| storage_error("Failed to create schema", e))?;

        if self.read_metadata_value(SCHEMA_VERSION_KEY).await?.is_none() {
            let mut pairs = HashMap::new();
            pairs.insert(
                SCHEMA_VERSION_KEY.to_string(),
                SCHEMA_VERSION.to_string(),
            );
            self.update_metadata(&pairs).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        // The connection worker shuts down when the last handle drops
        Ok(())
    }

    // === Schema & metadata ===

    async fn schema_version(&self) -> StoreResult<u32> {
        let value = self
            .read_metadata_value(SCHEMA_VERSION_KEY)
            .await?
            .ok_or_else(|| {
                tracing::warn!("schema version requested but the metadata row is absent");
                StoreError::NotFound("schema version metadata row is absent".to_string())
            })?;
        match value.parse::<i64>() {
            Ok(version) if version > 0 => Ok(version as u32),
            _ => {
                tracing::error!(value = %value, "stored schema version is not a positive integer");
                Err(StoreError::NotFound(format!(
                    "stored schema version {value:?} is not a positive integer"
                )))
            }
        }
    }

    async fn update_metadata(&self, pairs: &HashMap<String, String>) -> StoreResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        for (key, value) in pairs {
            let key = key.clone();
            let value = value.clone();
            self.connection
                .call(move |conn| {
                    let updated = conn.execute(
                        "UPDATE metadata SET value = ?1 WHERE key = ?2",
                        params![value, key],
                    )?;
                    if updated == 0 {
                        conn.execute(
                            "INSERT INTO metadata (key, value) VALUES (?1, ?2)",
                            params![key, value],
                        )?;
                    }
                    Ok(())
                })
                .await
                .map_err(|e| storage_error("Failed to update metadata", e))?;
        }
        Ok(())
    }

    // === Accounts ===

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.connection
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT account_index, name, extended_public_key, next_external_index, \
                     next_internal_index, balance, hidden \
                     FROM accounts ORDER BY account_index ASC",
                )?;
                let rows = stmt.query_map([], Self::row_to_account)?;
                let mut accounts = Vec::new();
                for row in rows {
                    accounts.push(row?);
                }
                Ok(accounts)
            })
            .await
            .map_err(|e| storage_error("Failed to list accounts", e))
    }

    async fn get_account_by_index(&self, account_index: u32) -> StoreResult<Option<Account>> {
        self.connection
            .call(move |conn| {
                let account = conn
                    .query_row(
                        "SELECT account_index, name, extended_public_key, next_external_index, \
                         next_internal_index, balance, hidden \
                         FROM accounts WHERE account_index = ?1",
                        params![account_index as i64],
                        Self::row_to_account,
                    )
                    .optional()?;
                Ok(account)
            })
            .await
            .map_err(|e| {
                storage_error(&format!("Failed to get account at index {account_index}"), e)
            })
    }

    async fn get_accounts_by_indexes(&self, indexes: &[u32]) -> StoreResult<Vec<Account>> {
        if indexes.is_empty() {
            return Ok(Vec::new());
        }
        let indexes: Vec<i64> = indexes.iter().map(|index| *index as i64).collect();
        self.connection
            .call(move |conn| {
                let sql = format!(
                    "SELECT account_index, name, extended_public_key, next_external_index, \
                     next_internal_index, balance, hidden \
                     FROM accounts WHERE account_index IN ({}) ORDER BY account_index ASC",
                    placeholders(indexes.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(indexes.iter()), Self::row_to_account)?;
                let mut accounts = Vec::new();
                for row in rows {
                    accounts.push(row?);
                }
                Ok(accounts)
            })
            .await
            .map_err(|e| storage_error("Failed to get accounts at indexes", e))
    }

    async fn list_visible_accounts(
        &self,
        offset: usize,
        limit: usize,
        order: FetchOrder,
    ) -> StoreResult<Vec<Account>> {
        self.connection
            .call(move |conn| {
                let sql = format!(
                    "SELECT account_index, name, extended_public_key, next_external_index, \
                     next_internal_index, balance, hidden \
                     FROM accounts \
                     WHERE (next_external_index > 0 OR next_internal_index > 0) AND hidden = 0 \
                     ORDER BY account_index {} LIMIT ?1, ?2",
                    order.sql_keyword()
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![offset as i64, limit as i64],
                    Self::row_to_account,
                )?;
                let mut accounts = Vec::new();
                for row in rows {
                    accounts.push(row?);
                }
                Ok(accounts)
            })
            .await
            .map_err(|e| storage_error("Failed to list visible accounts", e))
    }

    async fn count_visible_accounts(&self) -> StoreResult<usize> {
        self.connection
            .call(|conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM accounts \
                     WHERE (next_external_index > 0 OR next_internal_index > 0) AND hidden = 0",
                    [],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .map(|count| count as usize)
            .map_err(|e| storage_error("Failed to count visible accounts", e))
    }

    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let account = account.clone();
        let account_index = account.account_index;
        self.connection
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO accounts \
                     (account_index, name, extended_public_key, next_external_index, \
                     next_internal_index, balance, hidden) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        account.account_index as i64,
                        account.name,
                        account.extended_public_key,
                        account.next_external_index as i64,
                        account.next_internal_index as i64,
                        account.balance,
                        account.hidden,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(err, message))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    tracing::error!(
                        account_index,
                        "unable to insert account: {}",
                        message.as_deref().unwrap_or("constraint violation")
                    );
                    StoreError::ConstraintViolation(format!(
                        "account {account_index} violates a constraint: {}",
                        message.unwrap_or_default()
                    ))
                }
                other => storage_error(&format!("Failed to insert account {account_index}"), other),
            })
    }

    async fn get_extended_public_key(&self, account_index: u32) -> StoreResult<String> {
        let account = self
            .get_account_by_index(account_index)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("account {account_index} does not exist"))
            })?;
        Ok(account.extended_public_key)
    }

    async fn set_next_index(
        &self,
        account_index: u32,
        external: bool,
        new_index: u32,
    ) -> StoreResult<()> {
        let account = self
            .get_account_by_index(account_index)
            .await?
            .ok_or_else(|| {
                tracing::error!(account_index, "unable to set next index: account missing");
                StoreError::NotFound(format!("account {account_index} does not exist"))
            })?;
        let current = if external {
            account.next_external_index
        } else {
            account.next_internal_index
        };
        if new_index <= current {
            return Ok(());
        }

        let column = if external {
            "next_external_index"
        } else {
            "next_internal_index"
        };
        let sql = format!("UPDATE accounts SET {column} = ?1 WHERE account_index = ?2");
        self.connection
            .call(move |conn| {
                conn.execute(&sql, params![new_index as i64, account_index as i64])?;
                Ok(())
            })
            .await
            .map_err(|e| {
                storage_error(
                    &format!("Failed to set {column} of account {account_index}"),
                    e,
                )
            })
    }

    async fn recompute_balances(&self, account_indexes: &[u32]) -> StoreResult<()> {
        for &account_index in account_indexes {
            let received = self.total_received(account_index).await?;
            let sent = self.total_sent(account_index).await?;
            self.set_balance(account_index, received - sent).await?;
        }
        Ok(())
    }

    // === Addresses ===

    async fn insert_addresses(&self, addresses: &[Address]) -> StoreResult<()> {
        for address in addresses {
            self.insert_address(address).await?;
        }
        Ok(())
    }

    async fn get_addresses_by_paths(
        &self,
        paths: &[DerivationPath],
    ) -> StoreResult<Vec<Address>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let paths: Vec<String> = paths.iter().map(|path| path.to_string()).collect();
        self.connection
            .call(move |conn| {
                let sql = format!(
                    "SELECT address, account_index, chain_index, key_index \
                     FROM addresses WHERE relative_path IN ({})",
                    placeholders(paths.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(paths.iter()), Self::row_to_address)?;
                let mut addresses = Vec::new();
                for row in rows {
                    addresses.push(row?);
                }
                Ok(addresses)
            })
            .await
            .map_err(|e| storage_error("Failed to get addresses at paths", e))
    }

    async fn get_addresses_by_strings(&self, addresses: &[String]) -> StoreResult<Vec<Address>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let addresses = addresses.to_vec();
        self.connection
            .call(move |conn| {
                let sql = format!(
                    "SELECT address, account_index, chain_index, key_index \
                     FROM addresses WHERE address IN ({})",
                    placeholders(addresses.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows =
                    stmt.query_map(params_from_iter(addresses.iter()), Self::row_to_address)?;
                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(|e| storage_error("Failed to get addresses by strings", e))
    }

    async fn get_current_address(
        &self,
        account_index: u32,
        external: bool,
    ) -> StoreResult<Address> {
        let account = self
            .get_account_by_index(account_index)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("account {account_index} does not exist"))
            })?;
        let path = if external {
            DerivationPath::external(account_index, account.next_external_index)
        } else {
            DerivationPath::internal(account_index, account.next_internal_index)
        };
        let mut addresses = self.get_addresses_by_paths(&[path]).await?;
        addresses.pop().ok_or_else(|| {
            StoreError::NotFound(format!("no address stored at path {path} yet"))
        })
    }

    // === Blocks ===

    async fn insert_blocks(&self, blocks: &[Block]) -> StoreResult<()> {
        for block in blocks {
            self.insert_block(block).await?;
        }
        Ok(())
    }

    async fn get_block_by_hash(&self, hash: &str) -> StoreResult<Option<Block>> {
        let hash = hash.to_string();
        self.connection
            .call(move |conn| {
                let block = conn
                    .query_row(
                        "SELECT hash, height, timestamp FROM blocks WHERE hash = ?1",
                        params![hash],
                        Self::row_to_block,
                    )
                    .optional()?;
                Ok(block)
            })
            .await
            .map_err(|e| storage_error("Failed to get block by hash", e))
    }

    // === Transactions ===

    async fn save_transactions(&self, bundles: &[TransactionBundle]) -> StoreResult<()> {
        for bundle in bundles {
            self.save_transaction(bundle).await?;
        }
        Ok(())
    }

    async fn save_blocks(&self, bundles: &[BlockBundle]) -> StoreResult<()> {
        for bundle in bundles {
            self.save_block(bundle).await?;
        }
        Ok(())
    }

    async fn get_transactions_double_spending(
        &self,
        bundle: &TransactionBundle,
    ) -> StoreResult<Vec<WalletTransaction>> {
        let uids: Vec<String> = bundle
            .regular_inputs()
            .filter_map(|input| input.spent_output_uid().map(str::to_string))
            .collect();
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let own_hash = bundle.transaction.hash.clone();
        self.connection
            .call(move |conn| {
                let sql = format!(
                    "SELECT DISTINCT t.hash AS hash, t.received_at AS received_at, \
                     t.lock_time AS lock_time, t.fees AS fees, t.block_hash AS block_hash \
                     FROM transaction_inputs i \
                     INNER JOIN transactions t ON t.hash = i.transaction_hash \
                     WHERE i.uid IN ({}) AND t.hash <> ?",
                    placeholders(uids.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let values = uids.iter().cloned().chain(std::iter::once(own_hash));
                let rows = stmt.query_map(params_from_iter(values), Self::row_to_transaction)?;
                let mut transactions = Vec::new();
                for row in rows {
                    transactions.push(row?);
                }
                Ok(transactions)
            })
            .await
            .map_err(|e| storage_error("Failed to find double spending transactions", e))
    }

    async fn get_transactions_to_reevaluate(
        &self,
        transaction: &WalletTransaction,
    ) -> StoreResult<Vec<WalletTransaction>> {
        let hash = transaction.hash.clone();
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT t.hash AS hash, t.received_at AS received_at, \
                     t.lock_time AS lock_time, t.fees AS fees, t.block_hash AS block_hash \
                     FROM double_spend_conflicts c \
                     INNER JOIN transactions t ON t.hash = c.right_transaction_hash \
                     WHERE c.left_transaction_hash = ?1",
                )?;
                let rows = stmt.query_map(params![hash], Self::row_to_transaction)?;
                let mut transactions = Vec::new();
                for row in rows {
                    transactions.push(row?);
                }
                Ok(transactions)
            })
            .await
            .map_err(|e| storage_error("Failed to fetch conflicting transactions", e))
    }

    async fn remove_transactions(&self, transactions: &[WalletTransaction]) -> StoreResult<()> {
        if transactions.is_empty() {
            return Ok(());
        }
        let hashes: Vec<String> = transactions.iter().map(|tx| tx.hash.clone()).collect();
        self.connection
            .call(move |conn| {
                let sql = format!(
                    "DELETE FROM transactions WHERE hash IN ({})",
                    placeholders(hashes.len())
                );
                conn.execute(&sql, params_from_iter(hashes.iter()))?;
                Ok(())
            })
            .await
            .map_err(|e| storage_error("Failed to remove transactions", e))
    }

    async fn count_transactions_with_hashes(&self, hashes: &[String]) -> StoreResult<usize> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let hashes = hashes.to_vec();
        self.connection
            .call(move |conn| {
                let sql = format!(
                    "SELECT COUNT(*) FROM transactions WHERE hash IN ({})",
                    placeholders(hashes.len())
                );
                let count: i64 =
                    conn.query_row(&sql, params_from_iter(hashes.iter()), |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map(|count| count as usize)
            .map_err(|e| storage_error("Failed to count transactions with hashes", e))
    }

    async fn get_transaction_inputs(
        &self,
        transaction_hash: &str,
    ) -> StoreResult<Vec<TransactionInput>> {
        let hash = transaction_hash.to_string();
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT uid, output_hash, output_index, value, script_signature, address, \
                     coinbase, input_index, transaction_hash \
                     FROM transaction_inputs WHERE transaction_hash = ?1 \
                     ORDER BY input_index ASC",
                )?;
                let rows = stmt.query_map(params![hash], Self::row_to_input)?;
                let mut inputs = Vec::new();
                for row in rows {
                    inputs.push(row?);
                }
                Ok(inputs)
            })
            .await
            .map_err(|e| storage_error("Failed to fetch transaction inputs", e))
    }

    async fn get_transaction_outputs(
        &self,
        transaction_hash: &str,
    ) -> StoreResult<Vec<TransactionOutput>> {
        let hash = transaction_hash.to_string();
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT script_hex, value, address, output_index, transaction_hash \
                     FROM transaction_outputs WHERE transaction_hash = ?1 \
                     ORDER BY output_index ASC",
                )?;
                let rows = stmt.query_map(params![hash], Self::row_to_output)?;
                let mut outputs = Vec::new();
                for row in rows {
                    outputs.push(row?);
                }
                Ok(outputs)
            })
            .await
            .map_err(|e| storage_error("Failed to fetch transaction outputs", e))
    }

    async fn get_unspent_outputs(
        &self,
        account_index: u32,
    ) -> StoreResult<Vec<SpendableOutput>> {
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT o.script_hex AS script_hex, o.value AS value, o.address AS address, \
                     o.output_index AS output_index, o.transaction_hash AS transaction_hash, \
                     a.account_index AS account_index, a.chain_index AS chain_index, \
                     a.key_index AS key_index, b.height AS block_height \
                     FROM transaction_outputs o \
                     LEFT JOIN transaction_inputs i \
                     ON i.output_hash = o.transaction_hash AND i.output_index = o.output_index \
                     INNER JOIN addresses a ON a.address = o.address \
                     INNER JOIN transactions t ON t.hash = o.transaction_hash \
                     LEFT JOIN blocks b ON b.hash = t.block_hash \
                     LEFT JOIN double_spend_conflicts c \
                     ON c.right_transaction_hash = o.transaction_hash \
                     WHERE a.account_index = ?1 \
                     AND i.uid IS NULL \
                     AND c.right_transaction_hash IS NULL \
                     ORDER BY (CASE WHEN b.height IS NULL THEN 0 ELSE 1 END) DESC, \
                     b.height ASC",
                )?;
                let rows = stmt.query_map(
                    params![account_index as i64],
                    Self::row_to_spendable_output,
                )?;
                let mut outputs = Vec::new();
                for row in rows {
                    outputs.push(row?);
                }
                Ok(outputs)
            })
            .await
            .map_err(|e| {
                storage_error(
                    &format!("Failed to fetch unspent outputs of account {account_index}"),
                    e,
                )
            })
    }

    // === Double-spend conflicts ===

    async fn record_conflicts(&self, conflicts: &[DoubleSpendConflict]) -> StoreResult<()> {
        for conflict in conflicts {
            self.record_conflict(conflict).await?;
        }
        Ok(())
    }

    // === Operations ===

    async fn save_operations(&self, operations: &[Operation]) -> StoreResult<()> {
        for operation in operations {
            self.save_operation(operation).await?;
        }
        Ok(())
    }

    async fn list_account_operations(
        &self,
        account_index: Option<u32>,
        offset: usize,
        limit: usize,
        order: FetchOrder,
    ) -> StoreResult<Vec<AccountOperation>> {
        let partial_rows = self
            .connection
            .call(move |conn| {
                let where_clause = if account_index.is_some() {
                    "WHERE op.account_index = ? "
                } else {
                    ""
                };
                let sql = format!(
                    "SELECT acc.account_index AS acc_account_index, acc.name AS acc_name, \
                     acc.extended_public_key AS acc_extended_public_key, \
                     acc.next_external_index AS acc_next_external_index, \
                     acc.next_internal_index AS acc_next_internal_index, \
                     acc.balance AS acc_balance, acc.hidden AS acc_hidden, \
                     op.uid AS op_uid, op.amount AS op_amount, op.kind AS op_kind, \
                     op.transaction_hash AS op_transaction_hash, \
                     op.account_index AS op_account_index, \
                     t.hash AS tx_hash, t.received_at AS tx_received_at, \
                     t.lock_time AS tx_lock_time, t.fees AS tx_fees, \
                     t.block_hash AS tx_block_hash, \
                     b.hash AS blk_hash, b.height AS blk_height, b.timestamp AS blk_timestamp \
                     FROM operations op \
                     INNER JOIN transactions t ON t.hash = op.transaction_hash \
                     LEFT JOIN blocks b ON b.hash = t.block_hash \
                     INNER JOIN accounts acc ON acc.account_index = op.account_index \
                     {}ORDER BY t.received_at {} LIMIT ?, ?",
                    where_clause,
                    order.sql_keyword()
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = match account_index {
                    Some(index) => stmt.query_map(
                        params![index as i64, offset as i64, limit as i64],
                        Self::row_to_account_operation_row,
                    )?,
                    None => stmt.query_map(
                        params![offset as i64, limit as i64],
                        Self::row_to_account_operation_row,
                    )?,
                };
                let mut partial_rows = Vec::new();
                for row in rows {
                    partial_rows.push(row?);
                }
                Ok(partial_rows)
            })
            .await
            .map_err(|e| storage_error("Failed to list account operations", e))?;

        let mut results = Vec::with_capacity(partial_rows.len());
        for row in partial_rows {
            let inputs = self.get_transaction_inputs(&row.transaction.hash).await?;
            let outputs = self.get_transaction_outputs(&row.transaction.hash).await?;
            if inputs.is_empty() && outputs.is_empty() {
                tracing::error!(
                    transaction = %row.transaction.hash,
                    "transaction referenced by an operation has neither inputs nor outputs"
                );
                return Err(StoreError::IntegrityError(format!(
                    "transaction {} referenced by operation {} has neither inputs nor outputs",
                    row.transaction.hash, row.operation.uid
                )));
            }
            results.push(AccountOperation {
                account: row.account,
                operation: row.operation,
                transaction: TransactionBundle {
                    transaction: row.transaction,
                    inputs,
                    outputs,
                    block: row.block,
                },
            });
        }
        Ok(results)
    }

    async fn count_account_operations(&self, account_index: Option<u32>) -> StoreResult<usize> {
        self.connection
            .call(move |conn| {
                let count: i64 = match account_index {
                    Some(index) => conn.query_row(
                        "SELECT COUNT(*) FROM operations WHERE account_index = ?1",
                        params![index as i64],
                        |row| row.get(0),
                    )?,
                    None => {
                        conn.query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?
                    }
                };
                Ok(count)
            })
            .await
            .map(|count| count as usize)
            .map_err(|e| storage_error("Failed to count account operations", e))
    }
}
