//! Storage trait definition for the wallet ledger store
//!
//! [`WalletStore`] is the contract the synchronization engine and the UI
//! layer program against. Batch operations iterate item by item and stop at
//! the first failure with context; previously applied items stay applied
//! (there is no automatic rollback across a batch). Since every write is
//! idempotent, re-driving a failed batch is the intended recovery path.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data_structures::{
    Account, Address, Block, BlockBundle, DerivationPath, DoubleSpendConflict, Operation,
    TransactionBundle, TransactionInput, TransactionOutput, WalletTransaction,
};
use crate::errors::StoreResult;

/// Direction of an ordered, paginated fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchOrder {
    Ascending,
    Descending,
}

impl FetchOrder {
    /// SQL keyword for an ORDER BY clause
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            FetchOrder::Ascending => "ASC",
            FetchOrder::Descending => "DESC",
        }
    }
}

/// An unspent output joined with its owning address and confirmation height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendableOutput {
    pub output: TransactionOutput,
    pub address: Address,
    /// Height of the confirming block; `None` while unconfirmed
    pub block_height: Option<u64>,
}

impl SpendableOutput {
    pub fn is_confirmed(&self) -> bool {
        self.block_height.is_some()
    }
}

/// An operation joined with its account and fully hydrated transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOperation {
    pub account: Account,
    pub operation: Operation,
    pub transaction: TransactionBundle,
}

/// Persistence contract of the wallet ledger store
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Create tables and indexes, then seed the schema version if absent
    async fn initialize(&self) -> StoreResult<()>;

    /// Close the storage backend gracefully
    async fn close(&self) -> StoreResult<()>;

    // === Schema & metadata ===

    /// Current schema version; `NotFound` when the metadata row is absent or
    /// not a positive integer
    async fn schema_version(&self) -> StoreResult<u32>;

    /// Upsert arbitrary metadata pairs; no-op on empty input
    async fn update_metadata(&self, pairs: &HashMap<String, String>) -> StoreResult<()>;

    // === Accounts ===

    /// All accounts, ordered by account index ascending
    async fn list_accounts(&self) -> StoreResult<Vec<Account>>;

    async fn get_account_by_index(&self, account_index: u32) -> StoreResult<Option<Account>>;

    /// Exact-match batch lookup; empty input returns empty without querying
    async fn get_accounts_by_indexes(&self, indexes: &[u32]) -> StoreResult<Vec<Account>>;

    /// Visible accounts (at least one derived address, not hidden), ordered
    /// by index per `order`, sliced `[offset, offset + limit)`
    async fn list_visible_accounts(
        &self,
        offset: usize,
        limit: usize,
        order: FetchOrder,
    ) -> StoreResult<Vec<Account>>;

    async fn count_visible_accounts(&self) -> StoreResult<usize>;

    /// Single insert; `ConstraintViolation` on a duplicate account index
    async fn insert_account(&self, account: &Account) -> StoreResult<()>;

    /// Extended public key of an account; `NotFound` when it does not exist
    async fn get_extended_public_key(&self, account_index: u32) -> StoreResult<String>;

    /// Monotonic ratchet on the next external/internal key index: no-op
    /// success when `new_index` does not exceed the current value,
    /// `NotFound` when the account does not exist
    async fn set_next_index(
        &self,
        account_index: u32,
        external: bool,
        new_index: u32,
    ) -> StoreResult<()>;

    /// Recompute and persist each account's balance as unconflicted
    /// received minus unconflicted sent; stops at the first failure
    async fn recompute_balances(&self, account_indexes: &[u32]) -> StoreResult<()>;

    // === Addresses ===

    /// Per-address idempotent insert: skip when the address string or path
    /// already exists, reject non-BIP32-conformant paths, stop at the first
    /// failure keeping earlier inserts
    async fn insert_addresses(&self, addresses: &[Address]) -> StoreResult<()>;

    async fn get_addresses_by_paths(&self, paths: &[DerivationPath])
        -> StoreResult<Vec<Address>>;

    async fn get_addresses_by_strings(&self, addresses: &[String]) -> StoreResult<Vec<Address>>;

    /// Address at the account's current receive (external) or change
    /// (internal) position; looked up, never derived on the fly
    async fn get_current_address(
        &self,
        account_index: u32,
        external: bool,
    ) -> StoreResult<Address>;

    // === Blocks ===

    /// Idempotent insert by block hash
    async fn insert_blocks(&self, blocks: &[Block]) -> StoreResult<()>;

    async fn get_block_by_hash(&self, hash: &str) -> StoreResult<Option<Block>>;

    // === Transactions ===

    /// Upsert each bundle atomically: insert the block if new, re-point the
    /// transaction's block reference, and insert the transaction with all
    /// inputs and outputs when it was not known yet
    async fn save_transactions(&self, bundles: &[TransactionBundle]) -> StoreResult<()>;

    /// Insert each block and reassign every listed transaction to it
    /// (bulk confirmation)
    async fn save_blocks(&self, bundles: &[BlockBundle]) -> StoreResult<()>;

    /// Distinct other transactions whose inputs spend an output also spent
    /// by the bundle's non-coinbase inputs
    async fn get_transactions_double_spending(
        &self,
        bundle: &TransactionBundle,
    ) -> StoreResult<Vec<WalletTransaction>>;

    /// Losing counterparts of every conflict won by the given transaction;
    /// their cached balances and UTXO status must be re-evaluated
    async fn get_transactions_to_reevaluate(
        &self,
        transaction: &WalletTransaction,
    ) -> StoreResult<Vec<WalletTransaction>>;

    async fn remove_transactions(&self, transactions: &[WalletTransaction]) -> StoreResult<()>;

    async fn count_transactions_with_hashes(&self, hashes: &[String]) -> StoreResult<usize>;

    /// Inputs of a transaction, ordered by ordinal index ascending
    async fn get_transaction_inputs(
        &self,
        transaction_hash: &str,
    ) -> StoreResult<Vec<TransactionInput>>;

    /// Outputs of a transaction, ordered by ordinal index ascending
    async fn get_transaction_outputs(
        &self,
        transaction_hash: &str,
    ) -> StoreResult<Vec<TransactionOutput>>;

    /// Spendable outputs of an account: owned by its addresses, referenced
    /// by no input, not on the losing side of any conflict; confirmed
    /// before unconfirmed, then oldest block first
    async fn get_unspent_outputs(&self, account_index: u32)
        -> StoreResult<Vec<SpendableOutput>>;

    // === Double-spend conflicts ===

    /// Idempotent edge insert; existing edges are skipped
    async fn record_conflicts(&self, conflicts: &[DoubleSpendConflict]) -> StoreResult<()>;

    // === Operations ===

    /// Upsert by UID: update the amount in place, insert when unknown
    async fn save_operations(&self, operations: &[Operation]) -> StoreResult<()>;

    /// Operations joined with their account, transaction and confirmation
    /// block, ordered by transaction reception time per `order`, sliced
    /// `[offset, offset + limit)`; each result carries the full ordered
    /// input/output lists and the whole call fails if hydration fails
    async fn list_account_operations(
        &self,
        account_index: Option<u32>,
        offset: usize,
        limit: usize,
        order: FetchOrder,
    ) -> StoreResult<Vec<AccountOperation>>;

    async fn count_account_operations(&self, account_index: Option<u32>) -> StoreResult<usize>;
}
