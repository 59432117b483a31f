//! Table layout of the wallet ledger database
//!
//! Uniqueness and the foreign-key-like relationships between tables are
//! enforced at the application level (check-before-insert and
//! update-then-insert); the primary keys below are a backstop, not the
//! mechanism.

/// Version of the persisted schema, seeded into the metadata table on
/// first initialization
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata key holding the schema version
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Idempotent DDL creating every table and index of the ledger
pub(crate) const CREATE_SCHEMA_SQL: &str = r#"
    -- Wallet accounts
    CREATE TABLE IF NOT EXISTS accounts (
        account_index INTEGER PRIMARY KEY,
        name TEXT,
        extended_public_key TEXT NOT NULL,
        next_external_index INTEGER NOT NULL DEFAULT 0,
        next_internal_index INTEGER NOT NULL DEFAULT 0,
        balance INTEGER NOT NULL DEFAULT 0,
        hidden BOOLEAN NOT NULL DEFAULT FALSE
    );

    -- Derived addresses, one row per (account, chain, key) path
    CREATE TABLE IF NOT EXISTS addresses (
        address TEXT PRIMARY KEY,
        account_index INTEGER NOT NULL,
        chain_index INTEGER NOT NULL,
        key_index INTEGER NOT NULL,
        relative_path TEXT NOT NULL UNIQUE
    );

    -- Observed block headers
    CREATE TABLE IF NOT EXISTS blocks (
        hash TEXT PRIMARY KEY,
        height INTEGER NOT NULL,
        timestamp INTEGER NOT NULL
    );

    -- Observed transactions; block_hash is NULL while in the mempool
    CREATE TABLE IF NOT EXISTS transactions (
        hash TEXT PRIMARY KEY,
        received_at INTEGER NOT NULL,
        lock_time INTEGER NOT NULL,
        fees INTEGER NOT NULL,
        block_hash TEXT
    );

    -- Transaction inputs; uid/output columns are NULL for coinbase rows
    CREATE TABLE IF NOT EXISTS transaction_inputs (
        uid TEXT,
        output_hash TEXT,
        output_index INTEGER,
        value INTEGER,
        script_signature TEXT NOT NULL,
        address TEXT,
        coinbase BOOLEAN NOT NULL DEFAULT FALSE,
        input_index INTEGER NOT NULL,
        transaction_hash TEXT NOT NULL
    );

    -- Transaction outputs
    CREATE TABLE IF NOT EXISTS transaction_outputs (
        script_hex TEXT NOT NULL,
        value INTEGER NOT NULL,
        address TEXT,
        output_index INTEGER NOT NULL,
        transaction_hash TEXT NOT NULL
    );

    -- User-facing ledger lines
    CREATE TABLE IF NOT EXISTS operations (
        uid TEXT PRIMARY KEY,
        amount INTEGER NOT NULL,
        kind TEXT NOT NULL,
        transaction_hash TEXT NOT NULL,
        account_index INTEGER NOT NULL
    );

    -- Double-spend edges; left wins, right is excluded everywhere
    CREATE TABLE IF NOT EXISTS double_spend_conflicts (
        left_transaction_hash TEXT NOT NULL,
        right_transaction_hash TEXT NOT NULL,
        PRIMARY KEY (left_transaction_hash, right_transaction_hash)
    );

    -- Arbitrary key/value metadata, including the schema version
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- Indexes for addresses
    CREATE INDEX IF NOT EXISTS idx_addresses_account ON addresses(account_index);

    -- Indexes for transactions
    CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions(block_hash);

    -- Indexes for inputs
    CREATE INDEX IF NOT EXISTS idx_inputs_transaction ON transaction_inputs(transaction_hash);
    CREATE INDEX IF NOT EXISTS idx_inputs_uid ON transaction_inputs(uid);
    CREATE INDEX IF NOT EXISTS idx_inputs_outpoint ON transaction_inputs(output_hash, output_index);
    CREATE INDEX IF NOT EXISTS idx_inputs_address ON transaction_inputs(address);

    -- Indexes for outputs
    CREATE INDEX IF NOT EXISTS idx_outputs_transaction ON transaction_outputs(transaction_hash);
    CREATE INDEX IF NOT EXISTS idx_outputs_address ON transaction_outputs(address);

    -- Indexes for operations
    CREATE INDEX IF NOT EXISTS idx_operations_account ON operations(account_index);
    CREATE INDEX IF NOT EXISTS idx_operations_transaction ON operations(transaction_hash);

    -- Indexes for conflicts
    CREATE INDEX IF NOT EXISTS idx_conflicts_right ON double_spend_conflicts(right_transaction_hash);
"#;
