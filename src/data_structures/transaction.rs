use blake2::{Blake2b, Digest};
use digest::consts::U32;
use serde::{Deserialize, Serialize};

use crate::data_structures::block::Block;

/// A wallet-relevant transaction as observed on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Transaction hash; unique across the store
    pub hash: String,
    /// Unix timestamp of first observation
    pub received_at: i64,
    /// Raw lock time field of the transaction
    pub lock_time: u32,
    /// Fees paid, in base units
    pub fees: i64,
    /// Hash of the confirming block; `None` while in the mempool
    pub block_hash: Option<String>,
}

impl WalletTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.block_hash.is_some()
    }
}

/// Stable identifier of an output as referenced by a spending input:
/// Blake2b-256 over the output's transaction hash and ordinal index
pub fn outpoint_uid(output_hash: &str, output_index: u32) -> String {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(output_hash.as_bytes());
    hasher.update(b":");
    hasher.update(output_index.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Where the coins consumed by an input come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    /// Spend of a previously created output
    Outpoint {
        /// UID of the spent output, see [`outpoint_uid`]
        uid: String,
        /// Hash of the transaction that created the spent output
        output_hash: String,
        /// Ordinal index of the spent output within that transaction
        output_index: u32,
        /// Value of the spent output in base units
        value: i64,
        /// Script signature unlocking the output
        script_signature: String,
        /// Owning address when the spent output belongs to this wallet
        address: Option<String>,
    },
    /// Newly minted coins; carries the raw coinbase script
    Coinbase { script_signature: String },
}

/// One input of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Hash of the owning transaction
    pub transaction_hash: String,
    /// Ordinal position within the transaction
    pub input_index: u32,
    pub source: InputSource,
}

impl TransactionInput {
    /// Build an input spending a previously created output, deriving the
    /// outpoint UID from the referenced output
    pub fn from_outpoint(
        transaction_hash: impl Into<String>,
        input_index: u32,
        output_hash: impl Into<String>,
        output_index: u32,
        value: i64,
        script_signature: impl Into<String>,
        address: Option<String>,
    ) -> Self {
        let output_hash = output_hash.into();
        let uid = outpoint_uid(&output_hash, output_index);
        Self {
            transaction_hash: transaction_hash.into(),
            input_index,
            source: InputSource::Outpoint {
                uid,
                output_hash,
                output_index,
                value,
                script_signature: script_signature.into(),
                address,
            },
        }
    }

    /// Build a coinbase input
    pub fn coinbase(
        transaction_hash: impl Into<String>,
        input_index: u32,
        script_signature: impl Into<String>,
    ) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
            input_index,
            source: InputSource::Coinbase {
                script_signature: script_signature.into(),
            },
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.source, InputSource::Coinbase { .. })
    }

    /// UID of the output this input spends, when it is not a coinbase
    pub fn spent_output_uid(&self) -> Option<&str> {
        match &self.source {
            InputSource::Outpoint { uid, .. } => Some(uid),
            InputSource::Coinbase { .. } => None,
        }
    }
}

/// One output of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Hash of the owning transaction
    pub transaction_hash: String,
    /// Ordinal position within the transaction
    pub output_index: u32,
    /// Value in base units
    pub value: i64,
    /// Locking script as hex
    pub script_hex: String,
    /// Owning address when the output belongs to this wallet
    pub address: Option<String>,
}

/// A transaction together with its inputs, outputs and optional confirming
/// block, as pushed in by the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBundle {
    pub transaction: WalletTransaction,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub block: Option<Block>,
}

impl TransactionBundle {
    /// Inputs that spend a prior output (everything but coinbase)
    pub fn regular_inputs(&self) -> impl Iterator<Item = &TransactionInput> {
        self.inputs.iter().filter(|input| !input.is_coinbase())
    }
}

/// A block together with the hashes of the transactions it confirms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBundle {
    pub block: Block,
    pub transaction_hashes: Vec<String>,
}
