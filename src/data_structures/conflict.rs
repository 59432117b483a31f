use serde::{Deserialize, Serialize};

/// A recorded double-spend relationship between two transactions
///
/// The edge is directed: the left transaction is the winner whose outputs
/// remain spendable, the right transaction is excluded from balances and
/// UTXO selection store-wide, independent of confirmation state. Deciding
/// which side wins is the caller's policy; once recorded an edge is never
/// removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleSpendConflict {
    /// Hash of the winning transaction
    pub left_transaction_hash: String,
    /// Hash of the losing transaction
    pub right_transaction_hash: String,
}

impl DoubleSpendConflict {
    pub fn new(
        left_transaction_hash: impl Into<String>,
        right_transaction_hash: impl Into<String>,
    ) -> Self {
        Self {
            left_transaction_hash: left_transaction_hash.into(),
            right_transaction_hash: right_transaction_hash.into(),
        }
    }
}
