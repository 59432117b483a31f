use std::fmt;
use std::str::FromStr;

use blake2::{Blake2b, Digest};
use digest::consts::U32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a ledger operation from the account's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Send,
    Receive,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Send => "send",
            OperationKind::Receive => "receive",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored operation kind string is not recognized
#[derive(Debug, Error)]
#[error("unknown operation kind: {0}")]
pub struct UnknownOperationKind(pub String);

impl FromStr for OperationKind {
    type Err = UnknownOperationKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "send" => Ok(OperationKind::Send),
            "receive" => Ok(OperationKind::Receive),
            other => Err(UnknownOperationKind(other.to_string())),
        }
    }
}

/// A user-facing ledger line tying a transaction to an account
///
/// Operations are computed by the sync engine from a transaction's inputs
/// and outputs; re-saving an operation updates its amount in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Stable identifier derived from transaction, account and kind
    pub uid: String,
    /// Signed amount in base units; the sign encodes the direction
    pub amount: i64,
    pub kind: OperationKind,
    /// Hash of the transaction this operation summarizes
    pub transaction_hash: String,
    /// Index of the account this operation belongs to
    pub account_index: u32,
}

impl Operation {
    /// Build an operation, deriving its UID from the identifying triple
    pub fn new(
        transaction_hash: impl Into<String>,
        account_index: u32,
        kind: OperationKind,
        amount: i64,
    ) -> Self {
        let transaction_hash = transaction_hash.into();
        let uid = Self::uid_for(&transaction_hash, account_index, kind);
        Self {
            uid,
            amount,
            kind,
            transaction_hash,
            account_index,
        }
    }

    /// Stable operation identifier: Blake2b-256 over the identifying triple
    pub fn uid_for(transaction_hash: &str, account_index: u32, kind: OperationKind) -> String {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(transaction_hash.as_bytes());
        hasher.update(b":");
        hasher.update(account_index.to_le_bytes());
        hasher.update(b":");
        hasher.update(kind.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_text() {
        assert_eq!("send".parse::<OperationKind>().unwrap(), OperationKind::Send);
        assert_eq!(
            "receive".parse::<OperationKind>().unwrap(),
            OperationKind::Receive
        );
        assert!("mint".parse::<OperationKind>().is_err());
    }

    #[test]
    fn uid_is_stable_and_direction_sensitive() {
        let send = Operation::uid_for("abcd", 0, OperationKind::Send);
        assert_eq!(send, Operation::uid_for("abcd", 0, OperationKind::Send));
        assert_ne!(send, Operation::uid_for("abcd", 0, OperationKind::Receive));
        assert_ne!(send, Operation::uid_for("abcd", 1, OperationKind::Send));
        assert_ne!(send, Operation::uid_for("abce", 0, OperationKind::Send));
    }
}
