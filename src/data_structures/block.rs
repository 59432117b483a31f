use serde::{Deserialize, Serialize};

/// An observed block header anchoring transaction confirmations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block hash; unique across the store
    pub hash: String,
    /// Height in the confirmed chain
    pub height: u64,
    /// Block timestamp as a Unix epoch in seconds
    pub timestamp: i64,
}

impl Block {
    pub fn new(hash: impl Into<String>, height: u64, timestamp: i64) -> Self {
        Self {
            hash: hash.into(),
            height,
            timestamp,
        }
    }
}
