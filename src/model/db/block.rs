use serde::{Deserialize, Serialize};

use crate::model::common::ledger::{LedgerId, TERMINUS_MARKER};

/// One block of an election ledger, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The ledger this block belongs to.
    pub ledger_id: LedgerId,
    /// Position in the ledger, starting at 0 for the genesis block.
    pub sequence: u64,
    /// The election public key (genesis), an encrypted ballot, or the terminus marker.
    /// Base64url encoded apart from the marker.
    pub content: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    /// Signature binding this block's content, timestamp and predecessor.
    pub linking_value: String,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.sequence == 0
    }

    pub fn is_terminus(&self) -> bool {
        self.content == TERMINUS_MARKER
    }
}
