use serde::{Deserialize, Serialize};

use crate::model::{
    common::{election::ElectionId, ledger::LedgerId},
    db::block::Block,
};

/// A full, public dump of an election ledger. Everything needed to verify the
/// chain offline, and with the election's private key, to recount it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDump {
    pub election_id: ElectionId,
    pub ledger_id: LedgerId,
    /// All blocks, in sequence order.
    pub blocks: Vec<Block>,
}

/// Outcome of a successful ledger verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVerification {
    /// Number of blocks whose links were checked.
    pub verified_blocks: u64,
}
