//! Durable storage behind the election lifecycle.
//!
//! Stores are explicitly owned handles passed into the lifecycle; there is no
//! process-wide connection. Each trait has a MongoDB implementation for the server
//! and an in-memory implementation for tests and tooling.

mod memory;
mod mongo;

pub use memory::{MemoryElectionStore, MemoryLedgerStore};
pub use mongo::{MongoElectionStore, MongoLedgerStore};

use crate::error::Result;
use crate::model::{
    common::{
        election::{ElectionId, ElectionState},
        ledger::LedgerId,
    },
    db::{
        block::Block,
        election::{Election, ElectionKey},
    },
};

/// Election metadata and the private-key keystore.
#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    /// Persist a new election together with its private key.
    /// Fails with `AlreadyExists` if the key or the name is taken.
    async fn insert_election(&self, election: &Election, key: &ElectionKey) -> Result<()>;

    /// Fetch an election. Fails with `NotFound` if there is none.
    async fn election(&self, id: &str) -> Result<Election>;

    /// All elections, optionally only those in the given state, sorted by name.
    async fn elections(&self, state: Option<ElectionState>) -> Result<Vec<Election>>;

    /// Atomically move an election from `from` to `to`.
    /// Returns false if the election was not in state `from`.
    async fn transition(&self, id: &str, from: ElectionState, to: ElectionState) -> Result<bool>;

    /// Raise the election's block count to at least `count`. Never lowers it.
    async fn record_block_count(&self, id: &str, count: u64) -> Result<()>;

    /// Fetch the exported private key of an election.
    async fn private_key(&self, id: &str) -> Result<String>;
}

/// One append-only block sequence per ledger ID.
#[rocket::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Allocate an empty ledger owned by the given election.
    ///
    /// Fails with `AlreadyExists` if the same election already has it, and with
    /// `LedgerIdCollision` if a different election does.
    async fn create_ledger(&self, ledger_id: &LedgerId, owner: &ElectionId) -> Result<()>;

    /// Durably append a block to `block.ledger_id`, at `block.sequence`.
    ///
    /// The sequence number must be exactly the ledger's current length. If another
    /// append got there first, this fails with `ConcurrentAppendConflict` and nothing
    /// is written; the caller should rebuild the block on a fresh basis.
    async fn append_block(&self, block: &Block) -> Result<u64>;

    /// All blocks in ascending sequence order.
    async fn read_blocks(&self, ledger_id: &LedgerId) -> Result<Vec<Block>>;

    /// The block with the highest sequence number, i.e. the basis for the next append.
    async fn last_block(&self, ledger_id: &LedgerId) -> Result<Block>;

    /// Number of blocks in the ledger.
    async fn block_count(&self, ledger_id: &LedgerId) -> Result<u64>;
}
