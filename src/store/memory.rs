use std::collections::HashMap;

use rocket::tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{
    common::{
        election::{short_id, ElectionId, ElectionState},
        ledger::LedgerId,
    },
    db::{
        block::Block,
        election::{Election, ElectionKey},
    },
};

use super::{ElectionStore, LedgerStore};

/// Elections and keys held in process memory.
#[derive(Default)]
pub struct MemoryElectionStore {
    elections: RwLock<HashMap<ElectionId, Election>>,
    keys: RwLock<HashMap<ElectionId, ElectionKey>>,
}

impl MemoryElectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryElectionStore {
    async fn insert_election(&self, election: &Election, key: &ElectionKey) -> Result<()> {
        let mut elections = self.elections.write().await;
        if elections.contains_key(&election.id) {
            return Err(Error::AlreadyExists(format!(
                "Election with key '{}'",
                short_id(&election.id)
            )));
        }
        if elections.values().any(|e| e.name == election.name) {
            return Err(Error::AlreadyExists(format!(
                "Election named '{}'",
                election.name
            )));
        }
        elections.insert(election.id.clone(), election.clone());
        self.keys
            .write()
            .await
            .insert(key.election_id.clone(), key.clone());
        Ok(())
    }

    async fn election(&self, id: &str) -> Result<Election> {
        self.elections
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Election '{}'", short_id(id))))
    }

    async fn elections(&self, state: Option<ElectionState>) -> Result<Vec<Election>> {
        let mut elections: Vec<_> = self
            .elections
            .read()
            .await
            .values()
            .filter(|e| state.map_or(true, |state| e.state == state))
            .cloned()
            .collect();
        elections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(elections)
    }

    async fn transition(&self, id: &str, from: ElectionState, to: ElectionState) -> Result<bool> {
        let mut elections = self.elections.write().await;
        let election = elections
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("Election '{}'", short_id(id))))?;
        if election.state != from {
            return Ok(false);
        }
        election.state = to;
        Ok(true)
    }

    async fn record_block_count(&self, id: &str, count: u64) -> Result<()> {
        let mut elections = self.elections.write().await;
        let election = elections
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("Election '{}'", short_id(id))))?;
        election.block_count = election.block_count.max(count);
        Ok(())
    }

    async fn private_key(&self, id: &str) -> Result<String> {
        self.keys
            .read()
            .await
            .get(id)
            .map(|key| key.private_key.clone())
            .ok_or_else(|| Error::not_found(format!("Private key for '{}'", short_id(id))))
    }
}

struct MemoryLedger {
    owner: ElectionId,
    blocks: Vec<Block>,
}

/// Ledgers held in process memory. Appends are serialised by the write lock.
#[derive(Default)]
pub struct MemoryLedgerStore {
    ledgers: RwLock<HashMap<LedgerId, MemoryLedger>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ledger_not_found(ledger_id: &LedgerId) -> Error {
    Error::not_found(format!("Ledger {ledger_id}"))
}

#[rocket::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_ledger(&self, ledger_id: &LedgerId, owner: &ElectionId) -> Result<()> {
        let mut ledgers = self.ledgers.write().await;
        if let Some(existing) = ledgers.get(ledger_id) {
            return Err(if &existing.owner == owner {
                Error::AlreadyExists(format!("Ledger {ledger_id}"))
            } else {
                Error::LedgerIdCollision(ledger_id.clone())
            });
        }
        ledgers.insert(
            ledger_id.clone(),
            MemoryLedger {
                owner: owner.clone(),
                blocks: Vec::new(),
            },
        );
        Ok(())
    }

    async fn append_block(&self, block: &Block) -> Result<u64> {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers
            .get_mut(&block.ledger_id)
            .ok_or_else(|| ledger_not_found(&block.ledger_id))?;
        if block.sequence != ledger.blocks.len() as u64 {
            return Err(Error::ConcurrentAppendConflict {
                ledger: block.ledger_id.clone(),
                sequence: block.sequence,
            });
        }
        ledger.blocks.push(block.clone());
        Ok(block.sequence)
    }

    async fn read_blocks(&self, ledger_id: &LedgerId) -> Result<Vec<Block>> {
        self.ledgers
            .read()
            .await
            .get(ledger_id)
            .map(|ledger| ledger.blocks.clone())
            .ok_or_else(|| ledger_not_found(ledger_id))
    }

    async fn last_block(&self, ledger_id: &LedgerId) -> Result<Block> {
        let ledgers = self.ledgers.read().await;
        let ledger = ledgers
            .get(ledger_id)
            .ok_or_else(|| ledger_not_found(ledger_id))?;
        ledger
            .blocks
            .last()
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Genesis block of ledger {ledger_id}")))
    }

    async fn block_count(&self, ledger_id: &LedgerId) -> Result<u64> {
        self.ledgers
            .read()
            .await
            .get(ledger_id)
            .map(|ledger| ledger.blocks.len() as u64)
            .ok_or_else(|| ledger_not_found(ledger_id))
    }
}
