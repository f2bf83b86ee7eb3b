//! The entry point for everything that happens to an election.
//!
//! An election moves `Upcoming → Active → Closed`. Activation writes the genesis
//! block, every accepted ballot adds one block, and closing seals the ledger with
//! the terminus block, after which the ballots can be tallied.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use data_encoding::BASE64URL_NOPAD;
use log::{debug, info, warn};
use rand::Rng;
use rocket::tokio::{sync::Mutex, task, time};
use rsa::RsaPrivateKey;

use crate::config::Config;
use crate::crypto::keyring::{import_private_key, import_public_key, ledger_id_for, KeyringManager};
use crate::error::{Error, Result};
use crate::ledger::{build_genesis, build_next, build_terminus, verify_chain};
use crate::model::{
    api::ledger::LedgerDump,
    common::{
        election::{short_id, ElectionId, ElectionState},
        ledger::LedgerId,
    },
    db::{
        block::Block,
        election::{Election, ElectionKey},
    },
};
use crate::store::{ElectionStore, LedgerStore};
use crate::tally::{TallyEngine, TallyResult};

/// Longest accepted election name, in characters.
pub const MAX_NAME_LEN: usize = 128;

/// Base delay before retrying an append that lost the race for its block.
const APPEND_BACKOFF_MS: u64 = 4;

/// What to put in the next block of a ledger.
enum NextBlock<'a> {
    Ballot(&'a str),
    Terminus,
}

/// One writer lock per ledger. Appends from this process take turns, so they
/// only conflict with appends from other processes sharing the database.
#[derive(Default)]
struct AppendLocks(Mutex<HashMap<LedgerId, Arc<Mutex<()>>>>);

impl AppendLocks {
    async fn get(&self, ledger_id: &LedgerId) -> Arc<Mutex<()>> {
        self.0
            .lock()
            .await
            .entry(ledger_id.clone())
            .or_default()
            .clone()
    }
}

/// Orchestrates elections over explicitly owned stores.
///
/// Cheap to clone; clones share their append locks, so a server should hand out
/// clones of one lifecycle rather than building several.
#[derive(Clone)]
pub struct ElectionLifecycle {
    elections: Arc<dyn ElectionStore>,
    ledgers: Arc<dyn LedgerStore>,
    keyring: KeyringManager,
    append_retries: u32,
    append_locks: Arc<AppendLocks>,
}

/// Randomised, linearly growing delay before the given retry.
fn append_backoff(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=APPEND_BACKOFF_MS);
    Duration::from_millis(APPEND_BACKOFF_MS * u64::from(attempt) + jitter)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl ElectionLifecycle {
    pub fn new(
        elections: Arc<dyn ElectionStore>,
        ledgers: Arc<dyn LedgerStore>,
        config: &Config,
    ) -> Self {
        Self {
            elections,
            ledgers,
            keyring: KeyringManager::new(config.key_bits()),
            append_retries: config.append_retries(),
            append_locks: Arc::default(),
        }
    }

    /// Create an upcoming election with a fresh key pair, returning its ID
    /// (the exported public key). No ledger exists until activation.
    pub async fn create_election(&self, name: &str) -> Result<ElectionId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::BadRequest("Election name is empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Error::BadRequest(format!(
                "Election name is longer than {MAX_NAME_LEN} characters"
            )));
        }

        let keyring = self.keyring;
        let keys = task::spawn_blocking(move || keyring.generate_key_pair())
            .await
            .map_err(Error::crypto)??;

        let election = Election::new(keys.public_key.clone(), name.to_string());
        let key = ElectionKey {
            election_id: keys.public_key,
            private_key: keys.private_key,
        };
        self.elections.insert_election(&election, &key).await?;
        info!("Created election '{name}' ({})", short_id(&election.id));
        Ok(election.id)
    }

    /// Open an election for voting: allocate its ledger and write the genesis block.
    ///
    /// Of several concurrent activations exactly one succeeds; the rest fail with
    /// `AlreadyActivated`. An activation interrupted part way is completed by the
    /// next attempt.
    pub async fn activate_election(&self, id: &str) -> Result<()> {
        let election = self.elections.election(id).await?;
        if election.state != ElectionState::Upcoming {
            return Err(Error::AlreadyActivated(short_id(id)));
        }
        let private_key = self.private_key(id).await?;
        let ledger_id = ledger_id_for(&election.id)?;

        match self.ledgers.create_ledger(&ledger_id, &election.id).await {
            Ok(()) => {}
            Err(Error::AlreadyExists(_)) => debug!("Ledger {ledger_id} already allocated"),
            Err(err) => return Err(err),
        }
        let genesis = build_genesis(&ledger_id, &election.id, &private_key, now_millis())?;
        match self.ledgers.append_block(&genesis).await {
            Ok(_) => {}
            Err(Error::ConcurrentAppendConflict { .. }) => {
                debug!("Genesis block of ledger {ledger_id} already written")
            }
            Err(err) => return Err(err),
        }
        self.elections.record_block_count(id, 1).await?;

        if !self
            .elections
            .transition(id, ElectionState::Upcoming, ElectionState::Active)
            .await?
        {
            return Err(Error::AlreadyActivated(short_id(id)));
        }
        info!("Activated election '{}'", election.name);
        Ok(())
    }

    /// Record an encrypted ballot, returning the sequence number of its block.
    pub async fn submit_ballot(&self, id: &str, ballot: &[u8]) -> Result<u64> {
        if ballot.is_empty() {
            return Err(Error::BadRequest("Ballot is empty".to_string()));
        }
        let election = self.elections.election(id).await?;
        match election.state {
            ElectionState::Upcoming => return Err(Error::ElectionNotActive(short_id(id))),
            ElectionState::Closed => return Err(Error::ElectionClosed(short_id(id))),
            ElectionState::Active => {}
        }
        let private_key = self.private_key(id).await?;
        let ledger_id = ledger_id_for(&election.id)?;

        let content = BASE64URL_NOPAD.encode(ballot);
        let block = self
            .append(id, &ledger_id, NextBlock::Ballot(&content), &private_key)
            .await?;
        self.elections
            .record_block_count(id, block.sequence + 1)
            .await?;
        debug!(
            "Recorded ballot in block {} of election {}",
            block.sequence,
            short_id(id)
        );
        Ok(block.sequence)
    }

    /// Seal an election's ledger with the terminus block and close it.
    ///
    /// If the ledger was already sealed but the election is still active, as
    /// happens when a previous close was interrupted, this completes the close.
    pub async fn close_election(&self, id: &str) -> Result<()> {
        let election = self.elections.election(id).await?;
        match election.state {
            ElectionState::Upcoming => return Err(Error::ElectionNotActive(short_id(id))),
            ElectionState::Closed => return Err(Error::ElectionClosed(short_id(id))),
            ElectionState::Active => {}
        }
        let private_key = self.private_key(id).await?;
        let ledger_id = ledger_id_for(&election.id)?;

        let count = match self
            .append(id, &ledger_id, NextBlock::Terminus, &private_key)
            .await
        {
            Ok(terminus) => terminus.sequence + 1,
            Err(Error::ElectionClosed(_)) => {
                warn!(
                    "Ledger of election '{}' is already sealed, completing close",
                    election.name
                );
                self.ledgers.block_count(&ledger_id).await?
            }
            Err(err) => return Err(err),
        };
        self.elections.record_block_count(id, count).await?;

        if !self
            .elections
            .transition(id, ElectionState::Active, ElectionState::Closed)
            .await?
        {
            return Err(Error::ElectionClosed(short_id(id)));
        }
        info!("Closed election '{}' after {count} blocks", election.name);
        Ok(())
    }

    /// Count the votes of a closed election.
    pub async fn tally_election(&self, id: &str) -> Result<TallyResult> {
        let election = self.elections.election(id).await?;
        if election.state != ElectionState::Closed {
            return Err(Error::ElectionNotClosed(short_id(id)));
        }
        let private_key = self.private_key(id).await?;
        TallyEngine::new(self.ledgers.as_ref())
            .tally(&election, &private_key)
            .await
    }

    /// Elections, optionally only those in the given state, sorted by name.
    pub async fn list_elections(&self, state: Option<ElectionState>) -> Result<Vec<Election>> {
        self.elections.elections(state).await
    }

    /// A single election.
    pub async fn election(&self, id: &str) -> Result<Election> {
        self.elections.election(id).await
    }

    /// Every block of an active or closed election's ledger.
    pub async fn view_ledger(&self, id: &str) -> Result<LedgerDump> {
        let election = self.elections.election(id).await?;
        if election.state == ElectionState::Upcoming {
            return Err(Error::ElectionNotActive(short_id(id)));
        }
        let ledger_id = ledger_id_for(&election.id)?;
        let blocks = self.ledgers.read_blocks(&ledger_id).await?;
        Ok(LedgerDump {
            election_id: election.id,
            ledger_id,
            blocks,
        })
    }

    /// Check every link of an election's ledger, returning the number of blocks checked.
    pub async fn verify_election(&self, id: &str) -> Result<u64> {
        let dump = self.view_ledger(id).await?;
        let public_key = import_public_key(&dump.election_id)?;
        verify_chain(&dump.blocks, &public_key)?;
        Ok(dump.blocks.len() as u64)
    }

    async fn private_key(&self, id: &str) -> Result<RsaPrivateKey> {
        import_private_key(&self.elections.private_key(id).await?)
    }

    /// Append the next block to a ledger, rebuilding it on a fresh basis each
    /// time another process wins the race.
    async fn append(
        &self,
        id: &str,
        ledger_id: &LedgerId,
        next: NextBlock<'_>,
        private_key: &RsaPrivateKey,
    ) -> Result<Block> {
        let lock = self.append_locks.get(ledger_id).await;
        let _guard = lock.lock().await;

        let mut attempt = 1;
        loop {
            let basis = self.ledgers.last_block(ledger_id).await?;
            if basis.is_terminus() {
                return Err(Error::ElectionClosed(short_id(id)));
            }
            let block = match next {
                NextBlock::Ballot(content) => {
                    build_next(content.to_string(), &basis, now_millis(), private_key)?
                }
                NextBlock::Terminus => build_terminus(&basis, now_millis(), private_key)?,
            };
            match self.ledgers.append_block(&block).await {
                Ok(_) => return Ok(block),
                Err(Error::ConcurrentAppendConflict { sequence, .. })
                    if attempt < self.append_retries =>
                {
                    debug!(
                        "Lost the race for block {sequence} of ledger {ledger_id}, retrying (attempt {attempt})"
                    );
                    time::sleep(append_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
