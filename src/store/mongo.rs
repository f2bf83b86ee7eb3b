use log::{debug, warn};
use mongodb::{
    bson::{doc, Document},
    options::{FindOneOptions, FindOptions},
    Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    common::{
        election::{short_id, ElectionId, ElectionState},
        ledger::LedgerId,
    },
    db::{
        block::Block,
        election::{Election, ElectionKey},
        ledger::LedgerRecord,
    },
    mongodb::{is_duplicate_key, Coll},
};

use super::{ElectionStore, LedgerStore};

/// Elections and keys in the `elections` and `private_keys` collections.
#[derive(Clone)]
pub struct MongoElectionStore {
    elections: Coll<Election>,
    keys: Coll<ElectionKey>,
}

impl MongoElectionStore {
    pub fn from_db(db: &Database) -> Self {
        Self {
            elections: Coll::from_db(db),
            keys: Coll::from_db(db),
        }
    }

    async fn require_election(&self, id: &str) -> Result<()> {
        self.election(id).await.map(|_| ())
    }
}

#[rocket::async_trait]
impl ElectionStore for MongoElectionStore {
    async fn insert_election(&self, election: &Election, key: &ElectionKey) -> Result<()> {
        match self.elections.insert_one(election, None).await {
            Ok(_) => {}
            Err(err) if is_duplicate_key(&err) => {
                return Err(Error::AlreadyExists(format!(
                    "Election named '{}'",
                    election.name
                )))
            }
            Err(err) => return Err(err.into()),
        }

        if let Err(err) = self.keys.insert_one(key, None).await {
            // Don't leave an election behind that can never be activated.
            warn!(
                "Failed to store private key for {}, removing election",
                short_id(&election.id)
            );
            self.elections
                .delete_one(doc! {"_id": election.id.as_str()}, None)
                .await?;
            return Err(if is_duplicate_key(&err) {
                Error::AlreadyExists(format!("Election with key '{}'", short_id(&election.id)))
            } else {
                err.into()
            });
        }
        Ok(())
    }

    async fn election(&self, id: &str) -> Result<Election> {
        self.elections
            .find_one(doc! {"_id": id}, None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election '{}'", short_id(id))))
    }

    async fn elections(&self, state: Option<ElectionState>) -> Result<Vec<Election>> {
        let filter = state.map(|state| doc! {"state": state});
        let options = FindOptions::builder().sort(doc! {"name": 1}).build();
        Ok(self
            .elections
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn transition(&self, id: &str, from: ElectionState, to: ElectionState) -> Result<bool> {
        let filter = doc! {
            "_id": id,
            "state": from,
        };
        let update = doc! {
            "$set": {
                "state": to,
            }
        };
        let result = self.elections.update_one(filter, update, None).await?;
        if result.modified_count == 1 {
            return Ok(true);
        }
        // Distinguish a missing election from one in another state.
        self.require_election(id).await?;
        Ok(false)
    }

    async fn record_block_count(&self, id: &str, count: u64) -> Result<()> {
        let update = doc! {
            "$max": {
                "block_count": count as i64,
            }
        };
        let result = self
            .elections
            .update_one(doc! {"_id": id}, update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Election '{}'", short_id(id))));
        }
        Ok(())
    }

    async fn private_key(&self, id: &str) -> Result<String> {
        self.keys
            .find_one(doc! {"_id": id}, None)
            .await?
            .map(|key| key.private_key)
            .ok_or_else(|| Error::not_found(format!("Private key for '{}'", short_id(id))))
    }
}

/// Ledgers in the `ledgers` collection, their blocks in `blocks`.
///
/// Appends rely on the unique `(ledger_id, sequence)` index: of two appends built on
/// the same basis, exactly one insert succeeds.
#[derive(Clone)]
pub struct MongoLedgerStore {
    ledgers: Coll<LedgerRecord>,
    blocks: Coll<Block>,
}

impl MongoLedgerStore {
    pub fn from_db(db: &Database) -> Self {
        Self {
            ledgers: Coll::from_db(db),
            blocks: Coll::from_db(db),
        }
    }

    async fn require_ledger(&self, ledger_id: &LedgerId) -> Result<()> {
        self.ledgers
            .find_one(doc! {"_id": ledger_id.as_str()}, None)
            .await?
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("Ledger {ledger_id}")))
    }

    fn block_filter(ledger_id: &LedgerId, sequence: u64) -> Document {
        doc! {
            "ledger_id": ledger_id.as_str(),
            "sequence": sequence as i64,
        }
    }
}

#[rocket::async_trait]
impl LedgerStore for MongoLedgerStore {
    async fn create_ledger(&self, ledger_id: &LedgerId, owner: &ElectionId) -> Result<()> {
        let record = LedgerRecord {
            id: ledger_id.clone(),
            owner: owner.clone(),
        };
        match self.ledgers.insert_one(&record, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                let existing = self
                    .ledgers
                    .find_one(doc! {"_id": ledger_id.as_str()}, None)
                    .await?;
                match existing {
                    Some(existing) if &existing.owner != owner => {
                        Err(Error::LedgerIdCollision(ledger_id.clone()))
                    }
                    _ => Err(Error::AlreadyExists(format!("Ledger {ledger_id}"))),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn append_block(&self, block: &Block) -> Result<u64> {
        let conflict = || Error::ConcurrentAppendConflict {
            ledger: block.ledger_id.clone(),
            sequence: block.sequence,
        };

        self.require_ledger(&block.ledger_id).await?;
        if block.sequence > 0 {
            let predecessor = self
                .blocks
                .find_one(
                    Self::block_filter(&block.ledger_id, block.sequence - 1),
                    None,
                )
                .await?;
            if predecessor.is_none() {
                return Err(conflict());
            }
        }

        match self.blocks.insert_one(block, None).await {
            Ok(_) => {
                debug!(
                    "Appended block {} to ledger {}",
                    block.sequence, block.ledger_id
                );
                Ok(block.sequence)
            }
            Err(err) if is_duplicate_key(&err) => Err(conflict()),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_blocks(&self, ledger_id: &LedgerId) -> Result<Vec<Block>> {
        self.require_ledger(ledger_id).await?;
        let options = FindOptions::builder().sort(doc! {"sequence": 1}).build();
        Ok(self
            .blocks
            .find(doc! {"ledger_id": ledger_id.as_str()}, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn last_block(&self, ledger_id: &LedgerId) -> Result<Block> {
        self.require_ledger(ledger_id).await?;
        let options = FindOneOptions::builder()
            .sort(doc! {"sequence": -1})
            .build();
        self.blocks
            .find_one(doc! {"ledger_id": ledger_id.as_str()}, options)
            .await?
            .ok_or_else(|| Error::not_found(format!("Genesis block of ledger {ledger_id}")))
    }

    async fn block_count(&self, ledger_id: &LedgerId) -> Result<u64> {
        self.require_ledger(ledger_id).await?;
        Ok(self
            .blocks
            .count_documents(doc! {"ledger_id": ledger_id.as_str()}, None)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::TestBackend;

    use super::*;

    fn ledger_id() -> LedgerId {
        LedgerId::new("test-ledger".to_string())
    }

    fn block(sequence: u64) -> Block {
        Block {
            ledger_id: ledger_id(),
            sequence,
            content: format!("content{sequence}"),
            timestamp: 1_000 + sequence as i64,
            linking_value: format!("link{sequence}"),
        }
    }

    fn key_for(election: &Election) -> ElectionKey {
        ElectionKey {
            election_id: election.id.clone(),
            private_key: format!("secret of {}", election.name),
        }
    }

    #[backend_test(mongo)]
    async fn duplicate_elections_leave_nothing_behind(backend: TestBackend) {
        let store = backend.elections();
        let mayor = Election::example("Mayor", ElectionState::Upcoming);
        store.insert_election(&mayor, &key_for(&mayor)).await.unwrap();

        // Same name, different key.
        let mut renamed = Election::example("Council", ElectionState::Upcoming);
        renamed.name = "Mayor".to_string();
        assert!(matches!(
            store.insert_election(&renamed, &key_for(&renamed)).await,
            Err(Error::AlreadyExists(_))
        ));

        // A new election whose key record clashes is removed again.
        let budget = Election::example("Budget", ElectionState::Upcoming);
        assert!(matches!(
            store.insert_election(&budget, &key_for(&mayor)).await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            store.election(&budget.id).await,
            Err(Error::NotFound(_))
        ));

        assert_eq!(store.election(&mayor.id).await.unwrap(), mayor);
        assert_eq!(store.private_key(&mayor.id).await.unwrap(), "secret of Mayor");
        assert_eq!(store.elections(None).await.unwrap(), vec![mayor]);
    }

    #[backend_test(mongo)]
    async fn transitions_are_conditional_and_counts_monotonic(backend: TestBackend) {
        let store = backend.elections();
        let election = Election::example("Mayor", ElectionState::Upcoming);
        store.insert_election(&election, &key_for(&election)).await.unwrap();

        use ElectionState::*;
        assert!(!store.transition(&election.id, Active, Closed).await.unwrap());
        assert!(store.transition(&election.id, Upcoming, Active).await.unwrap());
        assert!(!store.transition(&election.id, Upcoming, Active).await.unwrap());
        assert!(matches!(
            store.transition("missing", Upcoming, Active).await,
            Err(Error::NotFound(_))
        ));

        store.record_block_count(&election.id, 3).await.unwrap();
        store.record_block_count(&election.id, 2).await.unwrap();
        let stored = store.election(&election.id).await.unwrap();
        assert_eq!(stored.state, Active);
        assert_eq!(stored.block_count, 3);
        assert_eq!(
            store.elections(Some(Active)).await.unwrap(),
            vec![stored]
        );
        assert!(matches!(
            store.record_block_count("missing", 1).await,
            Err(Error::NotFound(_))
        ));
    }

    #[backend_test(mongo)]
    async fn ledger_ids_belong_to_one_election(backend: TestBackend) {
        let store = backend.ledgers();
        let owner = "owner".to_string();
        store.create_ledger(&ledger_id(), &owner).await.unwrap();
        assert!(matches!(
            store.create_ledger(&ledger_id(), &owner).await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            store.create_ledger(&ledger_id(), &"intruder".to_string()).await,
            Err(Error::LedgerIdCollision(_))
        ));
        assert_eq!(store.block_count(&ledger_id()).await.unwrap(), 0);
        assert!(matches!(
            store.last_block(&ledger_id()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[backend_test(mongo)]
    async fn appends_must_extend_the_ledger(backend: TestBackend) {
        let store = backend.ledgers();
        assert!(matches!(
            store.append_block(&block(0)).await,
            Err(Error::NotFound(_))
        ));

        store
            .create_ledger(&ledger_id(), &"owner".to_string())
            .await
            .unwrap();
        assert_eq!(store.append_block(&block(0)).await.unwrap(), 0);
        assert_eq!(store.append_block(&block(1)).await.unwrap(), 1);

        // A taken sequence number hits the unique index; a gap has no predecessor.
        assert!(matches!(
            store.append_block(&block(1)).await,
            Err(Error::ConcurrentAppendConflict { sequence: 1, .. })
        ));
        assert!(matches!(
            store.append_block(&block(3)).await,
            Err(Error::ConcurrentAppendConflict { sequence: 3, .. })
        ));

        store.append_block(&block(2)).await.unwrap();
        assert_eq!(store.block_count(&ledger_id()).await.unwrap(), 3);
        assert_eq!(store.last_block(&ledger_id()).await.unwrap(), block(2));
        assert_eq!(
            store.read_blocks(&ledger_id()).await.unwrap(),
            vec![block(0), block(1), block(2)]
        );
    }
}
