//! Shared fixtures for unit and API tests.

use std::sync::{Arc, OnceLock};

use mongodb::{Client as MongoClient, Database};
use rocket::local::asynchronous::Client;

use crate::config::{Config, DEFAULT_APPEND_RETRIES};
use crate::crypto::{
    ballot::encrypt_ballot,
    keyring::{import_public_key, KeyPair, KeyringManager},
};
use crate::lifecycle::ElectionLifecycle;
use crate::model::mongodb::ensure_indexes_exist;
use crate::store::{
    ElectionStore, LedgerStore, MemoryElectionStore, MemoryLedgerStore, MongoElectionStore,
    MongoLedgerStore,
};

/// Key size used throughout the tests. Too small for real elections, but quick to generate.
pub const TEST_KEY_BITS: usize = 1024;

/// A key pair shared by the tests that don't care which key they use.
pub fn test_keys() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| {
        KeyringManager::new(TEST_KEY_BITS)
            .generate_key_pair()
            .unwrap()
    })
}

/// The shipped configuration, apart from the key size.
pub fn test_config() -> Config {
    Config::new(TEST_KEY_BITS, DEFAULT_APPEND_RETRIES)
}

/// Encrypt a ballot to the given election.
pub fn ballot_for(election_id: &str, voter: &str, candidate: &str) -> Vec<u8> {
    let public_key = import_public_key(election_id).unwrap();
    encrypt_ballot(candidate, voter, &public_key).unwrap()
}

/// Enable log output for code under test.
pub fn init_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(["ballotchain_backend"], None, None);
}

/// The stores behind a test, either in memory or in a throwaway MongoDB database.
///
/// Every injected client and lifecycle shares one lifecycle, as in the server.
#[derive(Clone)]
pub struct TestBackend {
    lifecycle: ElectionLifecycle,
    elections: Arc<dyn ElectionStore>,
    ledgers: Arc<dyn LedgerStore>,
    db: Option<Database>,
}

impl TestBackend {
    fn new(
        elections: Arc<dyn ElectionStore>,
        ledgers: Arc<dyn LedgerStore>,
        db: Option<Database>,
    ) -> Self {
        Self {
            lifecycle: ElectionLifecycle::new(elections.clone(), ledgers.clone(), &test_config()),
            elections,
            ledgers,
            db,
        }
    }

    pub fn memory() -> Self {
        Self::new(
            Arc::new(MemoryElectionStore::new()),
            Arc::new(MemoryLedgerStore::new()),
            None,
        )
    }

    /// Connect to the MongoDB server at `DB_URI` and use a fresh, randomly named database.
    pub async fn mongo() -> Self {
        let db_uri = std::env::var("DB_URI").expect("`DB_URI` must be set for MongoDB tests");
        let client = MongoClient::with_uri_str(db_uri).await.unwrap();
        let random: u32 = rand::random();
        let db = client.database(&format!("test{random}"));
        log::info!("Using database {}", db.name());
        ensure_indexes_exist(&db).await.unwrap();
        Self::new(
            Arc::new(MongoElectionStore::from_db(&db)),
            Arc::new(MongoLedgerStore::from_db(&db)),
            Some(db),
        )
    }

    pub fn lifecycle(&self) -> ElectionLifecycle {
        self.lifecycle.clone()
    }

    /// A second lifecycle over the same stores, standing in for another server process.
    pub fn other_process(&self) -> ElectionLifecycle {
        ElectionLifecycle::new(self.elections.clone(), self.ledgers.clone(), &test_config())
    }

    /// Direct access to the election store, bypassing the lifecycle's checks.
    pub fn elections(&self) -> &dyn ElectionStore {
        self.elections.as_ref()
    }

    /// Direct access to the ledger store, bypassing the lifecycle's checks.
    pub fn ledgers(&self) -> &dyn LedgerStore {
        self.ledgers.as_ref()
    }

    /// Share the stores, e.g. to wrap one in a test double.
    pub fn stores(&self) -> (Arc<dyn ElectionStore>, Arc<dyn LedgerStore>) {
        (self.elections.clone(), self.ledgers.clone())
    }

    /// A local client for a server over this backend.
    pub async fn client(&self) -> Client {
        Client::tracked(crate::rocket_for_lifecycle(self.lifecycle()))
            .await
            .unwrap()
    }

    pub async fn cleanup(self) {
        if let Some(db) = self.db {
            db.drop(None).await.unwrap();
        }
    }
}
