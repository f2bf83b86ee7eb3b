use std::sync::Arc;

use log::{error, info};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::crypto::keyring::DEFAULT_KEY_BITS;
use crate::lifecycle::ElectionLifecycle;
use crate::model::mongodb::ensure_indexes_exist;
use crate::store::{MongoElectionStore, MongoLedgerStore};

/// Default number of attempts at an append before giving up on a busy ledger.
pub const DEFAULT_APPEND_RETRIES: u32 = 8;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_key_bits")]
    key_bits: usize,
    #[serde(default = "default_append_retries")]
    append_retries: u32,
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

fn default_append_retries() -> u32 {
    DEFAULT_APPEND_RETRIES
}

impl Config {
    pub fn new(key_bits: usize, append_retries: u32) -> Self {
        Self {
            key_bits,
            append_retries,
        }
    }

    /// RSA modulus size of newly created election keys.
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// How many times a ballot or terminus append is attempted when other
    /// appends keep winning the race for the next block.
    pub fn append_retries(&self) -> u32 {
        self.append_retries.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_BITS, DEFAULT_APPEND_RETRIES)
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the storage fairing and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!(
            "Election keys are {} bits, appends are attempted up to {} times",
            config.key_bits(),
            config.append_retries()
        );

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database, ensures
/// the indexes exist, and places an [`ElectionLifecycle`] over the MongoDB
/// stores into managed state.
///
/// Must be attached after [`ConfigFairing`].
pub struct StorageFairing;

#[rocket::async_trait]
impl Fairing for StorageFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let db_config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let Some(config) = rocket.state::<Config>().cloned() else {
            error!("Application config must be loaded before connecting to the database");
            return Err(rocket);
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(db_config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(DATABASE_NAME);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        let lifecycle = ElectionLifecycle::new(
            Arc::new(MongoElectionStore::from_db(&db)),
            Arc::new(MongoLedgerStore::from_db(&db)),
            &config,
        );

        // Manage the state.
        rocket = rocket.manage(client).manage(lifecycle);
        Ok(rocket)
    }
}

/// Name of the database to use in production.
pub const DATABASE_NAME: &str = "ballotchain";

#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;

    #[test]
    fn config_defaults() {
        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.key_bits(), DEFAULT_KEY_BITS);
        assert_eq!(config.append_retries(), DEFAULT_APPEND_RETRIES);
    }

    #[test]
    fn config_overrides() {
        let config: Config = Figment::new()
            .merge(Serialized::default("key_bits", 3072))
            .merge(Serialized::default("append_retries", 0))
            .extract()
            .unwrap();
        assert_eq!(config.key_bits(), 3072);
        // At least one attempt is always made.
        assert_eq!(config.append_retries(), 1);
    }
}
