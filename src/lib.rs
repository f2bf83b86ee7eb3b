#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub use config::Config;
pub use lifecycle::ElectionLifecycle;

use config::{ConfigFairing, StorageFairing};
use logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod store;
pub mod tally;

#[cfg(test)]
pub(crate) mod testing;

/// Build a server backed by MongoDB, configured from `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StorageFairing)
}

/// Build a server around an existing lifecycle, e.g. one over in-memory stores.
pub fn rocket_for_lifecycle(lifecycle: ElectionLifecycle) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .manage(lifecycle)
}
