//! Types used across the API and DB layers.

pub mod election;
pub mod ledger;
