//! DB-compatible (e.g. de/serialisable) types.
//!
//! These are the records as they are persisted, independent of which store
//! backend holds them.

pub mod block;
pub mod election;
pub mod ledger;
