//! The per-election, append-only ballot ledger.

pub mod chain;

pub use chain::{build_genesis, build_next, build_terminus, verify_chain};
