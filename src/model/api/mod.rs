//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Keys and ciphertexts are serialised as base64url strings.
//! - Private key material never appears here.

pub mod ballot;
pub mod election;
pub mod ledger;
