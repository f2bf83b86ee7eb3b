//! Election key handling and ballot encryption.

pub mod ballot;
pub mod keyring;
