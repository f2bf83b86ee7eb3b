//! Data types shared between the ledger core, the stores and the API.

pub mod api;
pub mod common;
pub mod db;
pub mod mongodb;
