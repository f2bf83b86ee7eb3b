use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{ElectionId, ElectionState},
    db::election::Election,
};

/// Request body for creating an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewElection {
    pub name: String,
}

/// Response body after creating an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedElection {
    /// The election's public key; ballots must be encrypted to it.
    pub election_id: ElectionId,
}

/// A summary of an election for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub election_id: ElectionId,
    pub name: String,
    pub block_count: u64,
    pub state: ElectionState,
}

impl From<Election> for ElectionSummary {
    fn from(election: Election) -> Self {
        Self {
            election_id: election.id,
            name: election.name,
            block_count: election.block_count,
            state: election.state,
        }
    }
}
