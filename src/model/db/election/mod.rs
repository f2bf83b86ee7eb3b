mod key;

pub use key::ElectionKey;

use serde::{Deserialize, Serialize};

use crate::model::common::election::{ElectionId, ElectionState};

/// An election from the database, keyed by its public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    /// Human-readable, unique election name.
    pub name: String,
    /// Number of blocks appended to this election's ledger so far.
    pub block_count: u64,
    /// Current lifecycle state.
    pub state: ElectionState,
}

impl Election {
    /// A freshly created election: upcoming, with no ledger yet.
    pub fn new(id: ElectionId, name: String) -> Self {
        Self {
            id,
            name,
            block_count: 0,
            state: ElectionState::Upcoming,
        }
    }
}
