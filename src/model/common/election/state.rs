use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromFormField)]
pub enum ElectionState {
    /// Keys exist, but there is no ledger yet.
    Upcoming,
    /// The ledger has its genesis block and is accepting ballots.
    Active,
    /// The ledger is sealed by its terminus block and can be tallied.
    Closed,
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}
