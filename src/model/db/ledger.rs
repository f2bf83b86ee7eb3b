use serde::{Deserialize, Serialize};

use crate::model::common::{election::ElectionId, ledger::LedgerId};

/// Registration of a ledger, remembering which election key it was derived from
/// so that two keys deriving the same ID can never share a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    #[serde(rename = "_id")]
    pub id: LedgerId,
    pub owner: ElectionId,
}
