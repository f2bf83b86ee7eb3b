use serde::{Deserialize, Serialize};

use crate::model::common::election::ElectionId;

/// The private half of an election's key pair, stored apart from the election
/// metadata so it is never serialised into an API response by accident.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElectionKey {
    #[serde(rename = "_id")]
    pub election_id: ElectionId,
    /// PKCS#8 DER, base64url encoded.
    pub private_key: String,
}
