use serde::{Deserialize, Serialize};

/// An encrypted ballot as submitted by a voting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSubmission {
    /// Ballot ciphertext, base64url encoded (no padding).
    pub ballot: String,
}

/// Where a submitted ballot ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotReceipt {
    /// Sequence number of the block holding the ballot.
    pub block: u64,
}
