mod state;

use data_encoding::BASE64URL_NOPAD;
use sha2::{Digest, Sha256};

pub use state::ElectionState;

/// Elections are identified by their public key, exported as base64url DER.
pub type ElectionId = String;
/// Our candidate IDs are opaque strings agreed with the ballot constructor.
pub type CandidateId = String;
/// Voter identity tokens are opaque strings carried inside encrypted ballots.
pub type VoterId = String;

/// A short, stable fingerprint of a (long) election ID for log and error messages.
///
/// Exported public keys all share the same DER prefix, so a plain prefix of the ID
/// would not tell elections apart.
pub fn short_id(id: &str) -> String {
    const SHORT_LEN: usize = 12;
    let mut short = BASE64URL_NOPAD.encode(&Sha256::digest(id.as_bytes()));
    short.truncate(SHORT_LEN);
    short
}
