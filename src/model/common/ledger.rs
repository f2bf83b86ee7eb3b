use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Content of the terminus block that seals a ledger.
///
/// `!` is outside the base64url alphabet, so no encoded ballot can collide with it.
pub const TERMINUS_MARKER: &str = "!terminus";

/// Storage key of one election's ledger, derived from the election's public modulus.
/// Always 43 characters from the base64url alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(String);

impl LedgerId {
    pub(crate) fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LedgerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
