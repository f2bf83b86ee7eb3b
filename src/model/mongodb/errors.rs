//! The mongodb crate doesn't provide error code constants, so we keep the ones we need here.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

/// Server error code for a unique index violation.
pub const DUPLICATE_KEY: i32 = 11000;

/// Is this a write error caused by a unique index violation?
///
/// For the blocks collection, this is how a lost append race shows up.
pub fn is_duplicate_key(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(ref failure) => failure
            .write_errors
            .iter()
            .flatten()
            .any(|e| e.code == DUPLICATE_KEY),
        _ => false,
    }
}
