//! Ballot encryption.
//!
//! A ballot is a small JSON document `{"voter": ..., "candidate": ...}` sealed in a
//! hybrid envelope, since an RSA block alone cannot carry an arbitrary-length payload:
//!
//! ```text
//! | wrapped key length (u16 BE) | RSA-OAEP(SHA-256) wrapped AES-256 key | 96-bit nonce | AES-GCM ciphertext |
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{thread_rng, RngCore};
use rocket::serde::json::serde_json;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{BallotError, Error, Result};
use crate::model::common::election::{CandidateId, VoterId};

const SESSION_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const LENGTH_PREFIX_LEN: usize = 2;

/// The plaintext layout agreed with ballot-constructing clients.
#[derive(Serialize, Deserialize)]
struct BallotPlaintext {
    voter: VoterId,
    candidate: CandidateId,
}

/// A decrypted ballot. Only ever exists transiently during a tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBallot {
    pub voter: VoterId,
    pub candidate: CandidateId,
}

/// Encrypt a vote for `candidate` by the voter identified by `voter`, to the
/// election's public key.
pub fn encrypt_ballot(candidate: &str, voter: &str, election_key: &RsaPublicKey) -> Result<Vec<u8>> {
    if candidate.is_empty() || voter.is_empty() {
        return Err(Error::BadRequest(
            "Ballots need both a candidate and a voter identity".to_string(),
        ));
    }
    let plaintext = serde_json::to_vec(&BallotPlaintext {
        voter: voter.to_string(),
        candidate: candidate.to_string(),
    })
    .map_err(Error::crypto)?;
    seal(&plaintext, election_key)
}

/// Seal arbitrary bytes in a ballot envelope.
pub(crate) fn seal(plaintext: &[u8], election_key: &RsaPublicKey) -> Result<Vec<u8>> {
    let mut rng = thread_rng();
    let mut session_key = [0u8; SESSION_KEY_LEN];
    rng.fill_bytes(&mut session_key);
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(&session_key).map_err(Error::crypto)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(Error::crypto)?;
    let wrapped_key = election_key.encrypt(&mut rng, Oaep::new::<Sha256>(), &session_key)?;
    let wrapped_len = u16::try_from(wrapped_key.len()).map_err(Error::crypto)?;

    let mut envelope =
        Vec::with_capacity(LENGTH_PREFIX_LEN + wrapped_key.len() + NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(&wrapped_len.to_be_bytes());
    envelope.extend_from_slice(&wrapped_key);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt and decode a ballot envelope with the election's private key.
///
/// Anything wrong with the envelope or its cryptography is [`BallotError::DecryptionFailed`];
/// a plaintext that decrypts but isn't a ballot is [`BallotError::MalformedBallot`].
pub fn decrypt_ballot(
    envelope: &[u8],
    election_key: &RsaPrivateKey,
) -> std::result::Result<DecodedBallot, BallotError> {
    let (wrapped_key, nonce, ciphertext) =
        split_envelope(envelope).ok_or(BallotError::DecryptionFailed)?;
    let session_key = election_key
        .decrypt(Oaep::new::<Sha256>(), wrapped_key)
        .map_err(|_| BallotError::DecryptionFailed)?;
    let cipher =
        Aes256Gcm::new_from_slice(&session_key).map_err(|_| BallotError::DecryptionFailed)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| BallotError::DecryptionFailed)?;

    let ballot: BallotPlaintext = serde_json::from_slice(&plaintext)
        .map_err(|e| BallotError::MalformedBallot(e.to_string()))?;
    if ballot.voter.is_empty() || ballot.candidate.is_empty() {
        return Err(BallotError::MalformedBallot(
            "empty voter identity or candidate".to_string(),
        ));
    }
    Ok(DecodedBallot {
        voter: ballot.voter,
        candidate: ballot.candidate,
    })
}

/// Split an envelope into (wrapped key, nonce, ciphertext), if it is long enough.
fn split_envelope(envelope: &[u8]) -> Option<(&[u8], &[u8], &[u8])> {
    let prefix: [u8; LENGTH_PREFIX_LEN] = envelope.get(..LENGTH_PREFIX_LEN)?.try_into().ok()?;
    let wrapped_len = usize::from(u16::from_be_bytes(prefix));
    let rest = &envelope[LENGTH_PREFIX_LEN..];
    if rest.len() < wrapped_len + NONCE_LEN {
        return None;
    }
    let (wrapped_key, rest) = rest.split_at(wrapped_len);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    Some((wrapped_key, nonce, ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::crypto::keyring::{import_private_key, import_public_key, KeyringManager};
    use crate::testing::{test_keys, TEST_KEY_BITS};

    fn keys() -> (RsaPublicKey, RsaPrivateKey) {
        let keys = test_keys();
        (
            import_public_key(&keys.public_key).unwrap(),
            import_private_key(&keys.private_key).unwrap(),
        )
    }

    #[test]
    fn ballots_decrypt() {
        let (public_key, private_key) = keys();
        let envelope = encrypt_ballot("Alice", "voter-1", &public_key).unwrap();
        let ballot = decrypt_ballot(&envelope, &private_key).unwrap();
        assert_eq!(
            ballot,
            DecodedBallot {
                voter: "voter-1".to_string(),
                candidate: "Alice".to_string(),
            }
        );
    }

    #[test]
    fn encryption_is_randomised() {
        let (public_key, _) = keys();
        let first = encrypt_ballot("Alice", "voter-1", &public_key).unwrap();
        let second = encrypt_ballot("Alice", "voter-1", &public_key).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn empty_fields_are_rejected() {
        let (public_key, _) = keys();
        assert!(matches!(
            encrypt_ballot("", "voter-1", &public_key),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            encrypt_ballot("Alice", "", &public_key),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let (public_key, _) = keys();
        let other = KeyringManager::new(TEST_KEY_BITS).generate_key_pair().unwrap();
        let other_private = import_private_key(&other.private_key).unwrap();
        let envelope = encrypt_ballot("Alice", "voter-1", &public_key).unwrap();
        assert_eq!(
            decrypt_ballot(&envelope, &other_private),
            Err(BallotError::DecryptionFailed)
        );
    }

    #[test]
    fn corrupted_envelopes_fail_decryption() {
        let (public_key, private_key) = keys();
        let envelope = encrypt_ballot("Alice", "voter-1", &public_key).unwrap();

        // Flip a bit in the GCM ciphertext.
        let mut tampered = envelope.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert_eq!(
            decrypt_ballot(&tampered, &private_key),
            Err(BallotError::DecryptionFailed)
        );

        // Truncated envelopes.
        for len in [0, 1, 2, 10, envelope.len() / 2] {
            assert_eq!(
                decrypt_ballot(&envelope[..len], &private_key),
                Err(BallotError::DecryptionFailed)
            );
        }
    }

    #[test]
    fn non_ballot_plaintext_is_malformed() {
        let (public_key, private_key) = keys();
        let plaintexts: [&[u8]; 4] = [
            b"definitely not json",
            br#"{"voter": "voter-1"}"#,
            br#"{"voter": "", "candidate": "Alice"}"#,
            br#"{"voter": "voter-1", "candidate": 7}"#,
        ];
        for plaintext in plaintexts {
            let envelope = seal(plaintext, &public_key).unwrap();
            assert!(matches!(
                decrypt_ballot(&envelope, &private_key),
                Err(BallotError::MalformedBallot(_))
            ));
        }
    }
}
