//! Building and verifying the linking values of an election ledger.
//!
//! Links are signatures, not hashes: every block's linking value is the election
//! key's signature over that block's content, its predecessor's linking value and
//! its timestamp. The genesis block has no predecessor and signs only its content
//! (the election public key) and timestamp.

use data_encoding::BASE64URL_NOPAD;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::crypto::keyring::{self, import_public_key};
use crate::error::{ChainError, Result};
use crate::model::{
    common::ledger::{LedgerId, TERMINUS_MARKER},
    db::block::Block,
};

/// Encode a timestamp for inclusion in a signed payload.
fn encode_timestamp(timestamp: i64) -> String {
    BASE64URL_NOPAD.encode(timestamp.to_string().as_bytes())
}

fn genesis_payload(content: &str, timestamp: i64) -> String {
    format!("{content}{}", encode_timestamp(timestamp))
}

fn link_payload(content: &str, previous_linking_value: &str, timestamp: i64) -> String {
    format!(
        "{content}{previous_linking_value}{}",
        encode_timestamp(timestamp)
    )
}

/// Build block 0 of a ledger, carrying the election's exported public key.
pub fn build_genesis(
    ledger_id: &LedgerId,
    public_key: &str,
    private_key: &RsaPrivateKey,
    timestamp: i64,
) -> Result<Block> {
    let linking_value = keyring::sign(
        genesis_payload(public_key, timestamp).as_bytes(),
        private_key,
    )?;
    Ok(Block {
        ledger_id: ledger_id.clone(),
        sequence: 0,
        content: public_key.to_string(),
        timestamp,
        linking_value,
    })
}

/// Build the block that follows `previous`.
pub fn build_next(
    content: String,
    previous: &Block,
    timestamp: i64,
    private_key: &RsaPrivateKey,
) -> Result<Block> {
    let linking_value = keyring::sign(
        link_payload(&content, &previous.linking_value, timestamp).as_bytes(),
        private_key,
    )?;
    Ok(Block {
        ledger_id: previous.ledger_id.clone(),
        sequence: previous.sequence + 1,
        content,
        timestamp,
        linking_value,
    })
}

/// Build the block that seals the ledger after `previous`.
pub fn build_terminus(
    previous: &Block,
    timestamp: i64,
    private_key: &RsaPrivateKey,
) -> Result<Block> {
    build_next(TERMINUS_MARKER.to_string(), previous, timestamp, private_key)
}

/// Check every link of a ledger against the election's public key.
///
/// Fails at the first block that is out of sequence, fails to verify, or (for
/// block 0) does not carry the given public key.
pub fn verify_chain(blocks: &[Block], public_key: &RsaPublicKey) -> std::result::Result<(), ChainError> {
    if blocks.is_empty() {
        return Err(ChainError::BrokenLink(0));
    }
    let mut previous: Option<&Block> = None;
    for (position, block) in (0u64..).zip(blocks) {
        if block.sequence != position {
            return Err(ChainError::BrokenLink(position));
        }
        let payload = match previous {
            None => {
                let carries_key = import_public_key(&block.content)
                    .map(|key| &key == public_key)
                    .unwrap_or(false);
                if !carries_key {
                    return Err(ChainError::BrokenLink(position));
                }
                genesis_payload(&block.content, block.timestamp)
            }
            Some(previous) => {
                link_payload(&block.content, &previous.linking_value, block.timestamp)
            }
        };
        if !keyring::verify(payload.as_bytes(), &block.linking_value, public_key) {
            return Err(ChainError::BrokenLink(position));
        }
        previous = Some(block);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::crypto::keyring::{import_private_key, ledger_id_for};
    use crate::testing::test_keys;

    /// A genesis block, two ballots and a terminus.
    fn sealed_chain() -> (Vec<Block>, RsaPublicKey) {
        let keys = test_keys();
        let public_key = import_public_key(&keys.public_key).unwrap();
        let private_key = import_private_key(&keys.private_key).unwrap();
        let ledger_id = ledger_id_for(&keys.public_key).unwrap();

        let genesis = build_genesis(&ledger_id, &keys.public_key, &private_key, 1_000).unwrap();
        let first = build_next("YmFsbG90MQ".to_string(), &genesis, 2_000, &private_key).unwrap();
        let second = build_next("YmFsbG90Mg".to_string(), &first, 3_000, &private_key).unwrap();
        let terminus = build_terminus(&second, 4_000, &private_key).unwrap();
        (vec![genesis, first, second, terminus], public_key)
    }

    #[test]
    fn built_chains_verify() {
        let (blocks, public_key) = sealed_chain();
        let sequences: Vec<_> = blocks.iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert!(blocks[0].is_genesis());
        assert!(blocks[3].is_terminus());
        assert!(blocks.iter().all(|b| b.ledger_id == blocks[0].ledger_id));
        assert_eq!(verify_chain(&blocks, &public_key), Ok(()));
    }

    #[test]
    fn tampered_content_breaks_link() {
        let (mut blocks, public_key) = sealed_chain();
        blocks[2].content = "dGFtcGVyZWQ".to_string();
        assert_eq!(
            verify_chain(&blocks, &public_key),
            Err(ChainError::BrokenLink(2))
        );
    }

    #[test]
    fn tampered_timestamp_breaks_link() {
        let (mut blocks, public_key) = sealed_chain();
        blocks[1].timestamp += 1;
        assert_eq!(
            verify_chain(&blocks, &public_key),
            Err(ChainError::BrokenLink(1))
        );
    }

    #[test]
    fn tampered_predecessor_breaks_next_link() {
        let (mut blocks, public_key) = sealed_chain();
        // Replacing a linking value invalidates the block itself first.
        blocks[1].linking_value = blocks[2].linking_value.clone();
        assert_eq!(
            verify_chain(&blocks, &public_key),
            Err(ChainError::BrokenLink(1))
        );
    }

    #[test]
    fn removed_block_is_detected() {
        let (mut blocks, public_key) = sealed_chain();
        blocks.remove(1);
        assert_eq!(
            verify_chain(&blocks, &public_key),
            Err(ChainError::BrokenLink(1))
        );
    }

    #[test]
    fn reordered_blocks_are_detected() {
        let (mut blocks, public_key) = sealed_chain();
        blocks.swap(1, 2);
        assert_eq!(
            verify_chain(&blocks, &public_key),
            Err(ChainError::BrokenLink(1))
        );
    }

    #[test]
    fn genesis_must_carry_election_key() {
        let (mut blocks, public_key) = sealed_chain();
        blocks[0].content = "c29tZXRoaW5nIGVsc2U".to_string();
        assert_eq!(
            verify_chain(&blocks, &public_key),
            Err(ChainError::BrokenLink(0))
        );
    }

    #[test]
    fn empty_chain_is_broken() {
        let (_, public_key) = sealed_chain();
        assert_eq!(
            verify_chain(&[], &public_key),
            Err(ChainError::BrokenLink(0))
        );
    }
}
