//! Counting the ballots of a closed election.

use std::collections::{BTreeMap, HashSet};

use data_encoding::BASE64URL_NOPAD;
use log::{debug, warn};
use rocket::tokio::task;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};

use crate::crypto::{
    ballot::{decrypt_ballot, DecodedBallot},
    keyring::ledger_id_for,
};
use crate::error::{BallotError, Error, Result};
use crate::model::{
    common::election::{short_id, CandidateId, ElectionState, VoterId},
    db::{block::Block, election::Election},
};
use crate::store::LedgerStore;

/// Final vote counts. Candidates without any counted vote are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TallyResult(BTreeMap<CandidateId, u64>);

impl TallyResult {
    /// Votes counted for the given candidate.
    pub fn votes_for(&self, candidate: &str) -> u64 {
        self.0.get(candidate).copied().unwrap_or(0)
    }

    /// Total number of counted votes.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CandidateId, &u64)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<CandidateId, u64> {
        self.0
    }
}

/// A tally in progress. Consuming it with [`TallyCollector::finish`] is the only
/// way to obtain a [`TallyResult`], so a finished tally can't be added to.
#[derive(Debug, Default)]
pub struct TallyCollector {
    voted: HashSet<VoterId>,
    counts: BTreeMap<CandidateId, u64>,
    duplicates: usize,
    skipped: usize,
}

impl TallyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a decoded ballot, unless its voter has already been counted.
    /// Returns whether the ballot was counted.
    pub fn record(&mut self, ballot: DecodedBallot) -> bool {
        if !self.voted.insert(ballot.voter) {
            self.duplicates += 1;
            return false;
        }
        *self.counts.entry(ballot.candidate).or_default() += 1;
        true
    }

    /// Note a block that could not be decoded.
    pub fn skip(&mut self, sequence: u64, err: &BallotError) {
        warn!("Skipping block {sequence} in tally: {err}");
        self.skipped += 1;
    }

    pub fn finish(self) -> TallyResult {
        debug!(
            "Tally finished: {} counted, {} duplicate, {} skipped",
            self.voted.len(),
            self.duplicates,
            self.skipped
        );
        TallyResult(self.counts)
    }
}

/// Count the ballots in a ledger, in sequence order.
///
/// The genesis and terminus blocks are not ballots and are passed over. Blocks
/// that fail to decode are skipped with a warning.
pub fn tally_blocks(blocks: &[Block], private_key: &RsaPrivateKey) -> TallyResult {
    let mut collector = TallyCollector::new();
    for block in blocks
        .iter()
        .filter(|block| !block.is_genesis() && !block.is_terminus())
    {
        let decoded = BASE64URL_NOPAD
            .decode(block.content.as_bytes())
            .map_err(|_| BallotError::DecryptionFailed)
            .and_then(|envelope| decrypt_ballot(&envelope, private_key));
        match decoded {
            Ok(ballot) => {
                collector.record(ballot);
            }
            Err(err) => collector.skip(block.sequence, &err),
        }
    }
    collector.finish()
}

/// Tallies closed elections from their stored ledgers.
pub struct TallyEngine<'a> {
    ledgers: &'a dyn LedgerStore,
}

impl<'a> TallyEngine<'a> {
    pub fn new(ledgers: &'a dyn LedgerStore) -> Self {
        Self { ledgers }
    }

    /// Tally the given election with its private key.
    ///
    /// The ledger is read afresh on every call, so repeated tallies of a closed
    /// election always agree.
    pub async fn tally(&self, election: &Election, private_key: &RsaPrivateKey) -> Result<TallyResult> {
        if election.state != ElectionState::Closed {
            return Err(Error::ElectionNotClosed(short_id(&election.id)));
        }
        let ledger_id = ledger_id_for(&election.id)?;
        let blocks = self.ledgers.read_blocks(&ledger_id).await?;

        // One RSA decryption per ballot; keep it off the async workers.
        let private_key = private_key.clone();
        task::spawn_blocking(move || tally_blocks(&blocks, &private_key))
            .await
            .map_err(Error::crypto)
    }
}
