//! A simple CLI tool for verifying election ledgers offline.
//! This uses the server's own chain verification and tally code, and is by definition
//! compatible with the output of our ledger endpoint.

use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;
use rsa::RsaPublicKey;

use ballotchain_backend::{
    crypto::keyring::{import_private_key, import_public_key, ledger_id_for},
    error::ChainError,
    ledger::verify_chain,
    model::api::ledger::LedgerDump,
    tally::{tally_blocks, TallyResult},
};

const PROGRAM_NAME: &str = "verify-ballotchain";

const ABOUT_TEXT: &str = "Verify the integrity of an election ledger, and optionally recount it.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const LEDGER_PATH: &str = "LEDGER_PATH";

const LEDGER_PATH_HELP: &str = "The path to a JSON dump of an election ledger,\n\
as returned by `GET /elections/<election_id>/ledger`";

const PRIVATE_KEY: &str = "PRIVATE_KEY";

const PRIVATE_KEY_HELP: &str = "The path to a file holding the election's private key,\n\
exported as base64url PKCS#8 DER. If given, the sealed ledger is also tallied.";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(LEDGER_PATH)
                .help(LEDGER_PATH_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(PRIVATE_KEY)
                .long("private-key")
                .short('k')
                .help(PRIVATE_KEY_HELP)
                .action(ArgAction::Set),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump or the key.
    Format(String),
    /// The ledger has no terminus block, so the election isn't over.
    NotSealed,
    /// Verification failed due to the contained reason.
    Verification(Failure),
}

/// Why a ledger failed verification.
#[derive(Debug, Eq, PartialEq)]
enum Failure {
    /// The ledger ID doesn't belong to the election key.
    LedgerId,
    /// A block claims to belong to another ledger.
    ForeignBlock(u64),
    /// The chain is broken.
    Chain(ChainError),
    /// The private key doesn't belong to the election key.
    WrongKey,
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LedgerId => write!(f, "The ledger ID was not derived from the election key."),
            Self::ForeignBlock(sequence) => {
                write!(f, "Block {sequence} belongs to a different ledger.")
            }
            Self::Chain(ChainError::BrokenLink(sequence)) => {
                write!(f, "The chain is broken at block {sequence}.")
            }
            Self::WrongKey => write!(f, "The private key does not belong to this election."),
        }
    }
}

/// What a successful run found.
#[derive(Debug, PartialEq)]
struct Report {
    blocks: usize,
    sealed: bool,
    tally: Option<TallyResult>,
}

/// Load a ledger dump and check it against its own election key.
fn verify_dump(path: &str) -> Result<(LedgerDump, RsaPublicKey), Error> {
    // Load the file.
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let dump: LedgerDump =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;
    let public_key =
        import_public_key(&dump.election_id).map_err(|e| Error::Format(e.to_string()))?;

    // Run verification.
    let expected_ledger_id =
        ledger_id_for(&dump.election_id).map_err(|e| Error::Format(e.to_string()))?;
    if dump.ledger_id != expected_ledger_id {
        return Err(Error::Verification(Failure::LedgerId));
    }
    if let Some(block) = dump.blocks.iter().find(|b| b.ledger_id != dump.ledger_id) {
        return Err(Error::Verification(Failure::ForeignBlock(block.sequence)));
    }
    verify_chain(&dump.blocks, &public_key)
        .map_err(|e| Error::Verification(Failure::Chain(e)))?;

    Ok((dump, public_key))
}

/// Run verification, then the tally if a private key file is given.
fn verify(path: &str, private_key_path: Option<&str>) -> Result<Report, Error> {
    let (dump, public_key) = verify_dump(path)?;
    let sealed = dump.blocks.last().map_or(false, |b| b.is_terminus());

    let tally = match private_key_path {
        None => None,
        Some(key_path) => {
            if !sealed {
                return Err(Error::NotSealed);
            }
            let encoded = fs::read_to_string(key_path).map_err(|e| Error::IO(e.to_string()))?;
            let private_key =
                import_private_key(encoded.trim()).map_err(|e| Error::Format(e.to_string()))?;
            if RsaPublicKey::from(&private_key) != public_key {
                return Err(Error::Verification(Failure::WrongKey));
            }
            Some(tally_blocks(&dump.blocks, &private_key))
        }
    };

    Ok(Report {
        blocks: dump.blocks.len(),
        sealed,
        tally,
    })
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let path: &String = args.get_one(LEDGER_PATH).unwrap(); // Required argument is guaranteed to be present.
    let private_key = args.get_one::<String>(PRIVATE_KEY).map(String::as_str);
    match verify(path, private_key) {
        Ok(report) => {
            println!(
                "Verification succeeded: {} block{}, {}.",
                report.blocks,
                if report.blocks != 1 { "s" } else { "" },
                if report.sealed {
                    "sealed"
                } else {
                    "election still running"
                }
            );
            if let Some(tally) = report.tally {
                // Most votes first, then by name.
                let mut results: Vec<_> = tally.iter().collect();
                results.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
                for (candidate, votes) in results {
                    println!(
                        "{candidate}: {votes} vote{}",
                        if *votes != 1 { "s" } else { "" }
                    );
                }
            }
            0
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {}", msg);
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid input: {}", msg);
            1
        }
        Err(Error::NotSealed) => {
            println!("The ledger is not sealed yet, so it cannot be tallied.");
            1
        }
        Err(Error::Verification(failure)) => {
            println!("Verification failed: {}", failure);
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
