//! A simple CLI tool for reading the tally straight out of the database and
//! checking it against the latest integrity snapshot.
//! This uses the same digest implementation as the server, and is by
//! definition compatible with snapshots stored through the API.

use std::fmt::{Display, Formatter};

use clap::{Arg, ArgAction, ArgMatches, Command};

use evoting_backend::{
    ballot_box::verify_ledger,
    config::connect_mongo,
    model::{candidate::Candidate, snapshot::Verification},
    store::ElectionStore,
};

const PROGRAM_NAME: &str = "tally-cli";

const ABOUT_TEXT: &str = "Print the tally of an election and check it against the latest stored digest.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed or no digest was stored.
 Other: Error.";

const DB_URI: &str = "DB_URI";
const DB_NAME: &str = "DB_NAME";
const TIMEOUT: &str = "TIMEOUT";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(DB_URI)
                .help("MongoDB connection string")
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(DB_NAME)
                .help("Name of the election database")
                .long("db-name")
                .action(ArgAction::Set)
                .default_value("evoting"),
        )
        .arg(
            Arg::new(TIMEOUT)
                .help("Seconds to wait for the database")
                .long("timeout")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(u64))
                .default_value("5"),
        )
}

/// One line of the printed tally.
struct TallyLine<'a>(&'a Candidate);

impl Display for TallyLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let count = self.0.vote_count;
        write!(
            f,
            "{}: {} vote{}",
            self.0.name,
            count,
            if count != 1 { "s" } else { "" }
        )
    }
}

/// Describe a verification outcome for humans.
fn describe(verification: &Verification) -> String {
    match &verification.stored_digest {
        None => "No digest has been stored yet.".to_string(),
        Some(stored) if verification.verified => {
            format!("Ledger matches stored digest {stored}.")
        }
        Some(stored) => format!(
            "Ledger digest {} does not match stored digest {stored}.",
            verification.computed_digest
        ),
    }
}

/// Connect, print the tally, and verify.
async fn tally_and_verify(
    db_uri: &str,
    db_name: &str,
    timeout: u64,
) -> evoting_backend::error::Result<(Vec<Candidate>, Verification)> {
    let store = connect_mongo(db_uri, db_name, timeout).await?;
    let candidates = store.candidates().await?;
    let verification = verify_ledger(&store).await?;
    Ok((candidates, verification))
}

/// Run the tool, report the result, and return the exit code.
async fn run(args: &ArgMatches) -> u8 {
    // Required and defaulted arguments are guaranteed to be present.
    let db_uri: &String = args.get_one(DB_URI).unwrap();
    let db_name: &String = args.get_one(DB_NAME).unwrap();
    let timeout: u64 = *args.get_one(TIMEOUT).unwrap();

    match tally_and_verify(db_uri, db_name, timeout).await {
        Ok((candidates, verification)) => {
            if candidates.is_empty() {
                println!("No candidates.");
            }
            for candidate in &candidates {
                println!("{}", TallyLine(candidate));
            }
            println!("{}", describe(&verification));
            if verification.verified {
                0
            } else {
                255
            }
        }
        Err(err) => {
            println!("Error: {err}");
            1
        }
    }
}

#[rocket::main]
async fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args).await;
    std::process::exit(exit_code.into())
}
