use anyhow::anyhow;
use clap::Parser;
use const_format::concatcp;
use rand::seq::SliceRandom;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::fs::File;
use std::ops::AddAssign;
use std::process::{self, Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const LOCAL_PORT: u32 = 8374;
const LOCAL_URL: &str = concatcp!("http://127.0.0.1:", LOCAL_PORT);

const ADMIN_IDENTITY: &str = "0xBenchmarkAdmin";

#[rustfmt::skip]
const ROCKET_ENV: &[(&str, &str)] = &[
    ("ROCKET_PORT", concatcp!(LOCAL_PORT)),
    ("ROCKET_STORAGE", "memory"),
    ("ROCKET_ADMIN_IDENTITY", ADMIN_IDENTITY),
    ("ROCKET_IDENTITY_SECRET", "dummy"),
];

#[rustfmt::skip]
const CANDIDATES: &[&str] = &[
    "Alice",
    "Bob",
    "Carol",
    "Dave",
    "Eve",
];

#[derive(Parser)]
struct Args {
    /// Silence local server logging.
    #[arg(short, long)]
    quiet: bool,

    /// Send local server logging to this file; takes precedence over --quiet.
    #[arg(long)]
    logfile: Option<String>,

    /// Connect to a remote server at this URL instead of running a local one.
    /// The server must have no voters or candidates yet.
    #[arg(long)]
    remote: Option<String>,

    /// Admin identity of the remote server.
    #[arg(long, default_value = ADMIN_IDENTITY)]
    admin: String,

    /// How many threads to use. Defaults to the number of logical CPUs.
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// How many voters each thread registers and votes for.
    #[arg(long, default_value_t = 100)]
    voters_per_thread: usize,

    /// Store and verify a ledger digest after voting.
    #[arg(long)]
    verify: bool,
}

/// Construct a URL from segments.
macro_rules! url {
    ($($segment:expr),+) => {{
        std::path::PathBuf::from_iter([$($segment),+]).to_str().unwrap()
    }}
}

/// Attach the caller identity to a request.
fn as_identity(request: RequestBuilder, identity: &str) -> RequestBuilder {
    request.header("X-Identity", identity)
}

/// Build the server and set the environment it runs with.
fn setup_deps() -> anyhow::Result<()> {
    Command::new("cargo")
        .args(["build", "--release"])
        .status()?
        .success()
        .then_some(())
        .ok_or_else(|| anyhow!("server build exited nonzero"))?;

    for (var, val) in ROCKET_ENV {
        env::set_var(var, val);
    }

    Ok(())
}

/// Terminate the given child process. This is a SIGTERM on unix and a hard-kill on other
/// platforms.
fn terminate_child(child: &mut Child) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM)?;
    }
    #[cfg(not(unix))]
    {
        child.kill()?;
    }
    Ok(())
}

/// Launch the local server and wait until it answers.
fn launch_server(logfile: Stdio) -> anyhow::Result<Child> {
    let mut proc = Command::new("./target/release/evoting-backend")
        .stdout(logfile)
        .spawn()?;

    let client = Client::new();
    loop {
        let resp = client
            .get(url!(LOCAL_URL, "votingTime"))
            .send()
            .and_then(Response::error_for_status);
        if resp.is_ok() {
            break;
        }

        // Check the server didn't exit.
        if let Some(retcode) = proc.try_wait()? {
            return Err(anyhow!("Server exited prematurely with code {}", retcode));
        }
        thread::sleep(Duration::from_millis(50));
    }

    Ok(proc)
}

/// Add the candidates as admin.
fn setup_candidates(url: &str, admin: &str) -> anyhow::Result<()> {
    let client = Client::new();
    for name in CANDIDATES {
        as_identity(client.post(url!(url, "addCandidate")), admin)
            .json(&json!({ "name": name }))
            .send()
            .and_then(Response::error_for_status)?;
    }
    Ok(())
}

/// Open voting for an hour.
fn start_voting(url: &str, admin: &str) -> anyhow::Result<()> {
    as_identity(Client::new().post(url!(url, "startVoting")), admin)
        .json(&json!({ "duration": 3600 }))
        .send()
        .and_then(Response::error_for_status)?;
    Ok(())
}

fn voter_identity(voter_id: usize) -> String {
    format!("benchmark-device-{voter_id:08}")
}

/// Register a voter, returning how long it took.
fn register(url: &str, client: &Client, voter_id: usize) -> anyhow::Result<Duration> {
    let start = Instant::now();
    client
        .post(url!(url, "registerVoter"))
        .json(&json!({
            "identity": voter_identity(voter_id),
            "displayName": format!("Voter {voter_id}"),
        }))
        .send()
        .and_then(Response::error_for_status)?;
    Ok(start.elapsed())
}

#[derive(Deserialize)]
struct ErrorBody {
    kind: String,
}

/// Outcome of a voter trying to vote twice at once.
#[derive(Debug, Default)]
struct VoteCounts {
    accepted: usize,
    duplicates_rejected: usize,
    time: Duration,
}

impl AddAssign for VoteCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.accepted += rhs.accepted;
        self.duplicates_rejected += rhs.duplicates_rejected;
        self.time += rhs.time;
    }
}

/// Send one vote. `Ok(true)` if accepted, `Ok(false)` if rejected as a
/// repeat vote.
fn send_vote(url: &str, client: &Client, identity: &str, candidate: &str) -> anyhow::Result<bool> {
    let resp = client
        .post(url!(url, "vote"))
        .json(&json!({
            "identity": identity,
            "candidateName": candidate,
        }))
        .send()?;
    match resp.status() {
        StatusCode::OK => Ok(true),
        StatusCode::BAD_REQUEST => {
            let body: ErrorBody = resp.json()?;
            if body.kind == "AlreadyVoted" {
                Ok(false)
            } else {
                Err(anyhow!("vote rejected: {}", body.kind))
            }
        }
        status => Err(anyhow!("unexpected status {status}")),
    }
}

/// Race two votes from the same voter against each other.
fn double_vote(url: &str, client: &Client, voter_id: usize) -> anyhow::Result<VoteCounts> {
    let identity = voter_identity(voter_id);
    let mut rng = rand::thread_rng();
    let first = *CANDIDATES.choose(&mut rng).unwrap();
    let second = *CANDIDATES.choose(&mut rng).unwrap();

    let start = Instant::now();
    let (a, b) = thread::scope(|s| {
        let a = s.spawn(|| send_vote(url, client, &identity, first));
        let b = s.spawn(|| send_vote(url, client, &identity, second));
        (
            a.join().expect("thread panicked"),
            b.join().expect("thread panicked"),
        )
    });
    let time = start.elapsed();

    let outcomes = [a?, b?];
    let accepted = outcomes.iter().filter(|ok| **ok).count();
    if accepted != 1 {
        return Err(anyhow!(
            "voter {voter_id} had {accepted} votes accepted out of 2"
        ));
    }
    Ok(VoteCounts {
        accepted,
        duplicates_rejected: outcomes.len() - accepted,
        time,
    })
}

/// Run `f` for every voter, spread across `num_threads` threads, and sum the results.
fn across_threads<T, F>(num_threads: usize, per_thread: usize, f: F) -> anyhow::Result<T>
where
    T: Default + AddAssign + Send,
    F: Fn(&Client, usize) -> anyhow::Result<T> + Sync,
{
    let end_val = num_threads * per_thread;
    thread::scope(|s| {
        let f = &f;
        let mut threads = Vec::with_capacity(num_threads);
        for start in (0..end_val).step_by(per_thread) {
            threads.push(s.spawn(move || {
                let client = Client::new();
                let mut total = T::default();
                for voter_id in start..(start + per_thread) {
                    total += f(&client, voter_id)?;
                }
                Ok::<_, anyhow::Error>(total)
            }));
        }

        let mut total = T::default();
        for t in threads {
            total += t.join().expect("thread panicked")?;
        }
        Ok(total)
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateDesc {
    name: String,
    vote_count: u64,
}

/// Run the benchmark.
fn benchmark(url: &str, admin: &str, num_threads: usize, per_thread: usize) -> anyhow::Result<()> {
    let total_voters = num_threads * per_thread;

    let start = Instant::now();
    let register_time = across_threads(num_threads, per_thread, |client, voter_id| {
        register(url, client, voter_id)
    })?;
    let register_total = start.elapsed();

    start_voting(url, admin)?;

    let start = Instant::now();
    let counts = across_threads(num_threads, per_thread, |client, voter_id| {
        double_vote(url, client, voter_id)
    })?;
    let vote_total = start.elapsed();

    // Check the ledger.
    let candidates: Vec<CandidateDesc> = Client::new()
        .get(url!(url, "listCandidates"))
        .send()
        .and_then(Response::error_for_status)?
        .json()?;
    let tally: u64 = candidates.iter().map(|c| c.vote_count).sum();

    println!(
        "register: {:?} avg, {} voters in {:?} ({:.2}/s)",
        register_time / total_voters as u32,
        total_voters,
        register_total,
        total_voters as f64 / register_total.as_secs_f64()
    );
    println!(
        "vote: {:?} avg per voter, {} votes in {:?} ({:.2}/s)",
        counts.time / total_voters as u32,
        counts.accepted,
        vote_total,
        counts.accepted as f64 / vote_total.as_secs_f64()
    );
    for candidate in &candidates {
        println!("  {}: {}", candidate.name, candidate.vote_count);
    }

    if tally != total_voters as u64 {
        return Err(anyhow!("tally is {tally}, expected {total_voters}"));
    }
    if counts.duplicates_rejected != total_voters {
        return Err(anyhow!(
            "{} duplicate votes rejected, expected {total_voters}",
            counts.duplicates_rejected
        ));
    }
    println!("\nall {total_voters} duplicate votes rejected; tally matches");

    Ok(())
}

/// Return `Ok(())` if a freshly stored ledger digest verifies.
fn verify(url: &str, admin: &str) -> anyhow::Result<()> {
    let client = Client::new();
    as_identity(client.post(url!(url, "storeVoteHash")), admin)
        .send()
        .and_then(Response::error_for_status)?;

    #[derive(Deserialize)]
    struct Verification {
        verified: bool,
    }
    let Verification { verified } = client
        .get(url!(url, "verifyVotes"))
        .send()
        .and_then(Response::error_for_status)?
        .json()?;
    verified
        .then_some(())
        .ok_or_else(|| anyhow!("verification failed"))
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let url = args.remote.as_deref().unwrap_or(LOCAL_URL);

    // If we're not connecting remotely, bring up a local server.
    let mut proc: Option<Child> = None;
    if args.remote.is_none() {
        setup_deps()?;
        let logfile = match args.logfile {
            Some(path) => Stdio::from(File::create(path)?),
            None => {
                if args.quiet {
                    Stdio::null()
                } else {
                    Stdio::inherit()
                }
            }
        };
        proc = Some(launch_server(logfile)?);
    }

    // Use a closure to ensure the cleanup below runs.
    let result = (|| {
        setup_candidates(url, &args.admin)?;
        benchmark(url, &args.admin, args.threads, args.voters_per_thread)?;

        if args.verify {
            verify(url, &args.admin)?;
        }

        Ok(())
    })();

    // Kill the server.
    if let Some(p) = proc.as_mut() {
        terminate_child(p)?;
        p.wait()?;
    }

    result
}

fn main() {
    if let Err(e) = run() {
        eprintln!("FATAL: {}", e);
        process::exit(1);
    }
}
