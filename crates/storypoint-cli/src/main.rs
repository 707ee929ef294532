//! storypoint binary
//!
//! Replays recorded room traffic through the reconciler and prints the
//! resulting view. Useful for checking what a client would have shown after
//! a captured push stream.
//!
//! ## Usage
//!
//! ```bash
//! # Bootstrap snapshot + one push envelope per line
//! storypoint replay --bootstrap room.json --events push.jsonl --user amy
//!
//! # Seed the active story's votes first
//! storypoint replay --bootstrap room.json --votes votes.json --events push.jsonl
//!
//! # Print a deck
//! storypoint deck modified-fibonacci
//! ```
//!
//! Without `--config`, `storypoint.toml` in the working directory is read if
//! present.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use storypoint_client::{ClientConfig, Room, ServerEvent, SessionBootstrap};
use storypoint_types::{DeckKind, SessionId, Username, Vote};

const DEFAULT_CONFIG: &str = "storypoint.toml";

/// Planning-poker room tooling.
#[derive(Parser, Debug)]
#[command(name = "storypoint")]
#[command(about = "Replay recorded storypoint room traffic")]
struct Args {
    /// Client config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a recorded push stream to a bootstrapped room and print the view
    Replay {
        /// Session bootstrap snapshot (JSON)
        #[arg(long)]
        bootstrap: PathBuf,

        /// Push envelopes, one JSON object per line
        #[arg(long)]
        events: PathBuf,

        /// Votes of the first story, as a JSON array
        #[arg(long)]
        votes: Option<PathBuf>,

        /// Local username (defaults to `client.username` from the config)
        #[arg(long)]
        user: Option<String>,
    },
    /// Print the cards of a deck
    Deck {
        /// time, fibonacci, or modified-fibonacci
        kind: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::load_or_default(DEFAULT_CONFIG)?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Command::Replay { bootstrap, events, votes, user } => {
            let user = user
                .map(Username::from)
                .or(config.client.username)
                .ok_or_else(|| anyhow!("no user: pass --user or set client.username"))?;
            let session = config.client.session_id;
            cmd_replay(&bootstrap, &events, votes.as_deref(), user, session.as_ref())
        }
        Command::Deck { kind } => cmd_deck(&kind),
    }
}

fn cmd_replay(
    bootstrap: &Path,
    events: &Path,
    votes: Option<&Path>,
    user: Username,
    session: Option<&SessionId>,
) -> Result<()> {
    let snapshot: SessionBootstrap = read_json(bootstrap)?;
    check_session(&snapshot, session)?;
    let mut room = Room::bootstrap(snapshot, user)?;

    if let (Some(path), Some(fetch)) = (votes, room.initial_fetch()) {
        let votes: Vec<Vote> = read_json(path)?;
        room.complete_vote_fetch(fetch, Ok(votes));
    }

    let log = fs::read_to_string(events)
        .with_context(|| format!("failed to read {}", events.display()))?;
    let stats = replay(&mut room, &log);
    info!(
        "replayed {} events: {} applied, {} skipped, {} unknown, {} malformed",
        stats.total(),
        stats.applied,
        stats.skipped,
        stats.unknown,
        stats.malformed
    );

    println!("{}", serde_json::to_string_pretty(&room.view())?);
    Ok(())
}

fn cmd_deck(kind: &str) -> Result<()> {
    let Ok(deck) = kind.parse::<DeckKind>() else {
        bail!("unknown deck {kind:?} (expected time, fibonacci, or modified-fibonacci)");
    };
    for card in deck.cards() {
        println!("{:>4}  {:<6} {}", card.id.as_str(), card.label(), card.color);
    }
    Ok(())
}

/// Refuse a snapshot of a room other than the configured one.
fn check_session(snapshot: &SessionBootstrap, expected: Option<&SessionId>) -> Result<()> {
    match expected {
        Some(expected) if *expected != snapshot.session.session_id => bail!(
            "bootstrap is for session {}, config expects {}",
            snapshot.session.session_id,
            expected
        ),
        _ => Ok(()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Counts from one replay.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReplayStats {
    applied: usize,
    skipped: usize,
    /// Event types this client does not know.
    unknown: usize,
    malformed: usize,
}

impl ReplayStats {
    fn total(&self) -> usize {
        self.applied + self.skipped + self.unknown + self.malformed
    }
}

/// Apply every line of a JSON-lines push log. Blank lines are ignored.
fn replay(room: &mut Room, log: &str) -> ReplayStats {
    let mut stats = ReplayStats::default();
    for (n, line) in log.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match ServerEvent::decode(line) {
            Ok(Some(event)) => {
                if room.apply(&event).is_applied() {
                    stats.applied += 1;
                } else {
                    stats.skipped += 1;
                }
            }
            Ok(None) => stats.unknown += 1,
            Err(e) => {
                warn!("line {}: {}", n + 1, e);
                stats.malformed += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BOOTSTRAP: &str = r#"{
        "session": {"sessionId": "room", "sprintName": "Sprint 12", "cardSet": "fibonacci"},
        "users": [{"username": "A"}, {"username": "B"}],
        "stories": [{"storyId": "S1", "sessionId": "room", "storyName": "Login", "order": 1}]
    }"#;

    fn room() -> Room {
        let snapshot: SessionBootstrap = serde_json::from_str(BOOTSTRAP).unwrap();
        Room::bootstrap(snapshot, Username::from("A")).unwrap()
    }

    #[test]
    fn test_replay_counts() {
        let log = r#"
{"type":"VOTE_ADDED","data":{"voteId":"v1","sessionId":"room","storyId":"S1","username":"B","value":"5"}}
{"type":"VOTE_ADDED","data":{"voteId":"v1","sessionId":"room","storyId":"S1","username":"B","value":"5"}}
{"type":"SESSION_RENAMED","data":"x"}
{"type":"STORY_ENDED","data":{"storyId":"S1"}}
{"type":"STORY_ENDED","data":"S1"}
"#;
        let mut room = room();
        let stats = replay(&mut room, log);
        assert_eq!(
            stats,
            ReplayStats { applied: 2, skipped: 1, unknown: 1, malformed: 1 }
        );

        let view = room.view();
        assert!(view.active_story.unwrap().ended);
        assert_eq!(view.statistics.min, "5");
        assert_eq!(view.statistics.max, "5");
    }

    #[test]
    fn test_read_json_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("room.json");
        fs::write(&path, BOOTSTRAP).unwrap();

        let snapshot: SessionBootstrap = read_json(&path).unwrap();
        assert_eq!(snapshot.session.card_set, DeckKind::Fibonacci);
        assert_eq!(snapshot.users.len(), 2);

        let missing = read_json::<SessionBootstrap>(&dir.path().join("nope.json"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_bootstrap_of_other_session_is_refused() {
        let snapshot: SessionBootstrap = serde_json::from_str(BOOTSTRAP).unwrap();

        assert!(check_session(&snapshot, None).is_ok());
        assert!(check_session(&snapshot, Some(&SessionId::from("room"))).is_ok());
        let err = check_session(&snapshot, Some(&SessionId::from("room-42"))).unwrap_err();
        assert!(err.to_string().contains("room-42"));
    }

    #[test]
    fn test_replay_refuses_mismatched_session() {
        let dir = tempfile::tempdir().unwrap();
        let bootstrap = dir.path().join("room.json");
        let events = dir.path().join("push.jsonl");
        fs::write(&bootstrap, BOOTSTRAP).unwrap();
        fs::write(&events, "").unwrap();

        let other = SessionId::from("room-42");
        let result = cmd_replay(&bootstrap, &events, None, Username::from("A"), Some(&other));
        assert!(result.is_err());
        let own = SessionId::from("room");
        cmd_replay(&bootstrap, &events, None, Username::from("A"), Some(&own)).unwrap();
    }
}
