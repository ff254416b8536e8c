//! voteshare: standalone relay host
//!
//! Runs one relay outside a game server, for testing a deployment or
//! bridging votes from another source.
//!
//! ## Architecture
//! ```text
//! BROADCAST:  stdin (NDJSON votes) --> [buffer] --(timer)--> PUBLISH voteshare
//! RECEIVER:   SUBSCRIBE voteshare --> [decode] --> log
//! ```
//!
//! ## Configuration
//! - First argument: path to a YAML config file (optional)
//! - VOTESHARE_CONFIG: path to a YAML config file (optional)
//! - VOTESHARE_*: overrides, e.g. VOTESHARE_MODE=BROADCAST, VOTESHARE_REDIS__HOST
//! - VOTESHARE_LOG: tracing filter (default: info)
//!
//! In BROADCAST mode each stdin line is a JSON object with `service_name`,
//! `timestamp`, `username` and `address`. EOF flushes what is buffered and
//! exits; Ctrl+C exits in either mode.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use voteshare::config::Config;
use voteshare::dispatch::LogDispatcher;
use voteshare::relay::VoteRelay;
use voteshare::services::VoteArrivalHook;
use voteshare::utils::bootstrap::init_tracing;
use voteshare::Vote;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let relay = VoteRelay::start(&config, Arc::new(LogDispatcher))?;

    match relay.arrival_hook() {
        Some(hook) => {
            info!("Reading votes from stdin, press Ctrl+C to exit");
            tokio::select! {
                result = read_votes(hook) => {
                    result?;
                    if let Some(producer) = relay.broadcast() {
                        if let Err(e) = producer.flush().await {
                            error!(error = %e, "Final flush failed");
                        }
                    }
                }
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => {
            info!("Relay running, press Ctrl+C to exit");
            tokio::signal::ctrl_c().await?;
        }
    }

    relay.stop().await;
    Ok(())
}

/// Feed newline-delimited JSON votes from stdin into the producer until EOF.
async fn read_votes(hook: VoteArrivalHook) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Vote>(line) {
            Ok(vote) => {
                hook.on_vote(vote);
            }
            Err(e) => warn!(error = %e, "Skipping unparseable vote line"),
        }
    }
    Ok(())
}
