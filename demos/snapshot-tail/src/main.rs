//! Tails the game plugin's snapshot stream, or summarizes a recorded run.
//!
//! ```text
//! snapshot-tail                                   # connect to 127.0.0.1:18475
//! snapshot-tail --host 192.168.1.20 --port 18475  # connect elsewhere
//! snapshot-tail --replay runs/                    # newest capture in a directory
//! snapshot-tail --replay run.jsonl                # a specific capture
//! ```
//!
//! Set `RUST_LOG=gungeon_bridge=debug` to watch reconnects.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use gungeon_bridge::DEFAULT_PORT;
use gungeon_bridge::prelude::*;
use gungeon_bridge::protocol::recording::{self, Record};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type Error = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "snapshot-tail")]
#[command(about = "Tail the Gungeon plugin's snapshot stream, or summarize a capture")]
#[command(version)]
struct Cli {
    /// Host the game plugin listens on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port the game plugin listens on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Summarize a `.jsonl` capture (or the newest one in a directory)
    /// instead of connecting
    #[arg(long, value_name = "PATH", conflicts_with_all = ["host", "port"])]
    replay: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Live
// ---------------------------------------------------------------------------

async fn tail(config: BridgeConfig) -> Result<(), Error> {
    let bridge = Arc::new(Bridge::new(config));
    bridge.start()?;

    let stop = Arc::new(AtomicBool::new(false));
    let consumer = {
        let bridge = Arc::clone(&bridge);
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || {
            while !stop.load(Ordering::Relaxed) {
                let Some(snapshot) = bridge.latest_snapshot(Some(Duration::from_millis(500)))
                else {
                    continue;
                };
                info!(
                    sequence = snapshot.sequence(),
                    realtime = snapshot.captured_at(),
                    level = snapshot.level_name().unwrap_or("?"),
                    health = ?snapshot.health(),
                    enemies = snapshot.enemies().len(),
                    projectiles = snapshot.projectiles().len(),
                    "snapshot"
                );
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    stop.store(true, Ordering::Relaxed);
    consumer.await?;
    bridge.close();

    let m = bridge.metrics();
    info!(
        snapshots = m.snapshots,
        dropped = m.dropped,
        malformed = m.malformed_frames,
        reconnects = m.disconnects,
        "bridge stopped"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

fn replay(path: &Path) -> Result<(), Error> {
    let file = if path.is_dir() {
        recording::latest_recording(path)?.ok_or("no .jsonl captures in directory")?
    } else {
        path.to_path_buf()
    };
    info!(file = %file.display(), "reading capture");

    let mut reader = recording::open_recording(&file)?;
    let records = reader.by_ref().collect::<Result<Vec<Record>, _>>()?;
    if reader.skipped() > 0 {
        warn!(skipped = reader.skipped(), "skipped unreadable lines");
    }

    let markers = records
        .iter()
        .filter(|r| matches!(r, Record::Marker(_)))
        .count();
    info!(records = records.len(), markers, "capture loaded");

    for (level, points) in recording::paths_by_level(&records) {
        info!(
            level = %level,
            points = points.len(),
            start = ?points.first(),
            end = ?points.last(),
            "level path"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.replay {
        Some(path) => replay(&path),
        None => tail(BridgeConfig::with_addr(cli.host, cli.port)).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_point_at_local_plugin() {
        let cli = Cli::try_parse_from(["snapshot-tail"]).unwrap();
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, DEFAULT_PORT);
        assert!(cli.replay.is_none());
    }

    #[test]
    fn test_host_and_port() {
        let cli =
            Cli::try_parse_from(["snapshot-tail", "--host", "192.168.1.20", "-p", "20000"])
                .unwrap();
        assert_eq!(cli.host, "192.168.1.20");
        assert_eq!(cli.port, 20000);
    }

    #[test]
    fn test_help_is_not_an_address() {
        let err = Cli::try_parse_from(["snapshot-tail", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_replay_requires_path() {
        let err = Cli::try_parse_from(["snapshot-tail", "--replay"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);

        let cli = Cli::try_parse_from(["snapshot-tail", "--replay", "runs/"]).unwrap();
        assert_eq!(cli.replay, Some(PathBuf::from("runs/")));
    }

    #[test]
    fn test_replay_conflicts_with_address() {
        let err = Cli::try_parse_from(["snapshot-tail", "--replay", "run.jsonl", "--port", "1"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }
}
