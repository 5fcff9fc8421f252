//! Announcer: report the station's current track to a broadcast encoder.
//!
//! ## Cycle
//! 1. **Fetch**: GET the playlist service and decode the now-playing track.
//! 2. **Format**: render the protocol's line (`DPS='...'` or `t=... | u=...`).
//! 3. **Send**: TCP to an RDS encoder (reading its reply) or UDP to a Prostream.
//! 4. **Validate**: an RDS reply of `NO` is logged as a rejection.
//!
//! ## Modes
//! - `--run-once`: one cycle, then exit.
//! - default: repeat every `--interval-secs` until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use announcer::{cli, config, runtime};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    let default_filter = if args.verbose {
        "info,announcer=debug"
    } else {
        "info,announcer=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let file = args
        .config
        .as_deref()
        .map(config::FileConfig::load)
        .transpose()?;
    let config = config::resolve(&args, file)?;

    runtime::run(&config, true)
}
