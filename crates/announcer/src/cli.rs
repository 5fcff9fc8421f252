use std::path::PathBuf;

use clap::Parser;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

/// Report the current track to an RDS or Prostream encoder.
///
/// Every option may also be given in the `--config` TOML file; flags win.
#[derive(Parser, Debug, Default)]
#[command(name = "announcer", version = VERSION)]
pub struct Args {
    /// Encoder protocol: `rds` (TCP) or `prostream` (UDP)
    #[arg(long)]
    pub protocol: Option<String>,

    /// Encoder IP address or hostname
    #[arg(long)]
    pub host: Option<String>,

    /// Encoder port (Prostream defaults to 9000)
    #[arg(long)]
    pub port: Option<u16>,

    /// URL of the playlist service's current-track endpoint
    #[arg(long, alias = "chirp")]
    pub source_url: Option<String>,

    /// Tag requests to the playlist service with `src=<TAG>`
    #[arg(long)]
    pub source_tag: Option<String>,

    /// Announce once and exit
    #[arg(long)]
    pub run_once: bool,

    /// Seconds between announcements in continuous mode
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Bound for the playlist request and encoder connect/write, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// How long to wait for the RDS encoder's reply, in milliseconds
    #[arg(long)]
    pub response_timeout_ms: Option<u64>,

    /// Fetch and format, but send nothing to the encoder
    #[arg(long, alias = "test")]
    pub dry_run: bool,

    /// Log at debug level
    #[arg(long, short)]
    pub verbose: bool,

    /// TOML file with default settings
    #[arg(long)]
    pub config: Option<PathBuf>,
}
