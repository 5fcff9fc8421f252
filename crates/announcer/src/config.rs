//! Announcer configuration.
//!
//! Settings come from CLI flags and an optional TOML file; [`resolve`] merges
//! them once at startup into an immutable [`AnnouncerConfig`].

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Args;
use announcer_proto::Protocol;

/// Prostream's default metadata port.
pub const DEFAULT_PROSTREAM_PORT: u16 = 9000;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Encoder endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Fully resolved settings, fixed for the process lifetime.
#[derive(Clone, Debug)]
pub struct AnnouncerConfig {
    pub protocol: Protocol,
    pub target: Target,
    /// Playlist service endpoint.
    pub source_url: String,
    /// Optional `src=` query tag for the playlist request.
    pub source_tag: Option<String>,
    pub run_once: bool,
    /// Pause between cycles in continuous mode.
    pub interval: Duration,
    /// Bound for the playlist request and for encoder connect/write/send.
    pub network_timeout: Duration,
    /// Bound for collecting the RDS encoder's reply.
    pub response_timeout: Duration,
    /// Skip transmission; log the announcement instead.
    pub dry_run: bool,
}

impl AnnouncerConfig {
    /// Config with default timing for the given endpoint and source.
    pub fn new(
        protocol: Protocol,
        host: impl Into<String>,
        port: u16,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            target: Target {
                host: host.into(),
                port,
            },
            source_url: source_url.into(),
            source_tag: None,
            run_once: false,
            interval: DEFAULT_INTERVAL,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            dry_run: false,
        }
    }
}

/// Settings file, all keys optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub source_url: Option<String>,
    pub source_tag: Option<String>,
    pub run_once: Option<bool>,
    pub interval_secs: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub response_timeout_ms: Option<u64>,
    pub dry_run: Option<bool>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<FileConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Merge CLI flags over the optional file and validate the result.
pub fn resolve(args: &Args, file: Option<FileConfig>) -> Result<AnnouncerConfig> {
    let file = file.unwrap_or_default();

    let protocol_name = args
        .protocol
        .clone()
        .or(file.protocol)
        .ok_or_else(|| {
            anyhow::anyhow!("an encoder protocol is required (--protocol rds|prostream)")
        })?;
    let protocol: Protocol = protocol_name.parse()?;

    let host = non_empty(args.host.clone().or(file.host)).ok_or_else(|| {
        anyhow::anyhow!("you need to specify the address of the {protocol} encoder (--host)")
    })?;
    let source_url = non_empty(args.source_url.clone().or(file.source_url)).ok_or_else(|| {
        anyhow::anyhow!("you need to specify a playlist service URL (--source-url)")
    })?;

    let port = match (args.port.or(file.port), protocol) {
        (Some(port), _) => port,
        (None, Protocol::Prostream) => DEFAULT_PROSTREAM_PORT,
        (None, Protocol::Rds) => anyhow::bail!("the rds encoder port is required (--port)"),
    };

    let mut config = AnnouncerConfig::new(protocol, host, port, source_url);
    config.source_tag = non_empty(args.source_tag.clone().or(file.source_tag));
    config.run_once = args.run_once || file.run_once.unwrap_or(false);
    config.dry_run = args.dry_run || file.dry_run.unwrap_or(false);
    if let Some(secs) = args.interval_secs.or(file.interval_secs) {
        if secs == 0 {
            anyhow::bail!("interval_secs must be greater than zero");
        }
        config.interval = Duration::from_secs(secs);
    }
    if let Some(ms) = args.timeout_ms.or(file.timeout_ms) {
        config.network_timeout = positive_millis(ms, "timeout_ms")?;
    }
    if let Some(ms) = args.response_timeout_ms.or(file.response_timeout_ms) {
        config.response_timeout = positive_millis(ms, "response_timeout_ms")?;
    }
    Ok(config)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Socket timeouts of zero are rejected by the OS, so refuse them up front.
fn positive_millis(ms: u64, key: &str) -> Result<Duration> {
    if ms == 0 {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}
