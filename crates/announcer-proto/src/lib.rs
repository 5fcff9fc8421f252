//! Wire formats shared by the announcer and its tests.
//!
//! Two downstream encoders are supported:
//! - RDS: one `DPS='...'` line per TCP connection. The encoder may answer with a
//!   short acknowledgement; the literal `NO` means it refused the text.
//! - Prostream: one `t=... | u=...` line per UDP datagram, never answered.
//!
//! Everything in this crate is pure: no sockets, no clocks.

use std::fmt;
use std::str::FromStr;

/// Station name appended to RDS dynamic PS text.
pub const STATION_NAME: &str = "CHIRP Radio";

/// Station URL carried in the Prostream `u=` field.
pub const STATION_URL: &str = "http://www.chirpradio.org";

/// Negative acknowledgement sent by the RDS encoder.
pub const RDS_REJECTION_TOKEN: &[u8] = b"NO";

/// Downstream encoder protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Radio Data System encoder over a TCP stream.
    Rds,
    /// Prostream metadata relay over UDP.
    Prostream,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Rds, Protocol::Prostream];

    /// Lowercase protocol name as accepted by [`Protocol::from_str`].
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Rds => "rds",
            Protocol::Prostream => "prostream",
        }
    }

    /// Whether the encoder answers on the same connection.
    pub fn expects_response(self) -> bool {
        match self {
            Protocol::Rds => true,
            Protocol::Prostream => false,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A protocol name the announcer has no formatter for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported protocol {0:?} (expected one of: rds, prostream)")]
pub struct UnsupportedProtocol(pub String);

impl FromStr for Protocol {
    type Err = UnsupportedProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Protocol::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnsupportedProtocol(name.to_string()))
    }
}

/// Currently playing track as reported by the playlist service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub artist: String,
}

impl Track {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

/// Render the announcement line for `protocol`, terminator included.
pub fn format_announcement(track: &Track, protocol: Protocol) -> String {
    match protocol {
        Protocol::Rds => format_rds(track),
        Protocol::Prostream => format_prostream(track),
    }
}

/// `DPS='<title>' by <artist> on CHIRP Radio\n`
///
/// Title and artist are inserted verbatim. A `'` inside the title ends the
/// quoted DPS value early on the encoder side; nothing is escaped here.
pub fn format_rds(track: &Track) -> String {
    format!(
        "DPS='{}' by {} on {STATION_NAME}\n",
        track.title, track.artist
    )
}

/// `t=<title> - <artist> | u=http://www.chirpradio.org\r\n`
pub fn format_prostream(track: &Track) -> String {
    format!("t={} - {} | u={STATION_URL}\r\n", track.title, track.artist)
}

/// Text reported when the RDS encoder refuses an announcement.
pub fn rejection_message(payload: &str) -> String {
    format!("The RDS Encoder did not like the input {payload}")
}

/// Interpretation of whatever an encoder sent back on a stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Peer closed (or went quiet) without sending anything.
    NoResponse,
    /// Peer answered with something other than the rejection token.
    Accepted(Vec<u8>),
    /// Peer answered with the rejection token.
    Rejected(Vec<u8>),
}

impl DeliveryResult {
    /// Classify raw response bytes. Trailing line terminators and spaces are
    /// ignored when comparing against [`RDS_REJECTION_TOKEN`].
    pub fn classify(response: &[u8]) -> Self {
        if response.is_empty() {
            DeliveryResult::NoResponse
        } else if response.trim_ascii_end() == RDS_REJECTION_TOKEN {
            DeliveryResult::Rejected(response.to_vec())
        } else {
            DeliveryResult::Accepted(response.to_vec())
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, DeliveryResult::Rejected(_))
    }

    /// Fold into the outcome reported for `payload`.
    pub fn outcome(&self, payload: &str) -> DeliveryOutcome {
        if self.is_rejected() {
            DeliveryOutcome {
                succeeded: false,
                rejection_reason: Some(rejection_message(payload)),
            }
        } else {
            DeliveryOutcome::delivered()
        }
    }
}

/// Final verdict for one announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub succeeded: bool,
    pub rejection_reason: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered() -> Self {
        Self {
            succeeded: true,
            rejection_reason: None,
        }
    }
}
