//! Failure kinds for a single announcement cycle.
//!
//! Every variant is terminal for the cycle that produced it; nothing here is
//! retried. Encoder rejections are not errors: see
//! [`announcer_proto::DeliveryResult::Rejected`].

use std::io;

pub use announcer_proto::UnsupportedProtocol;

/// The playlist service could not produce a current track.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("playlist request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: ureq::Error,
    },

    #[error("playlist request to {url} timed out")]
    Timeout { url: String },

    #[error("playlist service at {url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("read playlist response body: {0}")]
    Body(#[source] ureq::Error),

    #[error("playlist response is not a track document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    pub(crate) fn from_request(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => FetchError::Timeout {
                url: url.to_string(),
            },
            ureq::Error::Io(ref e) if is_timeout(e.kind()) => FetchError::Timeout {
                url: url.to_string(),
            },
            source => FetchError::Request {
                url: url.to_string(),
                source,
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

/// The announcement could not be handed to the encoder.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("{addr} did not resolve to any address")]
    NoAddress { addr: String },

    #[error("connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("write announcement to {addr}: {source}")]
    Write {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("read encoder reply from {addr}: {source}")]
    Read {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("send datagram to {addr}: {source}")]
    Send {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("{op} on {addr} timed out")]
    Timeout { op: &'static str, addr: String },
}

impl DeliveryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeliveryError::Timeout { .. })
    }
}

/// Socket timeouts surface as `TimedOut` or `WouldBlock` depending on platform.
pub(crate) fn is_timeout(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeouts_map_to_fetch_timeout() {
        let err = ureq::Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        let err = FetchError::from_request("http://playlist.test/", err);
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "playlist request to http://playlist.test/ timed out");
    }

    #[test]
    fn other_io_errors_stay_request_errors() {
        let err = ureq::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        let err = FetchError::from_request("http://playlist.test/", err);
        assert!(matches!(err, FetchError::Request { .. }));
    }

    #[test]
    fn would_block_counts_as_timeout() {
        assert!(is_timeout(io::ErrorKind::WouldBlock));
        assert!(is_timeout(io::ErrorKind::TimedOut));
        assert!(!is_timeout(io::ErrorKind::ConnectionReset));
    }

    #[test]
    fn delivery_timeout_names_operation() {
        let err = DeliveryError::Timeout {
            op: "connect",
            addr: "rds.local:5000".to_string(),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "connect on rds.local:5000 timed out");
    }
}
