//! Announcer runtime.
//!
//! Drives fetch → format → send → validate cycles, either once or on a fixed
//! interval until shutdown is requested. Shutdown is only observed between
//! cycles, so a payload is never abandoned half-written.

use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::config::AnnouncerConfig;
use crate::error::{DeliveryError, FetchError};
use crate::playlist::{PlaylistClient, TrackSource};
use crate::transport::{self, Transport, TransportResult};
use announcer_proto::{DeliveryResult, Track, format_announcement};

/// Result of one announcement cycle.
#[derive(Debug)]
pub enum CycleReport {
    /// Encoder took the announcement. `reply` is `None` for datagram targets.
    Delivered {
        track: Track,
        reply: Option<DeliveryResult>,
    },
    /// Encoder was reached but refused the announcement.
    Rejected { track: Track, reason: String },
    /// Dry run: formatted but not transmitted.
    DryRun { track: Track, announcement: String },
    FetchFailed(FetchError),
    DeliveryFailed { track: Track, error: DeliveryError },
}

impl CycleReport {
    pub fn succeeded(&self) -> bool {
        matches!(self, CycleReport::Delivered { .. } | CycleReport::DryRun { .. })
    }

    /// Emit the single log line for this cycle.
    pub fn log(&self) {
        match self {
            CycleReport::Delivered { track, reply } => {
                tracing::info!(title = %track.title, artist = %track.artist, "announced");
                if let Some(DeliveryResult::Accepted(bytes)) = reply {
                    tracing::debug!(reply = %String::from_utf8_lossy(bytes), "encoder acknowledged");
                }
            }
            CycleReport::Rejected { reason, .. } => tracing::warn!("{reason}"),
            CycleReport::DryRun { announcement, .. } => {
                tracing::info!(announcement = ?announcement, "dry run; nothing sent")
            }
            CycleReport::FetchFailed(e) => {
                tracing::error!(error = %e, timed_out = e.is_timeout(), "could not fetch the current track")
            }
            CycleReport::DeliveryFailed { track, error } => tracing::error!(
                title = %track.title,
                error = %error,
                timed_out = error.is_timeout(),
                "could not deliver announcement"
            ),
        }
    }
}

/// One pipeline bound to a config, a track source, and an encoder transport.
pub struct Announcer<'a, S, T> {
    config: &'a AnnouncerConfig,
    source: S,
    transport: T,
}

impl<'a, S: TrackSource, T: Transport> Announcer<'a, S, T> {
    pub fn new(config: &'a AnnouncerConfig, source: S, transport: T) -> Self {
        Self {
            config,
            source,
            transport,
        }
    }

    /// Run a single cycle. Exactly one fetch, and at most one send.
    pub fn run_cycle(&self) -> CycleReport {
        let track = match self.source.current_track() {
            Ok(track) => track,
            Err(e) => return CycleReport::FetchFailed(e),
        };
        let announcement = format_announcement(&track, self.config.protocol);

        if self.config.dry_run {
            return CycleReport::DryRun {
                track,
                announcement,
            };
        }

        let sent = match self.transport.send(&announcement) {
            Ok(sent) => sent,
            Err(error) => return CycleReport::DeliveryFailed { track, error },
        };
        match sent {
            TransportResult::Sent => CycleReport::Delivered { track, reply: None },
            TransportResult::Reply(bytes) => {
                let result = DeliveryResult::classify(&bytes);
                let outcome = result.outcome(&announcement);
                if outcome.succeeded {
                    CycleReport::Delivered {
                        track,
                        reply: Some(result),
                    }
                } else {
                    CycleReport::Rejected {
                        track,
                        reason: outcome.rejection_reason.unwrap_or_default(),
                    }
                }
            }
        }
    }

    /// Run cycles until done. Returns how many cycles ran.
    ///
    /// Run-once mode returns after the first cycle whatever its outcome.
    /// Otherwise a failed cycle is logged and the next one is scheduled.
    pub fn run(&self, shutdown: &Receiver<()>) -> u64 {
        let mut cycles = 0u64;
        loop {
            let report = self.run_cycle();
            report.log();
            cycles += 1;

            if self.config.run_once {
                break;
            }
            if wait_for_shutdown(shutdown, self.config.interval) {
                tracing::info!(cycles, "shutdown requested; stopping");
                break;
            }
        }
        cycles
    }
}

/// Sleep for `interval` unless shutdown arrives first.
fn wait_for_shutdown(shutdown: &Receiver<()>, interval: Duration) -> bool {
    match shutdown.recv_timeout(interval) {
        Ok(()) => true,
        Err(RecvTimeoutError::Timeout) => false,
        Err(RecvTimeoutError::Disconnected) => {
            // Nobody can signal anymore; keep pacing.
            std::thread::sleep(interval);
            false
        }
    }
}

/// Channel fed by Ctrl-C. The handler only queues the request; the runner
/// picks it up at the next cycle boundary.
pub fn install_shutdown_handler() -> Result<Receiver<()>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("install Ctrl-C handler")?;
    Ok(rx)
}

/// Announce with the real playlist client and encoder transport.
pub fn run(config: &AnnouncerConfig, install_ctrlc: bool) -> Result<()> {
    let shutdown = if install_ctrlc && !config.run_once {
        install_shutdown_handler()?
    } else {
        crossbeam_channel::never()
    };

    let source = PlaylistClient::from_config(config);
    tracing::info!(
        protocol = %config.protocol,
        target = %config.target,
        source = %source.url(),
        expects_reply = config.protocol.expects_response(),
        run_once = config.run_once,
        interval_secs = config.interval.as_secs(),
        "announcer starting"
    );

    let announcer = Announcer::new(config, source, transport::for_config(config));
    announcer.run(&shutdown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve_http_once, serve_tcp_once, serve_udp_once};
    use announcer_proto::Protocol;
    use crossbeam_channel::Sender;
    use std::cell::Cell;

    struct FixedSource {
        track: Option<Track>,
        calls: Cell<usize>,
    }

    impl FixedSource {
        fn playing(title: &str, artist: &str) -> Self {
            Self {
                track: Some(Track::new(title, artist)),
                calls: Cell::new(0),
            }
        }

        fn offline() -> Self {
            Self {
                track: None,
                calls: Cell::new(0),
            }
        }
    }

    impl TrackSource for FixedSource {
        fn current_track(&self) -> Result<Track, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.track.clone().ok_or_else(|| {
                FetchError::Decode(serde_json::from_str::<serde_json::Value>("{").unwrap_err())
            })
        }
    }

    struct RecordingTransport {
        reply: TransportResult,
        sent: std::cell::RefCell<Vec<String>>,
        stop_after: Option<(usize, Sender<()>)>,
    }

    impl RecordingTransport {
        fn replying(reply: TransportResult) -> Self {
            Self {
                reply,
                sent: Default::default(),
                stop_after: None,
            }
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, payload: &str) -> Result<TransportResult, DeliveryError> {
            let mut sent = self.sent.borrow_mut();
            sent.push(payload.to_string());
            if let Some((n, tx)) = &self.stop_after {
                if sent.len() == *n {
                    let _ = tx.try_send(());
                }
            }
            Ok(self.reply.clone())
        }
    }

    fn rds_config() -> AnnouncerConfig {
        let mut cfg = AnnouncerConfig::new(Protocol::Rds, "127.0.0.1", 1, "http://unused/");
        cfg.run_once = true;
        cfg
    }

    #[test]
    fn run_once_fetches_and_sends_exactly_once() {
        let cfg = rds_config();
        let source = FixedSource::playing("Go Away", "Jeff Parker");
        let transport = RecordingTransport::replying(TransportResult::Reply(b"Hello".to_vec()));
        let announcer = Announcer::new(&cfg, &source, &transport);

        let (_tx, rx) = crossbeam_channel::bounded(1);
        assert_eq!(announcer.run(&rx), 1);
        assert_eq!(source.calls.get(), 1);
        assert_eq!(
            *transport.sent.borrow(),
            vec!["DPS='Go Away' by Jeff Parker on CHIRP Radio\n".to_string()]
        );
    }

    #[test]
    fn run_once_ends_even_when_fetch_fails() {
        let cfg = rds_config();
        let source = FixedSource::offline();
        let transport = RecordingTransport::replying(TransportResult::Sent);
        let announcer = Announcer::new(&cfg, &source, &transport);

        assert_eq!(announcer.run(&crossbeam_channel::never()), 1);
        assert!(transport.sent.borrow().is_empty());
        assert!(matches!(announcer.run_cycle(), CycleReport::FetchFailed(_)));
    }

    #[test]
    fn rejection_reports_payload_verbatim() {
        let cfg = rds_config();
        let source = FixedSource::playing("Go Away", "Jeff Parker");
        let transport = RecordingTransport::replying(TransportResult::Reply(b"NO".to_vec()));
        let report = Announcer::new(&cfg, &source, &transport).run_cycle();

        match report {
            CycleReport::Rejected { reason, .. } => assert_eq!(
                reason,
                "The RDS Encoder did not like the input DPS='Go Away' by Jeff Parker on CHIRP Radio\n"
            ),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn empty_reply_is_silent_success() {
        let cfg = rds_config();
        let source = FixedSource::playing("Go Away", "Jeff Parker");
        let transport = RecordingTransport::replying(TransportResult::Reply(Vec::new()));
        let report = Announcer::new(&cfg, &source, &transport).run_cycle();
        assert!(report.succeeded());
        assert!(matches!(
            report,
            CycleReport::Delivered {
                reply: Some(DeliveryResult::NoResponse),
                ..
            }
        ));
    }

    #[test]
    fn dry_run_never_touches_the_transport() {
        let mut cfg = rds_config();
        cfg.dry_run = true;
        let source = FixedSource::playing("Go Away", "Jeff Parker");
        let transport = RecordingTransport::replying(TransportResult::Sent);
        let report = Announcer::new(&cfg, &source, &transport).run_cycle();

        assert!(transport.sent.borrow().is_empty());
        match report {
            CycleReport::DryRun { announcement, .. } => {
                assert_eq!(announcement, "DPS='Go Away' by Jeff Parker on CHIRP Radio\n")
            }
            other => panic!("expected dry run, got {other:?}"),
        }
    }

    #[test]
    fn continuous_mode_resends_until_shutdown() {
        let mut cfg = rds_config();
        cfg.run_once = false;
        cfg.interval = Duration::from_millis(5);
        let source = FixedSource::playing("Go Away", "Jeff Parker");
        let (tx, rx) = crossbeam_channel::bounded(1);
        let transport = RecordingTransport {
            reply: TransportResult::Reply(b"Hello".to_vec()),
            sent: Default::default(),
            stop_after: Some((3, tx)),
        };

        let cycles = Announcer::new(&cfg, &source, &transport).run(&rx);
        assert_eq!(cycles, 3);
        assert_eq!(source.calls.get(), 3);
        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|p| p == &sent[0]));
    }

    #[test]
    fn continuous_mode_survives_failed_cycles() {
        let mut cfg = rds_config();
        cfg.run_once = false;
        cfg.interval = Duration::from_millis(5);
        let source = FixedSource::offline();
        let transport = RecordingTransport::replying(TransportResult::Sent);
        let (tx, rx) = crossbeam_channel::bounded(1);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = tx.send(());
        });
        let cycles = Announcer::new(&cfg, &source, &transport).run(&rx);
        handle.join().expect("signal thread");
        assert!(cycles >= 2, "only {cycles} cycles ran");
        assert_eq!(source.calls.get() as u64, cycles);
    }

    #[test]
    fn rds_end_to_end_accepts_hello() {
        let (url, http) = serve_http_once("200 OK", r#"{"title": "Go Away", "artist": "Jeff Parker"}"#);
        let (port, peer) = serve_tcp_once(Some("Hello"));
        let mut cfg = AnnouncerConfig::new(Protocol::Rds, "127.0.0.1", port, url);
        cfg.run_once = true;

        let announcer = Announcer::new(
            &cfg,
            PlaylistClient::from_config(&cfg),
            transport::for_config(&cfg),
        );
        let report = announcer.run_cycle();
        assert!(report.succeeded(), "{report:?}");
        assert_eq!(
            peer.join().expect("peer"),
            b"DPS='Go Away' by Jeff Parker on CHIRP Radio\n".to_vec()
        );
        let _ = http.join();
    }

    #[test]
    fn rds_end_to_end_reports_no_as_rejection() {
        let (url, http) = serve_http_once("200 OK", r#"{"title": "Go Away", "artist": "Jeff Parker"}"#);
        let (port, peer) = serve_tcp_once(Some("NO"));
        let cfg = AnnouncerConfig::new(Protocol::Rds, "127.0.0.1", port, url);

        let announcer = Announcer::new(
            &cfg,
            PlaylistClient::from_config(&cfg),
            transport::for_config(&cfg),
        );
        match announcer.run_cycle() {
            CycleReport::Rejected { reason, .. } => assert_eq!(
                reason,
                "The RDS Encoder did not like the input DPS='Go Away' by Jeff Parker on CHIRP Radio\n"
            ),
            other => panic!("expected rejection, got {other:?}"),
        }
        let _ = peer.join();
        let _ = http.join();
    }

    #[test]
    fn prostream_end_to_end_delivers_datagram() {
        let (url, http) = serve_http_once("200 OK", r#"{"title": "Go Away", "artist": "Jeff Parker"}"#);
        let (port, peer) = serve_udp_once();
        let cfg = AnnouncerConfig::new(Protocol::Prostream, "127.0.0.1", port, url);

        let announcer = Announcer::new(
            &cfg,
            PlaylistClient::from_config(&cfg),
            transport::for_config(&cfg),
        );
        let report = announcer.run_cycle();
        assert!(matches!(report, CycleReport::Delivered { reply: None, .. }), "{report:?}");
        assert_eq!(
            peer.join().expect("peer"),
            b"t=Go Away - Jeff Parker | u=http://www.chirpradio.org\r\n".to_vec()
        );
        let _ = http.join();
    }

    #[test]
    fn unreachable_encoder_is_a_delivery_failure() {
        let (url, http) = serve_http_once("200 OK", r#"{"title": "Go Away", "artist": "Jeff Parker"}"#);
        let port = crate::test_support::closed_port();
        let cfg = AnnouncerConfig::new(Protocol::Rds, "127.0.0.1", port, url);

        let announcer = Announcer::new(
            &cfg,
            PlaylistClient::from_config(&cfg),
            transport::for_config(&cfg),
        );
        let report = announcer.run_cycle();
        assert!(!report.succeeded());
        assert!(matches!(report, CycleReport::DeliveryFailed { .. }), "{report:?}");
        let _ = http.join();
    }
}
