//! Encoder transports.
//!
//! RDS encoders listen on TCP and may answer each line; Prostream listens on
//! UDP and never answers. Sockets are opened per announcement and dropped
//! before `send` returns, on success and failure alike.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use crate::config::{AnnouncerConfig, Target};
use crate::error::{DeliveryError, is_timeout};
use announcer_proto::Protocol;

/// Encoder replies are a few bytes; anything past this is dropped.
const MAX_RESPONSE_BYTES: usize = 4096;

/// What came back from the encoder, uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResult {
    /// Connectionless send; there is no reply channel.
    Sent,
    /// Bytes read back on the stream before close or timeout (may be empty).
    Reply(Vec<u8>),
}

/// Delivers one announcement payload to an encoder.
pub trait Transport {
    fn send(&self, payload: &str) -> Result<TransportResult, DeliveryError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, payload: &str) -> Result<TransportResult, DeliveryError> {
        (**self).send(payload)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, payload: &str) -> Result<TransportResult, DeliveryError> {
        (**self).send(payload)
    }
}

/// Pick the transport for the configured protocol.
pub fn for_config(config: &AnnouncerConfig) -> Box<dyn Transport> {
    match config.protocol {
        Protocol::Rds => Box::new(StreamTransport {
            target: config.target.clone(),
            io_timeout: config.network_timeout,
            response_timeout: config.response_timeout,
        }),
        Protocol::Prostream => Box::new(DatagramTransport {
            target: config.target.clone(),
            io_timeout: config.network_timeout,
        }),
    }
}

/// TCP: connect, write the line, collect the reply, close.
#[derive(Debug, Clone)]
pub struct StreamTransport {
    pub target: Target,
    /// Bound for connect and write.
    pub io_timeout: Duration,
    /// Total time allowed for the reply.
    pub response_timeout: Duration,
}

impl Transport for StreamTransport {
    fn send(&self, payload: &str) -> Result<TransportResult, DeliveryError> {
        let addr = self.target.to_string();
        let mut stream = connect(&resolve(&self.target)?, &addr, self.io_timeout)?;
        tracing::debug!(addr = %addr, "connected to encoder");

        stream
            .set_write_timeout(Some(self.io_timeout))
            .map_err(|source| DeliveryError::Write {
                addr: addr.clone(),
                source,
            })?;
        stream
            .write_all(payload.as_bytes())
            .and_then(|()| stream.flush())
            .map_err(|e| {
                io_failure("write", &addr, e, |addr, source| DeliveryError::Write {
                    addr,
                    source,
                })
            })?;

        let reply = read_reply(&mut stream, &addr, self.response_timeout)?;
        tracing::debug!(addr = %addr, bytes = reply.len(), "encoder reply collected");
        Ok(TransportResult::Reply(reply))
    }
}

/// UDP: one datagram, fire and forget.
#[derive(Debug, Clone)]
pub struct DatagramTransport {
    pub target: Target,
    pub io_timeout: Duration,
}

impl Transport for DatagramTransport {
    fn send(&self, payload: &str) -> Result<TransportResult, DeliveryError> {
        let addr = self.target.to_string();
        let dest = *resolve(&self.target)?
            .first()
            .ok_or_else(|| DeliveryError::NoAddress { addr: addr.clone() })?;
        let send_err = |source| DeliveryError::Send {
            addr: addr.clone(),
            source,
        };

        let local: SocketAddr = if dest.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(send_err)?;
        socket.set_write_timeout(Some(self.io_timeout)).map_err(send_err)?;

        let sent = socket
            .send_to(payload.as_bytes(), dest)
            .map_err(|e| {
                io_failure("send", &addr, e, |addr, source| DeliveryError::Send {
                    addr,
                    source,
                })
            })?;
        if sent != payload.len() {
            return Err(send_err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated to {sent} of {} bytes", payload.len()),
            )));
        }
        tracing::debug!(addr = %addr, bytes = sent, "datagram sent");
        Ok(TransportResult::Sent)
    }
}

fn resolve(target: &Target) -> Result<Vec<SocketAddr>, DeliveryError> {
    let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|source| DeliveryError::Resolve {
            addr: target.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(DeliveryError::NoAddress {
            addr: target.to_string(),
        });
    }
    Ok(addrs)
}

/// Try each resolved address in turn; report the last failure.
fn connect(
    addrs: &[SocketAddr],
    addr: &str,
    timeout: Duration,
) -> Result<TcpStream, DeliveryError> {
    let mut last_err = None;
    for sock_addr in addrs {
        match TcpStream::connect_timeout(sock_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(addr = %sock_addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    let err = last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address"));
    Err(io_failure("connect", addr, err, |addr, source| {
        DeliveryError::Connect { addr, source }
    }))
}

/// Read until the peer closes, the deadline passes, or the cap is hit.
///
/// A timeout or reset after the payload went out ends the reply; it is not a
/// delivery failure.
fn read_reply(
    stream: &mut TcpStream,
    addr: &str,
    wait: Duration,
) -> Result<Vec<u8>, DeliveryError> {
    let deadline = Instant::now() + wait;
    let mut reply = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        stream
            .set_read_timeout(Some(remaining))
            .map_err(|source| DeliveryError::Read {
                addr: addr.to_string(),
                source,
            })?;
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                reply.extend_from_slice(&buf[..n]);
                if reply.len() >= MAX_RESPONSE_BYTES {
                    reply.truncate(MAX_RESPONSE_BYTES);
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(e.kind()) => break,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                ) =>
            {
                tracing::debug!(addr = %addr, error = %e, "encoder dropped connection after write");
                break;
            }
            Err(source) => {
                return Err(DeliveryError::Read {
                    addr: addr.to_string(),
                    source,
                });
            }
        }
    }
    Ok(reply)
}

fn io_failure(
    op: &'static str,
    addr: &str,
    err: io::Error,
    wrap: impl FnOnce(String, io::Error) -> DeliveryError,
) -> DeliveryError {
    if is_timeout(err.kind()) {
        DeliveryError::Timeout {
            op,
            addr: addr.to_string(),
        }
    } else {
        wrap(addr.to_string(), err)
    }
}
