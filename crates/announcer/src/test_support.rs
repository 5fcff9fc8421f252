//! Loopback peers for exercising the fetcher and transports.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Serve one HTTP response; the handle yields the request line.
pub(crate) fn serve_http_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind http");
    let addr = listener.local_addr().expect("http addr");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept http");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("http read timeout");
        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        loop {
            let mut header = String::new();
            let n = reader.read_line(&mut header).expect("header line");
            if n == 0 || header == "\r\n" || header == "\n" {
                break;
            }
        }
        (&stream).write_all(response.as_bytes()).expect("write response");
        request_line.trim_end().to_string()
    });
    (format!("http://{addr}/now_playing"), handle)
}

/// Accept one TCP connection, read one line, answer with `reply`, close.
pub(crate) fn serve_tcp_once(reply: Option<&'static str>) -> (u16, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind tcp");
    let port = listener.local_addr().expect("tcp addr").port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept tcp");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("tcp read timeout");
        let mut received = Vec::new();
        BufReader::new(&stream)
            .read_until(b'\n', &mut received)
            .expect("read payload");
        if let Some(reply) = reply {
            (&stream).write_all(reply.as_bytes()).expect("write reply");
        }
        received
    });
    (port, handle)
}

/// Receive one datagram.
pub(crate) fn serve_udp_once() -> (u16, JoinHandle<Vec<u8>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind udp");
    let port = socket.local_addr().expect("udp addr").port();
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("udp read timeout");
    let handle = thread::spawn(move || {
        let mut buf = [0u8; 2048];
        let (n, _) = socket.recv_from(&mut buf).expect("recv datagram");
        buf[..n].to_vec()
    });
    (port, handle)
}

/// A listener that completes the handshake but never answers or reads.
/// Keep the listener alive for as long as the peer should stall.
pub(crate) fn serve_stalled() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stalled");
    let addr = listener.local_addr().expect("stalled addr");
    (format!("http://{addr}/"), listener)
}

/// A loopback port with nothing listening on it.
pub(crate) fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let port = listener.local_addr().expect("probe addr").port();
    drop(listener);
    port
}

