//! Local URL intake.
//!
//! A browser extension POSTs `{"url": "..."}` to `127.0.0.1:<port>` and the
//! console starts a download for it. One connection is served at a time on a
//! single listener thread; requests are tiny and arrive at human speed.

use crate::errors::ConsoleError;
use crate::logging::log_event;
use serde::Deserialize;
use serde_json::json;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const DEFAULT_INTAKE_PORT: u16 = 50000;
const MAX_REQUEST_BYTES: usize = 10240;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const READ_TIMEOUT: Duration = Duration::from_secs(2);
const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
                            Access-Control-Allow-Methods: POST, GET, OPTIONS\r\n\
                            Access-Control-Allow-Headers: Content-Type\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeRequest {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeReply {
    Preflight,
    Accepted(IntakeRequest),
    Rejected(String),
}

#[derive(Deserialize)]
struct IntakeBody {
    url: String,
}

impl IntakeReply {
    pub fn to_http(&self) -> String {
        match self {
            Self::Preflight => format!("HTTP/1.1 204 No Content\r\n{CORS_HEADERS}\r\n"),
            Self::Accepted(request) => {
                let body = json!({ "url": request.url }).to_string();
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{CORS_HEADERS}\r\n{body}",
                    body.len()
                )
            }
            Self::Rejected(reason) => format!(
                "HTTP/1.1 400 Bad Request\r\nContent-Length: {}\r\n{CORS_HEADERS}\r\n{reason}",
                reason.len()
            ),
        }
    }
}

pub fn parse_request(raw: &str) -> IntakeReply {
    if raw.starts_with("OPTIONS") {
        return IntakeReply::Preflight;
    }
    if !raw.starts_with("POST") {
        return IntakeReply::Rejected("only POST is accepted".to_string());
    }
    let body = raw.split_once("\r\n\r\n").map_or("", |(_, body)| body).trim();
    match serde_json::from_str::<IntakeBody>(body) {
        Ok(parsed) if !parsed.url.trim().is_empty() => IntakeReply::Accepted(IntakeRequest {
            url: parsed.url.trim().to_string(),
        }),
        Ok(_) => IntakeReply::Rejected("url is empty".to_string()),
        Err(err) => IntakeReply::Rejected(format!("invalid body: {err}")),
    }
}

/// Listens on loopback until dropped. Accepted URLs arrive on the receiver
/// returned by [`IntakeServer::bind`].
pub struct IntakeServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl IntakeServer {
    pub fn bind(port: u16) -> Result<(Self, UnboundedReceiver<IntakeRequest>), ConsoleError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|e| ConsoleError::Io(format!("intake port {port}: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| ConsoleError::Io(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ConsoleError::Io(e.to_string()))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = thread::spawn(move || accept_loop(&listener, &sender, &flag));
        log_event("info", "intake_started", json!({ "addr": addr.to_string() }));

        Ok((
            Self {
                addr,
                stop,
                worker: Some(worker),
            },
            receiver,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for IntakeServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn accept_loop(listener: &TcpListener, sender: &UnboundedSender<IntakeRequest>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => handle_client(stream, sender),
            Err(_) => thread::sleep(ACCEPT_POLL_INTERVAL),
        }
    }
}

fn handle_client(mut stream: TcpStream, sender: &UnboundedSender<IntakeRequest>) {
    // Accepted sockets may inherit the listener's non-blocking mode.
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));

    let raw = read_request(&mut stream);
    let reply = parse_request(&raw);
    match &reply {
        IntakeReply::Accepted(request) => {
            log_event("info", "intake_received", json!({ "url": request.url }));
            let _ = sender.send(request.clone());
        }
        IntakeReply::Rejected(reason) => {
            log_event("warn", "intake_rejected", json!({ "reason": reason }));
        }
        IntakeReply::Preflight => {}
    }
    let _ = stream.write_all(reply.to_http().as_bytes());
    let _ = stream.flush();
}

/// Reads until the headers and a `Content-Length` body are in, the peer stops
/// sending, or the size cap is hit.
fn read_request(stream: &mut impl Read) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    while raw.len() < MAX_REQUEST_BYTES {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    raw.truncate(MAX_REQUEST_BYTES);
    String::from_utf8_lossy(&raw).into_owned()
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    body.len() >= length
}
