//! Network beat sync
//!
//! [`LinkBeatSource`] follows a beat-sync server speaking a line based text protocol.
//! After connecting, the client requests `status` and the server answers with
//! messages like
//!
//! ```text
//! status { :peers 1 :bpm 120.000000 :start 73746356220 :beat 597.737570 }
//! ```
//!
//! A background thread keeps the connection alive and publishes the newest status
//! through a triple buffer.  The render side picks it up in [`poll`](super::BeatSource::poll)
//! and extrapolates the beat position from the moment the status was received.
use super::connection::{Action, Connection};
use crate::error::Result;
use crate::helpers;
use std::io::{Read, Write};
use std::net::ToSocketAddrs;
use std::sync::{self, atomic};
use std::{net, thread, time};

const STATUS_PATTERN: &str =
    r"status\s*\{\s*:peers\s+(\d+)\s+:bpm\s+([0-9.]+)\s+:start\s+(-?\d+)\s+:beat\s+(-?[0-9.]+)\s*\}";

const CONNECT_TIMEOUT: time::Duration = time::Duration::from_secs(1);
const READ_TIMEOUT: time::Duration = time::Duration::from_millis(200);
const REQUEST_INTERVAL: time::Duration = time::Duration::from_secs(1);
/// Unterminated text beyond this is discarded
const MAX_PENDING: usize = 4096;

/// One status message of the beat-sync server
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkStatus {
    pub peers: u32,
    pub bpm: f64,
    pub start: i64,
    pub beat: f64,
}

/// Parse the first status message in `text`
pub fn parse_status(text: &str) -> Option<LinkStatus> {
    static STATUS: sync::OnceLock<regex::Regex> = sync::OnceLock::new();
    let re = STATUS.get_or_init(|| regex::Regex::new(STATUS_PATTERN).expect("valid pattern"));

    let caps = re.captures(text)?;
    Some(LinkStatus {
        peers: caps[1].parse().ok()?,
        bpm: caps[2].parse().ok()?,
        start: caps[3].parse().ok()?,
        beat: caps[4].parse().ok()?,
    })
}

/// Split complete messages off `pending` and return the valid ones
fn drain_messages(pending: &mut String) -> Vec<LinkStatus> {
    let mut statuses = Vec::new();

    while let Some(end) = pending.find('}') {
        let message: String = pending.drain(..=end).collect();
        match parse_status(&message) {
            Some(s) => statuses.push(s),
            None => log::trace!("Skipping {:?}", message.trim()),
        }
    }

    if pending.len() > MAX_PENDING {
        pending.clear();
    }

    statuses
}

/// A status and the moment it arrived
#[derive(Debug, Clone, Copy)]
struct Received {
    status: LinkStatus,
    at: time::Instant,
}

#[derive(Debug, Default)]
pub struct LinkBuilder {
    /// `host:port` of the beat-sync server
    ///
    /// Can also be set from config as `"link.address"`.
    pub address: Option<String>,

    /// Delay between connection attempts
    ///
    /// Can also be set from config as `"link.retry_ms"`.
    pub retry: Option<time::Duration>,

    /// Tempo until the first status arrives
    ///
    /// Can also be set from config as `"beat.default_bpm"`.
    pub bpm: Option<f64>,
}

impl LinkBuilder {
    pub fn new() -> LinkBuilder {
        Default::default()
    }

    pub fn address<S: Into<String>>(&mut self, address: S) -> &mut LinkBuilder {
        self.address = Some(address.into());
        self
    }

    pub fn retry(&mut self, retry: time::Duration) -> &mut LinkBuilder {
        self.retry = Some(retry);
        self
    }

    pub fn bpm(&mut self, bpm: f64) -> &mut LinkBuilder {
        self.bpm = Some(bpm);
        self
    }

    pub fn build(&mut self) -> Result<LinkBeatSource> {
        LinkBeatSource::from_builder(self)
    }
}

struct Client {
    address: String,
    connection: Connection,
    stream: Option<net::TcpStream>,
    pending: String,
    last_request: time::Instant,
    shutdown: sync::Arc<atomic::AtomicBool>,
    connected: sync::Arc<atomic::AtomicBool>,
    publish: triple_buffer::Input<Option<Received>>,
}

impl Client {
    fn run(mut self) {
        let mut buf = [0u8; 512];

        while !self.shutdown.load(atomic::Ordering::Relaxed) {
            match self.connection.poll(time::Instant::now()) {
                Action::Connect => self.connect(),
                Action::Wait(d) => thread::sleep(d.min(READ_TIMEOUT)),
                Action::Idle => (),
            }

            let result = match self.stream {
                Some(ref mut stream) => stream.read(&mut buf),
                None => continue,
            };

            match result {
                Ok(0) => self.disconnect("closed by server".to_string()),
                Ok(n) => {
                    self.pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                    // Only the newest status matters
                    if let Some(status) = drain_messages(&mut self.pending).pop() {
                        log::trace!("Beat sync: {:?}", status);
                        self.publish.write(Some(Received {
                            status,
                            at: time::Instant::now(),
                        }));
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    if self.last_request.elapsed() >= REQUEST_INTERVAL {
                        self.request();
                    }
                }
                Err(e) => self.disconnect(e.to_string()),
            }
        }

        log::debug!("Beat sync client stopped");
    }

    fn connect(&mut self) {
        let stream = self
            .address
            .to_socket_addrs()
            .and_then(|mut addrs| {
                addrs.next().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no address")
                })
            })
            .and_then(|addr| net::TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT))
            .and_then(|stream| {
                stream.set_read_timeout(Some(READ_TIMEOUT))?;
                Ok(stream)
            });

        match stream {
            Ok(stream) => {
                log::info!("Beat sync connected to {}", self.address);
                self.stream = Some(stream);
                self.pending.clear();
                self.connection.opened();
                self.connected.store(true, atomic::Ordering::Relaxed);
                self.request();
            }
            Err(e) => {
                log::warn!("Beat sync: can't connect to {}: {}", self.address, e);
                self.connection.closed(time::Instant::now());
            }
        }
    }

    fn request(&mut self) {
        self.last_request = time::Instant::now();
        let result = match self.stream {
            Some(ref mut stream) => stream.write_all(b"status\n"),
            None => return,
        };
        if let Err(e) = result {
            self.disconnect(e.to_string());
        }
    }

    fn disconnect(&mut self, reason: String) {
        log::warn!("Beat sync lost connection to {}: {}", self.address, reason);
        self.stream = None;
        self.connected.store(false, atomic::Ordering::Relaxed);
        self.connection.closed(time::Instant::now());
    }
}

/// Beat clock phase-locked to a beat-sync server
///
/// Until the first status arrives the clock runs at the configured default tempo.
/// While the connection is down the last known tempo and phase keep running.
#[derive(Debug)]
pub struct LinkBeatSource {
    updates: triple_buffer::Output<Option<Received>>,
    current: Option<Received>,

    origin: time::Instant,
    default_hz: f64,

    connected: sync::Arc<atomic::AtomicBool>,
    shutdown: sync::Arc<atomic::AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl LinkBeatSource {
    pub fn from_builder(build: &LinkBuilder) -> Result<LinkBeatSource> {
        let address = build
            .address
            .clone()
            .unwrap_or_else(|| crate::CONFIG.get_or("link.address", "127.0.0.1:17000".to_string()));
        let retry = build.retry.unwrap_or_else(|| {
            time::Duration::from_millis(crate::CONFIG.get_or("link.retry_ms", 2000))
        });
        let bpm = build
            .bpm
            .unwrap_or_else(|| crate::CONFIG.get_or("beat.default_bpm", 120.0));

        log::debug!("LinkBeatSource:");
        log::debug!("    Address = {}", address);
        log::debug!("    Retry   = {:?}", retry);
        log::debug!("    BPM     = {:6.1}", bpm);

        let (input, output) = triple_buffer::triple_buffer(&None);
        let shutdown = sync::Arc::new(atomic::AtomicBool::new(false));
        let connected = sync::Arc::new(atomic::AtomicBool::new(false));

        let now = time::Instant::now();
        let client = Client {
            address,
            connection: Connection::new(retry, now),
            stream: None,
            pending: String::new(),
            last_request: now,
            shutdown: shutdown.clone(),
            connected: connected.clone(),
            publish: input,
        };

        let thread = thread::Builder::new()
            .name("link-client".into())
            .spawn(move || client.run())?;

        Ok(LinkBeatSource {
            updates: output,
            current: None,

            origin: now,
            default_hz: if bpm > 0.0 { bpm / 60.0 } else { 2.0 },

            connected,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Last status received, if any
    pub fn status(&self) -> Option<LinkStatus> {
        self.current.map(|r| r.status)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(atomic::Ordering::Relaxed)
    }
}

impl super::BeatSource for LinkBeatSource {
    fn hz(&self) -> f64 {
        match self.current {
            Some(r) if r.status.bpm > 0.0 => r.status.bpm / 60.0,
            _ => self.default_hz,
        }
    }

    fn beat_time(&self, at: time::Instant) -> f64 {
        match self.current {
            Some(r) => r.status.beat + helpers::seconds_between(r.at, at) * self.hz(),
            None => helpers::seconds_between(self.origin, at) * self.default_hz,
        }
    }

    fn poll(&mut self) {
        if self.updates.updated() {
            if let Some(r) = *self.updates.read() {
                self.current = Some(r);
            }
        }
    }
}

impl Drop for LinkBeatSource {
    fn drop(&mut self) {
        self.shutdown.store(true, atomic::Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Beat sync client panicked");
            }
        }
    }
}
