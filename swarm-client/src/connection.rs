//! TCP session to the choreography server with reconnection and discovery.
//!
//! The manager owns at most one socket. Any I/O failure drops it; the control
//! loop then calls [`ConnectionManager::reconnect`], which retries the
//! configured endpoint and, after `attempt_limit` consecutive failures,
//! listens for a `server_ip` broadcast announcing a new address.
//!
//! All blocking waits are sliced so the shutdown flag is observed within
//! [`READ_SLICE`].

use crate::config::{SERVER, ServerConfig, SharedConfig, SharedStore};
use crate::error::{ClientError, Result};
use crate::file_receiver::MessageSource;
use crate::protocol::{ServerAnnouncement, read_exact_or_close, read_frame, write_frame};
use std::io::{self, ErrorKind};
use std::net::{Shutdown, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest uninterrupted block on a socket read.
pub const READ_SLICE: Duration = Duration::from_millis(500);

/// Longest uninterrupted sleep between attempts.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Largest discovery datagram accepted
const DATAGRAM_SIZE: usize = 2048;

fn check_shutdown(flag: &AtomicBool) -> Result<()> {
    if flag.load(Ordering::Relaxed) {
        return Err(ClientError::Shutdown);
    }
    Ok(())
}

/// Owner of the server connection.
pub struct ConnectionManager {
    store: SharedStore,
    config: SharedConfig,
    shutdown: Arc<AtomicBool>,
    stream: Option<TcpStream>,
    consecutive_failures: u32,
    connect_attempts: u64,
    discovery_rounds: u64,
}

impl ConnectionManager {
    pub fn new(store: SharedStore, config: SharedConfig, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            store,
            config,
            shutdown,
            stream: None,
            consecutive_failures: 0,
            connect_attempts: 0,
            discovery_rounds: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Failed connect attempts since the last success or discovery round.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Connect attempts made by [`reconnect`](Self::reconnect), successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Times discovery mode has been entered.
    pub fn discovery_rounds(&self) -> u64 {
        self.discovery_rounds
    }

    /// Single connect attempt bounded by `timeout`. Replaces any current socket.
    pub fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        self.close();
        let mut last_error = io::Error::new(
            ErrorKind::NotFound,
            format!("{}:{} did not resolve", host, port),
        );
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    // Blocking I/O, sliced only to observe shutdown
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(READ_SLICE))?;
                    stream.set_nodelay(true)?;
                    debug!("Connected to {}", addr);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_error = e,
            }
        }
        Err(last_error.into())
    }

    /// Connect to the configured server, falling back to discovery.
    ///
    /// Returns only once connected, or with [`ClientError::Shutdown`].
    pub fn reconnect(&mut self) -> Result<()> {
        self.close();
        let mut backoff = self.config.load().server.discovery_backoff;
        loop {
            check_shutdown(&self.shutdown)?;
            let server = self.config.load().server.clone();
            self.connect_attempts += 1;
            match self.connect(&server.host, server.port, server.connect_timeout) {
                Ok(()) => {
                    info!("Connected to server {}:{}", server.host, server.port);
                    self.consecutive_failures = 0;
                    return Ok(());
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    warn!(
                        "Connection attempt {}/{} to {}:{} failed: {}",
                        self.consecutive_failures, server.attempt_limit, server.host, server.port, e
                    );
                }
            }

            if self.consecutive_failures < server.attempt_limit {
                self.sleep(server.connect_timeout)?;
                continue;
            }

            match self.discover(&server)? {
                Some(announcement) => {
                    self.adopt(announcement);
                    backoff = server.discovery_backoff;
                }
                None => {
                    info!("No server announcement, retrying in {:?}", backoff);
                    self.sleep(backoff)?;
                    backoff = (backoff * 2).min(server.discovery_backoff_max);
                }
            }
            self.consecutive_failures = 0;
        }
    }

    /// Listen for a `server_ip` announcement.
    ///
    /// Waits forever unless `discovery_timeout` is set. Malformed datagrams
    /// and other commands are ignored.
    fn discover(&mut self, server: &ServerConfig) -> Result<Option<ServerAnnouncement>> {
        self.discovery_rounds += 1;
        warn!(
            "Server unreachable after {} attempts, listening for announcements on UDP port {}",
            server.attempt_limit, server.broadcast_port
        );
        let socket = match bind_discovery(server.broadcast_port) {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Cannot listen on UDP port {}: {}", server.broadcast_port, e);
                return Ok(None);
            }
        };

        let deadline = server.discovery_timeout.map(|t| Instant::now() + t);
        let mut buffer = vec![0u8; DATAGRAM_SIZE];
        loop {
            check_shutdown(&self.shutdown)?;
            let slice = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    remaining.min(READ_SLICE)
                }
                None => READ_SLICE,
            };
            socket.set_read_timeout(Some(slice))?;

            match socket.recv_from(&mut buffer) {
                Ok((len, from)) => match ServerAnnouncement::decode(&buffer[..len]) {
                    Ok(announcement) => {
                        info!(
                            "Server announced at {}:{} (from {})",
                            announcement.host, announcement.port, from
                        );
                        return Ok(Some(announcement));
                    }
                    Err(e) => warn!("Ignoring datagram from {}: {}", from, e),
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    warn!("Discovery receive failed: {}", e);
                    return Ok(None);
                }
            }
        }
    }

    /// Persist the announced endpoint and publish it to the live snapshot.
    fn adopt(&self, announcement: ServerAnnouncement) {
        {
            let mut store = self.store.lock();
            let persisted = store
                .set(SERVER, "host", announcement.host.as_str())
                .and_then(|_| store.set(SERVER, "port", i64::from(announcement.port)));
            if let Err(e) = persisted {
                warn!("Could not save announced server address: {}", e);
            }
        }
        let mut next = (*self.config.load_full()).clone();
        next.server.host = announcement.host;
        next.server.port = announcement.port;
        self.config.store(Arc::new(next));
    }

    fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            check_shutdown(&self.shutdown)?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "not connected").into())
    }

    /// Write one length-prefixed message.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let result = write_frame(self.stream()?, payload);
        if let Err(e) = result {
            self.close();
            return Err(e.into());
        }
        Ok(())
    }

    /// Read exactly `n` bytes, or `None` if the server closed the connection.
    pub fn receive_exact(&mut self, n: usize) -> Result<Option<Vec<u8>>> {
        let chunk = self.config.load().server.buffer_size;
        let shutdown = Arc::clone(&self.shutdown);
        let result = read_exact_or_close(self.stream()?, n, chunk, || check_shutdown(&shutdown));
        self.settle(result)
    }

    /// Read one whole framed message, or `None` if the server closed the connection.
    pub fn receive_message(&mut self) -> Result<Option<Vec<u8>>> {
        let chunk = self.config.load().server.buffer_size;
        let shutdown = Arc::clone(&self.shutdown);
        let result = read_frame(self.stream()?, chunk, || check_shutdown(&shutdown));
        self.settle(result)
    }

    /// Drop the socket after a failed or closed read.
    fn settle(&mut self, result: Result<Option<Vec<u8>>>) -> Result<Option<Vec<u8>>> {
        match &result {
            Ok(Some(_)) | Err(ClientError::Shutdown) => {}
            Ok(None) => {
                info!("Server closed the connection");
                self.close();
            }
            Err(_) => self.close(),
        }
        result
    }

    /// Close the socket, if any.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl MessageSource for ConnectionManager {
    fn receive_message(&mut self) -> Result<Option<Vec<u8>>> {
        ConnectionManager::receive_message(self)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn bind_discovery(port: u16) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", port))?;
    socket.set_broadcast(true)?;
    Ok(socket)
}
