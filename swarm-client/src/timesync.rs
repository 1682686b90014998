//! Minimal SNTP client used to line up independently clocked nodes.
//!
//! Only the transmit timestamp of the server reply is used. The node does not
//! adjust its system clock; it measures `reference - local` when a start time
//! arrives and shifts its local schedule by that amount.

use crate::clock::Clock;
use crate::config::NtpConfig;
use crate::error::{ClientError, Result};
use std::net::UdpSocket;
use std::time::Duration;
use tracing::{debug, warn};

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01.
pub const NTP_UNIX_DELTA: u64 = 2_208_988_800;

/// Client request: LI=0, VN=3, Mode=3 followed by 47 zero bytes.
pub const NTP_REQUEST_SIZE: usize = 48;
const NTP_MODE_CLIENT: u8 = 0x1b;

/// Convert an NTP timestamp (seconds + 2^-32 fraction) to Unix seconds.
pub fn ntp_to_unix(seconds: u32, fraction: u32) -> f64 {
    f64::from(seconds) + f64::from(fraction) / 4_294_967_296.0 - NTP_UNIX_DELTA as f64
}

/// Build the 48-byte client query.
pub fn request_packet() -> [u8; NTP_REQUEST_SIZE] {
    let mut packet = [0u8; NTP_REQUEST_SIZE];
    packet[0] = NTP_MODE_CLIENT;
    packet
}

/// Parse the transmit timestamp (words 10 and 11) of a server reply.
pub fn parse_reply(reply: &[u8]) -> Result<f64> {
    if reply.len() < NTP_REQUEST_SIZE {
        return Err(ClientError::TimeSync(format!(
            "short reply: {} bytes",
            reply.len()
        )));
    }
    let word = |i: usize| {
        u32::from_be_bytes([reply[4 * i], reply[4 * i + 1], reply[4 * i + 2], reply[4 * i + 3]])
    };
    let (seconds, fraction) = (word(10), word(11));
    if seconds == 0 && fraction == 0 {
        return Err(ClientError::TimeSync("reply has no transmit timestamp".into()));
    }
    Ok(ntp_to_unix(seconds, fraction))
}

/// Query `host:port` once and return the reference time in Unix seconds.
pub fn query(host: &str, port: u16, timeout: Duration) -> Result<f64> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(timeout))?;
    socket.send_to(&request_packet(), (host, port))?;

    let mut buffer = [0u8; 1024];
    let (len, from) = socket.recv_from(&mut buffer)?;
    debug!("NTP reply of {} bytes from {}", len, from);
    parse_reply(&buffer[..len])
}

/// Reference time source described by the `[NTP]` settings.
#[derive(Debug, Clone)]
pub struct TimeSync {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TimeSync {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Build from config, or `None` when NTP is disabled.
    pub fn from_config(config: &NtpConfig) -> Option<Self> {
        config
            .use_ntp
            .then(|| Self::new(config.host.clone(), config.port, config.timeout))
    }

    /// Reference time now, in Unix seconds.
    pub fn reference_time(&self) -> Result<f64> {
        query(&self.host, self.port, self.timeout)
    }

    /// `reference - local` at the moment of the call.
    ///
    /// Failures are logged and reported as `None`; callers fall back to the
    /// uncorrected local clock.
    pub fn offset(&self, clock: &dyn Clock) -> Option<f64> {
        let before = clock.now();
        match self.reference_time() {
            Ok(reference) => {
                // Assume the reply was stamped halfway through the round trip
                let local = (before + clock.now()) / 2.0;
                Some(reference - local)
            }
            Err(e) => {
                warn!(
                    "Time sync with {}:{} failed, using local clock: {}",
                    self.host, self.port, e
                );
                None
            }
        }
    }
}
