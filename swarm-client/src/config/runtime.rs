//! Typed runtime snapshot derived from the [`ConfigStore`].

use super::ConfigStore;
use crate::error::{ClientError, Result};
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const SERVER: &str = "SERVER";
pub const NTP: &str = "NTP";
pub const FILETRANSFER: &str = "FILETRANSFER";
pub const COPTERS: &str = "COPTERS";
pub const PRIVATE: &str = "PRIVATE";

/// `PRIVATE.id` value asking for a generated, persisted identity.
pub const ID_GENERATE: &str = "default";
/// `PRIVATE.id` value asking for the host name.
pub const ID_HOSTNAME: &str = "/hostname";

/// Immutable snapshot of every setting the node uses.
///
/// Produced by [`ConfigStore::reload`]; replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub server: ServerConfig,
    pub ntp: NtpConfig,
    pub files: FileTransferConfig,
    pub copter: CopterConfig,
    pub private: PrivateConfig,
    pub identity: NodeIdentity,
}

/// Server link, reconnection and discovery
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// UDP port listened on for `server_ip` announcements
    pub broadcast_port: u16,
    /// Largest single socket read
    pub buffer_size: usize,
    /// Connect attempts before falling back to discovery (default: 5)
    pub attempt_limit: u32,
    /// Per-attempt connect timeout, also the pause between attempts (default: 2s)
    pub connect_timeout: Duration,
    /// Discovery wait per round; `None` waits forever (default)
    pub discovery_timeout: Option<Duration>,
    pub discovery_backoff: Duration,
    pub discovery_backoff_max: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NtpConfig {
    pub use_ntp: bool,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileTransferConfig {
    /// Where received files land
    pub files_directory: PathBuf,
    /// Animation file name inside `files_directory`
    pub animation_file: String,
}

impl FileTransferConfig {
    pub fn animation_path(&self) -> PathBuf {
        self.files_directory.join(&self.animation_file)
    }
}

/// Settings shared by every copter in the show
#[derive(Debug, Clone, PartialEq)]
pub struct CopterConfig {
    pub frame_id: String,
    pub takeoff_height: f64,
    /// Seconds from start until the takeoff is assumed complete
    pub takeoff_time: f64,
    /// Seconds allotted to reach the first animation point
    pub reach_first_point_time: f64,
    pub safe_takeoff: bool,
    pub x0_common: f64,
    pub y0_common: f64,
    /// Cadence between animation frames (default: 0.125s)
    pub frame_delay: f64,
    pub led_test_duration: Duration,
}

/// Settings specific to this copter
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateConfig {
    pub x0: f64,
    pub y0: f64,
    pub use_leds: bool,
    /// systemd unit restarted after a `writefile` with `clever_restart`
    pub restart_service: String,
}

/// Where the node id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Literal,
    Generated,
    Hostname,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: String,
    pub source: IdentitySource,
}

impl RuntimeConfig {
    /// Derive a snapshot. May persist a freshly generated node id.
    pub fn from_store(store: &mut ConfigStore) -> Result<Self> {
        let server = ServerConfig {
            host: store.get_str(SERVER, "host")?,
            port: port(store, SERVER, "port")?,
            broadcast_port: port(store, SERVER, "broadcast_port")?,
            buffer_size: positive(store, SERVER, "buffer_size", 1024)?,
            attempt_limit: positive(store, SERVER, "attempt_limit", 5)?,
            connect_timeout: seconds(store, SERVER, "connect_timeout", 2.0)?,
            discovery_timeout: {
                let timeout = seconds(store, SERVER, "discovery_timeout", 0.0)?;
                (!timeout.is_zero()).then_some(timeout)
            },
            discovery_backoff: seconds(store, SERVER, "discovery_backoff", 1.0)?,
            discovery_backoff_max: seconds(store, SERVER, "discovery_backoff_max", 30.0)?,
        };

        let use_ntp = store.get_bool_or(NTP, "use_ntp", false)?;
        let ntp = NtpConfig {
            use_ntp,
            host: store.get_str_or(NTP, "host", "ntp.ubuntu.com")?,
            port: if store.get(NTP, "port").is_some() {
                port(store, NTP, "port")?
            } else {
                123
            },
            timeout: seconds(store, NTP, "timeout", 1.0)?,
        };

        let files = FileTransferConfig {
            files_directory: PathBuf::from(store.get_str_or(FILETRANSFER, "files_directory", ".")?),
            animation_file: store.get_str_or(FILETRANSFER, "animation_file", "animation.csv")?,
        };

        let frame_delay = store.get_float_or(COPTERS, "frame_delay", 0.125)?;
        if frame_delay.is_nan() || frame_delay <= 0.0 {
            return Err(ClientError::Config(format!(
                "{}.frame_delay must be positive, got {}",
                COPTERS, frame_delay
            )));
        }
        let copter = CopterConfig {
            frame_id: store.get_str_or(COPTERS, "frame_id", "map")?,
            takeoff_height: store.get_float(COPTERS, "takeoff_height")?,
            takeoff_time: store.get_float(COPTERS, "takeoff_time")?,
            reach_first_point_time: store.get_float(COPTERS, "reach_first_point_time")?,
            safe_takeoff: store.get_bool(COPTERS, "safe_takeoff")?,
            x0_common: store.get_float_or(COPTERS, "x0_common", 0.0)?,
            y0_common: store.get_float_or(COPTERS, "y0_common", 0.0)?,
            frame_delay,
            led_test_duration: seconds(store, COPTERS, "led_test_duration", 2.0)?,
        };

        let private = PrivateConfig {
            x0: store.get_float_or(PRIVATE, "x0", 0.0)?,
            y0: store.get_float_or(PRIVATE, "y0", 0.0)?,
            use_leds: store.get_bool_or(PRIVATE, "use_leds", false)?,
            restart_service: store.get_str_or(PRIVATE, "restart_service", "clever")?,
        };

        let identity = resolve_identity(store)?;

        Ok(Self {
            server,
            ntp,
            files,
            copter,
            private,
            identity,
        })
    }

    /// Combined origin offset for this copter (private + shared).
    pub fn origin(&self) -> (f64, f64) {
        (
            self.private.x0 + self.copter.x0_common,
            self.private.y0 + self.copter.y0_common,
        )
    }
}

/// Resolve `PRIVATE.id`: literal, generate-once-and-persist, or host name.
fn resolve_identity(store: &mut ConfigStore) -> Result<NodeIdentity> {
    let configured = store.get_str(PRIVATE, "id")?;
    match configured.as_str() {
        ID_GENERATE => {
            let id = format!("copter{:04}", rand::rng().random_range(0..10_000u32));
            store.set(PRIVATE, "id", id.as_str())?;
            info!("Generated node id {} and saved it to config", id);
            Ok(NodeIdentity {
                id,
                source: IdentitySource::Generated,
            })
        }
        ID_HOSTNAME => Ok(NodeIdentity {
            id: hostname(),
            source: IdentitySource::Hostname,
        }),
        _ => Ok(NodeIdentity {
            id: configured.clone(),
            source: IdentitySource::Literal,
        }),
    }
}

/// Host network name, or "localhost" when it cannot be determined.
pub fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| std::fs::read_to_string("/etc/hostname"))
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| std::env::var("HOST").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn port(store: &ConfigStore, section: &str, option: &str) -> Result<u16> {
    let value = store.get_int(section, option)?;
    u16::try_from(value)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ClientError::Config(format!("{}.{}: invalid port {}", section, option, value)))
}

/// Positive integer setting, converted without truncation.
fn positive<T: TryFrom<i64>>(
    store: &ConfigStore,
    section: &str,
    option: &str,
    default: i64,
) -> Result<T> {
    let value = store.get_int_or(section, option, default)?;
    if value <= 0 {
        return Err(ClientError::Config(format!(
            "{}.{} must be positive, got {}",
            section, option, value
        )));
    }
    T::try_from(value).map_err(|_| {
        ClientError::Config(format!("{}.{}: {} is out of range", section, option, value))
    })
}

fn seconds(store: &ConfigStore, section: &str, option: &str, default: f64) -> Result<Duration> {
    let value = store.get_float_or(section, option, default)?;
    Duration::try_from_secs_f64(value).map_err(|_| {
        ClientError::Config(format!(
            "{}.{}: invalid duration {}",
            section, option, value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BASE: &str = r#"
[SERVER]
host = "192.168.1.10"
port = 25000
broadcast_port = 8181
buffer_size = 1024

[NTP]
use_ntp = false
host = "ntp1.stratum2.ru"
port = 123

[FILETRANSFER]
files_directory = "animations"
animation_file = "animation.csv"

[COPTERS]
frame_id = "aruco_map"
takeoff_height = 1.0
takeoff_time = 5.0
reach_first_point_time = 3.0
safe_takeoff = true
x0_common = 0.5
y0_common = 0.25

[PRIVATE]
x0 = 1.0
y0 = 2.0
use_leds = true
"#;

    fn store_with_id(id: &str) -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client_config.toml");
        fs::write(&path, format!("{}id = \"{}\"\n", BASE, id)).unwrap();
        let store = ConfigStore::open(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn test_full_snapshot() {
        let (_dir, mut store) = store_with_id("copter7");
        let config = store.reload().unwrap();
        assert_eq!(config.server.host, "192.168.1.10");
        assert_eq!(config.server.port, 25000);
        assert_eq!(config.server.broadcast_port, 8181);
        assert_eq!(config.server.attempt_limit, 5);
        assert_eq!(config.server.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.server.discovery_timeout, None);
        assert!(!config.ntp.use_ntp);
        assert_eq!(config.files.animation_path(), PathBuf::from("animations/animation.csv"));
        assert_eq!(config.copter.frame_delay, 0.125);
        assert!(config.private.use_leds);
        assert_eq!(config.origin(), (1.5, 2.25));
        assert_eq!(
            config.identity,
            NodeIdentity {
                id: "copter7".into(),
                source: IdentitySource::Literal
            }
        );
    }

    #[test]
    fn test_generated_identity_is_persisted_and_stable() {
        let (_dir, mut store) = store_with_id(ID_GENERATE);
        let first = store.reload().unwrap();
        assert_eq!(first.identity.source, IdentitySource::Generated);
        let id = &first.identity.id;
        assert_eq!(id.len(), "copter".len() + 4);
        assert!(id.starts_with("copter"));
        assert!(id["copter".len()..].chars().all(|c| c.is_ascii_digit()));

        let second = store.reload().unwrap();
        assert_eq!(&second.identity.id, id);
        assert_eq!(second.identity.source, IdentitySource::Literal);
        let third = store.reload().unwrap();
        assert_eq!(&third.identity.id, id);
    }

    #[test]
    fn test_hostname_identity_not_persisted() {
        let (_dir, mut store) = store_with_id(ID_HOSTNAME);
        let config = store.reload().unwrap();
        assert_eq!(config.identity.source, IdentitySource::Hostname);
        assert_eq!(config.identity.id, hostname());
        assert_eq!(store.get_str(PRIVATE, "id").unwrap(), ID_HOSTNAME);
        let again = store.reload().unwrap();
        assert_eq!(again.identity.source, IdentitySource::Hostname);
    }

    #[test]
    fn test_missing_required_setting_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client_config.toml");
        fs::write(&path, BASE.replace("takeoff_time = 5.0\n", "")).unwrap();
        let mut store = ConfigStore::open(&path).unwrap();
        assert!(matches!(store.reload(), Err(ClientError::Config(msg)) if msg.contains("takeoff_time")));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client_config.toml");
        fs::write(&path, BASE.replace("port = 25000", "port = 70000") + "id = \"x\"\n").unwrap();
        let mut store = ConfigStore::open(&path).unwrap();
        assert!(matches!(store.reload(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_discovery_timeout_setting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client_config.toml");
        let contents = BASE.replace(
            "buffer_size = 1024",
            "buffer_size = 1024\ndiscovery_timeout = 2.5\nattempt_limit = \"3\"",
        ) + "id = \"x\"\n";
        fs::write(&path, contents).unwrap();
        let mut store = ConfigStore::open(&path).unwrap();
        let config = store.reload().unwrap();
        assert_eq!(config.server.discovery_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.server.attempt_limit, 3);
    }

    #[test]
    fn test_oversized_attempt_limit_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client_config.toml");
        let contents = BASE.replace(
            "buffer_size = 1024",
            "buffer_size = 1024\nattempt_limit = 4294967301",
        ) + "id = \"x\"\n";
        fs::write(&path, contents).unwrap();
        let mut store = ConfigStore::open(&path).unwrap();
        assert!(matches!(
            store.reload(),
            Err(ClientError::Config(msg)) if msg.contains("attempt_limit") && msg.contains("out of range")
        ));
    }
}
