//! Typed server commands, query responses and discovery announcements.

use super::ProtocolError;
use super::codec::{Envelope, decode, encode};
use serde::Serialize;
use serde_json::Value;

/// Control message that terminates a file transfer.
pub const END_OF_FILE: &str = "/endoffile";

/// Latest accepted `starttime`, in Unix seconds.
pub const MAX_START_TIME: f64 = 2_085_978_495.0;

/// Commands received from the choreography server.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Stream the following frames into a file
    WriteFile(WriteFileArgs),
    ConfigWrite(ConfigWriteArgs),
    ConfigReload,
    /// Absolute Unix time at which the animation starts
    StartTime { time: f64 },
    Takeoff,
    Pause,
    Resume,
    Stop,
    Land,
    Disarm,
    LedTest,
    Request { value: RequestTarget },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteFileArgs {
    pub filename: String,
    pub clever_restart: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWriteArgs {
    pub section: String,
    pub option: String,
    pub value: Value,
}

/// What a `request` command asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    Test,
    Id,
    Selfcheck,
    BattVoltage,
    CellVoltage,
    /// Anything else; answered with an error status.
    Unsupported(String),
}

impl RequestTarget {
    pub fn parse(name: &str) -> Self {
        match name {
            "test" => Self::Test,
            "id" => Self::Id,
            "selfcheck" => Self::Selfcheck,
            "batt_voltage" => Self::BattVoltage,
            "cell_voltage" => Self::CellVoltage,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Test => "test",
            Self::Id => "id",
            Self::Selfcheck => "selfcheck",
            Self::BattVoltage => "batt_voltage",
            Self::CellVoltage => "cell_voltage",
            Self::Unsupported(name) => name,
        }
    }
}

impl Command {
    /// Parse raw bytes straight into a command.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::from_envelope(decode(bytes)?)
    }

    /// Convert a decoded envelope into a typed command.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { command, args } = envelope;
        let args = Args {
            command: &command,
            args: &args,
        };
        let parsed = match command.as_str() {
            "writefile" => Command::WriteFile(WriteFileArgs {
                filename: args.string("filename")?,
                clever_restart: args.optional_bool("clever_restart")?.unwrap_or(false),
            }),
            "config_write" => Command::ConfigWrite(ConfigWriteArgs {
                section: args.string("section")?,
                option: args.string("option")?,
                value: args.value("value")?.clone(),
            }),
            "config_reload" => Command::ConfigReload,
            "starttime" => Command::StartTime {
                time: args.timestamp("time")?,
            },
            "takeoff" => Command::Takeoff,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "land" => Command::Land,
            "disarm" => Command::Disarm,
            "led_test" => Command::LedTest,
            "request" => Command::Request {
                value: RequestTarget::parse(&args.string("value")?),
            },
            _ => return Err(ProtocolError::UnknownCommand(command.clone())),
        };
        Ok(parsed)
    }

    /// Wire name of the command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::WriteFile(_) => "writefile",
            Command::ConfigWrite(_) => "config_write",
            Command::ConfigReload => "config_reload",
            Command::StartTime { .. } => "starttime",
            Command::Takeoff => "takeoff",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Land => "land",
            Command::Disarm => "disarm",
            Command::LedTest => "led_test",
            Command::Request { .. } => "request",
        }
    }
}

/// Argument accessor with the server's loose typing (numbers may arrive as strings).
struct Args<'a> {
    command: &'a str,
    args: &'a Value,
}

impl Args<'_> {
    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::InvalidArgument {
            command: self.command.to_string(),
            field,
            reason: reason.into(),
        }
    }

    fn value(&self, field: &'static str) -> Result<&Value, ProtocolError> {
        self.args
            .get(field)
            .ok_or_else(|| self.invalid(field, "missing"))
    }

    fn string(&self, field: &'static str) -> Result<String, ProtocolError> {
        match self.value(field)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(self.invalid(field, format!("expected string, got {}", other))),
        }
    }

    fn float(&self, field: &'static str) -> Result<f64, ProtocolError> {
        let value = match self.value(field)? {
            Value::Number(n) => n.as_f64().ok_or_else(|| self.invalid(field, "not a float"))?,
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|e| self.invalid(field, format!("{}", e)))?,
            other => return Err(self.invalid(field, format!("expected number, got {}", other))),
        };
        if !value.is_finite() {
            return Err(self.invalid(field, format!("not finite: {}", value)));
        }
        Ok(value)
    }

    /// Unix seconds no later than the end of NTP era 0 (year 2036).
    fn timestamp(&self, field: &'static str) -> Result<f64, ProtocolError> {
        let time = self.float(field)?;
        if !(0.0..=MAX_START_TIME).contains(&time) {
            return Err(self.invalid(field, format!("out of range: {}", time)));
        }
        Ok(time)
    }

    fn optional_bool(&self, field: &'static str) -> Result<Option<bool>, ProtocolError> {
        match self.args.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Number(n)) => Ok(Some(n.as_f64().is_some_and(|v| v != 0.0))),
            Some(Value::String(s)) => parse_bool(s)
                .map(Some)
                .ok_or_else(|| self.invalid(field, format!("not a boolean: {:?}", s))),
            Some(other) => Err(self.invalid(field, format!("expected boolean, got {}", other))),
        }
    }
}

/// Boolean spellings accepted in configuration and command arguments.
pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Reply to a `request` command: `{"response": {status, value, value_name}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub value: Value,
    pub value_name: String,
}

impl Response {
    pub fn ok(target: &RequestTarget, value: impl Into<Value>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            value: value.into(),
            value_name: target.name().to_string(),
        }
    }

    pub fn error(target: &RequestTarget, reason: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            value: Value::String(reason.into()),
            value_name: target.name().to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode("response", self)
    }
}

/// UDP broadcast telling nodes where the server now lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAnnouncement {
    pub host: String,
    pub port: u16,
}

impl ServerAnnouncement {
    pub const COMMAND: &'static str = "server_ip";

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope = decode(bytes)?;
        if envelope.command != Self::COMMAND {
            return Err(ProtocolError::UnknownCommand(envelope.command));
        }
        let args = Args {
            command: Self::COMMAND,
            args: &envelope.args,
        };
        let host = args.string("host")?;
        if host.is_empty() {
            return Err(args.invalid("host", "empty"));
        }
        let port = args.float("port")?;
        if port.fract() != 0.0 || !(1.0..=f64::from(u16::MAX)).contains(&port) {
            return Err(args.invalid("port", format!("out of range: {}", port)));
        }
        Ok(Self {
            host,
            port: port as u16,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(
            Self::COMMAND,
            &serde_json::json!({"host": self.host, "port": self.port}),
        )
    }
}
