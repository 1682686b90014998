//! Wire protocol shared with the choreography server.
//!
//! Every message on the TCP link is a length-prefixed JSON envelope:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ Length (4 bytes) │ {"<command>": {<arguments>}} │
//! │ Big-endian u32   │ UTF-8 JSON                   │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! The same envelope shape (without the length prefix) is used for the UDP
//! `server_ip` discovery announcement.

mod codec;
mod command;

pub use codec::{Envelope, decode, encode, frame, read_exact_or_close, read_frame, write_frame};
pub use command::{
    Command, ConfigWriteArgs, END_OF_FILE, MAX_START_TIME, RequestTarget, Response, ResponseStatus,
    ServerAnnouncement, WriteFileArgs,
};
pub(crate) use command::parse_bool;

use thiserror::Error;

/// Errors for a single malformed message. The connection is never torn down for these.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Envelope is not a JSON object")]
    NotAnObject,

    #[error("Envelope has no command")]
    EmptyEnvelope,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid argument `{field}` for {command}: {reason}")]
    InvalidArgument {
        command: String,
        field: &'static str,
        reason: String,
    },
}
