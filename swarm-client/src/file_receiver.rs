//! Streams framed payloads from the server into a file.
//!
//! Every message after `writefile` is either a raw chunk of file content or
//! the `/endoffile` control envelope that ends the transfer. There is no
//! resume: a connection lost mid-transfer leaves a partial file behind.

use crate::error::{ClientError, Result};
use crate::protocol::{self, END_OF_FILE, ProtocolError};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of whole framed messages.
pub trait MessageSource {
    /// Next message payload, or `None` when the peer closed the link.
    fn receive_message(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Summary of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub chunks: usize,
    /// The end-of-file marker arrived; `false` means the file is partial
    pub completed: bool,
}

fn is_end_of_file(message: &[u8]) -> bool {
    matches!(protocol::decode(message), Ok(envelope) if envelope.command == END_OF_FILE)
}

/// Receive a file into `directory`, keeping only the file-name part of `filename`.
///
/// A local write failure does not stop reading: the remaining chunks are
/// drained up to the end marker so they are not mistaken for commands, then
/// the error is returned.
pub fn receive_file<S>(source: &mut S, directory: &Path, filename: &str) -> Result<ReceivedFile>
where
    S: MessageSource + ?Sized,
{
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| ProtocolError::InvalidArgument {
            command: "writefile".into(),
            field: "filename",
            reason: format!("no file name in {:?}", filename),
        })?;
    let path = directory.join(name);

    let mut writer = fs::create_dir_all(directory)
        .and_then(|_| File::create(&path))
        .map(BufWriter::new)
        .map_err(|e| ClientError::FileTransfer(format!("cannot create {:?}: {}", path, e)));
    info!("Receiving file {:?}", path);

    let mut received = ReceivedFile {
        path,
        bytes: 0,
        chunks: 0,
        completed: false,
    };
    while let Some(message) = source.receive_message()? {
        if is_end_of_file(&message) {
            received.completed = true;
            break;
        }
        let failed = match writer.as_mut() {
            Ok(file) => file.write_all(&message).err(),
            Err(_) => None,
        };
        if let Some(e) = failed {
            writer = Err(ClientError::FileTransfer(format!(
                "write to {:?} failed: {}",
                received.path, e
            )));
        }
        received.chunks += 1;
        received.bytes += message.len() as u64;
        debug!("File chunk {} ({} bytes)", received.chunks, message.len());
    }

    let mut file = writer?;
    file.flush()
        .map_err(|e| ClientError::FileTransfer(format!("flush of {:?} failed: {}", received.path, e)))?;

    if received.completed {
        info!(
            "File {:?} received ({} bytes in {} chunks)",
            received.path, received.bytes, received.chunks
        );
    } else {
        warn!(
            "Connection closed during transfer, {:?} is partial ({} bytes)",
            received.path, received.bytes
        );
    }
    Ok(received)
}
