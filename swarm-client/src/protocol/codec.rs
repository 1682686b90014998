//! JSON envelope encoding and 4-byte length framing.

use super::ProtocolError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Read, Write};

/// A decoded `{"<command>": <args>}` message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub command: String,
    pub args: Value,
}

/// Encode a single-command envelope as UTF-8 JSON.
pub fn encode<T: Serialize + ?Sized>(command: &str, args: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut map = Map::with_capacity(1);
    map.insert(command.to_string(), serde_json::to_value(args)?);
    Ok(serde_json::to_vec(&Value::Object(map))?)
}

/// Decode a single-command envelope.
///
/// Only the first key is considered; the server never sends more than one.
pub fn decode(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(map) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    let (command, args) = map.into_iter().next().ok_or(ProtocolError::EmptyEnvelope)?;
    Ok(Envelope { command, args })
}

/// Prefix a payload with its big-endian u32 length.
pub fn frame(payload: &[u8]) -> io::Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes exceeds u32 length field", payload.len()),
        )
    })?;
    let mut buffer = Vec::with_capacity(4 + payload.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

/// Write one framed message as a single logical write.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let buffer = frame(payload)?;
    writer.write_all(&buffer)?;
    writer.flush()
}

/// Read exactly `n` bytes, or `None` if the peer closes first.
///
/// Reads at most `chunk` bytes per call. `on_idle` runs whenever the reader
/// reports a timeout, so callers with read-timeout slices can bail out; bytes
/// accumulated so far are kept across idle slices.
pub fn read_exact_or_close<R, E, F>(
    reader: &mut R,
    n: usize,
    chunk: usize,
    mut on_idle: F,
) -> Result<Option<Vec<u8>>, E>
where
    R: Read,
    E: From<io::Error>,
    F: FnMut() -> Result<(), E>,
{
    let chunk = chunk.max(1);
    // Grows with the bytes actually received, not with the announced length
    let mut data = Vec::with_capacity(n.min(chunk));
    while data.len() < n {
        let filled = data.len();
        data.resize(filled + chunk.min(n - filled), 0);
        let result = reader.read(&mut data[filled..]);
        data.truncate(filled + *result.as_ref().unwrap_or(&0));
        match result {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                on_idle()?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(data))
}

/// Read one framed message: the 4-byte length, then the payload.
pub fn read_frame<R, E, F>(reader: &mut R, chunk: usize, mut on_idle: F) -> Result<Option<Vec<u8>>, E>
where
    R: Read,
    E: From<io::Error>,
    F: FnMut() -> Result<(), E>,
{
    let Some(header) = read_exact_or_close(reader, 4, chunk, &mut on_idle)? else {
        return Ok(None);
    };
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    read_exact_or_close(reader, len, chunk, on_idle)
}
