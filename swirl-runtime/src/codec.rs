//! Component A: wire framing for the TCP mesh (spec §4.A).
//!
//! Two framings share a single connection, payload-first semantics:
//!
//! 1. A newline-terminated **header line** (handshake, or filename) of at
//!    most [`MAX_HEADER_BYTES`] bytes.
//! 2. A fixed 3-byte **ack** (`"ack"`), sent in reply to a header.
//! 3. The **payload**: raw bytes read to EOF. There is no length prefix —
//!    the connection is closed by the sender after exactly one payload,
//!    which is what lets the receiver use EOF as the end-of-payload
//!    signal.
//!
//! One TCP connection carries exactly one (peer, port) transfer.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Result, RuntimeError};

/// Upper bound on handshake/filename header lines (spec §4.A).
pub const MAX_HEADER_BYTES: usize = 1024;

/// The literal ack payload; never anything else, and always exactly 3 bytes.
pub const ACK: &[u8] = b"ack";

/// Writes `"<peer_location_name> <port_name>\n"` (spec §4.A.1).
pub async fn write_handshake<W: AsyncWrite + Unpin>(
    w: &mut W,
    peer_location_name: &str,
    port_name: &str,
) -> Result<()> {
    let line = format!("{peer_location_name} {port_name}\n");
    if line.len() > MAX_HEADER_BYTES {
        return Err(RuntimeError::Handshake(format!(
            "handshake line exceeds {MAX_HEADER_BYTES} bytes"
        )));
    }
    w.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Reads and parses a handshake frame into `(peer_location_name, port_name)`.
pub async fn read_handshake<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<(String, String)> {
    let line = read_header_line(r).await?;
    let mut parts = line.splitn(2, ' ');
    let peer = parts.next().unwrap_or("").trim();
    let port = parts.next().unwrap_or("").trim();
    if peer.is_empty() || port.is_empty() {
        return Err(RuntimeError::Handshake(line));
    }
    Ok((peer.to_string(), port.to_string()))
}

/// Writes the 3-byte ack.
pub async fn write_ack<W: AsyncWrite + Unpin>(w: &mut W) -> Result<()> {
    w.write_all(ACK).await?;
    Ok(())
}

/// Reads exactly 3 bytes and verifies they are the ack.
pub async fn read_ack<R: AsyncRead + Unpin>(r: &mut R) -> Result<()> {
    let mut buf = [0u8; 3];
    r.read_exact(&mut buf).await?;
    if buf != *ACK {
        return Err(RuntimeError::Handshake(format!(
            "expected ack, got {:?}",
            String::from_utf8_lossy(&buf)
        )));
    }
    Ok(())
}

/// Writes a filename header line, used ahead of a File payload.
pub async fn write_filename_header<W: AsyncWrite + Unpin>(w: &mut W, filename: &str) -> Result<()> {
    let line = format!("{filename}\n");
    if line.len() > MAX_HEADER_BYTES {
        return Err(RuntimeError::Handshake(format!(
            "filename header exceeds {MAX_HEADER_BYTES} bytes"
        )));
    }
    w.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Reads a filename header line.
pub async fn read_filename_header<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<String> {
    read_header_line(r).await
}

async fn read_header_line<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = r.read_line(&mut line).await?;
    if n == 0 {
        return Err(RuntimeError::Handshake("connection closed before header".into()));
    }
    if line.len() > MAX_HEADER_BYTES {
        return Err(RuntimeError::Handshake("header line too long".into()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Reads the remainder of the stream (a scalar String/Int/Bool payload, or
/// the trailing file body once the caller has already consumed the
/// filename header + ack).
pub async fn read_to_eof<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Wraps a plain `AsyncRead` stream half in a `BufReader`, used on the
/// accept side so header lines can be read with `read_line`.
pub fn buffered<R: AsyncRead>(r: R) -> BufReader<R> {
    BufReader::new(r)
}
