//! Component E: send/recv over the TCP mesh (spec §4.A, §4.E).
//!
//! Connection setup is symmetric: the sender always initiates, retrying
//! indefinitely (no max-retry cutoff — spec §7 treats a refused connect as
//! non-fatal) at a fixed one-second interval. The receiving side is
//! already holding an accepted, handshake-acked [`TcpStream`] from the
//! [`crate::mux::ConnectionMux`] by the time `recv` is called.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use swirl_model::{DataType, PortValue};

use crate::codec;
use crate::error::{Result, RuntimeError};
use crate::mux::ConnectionMux;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

async fn connect_with_retry(addr: SocketAddr) -> TcpStream {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return stream,
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect failed, retrying");
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
            }
        }
    }
}

/// Sends `value` to `dst_addr`, identifying this transfer to the peer's
/// mux as `(src_location_name, port_name)`.
pub async fn send(
    value: &PortValue,
    src_location_name: &str,
    port_name: &str,
    dst_addr: SocketAddr,
) -> Result<()> {
    let preloaded = match value {
        PortValue::File(path) => Some(tokio::fs::read(path).await?),
        _ => None,
    };
    send_prepared(value, preloaded.as_deref(), src_location_name, port_name, dst_addr).await
}

/// Same as [`send`], but takes an already-loaded File payload instead of
/// reading it from disk — used by [`crate::broadcast`] so a file is read
/// from disk once regardless of fan-out width.
pub(crate) async fn send_prepared(
    value: &PortValue,
    preloaded: Option<&[u8]>,
    src_location_name: &str,
    port_name: &str,
    dst_addr: SocketAddr,
) -> Result<()> {
    let mut stream = connect_with_retry(dst_addr).await;

    codec::write_handshake(&mut stream, src_location_name, port_name).await?;
    codec::read_ack(&mut stream).await?;

    match value {
        PortValue::File(path) => {
            let filename = path
                .file_name()
                .ok_or_else(|| RuntimeError::MalformedPayload {
                    port: port_name.to_string(),
                    expected: "file".into(),
                    reason: format!("`{}` has no file name component", path.display()),
                })?
                .to_string_lossy()
                .into_owned();

            codec::write_filename_header(&mut stream, &filename).await?;
            codec::read_ack(&mut stream).await?;

            match preloaded {
                Some(bytes) => stream.write_all(bytes).await?,
                None => {
                    let bytes = tokio::fs::read(path).await?;
                    stream.write_all(&bytes).await?;
                }
            }
        }
        scalar => {
            stream.write_all(scalar.as_wire_string().as_bytes()).await?;
        }
    }

    stream.shutdown().await?;
    Ok(())
}

/// Receives one value for `(peer, port)`, blocking on the mux until the
/// corresponding connection has been accepted. `expected` disambiguates
/// whether a filename header precedes the payload. File payloads are
/// written under `dest_dir`.
pub async fn recv(
    expected: DataType,
    peer: &str,
    port: &str,
    mux: &ConnectionMux,
    dest_dir: &Path,
) -> Result<PortValue> {
    let mut stream = mux.take(peer, port).await;

    match expected {
        DataType::File => {
            let filename = {
                let (read_half, mut write_half) = stream.split();
                let mut reader = codec::buffered(read_half);
                let filename = codec::read_filename_header(&mut reader).await?;
                codec::write_ack(&mut write_half).await?;
                filename
            };

            let body = codec::read_to_eof(&mut stream).await?;
            tokio::fs::create_dir_all(dest_dir).await?;
            let dest_path: PathBuf = dest_dir.join(&filename);
            tokio::fs::write(&dest_path, &body).await?;
            Ok(PortValue::File(dest_path))
        }
        other => {
            let body = codec::read_to_eof(&mut stream).await?;
            parse_scalar(other, port, &body)
        }
    }
}

fn parse_scalar(expected: DataType, port: &str, body: &[u8]) -> Result<PortValue> {
    let text = std::str::from_utf8(body)
        .map_err(|e| RuntimeError::MalformedPayload {
            port: port.to_string(),
            expected: format!("{expected:?}"),
            reason: e.to_string(),
        })?
        .to_string();

    match expected {
        DataType::String => Ok(PortValue::String(text)),
        DataType::Int => text.parse::<i64>().map(PortValue::Int).map_err(|e| RuntimeError::MalformedPayload {
            port: port.to_string(),
            expected: "int".into(),
            reason: e.to_string(),
        }),
        DataType::Bool => text.parse::<bool>().map(PortValue::Bool).map_err(|e| RuntimeError::MalformedPayload {
            port: port.to_string(),
            expected: "bool".into(),
            reason: e.to_string(),
        }),
        DataType::File => unreachable!("handled by caller"),
    }
}
