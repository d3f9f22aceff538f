//! Component F: broadcast (spec §4.F).
//!
//! The compiler's `BroadcastStack` coalesces every send of the same port
//! within one block into a single `broadcast` call, so the runtime only
//! ever needs to read the value once and fan it out to every destination
//! concurrently — this is the one place a File payload is read from disk
//! a single time regardless of how many peers receive it.

use std::net::SocketAddr;

use swirl_model::PortValue;

use crate::error::{Result, RuntimeError};
use crate::transport::send_prepared;

/// Sends `value` to every address in `dst_addrs`, concurrently.
pub async fn broadcast(
    value: &PortValue,
    src_location_name: &str,
    port_name: &str,
    dst_addrs: &[SocketAddr],
) -> Result<()> {
    if dst_addrs.is_empty() {
        return Ok(());
    }

    let preloaded = match value {
        PortValue::File(path) => Some(tokio::fs::read(path).await?),
        _ => None,
    };

    let mut tasks = Vec::with_capacity(dst_addrs.len());
    for addr in dst_addrs {
        let addr = *addr;
        let value = value.clone();
        let preloaded = preloaded.clone();
        let src = src_location_name.to_string();
        let port = port_name.to_string();
        tasks.push(tokio::spawn(async move {
            send_prepared(&value, preloaded.as_deref(), &src, &port, addr).await
        }));
    }

    for task in tasks {
        task.await.map_err(|e| RuntimeError::Handshake(format!("broadcast task panicked: {e}")))??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::ConnectionMux;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_receiver() -> (Arc<ConnectionMux>, SocketAddr) {
        let mux = Arc::new(ConnectionMux::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mux_clone = mux.clone();
        tokio::spawn(async move { mux_clone.accept_loop(listener).await });
        (mux, addr)
    }

    #[tokio::test]
    async fn fans_out_to_every_destination() {
        let (mux_a, addr_a) = spawn_receiver().await;
        let (mux_b, addr_b) = spawn_receiver().await;

        broadcast(&PortValue::Int(9), "loc0", "p1", &[addr_a, addr_b]).await.unwrap();

        let dest = tempfile::tempdir().unwrap();
        let a = crate::transport::recv(swirl_model::DataType::Int, "loc0", "p1", &mux_a, dest.path())
            .await
            .unwrap();
        let b = crate::transport::recv(swirl_model::DataType::Int, "loc0", "p1", &mux_b, dest.path())
            .await
            .unwrap();
        assert_eq!(a, PortValue::Int(9));
        assert_eq!(b, PortValue::Int(9));
    }

    #[tokio::test]
    async fn empty_destination_list_is_a_no_op() {
        broadcast(&PortValue::Int(1), "loc0", "p1", &[]).await.unwrap();
    }
}
