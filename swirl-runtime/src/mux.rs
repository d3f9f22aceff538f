//! Component B: the connection mux (spec §4.B).
//!
//! A single accept loop per location registers every inbound connection
//! under its `(peer, port)` handshake key. `recv` consumes exactly one
//! registration per call; a second connection for the same key before the
//! first is consumed is queued (FIFO) rather than rejected — the spec
//! allows either queueing or overwrite-with-error, and callers must not
//! rely on more than "one in-flight per (peer, port) per trace segment".

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};

use crate::codec;

/// How long `accept()` is allowed to block before the mux re-checks the
/// shutdown flag (spec §4.B: "short poll timeout so shutdown is responsive").
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

type Key = (String, String);

#[derive(Default)]
pub struct ConnectionMux {
    registry: Mutex<HashMap<Key, VecDeque<TcpStream>>>,
    notify: Notify,
    shutdown: AtomicBool,
}

impl ConnectionMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the accept loop until [`Self::shutdown`] is observed. Intended
    /// to be spawned as a background task by the façade.
    pub async fn accept_loop(&self, listener: TcpListener) {
        while !self.shutdown.load(Ordering::Relaxed) {
            let accepted = tokio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await;
            let (stream, peer_addr) = match accepted {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
                Err(_) => continue, // poll timeout, re-check shutdown flag
            };

            if let Err(e) = self.accept_one(stream).await {
                tracing::warn!(peer = %peer_addr, error = %e, "dropping inbound connection");
            }
        }
        tracing::debug!("accept loop stopped");
    }

    async fn accept_one(&self, mut stream: TcpStream) -> crate::error::Result<()> {
        let (peer, port) = {
            let (read_half, mut write_half) = stream.split();
            let mut reader = codec::buffered(read_half);
            let handshake = codec::read_handshake(&mut reader).await?;
            codec::write_ack(&mut write_half).await?;
            handshake
        };

        self.register(peer.clone(), port.clone(), stream).await;
        tracing::debug!(peer, port, "registered inbound stream");
        Ok(())
    }

    async fn register(&self, peer: String, port: String, stream: TcpStream) {
        let mut guard = self.registry.lock().await;
        guard.entry((peer, port)).or_default().push_back(stream);
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Waits until a stream registered for `(peer, port)` is available and
    /// removes it from the registry.
    pub async fn take(&self, peer: &str, port: &str) -> TcpStream {
        let key = (peer.to_string(), port.to_string());
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register this waiter before checking the registry, so a
            // `register()` that races in between cannot call
            // `notify_waiters()` before we are listening (lost wakeup).
            notified.as_mut().enable();
            {
                let mut guard = self.registry.lock().await;
                if let Some(queue) = guard.get_mut(&key) {
                    if let Some(stream) = queue.pop_front() {
                        return stream;
                    }
                }
            }
            notified.await;
        }
    }

    /// Stops the accept loop after its next poll timeout.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn registers_and_delivers_by_peer_port() {
        let mux = Arc::new(ConnectionMux::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mux_clone = mux.clone();
        let accept_task = tokio::spawn(async move {
            mux_clone.accept_loop(listener).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        codec::write_handshake(&mut client, "location0", "p1").await.unwrap();
        codec::read_ack(&mut client).await.unwrap();

        let stream = mux.take("location0", "p1").await;
        assert!(stream.peer_addr().is_ok());

        mux.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(3), accept_task).await;
    }

    #[tokio::test]
    async fn queues_second_registration_for_same_key() {
        let mux = Arc::new(ConnectionMux::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mux_clone = mux.clone();
        tokio::spawn(async move { mux_clone.accept_loop(listener).await });

        for _ in 0..2 {
            let mut client = TcpStream::connect(addr).await.unwrap();
            codec::write_handshake(&mut client, "location0", "p1").await.unwrap();
            codec::read_ack(&mut client).await.unwrap();
            let _ = client.shutdown().await;
        }

        // both registrations should be retrievable, in order.
        let _first = mux.take("location0", "p1").await;
        let _second = mux.take("location0", "p1").await;
    }
}
