//! Component G: the `Communicator` façade (spec §4.G).
//!
//! This is the only type the generated per-location binaries call into.
//! It owns one location's listening socket, its port store, and the
//! address map used to dial peers, and exposes exactly the operations the
//! compiled task graph needs: `init_port`, `exec`, `send`, `recv`,
//! `broadcast`, and `close`.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use swirl_model::{Addresses, DataType, PortValue, Step};

use crate::broadcast;
use crate::error::{Result, RuntimeError};
use crate::executor;
use crate::mux::ConnectionMux;
use crate::port_store::PortStore;
use crate::transport;

pub struct Communicator {
    own_location: String,
    addresses: Addresses,
    mux: std::sync::Arc<ConnectionMux>,
    ports: PortStore,
    workdir: PathBuf,
    accept_task: JoinHandle<()>,
    listen_addr: SocketAddr,
}

impl Communicator {
    /// Binds `listen_addr` and starts the accept loop. `own_location` is
    /// the name this location identifies itself as in outbound handshakes.
    pub async fn new(
        own_location: impl Into<String>,
        listen_addr: SocketAddr,
        addresses: Addresses,
        workdir: PathBuf,
    ) -> Result<Self> {
        let own_location = own_location.into();
        let listener = TcpListener::bind(listen_addr).await?;
        let bound_addr = listener.local_addr()?;
        let mux = std::sync::Arc::new(ConnectionMux::new());

        let mux_clone = mux.clone();
        let accept_task = tokio::spawn(async move {
            mux_clone.accept_loop(listener).await;
        });

        tokio::fs::create_dir_all(&workdir).await?;

        tracing::info!(location = %own_location, %listen_addr, "communicator ready");
        Ok(Self {
            own_location,
            addresses,
            mux,
            ports: PortStore::new(),
            workdir,
            accept_task,
            listen_addr: bound_addr,
        })
    }

    /// The address the accept loop actually bound to (useful when
    /// `listen_addr`'s port was `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    fn resolve(&self, location: &str) -> Result<&str> {
        Ok(self.addresses.get(location)?)
    }

    async fn resolve_addr(&self, location: &str) -> Result<SocketAddr> {
        let dial = self.resolve(location)?;
        tokio::net::lookup_host(dial)
            .await?
            .next()
            .ok_or_else(|| RuntimeError::Handshake(format!("`{dial}` resolved to no addresses")))
    }

    /// Compiler-emitted, one-shot seeding of a dataset binding.
    pub async fn init_port(&self, port: &str, value: PortValue) -> Result<()> {
        self.ports.init_port(port, value).await
    }

    /// Runs a step, awaiting its declared inputs and writing its output
    /// (if any) back into the port store.
    pub async fn exec(&self, step: &Step, inputs: &[String], output_port: Option<&str>) -> Result<()> {
        executor::exec(step, inputs, output_port, &self.ports, &self.workdir).await
    }

    /// Awaits `local_port`, then sends its value to `(dst_location,
    /// dst_port)`.
    pub async fn send(&self, local_port: &str, dst_location: &str, dst_port: &str) -> Result<()> {
        let value = self.ports.await_port(local_port).await;
        let addr = self.resolve_addr(dst_location).await?;
        transport::send(&value, &self.own_location, dst_port, addr).await
    }

    /// Receives a value addressed from `(peer_location, peer_port)` and
    /// writes it into `local_port`.
    pub async fn recv(
        &self,
        local_port: &str,
        expected: DataType,
        peer_location: &str,
        peer_port: &str,
    ) -> Result<()> {
        let value = transport::recv(expected, peer_location, peer_port, &self.mux, &self.workdir).await?;
        self.ports.set_port(local_port, value).await
    }

    /// Awaits `local_port`, then sends its value to every location in
    /// `dst_locations`, all addressed as `dst_port`.
    pub async fn broadcast(&self, local_port: &str, dst_port: &str, dst_locations: &[String]) -> Result<()> {
        let value = self.ports.await_port(local_port).await;
        let mut addrs = Vec::with_capacity(dst_locations.len());
        for location in dst_locations {
            addrs.push(self.resolve_addr(location).await?);
        }
        broadcast::broadcast(&value, &self.own_location, dst_port, &addrs).await
    }

    /// Stops the accept loop and waits for it to exit.
    pub async fn close(self) {
        self.mux.shutdown();
        let _ = self.accept_task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swirl_model::{Argument, Processor};
    use std::collections::BTreeMap;

    fn free_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn send_and_recv_round_trip_across_two_communicators() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        let comm_b = Communicator::new(
            "loc_b",
            free_addr(),
            Addresses::from_str("loc_a,127.0.0.1,127.0.0.1:1\n").unwrap(),
            dir_b.path().to_path_buf(),
        )
        .await
        .unwrap();
        let addr_b = comm_b.local_addr();

        let addresses_a =
            Addresses::from_str(&format!("loc_b,127.0.0.1,{addr_b}\n")).unwrap();
        let comm_a = Communicator::new("loc_a", free_addr(), addresses_a, dir_a.path().to_path_buf())
            .await
            .unwrap();

        comm_a.init_port("out", PortValue::String("ping".into())).await.unwrap();

        let send_task = {
            let comm_a = std::sync::Arc::new(comm_a);
            let comm_a_clone = comm_a.clone();
            tokio::spawn(async move { comm_a_clone.send("out", "loc_b", "in").await })
        };

        comm_b.recv("in", DataType::String, "loc_a", "in").await.unwrap();
        send_task.await.unwrap().unwrap();

        let value = comm_b.ports.await_port("in").await;
        assert_eq!(value, PortValue::String("ping".into()));

        comm_b.close().await;
    }

    #[tokio::test]
    async fn exec_then_send_flows_a_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let addresses = Addresses::from_str("loc0,127.0.0.1,127.0.0.1:1\n").unwrap();
        let comm = Communicator::new("loc0", free_addr(), addresses, dir.path().to_path_buf())
            .await
            .unwrap();

        let mut processors = BTreeMap::new();
        processors.insert("out".to_string(), Processor { glob: "result.txt".to_string() });
        let step = Step {
            name: "make_result".into(),
            display_name: "make_result".into(),
            command: "touch".into(),
            arguments: vec![Argument::Literal("result.txt".into())],
            processors,
        };

        comm.exec(&step, &[], Some("out")).await.unwrap();
        let value = comm.ports.await_port("out").await;
        assert!(matches!(value, PortValue::File(_)));

        comm.close().await;
    }
}
