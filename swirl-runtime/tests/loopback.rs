//! Crate-level integration coverage for [`swirl_runtime::Communicator`]
//! over real loopback TCP — complementary to the inline `#[cfg(test)]`
//! unit tests, which exercise the codec/mux/port-store layers in
//! isolation. These tests bind real sockets and run a real subprocess.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use swirl_model::{Addresses, Argument, DataType, Processor, PortValue, Step};
use swirl_runtime::Communicator;

fn free_addr() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn communicator(name: &str, addresses: Addresses, workdir: &std::path::Path) -> Communicator {
    Communicator::new(name, free_addr(), addresses, workdir.to_path_buf()).await.unwrap()
}

#[tokio::test]
async fn broadcast_fans_one_value_out_to_two_receivers() {
    let dir_src = tempfile::tempdir().unwrap();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let comm_a = communicator("loc_a", Addresses::default(), dir_a.path()).await;
    let comm_b = communicator("loc_b", Addresses::default(), dir_b.path()).await;
    let addr_a = comm_a.local_addr();
    let addr_b = comm_b.local_addr();

    let addresses_src = Addresses::from_str(&format!(
        "loc_a,127.0.0.1,{addr_a}\nloc_b,127.0.0.1,{addr_b}\n"
    ))
    .unwrap();
    let comm_src = communicator("loc_src", addresses_src, dir_src.path()).await;
    comm_src.init_port("msg", PortValue::String("hello".into())).await.unwrap();

    let send_task = tokio::spawn(async move {
        comm_src
            .broadcast("msg", "in", &["loc_a".to_string(), "loc_b".to_string()])
            .await
    });

    let (recv_a, recv_b) = tokio::join!(
        comm_a.recv("in", DataType::String, "loc_src", "in"),
        comm_b.recv("in", DataType::String, "loc_src", "in"),
    );
    recv_a.unwrap();
    recv_b.unwrap();
    send_task.await.unwrap().unwrap();

    comm_a.close().await;
    comm_b.close().await;
}

#[tokio::test]
async fn exec_output_flows_to_a_peer_location_as_a_file() {
    let dir_producer = tempfile::tempdir().unwrap();
    let dir_consumer = tempfile::tempdir().unwrap();

    let comm_consumer = communicator("consumer", Addresses::default(), dir_consumer.path()).await;
    let addr_consumer = comm_consumer.local_addr();

    let addresses_producer = Addresses::from_str(&format!("consumer,127.0.0.1,{addr_consumer}\n")).unwrap();
    let comm_producer = communicator("producer", addresses_producer, dir_producer.path()).await;

    let mut processors = BTreeMap::new();
    processors.insert("out".to_string(), Processor { glob: "greeting.txt".to_string() });
    let step = Step {
        name: "write_greeting".into(),
        display_name: "write_greeting".into(),
        command: "sh".into(),
        arguments: vec![
            Argument::Literal("-c".into()),
            Argument::Literal("echo hi > greeting.txt".into()),
        ],
        processors,
    };

    comm_producer.exec(&step, &[], Some("out")).await.unwrap();

    let send_task = tokio::spawn(async move { comm_producer.send("out", "consumer", "in").await });
    comm_consumer.recv("in", DataType::File, "producer", "in").await.unwrap();
    send_task.await.unwrap().unwrap();

    comm_consumer.close().await;
}
