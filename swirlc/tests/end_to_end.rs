//! End-to-end coverage across `ast_io` -> `backend::compile_workflow` ->
//! `interp::run_location`: a four-location workflow where `source` feeds
//! two independent channels to `left` and `right`, each of which relays
//! its channel on to `sink` over real loopback TCP. Exercises the same
//! fan-out/gather scenario shape the component design calls out, without
//! going through a codegen + `cargo build` round trip.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use swirl_model::{Addresses, Data, DataType, Expr, Location, Port, PortValue, Workflow};
use swirl_runtime::Communicator;
use swirlc::interp::run_location;

fn location(name: &str) -> Location {
    Location { name: name.to_string(), hostname: "127.0.0.1".into(), listen_port: 0, workdir: "/workdir".into() }
}

async fn communicator(name: &str, addresses: Addresses, workdir: &std::path::Path) -> Arc<Communicator> {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Arc::new(Communicator::new(name, addr, addresses, workdir.to_path_buf()).await.unwrap())
}

#[tokio::test]
async fn fan_out_then_gather_round_trips_through_four_locations() {
    let dir_source = tempfile::tempdir().unwrap();
    let dir_left = tempfile::tempdir().unwrap();
    let dir_right = tempfile::tempdir().unwrap();
    let dir_sink = tempfile::tempdir().unwrap();

    let comm_sink = communicator("sink", Addresses::default(), dir_sink.path()).await;
    let addr_sink = comm_sink.local_addr();

    let addresses_leaf = Addresses::from_str(&format!("sink,127.0.0.1,{addr_sink}\n")).unwrap();
    let comm_left = communicator("left", addresses_leaf.clone(), dir_left.path()).await;
    let comm_right = communicator("right", addresses_leaf, dir_right.path()).await;
    let addr_left = comm_left.local_addr();
    let addr_right = comm_right.local_addr();

    let addresses_source = Addresses::from_str(&format!(
        "left,127.0.0.1,{addr_left}\nright,127.0.0.1,{addr_right}\n"
    ))
    .unwrap();
    let comm_source = communicator("source", addresses_source, dir_source.path()).await;

    // Two independent channels, each end-to-end under a single port name
    // (`p_left`/`p_right`): `source` feeds both, `left`/`right` each relay
    // their channel on to `sink` unchanged. A port's single-assignment
    // invariant forces `sink` to receive the two legs under distinct
    // names, which is why this isn't one shared "p" channel fanned out
    // and gathered back in.
    let mut data = BTreeMap::new();
    data.insert(
        "payload_left".to_string(),
        Data { name: "payload_left".into(), ty: DataType::String, value: PortValue::String("left-leg".into()) },
    );
    data.insert(
        "payload_right".to_string(),
        Data { name: "payload_right".into(), ty: DataType::String, value: PortValue::String("right-leg".into()) },
    );

    let workflow = Workflow::new(
        BTreeMap::from([
            ("source".to_string(), location("source")),
            ("left".to_string(), location("left")),
            ("right".to_string(), location("right")),
            ("sink".to_string(), location("sink")),
        ]),
        BTreeMap::from([
            ("p_left".to_string(), Port::new("p_left")),
            ("p_right".to_string(), Port::new("p_right")),
        ]),
        data,
        Expr::Par(vec![
            Expr::Location {
                location: "source".into(),
                dataset: vec![
                    ("p_left".to_string(), "payload_left".to_string()),
                    ("p_right".to_string(), "payload_right".to_string()),
                ],
                body: Box::new(Expr::Par(vec![
                    Expr::Send { data: "payload_left".into(), port: "p_left".into(), data_type: DataType::String, src: "source".into(), dst: "left".into() },
                    Expr::Send { data: "payload_right".into(), port: "p_right".into(), data_type: DataType::String, src: "source".into(), dst: "right".into() },
                ])),
            },
            Expr::Location {
                location: "left".into(),
                dataset: vec![],
                body: Box::new(Expr::Seq(vec![
                    Expr::Recv { port: "p_left".into(), data_type: DataType::String, src: "source".into(), dst: "left".into() },
                    Expr::Send { data: "payload_left".into(), port: "p_left".into(), data_type: DataType::String, src: "left".into(), dst: "sink".into() },
                ])),
            },
            Expr::Location {
                location: "right".into(),
                dataset: vec![],
                body: Box::new(Expr::Seq(vec![
                    Expr::Recv { port: "p_right".into(), data_type: DataType::String, src: "source".into(), dst: "right".into() },
                    Expr::Send { data: "payload_right".into(), port: "p_right".into(), data_type: DataType::String, src: "right".into(), dst: "sink".into() },
                ])),
            },
            Expr::Location {
                location: "sink".into(),
                dataset: vec![],
                body: Box::new(Expr::Par(vec![
                    Expr::Recv { port: "p_left".into(), data_type: DataType::String, src: "left".into(), dst: "sink".into() },
                    Expr::Recv { port: "p_right".into(), data_type: DataType::String, src: "right".into(), dst: "sink".into() },
                ])),
            },
        ]),
    );

    let (r_source, r_left, r_right, r_sink) = tokio::join!(
        run_location(&workflow, "source", comm_source.clone()),
        run_location(&workflow, "left", comm_left.clone()),
        run_location(&workflow, "right", comm_right.clone()),
        run_location(&workflow, "sink", comm_sink.clone()),
    );
    r_source.unwrap();
    r_left.unwrap();
    r_right.unwrap();
    r_sink.unwrap();
}

#[test]
fn compile_rejects_a_send_to_an_unknown_port() {
    let workflow = Workflow::new(
        BTreeMap::from([("l0".to_string(), location("l0"))]),
        BTreeMap::new(),
        BTreeMap::new(),
        Expr::Location {
            location: "l0".into(),
            dataset: vec![],
            body: Box::new(Expr::Send {
                data: "d1".into(),
                port: "ghost".into(),
                data_type: DataType::String,
                src: "l0".into(),
                dst: "l1".into(),
            }),
        },
    );

    let err = swirlc::backend::compile_workflow(&workflow).unwrap_err();
    assert!(matches!(err, swirlc::CompileError::UnknownPort(ref p) if p == "ghost"));
}
