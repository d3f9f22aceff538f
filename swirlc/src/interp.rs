//! In-process interpreter for a single compiled location.
//!
//! [`crate::backend`] lowers an [`Expr`] tree into generated Rust source
//! text; this module walks the same tree and the same emission rules
//! (spec §4.H) but *executes* them directly against a live
//! [`Communicator`] instead of emitting source — real `tokio::spawn`
//! tasks instead of string-rendered ones, joined the same way. It exists
//! so `swirlc run-location` can drive a workflow locally without a
//! codegen → `cargo build` → exec round trip, which is useful for
//! development and for the crate's own integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use swirl_model::{Expr, Workflow};
use swirl_runtime::Communicator;

use crate::error::{CompileError, InterpError, InterpResult};

type TaskHandle = tokio::task::JoinHandle<Result<(), swirl_runtime::RuntimeError>>;

#[derive(Default)]
struct GroupStack {
    stack: Vec<Vec<TaskHandle>>,
}

impl GroupStack {
    fn new() -> Self {
        Self { stack: vec![Vec::new()] }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn push_group(&mut self) {
        self.stack.push(Vec::new());
    }

    fn pop_group(&mut self) -> Vec<TaskHandle> {
        self.stack.pop().unwrap_or_default()
    }

    fn flush_group(&mut self) -> Vec<TaskHandle> {
        let tasks = self.stack.pop().unwrap_or_default();
        self.stack.push(Vec::new());
        tasks
    }

    fn add_task(&mut self, handle: TaskHandle) {
        self.stack.last_mut().expect("group stack is never empty").push(handle);
    }
}

/// Mirrors [`crate::backend`]'s `BroadcastStack`: accumulates `(port,
/// dst)` pairs within one block so repeated sends of the same port
/// coalesce into one `Communicator::broadcast` call at the next flush
/// point.
#[derive(Default)]
struct BroadcastStack {
    pending: BTreeMap<String, Vec<String>>,
    order: Vec<String>,
}

impl BroadcastStack {
    fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, port: &str, dst: &str) {
        if !self.pending.contains_key(port) {
            self.order.push(port.to_string());
        }
        self.pending.entry(port.to_string()).or_default().push(dst.to_string());
    }

    fn drain(&mut self) -> Vec<(String, Vec<String>)> {
        let order = std::mem::take(&mut self.order);
        let mut pending = std::mem::take(&mut self.pending);
        order.into_iter().filter_map(|port| pending.remove(&port).map(|dsts| (port, dsts))).collect()
    }
}

struct LocationCtx {
    communicator: Arc<Communicator>,
    groups: GroupStack,
    broadcasts: BroadcastStack,
}

impl LocationCtx {
    fn new(communicator: Arc<Communicator>) -> Self {
        Self { communicator, groups: GroupStack::new(), broadcasts: BroadcastStack::new() }
    }
}

/// Runs the `<location_name, dataset, body>` node of `workflow` matching
/// `location_name` against a live [`Communicator`] for that location.
/// Returns once every task the body spawned (including coalesced
/// broadcasts) has completed; the first failing task's error is surfaced.
pub async fn run_location(
    workflow: &Workflow,
    location_name: &str,
    communicator: Arc<Communicator>,
) -> InterpResult<()> {
    let (dataset, body) = find_location(&workflow.root, location_name)
        .ok_or_else(|| CompileError::UnknownLocation(location_name.to_string()))?;

    let mut ctx = LocationCtx::new(communicator);
    init_dataset(&mut ctx, workflow, dataset).await?;
    exec_expr(&mut ctx, body).await?;

    flush_broadcasts(&mut ctx);
    let depth = ctx.groups.depth();
    if depth != 1 {
        return Err(CompileError::UnbalancedGroups(location_name.to_string(), depth).into());
    }
    join_all(ctx.groups.pop_group()).await
}

fn find_location<'e>(expr: &'e Expr, location_name: &str) -> Option<(&'e [(String, String)], &'e Expr)> {
    match expr {
        Expr::Location { location, dataset, body } if location == location_name => {
            Some((dataset.as_slice(), body.as_ref()))
        }
        Expr::Location { .. } => None,
        Expr::Par(items) | Expr::Seq(items) => {
            items.iter().find_map(|item| find_location(item, location_name))
        }
        Expr::Paren(inner) => find_location(inner, location_name),
        Expr::Choice(_) | Expr::Exec { .. } | Expr::Send { .. } | Expr::Recv { .. } => None,
    }
}

async fn init_dataset(ctx: &mut LocationCtx, workflow: &Workflow, dataset: &[(String, String)]) -> InterpResult<()> {
    for (port_name, data_name) in dataset {
        let data = workflow.data(data_name).ok_or_else(|| CompileError::UnknownData(data_name.clone()))?;
        ctx.communicator.init_port(port_name, data.value.clone()).await?;
    }
    Ok(())
}

fn exec_expr<'a>(
    ctx: &'a mut LocationCtx,
    expr: &'a Expr,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = InterpResult<()>> + 'a>> {
    Box::pin(async move {
        match expr {
            Expr::Location { .. } => Err(CompileError::NestedLocation.into()),
            Expr::Choice(_) => Err(CompileError::NotImplemented("choice".into()).into()),
            Expr::Par(items) => {
                for item in items {
                    exec_expr(&mut *ctx, item).await?;
                }
                Ok(())
            }
            Expr::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    exec_expr(&mut *ctx, item).await?;
                    if i + 1 < items.len() {
                        flush_broadcasts(ctx);
                        join_all(ctx.groups.flush_group()).await?;
                    }
                }
                Ok(())
            }
            Expr::Paren(inner) => exec_paren(&mut *ctx, inner).await,
            Expr::Exec { step, flow, mapping: _ } => {
                let inputs: Vec<String> = flow.0.iter().map(|(port, _)| port.clone()).collect();
                let output_port = flow.1.iter().next().map(|(port, _)| port.clone());
                let communicator = ctx.communicator.clone();
                let step = step.clone();
                let handle = tokio::spawn(async move {
                    communicator.exec(&step, &inputs, output_port.as_deref()).await
                });
                ctx.groups.add_task(handle);
                Ok(())
            }
            Expr::Send { port, dst, .. } => {
                ctx.broadcasts.push(port, dst);
                Ok(())
            }
            Expr::Recv { port, data_type, src, dst: _ } => {
                let communicator = ctx.communicator.clone();
                let port = port.clone();
                let src = src.clone();
                let data_type = *data_type;
                let handle = tokio::spawn(async move { communicator.recv(&port, data_type, &src, &port).await });
                ctx.groups.add_task(handle);
                Ok(())
            }
        }
    })
}

async fn exec_paren(ctx: &mut LocationCtx, inner: &Expr) -> InterpResult<()> {
    flush_broadcasts(ctx);

    let communicator = ctx.communicator.clone();
    let inner = inner.clone();
    let handle: TaskHandle = tokio::spawn(async move {
        let mut sub_ctx = LocationCtx::new(communicator);
        if let Err(e) = exec_expr(&mut sub_ctx, &inner).await {
            return Err(interp_error_to_runtime(e));
        }
        flush_broadcasts(&mut sub_ctx);
        if sub_ctx.groups.depth() != 1 {
            return Err(swirl_runtime::RuntimeError::Handshake("unbalanced group nesting inside paren".into()));
        }
        join_all(sub_ctx.groups.pop_group()).await.map_err(interp_error_to_runtime)
    });
    ctx.groups.add_task(handle);
    Ok(())
}

/// The spawned `paren` task must report a single concrete runtime error
/// type across the `tokio::JoinHandle`; a pre-execution [`CompileError`]
/// surfacing from inside a nested block is therefore folded into the
/// nearest equivalent [`swirl_runtime::RuntimeError`] rather than lost.
fn interp_error_to_runtime(e: InterpError) -> swirl_runtime::RuntimeError {
    match e {
        InterpError::Runtime(re) => re,
        other => swirl_runtime::RuntimeError::Handshake(other.to_string()),
    }
}

fn flush_broadcasts(ctx: &mut LocationCtx) {
    for (port, dsts) in ctx.broadcasts.drain() {
        let communicator = ctx.communicator.clone();
        let handle: TaskHandle = if dsts.len() == 1 {
            let dst = dsts.into_iter().next().unwrap();
            tokio::spawn(async move { communicator.send(&port, &dst, &port).await })
        } else {
            tokio::spawn(async move { communicator.broadcast(&port, &port, &dsts).await })
        };
        ctx.groups.add_task(handle);
    }
}

async fn join_all(tasks: Vec<TaskHandle>) -> InterpResult<()> {
    let mut first_err = None;
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => first_err.get_or_insert(InterpError::Runtime(e)),
            Err(join_err) => first_err.get_or_insert(InterpError::Join(join_err.to_string())),
        };
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swirl_model::{Addresses, DataType, Location, Port, PortValue};

    fn location(name: &str) -> Location {
        Location { name: name.to_string(), hostname: "127.0.0.1".into(), listen_port: 0, workdir: "/workdir".into() }
    }

    async fn communicator(name: &str, addresses: Addresses, workdir: &std::path::Path) -> Arc<Communicator> {
        let addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
        Arc::new(Communicator::new(name, addr, addresses, workdir.to_path_buf()).await.unwrap())
    }

    #[tokio::test]
    async fn send_and_recv_round_trip_through_the_interpreter() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        let comm_b = communicator("l1", Addresses::default(), dir_b.path()).await;
        let addr_b = comm_b.local_addr();

        let addresses_a = Addresses::from_str(&format!("l1,127.0.0.1,{addr_b}\n")).unwrap();
        let comm_a = communicator("l0", addresses_a, dir_a.path()).await;

        let mut data = BTreeMap::new();
        data.insert("d1".to_string(), swirl_model::Data { name: "d1".into(), ty: DataType::String, value: PortValue::String("hi".into()) });

        let workflow = Workflow::new(
            BTreeMap::from([("l0".to_string(), location("l0")), ("l1".to_string(), location("l1"))]),
            BTreeMap::from([("p1".to_string(), Port::new("p1"))]),
            data,
            Expr::Par(vec![
                Expr::Location {
                    location: "l0".into(),
                    dataset: vec![("p1".to_string(), "d1".to_string())],
                    body: Box::new(Expr::Send { data: "d1".into(), port: "p1".into(), data_type: DataType::String, src: "l0".into(), dst: "l1".into() }),
                },
                Expr::Location {
                    location: "l1".into(),
                    dataset: vec![],
                    body: Box::new(Expr::Recv { port: "p1".into(), data_type: DataType::String, src: "l0".into(), dst: "l1".into() }),
                },
            ]),
        );

        let (r0, r1) = tokio::join!(
            run_location(&workflow, "l0", comm_a.clone()),
            run_location(&workflow, "l1", comm_b.clone()),
        );
        r0.unwrap();
        r1.unwrap();
    }

    #[test]
    fn unknown_location_is_rejected() {
        let workflow = Workflow::new(
            BTreeMap::from([("l0".to_string(), location("l0"))]),
            BTreeMap::new(),
            BTreeMap::new(),
            Expr::Location { location: "l0".into(), dataset: vec![], body: Box::new(Expr::Par(vec![])) },
        );
        assert!(find_location(&workflow.root, "ghost").is_none());
    }
}
