//! Component H: the compilation back-end (spec §4.H).
//!
//! Lowers a [`swirl_model::Expr`] into one Rust statement block per
//! location, written in terms of the `swirl_runtime::Communicator`
//! façade. Grounded on the original Rust target's `ThreadStack`/emission
//! events, generalized from its per-call-site text splicing into a real
//! visitor over the in-memory AST, and corrected to spawn actual
//! `tokio::spawn` tasks joined in batches rather than the reference
//! implementation's same-named "thread" bookkeeping (see DESIGN.md).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use swirl_model::{Data, DataType, Expr, Flow, PortValue, Step, Workflow};

use crate::error::{CompileError, Result};

/// Per-location scoped task identifiers (spec §9 DESIGN NOTES): a stack
/// of groups, each holding the task-handle variable names spawned since
/// the last join point. Pushed on entering a parenthesized subtree,
/// popped (and joined) on leaving it.
#[derive(Default)]
struct GroupStack {
    stack: Vec<Vec<String>>,
    counter: usize,
}

impl GroupStack {
    fn new() -> Self {
        Self { stack: vec![Vec::new()], counter: 0 }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn push_group(&mut self) {
        self.stack.push(Vec::new());
    }

    /// Pops the top group without replacing it — used when a nesting
    /// level (paren, or the location body itself) is ending.
    fn pop_group(&mut self) -> Vec<String> {
        self.stack.pop().unwrap_or_default()
    }

    /// Takes the top group's tasks and replaces it with a fresh, empty
    /// one at the same depth — used at a `seq` barrier, which joins but
    /// keeps emitting into the same nesting level.
    fn flush_group(&mut self) -> Vec<String> {
        let tasks = self.stack.pop().unwrap_or_default();
        self.stack.push(Vec::new());
        tasks
    }

    fn add_task(&mut self) -> String {
        let name = format!("t{}", self.counter);
        self.counter += 1;
        self.stack.last_mut().expect("group stack is never empty").push(name.clone());
        name
    }
}

/// Accumulates `(port, dst)` sends within one block so repeated sends of
/// the same port coalesce into a single `broadcast` at the next flush
/// point (spec §4.F/§4.H). Destination order within a port's list is
/// insertion order; ports themselves flush in the order first seen.
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

    /// Drains every pending port, in first-seen order.
    fn drain(&mut self) -> Vec<(String, Vec<String>)> {
        let order = std::mem::take(&mut self.order);
        let mut pending = std::mem::take(&mut self.pending);
        order.into_iter().filter_map(|port| pending.remove(&port).map(|dsts| (port, dsts))).collect()
    }
}

struct LocationCtx<'w> {
    workflow: &'w Workflow,
    location: String,
    body: String,
    groups: GroupStack,
    broadcasts: BroadcastStack,
}

impl<'w> LocationCtx<'w> {
    fn new(workflow: &'w Workflow, location: String) -> Self {
        Self {
            workflow,
            location,
            body: String::new(),
            groups: GroupStack::new(),
            broadcasts: BroadcastStack::new(),
        }
    }
}

/// Everything the codegen layer needs to render one location's binary.
pub struct CompiledLocation {
    pub body: String,
    /// Every distinct `Step` executed at this location, keyed by name —
    /// rendered as a `fn <name>_step() -> swirl_model::Step` helper
    /// alongside the generated `main`.
    pub steps: BTreeMap<String, Step>,
}

/// Lowers every `<location, dataset, body>` node reachable from `root`
/// into a generated source body, keyed by location name.
pub fn compile_workflow(workflow: &Workflow) -> Result<BTreeMap<String, CompiledLocation>> {
    validate_ports(&workflow.root, workflow)?;
    let mut programs = BTreeMap::new();
    collect_locations(&workflow.root, workflow, &mut programs)?;
    Ok(programs)
}

/// Rejects a workflow that references a port outside `workflow.ports`
/// (spec §7 compile-error: "unknown port"), before any emission happens.
fn validate_ports(expr: &Expr, workflow: &Workflow) -> Result<()> {
    let known = |port: &str| -> Result<()> {
        if workflow.ports.contains_key(port) {
            Ok(())
        } else {
            Err(CompileError::UnknownPort(port.to_string()))
        }
    };
    match expr {
        Expr::Location { body, .. } => validate_ports(body, workflow),
        Expr::Par(items) | Expr::Seq(items) | Expr::Choice(items) => {
            items.iter().try_for_each(|item| validate_ports(item, workflow))
        }
        Expr::Paren(inner) => validate_ports(inner, workflow),
        Expr::Exec { flow, .. } => {
            flow.0.iter().chain(flow.1.iter()).try_for_each(|(port, _)| known(port))
        }
        Expr::Send { port, .. } | Expr::Recv { port, .. } => known(port),
    }
}

fn collect_locations(
    expr: &Expr,
    workflow: &Workflow,
    programs: &mut BTreeMap<String, CompiledLocation>,
) -> Result<()> {
    match expr {
        Expr::Location { location, dataset, body } => {
            let mut ctx = LocationCtx::new(workflow, location.clone());
            emit_dataset(&mut ctx, dataset)?;
            emit_expr(&mut ctx, body)?;
            finish_location(&mut ctx)?;

            let mut steps = BTreeMap::new();
            collect_steps(body, &mut steps);
            programs.insert(location.clone(), CompiledLocation { body: ctx.body, steps });
            Ok(())
        }
        Expr::Par(items) | Expr::Seq(items) => {
            for item in items {
                collect_locations(item, workflow, programs)?;
            }
            Ok(())
        }
        Expr::Paren(inner) => collect_locations(inner, workflow, programs),
        Expr::Choice(_) => Err(CompileError::NotImplemented("choice".into())),
        Expr::Exec { .. } | Expr::Send { .. } | Expr::Recv { .. } => {
            // A bare leaf at the top of the tree, outside any <location, ...>
            // wrapper, has no location to run at.
            Err(CompileError::UnknownLocation("<top-level expression outside a location>".into()))
        }
    }
}

fn collect_steps(expr: &Expr, steps: &mut BTreeMap<String, Step>) {
    match expr {
        Expr::Exec { step, .. } => {
            steps.insert(step.name.clone(), step.clone());
        }
        Expr::Par(items) | Expr::Seq(items) | Expr::Choice(items) => {
            for item in items {
                collect_steps(item, steps);
            }
        }
        Expr::Paren(inner) => collect_steps(inner, steps),
        Expr::Location { body, .. } => collect_steps(body, steps),
        Expr::Send { .. } | Expr::Recv { .. } => {}
    }
}

fn emit_dataset(ctx: &mut LocationCtx, dataset: &[(String, String)]) -> Result<()> {
    for (port_name, data_name) in dataset {
        let data = ctx
            .workflow
            .data(data_name)
            .ok_or_else(|| CompileError::UnknownData(data_name.clone()))?;
        let literal = port_value_literal(data)?;
        writeln!(ctx.body, "    communicator.init_port({port_name:?}, {literal}).await?;")
            .expect("writing to a String cannot fail");
    }
    Ok(())
}

fn port_value_literal(data: &Data) -> Result<String> {
    let literal = match (data.ty, &data.value) {
        (DataType::File, PortValue::File(path)) => {
            format!("PortValue::File(std::path::PathBuf::from({:?}))", path.display().to_string())
        }
        (DataType::String, PortValue::String(s)) => format!("PortValue::String({s:?}.to_string())"),
        (DataType::Int, PortValue::Int(i)) => format!("PortValue::Int({i})"),
        (DataType::Bool, PortValue::Bool(b)) => format!("PortValue::Bool({b})"),
        (ty, _) => return Err(CompileError::UnsupportedDataType(ty)),
    };
    Ok(literal)
}

fn emit_expr(ctx: &mut LocationCtx, expr: &Expr) -> Result<()> {
    match expr {
        Expr::Location { .. } => Err(CompileError::NestedLocation),
        Expr::Choice(_) => Err(CompileError::NotImplemented("choice".into())),
        Expr::Par(items) => {
            // begin_par/par/end_par are no-ops: every leaf is independently
            // joinable by default, so parallel composition just visits each
            // branch in turn, accumulating into the current group.
            for item in items {
                emit_expr(ctx, item)?;
            }
            Ok(())
        }
        Expr::Seq(items) => {
            for (i, item) in items.iter().enumerate() {
                emit_expr(ctx, item)?;
                if i + 1 < items.len() {
                    flush_broadcasts(ctx);
                    emit_join(ctx, ctx.groups.flush_group(), "sequential step");
                }
            }
            Ok(())
        }
        Expr::Paren(inner) => emit_paren(ctx, inner),
        Expr::Exec { step, flow, mapping: _ } => emit_exec(ctx, step, flow),
        Expr::Send { data: _, port, data_type: _, src: _, dst } => {
            ctx.broadcasts.push(port, dst);
            Ok(())
        }
        Expr::Recv { port, data_type, src, dst: _ } => emit_recv(ctx, port, *data_type, src),
    }
}

fn emit_paren(ctx: &mut LocationCtx, inner: &Expr) -> Result<()> {
    flush_broadcasts(ctx);

    let mut inner_body = String::new();
    let mut inner_groups = GroupStack::new();
    let mut inner_broadcasts = BroadcastStack::new();
    std::mem::swap(&mut ctx.body, &mut inner_body);
    std::mem::swap(&mut ctx.groups, &mut inner_groups);
    std::mem::swap(&mut ctx.broadcasts, &mut inner_broadcasts);

    let result = emit_expr(ctx, inner);

    std::mem::swap(&mut ctx.body, &mut inner_body);
    std::mem::swap(&mut ctx.groups, &mut inner_groups);
    std::mem::swap(&mut ctx.broadcasts, &mut inner_broadcasts);
    result?;

    // inner_body/inner_groups/inner_broadcasts now hold what the subtree
    // emitted; flush its trailing broadcasts and join before sealing it
    // into a spawned task (end_paren).
    let mut sub_ctx = LocationCtx {
        workflow: ctx.workflow,
        location: ctx.location.clone(),
        body: inner_body,
        groups: inner_groups,
        broadcasts: inner_broadcasts,
    };
    flush_broadcasts(&mut sub_ctx);
    let depth = sub_ctx.groups.depth();
    if depth != 1 {
        return Err(CompileError::UnbalancedGroups(ctx.location.clone(), depth));
    }
    emit_join(&mut sub_ctx, sub_ctx.groups.pop_group(), "end parenthetized step");

    let task = ctx.groups.add_task();
    writeln!(
        ctx.body,
        "    let {task} = tokio::spawn({{ let communicator = communicator.clone(); async move {{\n{}\n        Ok::<(), swirl_runtime::RuntimeError>(())\n    }} }});",
        sub_ctx.body
    )
    .expect("writing to a String cannot fail");
    Ok(())
}

fn emit_exec(ctx: &mut LocationCtx, step: &Step, flow: &Flow) -> Result<()> {
    let inputs: Vec<&str> = flow.0.iter().map(|(port, _)| port.as_str()).collect();
    let output_port = flow.1.iter().next().map(|(port, _)| port.as_str());

    let inputs_literal = inputs.iter().map(|p| format!("{p:?}.to_string()")).collect::<Vec<_>>().join(", ");
    let output_literal = match output_port {
        Some(p) => format!("Some({p:?})"),
        None => "None".to_string(),
    };

    let task = ctx.groups.add_task();
    writeln!(
        ctx.body,
        "    let {task} = tokio::spawn({{ let communicator = communicator.clone(); let step = {step_name}_step(); async move {{ communicator.exec(&step, &[{inputs}], {output}).await }} }});",
        step_name = step.name,
        inputs = inputs_literal,
        output = output_literal,
    )
    .expect("writing to a String cannot fail");
    Ok(())
}

fn emit_recv(ctx: &mut LocationCtx, port: &str, data_type: DataType, src: &str) -> Result<()> {
    let task = ctx.groups.add_task();
    let data_type = data_type_literal(data_type);
    writeln!(
        ctx.body,
        "    let {task} = tokio::spawn({{ let communicator = communicator.clone(); async move {{ communicator.recv({port:?}, {data_type}, {src:?}, {port:?}).await }} }});",
    )
    .expect("writing to a String cannot fail");
    Ok(())
}

fn data_type_literal(ty: DataType) -> &'static str {
    match ty {
        DataType::File => "swirl_model::DataType::File",
        DataType::String => "swirl_model::DataType::String",
        DataType::Int => "swirl_model::DataType::Int",
        DataType::Bool => "swirl_model::DataType::Bool",
    }
}

fn flush_broadcasts(ctx: &mut LocationCtx) {
    for (port, dsts) in ctx.broadcasts.drain() {
        let task = ctx.groups.add_task();
        if dsts.len() == 1 {
            let dst = &dsts[0];
            writeln!(
                ctx.body,
                "    let {task} = tokio::spawn({{ let communicator = communicator.clone(); async move {{ communicator.send({port:?}, {dst:?}, {port:?}).await }} }});",
            )
            .expect("writing to a String cannot fail");
        } else {
            let dst_list = dsts.iter().map(|d| format!("{d:?}.to_string()")).collect::<Vec<_>>().join(", ");
            writeln!(
                ctx.body,
                "    let {task} = tokio::spawn({{ let communicator = communicator.clone(); async move {{ communicator.broadcast({port:?}, {port:?}, &[{dst_list}]).await }} }});",
            )
            .expect("writing to a String cannot fail");
        }
    }
}

fn finish_location(ctx: &mut LocationCtx) -> Result<()> {
    flush_broadcasts(ctx);
    let depth = ctx.groups.depth();
    if depth != 1 {
        return Err(CompileError::UnbalancedGroups(ctx.location.clone(), depth));
    }
    let tasks = ctx.groups.pop_group();
    emit_join(ctx, tasks, "end location");
    Ok(())
}

/// Emits a batch join: every handle is awaited (sequentially, which is
/// safe — each task is already running concurrently since it was spawned
/// with `tokio::spawn`), and the first error surfaces via `?`. An empty
/// group is a no-op (spec §4.H: "empty join is a no-op").
fn emit_join(ctx: &mut LocationCtx, tasks: Vec<String>, label: &str) {
    if tasks.is_empty() {
        return;
    }
    writeln!(ctx.body, "    // {label}").expect("writing to a String cannot fail");
    for task in tasks {
        writeln!(ctx.body, "    {task}.await.expect(\"task panicked\")?;").expect("writing to a String cannot fail");
    }
}
