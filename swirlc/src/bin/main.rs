//! `swirlc` CLI: compiles a workflow into a runnable per-location Cargo
//! project, or interprets one location of it in-process for local
//! testing. Mirrors the teacher's `clap::Parser`/`Subcommand` shape and
//! `tracing_subscriber` initialization.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use swirl_model::{Addresses, WorkflowConfig};
use swirlc::ast_io::WorkflowAst;
use swirlc::{backend, codegen, interp};

#[derive(Parser)]
#[command(name = "swirlc", version, about = "Distributed workflow compiler")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Lower a workflow AST + YAML config into a runnable Cargo project.
    Compile {
        /// Path to the workflow AST JSON document (stands in for parsed
        /// `.swirl` source; see `swirlc::ast_io`).
        #[arg(long)]
        workflow: PathBuf,

        /// Path to the YAML configuration (locations + dependencies).
        #[arg(long)]
        config: PathBuf,

        /// Output directory for the generated Cargo project.
        #[arg(long)]
        out: PathBuf,

        /// `[package] name` in the generated Cargo.toml.
        #[arg(long, default_value = "swirl-generated")]
        name: String,

        /// Relative path from the generated project back to `swirl-runtime`.
        #[arg(long, default_value = codegen::DEFAULT_RUNTIME_PATH)]
        runtime_path: String,

        /// Relative path from the generated project back to `swirl-model`.
        #[arg(long, default_value = codegen::DEFAULT_MODEL_PATH)]
        model_path: String,
    },

    /// Interpret one location of a workflow in-process, without codegen.
    RunLocation {
        #[arg(long)]
        workflow: PathBuf,

        #[arg(long)]
        config: PathBuf,

        /// Name of the location to run, as declared in the config/AST.
        #[arg(long)]
        loc: String,

        /// Address map file (spec §6): `<location>,<host>,<host:port>` per line.
        #[arg(long)]
        address_map: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Cmd::Compile { workflow, config, out, name, runtime_path, model_path } => {
            compile(&workflow, &config, &out, &name, &runtime_path, &model_path).await
        }
        Cmd::RunLocation { workflow, config, loc, address_map } => {
            run_location(&workflow, &config, &loc, &address_map).await
        }
    }
}

async fn compile(
    workflow_path: &Path,
    config_path: &Path,
    out_dir: &Path,
    package_name: &str,
    runtime_path: &str,
    model_path: &str,
) -> anyhow::Result<()> {
    let ast = WorkflowAst::from_file(workflow_path)?;
    let config = WorkflowConfig::from_file(config_path)?;
    let workflow = ast.into_workflow(config);

    tracing::info!(locations = workflow.locations.len(), ports = workflow.ports.len(), "compiling workflow");

    let compiled = backend::compile_workflow(&workflow)?;
    let project = codegen::render_project(&workflow, &compiled, package_name, runtime_path, model_path)?;
    project.write_to(out_dir).await?;

    tracing::info!(out = %out_dir.display(), locations = compiled.len(), "generated project written");
    println!("compiled {} location(s) into {}", compiled.len(), out_dir.display());
    Ok(())
}

async fn run_location(
    workflow_path: &Path,
    config_path: &Path,
    location_name: &str,
    address_map_path: &Path,
) -> anyhow::Result<()> {
    let ast = WorkflowAst::from_file(workflow_path)?;
    let config = WorkflowConfig::from_file(config_path)?;
    let workflow = ast.into_workflow(config);

    let location = workflow
        .location(location_name)
        .ok_or_else(|| anyhow::anyhow!("location `{location_name}` not declared in config"))?
        .clone();
    let addresses = Addresses::from_file(address_map_path)?;
    let listen_addr: SocketAddr = format!("{}:{}", location.hostname, location.listen_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address for `{location_name}`: {e}"))?;

    let started = std::time::Instant::now();
    let communicator = Arc::new(
        swirl_runtime::Communicator::new(location.name.clone(), listen_addr, addresses, PathBuf::from(&location.workdir)).await?,
    );

    interp::run_location(&workflow, location_name, communicator).await?;
    tracing::info!(location = location_name, elapsed = ?started.elapsed(), "location finished");
    println!("location {location_name} finished in {:?}", started.elapsed());
    Ok(())
}
