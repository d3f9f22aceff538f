//! Templated file emission for the compiled project (spec §1 ambient
//! glue, carried per SPEC_FULL.md — the original `cargo_file.py` /
//! `rust_lib.py` / `location_main.py` / `run_script.py`, reshaped around
//! real runtime values instead of the Python compiler's compile-time
//! `LocationID` enum; see DESIGN.md Open Question OQ-1).
//!
//! [`compile_workflow`](crate::backend::compile_workflow) lowers the AST
//! into one [`CompiledLocation`] body per location; this module wraps
//! those bodies into a runnable Cargo project: a `src/locations/<name>.rs`
//! per location, a dispatching `src/main.rs`, a `Cargo.toml`, an
//! `address_map.txt` template, and a `run.sh` launcher.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use swirl_model::{Argument, Step, Workflow};

use crate::backend::CompiledLocation;
use crate::error::{CompileError, Result};

/// Default relative path from the generated project's own directory back
/// to the `swirl-runtime`/`swirl-model` crates, assuming the conventional
/// layout where `swirlc compile --out <dir>` places its output as a
/// sibling of this workspace. Override with `--runtime-path` if not.
pub const DEFAULT_RUNTIME_PATH: &str = "../swirl-runtime";
pub const DEFAULT_MODEL_PATH: &str = "../swirl-model";

/// A fully rendered output project, held in memory until [`Self::write_to`].
pub struct GeneratedProject {
    pub cargo_toml: String,
    pub main_rs: String,
    pub locations_mod_rs: String,
    /// Keyed by location name; each is the contents of
    /// `src/locations/<name>.rs`.
    pub location_files: BTreeMap<String, String>,
    pub address_map_txt: String,
    pub run_sh: String,
}

impl GeneratedProject {
    /// Writes the project to `out_dir`, creating `src/locations/` as needed.
    pub async fn write_to(&self, out_dir: &Path) -> Result<()> {
        let src_dir = out_dir.join("src");
        let locations_dir = src_dir.join("locations");
        tokio::fs::create_dir_all(&locations_dir).await?;

        tokio::fs::write(out_dir.join("Cargo.toml"), &self.cargo_toml).await?;
        tokio::fs::write(src_dir.join("main.rs"), &self.main_rs).await?;
        tokio::fs::write(locations_dir.join("mod.rs"), &self.locations_mod_rs).await?;
        for (name, body) in &self.location_files {
            tokio::fs::write(locations_dir.join(format!("{name}.rs")), body).await?;
        }
        tokio::fs::write(out_dir.join("address_map.txt"), &self.address_map_txt).await?;

        let run_sh_path = out_dir.join("run.sh");
        tokio::fs::write(&run_sh_path, &self.run_sh).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&run_sh_path).await?.permissions();
            perms.set_mode(0o755);
            tokio::fs::set_permissions(&run_sh_path, perms).await?;
        }

        Ok(())
    }
}

/// Renders every compiled location into a [`GeneratedProject`].
///
/// `package_name` names the generated `Cargo.toml`'s `[package]`; it is
/// distinct from the `swirlc` package that compiled it.
pub fn render_project(
    workflow: &Workflow,
    compiled: &BTreeMap<String, CompiledLocation>,
    package_name: &str,
    runtime_path: &str,
    model_path: &str,
) -> Result<GeneratedProject> {
    let mut location_files = BTreeMap::new();
    let mut locations_mod_rs = String::new();
    let mut match_arms = String::new();

    for (name, program) in compiled {
        let location = workflow
            .location(name)
            .ok_or_else(|| CompileError::UnknownLocation(name.clone()))?;

        writeln!(locations_mod_rs, "pub mod {name};").expect("writing to a String cannot fail");
        writeln!(
            match_arms,
            "        {name:?} => locations::{name}::{name}(location.to_string(), addresses).await,"
        )
        .expect("writing to a String cannot fail");

        location_files.insert(name.clone(), render_location_file(name, location.workdir.as_str(), location.hostname.as_str(), location.listen_port, program));
    }

    let main_rs = render_main_rs(package_name, &match_arms);
    let cargo_toml = render_cargo_toml(package_name, runtime_path, model_path);
    let address_map_txt = render_address_map(workflow);
    let run_sh = render_run_sh(workflow, package_name);

    Ok(GeneratedProject {
        cargo_toml,
        main_rs,
        locations_mod_rs,
        location_files,
        address_map_txt,
        run_sh,
    })
}

fn render_cargo_toml(package_name: &str, runtime_path: &str, model_path: &str) -> String {
    format!(
        r#"# Generated by swirlc. Do not edit by hand — recompiling the workflow
# overwrites this file.
[package]
name = "{package_name}"
version = "0.1.0"
edition = "2021"

[[bin]]
name = "{package_name}"
path = "src/main.rs"

[dependencies]
swirl-runtime = {{ path = "{runtime_path}" }}
swirl-model = {{ path = "{model_path}" }}
tokio = {{ version = "1", features = ["full"] }}
clap = {{ version = "4", features = ["derive"] }}
tracing = "0.1"
tracing-subscriber = {{ version = "0.3", features = ["env-filter"] }}
"#
    )
}

fn render_main_rs(package_name: &str, match_arms: &str) -> String {
    format!(
        r#"// Generated by swirlc for workflow `{package_name}`. Do not edit by hand.

pub mod locations;

use clap::Parser;
use swirl_model::Addresses;
use tracing_subscriber::{{EnvFilter, fmt}};

#[derive(Parser)]
#[command(name = "{package_name}", about = "Generated swirl per-location executable")]
struct Cli {{
    /// Name of the location this process plays, as declared in the workflow.
    #[arg(long)]
    loc: String,

    /// Path to the address map file (spec §6): `<location>,<host>,<host:port>` per line.
    #[arg(long, default_value = "address_map.txt")]
    address_map: String,
}}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {{
    fmt()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let addresses = Addresses::from_file(&cli.address_map)?;
    let location = cli.loc.clone();
    let started = std::time::Instant::now();

    let result = run_location(&location, addresses).await;

    tracing::info!(location = %location, elapsed = ?started.elapsed(), "location finished");
    result?;
    Ok(())
}}

async fn run_location(
    location: &str,
    addresses: Addresses,
) -> Result<(), swirl_runtime::RuntimeError> {{
    match location {{
{match_arms}        other => panic!("unknown location `{{other}}` (not declared in the compiled workflow)"),
    }}
}}
"#
    )
}

fn render_location_file(
    name: &str,
    workdir: &str,
    hostname: &str,
    port: u16,
    program: &CompiledLocation,
) -> String {
    let mut out = String::new();
    writeln!(out, "// Generated by swirlc for location `{name}`. Do not edit by hand.").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "use swirl_model::PortValue;").unwrap();
    writeln!(out).unwrap();
    writeln!(
        out,
        "pub async fn {name}(location: String, addresses: swirl_model::Addresses) -> Result<(), swirl_runtime::RuntimeError> {{"
    )
    .unwrap();
    writeln!(out, "    let workdir = std::path::PathBuf::from({workdir:?});").unwrap();
    writeln!(
        out,
        "    let listen_addr: std::net::SocketAddr = format!(\"{hostname}:{port}\").parse().expect(\"generated listen address must be valid\");"
    )
    .unwrap();
    writeln!(
        out,
        "    let communicator = std::sync::Arc::new(swirl_runtime::Communicator::new(location, listen_addr, addresses, workdir).await?);"
    )
    .unwrap();
    out.push('\n');
    out.push_str(&program.body);
    out.push('\n');
    writeln!(out, "    Ok(())").unwrap();
    writeln!(out, "}}").unwrap();

    if !program.steps.is_empty() {
        out.push('\n');
        for step in program.steps.values() {
            out.push_str(&render_step_fn(step));
            out.push('\n');
        }
    }

    out
}

fn render_step_fn(step: &Step) -> String {
    let mut arguments = String::new();
    for arg in &step.arguments {
        let rendered = match arg {
            Argument::Literal(s) => format!("swirl_model::Argument::Literal({s:?}.to_string())"),
            Argument::PortRef(p) => format!("swirl_model::Argument::PortRef({p:?}.to_string())"),
        };
        write!(arguments, "{rendered}, ").unwrap();
    }

    let mut processors = String::new();
    for (port, processor) in &step.processors {
        writeln!(
            processors,
            "        processors.insert({port:?}.to_string(), swirl_model::Processor {{ glob: {glob:?}.to_string() }});",
            glob = processor.glob,
        )
        .unwrap();
    }

    format!(
        r#"fn {name}_step() -> swirl_model::Step {{
    let mut processors = std::collections::BTreeMap::new();
{processors}    swirl_model::Step {{
        name: {name:?}.to_string(),
        display_name: {display:?}.to_string(),
        command: {command:?}.to_string(),
        arguments: vec![{arguments}],
        processors,
    }}
}}
"#,
        name = step.name,
        display = step.display_name,
        command = step.command,
    )
}

fn render_address_map(workflow: &Workflow) -> String {
    let mut out = String::new();
    writeln!(out, "# Generated by swirlc. One record per location: name,host,host:port").unwrap();
    for location in workflow.locations.values() {
        writeln!(out, "{},{},{}:{}", location.name, location.hostname, location.hostname, location.listen_port).unwrap();
    }
    out
}

fn render_run_sh(workflow: &Workflow, package_name: &str) -> String {
    let mut launches = String::new();
    for name in workflow.locations.keys() {
        writeln!(launches, "./target/release/{package_name} --loc {name} --address-map address_map.txt &").unwrap();
    }

    format!(
        r#"#!/bin/bash
# Generated by swirlc. Launches every location binary locally against
# address_map.txt. HPC/container launch variants (apptainer, docker) are
# out of scope for the generated driver; adapt this script for those
# environments as needed.
set -euo pipefail

trap "echo terminating; pkill -P $$" INT

cargo build --release

{launches}
wait
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::compile_workflow;
    use std::collections::BTreeSet;
    use swirl_model::{DataType, Expr, Location};

    fn sample_workflow() -> Workflow {
        let location = Location {
            name: "l0".into(),
            hostname: "127.0.0.1".into(),
            listen_port: 9000,
            workdir: "/workdir".into(),
        };
        Workflow::new(
            BTreeMap::from([("l0".to_string(), location)]),
            BTreeMap::from([("p1".to_string(), swirl_model::Port::new("p1"))]),
            BTreeMap::new(),
            Expr::Location {
                location: "l0".into(),
                dataset: vec![],
                body: Box::new(Expr::Send {
                    data: "d1".into(),
                    port: "p1".into(),
                    data_type: DataType::String,
                    src: "l0".into(),
                    dst: "l1".into(),
                }),
            },
        )
    }

    #[test]
    fn renders_one_file_per_location_and_a_dispatching_main() {
        let workflow = sample_workflow();
        let compiled = compile_workflow(&workflow).unwrap();
        let project = render_project(&workflow, &compiled, "demo", DEFAULT_RUNTIME_PATH, DEFAULT_MODEL_PATH).unwrap();

        assert!(project.location_files.contains_key("l0"));
        assert!(project.main_rs.contains("\"l0\" => locations::l0::l0(location.to_string(), addresses).await,"));
        assert!(project.locations_mod_rs.contains("pub mod l0;"));
        assert!(project.address_map_txt.contains("l0,127.0.0.1,127.0.0.1:9000"));
        assert!(project.run_sh.contains("--loc l0"));
    }

    #[test]
    fn step_helper_functions_are_rendered_for_every_distinct_step() {
        let mut processors = BTreeMap::new();
        processors.insert("out".to_string(), swirl_model::Processor { glob: "*.txt".into() });
        let step = Step {
            name: "cat_step".into(),
            display_name: "Concatenate".into(),
            command: "cat".into(),
            arguments: vec![Argument::PortRef("in".into()), Argument::Literal(">".into())],
            processors,
        };
        let rendered = render_step_fn(&step);
        assert!(rendered.contains("fn cat_step_step() -> swirl_model::Step"));
        assert!(rendered.contains("swirl_model::Argument::PortRef(\"in\".to_string())"));
        assert!(rendered.contains("glob: \"*.txt\".to_string()"));
    }
}
