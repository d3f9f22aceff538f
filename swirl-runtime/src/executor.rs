//! Component D: the step executor (spec §4.D).
//!
//! Each `exec` node becomes: await its declared input ports, materialize a
//! private scratch directory, symlink File inputs into it by basename,
//! substitute port references into the step's command line, and run it
//! under a shell. A non-zero exit is a step failure; the declared output
//! glob is resolved inside the scratch directory and must match exactly
//! one file.

use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use swirl_model::{Argument, PortValue, Step};
use uuid::Uuid;

use crate::error::{Result, RuntimeError};
use crate::port_store::PortStore;

/// Runs `step`, awaiting `inputs` from `port_store` and, if `output_port`
/// is given, writing the resolved output [`PortValue::File`] back to it.
///
/// `scratch_root` is the directory generated scratch directories are
/// created under (typically the location's configured workdir).
pub async fn exec(
    step: &Step,
    inputs: &[String],
    output_port: Option<&str>,
    port_store: &PortStore,
    scratch_root: &Path,
) -> Result<()> {
    let mut resolved = Vec::with_capacity(inputs.len());
    for name in inputs {
        resolved.push((name.clone(), port_store.await_port(name).await));
    }

    let scratch_dir = scratch_root.join(format!("exec_{}_{}", step.name, Uuid::new_v4()));
    tokio::fs::create_dir_all(&scratch_dir).await?;

    let values: std::collections::HashMap<&str, PortValue> =
        resolved.iter().map(|(name, value)| (name.as_str(), value.clone())).collect();

    for (_, value) in &resolved {
        if let PortValue::File(path) = value {
            link_into_scratch(&scratch_dir, path)?;
        }
    }

    let command_line = render_command_line(step, &values, &scratch_dir);
    tracing::debug!(step = %step.name, dir = %scratch_dir.display(), command = %command_line, "spawning step");

    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&command_line)
        .current_dir(&scratch_dir)
        .output()
        .await?;

    if !output.status.success() {
        return Err(RuntimeError::StepFailure {
            step: step.name.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    if let Some(output_port) = output_port {
        let processor = step.processor_for(output_port).ok_or_else(|| RuntimeError::MissingOutput {
            step: step.name.clone(),
            glob: String::new(),
            dir: scratch_dir.display().to_string(),
        })?;
        let resolved_path = resolve_output(step, &scratch_dir, &processor.glob).await?;
        port_store.set_port(output_port, PortValue::File(resolved_path)).await?;
    }

    Ok(())
}

fn link_into_scratch(scratch_dir: &Path, source: &Path) -> Result<()> {
    let basename = source
        .file_name()
        .ok_or_else(|| RuntimeError::MalformedPayload {
            port: "<input>".into(),
            expected: "file".into(),
            reason: format!("`{}` has no file name component", source.display()),
        })?;
    let link = scratch_dir.join(basename);
    if !link.exists() {
        symlink(source, &link)?;
    }
    Ok(())
}

fn render_command_line(
    step: &Step,
    values: &std::collections::HashMap<&str, PortValue>,
    scratch_dir: &Path,
) -> String {
    let mut tokens = vec![step.command.clone()];
    for arg in &step.arguments {
        let rendered = match arg {
            Argument::Literal(s) => s.clone(),
            Argument::PortRef(name) => match values.get(name.as_str()) {
                Some(PortValue::File(path)) => path
                    .file_name()
                    .map(|basename| scratch_dir.join(basename).display().to_string())
                    .unwrap_or_else(|| path.display().to_string()),
                Some(other) => other.as_wire_string(),
                None => String::new(),
            },
        };
        tokens.push(rendered);
    }
    tokens.join(" ")
}

async fn resolve_output(step: &Step, scratch_dir: &Path, glob_pattern: &str) -> Result<PathBuf> {
    let pattern = scratch_dir.join(glob_pattern);
    let pattern_str = pattern.to_string_lossy().into_owned();
    let scratch_dir = scratch_dir.to_path_buf();
    let step_name = step.name.clone();

    let matches = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let paths = glob::glob(&pattern_str).map_err(|e| RuntimeError::MissingOutput {
            step: step_name.clone(),
            glob: pattern_str.clone(),
            dir: scratch_dir.display().to_string(),
        })?;
        Ok(paths.filter_map(|entry| entry.ok()).collect())
    })
    .await
    .map_err(std::io::Error::other)??;

    match matches.len() {
        0 => Err(RuntimeError::MissingOutput {
            step: step.name.clone(),
            glob: glob_pattern.to_string(),
            dir: scratch_dir.display().to_string(),
        }),
        1 => Ok(matches.into_iter().next().unwrap()),
        count => Err(RuntimeError::AmbiguousOutput {
            step: step.name.clone(),
            glob: glob_pattern.to_string(),
            dir: scratch_dir.display().to_string(),
            count,
        }),
    }
}
