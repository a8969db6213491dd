//! External optimizer backend: spawns the registration executable over the
//! staged volume files and locates its result artifact.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context as _;

use crate::error::{VoxalignError, VoxalignResult};
use crate::workspace::{StagedPaths, VolumeRole, require_staged};

/// Name of the transform artifact the optimizer writes into its output
/// directory on success.
pub const RESULT_ARTIFACT: &str = "TransformParameters.0.txt";

/// How many trailing stdout lines are kept for error diagnostics.
const STDOUT_TAIL_LINES: usize = 32;

/// Options for the external optimizer invocation.
#[derive(Clone, Debug)]
pub struct OptimizerOpts {
    /// Executable name or path; resolved through `PATH` when bare.
    pub executable: PathBuf,
}

impl Default for OptimizerOpts {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("elastix"),
        }
    }
}

/// Check whether the optimizer executable can be spawned at all.
pub fn is_optimizer_on_path(opts: &OptimizerOpts) -> bool {
    Command::new(&opts.executable)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Run the optimizer over the staged inputs. `parameter_file` is passed with
/// `-p`, `output_dir` with `-out`; each staged role contributes its own flag.
///
/// Returns the path of the result artifact in `output_dir`.
pub fn run(
    staged: &StagedPaths,
    parameter_file: &Path,
    output_dir: &Path,
    opts: &OptimizerOpts,
) -> VoxalignResult<PathBuf> {
    // Fixed and moving are mandatory; masks ride along when staged.
    require_staged(staged, VolumeRole::Fixed)?;
    require_staged(staged, VolumeRole::Moving)?;

    let mut command = Command::new(&opts.executable);
    for (role, path) in staged.iter() {
        command.arg(role.cli_flag()).arg(path);
    }
    command.arg("-out").arg(output_dir);
    command.arg("-p").arg(parameter_file);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::info!(
        executable = %opts.executable.display(),
        output_dir = %output_dir.display(),
        "invoking external optimizer"
    );

    let mut child = command.spawn().map_err(|err| {
        VoxalignError::backend_process(format!(
            "failed to start '{}': {err} (is it installed and on PATH?)",
            opts.executable.display()
        ))
    })?;

    // Both pipes must be drained while the child runs: a full stdout or
    // stderr buffer blocks the optimizer, which in turn blocks us. stderr is
    // drained on its own thread while this thread drains stdout.
    let stderr_reader = child.stderr.take().map(|stderr| {
        std::thread::spawn(move || {
            let mut lines = Vec::new();
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                tracing::debug!(target: "voxalign::optimizer", "stderr: {line}");
                lines.push(line);
            }
            lines
        })
    });

    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDOUT_TAIL_LINES);
    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    // The child is still running; reap it before surfacing
                    // the read failure.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(VoxalignError::Other(
                        anyhow::Error::new(err).context("failed to read optimizer stdout"),
                    ));
                }
            };
            tracing::debug!(target: "voxalign::optimizer", "{line}");
            if tail.len() == STDOUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    let stderr_lines = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    let status = child
        .wait()
        .context("failed to wait for the optimizer process")?;

    if !status.success() {
        let stderr = stderr_lines.join("\n");
        let detail = if stderr.trim().is_empty() {
            tail.iter().cloned().collect::<Vec<_>>().join("\n")
        } else {
            stderr.trim().to_string()
        };
        return Err(VoxalignError::backend_process(format!(
            "optimizer exited with {status}: {detail}"
        )));
    }

    let artifact = output_dir.join(RESULT_ARTIFACT);
    if !artifact.is_file() {
        return Err(VoxalignError::backend_process(format!(
            "optimizer reported success but wrote no '{RESULT_ARTIFACT}' in '{}'",
            output_dir.display()
        )));
    }
    Ok(artifact)
}
