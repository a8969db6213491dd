//! Scratch workspace layout and volume staging for backend invocations.
//!
//! Each invocation gets its own uniquely named directory with an `input/`
//! subdirectory for staged volumes and the parameter file, and a
//! `result-transform/` subdirectory the backend writes into. The workspace
//! removes itself on drop unless the caller asked to retain it.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::error::{VoxalignError, VoxalignResult};
use crate::scene::{NodeId, Scene, StorageInfo};

pub const INPUT_SUBDIR: &str = "input";
pub const RESULT_SUBDIR: &str = "result-transform";

/// Where and how to create the scratch workspace.
#[derive(Clone, Debug, Default)]
pub struct WorkspaceOptions {
    /// Parent directory for the workspace; `std::env::temp_dir()` when unset.
    pub root: Option<PathBuf>,
    /// Keep the workspace on disk after the run, for inspection.
    pub retain: bool,
}

/// A scratch directory tree owned for the duration of one backend run.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    retain: bool,
}

impl Workspace {
    /// Create the workspace directory tree. The name embeds pid and a
    /// nanosecond timestamp so concurrent runs never collide.
    pub fn create(options: &WorkspaceOptions) -> VoxalignResult<Self> {
        let parent = options
            .root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = parent.join(format!("voxalign_reg_{}_{nanos}", std::process::id()));

        std::fs::create_dir_all(dir.join(INPUT_SUBDIR))
            .with_context(|| format!("failed to create workspace '{}'", dir.display()))?;
        std::fs::create_dir_all(dir.join(RESULT_SUBDIR))
            .with_context(|| format!("failed to create workspace '{}'", dir.display()))?;

        tracing::debug!(dir = %dir.display(), retain = options.retain, "created workspace");
        Ok(Self {
            dir,
            retain: options.retain,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input_dir(&self) -> PathBuf {
        self.dir.join(INPUT_SUBDIR)
    }

    pub fn result_dir(&self) -> PathBuf {
        self.dir.join(RESULT_SUBDIR)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.retain {
            tracing::info!(dir = %self.dir.display(), "retaining workspace");
            return;
        }
        // Best effort; a failed cleanup must not mask the run's outcome.
        if let Err(err) = std::fs::remove_dir_all(&self.dir) {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %err,
                "failed to remove workspace"
            );
        }
    }
}

/// The four staging roles a backend invocation understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VolumeRole {
    Fixed,
    Moving,
    FixedMask,
    MovingMask,
}

impl VolumeRole {
    /// File name within the workspace input directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Fixed => "fixed.mha",
            Self::Moving => "moving.mha",
            Self::FixedMask => "fixedMask.mha",
            Self::MovingMask => "movingMask.mha",
        }
    }

    /// Command-line flag the external optimizer expects for this role.
    pub fn cli_flag(self) -> &'static str {
        match self {
            Self::Fixed => "-f",
            Self::Moving => "-m",
            Self::FixedMask => "-fMask",
            Self::MovingMask => "-mMask",
        }
    }
}

/// Staged file paths keyed by role.
#[derive(Clone, Debug, Default)]
pub struct StagedPaths {
    entries: Vec<(VolumeRole, PathBuf)>,
}

impl StagedPaths {
    pub fn get(&self, role: VolumeRole) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, p)| p.as_path())
    }

    fn set(&mut self, role: VolumeRole, path: PathBuf) {
        self.entries.push((role, path));
    }

    pub fn iter(&self) -> impl Iterator<Item = (VolumeRole, &Path)> {
        self.entries.iter().map(|(r, p)| (*r, p.as_path()))
    }
}

/// Write each present volume into the workspace input directory under its
/// role name, then restore the node's original storage association so the
/// staging save leaves no trace in the scene.
pub fn stage_volumes(
    scene: &mut Scene,
    workspace: &Workspace,
    roles: &[(VolumeRole, Option<NodeId>)],
) -> VoxalignResult<StagedPaths> {
    let input_dir = workspace.input_dir();
    let mut staged = StagedPaths::default();

    for &(role, id) in roles {
        let Some(id) = id else {
            continue;
        };
        let original = scene.volume(id)?.storage.clone();
        let path = input_dir.join(role.file_name());
        scene.save_volume(id, &path)?;

        let node = scene.volume_mut(id)?;
        match original {
            Some(info) => {
                // Rebuild the association exactly as captured: primary path
                // first, then the captured file list.
                let restored = StorageInfo {
                    file_path: info.file_path.clone(),
                    file_list: info.file_list.clone(),
                };
                node.storage = Some(restored);
            }
            None => node.storage = None,
        }

        tracing::debug!(
            role = role.file_name(),
            path = %path.display(),
            "staged volume"
        );
        staged.set(role, path);
    }

    Ok(staged)
}

/// Missing-role check used by backends that require fixed and moving inputs.
pub fn require_staged(staged: &StagedPaths, role: VolumeRole) -> VoxalignResult<PathBuf> {
    staged
        .get(role)
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            VoxalignError::missing_input(format!("no staged {} volume", role.file_name()))
        })
}
