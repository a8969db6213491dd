//! In-memory scene graph: volume, transform, and sequence nodes.
//!
//! This is the data model the orchestrator operates on. Nodes are owned by a
//! [`Scene`] and referenced by opaque ids; names are made unique on insert so
//! repeated runs never collide.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{VoxalignError, VoxalignResult};
use crate::meta_image;
use crate::transform::TransformRepr;
use crate::volume::Volume;

/// Opaque handle to a scene node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Where a volume's data lives on disk, if anywhere.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct StorageInfo {
    /// Primary file the node was last written to or read from.
    pub file_path: PathBuf,
    /// All files associated with the node, primary first.
    pub file_list: Vec<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct VolumeNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Transform node positioning this volume, applied from-parent.
    pub parent_transform: Option<NodeId>,
    pub storage: Option<StorageInfo>,
    pub volume: Volume,
}

#[derive(Clone, Debug)]
pub struct TransformNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub repr: Option<TransformRepr>,
}

#[derive(Clone, Debug)]
pub struct SequenceNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Volume nodes in temporal order.
    pub frames: Vec<NodeId>,
}

/// Playback state a viewer holds against a sequence.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserBinding {
    pub selected_frame: usize,
}

/// Owner of all nodes. Lookups return [`VoxalignError::NotFound`] rather than
/// panicking so callers can surface stale-id bugs as errors.
#[derive(Debug, Default)]
pub struct Scene {
    next_id: u64,
    volumes: HashMap<NodeId, VolumeNode>,
    transforms: HashMap<NodeId, TransformNode>,
    sequences: HashMap<NodeId, SequenceNode>,
    browsers: HashMap<NodeId, BrowserBinding>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    /// Derive a node name not used by any existing node: `base`, then
    /// `base_1`, `base_2`, and so on.
    pub fn unique_name(&self, base: &str) -> String {
        let taken = |name: &str| {
            self.volumes.values().any(|n| n.name == name)
                || self.transforms.values().any(|n| n.name == name)
                || self.sequences.values().any(|n| n.name == name)
        };
        if !taken(base) {
            return base.to_string();
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn add_volume(&mut self, name: &str, volume: Volume) -> NodeId {
        let id = self.allocate_id();
        let name = self.unique_name(name);
        self.volumes.insert(
            id,
            VolumeNode {
                name,
                attributes: BTreeMap::new(),
                parent_transform: None,
                storage: None,
                volume,
            },
        );
        id
    }

    pub fn add_transform(&mut self, name: &str, repr: Option<TransformRepr>) -> NodeId {
        let id = self.allocate_id();
        let name = self.unique_name(name);
        self.transforms.insert(
            id,
            TransformNode {
                name,
                attributes: BTreeMap::new(),
                repr,
            },
        );
        id
    }

    pub fn add_sequence(&mut self, name: &str, frames: Vec<NodeId>) -> NodeId {
        let id = self.allocate_id();
        let name = self.unique_name(name);
        self.sequences.insert(
            id,
            SequenceNode {
                name,
                attributes: BTreeMap::new(),
                frames,
            },
        );
        id
    }

    pub fn volume(&self, id: NodeId) -> VoxalignResult<&VolumeNode> {
        self.volumes
            .get(&id)
            .ok_or_else(|| VoxalignError::not_found(format!("volume node {id:?}")))
    }

    pub fn volume_mut(&mut self, id: NodeId) -> VoxalignResult<&mut VolumeNode> {
        self.volumes
            .get_mut(&id)
            .ok_or_else(|| VoxalignError::not_found(format!("volume node {id:?}")))
    }

    pub fn transform(&self, id: NodeId) -> VoxalignResult<&TransformNode> {
        self.transforms
            .get(&id)
            .ok_or_else(|| VoxalignError::not_found(format!("transform node {id:?}")))
    }

    pub fn transform_mut(&mut self, id: NodeId) -> VoxalignResult<&mut TransformNode> {
        self.transforms
            .get_mut(&id)
            .ok_or_else(|| VoxalignError::not_found(format!("transform node {id:?}")))
    }

    pub fn sequence(&self, id: NodeId) -> VoxalignResult<&SequenceNode> {
        self.sequences
            .get(&id)
            .ok_or_else(|| VoxalignError::not_found(format!("sequence node {id:?}")))
    }

    pub fn sequence_mut(&mut self, id: NodeId) -> VoxalignResult<&mut SequenceNode> {
        self.sequences
            .get_mut(&id)
            .ok_or_else(|| VoxalignError::not_found(format!("sequence node {id:?}")))
    }

    fn attributes(&self, id: NodeId) -> Option<&BTreeMap<String, String>> {
        self.volumes
            .get(&id)
            .map(|n| &n.attributes)
            .or_else(|| self.transforms.get(&id).map(|n| &n.attributes))
            .or_else(|| self.sequences.get(&id).map(|n| &n.attributes))
    }

    fn attributes_mut(&mut self, id: NodeId) -> VoxalignResult<&mut BTreeMap<String, String>> {
        if let Some(n) = self.volumes.get_mut(&id) {
            return Ok(&mut n.attributes);
        }
        if let Some(n) = self.transforms.get_mut(&id) {
            return Ok(&mut n.attributes);
        }
        if let Some(n) = self.sequences.get_mut(&id) {
            return Ok(&mut n.attributes);
        }
        Err(VoxalignError::not_found(format!("node {id:?}")))
    }

    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: &str) -> VoxalignResult<()> {
        self.attributes_mut(id)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.attributes(id)?.get(key).map(String::as_str)
    }

    /// Copy every attribute from `src` onto `dst`, overwriting on conflict.
    pub fn transfer_attributes(&mut self, src: NodeId, dst: NodeId) -> VoxalignResult<()> {
        let copied = self
            .attributes(src)
            .ok_or_else(|| VoxalignError::not_found(format!("node {src:?}")))?
            .clone();
        self.attributes_mut(dst)?.extend(copied);
        Ok(())
    }

    pub fn bind_browser(&mut self, sequence: NodeId, selected_frame: usize) -> VoxalignResult<()> {
        self.sequence(sequence)?;
        self.browsers
            .insert(sequence, BrowserBinding { selected_frame });
        Ok(())
    }

    pub fn browser(&self, sequence: NodeId) -> Option<&BrowserBinding> {
        self.browsers.get(&sequence)
    }

    pub fn set_parent_transform(
        &mut self,
        volume: NodeId,
        transform: Option<NodeId>,
    ) -> VoxalignResult<()> {
        if let Some(t) = transform {
            self.transform(t)?;
        }
        self.volume_mut(volume)?.parent_transform = transform;
        Ok(())
    }

    /// Bake a volume's parent transform into its voxels and detach it.
    ///
    /// Only linear parents can be hardened; a general parent is a validation
    /// error because resampling through it is not supported.
    pub fn harden_volume(&mut self, volume: NodeId) -> VoxalignResult<()> {
        let Some(transform_id) = self.volume(volume)?.parent_transform else {
            return Ok(());
        };
        let repr = self
            .transform(transform_id)?
            .repr
            .clone()
            .ok_or_else(|| VoxalignError::validation("parent transform holds no data"))?;
        let matrix = repr.as_linear().ok_or_else(|| {
            VoxalignError::validation("cannot harden a non-linear parent transform")
        })?;

        let node = self.volume_mut(volume)?;
        let resampled = node
            .volume
            .resample_linear(&node.volume.geometry.clone(), &matrix, 0.0);
        node.volume = resampled;
        node.parent_transform = None;
        Ok(())
    }

    /// Write a volume's data to disk and point its storage at that file.
    pub fn save_volume(&mut self, id: NodeId, path: &Path) -> VoxalignResult<()> {
        let node = self.volume(id)?;
        meta_image::write(&node.volume, path)?;
        let node = self.volume_mut(id)?;
        node.storage = Some(StorageInfo {
            file_path: path.to_path_buf(),
            file_list: vec![path.to_path_buf()],
        });
        Ok(())
    }
}
