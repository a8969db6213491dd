//! Frame resolution against sequence nodes and their browser bindings.

use crate::error::{VoxalignError, VoxalignResult};
use crate::scene::{NodeId, Scene};

/// Resolve a specific frame index of a sequence to its volume node.
pub fn resolve_frame(scene: &Scene, sequence: NodeId, frame: usize) -> VoxalignResult<NodeId> {
    let node = scene.sequence(sequence)?;
    node.frames.get(frame).copied().ok_or_else(|| {
        VoxalignError::not_found(format!(
            "frame {frame} of sequence '{}' ({} frames)",
            node.name,
            node.frames.len()
        ))
    })
}

/// Resolve the frame currently selected by the sequence's browser binding.
///
/// A sequence without a browser binding has no notion of "current frame", so
/// this is an error rather than a silent default to frame zero.
pub fn resolve_current(scene: &Scene, sequence: NodeId) -> VoxalignResult<NodeId> {
    let name = scene.sequence(sequence)?.name.clone();
    let binding = scene.browser(sequence).ok_or_else(|| {
        VoxalignError::not_found(format!("browser binding for sequence '{name}'"))
    })?;
    resolve_frame(scene, sequence, binding.selected_frame)
}
