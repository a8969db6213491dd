//! voxalign orchestrates rigid registration of medical image volumes and
//! temporal volume sequences.
//!
//! Two interchangeable backends produce a spatial transform: an in-process
//! linear (rigid) fit, and an external optimizer executable driven by a
//! synthesized parameter file over volumes staged into a scratch workspace.
//! Results are imported into an in-memory scene model as transform nodes.
//!
//! ```no_run
//! use voxalign::{
//!     RegistrationInputs, RegistrationOrchestrator, Scene, Volume, VolumeGeometry,
//! };
//! use glam::DVec3;
//!
//! # fn main() -> voxalign::VoxalignResult<()> {
//! let mut scene = Scene::new();
//! let geometry = VolumeGeometry::new([64, 64, 32], DVec3::splat(2.0), DVec3::ZERO)?;
//! let fixed = scene.add_volume("fixed", Volume::filled(geometry.clone(), 0.0)?);
//! let moving = scene.add_volume("moving", Volume::filled(geometry, 0.0)?);
//!
//! let mut orchestrator = RegistrationOrchestrator::default();
//! let output = orchestrator.register_volumes(
//!     &mut scene,
//!     RegistrationInputs {
//!         fixed: Some(fixed),
//!         moving: Some(moving),
//!         ..Default::default()
//!     },
//!     "linear-fit",
//! )?;
//! let node = scene.transform(output.transform)?;
//! # let _ = node;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod backend;
pub mod error;
pub mod importer;
pub mod math;
pub mod meta_image;
pub mod orchestrator;
pub mod params;
pub mod scene;
pub mod sequence;
pub mod transform;
pub mod volume;
pub mod workspace;

pub use backend::{Strategy, linear_fit::LinearFitOpts, optimizer::OptimizerOpts};
pub use error::{VoxalignError, VoxalignResult};
pub use importer::ImportOutcome;
pub use orchestrator::{
    OrchestratorOpts, Phase, RegistrationInputs, RegistrationOrchestrator, RegistrationOutput,
    SequenceRegistrationOpts, SequenceRegistrationOutput,
};
pub use params::{ParamValue, RegistrationConfig, SynthesisFlags, synthesize};
pub use scene::{NodeId, Scene, StorageInfo};
pub use transform::{GeneralTransform, TransformRepr, TransformStage};
pub use volume::{Volume, VolumeGeometry};
pub use workspace::{VolumeRole, Workspace, WorkspaceOptions};
