//! Top-level registration coordinator.
//!
//! Drives one registration run through a fixed phase sequence
//! (`Idle → Staged → Invoked → Imported → Done`, with `Failed` reachable once
//! staging has begun), owning the scratch workspace for exactly that long.
//! The scene is only mutated at the import step; everything before it works
//! on staged copies.

use glam::DMat4;

use crate::backend::{Strategy, linear_fit, optimizer};
use crate::error::{VoxalignError, VoxalignResult};
use crate::importer::{self, ImportOutcome};
use crate::params::{self, RegistrationConfig, SynthesisFlags};
use crate::scene::{NodeId, Scene};
use crate::sequence;
use crate::transform::TransformRepr;
use crate::workspace::{self, VolumeRole, Workspace, WorkspaceOptions};

/// Parameter file name written into the workspace input directory for the
/// external optimizer.
pub const PARAMETER_FILE_NAME: &str = "ElastixParameters.txt";

/// Registration phases, observable for tests and progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Staged,
    Invoked,
    Imported,
    Done,
    Failed,
}

/// Everything a run needs beyond its inputs. Plain data, no globals.
#[derive(Clone, Debug, Default)]
pub struct OrchestratorOpts {
    pub workspace: WorkspaceOptions,
    pub optimizer: optimizer::OptimizerOpts,
    pub linear_fit: linear_fit::LinearFitOpts,
    pub synthesis: SynthesisFlags,
    /// Parameter overrides merged over the synthesized defaults.
    pub overrides: RegistrationConfig,
}

/// Handle to the produced transform and how it was imported.
#[derive(Clone, Copy, Debug)]
pub struct RegistrationOutput {
    pub transform: NodeId,
    pub outcome: ImportOutcome,
}

/// Volume inputs for one registration run; masks are optional.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegistrationInputs {
    pub fixed: Option<NodeId>,
    pub moving: Option<NodeId>,
    pub fixed_mask: Option<NodeId>,
    pub moving_mask: Option<NodeId>,
    /// Existing transform node to write into; a new one is created when
    /// unset, named `{fixed}_to_{moving}_transform`.
    pub output_transform: Option<NodeId>,
}

/// Options for frame-by-frame sequence registration.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceRegistrationOpts {
    /// Reference frame every other frame is registered to.
    pub fixed_index: usize,
    /// Inclusive frame range; the whole sequence when unset.
    pub frame_range: Option<(usize, usize)>,
    /// Also emit a sequence of per-frame transform nodes.
    pub emit_transforms: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct SequenceRegistrationOutput {
    pub output_sequence: NodeId,
    pub transform_sequence: Option<NodeId>,
}

#[derive(Debug, Default)]
pub struct RegistrationOrchestrator {
    opts: OrchestratorOpts,
    phase: Phase,
}

impl RegistrationOrchestrator {
    pub fn new(opts: OrchestratorOpts) -> Self {
        Self {
            opts,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Register `moving` onto `fixed` with the named strategy.
    pub fn register_volumes(
        &mut self,
        scene: &mut Scene,
        inputs: RegistrationInputs,
        strategy_name: &str,
    ) -> VoxalignResult<RegistrationOutput> {
        self.phase = Phase::Idle;
        let result = self.run_registration(scene, inputs, strategy_name, self.opts.synthesis);
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }

    /// Register `moving` onto the frame currently selected by the sequence's
    /// browser binding. The inputs are treated as prealigned, matching the
    /// anatomical-to-dynamic use this entry point exists for.
    pub fn register_t1_to_sequence(
        &mut self,
        scene: &mut Scene,
        moving: NodeId,
        input_sequence: NodeId,
        moving_mask: Option<NodeId>,
        output_transform: Option<NodeId>,
        strategy_name: &str,
    ) -> VoxalignResult<RegistrationOutput> {
        self.phase = Phase::Idle;
        let fixed = match sequence::resolve_current(scene, input_sequence) {
            Ok(id) => id,
            Err(err) => {
                self.phase = Phase::Failed;
                return Err(err);
            }
        };
        let inputs = RegistrationInputs {
            fixed: Some(fixed),
            moving: Some(moving),
            fixed_mask: None,
            moving_mask,
            output_transform,
        };
        let flags = SynthesisFlags {
            prealigned: true,
            ..self.opts.synthesis
        };
        let result = self.run_registration(scene, inputs, strategy_name, flags);
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }

    fn run_registration(
        &mut self,
        scene: &mut Scene,
        inputs: RegistrationInputs,
        strategy_name: &str,
        flags: SynthesisFlags,
    ) -> VoxalignResult<RegistrationOutput> {
        let fixed = inputs
            .fixed
            .ok_or_else(|| VoxalignError::missing_input("no fixed volume"))?;
        let moving = inputs
            .moving
            .ok_or_else(|| VoxalignError::missing_input("no moving volume"))?;
        // Resolve names up front; stale ids fail before anything touches disk.
        let fixed_name = scene.volume(fixed)?.name.clone();
        let moving_name = scene.volume(moving)?.name.clone();

        tracing::info!(
            fixed = %fixed_name,
            moving = %moving_name,
            strategy = strategy_name,
            "starting registration"
        );

        let ws = Workspace::create(&self.opts.workspace)?;
        let staged = workspace::stage_volumes(
            scene,
            &ws,
            &[
                (VolumeRole::Fixed, Some(fixed)),
                (VolumeRole::Moving, Some(moving)),
                (VolumeRole::FixedMask, inputs.fixed_mask),
                (VolumeRole::MovingMask, inputs.moving_mask),
            ],
        )?;
        self.phase = Phase::Staged;

        let strategy = Strategy::parse(strategy_name)?;
        if let Some(id) = inputs.output_transform {
            scene.transform(id)?;
        }

        // Run the backend to completion before touching the scene; a failed
        // invocation must leave no half-written transform node behind.
        enum BackendResult {
            Matrix(DMat4),
            Artifact(std::path::PathBuf),
        }
        let result = match strategy {
            Strategy::LinearFit => {
                let fixed_volume = scene.volume(fixed)?.volume.clone();
                let moving_volume = scene.volume(moving)?.volume.clone();
                let matrix =
                    linear_fit::run(&fixed_volume, &moving_volume, &self.opts.linear_fit)?;
                BackendResult::Matrix(matrix)
            }
            Strategy::ExternalOptimizer => {
                let config = params::synthesize(&self.opts.overrides, flags);
                let parameter_file = ws.input_dir().join(PARAMETER_FILE_NAME);
                config.write_file(&parameter_file)?;

                let artifact = optimizer::run(
                    &staged,
                    &parameter_file,
                    &ws.result_dir(),
                    &self.opts.optimizer,
                )?;
                BackendResult::Artifact(artifact)
            }
        };
        self.phase = Phase::Invoked;

        let output_transform = match inputs.output_transform {
            Some(id) => id,
            None => {
                let name = format!("{fixed_name}_to_{moving_name}_transform");
                scene.add_transform(&name, None)
            }
        };
        let outcome = match result {
            BackendResult::Matrix(matrix) => {
                scene.transform_mut(output_transform)?.repr =
                    Some(TransformRepr::Linear(matrix));
                ImportOutcome::Linear
            }
            BackendResult::Artifact(artifact) => {
                importer::import(&artifact, scene, output_transform)?
            }
        };
        self.phase = Phase::Imported;

        drop(ws);
        self.phase = Phase::Done;
        tracing::info!(
            transform = ?output_transform,
            outcome = ?outcome,
            "registration finished"
        );
        Ok(RegistrationOutput {
            transform: output_transform,
            outcome,
        })
    }

    /// Register each frame of a sequence to a fixed reference frame with the
    /// in-process fit, producing a new sequence of aligned volumes and,
    /// optionally, a parallel sequence of per-frame transforms. Sequence
    /// attributes carry over to the output.
    pub fn register_sequence(
        &mut self,
        scene: &mut Scene,
        input_sequence: NodeId,
        opts: SequenceRegistrationOpts,
    ) -> VoxalignResult<SequenceRegistrationOutput> {
        let input = scene.sequence(input_sequence)?;
        let input_name = input.name.clone();
        let frame_count = input.frames.len();
        if frame_count == 0 {
            return Err(VoxalignError::missing_input(format!(
                "sequence '{input_name}' has no frames"
            )));
        }

        let (start, end) = opts.frame_range.unwrap_or((0, frame_count - 1));
        if start > end || end >= frame_count {
            return Err(VoxalignError::validation(format!(
                "frame range {start}..={end} outside sequence of {frame_count} frames"
            )));
        }

        let fixed_id = sequence::resolve_frame(scene, input_sequence, opts.fixed_index)?;
        let fixed_volume = scene.volume(fixed_id)?.volume.clone();

        tracing::info!(
            sequence = %input_name,
            frames = end - start + 1,
            fixed_index = opts.fixed_index,
            "starting sequence registration"
        );

        let mut aligned_frames = Vec::with_capacity(end - start + 1);
        let mut transform_frames = Vec::new();
        for index in start..=end {
            let frame_id = sequence::resolve_frame(scene, input_sequence, index)?;
            let frame_name = scene.volume(frame_id)?.name.clone();

            let moving_volume = scene.volume(frame_id)?.volume.clone();
            let matrix = if index == opts.fixed_index {
                DMat4::IDENTITY
            } else {
                linear_fit::run(&fixed_volume, &moving_volume, &self.opts.linear_fit)?
            };

            let aligned =
                moving_volume.resample_linear(&fixed_volume.geometry, &matrix, 0.0);
            let aligned_id = scene.add_volume(&format!("{frame_name}_registered"), aligned);
            scene.transfer_attributes(frame_id, aligned_id)?;
            aligned_frames.push(aligned_id);

            if opts.emit_transforms {
                let t = scene.add_transform(
                    &format!("{frame_name}_transform"),
                    Some(TransformRepr::Linear(matrix)),
                );
                transform_frames.push(t);
            }
        }

        let output_sequence =
            scene.add_sequence(&format!("{input_name}_registered"), aligned_frames);
        scene.transfer_attributes(input_sequence, output_sequence)?;

        let transform_sequence = if opts.emit_transforms {
            Some(scene.add_sequence(&format!("{input_name}_transforms"), transform_frames))
        } else {
            None
        };

        tracing::info!(sequence = %input_name, "sequence registration finished");
        Ok(SequenceRegistrationOutput {
            output_sequence,
            transform_sequence,
        })
    }
}
