use std::path::PathBuf;

use glam::DVec3;
use voxalign::orchestrator::Phase;
use voxalign::transform::TransformRepr;
use voxalign::{
    OrchestratorOpts, RegistrationInputs, RegistrationOrchestrator, Scene, Volume, VolumeGeometry,
    VoxalignError, WorkspaceOptions,
};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn scratch_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "voxalign_orch_{}_{}_{name}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn dir_entry_count(dir: &PathBuf) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn blob(origin: DVec3) -> Volume {
    let geometry = VolumeGeometry::new([12, 12, 12], DVec3::splat(2.0), origin).unwrap();
    let center = geometry.center_physical();
    let mut vol = Volume::filled(geometry, 0.0).unwrap();
    for k in 0..12 {
        for j in 0..12 {
            for i in 0..12 {
                let p = vol.geometry.index_to_physical([i, j, k]);
                let d = p - center;
                let q = d.x * d.x / 30.0 + d.y * d.y / 90.0 + d.z * d.z / 180.0;
                vol.set(i, j, k, ((-q).exp() * 100.0) as f32);
            }
        }
    }
    vol
}

fn orchestrator_with_root(root: &PathBuf) -> RegistrationOrchestrator {
    RegistrationOrchestrator::new(OrchestratorOpts {
        workspace: WorkspaceOptions {
            root: Some(root.clone()),
            retain: false,
        },
        ..Default::default()
    })
}

#[test]
fn missing_moving_volume_never_stages() {
    let root = scratch_root("missing_moving");
    let mut scene = Scene::new();
    let fixed = scene.add_volume("fixed", blob(DVec3::ZERO));

    let mut orch = orchestrator_with_root(&root);
    let err = orch
        .register_volumes(
            &mut scene,
            RegistrationInputs {
                fixed: Some(fixed),
                ..Default::default()
            },
            "linear-fit",
        )
        .unwrap_err();

    assert!(matches!(err, VoxalignError::MissingInput(_)));
    assert_eq!(orch.phase(), Phase::Failed);
    assert_eq!(dir_entry_count(&root), 0);
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn unknown_strategy_never_invokes_and_cleans_up() {
    let root = scratch_root("unknown_strategy");
    let mut scene = Scene::new();
    let fixed = scene.add_volume("fixed", blob(DVec3::ZERO));
    let moving = scene.add_volume("moving", blob(DVec3::ZERO));

    let mut orch = orchestrator_with_root(&root);
    let err = orch
        .register_volumes(
            &mut scene,
            RegistrationInputs {
                fixed: Some(fixed),
                moving: Some(moving),
                ..Default::default()
            },
            "brains",
        )
        .unwrap_err();

    assert!(matches!(err, VoxalignError::UnknownStrategy(ref s) if s == "brains"));
    assert_eq!(orch.phase(), Phase::Failed);
    assert_eq!(dir_entry_count(&root), 0);
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn linear_fit_run_reaches_done_and_cleans_up() {
    init_logs();
    let root = scratch_root("linear_fit_done");
    let mut scene = Scene::new();
    let fixed = scene.add_volume("fixed", blob(DVec3::ZERO));
    let moving = scene.add_volume("moving", blob(DVec3::new(2.0, -1.0, 0.5)));

    let mut orch = orchestrator_with_root(&root);
    let output = orch
        .register_volumes(
            &mut scene,
            RegistrationInputs {
                fixed: Some(fixed),
                moving: Some(moving),
                ..Default::default()
            },
            "linear-fit",
        )
        .unwrap();

    assert_eq!(orch.phase(), Phase::Done);
    let node = scene.transform(output.transform).unwrap();
    assert_eq!(node.name, "fixed_to_moving_transform");
    assert!(matches!(node.repr, Some(TransformRepr::Linear(_))));
    assert_eq!(dir_entry_count(&root), 0);
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn retained_workspace_survives_the_run() {
    let root = scratch_root("retained");
    let mut scene = Scene::new();
    let fixed = scene.add_volume("fixed", blob(DVec3::ZERO));
    let moving = scene.add_volume("moving", blob(DVec3::ZERO));

    let mut orch = RegistrationOrchestrator::new(OrchestratorOpts {
        workspace: WorkspaceOptions {
            root: Some(root.clone()),
            retain: true,
        },
        ..Default::default()
    });
    orch.register_volumes(
        &mut scene,
        RegistrationInputs {
            fixed: Some(fixed),
            moving: Some(moving),
            ..Default::default()
        },
        "linear-fit",
    )
    .unwrap();

    assert_eq!(dir_entry_count(&root), 1);
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn sequence_entry_point_requires_a_browser_binding() {
    let root = scratch_root("no_browser");
    let mut scene = Scene::new();
    let moving = scene.add_volume("t1", blob(DVec3::ZERO));
    let frame = scene.add_volume("frame0", blob(DVec3::ZERO));
    let sequence = scene.add_sequence("dynamic", vec![frame]);

    let mut orch = orchestrator_with_root(&root);
    let err = orch
        .register_t1_to_sequence(&mut scene, moving, sequence, None, None, "linear-fit")
        .unwrap_err();

    assert!(matches!(err, VoxalignError::NotFound(_)));
    assert_eq!(orch.phase(), Phase::Failed);
    assert_eq!(dir_entry_count(&root), 0);
    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn sequence_registration_emits_aligned_frames_and_attributes() {
    let mut scene = Scene::new();
    let frames: Vec<_> = (0..3)
        .map(|i| scene.add_volume(&format!("frame{i}"), blob(DVec3::ZERO)))
        .collect();
    let sequence = scene.add_sequence("dynamic", frames);
    scene.set_attribute(sequence, "Modality", "CT").unwrap();

    let mut orch = RegistrationOrchestrator::default();
    let output = orch
        .register_sequence(&mut scene, sequence, Default::default())
        .unwrap();

    let out = scene.sequence(output.output_sequence).unwrap();
    assert_eq!(out.name, "dynamic_registered");
    assert_eq!(out.frames.len(), 3);
    assert_eq!(
        scene.attribute(output.output_sequence, "Modality"),
        Some("CT")
    );
    assert!(output.transform_sequence.is_none());
}

#[cfg(unix)]
mod stub_backend {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use voxalign::OptimizerOpts;

    fn write_stub(dir: &PathBuf, body: &str) -> PathBuf {
        let path = dir.join("stub-optimizer.sh");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    const SUCCESS_SCRIPT: &str = r#"#!/bin/sh
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-out" ]; then out="$a"; fi
  prev="$a"
done
cat > "$out/TransformParameters.0.txt" <<'EOF'
(Transform "TranslationTransform")
(TransformParameters 1 2 3)
(InitialTransformParametersFileName "NoInitialTransform")
EOF
"#;

    const FAILING_SCRIPT: &str = r#"#!/bin/sh
echo "stub optimizer exploded" >&2
exit 3
"#;

    // Floods stderr well past the OS pipe buffer before producing the
    // artifact; a run that only reads stderr after stdout closes would stall
    // here forever.
    const STDERR_HEAVY_SCRIPT: &str = r#"#!/bin/sh
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-out" ]; then out="$a"; fi
  prev="$a"
done
awk 'BEGIN { for (i = 0; i < 20000; i++) print "warning: sample outside moving image buffer" }' >&2
cat > "$out/TransformParameters.0.txt" <<'EOF'
(Transform "TranslationTransform")
(TransformParameters 1 2 3)
(InitialTransformParametersFileName "NoInitialTransform")
EOF
"#;

    // Emits bytes that are not valid UTF-8 on stdout, then sleeps; the run
    // must kill the child and return instead of waiting it out.
    const BAD_STDOUT_SCRIPT: &str = r#"#!/bin/sh
printf '\377\376\375 broken\n'
sleep 30
"#;

    #[test]
    fn stub_optimizer_result_is_imported_as_translation() {
        init_logs();
        let root = scratch_root("stub_success");
        let exe = write_stub(&root, SUCCESS_SCRIPT);

        let mut scene = Scene::new();
        let fixed = scene.add_volume("fixed", blob(DVec3::ZERO));
        let moving = scene.add_volume("moving", blob(DVec3::ZERO));

        let mut orch = RegistrationOrchestrator::new(OrchestratorOpts {
            workspace: WorkspaceOptions {
                root: Some(root.clone()),
                retain: false,
            },
            optimizer: OptimizerOpts { executable: exe },
            ..Default::default()
        });
        let output = orch
            .register_volumes(
                &mut scene,
                RegistrationInputs {
                    fixed: Some(fixed),
                    moving: Some(moving),
                    ..Default::default()
                },
                "optimizer",
            )
            .unwrap();

        assert_eq!(orch.phase(), Phase::Done);
        let matrix = scene
            .transform(output.transform)
            .unwrap()
            .repr
            .as_ref()
            .unwrap()
            .as_linear()
            .unwrap();
        let moved = matrix.transform_point3(DVec3::ZERO);
        assert!((moved - DVec3::new(1.0, 2.0, 3.0)).length() < 1e-9);

        // Only the stub script remains; the workspace is gone.
        assert_eq!(dir_entry_count(&root), 1);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn failing_optimizer_surfaces_its_stderr() {
        init_logs();
        let root = scratch_root("stub_failure");
        let exe = write_stub(&root, FAILING_SCRIPT);

        let mut scene = Scene::new();
        let fixed = scene.add_volume("fixed", blob(DVec3::ZERO));
        let moving = scene.add_volume("moving", blob(DVec3::ZERO));

        let mut orch = RegistrationOrchestrator::new(OrchestratorOpts {
            workspace: WorkspaceOptions {
                root: Some(root.clone()),
                retain: false,
            },
            optimizer: OptimizerOpts { executable: exe },
            ..Default::default()
        });
        let err = orch
            .register_volumes(
                &mut scene,
                RegistrationInputs {
                    fixed: Some(fixed),
                    moving: Some(moving),
                    ..Default::default()
                },
                "optimizer",
            )
            .unwrap_err();

        assert_eq!(orch.phase(), Phase::Failed);
        let VoxalignError::BackendProcess(msg) = err else {
            panic!("expected a backend process error");
        };
        assert!(msg.contains("stub optimizer exploded"));

        assert_eq!(dir_entry_count(&root), 1);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn stderr_heavy_optimizer_does_not_stall() {
        init_logs();
        let root = scratch_root("stub_stderr_heavy");
        let exe = write_stub(&root, STDERR_HEAVY_SCRIPT);

        let mut scene = Scene::new();
        let fixed = scene.add_volume("fixed", blob(DVec3::ZERO));
        let moving = scene.add_volume("moving", blob(DVec3::ZERO));

        let mut orch = RegistrationOrchestrator::new(OrchestratorOpts {
            workspace: WorkspaceOptions {
                root: Some(root.clone()),
                retain: false,
            },
            optimizer: OptimizerOpts { executable: exe },
            ..Default::default()
        });
        let started = std::time::Instant::now();
        let output = orch
            .register_volumes(
                &mut scene,
                RegistrationInputs {
                    fixed: Some(fixed),
                    moving: Some(moving),
                    ..Default::default()
                },
                "optimizer",
            )
            .unwrap();

        assert!(started.elapsed() < std::time::Duration::from_secs(30));
        assert_eq!(orch.phase(), Phase::Done);
        let matrix = scene
            .transform(output.transform)
            .unwrap()
            .repr
            .as_ref()
            .unwrap()
            .as_linear()
            .unwrap();
        let moved = matrix.transform_point3(DVec3::ZERO);
        assert!((moved - DVec3::new(1.0, 2.0, 3.0)).length() < 1e-9);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn unreadable_stdout_kills_the_child_and_errors() {
        init_logs();
        let root = scratch_root("stub_bad_stdout");
        let exe = write_stub(&root, BAD_STDOUT_SCRIPT);

        let mut scene = Scene::new();
        let fixed = scene.add_volume("fixed", blob(DVec3::ZERO));
        let moving = scene.add_volume("moving", blob(DVec3::ZERO));

        let mut orch = RegistrationOrchestrator::new(OrchestratorOpts {
            workspace: WorkspaceOptions {
                root: Some(root.clone()),
                retain: false,
            },
            optimizer: OptimizerOpts { executable: exe },
            ..Default::default()
        });
        let started = std::time::Instant::now();
        let err = orch
            .register_volumes(
                &mut scene,
                RegistrationInputs {
                    fixed: Some(fixed),
                    moving: Some(moving),
                    ..Default::default()
                },
                "optimizer",
            )
            .unwrap_err();

        // Returns well before the stub's 30s sleep would end.
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
        assert_eq!(orch.phase(), Phase::Failed);
        assert!(err.to_string().contains("stdout"));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
