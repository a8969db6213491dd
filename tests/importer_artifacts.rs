use std::path::PathBuf;

use glam::DVec3;
use voxalign::importer::{ImportOutcome, import};
use voxalign::math::{euler_zxy, mat4_max_abs_diff, rigid_about_center};
use voxalign::transform::TransformRepr;
use voxalign::{Scene, VoxalignError};

fn write_artifact(name: &str, text: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "voxalign_artifact_{}_{}_{name}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn euler_artifact_imports_as_matching_matrix() {
    let text = "\
(Transform \"EulerTransform\")
(NumberOfParameters 6)
(TransformParameters 0.02 -0.01 0.005 1.5 -2.5 3.0)
(InitialTransformParametersFileName \"NoInitialTransform\")
(CenterOfRotationPoint 12.0 -8.0 40.0)
(HowToCombineTransforms \"Compose\")
";
    let path = write_artifact("euler.txt", text);

    let mut scene = Scene::new();
    let out = scene.add_transform("result", None);
    let outcome = import(&path, &mut scene, out).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(outcome, ImportOutcome::Linear);
    let repr = scene.transform(out).unwrap().repr.clone().unwrap();
    let TransformRepr::Linear(matrix) = repr else {
        panic!("expected a linear transform");
    };

    let expected = rigid_about_center(
        euler_zxy(0.02, -0.01, 0.005),
        DVec3::new(1.5, -2.5, 3.0),
        DVec3::new(12.0, -8.0, 40.0),
    );
    assert!(mat4_max_abs_diff(&matrix, &expected) < 1e-6);
}

#[test]
fn translation_artifact_imports_as_pure_translation() {
    let text = "\
(Transform \"TranslationTransform\")
(TransformParameters 3.0 -2.0 1.5)
(InitialTransformParametersFileName \"NoInitialTransform\")
";
    let path = write_artifact("translation.txt", text);

    let mut scene = Scene::new();
    let out = scene.add_transform("result", None);
    let outcome = import(&path, &mut scene, out).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(outcome, ImportOutcome::Linear);
    let matrix = scene
        .transform(out)
        .unwrap()
        .repr
        .as_ref()
        .unwrap()
        .as_linear()
        .unwrap();
    let moved = matrix.transform_point3(DVec3::ZERO);
    assert!((moved - DVec3::new(3.0, -2.0, 1.5)).length() < 1e-9);
}

#[test]
fn bspline_artifact_falls_back_to_general() {
    let text = "\
(Transform \"BSplineTransform\")
(TransformParameters 0.1 0.2 0.3 0.4 0.5 0.6 0.7 0.8)
(GridSize 2 2 2)
(InitialTransformParametersFileName \"NoInitialTransform\")
";
    let path = write_artifact("bspline.txt", text);

    let mut scene = Scene::new();
    let out = scene.add_transform("result", None);
    let outcome = import(&path, &mut scene, out).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(outcome, ImportOutcome::GeneralFallback);
    let repr = scene.transform(out).unwrap().repr.clone().unwrap();
    assert!(matches!(repr, TransformRepr::General(_)));
    assert!(repr.as_linear().is_none());
}

#[test]
fn chained_initial_transform_forces_general_fallback() {
    let text = "\
(Transform \"EulerTransform\")
(TransformParameters 0 0 0 1 2 3)
(InitialTransformParametersFileName \"/tmp/TransformParameters.prev.txt\")
(CenterOfRotationPoint 0 0 0)
";
    let path = write_artifact("chained.txt", text);

    let mut scene = Scene::new();
    let out = scene.add_transform("result", None);
    let outcome = import(&path, &mut scene, out).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(outcome, ImportOutcome::GeneralFallback);
}

#[test]
fn artifact_without_transform_entry_is_an_error() {
    let path = write_artifact("empty.txt", "(TransformParameters 1 2 3)\n");

    let mut scene = Scene::new();
    let out = scene.add_transform("result", None);
    let err = import(&path, &mut scene, out).unwrap_err();
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(err, VoxalignError::Validation(_)));
}
