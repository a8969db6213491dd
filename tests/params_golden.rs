use voxalign::{ParamValue, RegistrationConfig, SynthesisFlags, synthesize};

const GOLDEN_DEFAULTS: &str = "\
(NumberOfResolutions 6)
(AutomaticTransformInitializationMethod \"Origins\")
(AutomaticScalesEstimation \"true\")
(NumberOfHistogramBins 64)
(MaximumNumberOfIterations 1000)
(NumberOfSpatialSamples 3000)
(AutomaticTransformInitialization \"true\")
(ErodeMask \"false\")
(FixedInternalImagePixelType \"float\")
(MovingInternalImagePixelType \"float\")
(Registration \"MultiResolutionRegistration\")
(Interpolator \"LinearInterpolator\")
(ResampleInterpolator \"FinalBSplineInterpolator\")
(FinalBSplineInterpolationOrder 3)
(Resampler \"DefaultResampler\")
(FixedImagePyramid \"FixedSmoothingImagePyramid\")
(MovingImagePyramid \"MovingSmoothingImagePyramid\")
(Optimizer \"AdaptiveStochasticGradientDescent\")
(ASGDParameterEstimationMethod \"DisplacementDistribution\")
(Transform \"EulerTransform\")
(Metric \"AdvancedMattesMutualInformation\")
(HowToCombineTransforms \"Compose\")
(NewSamplesEveryIteration \"true\")
(ImageSampler \"RandomCoordinate\")
(DefaultPixelValue 0)
(WriteResultImage \"false\")
(ResultImagePixelType \"short\")
(ResultImageFormat \"mhd\")
";

#[test]
fn defaults_match_golden_document() {
    let config = synthesize(&RegistrationConfig::new(), SynthesisFlags::default());
    assert_eq!(config.to_document(), GOLDEN_DEFAULTS);
}

#[test]
fn overrides_replace_in_place_and_append_unknowns() {
    let mut overrides = RegistrationConfig::new();
    overrides.set("MaximumNumberOfIterations", 250i64);
    overrides.set("CustomParameter", "custom");

    let config = synthesize(&overrides, SynthesisFlags::default());
    let doc = config.to_document();

    assert!(doc.contains("(MaximumNumberOfIterations 250)\n"));
    assert!(!doc.contains("(MaximumNumberOfIterations 1000)"));
    assert_eq!(
        config.get("MaximumNumberOfIterations"),
        Some(&ParamValue::Int(250))
    );

    // The overridden key keeps its default position.
    let keys: Vec<&str> = config.iter().map(|(k, _)| k).collect();
    let golden_keys: Vec<&str> = GOLDEN_DEFAULTS
        .lines()
        .map(|l| l[1..].split(' ').next().unwrap())
        .collect();
    assert_eq!(&keys[..golden_keys.len()], &golden_keys[..]);
    assert_eq!(keys.last(), Some(&"CustomParameter"));
}

#[test]
fn prealigned_flag_flips_automatic_initialization() {
    let doc = synthesize(
        &RegistrationConfig::new(),
        SynthesisFlags {
            prealigned: true,
            ..Default::default()
        },
    )
    .to_document();
    assert!(doc.contains("(AutomaticTransformInitialization \"false\")\n"));
    assert!(!doc.contains("(AutomaticTransformInitialization \"true\")"));
}

#[test]
fn manual_scales_is_a_bare_number() {
    let doc = synthesize(
        &RegistrationConfig::new(),
        SynthesisFlags {
            scales: Some(5000.0),
            ..Default::default()
        },
    )
    .to_document();
    assert!(doc.contains("(Scales 5000)\n"));
    assert!(!doc.contains("AutomaticScalesEstimation"));
}

#[test]
fn hard_edged_masks_enable_erosion() {
    let doc = synthesize(
        &RegistrationConfig::new(),
        SynthesisFlags {
            mask_has_hard_edge: true,
            ..Default::default()
        },
    )
    .to_document();
    assert!(doc.contains("(ErodeMask \"true\")\n"));
}
