//! Parameter document synthesis for the external optimizer.
//!
//! The backend consumes a plain-text document of `(key value)` lines. Key
//! order is significant to human reviewers diffing runs, so the config keeps
//! insertion order and overrides replace values in place.

use std::fmt;
use std::path::Path;

use anyhow::Context as _;

use crate::error::VoxalignResult;

/// A single parameter value. Strings and booleans render double-quoted
/// (the backend parses `"true"`/`"false"` as booleans); numbers render bare,
/// with whole-valued floats printed without a fractional part.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Bool(b) => write!(f, "\"{b}\""),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Ordered key/value parameter set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistrationConfig {
    entries: Vec<(String, ParamValue)>,
}

impl RegistrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key. An existing key keeps its position; a new key appends.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render the full `(key value)` document, one line per entry.
    pub fn to_document(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push('(');
            out.push_str(key);
            out.push(' ');
            out.push_str(&value.to_string());
            out.push_str(")\n");
        }
        out
    }

    pub fn write_file(&self, path: &Path) -> VoxalignResult<()> {
        std::fs::write(path, self.to_document())
            .with_context(|| format!("failed to write parameter file '{}'", path.display()))?;
        Ok(())
    }
}

/// Switches that vary the synthesized defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct SynthesisFlags {
    /// Inputs are already roughly aligned; skip automatic initialization.
    pub prealigned: bool,
    /// Masks have hard edges and should be eroded per resolution level.
    pub mask_has_hard_edge: bool,
    /// Manual parameter scaling; when unset the backend estimates scales.
    /// Useful range is roughly 1000-9000; smaller values permit more
    /// rotational search.
    pub scales: Option<f64>,
}

/// Build the full rigid-registration parameter set: fixed defaults adjusted
/// by `flags`, then `overrides` merged on top (in-place for known keys,
/// appended otherwise).
pub fn synthesize(overrides: &RegistrationConfig, flags: SynthesisFlags) -> RegistrationConfig {
    let mut config = RegistrationConfig::new();
    config.set("NumberOfResolutions", 6i64);
    config.set("AutomaticTransformInitializationMethod", "Origins");
    match flags.scales {
        None => config.set("AutomaticScalesEstimation", true),
        Some(scales) => config.set("Scales", scales),
    }
    config.set("NumberOfHistogramBins", 64i64);
    config.set("MaximumNumberOfIterations", 1000i64);
    config.set("NumberOfSpatialSamples", 3000i64);
    config.set("AutomaticTransformInitialization", !flags.prealigned);
    config.set("ErodeMask", flags.mask_has_hard_edge);
    config.set("FixedInternalImagePixelType", "float");
    config.set("MovingInternalImagePixelType", "float");
    config.set("Registration", "MultiResolutionRegistration");
    config.set("Interpolator", "LinearInterpolator");
    config.set("ResampleInterpolator", "FinalBSplineInterpolator");
    config.set("FinalBSplineInterpolationOrder", 3i64);
    config.set("Resampler", "DefaultResampler");
    config.set("FixedImagePyramid", "FixedSmoothingImagePyramid");
    config.set("MovingImagePyramid", "MovingSmoothingImagePyramid");
    config.set("Optimizer", "AdaptiveStochasticGradientDescent");
    config.set("ASGDParameterEstimationMethod", "DisplacementDistribution");
    config.set("Transform", "EulerTransform");
    config.set("Metric", "AdvancedMattesMutualInformation");
    config.set("HowToCombineTransforms", "Compose");
    config.set("NewSamplesEveryIteration", true);
    config.set("ImageSampler", "RandomCoordinate");
    config.set("DefaultPixelValue", 0i64);
    config.set("WriteResultImage", false);
    config.set("ResultImagePixelType", "short");
    config.set("ResultImageFormat", "mhd");

    for (key, value) in overrides.iter() {
        config.set(key, value.clone());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_and_bools_are_quoted_numbers_are_bare() {
        assert_eq!(ParamValue::from("Origins").to_string(), "\"Origins\"");
        assert_eq!(ParamValue::from(true).to_string(), "\"true\"");
        assert_eq!(ParamValue::from(false).to_string(), "\"false\"");
        assert_eq!(ParamValue::from(64i64).to_string(), "64");
        assert_eq!(ParamValue::from(5000.0).to_string(), "5000");
        assert_eq!(ParamValue::from(0.25).to_string(), "0.25");
    }

    #[test]
    fn set_keeps_position_for_existing_keys() {
        let mut config = RegistrationConfig::new();
        config.set("A", 1i64);
        config.set("B", 2i64);
        config.set("A", 9i64);
        let keys: Vec<&str> = config.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(config.get("A"), Some(&ParamValue::Int(9)));
    }

    #[test]
    fn manual_scales_replaces_automatic_estimation() {
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
    fn prealigned_disables_automatic_initialization() {
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
}
