//! Parse optimizer result artifacts into transform nodes.
//!
//! Artifacts are `(key value...)` documents. A rigid (Euler) result reduces
//! to a single matrix; anything else is staged verbatim as a general
//! transform so downstream code can decide what to do with it.

use std::path::Path;

use anyhow::Context as _;
use glam::DVec3;

use crate::error::{VoxalignError, VoxalignResult};
use crate::scene::{NodeId, Scene};
use crate::transform::{GeneralTransform, TransformRepr, TransformStage};

/// How the artifact landed in the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The artifact reduced to a single matrix.
    Linear,
    /// The artifact was stored as a general (staged) transform.
    GeneralFallback,
}

/// Read an artifact file and store its transform on `output_transform`.
pub fn import(
    artifact: &Path,
    scene: &mut Scene,
    output_transform: NodeId,
) -> VoxalignResult<ImportOutcome> {
    let text = std::fs::read_to_string(artifact)
        .with_context(|| format!("failed to read artifact '{}'", artifact.display()))?;
    let general = parse_artifact(&text)?;

    let (repr, outcome) = match general.as_linear() {
        Some(matrix) => (TransformRepr::Linear(matrix), ImportOutcome::Linear),
        None => {
            tracing::warn!(
                artifact = %artifact.display(),
                "result does not reduce to a matrix, storing as general transform"
            );
            (TransformRepr::General(general), ImportOutcome::GeneralFallback)
        }
    };
    scene.transform_mut(output_transform)?.repr = Some(repr);
    Ok(outcome)
}

/// Parse the artifact text into a (possibly single-stage) general transform.
pub fn parse_artifact(text: &str) -> VoxalignResult<GeneralTransform> {
    let mut kind: Option<String> = None;
    let mut parameters: Vec<f64> = Vec::new();
    let mut center = DVec3::ZERO;
    let mut initial_file: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let Some(inner) = line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) else {
            continue;
        };
        let tokens = tokenize(inner);
        let Some((key, values)) = tokens.split_first() else {
            continue;
        };
        match key.as_str() {
            "Transform" => {
                kind = values.first().cloned();
            }
            "TransformParameters" => {
                parameters = parse_numbers(values, "TransformParameters")?;
            }
            "CenterOfRotationPoint" => {
                let v = parse_numbers(values, "CenterOfRotationPoint")?;
                if v.len() != 3 {
                    return Err(VoxalignError::validation(
                        "CenterOfRotationPoint must have three values",
                    ));
                }
                center = DVec3::new(v[0], v[1], v[2]);
            }
            "InitialTransformParametersFileName" => {
                if let Some(name) = values.first()
                    && name != "NoInitialTransform"
                {
                    initial_file = Some(name.clone());
                }
            }
            _ => {}
        }
    }

    let kind = kind
        .ok_or_else(|| VoxalignError::validation("artifact has no Transform entry"))?;

    let mut stages = Vec::new();
    if let Some(file) = initial_file {
        // A chained initial transform lives in a separate file we do not
        // resolve; keep it as an opaque stage so the result stays general.
        stages.push(TransformStage {
            kind: format!("InitialTransformFile:{file}"),
            parameters: Vec::new(),
            center: DVec3::ZERO,
        });
    }
    stages.push(TransformStage {
        kind,
        parameters,
        center,
    });
    Ok(GeneralTransform { stages })
}

/// Split on whitespace, honoring double-quoted tokens.
fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in s.chars() {
        match ch {
            '"' => {
                if in_quotes {
                    tokens.push(std::mem::take(&mut current));
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_numbers(values: &[String], key: &str) -> VoxalignResult<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.parse::<f64>().map_err(|_| {
                VoxalignError::validation(format!("non-numeric value in {key}: {v}"))
            })
        })
        .collect()
}
