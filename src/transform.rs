//! Transform representations stored on scene transform nodes.
//!
//! A transform maps points from the parent (fixed/reference) space into the
//! node's own space, matching the from-parent convention used by resampling.

use glam::{DMat3, DMat4, DVec3, DVec4};

use crate::math::{euler_zxy, mat4_from_linear_translation, rigid_about_center};

/// What a transform node holds: either a single 4×4 matrix or a staged
/// general transform that may not reduce to one.
#[derive(Clone, Debug, PartialEq)]
pub enum TransformRepr {
    Linear(DMat4),
    General(GeneralTransform),
}

impl TransformRepr {
    /// The single-matrix form, if this transform has one.
    pub fn as_linear(&self) -> Option<DMat4> {
        match self {
            Self::Linear(m) => Some(*m),
            Self::General(g) => g.as_linear(),
        }
    }
}

/// A composition of transform stages, applied first-to-last.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneralTransform {
    pub stages: Vec<TransformStage>,
}

impl GeneralTransform {
    /// Collapse to one matrix if every stage is linear, last stage outermost.
    pub fn as_linear(&self) -> Option<DMat4> {
        let mut combined = DMat4::IDENTITY;
        for stage in &self.stages {
            combined = stage.as_matrix()? * combined;
        }
        Some(combined)
    }
}

/// One parametric stage, as found in optimizer result artifacts.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformStage {
    /// Stage kind as named by the optimizer (e.g. "EulerTransform").
    pub kind: String,
    pub parameters: Vec<f64>,
    /// Center of rotation in physical coordinates.
    pub center: DVec3,
}

impl TransformStage {
    /// The 4×4 matrix for this stage, or `None` for non-linear kinds.
    pub fn as_matrix(&self) -> Option<DMat4> {
        match self.kind.as_str() {
            "EulerTransform" if self.parameters.len() == 6 => {
                let p = &self.parameters;
                let rotation = euler_zxy(p[0], p[1], p[2]);
                let translation = DVec3::new(p[3], p[4], p[5]);
                Some(rigid_about_center(rotation, translation, self.center))
            }
            "TranslationTransform" if self.parameters.len() == 3 => {
                let p = &self.parameters;
                Some(mat4_from_linear_translation(
                    DMat3::IDENTITY,
                    DVec3::new(p[0], p[1], p[2]),
                ))
            }
            "AffineTransform" if self.parameters.len() == 12 => {
                let p = &self.parameters;
                // Row-major 3x3 followed by the translation vector.
                let linear = DMat3::from_cols(
                    DVec3::new(p[0], p[3], p[6]),
                    DVec3::new(p[1], p[4], p[7]),
                    DVec3::new(p[2], p[5], p[8]),
                );
                let translation = DVec3::new(p[9], p[10], p[11]);
                let t = translation + self.center - linear * self.center;
                Some(mat4_from_linear_translation(linear, t))
            }
            _ => None,
        }
    }
}

/// Row-by-row textual rendering of a matrix, for CLI output and logs.
pub fn format_mat4(m: &DMat4) -> String {
    let row = |r: DVec4| format!("{:.6} {:.6} {:.6} {:.6}", r.x, r.y, r.z, r.w);
    let rows = [
        DVec4::new(m.x_axis.x, m.y_axis.x, m.z_axis.x, m.w_axis.x),
        DVec4::new(m.x_axis.y, m.y_axis.y, m.z_axis.y, m.w_axis.y),
        DVec4::new(m.x_axis.z, m.y_axis.z, m.z_axis.z, m.w_axis.z),
        DVec4::new(m.x_axis.w, m.y_axis.w, m.z_axis.w, m.w_axis.w),
    ];
    format!("{}\n{}\n{}\n{}\n", row(rows[0]), row(rows[1]), row(rows[2]), row(rows[3]))
}
