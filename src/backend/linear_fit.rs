//! In-process rigid fit: derivative-free coordinate descent over six rigid
//! parameters against a mean-squared intensity cost on sampled fixed voxels.
//!
//! Deterministic for a given seed, so repeated runs over the same inputs
//! produce the same matrix.

use glam::{DMat4, DVec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{VoxalignError, VoxalignResult};
use crate::math::{euler_zxy, rigid_about_center};
use crate::volume::Volume;

/// Tuning for the in-process fit. Defaults track the staging path's 1%
/// sampling rate.
#[derive(Clone, Copy, Debug)]
pub struct LinearFitOpts {
    /// Fraction of fixed voxels sampled for the cost (clamped to a floor of
    /// 128 samples so tiny volumes still constrain all six parameters).
    pub sampling_rate: f64,
    pub seed: u64,
    pub max_sweeps: usize,
    pub translation_tolerance_mm: f64,
    pub rotation_tolerance_rad: f64,
}

impl Default for LinearFitOpts {
    fn default() -> Self {
        Self {
            sampling_rate: 0.01,
            seed: 0x7065_7266,
            max_sweeps: 200,
            translation_tolerance_mm: 0.01,
            rotation_tolerance_rad: 1e-4,
        }
    }
}

/// Fit a rigid from-parent matrix mapping fixed-space points onto the moving
/// volume: the returned matrix `T` minimizes the squared difference between
/// `fixed(p)` and `moving(T p)` over the sampled points.
pub fn run(fixed: &Volume, moving: &Volume, opts: &LinearFitOpts) -> VoxalignResult<DMat4> {
    if !(0.0..=1.0).contains(&opts.sampling_rate) || opts.sampling_rate == 0.0 {
        return Err(VoxalignError::validation(
            "sampling rate must be in (0, 1]",
        ));
    }

    let samples = sample_fixed_points(fixed, opts);
    if samples.is_empty() {
        return Err(VoxalignError::validation(
            "fixed volume produced no sample points",
        ));
    }
    tracing::info!(
        samples = samples.len(),
        max_sweeps = opts.max_sweeps,
        "starting linear fit"
    );

    let center = fixed.geometry.center_physical();
    // Parameters: [rx, ry, rz, tx, ty, tz].
    let mut params = [0.0f64; 6];
    let max_spacing = moving
        .geometry
        .spacing
        .max_element()
        .max(fixed.geometry.spacing.max_element());
    let mut steps = [
        0.05,
        0.05,
        0.05,
        2.0 * max_spacing,
        2.0 * max_spacing,
        2.0 * max_spacing,
    ];

    let mut best = cost(&samples, moving, &params, center);
    let mut sweeps = 0usize;
    while sweeps < opts.max_sweeps {
        sweeps += 1;
        let mut improved = false;
        for axis in 0..6 {
            for sign in [1.0, -1.0] {
                let mut candidate = params;
                candidate[axis] += sign * steps[axis];
                let c = cost(&samples, moving, &candidate, center);
                if c < best {
                    best = c;
                    params = candidate;
                    improved = true;
                }
            }
        }
        if !improved {
            for step in &mut steps {
                *step *= 0.5;
            }
            let rot_done = steps[0] < opts.rotation_tolerance_rad;
            let trans_done = steps[3] < opts.translation_tolerance_mm;
            if rot_done && trans_done {
                break;
            }
        }
    }

    if !best.is_finite() {
        return Err(VoxalignError::validation(
            "volumes do not overlap enough for a linear fit",
        ));
    }

    tracing::info!(sweeps, cost = best, "linear fit converged");
    let rotation = euler_zxy(params[0], params[1], params[2]);
    let translation = DVec3::new(params[3], params[4], params[5]);
    Ok(rigid_about_center(rotation, translation, center))
}

fn sample_fixed_points(fixed: &Volume, opts: &LinearFitOpts) -> Vec<(DVec3, f64)> {
    let total = fixed.geometry.voxel_count();
    let target = ((total as f64 * opts.sampling_rate) as usize)
        .max(128)
        .min(total);
    let [nx, ny, nz] = fixed.geometry.dims;

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut samples = Vec::with_capacity(target);
    for _ in 0..target {
        let i = rng.random_range(0..nx);
        let j = rng.random_range(0..ny);
        let k = rng.random_range(0..nz);
        let p = fixed.geometry.index_to_physical([i, j, k]);
        if let Some(v) = fixed.at(i, j, k) {
            samples.push((p, f64::from(v)));
        }
    }
    samples
}

/// Mean squared intensity difference over the sample set; infinite when
/// fewer than half the samples land inside the moving volume.
fn cost(samples: &[(DVec3, f64)], moving: &Volume, params: &[f64; 6], center: DVec3) -> f64 {
    let rotation = euler_zxy(params[0], params[1], params[2]);
    let translation = DVec3::new(params[3], params[4], params[5]);
    let matrix = rigid_about_center(rotation, translation, center);

    let mut sum = 0.0f64;
    let mut valid = 0usize;
    for &(p, fixed_value) in samples {
        let q = matrix.transform_point3(p);
        if let Some(moving_value) = moving.sample_physical(q) {
            let d = fixed_value - moving_value;
            sum += d * d;
            valid += 1;
        }
    }
    if valid * 2 < samples.len() {
        return f64::INFINITY;
    }
    sum / valid as f64
}
