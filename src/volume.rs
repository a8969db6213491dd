use glam::{DMat3, DMat4, DVec3};

use crate::error::{VoxalignError, VoxalignResult};

/// Spatial metadata for a 3D scalar volume.
///
/// Physical position of a (continuous) voxel index `c` is
/// `origin + direction * (c * spacing)`; column `i` of `direction` is the
/// physical direction of grid axis `i`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VolumeGeometry {
    /// Grid size along x/y/z; every component must be non-zero.
    pub dims: [usize; 3],
    /// Voxel spacing in millimetres; every component must be positive.
    pub spacing: DVec3,
    /// Physical position of voxel (0, 0, 0).
    pub origin: DVec3,
    /// Direction cosines (columns are grid-axis directions).
    pub direction: DMat3,
}

impl VolumeGeometry {
    /// Create a validated geometry with identity direction cosines.
    pub fn new(dims: [usize; 3], spacing: DVec3, origin: DVec3) -> VoxalignResult<Self> {
        let g = Self {
            dims,
            spacing,
            origin,
            direction: DMat3::IDENTITY,
        };
        g.validate()?;
        Ok(g)
    }

    /// Replace the direction cosines.
    pub fn with_direction(mut self, direction: DMat3) -> Self {
        self.direction = direction;
        self
    }

    pub fn validate(&self) -> VoxalignResult<()> {
        if self.dims.iter().any(|&d| d == 0) {
            return Err(VoxalignError::validation(
                "volume dims must all be non-zero",
            ));
        }
        if self.spacing.min_element() <= 0.0 {
            return Err(VoxalignError::validation(
                "volume spacing must be positive along every axis",
            ));
        }
        if self.direction.determinant().abs() < 1e-12 {
            return Err(VoxalignError::validation(
                "volume direction matrix must be invertible",
            ));
        }
        Ok(())
    }

    /// Total number of voxels in the grid.
    pub fn voxel_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Physical position of an integer voxel index.
    pub fn index_to_physical(&self, idx: [usize; 3]) -> DVec3 {
        self.continuous_index_to_physical(DVec3::new(idx[0] as f64, idx[1] as f64, idx[2] as f64))
    }

    /// Physical position of a continuous voxel index.
    pub fn continuous_index_to_physical(&self, c: DVec3) -> DVec3 {
        self.origin + self.direction * (c * self.spacing)
    }

    /// Continuous voxel index of a physical point.
    pub fn physical_to_continuous_index(&self, p: DVec3) -> DVec3 {
        (self.direction.inverse() * (p - self.origin)) / self.spacing
    }

    /// Physical position of the grid center.
    pub fn center_physical(&self) -> DVec3 {
        self.continuous_index_to_physical(DVec3::new(
            (self.dims[0] - 1) as f64 / 2.0,
            (self.dims[1] - 1) as f64 / 2.0,
            (self.dims[2] - 1) as f64 / 2.0,
        ))
    }
}

/// A 3D scalar image: geometry plus f32 voxel data, x-fastest layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    /// Spatial metadata for the voxel grid.
    pub geometry: VolumeGeometry,
    data: Vec<f32>,
}

impl Volume {
    /// Wrap voxel data in a geometry; the data length must match the grid.
    pub fn new(geometry: VolumeGeometry, data: Vec<f32>) -> VoxalignResult<Self> {
        geometry.validate()?;
        if data.len() != geometry.voxel_count() {
            return Err(VoxalignError::validation(format!(
                "voxel data length {} does not match grid size {}",
                data.len(),
                geometry.voxel_count()
            )));
        }
        Ok(Self { geometry, data })
    }

    /// A constant-valued volume.
    pub fn filled(geometry: VolumeGeometry, value: f32) -> VoxalignResult<Self> {
        let len = geometry.voxel_count();
        Self::new(geometry, vec![value; len])
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    fn flat(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.geometry.dims[1] + j) * self.geometry.dims[0] + i
    }

    /// Voxel value at an integer index; `None` outside the grid.
    pub fn at(&self, i: usize, j: usize, k: usize) -> Option<f32> {
        let [nx, ny, nz] = self.geometry.dims;
        if i >= nx || j >= ny || k >= nz {
            return None;
        }
        Some(self.data[self.flat(i, j, k)])
    }

    /// Set a voxel value; out-of-range indices are ignored.
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f32) {
        let [nx, ny, nz] = self.geometry.dims;
        if i < nx && j < ny && k < nz {
            let idx = self.flat(i, j, k);
            self.data[idx] = value;
        }
    }

    /// Trilinear sample at a physical point; `None` outside the grid.
    pub fn sample_physical(&self, p: DVec3) -> Option<f64> {
        let c = self.geometry.physical_to_continuous_index(p);
        let [nx, ny, nz] = self.geometry.dims;

        if c.x < 0.0 || c.y < 0.0 || c.z < 0.0 {
            return None;
        }
        if c.x > (nx - 1) as f64 || c.y > (ny - 1) as f64 || c.z > (nz - 1) as f64 {
            return None;
        }

        let i0 = (c.x.floor() as usize).min(nx - 1);
        let j0 = (c.y.floor() as usize).min(ny - 1);
        let k0 = (c.z.floor() as usize).min(nz - 1);
        let i1 = (i0 + 1).min(nx - 1);
        let j1 = (j0 + 1).min(ny - 1);
        let k1 = (k0 + 1).min(nz - 1);

        let fx = c.x - i0 as f64;
        let fy = c.y - j0 as f64;
        let fz = c.z - k0 as f64;

        let v = |i: usize, j: usize, k: usize| f64::from(self.data[self.flat(i, j, k)]);

        let c00 = v(i0, j0, k0) * (1.0 - fx) + v(i1, j0, k0) * fx;
        let c10 = v(i0, j1, k0) * (1.0 - fx) + v(i1, j1, k0) * fx;
        let c01 = v(i0, j0, k1) * (1.0 - fx) + v(i1, j0, k1) * fx;
        let c11 = v(i0, j1, k1) * (1.0 - fx) + v(i1, j1, k1) * fx;

        let c0 = c00 * (1.0 - fy) + c10 * fy;
        let c1 = c01 * (1.0 - fy) + c11 * fy;

        Some(c0 * (1.0 - fz) + c1 * fz)
    }

    /// Resample this volume onto `target`, pulling through a from-parent
    /// matrix: each output voxel at physical `x` takes the value sampled at
    /// `from_parent * x`, or `default_value` outside the grid.
    pub fn resample_linear(
        &self,
        target: &VolumeGeometry,
        from_parent: &DMat4,
        default_value: f32,
    ) -> Volume {
        let [nx, ny, nz] = target.dims;
        let mut data = Vec::with_capacity(target.voxel_count());
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let p = target.index_to_physical([i, j, k]);
                    let q = from_parent.transform_point3(p);
                    let v = self
                        .sample_physical(q)
                        .map_or(default_value, |s| s as f32);
                    data.push(v);
                }
            }
        }
        Volume {
            geometry: target.clone(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_volume() -> Volume {
        let geometry =
            VolumeGeometry::new([4, 4, 4], DVec3::new(2.0, 2.0, 2.0), DVec3::ZERO).unwrap();
        let data = (0..geometry.voxel_count()).map(|v| v as f32).collect();
        Volume::new(geometry, data).unwrap()
    }

    #[test]
    fn physical_roundtrip_matches_index() {
        let v = ramp_volume();
        let p = v.geometry.index_to_physical([2, 1, 3]);
        let c = v.geometry.physical_to_continuous_index(p);
        assert!((c - DVec3::new(2.0, 1.0, 3.0)).length() < 1e-12);
    }

    #[test]
    fn sampling_at_grid_points_is_exact() {
        let v = ramp_volume();
        let p = v.geometry.index_to_physical([1, 2, 3]);
        let s = v.sample_physical(p).unwrap();
        assert!((s - f64::from(v.at(1, 2, 3).unwrap())).abs() < 1e-9);
    }

    #[test]
    fn sampling_outside_returns_none() {
        let v = ramp_volume();
        assert!(v.sample_physical(DVec3::new(-1.0, 0.0, 0.0)).is_none());
        assert!(v.sample_physical(DVec3::new(0.0, 0.0, 100.0)).is_none());
    }

    #[test]
    fn identity_resample_reproduces_data() {
        let v = ramp_volume();
        let out = v.resample_linear(&v.geometry, &DMat4::IDENTITY, 0.0);
        for (a, b) in v.data().iter().zip(out.data()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn mismatched_data_length_is_rejected() {
        let geometry =
            VolumeGeometry::new([2, 2, 2], DVec3::new(1.0, 1.0, 1.0), DVec3::ZERO).unwrap();
        assert!(Volume::new(geometry, vec![0.0; 7]).is_err());
    }
}
