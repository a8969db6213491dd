use glam::{DMat3, DMat4, DVec3, DVec4};

/// Rotation matrix for Euler angles applied in Z·X·Y order.
///
/// This is the composition used by the external optimizer's rigid (Euler)
/// transform, so artifacts and the in-process fit agree on conventions.
pub fn euler_zxy(rx: f64, ry: f64, rz: f64) -> DMat3 {
    DMat3::from_rotation_z(rz) * DMat3::from_rotation_x(rx) * DMat3::from_rotation_y(ry)
}

/// Assemble a 4×4 homogeneous matrix from a 3×3 linear part and a translation.
pub fn mat4_from_linear_translation(linear: DMat3, translation: DVec3) -> DMat4 {
    DMat4::from_cols(
        DVec4::new(linear.x_axis.x, linear.x_axis.y, linear.x_axis.z, 0.0),
        DVec4::new(linear.y_axis.x, linear.y_axis.y, linear.y_axis.z, 0.0),
        DVec4::new(linear.z_axis.x, linear.z_axis.y, linear.z_axis.z, 0.0),
        DVec4::new(translation.x, translation.y, translation.z, 1.0),
    )
}

/// Rigid mapping `x' = R (x - c) + c + t` collapsed into a single matrix.
pub fn rigid_about_center(rotation: DMat3, translation: DVec3, center: DVec3) -> DMat4 {
    let t = translation + center - rotation * center;
    mat4_from_linear_translation(rotation, t)
}

/// Largest absolute elementwise difference between two matrices.
pub fn mat4_max_abs_diff(a: &DMat4, b: &DMat4) -> f64 {
    let mut max = 0.0f64;
    for c in 0..4 {
        let d = a.col(c) - b.col(c);
        max = max.max(d.x.abs()).max(d.y.abs()).max(d.z.abs()).max(d.w.abs());
    }
    max
}
