//! Math type aliases and helpers for tet skinning.
//!
//! Quaternions travel through GPU buffers as `[x, y, z, w]` arrays; these
//! helpers convert between that layout and nalgebra types.

pub use nalgebra;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// Quaternion (f32). Stored as `[x, y, z, w]` in memory.
pub type Quat = nalgebra::Quaternion<f32>;

/// Create a quaternion from a `[x, y, z, w]` array.
pub fn quat_from_array(a: [f32; 4]) -> Quat {
    nalgebra::Quaternion::new(a[3], a[0], a[1], a[2])
}

/// Convert a quaternion to a `[x, y, z, w]` array.
pub fn quat_to_array(q: Quat) -> [f32; 4] {
    [q.coords.x, q.coords.y, q.coords.z, q.coords.w]
}

/// Identity rotation as a `[x, y, z, w]` array.
pub const QUAT_IDENTITY: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Rotate a vector by a (unit) quaternion.
pub fn quat_rotate_vec3(q: Quat, v: Vec3) -> Vec3 {
    nalgebra::UnitQuaternion::new_unchecked(q) * v
}

/// Create a quaternion from an axis and an angle in radians.
pub fn quat_from_axis_angle(axis: Vec3, angle: f32) -> Quat {
    nalgebra::UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(axis), angle)
        .into_inner()
}

/// Weighted blend of quaternions.
///
/// Each input is flipped into the hemisphere of the running sum before it is
/// accumulated, then the sum is normalized. Returns identity if the weights
/// cancel out, as the vertex shader's `normalize_or_identity` does.
pub fn blend_quaternions(weights: [f32; 4], rotations: [Quat; 4]) -> Quat {
    let mut sum = Vec4::zeros();
    for (weight, rotation) in weights.iter().zip(rotations.iter()) {
        let mut coords = rotation.coords;
        if coords.dot(&sum) < 0.0 {
            coords = -coords;
        }
        sum += coords * *weight;
    }

    let norm = sum.norm();
    if norm <= f32::EPSILON {
        return quat_from_array(QUAT_IDENTITY);
    }
    Quat::from_vector(sum / norm)
}

/// Weighted sum of four points.
pub fn blend_points(weights: [f32; 4], points: [Vec3; 4]) -> Vec3 {
    points
        .iter()
        .zip(weights.iter())
        .fold(Vec3::zeros(), |acc, (p, w)| acc + p * *w)
}
