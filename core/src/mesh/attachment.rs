//! Simulation-side records that link render vertices to tetrahedra.

use bytemuck::{Pod, Zeroable};

use crate::math::QUAT_IDENTITY;

/// Barycentric attachment of a render vertex to one tetrahedron.
///
/// A vertex may own several entries over its lifetime (before and after
/// fracture). The live one is selected by `bary_base_id + offsets[shard_id]`.
///
/// Padded to 32 bytes so the layout matches a WGSL storage struct
/// `{ weights: vec4<f32>, tet_id: u32 }`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct BarycentricPos {
    /// Weight of each tetrahedron corner.
    pub weights: [f32; 4],
    /// Index of the tetrahedron in the tet vertex id table.
    pub tet_id: u32,
    pub _padding: [u32; 3],
}

impl BarycentricPos {
    pub fn new(tet_id: u32, weights: [f32; 4]) -> Self {
        Self {
            weights,
            tet_id,
            _padding: [0; 3],
        }
    }

    /// Attachment pinned to a single corner of a tetrahedron.
    pub fn at_corner(tet_id: u32, corner: usize) -> Self {
        let mut weights = [0.0; 4];
        weights[corner.min(3)] = 1.0;
        Self::new(tet_id, weights)
    }

    /// Sum of the four weights; `1.0` for a point inside or on the tetrahedron.
    pub fn weight_sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

/// Rigid transform of one tet mesh node as produced by the solver.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TetVertexTransform {
    /// Position in `xyz`, `w` unused.
    pub position: [f32; 4],
    /// Rotation quaternion as `[x, y, z, w]`.
    pub rotation: [f32; 4],
}

impl TetVertexTransform {
    pub fn new(position: [f32; 3], rotation: [f32; 4]) -> Self {
        Self {
            position: [position[0], position[1], position[2], 1.0],
            rotation,
        }
    }

    /// Transform at `position` with no rotation.
    pub fn at(position: [f32; 3]) -> Self {
        Self::new(position, QUAT_IDENTITY)
    }
}

/// Node ids of the four corners of a tetrahedron.
pub type TetIndices = [u32; 4];

/// Per-tetrahedron deformation value passed through to shading.
pub type TetDeformation = [f32; 4];

/// Split solver transforms into the position and rotation arrays the GPU reads.
pub fn split_transforms(transforms: &[TetVertexTransform]) -> (Vec<[f32; 4]>, Vec<[f32; 4]>) {
    transforms
        .iter()
        .map(|t| (t.position, t.rotation))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barycentric_layout() {
        assert_eq!(std::mem::size_of::<BarycentricPos>(), 32);
        let b = BarycentricPos::at_corner(7, 2);
        assert_eq!(b.tet_id, 7);
        assert_eq!(b.weights, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(b.weight_sum(), 1.0);
    }

    #[test]
    fn test_split_transforms() {
        let transforms = [
            TetVertexTransform::at([1.0, 2.0, 3.0]),
            TetVertexTransform::new([4.0, 5.0, 6.0], [0.0, 1.0, 0.0, 0.0]),
        ];
        let (positions, rotations) = split_transforms(&transforms);
        assert_eq!(positions[1], [4.0, 5.0, 6.0, 1.0]);
        assert_eq!(rotations[0], QUAT_IDENTITY);
        assert_eq!(rotations[1], [0.0, 1.0, 0.0, 0.0]);
    }
}
