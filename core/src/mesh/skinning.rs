//! CPU reference of the barycentric tet skinning done in the vertex shader.
//!
//! The deformed position is the weighted sum of the four tet node positions.
//! The tangent frame is rotated by the normalized, sign-aligned weighted sum of
//! the four node rotations. Debug tools and tests use this to check what the
//! GPU path should produce for a vertex.

use crate::math::{self, Quat, Vec3};

use super::attachment::{BarycentricPos, TetIndices};
use super::topology::{self, TopologyError};
use super::vertex::{PackedNormal, RenderVertex};

/// Skinned vertex output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeformedVertex {
    pub position: Vec3,
    pub tangent_x: Vec3,
    pub tangent_z: Vec3,
    /// Handedness carried over from the rest tangent Z.
    pub handedness: f32,
    /// Tetrahedron the vertex was skinned to.
    pub tet_id: u32,
}

/// Inputs shared by every vertex of a mesh.
#[derive(Debug, Clone, Copy)]
pub struct SkinningTables<'a> {
    pub shard_offsets: &'a [i32],
    pub barycentric_positions: &'a [BarycentricPos],
    pub tet_vertex_ids: &'a [TetIndices],
    /// Node positions, `xyz` used.
    pub node_positions: &'a [[f32; 4]],
    /// Node rotations as `[x, y, z, w]`.
    pub node_rotations: &'a [[f32; 4]],
}

/// Skin one vertex against the current tet mesh state.
pub fn deform_vertex(
    vertex: &RenderVertex,
    tables: &SkinningTables<'_>,
) -> Result<DeformedVertex, TopologyError> {
    let shard_id = vertex.shard_index();
    let index = topology::resolve_bary_index(shard_id, vertex.bary_base_index(), tables.shard_offsets)
        .ok_or(TopologyError::ShardOutOfRange {
            vertex: 0,
            shard_id,
            shard_count: tables.shard_offsets.len(),
        })?;

    let bary = usize::try_from(index)
        .ok()
        .and_then(|i| tables.barycentric_positions.get(i))
        .ok_or(TopologyError::BarycentricOutOfRange {
            vertex: 0,
            index,
            bary_count: tables.barycentric_positions.len(),
        })?;

    let tet = tables
        .tet_vertex_ids
        .get(bary.tet_id as usize)
        .ok_or(TopologyError::TetOutOfRange {
            bary_index: index as usize,
            tet_id: bary.tet_id,
            tet_count: tables.tet_vertex_ids.len(),
        })?;

    let node_count = tables.node_positions.len().min(tables.node_rotations.len());
    let mut points = [Vec3::zeros(); 4];
    let mut rotations = [math::quat_from_array(math::QUAT_IDENTITY); 4];
    for (corner, node) in tet.iter().enumerate() {
        let n = *node as usize;
        if n >= node_count {
            return Err(TopologyError::NodeOutOfRange {
                tet_id: bary.tet_id,
                node: *node,
                node_count,
            });
        }
        let p = tables.node_positions[n];
        points[corner] = Vec3::new(p[0], p[1], p[2]);
        rotations[corner] = math::quat_from_array(tables.node_rotations[n]);
    }

    let position = math::blend_points(bary.weights, points);
    let rotation: Quat = math::blend_quaternions(bary.weights, rotations);

    Ok(DeformedVertex {
        position,
        tangent_x: math::quat_rotate_vec3(rotation, vertex.tangent_x.unpack()),
        tangent_z: math::quat_rotate_vec3(rotation, vertex.tangent_z.unpack()),
        handedness: vertex.tangent_z.sign(),
        tet_id: bary.tet_id,
    })
}

/// Skin every vertex of a mesh, stopping at the first invalid attachment.
pub fn deform_vertices(
    vertices: &[RenderVertex],
    tables: &SkinningTables<'_>,
) -> Result<Vec<DeformedVertex>, TopologyError> {
    vertices
        .iter()
        .enumerate()
        .map(|(i, v)| {
            deform_vertex(v, tables).map_err(|err| match err {
                TopologyError::ShardOutOfRange {
                    shard_id,
                    shard_count,
                    ..
                } => TopologyError::ShardOutOfRange {
                    vertex: i,
                    shard_id,
                    shard_count,
                },
                TopologyError::BarycentricOutOfRange {
                    index, bary_count, ..
                } => TopologyError::BarycentricOutOfRange {
                    vertex: i,
                    index,
                    bary_count,
                },
                other => other,
            })
        })
        .collect()
}

/// Repack a deformed tangent frame into vertex-format normals.
pub fn pack_tangents(deformed: &DeformedVertex) -> (PackedNormal, PackedNormal) {
    (
        PackedNormal::pack(deformed.tangent_x, 1.0),
        PackedNormal::pack(deformed.tangent_z, deformed.handedness),
    )
}
