//! Validation of vertex-to-tetrahedron attachments.
//!
//! A render vertex finds its live barycentric entry through two indirections:
//! its `shard_id` selects an offset from the shard offset table, and the offset
//! is added to its `bary_base_id`. Fracture rewrites both tables at runtime, so
//! every update is checked here before it reaches the GPU.

use std::fmt;

use super::attachment::BarycentricPos;
use super::vertex::RenderVertex;

/// Reasons a set of attachment tables is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A vertex references a shard past the end of the offset table.
    ShardOutOfRange {
        vertex: usize,
        shard_id: u32,
        shard_count: usize,
    },
    /// A vertex resolves to a barycentric entry outside the table.
    BarycentricOutOfRange {
        vertex: usize,
        index: i64,
        bary_count: usize,
    },
    /// A barycentric entry references an unknown tetrahedron.
    TetOutOfRange {
        bary_index: usize,
        tet_id: u32,
        tet_count: usize,
    },
    /// A tetrahedron references a node without a transform.
    NodeOutOfRange {
        tet_id: u32,
        node: u32,
        node_count: usize,
    },
    /// A triangle index references a vertex that does not exist.
    IndexOutOfRange {
        position: usize,
        index: u32,
        vertex_count: usize,
    },
    /// The index count is not a multiple of three.
    IncompleteTriangle { index_count: usize },
    /// A per-vertex array does not match the vertex count.
    VertexCountMismatch { expected: usize, actual: usize },
    /// An attachment id is too large to survive the float vertex attribute.
    IdNotRepresentable { vertex: usize, id: u32 },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShardOutOfRange {
                vertex,
                shard_id,
                shard_count,
            } => write!(
                f,
                "vertex {vertex} references shard {shard_id} but only {shard_count} shard offsets exist"
            ),
            Self::BarycentricOutOfRange {
                vertex,
                index,
                bary_count,
            } => write!(
                f,
                "vertex {vertex} resolves to barycentric entry {index} outside table of {bary_count}"
            ),
            Self::TetOutOfRange {
                bary_index,
                tet_id,
                tet_count,
            } => write!(
                f,
                "barycentric entry {bary_index} references tet {tet_id} but only {tet_count} tets exist"
            ),
            Self::NodeOutOfRange {
                tet_id,
                node,
                node_count,
            } => write!(
                f,
                "tet {tet_id} references node {node} but only {node_count} node transforms exist"
            ),
            Self::IndexOutOfRange {
                position,
                index,
                vertex_count,
            } => write!(
                f,
                "index {index} at position {position} exceeds vertex count {vertex_count}"
            ),
            Self::IncompleteTriangle { index_count } => {
                write!(f, "index count {index_count} is not a multiple of 3")
            }
            Self::VertexCountMismatch { expected, actual } => {
                write!(f, "expected {expected} per-vertex entries, got {actual}")
            }
            Self::IdNotRepresentable { vertex, id } => write!(
                f,
                "vertex {vertex} has attachment id {id} above the float-exact limit {}",
                RenderVertex::MAX_ATTACHMENT_ID
            ),
        }
    }
}

impl std::error::Error for TopologyError {}

/// Per-vertex attachment ids written into the vertex buffer on fracture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexAttachmentIds {
    pub shard_id: u32,
    pub bary_base_id: u32,
}

impl VertexAttachmentIds {
    pub fn new(shard_id: u32, bary_base_id: u32) -> Self {
        Self {
            shard_id,
            bary_base_id,
        }
    }

    /// Ids currently stored in a vertex.
    pub fn of(vertex: &RenderVertex) -> Self {
        Self::new(vertex.shard_index(), vertex.bary_base_index())
    }
}

/// Resolve the barycentric table index of one vertex.
///
/// Returns `None` when the shard id is outside `offsets`. The returned index
/// is signed because offsets may be negative; range checking against the
/// barycentric table is left to the caller.
pub fn resolve_bary_index(shard_id: u32, bary_base_id: u32, offsets: &[i32]) -> Option<i64> {
    offsets
        .get(shard_id as usize)
        .map(|offset| bary_base_id as i64 + *offset as i64)
}

/// Check the attachment invariant for every vertex.
///
/// `ids` overrides the ids stored in `vertices` when present (a pending
/// fracture patch); it must then have one entry per vertex. `tet_count`
/// enables the tetrahedron range check when the tet table size is known.
pub fn validate_attachments(
    vertices: &[RenderVertex],
    ids: Option<&[VertexAttachmentIds]>,
    offsets: &[i32],
    bary: &[BarycentricPos],
    tet_count: Option<usize>,
) -> Result<(), TopologyError> {
    match ids {
        Some(ids) if ids.len() != vertices.len() => Err(TopologyError::VertexCountMismatch {
            expected: vertices.len(),
            actual: ids.len(),
        }),
        Some(ids) => validate_attachment_ids(ids, offsets, bary, tet_count),
        None => {
            let ids: Vec<VertexAttachmentIds> = vertices.iter().map(VertexAttachmentIds::of).collect();
            validate_attachment_ids(&ids, offsets, bary, tet_count)
        }
    }
}

/// Check the attachment invariant for a list of per-vertex ids.
///
/// Ids are stored as `f32` in the vertex buffer, so any id above
/// [`RenderVertex::MAX_ATTACHMENT_ID`] is rejected before range checks.
pub fn validate_attachment_ids(
    ids: &[VertexAttachmentIds],
    offsets: &[i32],
    bary: &[BarycentricPos],
    tet_count: Option<usize>,
) -> Result<(), TopologyError> {
    for (vertex_index, id) in ids.iter().enumerate() {
        if let Some(large) = [id.shard_id, id.bary_base_id]
            .into_iter()
            .find(|v| *v > RenderVertex::MAX_ATTACHMENT_ID)
        {
            return Err(TopologyError::IdNotRepresentable {
                vertex: vertex_index,
                id: large,
            });
        }

        let index = resolve_bary_index(id.shard_id, id.bary_base_id, offsets).ok_or(
            TopologyError::ShardOutOfRange {
                vertex: vertex_index,
                shard_id: id.shard_id,
                shard_count: offsets.len(),
            },
        )?;

        if index < 0 || index as usize >= bary.len() {
            return Err(TopologyError::BarycentricOutOfRange {
                vertex: vertex_index,
                index,
                bary_count: bary.len(),
            });
        }
    }

    if let Some(tet_count) = tet_count {
        validate_tet_ids(bary, tet_count)?;
    }

    Ok(())
}

/// Check that every barycentric entry references an existing tetrahedron.
pub fn validate_tet_ids(bary: &[BarycentricPos], tet_count: usize) -> Result<(), TopologyError> {
    match bary
        .iter()
        .enumerate()
        .find(|(_, b)| b.tet_id as usize >= tet_count)
    {
        Some((bary_index, b)) => Err(TopologyError::TetOutOfRange {
            bary_index,
            tet_id: b.tet_id,
            tet_count,
        }),
        None => Ok(()),
    }
}

/// Check a triangle list against a vertex count.
pub fn validate_indices(indices: &[u32], vertex_count: usize) -> Result<(), TopologyError> {
    if indices.len() % 3 != 0 {
        return Err(TopologyError::IncompleteTriangle {
            index_count: indices.len(),
        });
    }
    match indices
        .iter()
        .enumerate()
        .find(|(_, i)| **i as usize >= vertex_count)
    {
        Some((position, index)) => Err(TopologyError::IndexOutOfRange {
            position,
            index: *index,
            vertex_count,
        }),
        None => Ok(()),
    }
}
