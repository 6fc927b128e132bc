//! CPU-side render mesh of a simulated object.
//!
//! This module provides:
//! - [`IndexFormat`] - Index data format (u16 or u32)
//! - [`FemRenderMesh`] - Vertices, triangles with material ids, and the
//!   attachment tables that bind the mesh to the tet mesh
//! - [`SectionData`] - One material bucket, ready to become a GPU section

use std::collections::BTreeMap;

use super::attachment::BarycentricPos;
use super::topology::{self, TopologyError};
use super::vertex::RenderVertex;

/// Index format for indexed drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit unsigned integers (max 65535 vertices).
    Uint16,
    /// 32-bit unsigned integers.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Get the size in bytes of each index.
    pub fn size(&self) -> usize {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }

    /// Smallest format able to address `vertex_count` vertices.
    pub fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count <= u16::MAX as usize {
            Self::Uint16
        } else {
            Self::Uint32
        }
    }
}

/// A render mesh driven by a tet mesh.
///
/// Triangles reference vertices of the whole mesh and each carries a material
/// id. The shard offset and barycentric tables are shared by all sections of
/// the mesh, since `bary_base_id` is a mesh-wide index.
///
/// # Example
///
/// ```ignore
/// let mesh = FemRenderMesh::new(vertices)
///     .with_triangle([0, 1, 2], 0)
///     .with_triangle([2, 1, 3], 1)
///     .with_attachments(vec![0], barycentric)
///     .with_label("crate");
/// let sections = mesh.split_by_material()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct FemRenderMesh {
    vertices: Vec<RenderVertex>,
    triangles: Vec<[u32; 3]>,
    materials: Vec<u32>,
    shard_offsets: Vec<i32>,
    barycentric_positions: Vec<BarycentricPos>,
    label: Option<String>,
}

impl FemRenderMesh {
    pub fn new(vertices: Vec<RenderVertex>) -> Self {
        Self {
            vertices,
            ..Default::default()
        }
    }

    /// Add one triangle with its material id.
    pub fn with_triangle(mut self, triangle: [u32; 3], material: u32) -> Self {
        self.push_triangle(triangle, material);
        self
    }

    /// Add a triangle list where every triangle uses `material`.
    pub fn with_triangles(mut self, indices: &[u32], material: u32) -> Self {
        for tri in indices.chunks_exact(3) {
            self.push_triangle([tri[0], tri[1], tri[2]], material);
        }
        self
    }

    /// Set the shard offset and barycentric tables.
    pub fn with_attachments(
        mut self,
        shard_offsets: Vec<i32>,
        barycentric_positions: Vec<BarycentricPos>,
    ) -> Self {
        self.shard_offsets = shard_offsets;
        self.barycentric_positions = barycentric_positions;
        self
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn push_triangle(&mut self, triangle: [u32; 3], material: u32) {
        self.triangles.push(triangle);
        self.materials.push(material);
    }

    pub fn vertices(&self) -> &[RenderVertex] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn shard_offsets(&self) -> &[i32] {
        &self.shard_offsets
    }

    pub fn barycentric_positions(&self) -> &[BarycentricPos] {
        &self.barycentric_positions
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Distinct material ids in ascending order.
    pub fn material_ids(&self) -> Vec<u32> {
        let mut ids = self.materials.clone();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Check triangles and attachments against the vertex array.
    pub fn validate(&self, tet_count: Option<usize>) -> Result<(), TopologyError> {
        let flat: &[u32] = self.triangles.as_flattened();
        topology::validate_indices(flat, self.vertices.len())?;
        topology::validate_attachments(
            &self.vertices,
            None,
            &self.shard_offsets,
            &self.barycentric_positions,
            tet_count,
        )
    }

    /// Split the mesh into one section per material id.
    ///
    /// Sections come out in ascending material order. Each section holds only
    /// the vertices its triangles use, re-indexed in first-use order, plus a
    /// copy of the mesh-wide attachment tables.
    pub fn split_by_material(&self) -> Result<Vec<SectionData>, TopologyError> {
        self.validate(None)?;

        let mut buckets: BTreeMap<u32, Vec<[u32; 3]>> = BTreeMap::new();
        for (triangle, material) in self.triangles.iter().zip(self.materials.iter()) {
            buckets.entry(*material).or_default().push(*triangle);
        }

        let sections = buckets
            .into_iter()
            .map(|(material_index, triangles)| {
                let mut remap: Vec<Option<u32>> = vec![None; self.vertices.len()];
                let mut vertices = Vec::new();
                let mut indices = Vec::with_capacity(triangles.len() * 3);

                for index in triangles.iter().flatten() {
                    let slot = &mut remap[*index as usize];
                    let local = match slot {
                        Some(local) => *local,
                        None => {
                            let local = vertices.len() as u32;
                            vertices.push(self.vertices[*index as usize]);
                            *slot = Some(local);
                            local
                        }
                    };
                    indices.push(local);
                }

                log::trace!(
                    "Split material {} of {:?}: {} vertices, {} indices",
                    material_index,
                    self.label,
                    vertices.len(),
                    indices.len()
                );

                SectionData {
                    material_index,
                    vertices,
                    indices,
                    shard_offsets: self.shard_offsets.clone(),
                    barycentric_positions: self.barycentric_positions.clone(),
                }
            })
            .collect();

        Ok(sections)
    }
}

/// Vertices, indices and attachment tables of one material bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionData {
    pub material_index: u32,
    pub vertices: Vec<RenderVertex>,
    pub indices: Vec<u32>,
    pub shard_offsets: Vec<i32>,
    pub barycentric_positions: Vec<BarycentricPos>,
}

impl SectionData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Index format the GPU index buffer should use.
    pub fn index_format(&self) -> IndexFormat {
        IndexFormat::for_vertex_count(self.vertices.len())
    }
}
