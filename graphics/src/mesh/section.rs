//! One drawable chunk of a simulated mesh.
//!
//! A [`MeshProxySection`] owns the vertex and index buffers of one material
//! bucket, the vertex binding drawn with them, and the two tables that link
//! each vertex to the tet mesh: shard offsets and barycentric positions.
//!
//! Topology updates (fracture) are validated on the calling thread against
//! the section's logical state, then applied in a single render command so a
//! draw never sees new ids with an old table or the other way round.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use femfx_core::mesh::{
    BarycentricPos, IndexFormat, SectionData, TopologyError, VertexAttachmentIds,
    validate_attachment_ids, validate_indices,
};
use femfx_core::profile_scope;
use parking_lot::Mutex;

use crate::binding::BatchElementParams;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::render_thread::RenderThreadHandle;
use crate::structured_buffer::StructuredBuffer;

use super::proxy::TetMeshBuffers;
use super::vertex_binding::DeformationVertexBinding;
use super::vertex_buffer::{FemIndexBuffer, FemVertexBuffer};

/// New attachment tables for a section, typically after a fracture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionTopology {
    pub shard_offsets: Vec<i32>,
    pub barycentric_positions: Vec<BarycentricPos>,
    /// New per-vertex ids. `None` keeps the current ids.
    pub vertex_ids: Option<Vec<VertexAttachmentIds>>,
    /// Number of tetrahedra, enabling the tet id range check.
    pub tet_count: Option<usize>,
}

impl SectionTopology {
    pub fn new(shard_offsets: Vec<i32>, barycentric_positions: Vec<BarycentricPos>) -> Self {
        Self {
            shard_offsets,
            barycentric_positions,
            vertex_ids: None,
            tet_count: None,
        }
    }

    pub fn with_vertex_ids(mut self, ids: Vec<VertexAttachmentIds>) -> Self {
        self.vertex_ids = Some(ids);
        self
    }

    pub fn with_tet_count(mut self, tet_count: usize) -> Self {
        self.tet_count = Some(tet_count);
        self
    }
}

/// Buffers and simulation linkage of one material bucket.
pub struct MeshProxySection {
    label: String,
    material_index: u32,
    render_thread: RenderThreadHandle,
    vertex_buffer: Arc<FemVertexBuffer>,
    index_buffer: FemIndexBuffer,
    vertex_binding: DeformationVertexBinding,
    shard_offsets: StructuredBuffer<i32>,
    barycentric_positions: StructuredBuffer<BarycentricPos>,
    visible: AtomicBool,
    /// Ids as of the last accepted update, ahead of the render thread.
    attachment_ids: Mutex<Vec<VertexAttachmentIds>>,
}

impl MeshProxySection {
    /// Create the GPU side of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidTopology`] if the indices or attachment
    /// ids are out of range, or a resource error if a buffer cannot be created.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        render_thread: RenderThreadHandle,
        data: &SectionData,
        label: impl Into<String>,
    ) -> Result<Self, GraphicsError> {
        profile_scope!("section_create");
        let label = label.into();

        validate_indices(&data.indices, data.vertex_count())?;
        let attachment_ids: Vec<VertexAttachmentIds> =
            data.vertices.iter().map(VertexAttachmentIds::of).collect();
        validate_attachment_ids(
            &attachment_ids,
            &data.shard_offsets,
            &data.barycentric_positions,
            None,
        )?;

        let vertex_buffer = Arc::new(FemVertexBuffer::new(device, &data.vertices, &label)?);
        let index_buffer = FemIndexBuffer::new(device, &data.indices, data.vertex_count(), &label)?;

        let vertex_binding =
            DeformationVertexBinding::new(device, render_thread.clone(), label.clone());
        vertex_binding.set_layout(vertex_buffer.streams())?;

        let shard_offsets =
            StructuredBuffer::new(device, render_thread.clone(), format!("{label}.shard_offsets"));
        shard_offsets.upload(&data.shard_offsets);
        let barycentric_positions = StructuredBuffer::new(
            device,
            render_thread.clone(),
            format!("{label}.barycentric_positions"),
        );
        barycentric_positions.upload(&data.barycentric_positions);

        log::debug!(
            "'{}': section created, material {}, {} vertices, {} indices",
            label,
            data.material_index,
            data.vertex_count(),
            data.index_count()
        );

        Ok(Self {
            label,
            material_index: data.material_index,
            render_thread,
            vertex_buffer,
            index_buffer,
            vertex_binding,
            shard_offsets,
            barycentric_positions,
            visible: AtomicBool::new(true),
            attachment_ids: Mutex::new(attachment_ids),
        })
    }

    /// Replace the attachment tables and optionally the per-vertex ids.
    ///
    /// Tables are updated in place while they fit and reallocated when they
    /// grow.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidTopology`] if the update would leave a
    /// vertex pointing outside the tables; nothing is queued in that case.
    pub fn apply_topology(&self, topology: SectionTopology) -> Result<(), GraphicsError> {
        profile_scope!("section_apply_topology");

        let mut current = self.attachment_ids.lock();
        if let Some(ids) = &topology.vertex_ids
            && ids.len() != current.len()
        {
            return Err(TopologyError::VertexCountMismatch {
                expected: current.len(),
                actual: ids.len(),
            }
            .into());
        }
        validate_attachment_ids(
            topology.vertex_ids.as_deref().unwrap_or(current.as_slice()),
            &topology.shard_offsets,
            &topology.barycentric_positions,
            topology.tet_count,
        )?;

        let vertex_buffer = Arc::clone(&self.vertex_buffer);
        let shard_offsets = self.shard_offsets.clone();
        let barycentric_positions = self.barycentric_positions.clone();
        let label = self.label.clone();
        let new_ids = topology.vertex_ids.clone();

        self.render_thread.submit(move || {
            if let Some(ids) = &topology.vertex_ids
                && let Err(e) = vertex_buffer.write_attachment_ids(ids)
            {
                log::error!("'{label}': failed to write attachment ids: {e}");
            }
            if let Err(e) = shard_offsets.publish_immediate(&topology.shard_offsets) {
                log::error!("'{label}': failed to publish shard offsets: {e}");
            }
            if let Err(e) = barycentric_positions.publish_immediate(&topology.barycentric_positions)
            {
                log::error!("'{label}': failed to publish barycentric positions: {e}");
            }
            log::trace!(
                "'{label}': topology applied, {} shards, {} barycentric entries",
                topology.shard_offsets.len(),
                topology.barycentric_positions.len()
            );
        })?;

        if let Some(ids) = new_ids {
            *current = ids;
        }
        Ok(())
    }

    /// Views a draw of this section binds.
    pub fn batch_params(&self, tet_mesh: &TetMeshBuffers) -> BatchElementParams {
        BatchElementParams {
            tet_mesh_vertex_pos: tet_mesh.positions_view(),
            tet_mesh_vertex_rot: tet_mesh.rotations_view(),
            tet_mesh_deformation: tet_mesh.deformation_view(),
            tet_vertex_ids: tet_mesh.tet_vertex_ids_view(),
            barycentric_pos_ids: self.shard_offsets.view(),
            barycentric_pos: self.barycentric_positions.view(),
        }
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub fn material_index(&self) -> u32 {
        self.material_index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_buffer.vertex_count()
    }

    pub fn index_count(&self) -> usize {
        self.index_buffer.index_count()
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index_buffer.format()
    }

    pub fn vertex_buffer(&self) -> &Arc<FemVertexBuffer> {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &FemIndexBuffer {
        &self.index_buffer
    }

    pub fn vertex_binding(&self) -> &DeformationVertexBinding {
        &self.vertex_binding
    }

    pub fn shard_offsets(&self) -> &StructuredBuffer<i32> {
        &self.shard_offsets
    }

    pub fn barycentric_positions(&self) -> &StructuredBuffer<BarycentricPos> {
        &self.barycentric_positions
    }

    /// Ids as of the last accepted topology update.
    pub fn attachment_ids(&self) -> Vec<VertexAttachmentIds> {
        self.attachment_ids.lock().clone()
    }

    /// Release the binding and both tables. Idempotent.
    pub fn release(&self) {
        self.vertex_binding.release();
        self.shard_offsets.release();
        self.barycentric_positions.release();
    }
}

impl std::fmt::Debug for MeshProxySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshProxySection")
            .field("label", &self.label)
            .field("material_index", &self.material_index)
            .field("vertex_count", &self.vertex_count())
            .field("index_count", &self.index_count())
            .field("visible", &self.is_visible())
            .finish()
    }
}

static_assertions::assert_impl_all!(MeshProxySection: Send, Sync);
