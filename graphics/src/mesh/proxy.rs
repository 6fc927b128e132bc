//! Render-side proxy of a simulated mesh and the tet mesh state it follows.
//!
//! [`TetMeshBuffers`] holds what the solver produces every frame: node
//! positions and rotations, per-tet deformation values and the tet node ids.
//! [`FemMeshProxy`] holds one [`MeshProxySection`] per material bucket and
//! emits one [`MeshBatch`] per visible section each frame.
//!
//! # Example
//!
//! ```ignore
//! let tet_mesh = TetMeshBuffers::new(&device, render_thread.handle(), "body");
//! tet_mesh.set_tets(&tets);
//!
//! let proxy = FemMeshProxy::new(&device, render_thread.handle(), &render_mesh)?;
//! loop {
//!     tet_mesh.update_transforms(&solver.transforms());
//!     for batch in proxy.collect_batches(&tet_mesh) {
//!         // record the draw
//!     }
//!     render_thread.handle().flush()?;
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use femfx_core::mesh::{
    FemRenderMesh, IndexFormat, TetDeformation, TetIndices, TetVertexTransform, split_transforms,
};
use femfx_core::profile_scope;
use parking_lot::Mutex;

use crate::binding::{BatchUserData, MeshBatchElement, create_vertex_factory_uniforms};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::render_thread::RenderThreadHandle;
use crate::resources::{Buffer, BufferView};
use crate::structured_buffer::StructuredBuffer;

use super::layout::InputStreamType;
use super::section::{MeshProxySection, SectionTopology};
use super::vertex_binding::DeformationVertexBinding;
use super::vertex_buffer::ColorVertexBuffer;

/// GPU copy of the tet mesh state.
#[derive(Debug)]
pub struct TetMeshBuffers {
    positions: StructuredBuffer<[f32; 4]>,
    rotations: StructuredBuffer<[f32; 4]>,
    deformation: StructuredBuffer<TetDeformation>,
    tet_vertex_ids: StructuredBuffer<TetIndices>,
    tet_count: AtomicUsize,
}

impl TetMeshBuffers {
    pub fn new(
        device: &Arc<GraphicsDevice>,
        render_thread: RenderThreadHandle,
        label: &str,
    ) -> Self {
        Self {
            positions: StructuredBuffer::new(
                device,
                render_thread.clone(),
                format!("{label}.tet_vertex_positions"),
            ),
            rotations: StructuredBuffer::new(
                device,
                render_thread.clone(),
                format!("{label}.tet_vertex_rotations"),
            ),
            deformation: StructuredBuffer::new(
                device,
                render_thread.clone(),
                format!("{label}.tet_deformation"),
            ),
            tet_vertex_ids: StructuredBuffer::new(
                device,
                render_thread,
                format!("{label}.tet_vertex_ids"),
            ),
            tet_count: AtomicUsize::new(0),
        }
    }

    /// Publish this frame's node transforms.
    pub fn update_transforms(&self, transforms: &[TetVertexTransform]) {
        profile_scope!("tet_update_transforms");
        let (positions, rotations) = split_transforms(transforms);
        self.positions.publish(&positions);
        self.rotations.publish(&rotations);
    }

    /// Publish the tetrahedra as four node ids each.
    pub fn set_tets(&self, tets: &[TetIndices]) {
        self.tet_count.store(tets.len(), Ordering::Release);
        self.tet_vertex_ids.publish(tets);
    }

    /// Publish per-tet deformation values.
    pub fn set_deformation(&self, deformation: &[TetDeformation]) {
        self.deformation.publish(deformation);
    }

    /// Number of tetrahedra as of the last [`set_tets`](Self::set_tets).
    pub fn tet_count(&self) -> usize {
        self.tet_count.load(Ordering::Acquire)
    }

    pub fn positions(&self) -> &StructuredBuffer<[f32; 4]> {
        &self.positions
    }

    pub fn rotations(&self) -> &StructuredBuffer<[f32; 4]> {
        &self.rotations
    }

    pub fn deformation(&self) -> &StructuredBuffer<TetDeformation> {
        &self.deformation
    }

    pub fn tet_vertex_ids(&self) -> &StructuredBuffer<TetIndices> {
        &self.tet_vertex_ids
    }

    pub fn positions_view(&self) -> Option<Arc<BufferView>> {
        self.positions.view()
    }

    pub fn rotations_view(&self) -> Option<Arc<BufferView>> {
        self.rotations.view()
    }

    pub fn deformation_view(&self) -> Option<Arc<BufferView>> {
        self.deformation.view()
    }

    pub fn tet_vertex_ids_view(&self) -> Option<Arc<BufferView>> {
        self.tet_vertex_ids.view()
    }

    pub fn release(&self) {
        self.positions.release();
        self.rotations.release();
        self.deformation.release();
        self.tet_vertex_ids.release();
        self.tet_count.store(0, Ordering::Release);
    }
}

/// Everything needed to record one draw of a section.
#[derive(Debug, Clone)]
pub struct MeshBatch {
    pub section_index: usize,
    pub material_index: u32,
    pub vertex_binding: DeformationVertexBinding,
    pub index_buffer: Arc<Buffer>,
    pub index_format: IndexFormat,
    pub element: MeshBatchElement,
}

/// Render-side state of one simulated mesh.
#[derive(Debug)]
pub struct FemMeshProxy {
    label: String,
    sections: Vec<MeshProxySection>,
    color_override: Mutex<Option<Arc<ColorVertexBuffer>>>,
}

impl FemMeshProxy {
    /// Split `mesh` by material and create one section per bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh topology is invalid or a section's buffers
    /// cannot be created.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        render_thread: RenderThreadHandle,
        mesh: &FemRenderMesh,
    ) -> Result<Self, GraphicsError> {
        profile_scope!("mesh_proxy_create");
        let label = mesh.label().unwrap_or("fem_mesh").to_string();

        let sections = mesh
            .split_by_material()?
            .iter()
            .enumerate()
            .map(|(i, data)| {
                MeshProxySection::new(device, render_thread.clone(), data, format!("{label}.section{i}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::info!("'{}': mesh proxy created with {} sections", label, sections.len());

        Ok(Self {
            label,
            sections,
            color_override: Mutex::new(None),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sections(&self) -> &[MeshProxySection] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&MeshProxySection> {
        self.sections.get(index)
    }

    /// Apply a fracture to one section.
    ///
    /// # Errors
    ///
    /// Returns an error if `section` does not exist or the topology is invalid.
    pub fn apply_fracture(&self, section: usize, topology: SectionTopology) -> Result<(), GraphicsError> {
        let target = self.sections.get(section).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "'{}': no section {} (have {})",
                self.label,
                section,
                self.sections.len()
            ))
        })?;
        target.apply_topology(topology)
    }

    /// Use per-instance colors instead of the sections' own, or stop doing so.
    pub fn set_color_override(&self, colors: Option<Arc<ColorVertexBuffer>>) {
        *self.color_override.lock() = colors;
    }

    pub fn color_override(&self) -> Option<Arc<ColorVertexBuffer>> {
        self.color_override.lock().clone()
    }

    /// One batch per visible section with live resources.
    pub fn collect_batches(&self, tet_mesh: &TetMeshBuffers) -> Vec<MeshBatch> {
        profile_scope!("mesh_proxy_collect_batches");
        let color_override = self.color_override();

        self.sections
            .iter()
            .enumerate()
            .filter(|(_, section)| section.is_visible())
            .filter_map(|(section_index, section)| {
                let binding = section.vertex_binding();
                if binding.declaration(InputStreamType::Default).is_none() {
                    log::trace!("'{}': skipping section without live resources", section.label());
                    return None;
                }

                let mut element = match &color_override {
                    Some(colors) => MeshBatchElement::new(BatchUserData::ColorOverride(Arc::clone(colors))),
                    None => MeshBatchElement::new(BatchUserData::Deformation(section.batch_params(tet_mesh))),
                };
                element.num_primitives = (section.index_count() / 3) as u32;
                element.max_vertex_index = section.vertex_count().saturating_sub(1) as u32;

                if let Some(colors) = &color_override
                    && binding.supports_manual_vertex_fetch()
                {
                    match create_vertex_factory_uniforms(binding, 0, Some(colors.as_ref()), 0) {
                        Ok(uniforms) => element.uniforms_override = Some(uniforms),
                        Err(e) => log::warn!("'{}': color override uniforms: {e}", section.label()),
                    }
                }

                Some(MeshBatch {
                    section_index,
                    material_index: section.material_index(),
                    vertex_binding: binding.clone(),
                    index_buffer: Arc::clone(section.index_buffer().buffer()),
                    index_format: section.index_format(),
                    element,
                })
            })
            .collect()
    }

    /// Release every section. Idempotent.
    pub fn release(&self) {
        for section in &self.sections {
            section.release();
        }
    }
}

static_assertions::assert_impl_all!(FemMeshProxy: Send, Sync);
static_assertions::assert_impl_all!(TetMeshBuffers: Send, Sync);
