//! GPU vertex, index and color override buffers of a mesh section.
//!
//! [`FemVertexBuffer`] stores [`RenderVertex`] records interleaved in one
//! buffer. Every attribute the vertex binding needs is described either as a
//! stream component (offset and stride into that buffer) or as a strided
//! view for shaders that fetch attributes themselves.

use std::sync::Arc;

use femfx_core::mesh::{IndexFormat, RenderVertex, VertexAttachmentIds};
use parking_lot::Mutex;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, BufferView};
use crate::types::{BufferDescriptor, BufferUsage, BufferViewDescriptor, ElementFormat};

use super::layout::{VertexAttributeFormat, VertexStreamComponent};
use super::vertex_binding::DeformationStreams;

/// Interleaved vertex buffer of one section.
///
/// A host copy of the vertices is kept so attachment ids can be patched and
/// re-uploaded in one write. Patching happens on the render thread.
pub struct FemVertexBuffer {
    device: Arc<GraphicsDevice>,
    buffer: Arc<Buffer>,
    vertices: Mutex<Vec<RenderVertex>>,
    positions_view: Arc<BufferView>,
    tangents_view: Arc<BufferView>,
    tex_coords_view: Arc<BufferView>,
    colors_view: Arc<BufferView>,
}

impl FemVertexBuffer {
    pub const USAGE: BufferUsage = BufferUsage::VERTEX
        .union(BufferUsage::STORAGE)
        .union(BufferUsage::COPY_DST)
        .union(BufferUsage::COPY_SRC);

    /// Upload `vertices` and create the fetch views.
    ///
    /// # Errors
    ///
    /// Returns an error if `vertices` is empty or buffer creation fails.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        vertices: &[RenderVertex],
        label: &str,
    ) -> Result<Self, GraphicsError> {
        if vertices.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "'{label}': vertex buffer needs at least one vertex"
            )));
        }

        let buffer = device.create_buffer_with_data(
            &BufferDescriptor::new(
                (vertices.len() * RenderVertex::STRIDE as usize) as u64,
                Self::USAGE,
            )
            .with_label(format!("{label}.vertices")),
            bytemuck::cast_slice(vertices),
        )?;

        let count = vertices.len() as u64;
        let strided = |format: ElementFormat, offset: u32, name: &str| {
            device.create_buffer_view(
                &buffer,
                BufferViewDescriptor::new(format, count)
                    .with_offset(offset as u64)
                    .with_stride(RenderVertex::STRIDE)
                    .with_label(format!("{label}.{name}")),
            )
        };

        let positions_view = strided(
            ElementFormat::Float32x3,
            RenderVertex::OFFSET_POSITION,
            "positions",
        )?;
        // Tangent X and tangent Z are adjacent: one 8-byte element per vertex.
        let tangents_view = strided(
            ElementFormat::Structured(8),
            RenderVertex::OFFSET_TANGENT_X,
            "tangents",
        )?;
        let tex_coords_view = strided(
            ElementFormat::Float32x2,
            RenderVertex::OFFSET_TEX_COORD,
            "tex_coords",
        )?;
        let colors_view = strided(
            ElementFormat::Unorm8x4,
            RenderVertex::OFFSET_COLOR,
            "colors",
        )?;

        Ok(Self {
            device: Arc::clone(device),
            buffer,
            vertices: Mutex::new(vertices.to_vec()),
            positions_view,
            tangents_view,
            tex_coords_view,
            colors_view,
        })
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.lock().len()
    }

    /// Host copy of the vertices as last written.
    pub fn vertices(&self) -> Vec<RenderVertex> {
        self.vertices.lock().clone()
    }

    /// Overwrite every vertex's shard id and barycentric base id.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if `ids` does not have one
    /// entry per vertex. Nothing is written in that case.
    pub fn write_attachment_ids(&self, ids: &[VertexAttachmentIds]) -> Result<(), GraphicsError> {
        let mut vertices = self.vertices.lock();
        if ids.len() != vertices.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} attachment ids for {} vertices",
                ids.len(),
                vertices.len()
            )));
        }
        for (vertex, id) in vertices.iter_mut().zip(ids) {
            vertex.set_attachment(id.shard_id, id.bary_base_id);
        }
        self.device
            .write_buffer(&self.buffer, 0, bytemuck::cast_slice(vertices.as_slice()))
    }

    fn component(&self, offset: u32, format: VertexAttributeFormat) -> VertexStreamComponent {
        VertexStreamComponent::new(&self.buffer, offset, RenderVertex::STRIDE, format)
    }

    /// Describe every attribute of this buffer for a vertex binding.
    pub fn streams(&self) -> DeformationStreams {
        DeformationStreams {
            position: Some(self.component(RenderVertex::OFFSET_POSITION, VertexAttributeFormat::Float3)),
            tangent_basis: [
                Some(self.component(RenderVertex::OFFSET_TANGENT_X, VertexAttributeFormat::Snorm8x4)),
                Some(self.component(RenderVertex::OFFSET_TANGENT_Z, VertexAttributeFormat::Snorm8x4)),
            ],
            tex_coords: vec![self.component(RenderVertex::OFFSET_TEX_COORD, VertexAttributeFormat::Float2)],
            light_map_coordinate: None,
            color: Some(self.component(RenderVertex::OFFSET_COLOR, VertexAttributeFormat::Unorm8x4)),
            shard_id: Some(self.component(RenderVertex::OFFSET_SHARD_ID, VertexAttributeFormat::Float)),
            bary_base_id: Some(
                self.component(RenderVertex::OFFSET_BARY_BASE_ID, VertexAttributeFormat::Float),
            ),
            positions_view: Some(Arc::clone(&self.positions_view)),
            tangents_view: Some(Arc::clone(&self.tangents_view)),
            tex_coords_view: Some(Arc::clone(&self.tex_coords_view)),
            color_components_view: Some(Arc::clone(&self.colors_view)),
            num_tex_coords: 1,
            light_map_coordinate_index: 0,
            color_index_mask: !0,
        }
    }
}

impl std::fmt::Debug for FemVertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FemVertexBuffer")
            .field("buffer", &self.buffer)
            .field("vertex_count", &self.vertex_count())
            .finish()
    }
}

/// Index buffer of one section, 16-bit when the vertex count allows it.
#[derive(Debug)]
pub struct FemIndexBuffer {
    buffer: Arc<Buffer>,
    format: IndexFormat,
    index_count: usize,
}

impl FemIndexBuffer {
    /// Upload `indices` for a section with `vertex_count` vertices.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        indices: &[u32],
        vertex_count: usize,
        label: &str,
    ) -> Result<Self, GraphicsError> {
        if indices.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "'{label}': index buffer needs at least one index"
            )));
        }

        let format = IndexFormat::for_vertex_count(vertex_count);
        let descriptor = BufferDescriptor::new(
            (indices.len() * format.size()) as u64,
            BufferUsage::INDEX | BufferUsage::COPY_DST,
        )
        .with_label(format!("{label}.indices"));

        let buffer = match format {
            IndexFormat::Uint16 => {
                let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
                device.create_buffer_with_data(&descriptor, bytemuck::cast_slice(&narrow))?
            }
            IndexFormat::Uint32 => {
                device.create_buffer_with_data(&descriptor, bytemuck::cast_slice(indices))?
            }
        };

        Ok(Self {
            buffer,
            format,
            index_count: indices.len(),
        })
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }
}

/// Per-instance vertex colors that replace a section's own colors.
#[derive(Debug)]
pub struct ColorVertexBuffer {
    buffer: Arc<Buffer>,
    view: Arc<BufferView>,
    vertex_count: usize,
}

impl ColorVertexBuffer {
    /// Upload one RGBA8 color per vertex.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        colors: &[[u8; 4]],
        label: &str,
    ) -> Result<Self, GraphicsError> {
        if colors.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "'{label}': color override needs at least one color"
            )));
        }

        let buffer = device.create_buffer_with_data(
            &BufferDescriptor::new(
                (colors.len() * 4) as u64,
                BufferUsage::VERTEX | BufferUsage::STORAGE | BufferUsage::COPY_DST,
            )
            .with_label(label),
            bytemuck::cast_slice(colors),
        )?;
        let view = device.create_buffer_view(
            &buffer,
            BufferViewDescriptor::new(ElementFormat::Unorm8x4, colors.len() as u64)
                .with_label(label),
        )?;

        Ok(Self {
            buffer,
            view,
            vertex_count: colors.len(),
        })
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn view(&self) -> &Arc<BufferView> {
        &self.view
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }
}
