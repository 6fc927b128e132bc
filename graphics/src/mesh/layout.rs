//! Vertex stream components and vertex declarations.
//!
//! A [`VertexStreamComponent`] says where one attribute lives: a buffer, a
//! byte offset, a stride and a format. A [`VertexDeclaration`] is built from
//! components by assigning each one a shader attribute location and a stream
//! slot. Components that share a buffer, stride and step mode share a stream,
//! so an interleaved vertex buffer binds once no matter how many attributes
//! it carries.
//!
//! # Example
//!
//! ```ignore
//! let mut declaration = VertexDeclaration::new();
//! declaration.add(&position, 0);
//! declaration.add(&tex_coord, 4); // same buffer and stride: same stream
//! assert_eq!(declaration.streams().len(), 1);
//! ```

use std::sync::Arc;

use crate::resources::{Buffer, BufferId};

/// Format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Single 32-bit unsigned integer.
    Uint,
    /// Four 8-bit unsigned integers (normalized to 0.0-1.0).
    Unorm8x4,
    /// Four 8-bit signed integers (normalized to -1.0-1.0).
    Snorm8x4,
}

impl VertexAttributeFormat {
    /// Get the size in bytes of this format.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float | Self::Uint => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Unorm8x4 | Self::Snorm8x4 => 4,
        }
    }
}

/// How the vertex buffer advances: per-vertex or per-instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Buffer advances once per vertex (default).
    #[default]
    Vertex,
    /// Buffer advances once per instance.
    Instance,
}

/// Location of one vertex attribute inside a buffer.
#[derive(Debug, Clone)]
pub struct VertexStreamComponent {
    pub buffer: Arc<Buffer>,
    /// Byte offset of the attribute within one vertex.
    pub offset: u32,
    /// Distance in bytes between vertices. Zero repeats the first value.
    pub stride: u32,
    pub format: VertexAttributeFormat,
    pub step_mode: VertexStepMode,
}

impl VertexStreamComponent {
    pub fn new(
        buffer: &Arc<Buffer>,
        offset: u32,
        stride: u32,
        format: VertexAttributeFormat,
    ) -> Self {
        Self {
            buffer: Arc::clone(buffer),
            offset,
            stride,
            format,
            step_mode: VertexStepMode::Vertex,
        }
    }

    /// Set the step mode to per-instance.
    pub fn with_instance_step(mut self) -> Self {
        self.step_mode = VertexStepMode::Instance;
        self
    }

    fn stream_key(&self) -> (BufferId, u32, VertexStepMode) {
        (self.buffer.id(), self.stride, self.step_mode)
    }
}

/// One bound vertex buffer slot of a declaration.
#[derive(Debug, Clone)]
pub struct VertexStream {
    pub buffer: Arc<Buffer>,
    pub stride: u32,
    pub step_mode: VertexStepMode,
}

/// One attribute of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Index into [`VertexDeclaration::streams`].
    pub stream_index: usize,
    pub offset: u32,
    pub format: VertexAttributeFormat,
    /// Shader attribute location.
    pub attribute_index: u32,
}

/// Replacement of one declared stream at draw time.
#[derive(Debug, Clone)]
pub struct VertexInputStream {
    pub stream_index: usize,
    pub buffer: Arc<Buffer>,
    pub offset: u32,
}

/// Which attribute subset a declaration feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputStreamType {
    /// Every attribute, for material passes.
    Default,
    /// Position and simulation ids, for depth-only passes.
    PositionOnly,
    /// Position, simulation ids and normal, for passes that need the normal.
    PositionAndNormalOnly,
}

/// Streams and elements of one vertex input layout.
#[derive(Debug, Clone, Default)]
pub struct VertexDeclaration {
    streams: Vec<VertexStream>,
    elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component at `attribute_index`, reusing an existing stream with
    /// the same buffer, stride and step mode. Returns the element added.
    pub fn add(&mut self, component: &VertexStreamComponent, attribute_index: u32) -> VertexElement {
        let key = component.stream_key();
        let stream_index = match self.streams.iter().position(|s| {
            (s.buffer.id(), s.stride, s.step_mode) == key
        }) {
            Some(index) => index,
            None => {
                self.streams.push(VertexStream {
                    buffer: Arc::clone(&component.buffer),
                    stride: component.stride,
                    step_mode: component.step_mode,
                });
                self.streams.len() - 1
            }
        };

        let element = VertexElement {
            stream_index,
            offset: component.offset,
            format: component.format,
            attribute_index,
        };
        self.elements.push(element);
        element
    }

    pub fn streams(&self) -> &[VertexStream] {
        &self.streams
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Find the element bound to a shader attribute location.
    pub fn element_at(&self, attribute_index: u32) -> Option<&VertexElement> {
        self.elements
            .iter()
            .find(|e| e.attribute_index == attribute_index)
    }

    /// Convert into owned wgpu vertex buffer layouts, one per stream.
    #[cfg(feature = "wgpu-backend")]
    pub fn to_wgpu(&self) -> WgpuVertexLayouts {
        let layouts = self
            .streams
            .iter()
            .enumerate()
            .map(|(stream_index, stream)| {
                let attributes = self
                    .elements
                    .iter()
                    .filter(|e| e.stream_index == stream_index)
                    .map(|e| wgpu::VertexAttribute {
                        format: convert_vertex_format(e.format),
                        offset: e.offset as u64,
                        shader_location: e.attribute_index,
                    })
                    .collect();
                OwnedVertexBufferLayout {
                    array_stride: stream.stride as u64,
                    step_mode: match stream.step_mode {
                        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
                        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
                    },
                    attributes,
                }
            })
            .collect();
        WgpuVertexLayouts { layouts }
    }
}

/// Owned form of [`wgpu::VertexBufferLayout`].
#[cfg(feature = "wgpu-backend")]
#[derive(Debug, Clone)]
pub struct OwnedVertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Vertex buffer layouts of a declaration, ready for pipeline creation.
#[cfg(feature = "wgpu-backend")]
#[derive(Debug, Clone)]
pub struct WgpuVertexLayouts {
    pub layouts: Vec<OwnedVertexBufferLayout>,
}

#[cfg(feature = "wgpu-backend")]
impl WgpuVertexLayouts {
    /// Borrow as the layouts a `wgpu::VertexState` takes.
    pub fn as_wgpu(&self) -> Vec<wgpu::VertexBufferLayout<'_>> {
        self.layouts
            .iter()
            .map(|l| wgpu::VertexBufferLayout {
                array_stride: l.array_stride,
                step_mode: l.step_mode,
                attributes: &l.attributes,
            })
            .collect()
    }
}

#[cfg(feature = "wgpu-backend")]
fn convert_vertex_format(format: VertexAttributeFormat) -> wgpu::VertexFormat {
    match format {
        VertexAttributeFormat::Float => wgpu::VertexFormat::Float32,
        VertexAttributeFormat::Float2 => wgpu::VertexFormat::Float32x2,
        VertexAttributeFormat::Float3 => wgpu::VertexFormat::Float32x3,
        VertexAttributeFormat::Float4 => wgpu::VertexFormat::Float32x4,
        VertexAttributeFormat::Uint => wgpu::VertexFormat::Uint32,
        VertexAttributeFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
        VertexAttributeFormat::Snorm8x4 => wgpu::VertexFormat::Snorm8x4,
    }
}
