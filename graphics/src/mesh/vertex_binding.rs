//! Vertex input binding of a deformable mesh section.
//!
//! A [`DeformationVertexBinding`] takes a [`DeformationStreams`] layout and
//! builds the vertex declarations the deformation shader is drawn with. The
//! shard id and barycentric base id of each vertex are streamed as two extra
//! float attributes; everything the shader fetches manually is exposed as
//! buffer views.
//!
//! Layouts are validated on the calling thread. Accepted layouts are stored
//! and turned into declarations on the render thread.
//!
//! # Attribute locations
//!
//! | Location | Attribute                                   |
//! |----------|---------------------------------------------|
//! | 0        | position                                    |
//! | 1, 2     | tangent X, tangent Z                        |
//! | 3        | color (shared null color when absent)       |
//! | 4..8     | texture coordinates                         |
//! | 8        | light-map coordinate                        |
//! | 9        | shard id                                    |
//! | 10       | barycentric base id                         |

use std::sync::Arc;

use parking_lot::Mutex;

use crate::binding::{self, VertexFactoryUniforms};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::render_thread::RenderThreadHandle;
use crate::resources::{BufferView, NullColorBuffer};

use super::layout::{
    InputStreamType, VertexAttributeFormat, VertexDeclaration, VertexInputStream,
    VertexStreamComponent,
};
use super::vertex_buffer::ColorVertexBuffer;

/// Number of texture coordinate attributes a declaration always carries.
pub const MAX_TEXCOORD_STREAMS: usize = 4;

pub const ATTRIBUTE_POSITION: u32 = 0;
pub const ATTRIBUTE_TANGENT_X: u32 = 1;
pub const ATTRIBUTE_TANGENT_Z: u32 = 2;
pub const ATTRIBUTE_COLOR: u32 = 3;
pub const ATTRIBUTE_TEX_COORD: u32 = 4;
pub const ATTRIBUTE_LIGHT_MAP: u32 = 8;
pub const ATTRIBUTE_SHARD_ID: u32 = 9;
pub const ATTRIBUTE_BARY_BASE_ID: u32 = 10;

/// Where each attribute of a section lives.
#[derive(Debug, Clone, Default)]
pub struct DeformationStreams {
    pub position: Option<VertexStreamComponent>,
    /// Tangent X and tangent Z (normal). The binormal is derived in the shader.
    pub tangent_basis: [Option<VertexStreamComponent>; 2],
    pub tex_coords: Vec<VertexStreamComponent>,
    pub light_map_coordinate: Option<VertexStreamComponent>,
    pub color: Option<VertexStreamComponent>,
    pub shard_id: Option<VertexStreamComponent>,
    pub bary_base_id: Option<VertexStreamComponent>,

    pub positions_view: Option<Arc<BufferView>>,
    pub tangents_view: Option<Arc<BufferView>>,
    pub tex_coords_view: Option<Arc<BufferView>>,
    pub color_components_view: Option<Arc<BufferView>>,

    pub num_tex_coords: u32,
    pub light_map_coordinate_index: u32,
    /// `!0` when colors are indexed per vertex, `0` when one color is shared.
    pub color_index_mask: u32,
}

impl DeformationStreams {
    /// Check the layout before it is accepted.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if self.position.is_none() {
            return Err(GraphicsError::MissingPositionStream);
        }
        if let Some(color) = &self.color
            && color.format != VertexAttributeFormat::Unorm8x4
        {
            return Err(GraphicsError::InvalidVertexLayout(format!(
                "color stream must be Unorm8x4, got {:?}",
                color.format
            )));
        }
        if self.tex_coords.len() > MAX_TEXCOORD_STREAMS {
            return Err(GraphicsError::InvalidVertexLayout(format!(
                "{} texture coordinate streams, at most {} supported",
                self.tex_coords.len(),
                MAX_TEXCOORD_STREAMS
            )));
        }
        Ok(())
    }
}

/// Lifecycle of a vertex binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingState {
    /// No layout accepted yet.
    Unconstructed,
    /// Layout stored, declarations not built.
    Declared,
    /// Declarations and uniforms built; drawable.
    ResourceLive,
    /// Resources dropped.
    Released,
}

struct BindingResources {
    default: VertexDeclaration,
    position_only: VertexDeclaration,
    position_and_normal: VertexDeclaration,
    color_stream_index: usize,
    null_color: Arc<NullColorBuffer>,
    uniforms: VertexFactoryUniforms,
}

struct BindingInner {
    state: BindingState,
    streams: Option<DeformationStreams>,
    resources: Option<BindingResources>,
}

struct BindingShared {
    device: Arc<GraphicsDevice>,
    label: String,
    inner: Mutex<BindingInner>,
}

/// Vertex declarations and fetch views of one mesh section.
///
/// # Example
///
/// ```ignore
/// let binding = DeformationVertexBinding::new(&device, render_thread.handle(), "section0");
/// binding.set_layout(vertex_buffer.streams())?;
/// render_thread.handle().flush()?;
/// assert_eq!(binding.state(), BindingState::ResourceLive);
/// ```
#[derive(Clone)]
pub struct DeformationVertexBinding {
    shared: Arc<BindingShared>,
    render_thread: RenderThreadHandle,
}

impl DeformationVertexBinding {
    pub fn new(
        device: &Arc<GraphicsDevice>,
        render_thread: RenderThreadHandle,
        label: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(BindingShared {
                device: Arc::clone(device),
                label: label.into(),
                inner: Mutex::new(BindingInner {
                    state: BindingState::Unconstructed,
                    streams: None,
                    resources: None,
                }),
            }),
            render_thread,
        }
    }

    /// Accept a new layout and rebuild the declarations on the render thread.
    ///
    /// # Errors
    ///
    /// [`GraphicsError::MissingPositionStream`] or
    /// [`GraphicsError::InvalidVertexLayout`] if the layout is rejected; the
    /// binding is left untouched in that case.
    pub fn set_layout(&self, streams: DeformationStreams) -> Result<(), GraphicsError> {
        streams.validate()?;
        let shared = Arc::clone(&self.shared);
        self.render_thread
            .submit(move || shared.apply_layout(streams))
    }

    /// Take over the layout of `other` and rebuild.
    ///
    /// The layout is read when the command runs, after every command already
    /// queued for `other`.
    pub fn copy_from(&self, other: &DeformationVertexBinding) -> Result<(), GraphicsError> {
        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(&other.shared);
        self.render_thread.submit(move || {
            let streams = source.inner.lock().streams.clone();
            match streams {
                Some(streams) => shared.apply_layout(streams),
                None => log::warn!(
                    "'{}': copy from '{}' which has no layout",
                    shared.label,
                    source.label
                ),
            }
        })
    }

    /// Drop declarations and uniforms. Idempotent.
    pub fn release(&self) {
        let shared = Arc::clone(&self.shared);
        self.render_thread.run_or_enqueue(move || {
            let mut inner = shared.inner.lock();
            if inner.state != BindingState::Released {
                log::debug!("'{}': vertex binding released", shared.label);
            }
            inner.resources = None;
            inner.state = BindingState::Released;
        });
    }

    pub fn state(&self) -> BindingState {
        self.shared.inner.lock().state
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.shared.device
    }

    /// Whether the device lets the shader fetch attributes from views.
    pub fn supports_manual_vertex_fetch(&self) -> bool {
        self.shared.device.capabilities().manual_vertex_fetch
    }

    /// The accepted layout, once stored.
    pub fn streams(&self) -> Option<DeformationStreams> {
        self.shared.inner.lock().streams.clone()
    }

    fn stream_field<R>(&self, f: impl FnOnce(&DeformationStreams) -> R) -> Option<R> {
        self.shared.inner.lock().streams.as_ref().map(f)
    }

    pub fn positions_view(&self) -> Option<Arc<BufferView>> {
        self.stream_field(|s| s.positions_view.clone()).flatten()
    }

    pub fn tangents_view(&self) -> Option<Arc<BufferView>> {
        self.stream_field(|s| s.tangents_view.clone()).flatten()
    }

    pub fn tex_coords_view(&self) -> Option<Arc<BufferView>> {
        self.stream_field(|s| s.tex_coords_view.clone()).flatten()
    }

    pub fn color_components_view(&self) -> Option<Arc<BufferView>> {
        self.stream_field(|s| s.color_components_view.clone()).flatten()
    }

    pub fn num_tex_coords(&self) -> u32 {
        self.stream_field(|s| s.num_tex_coords).unwrap_or(0)
    }

    pub fn light_map_coordinate_index(&self) -> u32 {
        self.stream_field(|s| s.light_map_coordinate_index).unwrap_or(0)
    }

    pub fn color_index_mask(&self) -> u32 {
        self.stream_field(|s| s.color_index_mask).unwrap_or(0)
    }

    /// Stream slot of the color attribute in the default declaration.
    pub fn color_stream_index(&self) -> Option<usize> {
        self.shared
            .inner
            .lock()
            .resources
            .as_ref()
            .map(|r| r.color_stream_index)
    }

    /// Declaration for `stream_type`, once resources are live.
    pub fn declaration(&self, stream_type: InputStreamType) -> Option<VertexDeclaration> {
        let inner = self.shared.inner.lock();
        let resources = inner.resources.as_ref()?;
        Some(match stream_type {
            InputStreamType::Default => resources.default.clone(),
            InputStreamType::PositionOnly => resources.position_only.clone(),
            InputStreamType::PositionAndNormalOnly => resources.position_and_normal.clone(),
        })
    }

    /// Uniforms used when a draw brings no override.
    pub fn default_uniforms(&self) -> Option<VertexFactoryUniforms> {
        self.shared
            .inner
            .lock()
            .resources
            .as_ref()
            .map(|r| r.uniforms.clone())
    }

    /// Zero-stride white color view the binding falls back to.
    pub fn null_color_view(&self) -> Option<Arc<BufferView>> {
        self.shared
            .inner
            .lock()
            .resources
            .as_ref()
            .map(|r| Arc::clone(r.null_color.view()))
    }

    /// Stream replacement that feeds `colors` through the color slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding's resources are not live.
    pub fn color_override_stream(
        &self,
        colors: &ColorVertexBuffer,
    ) -> Result<VertexInputStream, GraphicsError> {
        let stream_index = self.color_stream_index().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "'{}': color override on a binding without live resources",
                self.shared.label
            ))
        })?;
        Ok(VertexInputStream {
            stream_index,
            buffer: Arc::clone(colors.buffer()),
            offset: 0,
        })
    }
}

impl BindingShared {
    fn apply_layout(&self, streams: DeformationStreams) {
        {
            let mut inner = self.inner.lock();
            inner.streams = Some(streams);
            inner.resources = None;
            inner.state = BindingState::Declared;
        }
        self.rebuild();
    }

    fn rebuild(&self) {
        let mut inner = self.inner.lock();
        let Some(streams) = inner.streams.as_ref() else {
            return;
        };
        match self.build_resources(streams) {
            Ok(resources) => {
                log::debug!(
                    "'{}': vertex binding live, {} streams",
                    self.label,
                    resources.default.streams().len()
                );
                inner.resources = Some(resources);
                inner.state = BindingState::ResourceLive;
            }
            Err(e) => log::error!("'{}': failed to build vertex binding: {e}", self.label),
        }
    }

    fn build_resources(&self, streams: &DeformationStreams) -> Result<BindingResources, GraphicsError> {
        let position = streams
            .position
            .as_ref()
            .ok_or(GraphicsError::MissingPositionStream)?;
        let null_color = self.device.null_color_buffer()?;

        let position_only = position_declaration(position, streams, false);
        let position_and_normal = position_declaration(position, streams, true);

        let mut default = VertexDeclaration::new();
        default.add(position, ATTRIBUTE_POSITION);

        let tangent_locations = [ATTRIBUTE_TANGENT_X, ATTRIBUTE_TANGENT_Z];
        for (component, location) in streams.tangent_basis.iter().zip(tangent_locations) {
            if let Some(component) = component {
                default.add(component, location);
            }
        }

        let color_element = match &streams.color {
            Some(color) => default.add(color, ATTRIBUTE_COLOR),
            None => {
                // Zero stride: every vertex reads the same white texel.
                let fallback = VertexStreamComponent::new(
                    null_color.buffer(),
                    0,
                    0,
                    VertexAttributeFormat::Unorm8x4,
                );
                default.add(&fallback, ATTRIBUTE_COLOR)
            }
        };

        if let Some(last) = streams.tex_coords.last() {
            for slot in 0..MAX_TEXCOORD_STREAMS {
                let component = streams.tex_coords.get(slot).unwrap_or(last);
                default.add(component, ATTRIBUTE_TEX_COORD + slot as u32);
            }
        }

        if let Some(light_map) = &streams.light_map_coordinate {
            default.add(light_map, ATTRIBUTE_LIGHT_MAP);
        } else if let Some(first) = streams.tex_coords.first() {
            default.add(first, ATTRIBUTE_LIGHT_MAP);
        }

        if let Some(shard_id) = &streams.shard_id {
            default.add(shard_id, ATTRIBUTE_SHARD_ID);
        }
        if let Some(bary_base_id) = &streams.bary_base_id {
            default.add(bary_base_id, ATTRIBUTE_BARY_BASE_ID);
        }

        let uniforms = binding::build_uniforms(
            streams,
            null_color.view(),
            self.device.capabilities(),
            0,
            None,
            0,
        );

        Ok(BindingResources {
            default,
            position_only,
            position_and_normal,
            color_stream_index: color_element.stream_index,
            null_color,
            uniforms,
        })
    }
}

fn position_declaration(
    position: &VertexStreamComponent,
    streams: &DeformationStreams,
    with_normal: bool,
) -> VertexDeclaration {
    let mut declaration = VertexDeclaration::new();
    declaration.add(position, ATTRIBUTE_POSITION);
    if let Some(shard_id) = &streams.shard_id {
        declaration.add(shard_id, ATTRIBUTE_SHARD_ID);
    }
    if let Some(bary_base_id) = &streams.bary_base_id {
        declaration.add(bary_base_id, ATTRIBUTE_BARY_BASE_ID);
    }
    if with_normal && let Some(normal) = &streams.tangent_basis[1] {
        declaration.add(normal, ATTRIBUTE_TANGENT_Z);
    }
    declaration
}

impl std::fmt::Debug for DeformationVertexBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeformationVertexBinding")
            .field("label", &self.shared.label)
            .field("state", &self.state())
            .finish()
    }
}

static_assertions::assert_impl_all!(DeformationVertexBinding: Send, Sync);
