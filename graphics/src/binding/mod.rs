//! Per-draw shader binding of the deformation parameters.
//!
//! Each draw of a mesh section carries a [`MeshBatchElement`] whose
//! [`BatchUserData`] is either a set of tet mesh views
//! ([`BatchElementParams`]) or a per-instance color override. When a draw is
//! recorded, [`element_bindings`] turns it into [`ShaderBindings`] and
//! [`VertexInputStreams`] replacements.
//!
//! Six storage views feed the skinning:
//!
//! | Parameter                      | Contents                          |
//! |--------------------------------|-----------------------------------|
//! | `tet_mesh_vertex_pos_buffer`   | tet node positions                |
//! | `tet_mesh_vertex_rot_buffer`   | tet node rotations                |
//! | `tet_mesh_deformation_buffer`  | per-tet deformation values        |
//! | `tet_vertex_id_buffer`         | four node ids per tetrahedron     |
//! | `barycentric_pos_id_buffer`    | shard offsets                     |
//! | `barycentric_pos_buffer`       | barycentric positions             |
//!
//! A draw may provide only some of them; missing views are skipped one by one.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::mesh::{ColorVertexBuffer, DeformationStreams, DeformationVertexBinding, VertexInputStream};
use crate::resources::BufferView;
use crate::shader::{ResourceBinding, ShaderParameterMap, ShaderStage, VERTEX_FETCH_UNIFORMS};

/// Names of the six deformation parameters, in [`DeformationShaderParameters`] order.
pub const DEFORMATION_PARAMETER_NAMES: [&str; 6] = [
    "tet_mesh_vertex_pos_buffer",
    "tet_mesh_vertex_rot_buffer",
    "tet_mesh_deformation_buffer",
    "tet_vertex_id_buffer",
    "barycentric_pos_id_buffer",
    "barycentric_pos_buffer",
];

/// Tet mesh views of one draw. Built fresh every frame.
#[derive(Debug, Clone, Default)]
pub struct BatchElementParams {
    pub tet_mesh_vertex_pos: Option<Arc<BufferView>>,
    pub tet_mesh_vertex_rot: Option<Arc<BufferView>>,
    pub tet_mesh_deformation: Option<Arc<BufferView>>,
    pub tet_vertex_ids: Option<Arc<BufferView>>,
    pub barycentric_pos_ids: Option<Arc<BufferView>>,
    pub barycentric_pos: Option<Arc<BufferView>>,
}

impl BatchElementParams {
    /// Views in [`DEFORMATION_PARAMETER_NAMES`] order.
    pub fn views(&self) -> [Option<&Arc<BufferView>>; 6] {
        [
            self.tet_mesh_vertex_pos.as_ref(),
            self.tet_mesh_vertex_rot.as_ref(),
            self.tet_mesh_deformation.as_ref(),
            self.tet_vertex_ids.as_ref(),
            self.barycentric_pos_ids.as_ref(),
            self.barycentric_pos.as_ref(),
        ]
    }

    /// Number of views present.
    pub fn present_count(&self) -> usize {
        self.views().iter().filter(|v| v.is_some()).count()
    }
}

/// What a draw carries besides its index range.
#[derive(Debug, Clone)]
pub enum BatchUserData {
    /// Per-instance vertex colors replacing the section's own.
    ColorOverride(Arc<ColorVertexBuffer>),
    /// Tet mesh views for skinning.
    Deformation(BatchElementParams),
}

/// One draw of a section.
#[derive(Debug, Clone)]
pub struct MeshBatchElement {
    pub first_index: u32,
    pub num_primitives: u32,
    pub base_vertex_index: u32,
    pub min_vertex_index: u32,
    pub max_vertex_index: u32,
    pub user_data: BatchUserData,
    /// Replaces the binding's default uniforms for this draw.
    pub uniforms_override: Option<VertexFactoryUniforms>,
}

impl MeshBatchElement {
    pub fn new(user_data: BatchUserData) -> Self {
        Self {
            first_index: 0,
            num_primitives: 0,
            base_vertex_index: 0,
            min_vertex_index: 0,
            max_vertex_index: 0,
            user_data,
            uniforms_override: None,
        }
    }

    pub fn with_uniforms_override(mut self, uniforms: VertexFactoryUniforms) -> Self {
        self.uniforms_override = Some(uniforms);
        self
    }
}

/// Resources bound for one draw.
#[derive(Debug, Clone, Default)]
pub struct ShaderBindings {
    uniforms: Option<(Option<ResourceBinding>, VertexFactoryUniforms)>,
    views: Vec<(&'static str, ResourceBinding, Arc<BufferView>)>,
}

impl ShaderBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_uniforms(&mut self, slot: Option<ResourceBinding>, uniforms: VertexFactoryUniforms) {
        self.uniforms = Some((slot, uniforms));
    }

    pub fn add_view(&mut self, name: &'static str, slot: ResourceBinding, view: Arc<BufferView>) {
        self.views.push((name, slot, view));
    }

    pub fn uniforms(&self) -> Option<&VertexFactoryUniforms> {
        self.uniforms.as_ref().map(|(_, u)| u)
    }

    pub fn uniforms_slot(&self) -> Option<ResourceBinding> {
        self.uniforms.as_ref().and_then(|(slot, _)| *slot)
    }

    /// View bound to the parameter `name`, if any.
    pub fn view(&self, name: &str) -> Option<&Arc<BufferView>> {
        self.views
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, _, view)| view)
    }

    pub fn views(&self) -> impl Iterator<Item = (&'static str, ResourceBinding, &Arc<BufferView>)> {
        self.views.iter().map(|(n, slot, view)| (*n, *slot, view))
    }

    /// Number of views bound.
    pub fn view_count(&self) -> usize {
        self.views.len()
    }
}

/// Vertex stream replacements for one draw.
#[derive(Debug, Clone, Default)]
pub struct VertexInputStreams {
    streams: Vec<VertexInputStream>,
}

impl VertexInputStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stream: VertexInputStream) {
        self.streams.push(stream);
    }

    pub fn iter(&self) -> impl Iterator<Item = &VertexInputStream> {
        self.streams.iter()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// One named resource parameter and the slot a shader gave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderResourceParameter {
    name: &'static str,
    slot: Option<ResourceBinding>,
}

impl ShaderResourceParameter {
    fn new(name: &'static str) -> Self {
        Self { name, slot: None }
    }

    fn bind(&mut self, map: &ShaderParameterMap) {
        self.slot = map.find(self.name);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn slot(&self) -> Option<ResourceBinding> {
        self.slot
    }

    pub fn is_bound(&self) -> bool {
        self.slot.is_some()
    }
}

/// The deformation parameters of one shader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeformationShaderParameters {
    stage: ShaderStage,
    uniforms: ShaderResourceParameter,
    parameters: [ShaderResourceParameter; 6],
}

impl DeformationShaderParameters {
    /// Parameters for `stage`. Only vertex and compute shaders read the tet mesh.
    pub fn construct(stage: ShaderStage) -> Option<Self> {
        match stage {
            ShaderStage::Vertex | ShaderStage::Compute => Some(Self {
                stage,
                uniforms: ShaderResourceParameter::new(VERTEX_FETCH_UNIFORMS),
                parameters: DEFORMATION_PARAMETER_NAMES.map(ShaderResourceParameter::new),
            }),
            ShaderStage::Fragment => None,
        }
    }

    /// Resolve every parameter against a compiled shader's map.
    pub fn bind(&mut self, map: &ShaderParameterMap) {
        self.uniforms.bind(map);
        for parameter in &mut self.parameters {
            parameter.bind(map);
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn uniforms(&self) -> &ShaderResourceParameter {
        &self.uniforms
    }

    pub fn parameters(&self) -> &[ShaderResourceParameter; 6] {
        &self.parameters
    }

    /// Number of the six parameters the shader uses.
    pub fn bound_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.is_bound()).count()
    }
}

/// Fill `bindings` and `streams` for one draw of `binding`.
///
/// With manual vertex fetch the draw's uniform override, or else the
/// binding's default uniforms, is bound. A color override replaces the color
/// stream when manual fetch is unavailable and binds none of the tet mesh
/// views. Deformation views are bound one by one, each only when the shader
/// uses the parameter, the view is present and the stage is the vertex stage.
///
/// # Errors
///
/// Returns an error if a color override needs the stream replaced but the
/// binding's resources are not live.
pub fn element_bindings(
    parameters: &DeformationShaderParameters,
    binding: &DeformationVertexBinding,
    element: &MeshBatchElement,
    bindings: &mut ShaderBindings,
    streams: &mut VertexInputStreams,
) -> Result<(), GraphicsError> {
    let manual_fetch = binding.supports_manual_vertex_fetch();

    if manual_fetch {
        let uniforms = element
            .uniforms_override
            .clone()
            .or_else(|| binding.default_uniforms());
        match uniforms {
            Some(uniforms) => bindings.add_uniforms(parameters.uniforms.slot(), uniforms),
            None => log::warn!("'{}': no vertex factory uniforms to bind", binding.label()),
        }
    }

    match &element.user_data {
        BatchUserData::ColorOverride(colors) => {
            if !manual_fetch {
                streams.push(binding.color_override_stream(colors)?);
            }
        }
        BatchUserData::Deformation(params) => {
            if parameters.stage != ShaderStage::Vertex {
                return Ok(());
            }
            for (parameter, view) in parameters.parameters.iter().zip(params.views()) {
                if let (Some(slot), Some(view)) = (parameter.slot, view) {
                    bindings.add_view(parameter.name, slot, Arc::clone(view));
                }
            }
        }
    }

    Ok(())
}

/// Packed scalars of the `fem_vertex_fetch` uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct VertexFetchParameters {
    pub color_index_mask: u32,
    pub num_tex_coords: u32,
    pub light_map_coordinate_index: u32,
    pub effective_base_vertex_index: u32,
}

/// Per-draw uniform block of the deformation vertex factory.
#[derive(Debug, Clone)]
pub struct VertexFactoryUniforms {
    pub light_map_data_index: u32,
    pub parameters: VertexFetchParameters,
    pub positions: Option<Arc<BufferView>>,
    pub packed_tangents: Option<Arc<BufferView>>,
    pub tex_coords: Option<Arc<BufferView>>,
    pub color_components: Arc<BufferView>,
}

impl VertexFactoryUniforms {
    /// Bytes of the uniform block as the shader reads it.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.parameters)
    }
}

/// Build the uniform block for a draw of `binding`.
///
/// `override_color` replaces the section's colors; `base_vertex_index` is
/// folded into the fetch index when the device does not add it itself.
///
/// # Errors
///
/// Returns an error if the binding's resources are not live.
pub fn create_vertex_factory_uniforms(
    binding: &DeformationVertexBinding,
    light_map_data_index: u32,
    override_color: Option<&ColorVertexBuffer>,
    base_vertex_index: u32,
) -> Result<VertexFactoryUniforms, GraphicsError> {
    let not_live = || {
        GraphicsError::InvalidParameter(format!(
            "'{}': uniforms requested before resources are live",
            binding.label()
        ))
    };
    let streams = binding.streams().ok_or_else(not_live)?;
    let null_color = binding.null_color_view().ok_or_else(not_live)?;
    Ok(build_uniforms(
        &streams,
        &null_color,
        binding.device().capabilities(),
        light_map_data_index,
        override_color,
        base_vertex_index,
    ))
}

pub(crate) fn build_uniforms(
    streams: &DeformationStreams,
    null_color: &Arc<BufferView>,
    capabilities: &DeviceCapabilities,
    light_map_data_index: u32,
    override_color: Option<&ColorVertexBuffer>,
    base_vertex_index: u32,
) -> VertexFactoryUniforms {
    let mut color_index_mask = 0;
    let positions;
    let packed_tangents;
    let tex_coords;
    let mut color_components = None;

    if capabilities.manual_vertex_fetch {
        positions = streams.positions_view.clone();
        packed_tangents = streams.tangents_view.clone();
        tex_coords = streams.tex_coords_view.clone();
        match override_color {
            Some(colors) => {
                color_components = Some(Arc::clone(colors.view()));
                color_index_mask = if colors.vertex_count() > 1 { !0 } else { 0 };
            }
            None => {
                color_components = streams.color_components_view.clone();
                color_index_mask = streams.color_index_mask;
            }
        }
    } else {
        positions = None;
        packed_tangents = Some(Arc::clone(null_color));
        tex_coords = Some(Arc::clone(null_color));
    }

    let effective_base_vertex_index = if capabilities.absolute_vertex_id {
        0
    } else {
        base_vertex_index
    };

    VertexFactoryUniforms {
        light_map_data_index,
        parameters: VertexFetchParameters {
            color_index_mask,
            num_tex_coords: streams.num_tex_coords,
            light_map_coordinate_index: streams.light_map_coordinate_index,
            effective_base_vertex_index,
        },
        positions,
        packed_tangents,
        tex_coords,
        color_components: color_components.unwrap_or_else(|| Arc::clone(null_color)),
    }
}

#[cfg(test)]
mod tests {
    use femfx_core::mesh::RenderVertex;

    use super::*;
    use crate::device::GraphicsDevice;
    use crate::instance::{BackendType, GraphicsInstance, InstanceParameters};
    use crate::mesh::FemVertexBuffer;
    use crate::render_thread::{RenderThread, RenderThreadConfig};
    use crate::types::{BufferDescriptor, BufferUsage, BufferViewDescriptor, ElementFormat};

    struct Fixture {
        device: Arc<GraphicsDevice>,
        render_thread: RenderThread,
        binding: DeformationVertexBinding,
        _vertex_buffer: FemVertexBuffer,
    }

    fn fixture(capabilities: DeviceCapabilities) -> Fixture {
        let device = GraphicsInstance::with_parameters(
            InstanceParameters::default()
                .with_backend(BackendType::Dummy)
                .with_capabilities(capabilities),
        )
        .unwrap()
        .create_device()
        .unwrap();
        let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
        let vertices: Vec<_> = (0..3).map(|i| RenderVertex::new([i as f32, 0.0, 0.0])).collect();
        let vertex_buffer = FemVertexBuffer::new(&device, &vertices, "section").unwrap();
        let binding = DeformationVertexBinding::new(&device, render_thread.handle(), "section");
        binding.set_layout(vertex_buffer.streams()).unwrap();
        render_thread.handle().flush().unwrap();
        Fixture {
            device,
            render_thread,
            binding,
            _vertex_buffer: vertex_buffer,
        }
    }

    fn view(device: &Arc<GraphicsDevice>) -> Arc<BufferView> {
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();
        device
            .create_buffer_view(&buffer, BufferViewDescriptor::new(ElementFormat::Float32x4, 4))
            .unwrap()
    }

    fn full_map() -> ShaderParameterMap {
        DEFORMATION_PARAMETER_NAMES
            .iter()
            .enumerate()
            .fold(
                ShaderParameterMap::new().with_parameter(VERTEX_FETCH_UNIFORMS, 0, 0),
                |map, (i, name)| map.with_parameter(*name, 0, i as u32 + 1),
            )
    }

    #[test]
    fn test_construct_per_stage() {
        assert!(DeformationShaderParameters::construct(ShaderStage::Vertex).is_some());
        assert!(DeformationShaderParameters::construct(ShaderStage::Compute).is_some());
        assert!(DeformationShaderParameters::construct(ShaderStage::Fragment).is_none());
    }

    #[test]
    fn test_bind_resolves_names() {
        let mut parameters = DeformationShaderParameters::construct(ShaderStage::Vertex).unwrap();
        assert_eq!(parameters.bound_count(), 0);
        parameters.bind(&ShaderParameterMap::new().with_parameter("tet_vertex_id_buffer", 0, 4));
        assert_eq!(parameters.bound_count(), 1);
        assert_eq!(
            parameters.parameters()[3].slot(),
            Some(ResourceBinding { group: 0, binding: 4 })
        );
        assert!(!parameters.uniforms().is_bound());
    }

    #[test]
    fn test_deformation_binds_present_views() {
        let f = fixture(DeviceCapabilities::default());
        let mut parameters = DeformationShaderParameters::construct(ShaderStage::Vertex).unwrap();
        parameters.bind(&full_map());

        let params = BatchElementParams {
            tet_mesh_vertex_pos: Some(view(&f.device)),
            tet_vertex_ids: Some(view(&f.device)),
            barycentric_pos: Some(view(&f.device)),
            ..Default::default()
        };
        let element = MeshBatchElement::new(BatchUserData::Deformation(params));

        let mut bindings = ShaderBindings::new();
        let mut streams = VertexInputStreams::new();
        element_bindings(&parameters, &f.binding, &element, &mut bindings, &mut streams).unwrap();

        assert_eq!(bindings.view_count(), 3);
        assert!(bindings.view("tet_mesh_vertex_pos_buffer").is_some());
        assert!(bindings.view("tet_mesh_vertex_rot_buffer").is_none());
        assert!(bindings.uniforms().is_some());
        assert_eq!(
            bindings.uniforms_slot(),
            Some(ResourceBinding { group: 0, binding: 0 })
        );
        assert!(streams.is_empty());
    }

    #[test]
    fn test_compute_stage_binds_no_views() {
        let f = fixture(DeviceCapabilities::default());
        let mut parameters = DeformationShaderParameters::construct(ShaderStage::Compute).unwrap();
        parameters.bind(&full_map());

        let params = BatchElementParams {
            tet_mesh_vertex_pos: Some(view(&f.device)),
            ..Default::default()
        };
        let element = MeshBatchElement::new(BatchUserData::Deformation(params));
        let mut bindings = ShaderBindings::new();
        let mut streams = VertexInputStreams::new();
        element_bindings(&parameters, &f.binding, &element, &mut bindings, &mut streams).unwrap();
        assert_eq!(bindings.view_count(), 0);
    }

    #[test]
    fn test_color_override_without_manual_fetch() {
        let f = fixture(DeviceCapabilities::default().with_manual_vertex_fetch(false));
        let mut parameters = DeformationShaderParameters::construct(ShaderStage::Vertex).unwrap();
        parameters.bind(&full_map());

        let colors = Arc::new(ColorVertexBuffer::new(&f.device, &[[9; 4]; 3], "colors").unwrap());
        let element = MeshBatchElement::new(BatchUserData::ColorOverride(Arc::clone(&colors)));
        let mut bindings = ShaderBindings::new();
        let mut streams = VertexInputStreams::new();
        element_bindings(&parameters, &f.binding, &element, &mut bindings, &mut streams).unwrap();

        assert_eq!(bindings.view_count(), 0);
        assert!(bindings.uniforms().is_none());
        assert_eq!(streams.len(), 1);
        let stream = streams.iter().next().unwrap();
        assert_eq!(stream.buffer.id(), colors.buffer().id());
        assert_eq!(Some(stream.stream_index), f.binding.color_stream_index());
    }

    #[test]
    fn test_uniforms_with_manual_fetch() {
        let f = fixture(DeviceCapabilities::default().with_absolute_vertex_id(false));
        let uniforms = create_vertex_factory_uniforms(&f.binding, 2, None, 17).unwrap();
        assert_eq!(uniforms.light_map_data_index, 2);
        assert_eq!(uniforms.parameters.color_index_mask, !0);
        assert_eq!(uniforms.parameters.num_tex_coords, 1);
        assert_eq!(uniforms.parameters.effective_base_vertex_index, 17);
        assert!(uniforms.positions.is_some());
        assert_eq!(uniforms.color_components.format(), ElementFormat::Unorm8x4);
        assert_eq!(uniforms.as_bytes().len(), 16);

        let single = ColorVertexBuffer::new(&f.device, &[[1; 4]], "single").unwrap();
        let uniforms = create_vertex_factory_uniforms(&f.binding, 0, Some(&single), 0).unwrap();
        assert_eq!(uniforms.parameters.color_index_mask, 0);
        assert_eq!(uniforms.color_components.buffer().id(), single.buffer().id());
    }

    #[test]
    fn test_uniforms_without_manual_fetch() {
        let f = fixture(DeviceCapabilities::default().with_manual_vertex_fetch(false));
        let uniforms = create_vertex_factory_uniforms(&f.binding, 0, None, 5).unwrap();
        let null_color = f.binding.null_color_view().unwrap();

        assert!(uniforms.positions.is_none());
        assert!(uniforms.packed_tangents.unwrap().same_range(&null_color));
        assert!(uniforms.tex_coords.unwrap().same_range(&null_color));
        assert!(uniforms.color_components.same_range(&null_color));
        assert_eq!(uniforms.parameters.color_index_mask, 0);
        assert_eq!(uniforms.parameters.effective_base_vertex_index, 0);
    }

    #[test]
    fn test_uniforms_require_live_binding() {
        let f = fixture(DeviceCapabilities::default());
        let fresh = DeformationVertexBinding::new(&f.device, f.render_thread.handle(), "fresh");
        assert!(create_vertex_factory_uniforms(&fresh, 0, None, 0).is_err());
    }
}
