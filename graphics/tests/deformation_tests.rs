//! Integration tests for the deformation binding.
//!
//! These tests drive the public API the way a renderer would: tables are
//! published from the game thread, commands drain on the render thread at
//! `flush`, and draws are bound from the resulting state. Tests are
//! parameterized using `rstest` to run against every compiled-in backend.
//!
//! # Test Categories
//!
//! - **Structured Buffer Tests**: capacity, in-place updates, overflow, ordering
//! - **Vertex Binding Tests**: layout validation and declaration fallbacks
//! - **Shader Binding Tests**: per-draw binding of the reflected parameters
//! - **Proxy Tests**: the full create, fracture and draw flow

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{Backend, SINGLE_TET, TestContext, tet_surface_mesh, translated_nodes};
use femfx_graphics::binding::DEFORMATION_PARAMETER_NAMES;
use femfx_graphics::mesh::{
    ATTRIBUTE_COLOR, ATTRIBUTE_LIGHT_MAP, ATTRIBUTE_TEX_COORD, MAX_TEXCOORD_STREAMS,
};
use femfx_graphics::{
    BarycentricPos, BatchUserData, BindingState, ColorVertexBuffer, DEFORMATION_SHADER_SOURCE,
    DeformationShaderParameters, DeformationVertexBinding, DeviceCapabilities, FemMeshProxy,
    FemVertexBuffer, GraphicsError, InputStreamType, RenderVertex, SectionTopology,
    ShaderBindings, ShaderParameterMap, ShaderStage, StructuredBuffer, TetMeshBuffers,
    VertexAttachmentIds, VertexInputStreams, element_bindings,
};

// ============================================================================
// Structured Buffer Tests
// ============================================================================

/// Allocate 100, update 50, then try to update 150.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_allocate_update_overflow(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let table = StructuredBuffer::<i32>::new(&ctx.device, ctx.handle(), "offsets");

    table.allocate(100);
    let first: Vec<i32> = (1..=50).collect();
    table.update(&first);
    ctx.flush();

    assert_eq!(table.capacity(), 100);
    let contents = table.read_back().unwrap();
    assert_eq!(&contents[..50], first.as_slice());
    assert!(contents[50..].iter().all(|v| *v == 0));

    table.update(&vec![-1; 150]);
    ctx.flush();

    assert_eq!(table.capacity(), 100);
    assert_eq!(table.rejected_update_count(), 1);
    assert_eq!(table.read_back().unwrap()[..50], first[..]);
}

/// Upload sizes the storage to the data exactly.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_upload_round_trip(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let table = StructuredBuffer::<BarycentricPos>::new(&ctx.device, ctx.handle(), "bary");
    let data: Vec<_> = (0..7)
        .map(|i| BarycentricPos::new(i, [0.25, 0.25, 0.25, 0.25]))
        .collect();

    table.upload(&data);
    ctx.flush();

    assert_eq!(table.capacity(), 7);
    assert_eq!(table.read_back().unwrap(), data);
    assert_eq!(table.view().unwrap().element_count(), 7);

    table.upload(&[]);
    ctx.flush();
    assert!(!table.is_allocated());
    assert!(table.read_back().unwrap().is_empty());
}

#[test]
fn test_deferred_commands_run_in_order() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let table = StructuredBuffer::<u32>::new(&ctx.device, ctx.handle(), "ordered");

    table.upload(&[1, 1, 1, 1]);
    table.update(&[2, 2]);
    table.update(&[3]);
    table.release();
    table.upload(&[4, 4, 4]);
    table.update(&[5]);
    ctx.flush();

    assert_eq!(ctx.handle().pending_commands(), 0);
    assert_eq!(table.read_back().unwrap(), vec![5, 4, 4]);
}

#[test]
fn test_immediate_off_render_thread() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let table = StructuredBuffer::<u32>::new(&ctx.device, ctx.handle(), "owner");

    assert!(matches!(
        table.upload_immediate(&[1, 2, 3]),
        Err(GraphicsError::WrongThread(_))
    ));

    let on_thread = table.clone();
    let result = ctx
        .handle()
        .execute_blocking(move || on_thread.upload_immediate(&[1, 2, 3]))
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(table.capacity(), 3);
}

#[test]
fn test_immediate_update_overflow_reports_sizes() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let table = StructuredBuffer::<u32>::new(&ctx.device, ctx.handle(), "small");
    table.allocate(2);

    let on_thread = table.clone();
    let result = ctx
        .handle()
        .execute_blocking(move || on_thread.update_immediate(&[0; 3]))
        .unwrap();
    assert_eq!(
        result,
        Err(GraphicsError::UpdateOverflow {
            label: "small".to_string(),
            len: 3,
            capacity: 2,
        })
    );
    // Immediate failures are returned, not counted.
    assert_eq!(table.rejected_update_count(), 0);
}

// ============================================================================
// Vertex Binding Tests
// ============================================================================

fn quad_vertices() -> Vec<RenderVertex> {
    (0..4)
        .map(|i| {
            RenderVertex::new([i as f32, 0.0, 0.0])
                .with_tex_coord([i as f32 * 0.25, 0.0])
                .with_attachment(0, i)
        })
        .collect()
}

#[test]
fn test_missing_position_rejected() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let vertices = FemVertexBuffer::new(&ctx.device, &quad_vertices(), "quad").unwrap();
    let binding = DeformationVertexBinding::new(&ctx.device, ctx.handle(), "quad");

    let mut streams = vertices.streams();
    streams.position = None;
    assert_eq!(
        binding.set_layout(streams),
        Err(GraphicsError::MissingPositionStream)
    );
    ctx.flush();

    assert_eq!(binding.state(), BindingState::Unconstructed);
    assert!(binding.declaration(InputStreamType::Default).is_none());
}

#[test]
fn test_declaration_fallbacks() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let vertices = FemVertexBuffer::new(&ctx.device, &quad_vertices(), "quad").unwrap();
    let binding = DeformationVertexBinding::new(&ctx.device, ctx.handle(), "quad");

    let mut streams = vertices.streams();
    streams.color = None;
    streams.light_map_coordinate = None;
    binding.set_layout(streams).unwrap();
    ctx.flush();
    assert_eq!(binding.state(), BindingState::ResourceLive);

    let declaration = binding.declaration(InputStreamType::Default).unwrap();

    // Color reads a shared zero-stride white texel.
    let color = declaration.element_at(ATTRIBUTE_COLOR).unwrap();
    assert_eq!(declaration.streams()[color.stream_index].stride, 0);
    assert_eq!(Some(color.stream_index), binding.color_stream_index());

    // Every texcoord slot and the light map repeat the single texcoord.
    let first = *declaration.element_at(ATTRIBUTE_TEX_COORD).unwrap();
    for slot in 1..MAX_TEXCOORD_STREAMS as u32 {
        assert_eq!(
            declaration.element_at(ATTRIBUTE_TEX_COORD + slot).unwrap().offset,
            first.offset
        );
    }
    assert_eq!(declaration.element_at(ATTRIBUTE_LIGHT_MAP).unwrap().offset, first.offset);

    // One interleaved stream plus the fallback.
    assert_eq!(declaration.streams().len(), 2);

    let position_only = binding.declaration(InputStreamType::PositionOnly).unwrap();
    assert_eq!(position_only.elements().len(), 3);
    let with_normal = binding
        .declaration(InputStreamType::PositionAndNormalOnly)
        .unwrap();
    assert_eq!(with_normal.elements().len(), 4);
}

#[test]
fn test_copy_from_and_release() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let vertices = FemVertexBuffer::new(&ctx.device, &quad_vertices(), "quad").unwrap();
    let source = DeformationVertexBinding::new(&ctx.device, ctx.handle(), "source");
    let copy = DeformationVertexBinding::new(&ctx.device, ctx.handle(), "copy");

    source.set_layout(vertices.streams()).unwrap();
    copy.copy_from(&source).unwrap();
    ctx.flush();

    assert_eq!(copy.state(), BindingState::ResourceLive);
    assert_eq!(copy.num_tex_coords(), source.num_tex_coords());

    copy.release();
    copy.release();
    ctx.flush();
    assert_eq!(copy.state(), BindingState::Released);
    assert_eq!(source.state(), BindingState::ResourceLive);
}

// ============================================================================
// Shader Binding Tests
// ============================================================================

fn reflected_parameters() -> DeformationShaderParameters {
    let map = ShaderParameterMap::from_wgsl_entry_point(DEFORMATION_SHADER_SOURCE, "vs_main")
        .unwrap();
    let mut parameters = DeformationShaderParameters::construct(ShaderStage::Vertex).unwrap();
    parameters.bind(&map);
    parameters
}

#[test]
fn test_reflected_shader_binds_all_parameters() {
    let parameters = reflected_parameters();
    assert_eq!(parameters.bound_count(), DEFORMATION_PARAMETER_NAMES.len());
    assert!(parameters.uniforms().is_bound());
    assert!(DeformationShaderParameters::construct(ShaderStage::Fragment).is_none());
}

#[test]
fn test_partial_shader_binds_declared_subset() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let tet_mesh = TetMeshBuffers::new(&ctx.device, ctx.handle(), "tets");
    tet_mesh.set_tets(&SINGLE_TET);
    tet_mesh.update_transforms(&translated_nodes([0.0; 3]));
    tet_mesh.set_deformation(&[[0.0; 4]]);

    let proxy = FemMeshProxy::new(&ctx.device, ctx.handle(), &tet_surface_mesh()).unwrap();
    ctx.flush();

    let map = ShaderParameterMap::new()
        .with_parameter("tet_mesh_vertex_pos_buffer", 0, 1)
        .with_parameter("tet_vertex_id_buffer", 0, 4)
        .with_parameter("barycentric_pos_buffer", 0, 6);
    let mut parameters = DeformationShaderParameters::construct(ShaderStage::Vertex).unwrap();
    parameters.bind(&map);

    let batch = &proxy.collect_batches(&tet_mesh)[0];
    let mut bindings = ShaderBindings::new();
    let mut streams = VertexInputStreams::new();
    element_bindings(
        &parameters,
        &batch.vertex_binding,
        &batch.element,
        &mut bindings,
        &mut streams,
    )
    .unwrap();

    assert_eq!(bindings.view_count(), 3);
    assert!(bindings.view("tet_mesh_vertex_pos_buffer").is_some());
    assert!(bindings.view("tet_mesh_vertex_rot_buffer").is_none());
    assert!(streams.is_empty());
    // No uniform slot in this shader, but the block is still prepared.
    assert!(bindings.uniforms().is_some());
    assert!(bindings.uniforms_slot().is_none());
}

#[rstest]
#[case::manual_fetch(true, 0)]
#[case::stream_replacement(false, 1)]
fn test_color_override_binds_no_deformation(#[case] manual_fetch: bool, #[case] replaced: usize) {
    let capabilities = DeviceCapabilities::default().with_manual_vertex_fetch(manual_fetch);
    let ctx = TestContext::with_capabilities(Backend::Dummy, capabilities).unwrap();
    let tet_mesh = TetMeshBuffers::new(&ctx.device, ctx.handle(), "tets");
    tet_mesh.set_tets(&SINGLE_TET);
    tet_mesh.update_transforms(&translated_nodes([0.0; 3]));

    let proxy = FemMeshProxy::new(&ctx.device, ctx.handle(), &tet_surface_mesh()).unwrap();
    ctx.flush();

    let colors = ColorVertexBuffer::new(&ctx.device, &[[255, 0, 0, 255]; 4], "red").unwrap();
    proxy.set_color_override(Some(Arc::new(colors)));

    let parameters = reflected_parameters();
    for batch in proxy.collect_batches(&tet_mesh) {
        assert!(matches!(batch.element.user_data, BatchUserData::ColorOverride(_)));

        let mut bindings = ShaderBindings::new();
        let mut streams = VertexInputStreams::new();
        element_bindings(
            &parameters,
            &batch.vertex_binding,
            &batch.element,
            &mut bindings,
            &mut streams,
        )
        .unwrap();

        assert_eq!(bindings.view_count(), 0);
        assert_eq!(streams.len(), replaced);
        assert_eq!(bindings.uniforms().is_some(), manual_fetch);
    }
}

// ============================================================================
// Proxy Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_proxy_draw_flow(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let tet_mesh = TetMeshBuffers::new(&ctx.device, ctx.handle(), "tets");
    tet_mesh.set_tets(&SINGLE_TET);
    tet_mesh.set_deformation(&[[0.5; 4]]);

    let proxy = FemMeshProxy::new(&ctx.device, ctx.handle(), &tet_surface_mesh()).unwrap();
    assert_eq!(proxy.sections().len(), 2);

    let parameters = reflected_parameters();
    for frame in 0..3 {
        tet_mesh.update_transforms(&translated_nodes([frame as f32, 0.0, 0.0]));
        ctx.flush();

        let batches = proxy.collect_batches(&tet_mesh);
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert_eq!(batch.element.num_primitives, 2);

            let mut bindings = ShaderBindings::new();
            let mut streams = VertexInputStreams::new();
            element_bindings(
                &parameters,
                &batch.vertex_binding,
                &batch.element,
                &mut bindings,
                &mut streams,
            )
            .unwrap();
            assert_eq!(bindings.view_count(), 6);
        }

        let positions = tet_mesh.positions().read_back().unwrap();
        assert_eq!(positions[1], [1.0 + frame as f32, 0.0, 0.0, 1.0]);
    }

    proxy.release();
    tet_mesh.release();
    ctx.flush();
    assert!(proxy.collect_batches(&tet_mesh).is_empty());
}

/// A fracture grows the barycentric table from 10 to 30 entries.
#[test]
fn test_fracture_grows_tables() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let vertices: Vec<_> = (0..10)
        .map(|i| RenderVertex::new([i as f32, 0.0, 0.0]).with_attachment(0, i))
        .collect();
    let mesh = femfx_graphics::FemRenderMesh::new(vertices)
        .with_triangles(&[0, 1, 2, 3, 4, 5, 6, 7, 8], 0)
        .with_attachments(
            vec![0],
            (0..10).map(|i| BarycentricPos::at_corner(0, i % 4)).collect(),
        );
    let proxy = FemMeshProxy::new(&ctx.device, ctx.handle(), &mesh).unwrap();
    ctx.flush();

    let section = &proxy.sections()[0];
    assert_eq!(section.barycentric_positions().capacity(), 10);
    let vertex_count = section.vertex_count();

    // Every vertex moves to shard 2, whose entries start at 20.
    let ids: Vec<_> = (0..vertex_count as u32)
        .map(|i| VertexAttachmentIds::new(2, i))
        .collect();
    let topology = SectionTopology::new(
        vec![0, 10, 20],
        (0..30).map(|i| BarycentricPos::at_corner(0, i % 4)).collect(),
    )
    .with_vertex_ids(ids.clone())
    .with_tet_count(1);
    proxy.apply_fracture(0, topology).unwrap();
    ctx.flush();

    assert_eq!(section.barycentric_positions().capacity(), 30);
    assert_eq!(section.shard_offsets().read_back().unwrap(), vec![0, 10, 20]);
    assert_eq!(section.barycentric_positions().rejected_update_count(), 0);
    assert_eq!(section.attachment_ids(), ids);

    let written = section.vertex_buffer().vertices();
    assert!(written.iter().all(|v| v.shard_index() == 2));
}

#[test]
fn test_invalid_fracture_leaves_section_untouched() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let proxy = FemMeshProxy::new(&ctx.device, ctx.handle(), &tet_surface_mesh()).unwrap();
    ctx.flush();
    let section = &proxy.sections()[0];
    let before = section.attachment_ids();

    // Base ids 2 and 3 fall off a two-entry table.
    let result = proxy.apply_fracture(0, SectionTopology::new(vec![0], vec![BarycentricPos::default(); 2]));
    assert!(matches!(result, Err(GraphicsError::InvalidTopology(_))));
    ctx.flush();

    assert_eq!(section.attachment_ids(), before);
    assert_eq!(section.barycentric_positions().capacity(), 4);
}
