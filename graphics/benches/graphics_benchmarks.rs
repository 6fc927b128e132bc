use criterion::{Criterion, black_box, criterion_group, criterion_main};

use femfx_graphics::{
    BarycentricPos, BufferDescriptor, BufferUsage, DEFORMATION_SHADER_SOURCE,
    DeformationShaderParameters, FemMeshProxy, FemRenderMesh, GraphicsInstance, RenderThread,
    RenderThreadConfig, RenderVertex, ShaderBindings, ShaderParameterMap, ShaderStage,
    StructuredBuffer, TetMeshBuffers, TetVertexTransform, VertexInputStreams, element_bindings,
};

fn grid_mesh(side: u32, materials: u32) -> FemRenderMesh {
    let vertices = (0..side * side)
        .map(|i| RenderVertex::new([(i % side) as f32, (i / side) as f32, 0.0]).with_attachment(0, i))
        .collect();
    let barycentric = (0..side * side)
        .map(|i| BarycentricPos::at_corner(0, (i % 4) as usize))
        .collect();

    let mut mesh = FemRenderMesh::new(vertices).with_attachments(vec![0], barycentric);
    for y in 0..side - 1 {
        for x in 0..side - 1 {
            let i = y * side + x;
            let material = (x + y) % materials;
            mesh.push_triangle([i, i + 1, i + side], material);
            mesh.push_triangle([i + 1, i + side + 1, i + side], material);
        }
    }
    mesh
}

// ---------------------------------------------------------------------------
// Dummy backend resource creation
// ---------------------------------------------------------------------------

fn bench_dummy_create_buffer(c: &mut Criterion) {
    let instance = GraphicsInstance::new().unwrap();
    let device = instance.create_device().unwrap();

    c.bench_function("dummy_create_buffer_1kb", |b| {
        b.iter(|| {
            black_box(
                device
                    .create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))
                    .unwrap(),
            );
        });
    });
}

// ---------------------------------------------------------------------------
// Structured buffers
// ---------------------------------------------------------------------------

fn bench_publish_in_place(c: &mut Criterion) {
    let device = GraphicsInstance::new().unwrap().create_device().unwrap();
    let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
    let handle = render_thread.handle();
    let table = StructuredBuffer::<[f32; 4]>::new(&device, handle.clone(), "positions");
    let data = vec![[1.0f32; 4]; 4096];
    table.upload(&data);
    handle.flush().unwrap();

    c.bench_function("structured_buffer_publish_4096_flush", |b| {
        b.iter(|| {
            table.publish(black_box(&data));
            handle.flush().unwrap();
        });
    });
}

fn bench_update_transforms(c: &mut Criterion) {
    let device = GraphicsInstance::new().unwrap().create_device().unwrap();
    let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
    let handle = render_thread.handle();
    let tet_mesh = TetMeshBuffers::new(&device, handle.clone(), "bench");
    let transforms: Vec<_> = (0..4096)
        .map(|n| TetVertexTransform::at([n as f32, 0.0, 0.0]))
        .collect();

    c.bench_function("tet_mesh_update_transforms_4096", |b| {
        b.iter(|| {
            tet_mesh.update_transforms(black_box(&transforms));
            handle.flush().unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// Shader reflection and per-draw binding
// ---------------------------------------------------------------------------

fn bench_reflect_shader(c: &mut Criterion) {
    c.bench_function("reflect_deformation_shader", |b| {
        b.iter(|| {
            ShaderParameterMap::from_wgsl_entry_point(black_box(DEFORMATION_SHADER_SOURCE), "vs_main")
                .unwrap()
        });
    });
}

fn bench_collect_and_bind(c: &mut Criterion) {
    let device = GraphicsInstance::new().unwrap().create_device().unwrap();
    let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
    let handle = render_thread.handle();

    let tet_mesh = TetMeshBuffers::new(&device, handle.clone(), "bench");
    tet_mesh.set_tets(&[[0, 1, 2, 3]]);
    tet_mesh.update_transforms(&[TetVertexTransform::at([0.0; 3]); 4]);
    let proxy = FemMeshProxy::new(&device, handle.clone(), &grid_mesh(32, 8)).unwrap();
    handle.flush().unwrap();

    let map = ShaderParameterMap::from_wgsl_entry_point(DEFORMATION_SHADER_SOURCE, "vs_main").unwrap();
    let mut parameters = DeformationShaderParameters::construct(ShaderStage::Vertex).unwrap();
    parameters.bind(&map);

    c.bench_function("collect_and_bind_8_sections", |b| {
        b.iter(|| {
            for batch in proxy.collect_batches(&tet_mesh) {
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
                black_box(bindings);
            }
        });
    });
}

criterion_group!(
    resource_benches,
    bench_dummy_create_buffer,
    bench_publish_in_place,
    bench_update_transforms,
);

criterion_group!(binding_benches, bench_reflect_shader, bench_collect_and_bind);

criterion_main!(resource_benches, binding_benches);
