//! Common utilities for deformation integration tests.
//!
//! Provides backend selection, a device plus render thread per test, and a
//! few small simulated meshes.

use std::sync::Arc;

use femfx_graphics::{
    BackendType, BarycentricPos, DeviceCapabilities, FemRenderMesh, GraphicsDevice,
    GraphicsInstance, InstanceParameters, RenderThread, RenderThreadConfig, RenderThreadHandle,
    RenderVertex, TetIndices, TetVertexTransform,
};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (no actual GPU operations).
    Dummy,
    /// wgpu backend.
    Wgpu,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            Backend::Wgpu => cfg!(feature = "wgpu-backend"),
        }
    }

    fn backend_type(self) -> BackendType {
        match self {
            Backend::Dummy => BackendType::Dummy,
            Backend::Wgpu => BackendType::Wgpu,
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A device and a render thread.
pub struct TestContext {
    pub device: Arc<GraphicsDevice>,
    pub render_thread: RenderThread,
}

impl TestContext {
    /// Create a context, or `None` if the backend is unavailable here.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_capabilities(backend, DeviceCapabilities::default())
    }

    pub fn with_capabilities(backend: Backend, capabilities: DeviceCapabilities) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        if !backend.is_available() {
            return None;
        }

        let parameters = InstanceParameters::default()
            .with_backend(backend.backend_type())
            .with_capabilities(capabilities);
        let device = match GraphicsInstance::with_parameters(parameters)
            .and_then(|instance| instance.create_device())
        {
            Ok(device) => device,
            Err(e) => {
                eprintln!("Backend {backend:?} failed to initialize: {e}");
                return None;
            }
        };
        let render_thread = RenderThread::spawn(RenderThreadConfig::default()).ok()?;

        Some(Self {
            device,
            render_thread,
        })
    }

    pub fn handle(&self) -> RenderThreadHandle {
        self.render_thread.handle()
    }

    /// Wait for every queued render command.
    pub fn flush(&self) {
        self.handle().flush().expect("render thread alive");
    }
}

// ============================================================================
// Meshes
// ============================================================================

/// Corner positions of the unit tetrahedron.
pub const TET_CORNERS: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
];

/// One tetrahedron using nodes 0..4.
pub const SINGLE_TET: [TetIndices; 1] = [[0, 1, 2, 3]];

/// A render mesh covering the faces of the unit tetrahedron, each vertex
/// pinned to one corner. Faces alternate between materials 0 and 1.
pub fn tet_surface_mesh() -> FemRenderMesh {
    let vertices = TET_CORNERS
        .iter()
        .enumerate()
        .map(|(i, corner)| RenderVertex::new(*corner).with_attachment(0, i as u32))
        .collect();
    let barycentric = (0..4).map(|corner| BarycentricPos::at_corner(0, corner)).collect();

    FemRenderMesh::new(vertices)
        .with_triangle([0, 2, 1], 0)
        .with_triangle([0, 1, 3], 1)
        .with_triangle([0, 3, 2], 0)
        .with_triangle([1, 2, 3], 1)
        .with_attachments(vec![0], barycentric)
        .with_label("tet_surface")
}

/// Node transforms of the unit tetrahedron translated by `offset`.
pub fn translated_nodes(offset: [f32; 3]) -> Vec<TetVertexTransform> {
    TET_CORNERS
        .iter()
        .map(|c| TetVertexTransform::at([c[0] + offset[0], c[1] + offset[1], c[2] + offset[2]]))
        .collect()
}
