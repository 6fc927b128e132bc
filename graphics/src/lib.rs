//! # FEMFX Graphics
//!
//! GPU side of FEMFX render meshes: a static render mesh whose vertices are
//! skinned in the vertex shader against a simulated tetrahedral mesh.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`StructuredBuffer`] - Growable typed GPU table with deferred updates
//! - [`DeformationVertexBinding`] - Vertex declarations and fetch views for the deformation shader
//! - [`binding`] - Per-draw shader resource binding and per-draw uniforms
//! - [`FemMeshProxy`] - Render-side state of one simulated mesh
//! - [`RenderThread`] - The thread that owns every GPU-facing mutation
//! - Backend support: wgpu, and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use femfx_graphics::{FemMeshProxy, GraphicsInstance, RenderThread, TetMeshBuffers};
//!
//! let device = GraphicsInstance::new()?.create_device()?;
//! let render_thread = RenderThread::spawn(Default::default())?;
//!
//! let proxy = FemMeshProxy::new(&device, render_thread.handle(), &render_mesh)?;
//! let tet_mesh = TetMeshBuffers::new(&device, render_thread.handle(), "body");
//! tet_mesh.set_tets(&tets);
//!
//! tet_mesh.update_transforms(&transforms);
//! let batches = proxy.collect_batches(&tet_mesh);
//! render_thread.handle().flush()?;
//! ```

pub mod backend;
pub mod binding;
pub mod device;
pub mod error;
pub mod instance;
pub mod mesh;
pub mod render_thread;
pub mod resources;
pub mod shader;
pub mod structured_buffer;
pub mod types;

// Re-export main types for convenience
pub use backend::{GpuBackend, GpuBuffer, has_gpu_backend};
pub use binding::{
    BatchElementParams, BatchUserData, DeformationShaderParameters, MeshBatchElement,
    ShaderBindings, VertexFactoryUniforms, VertexFetchParameters, VertexInputStreams,
    create_vertex_factory_uniforms, element_bindings,
};
pub use device::{DeviceCapabilities, GraphicsDevice};
pub use error::GraphicsError;
pub use instance::{BackendType, GraphicsInstance, InstanceParameters};
pub use mesh::{
    BindingState, ColorVertexBuffer, DeformationStreams, DeformationVertexBinding, FemIndexBuffer,
    FemMeshProxy, FemVertexBuffer, InputStreamType, MeshBatch, MeshProxySection, SectionTopology,
    TetMeshBuffers, VertexAttributeFormat, VertexDeclaration, VertexStreamComponent,
};
pub use render_thread::{RenderThread, RenderThreadConfig, RenderThreadHandle};
pub use resources::{Buffer, BufferView, NullColorBuffer};
pub use shader::{
    DEFORMATION_SHADER_SOURCE, ShaderCompilationEnvironment, ShaderParameterMap, ShaderStage,
};
pub use structured_buffer::StructuredBuffer;
pub use types::{BufferDescriptor, BufferUsage, BufferViewDescriptor, ElementFormat};

pub use femfx_core::mesh::{
    BarycentricPos, FemRenderMesh, RenderVertex, TetDeformation, TetIndices, TetVertexTransform,
    TopologyError, VertexAttachmentIds,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("FEMFX Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_shader_source_embedded() {
        assert!(DEFORMATION_SHADER_SOURCE.contains("fn vs_main"));
    }
}
