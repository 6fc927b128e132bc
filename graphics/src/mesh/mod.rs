//! Render mesh resources and their deformation binding.
//!
//! - [`FemVertexBuffer`] / [`FemIndexBuffer`] - Static render geometry of one section
//! - [`DeformationVertexBinding`] - Vertex declarations and fetch views built from a stream layout
//! - [`MeshProxySection`] - One material bucket with its attachment tables
//! - [`FemMeshProxy`] - All sections of a mesh, emitting one [`MeshBatch`] per visible section
//! - [`TetMeshBuffers`] - Per-frame tet mesh state the shader skins against
//!
//! Declarations are rebuilt on the render thread, so a binding only becomes
//! drawable once the commands queued by [`DeformationVertexBinding::set_layout`]
//! have run.

mod layout;
mod proxy;
mod section;
mod vertex_binding;
mod vertex_buffer;

pub use layout::{
    InputStreamType, VertexAttributeFormat, VertexDeclaration, VertexElement, VertexInputStream,
    VertexStepMode, VertexStream, VertexStreamComponent,
};
#[cfg(feature = "wgpu-backend")]
pub use layout::{OwnedVertexBufferLayout, WgpuVertexLayouts};
pub use proxy::{FemMeshProxy, MeshBatch, TetMeshBuffers};
pub use section::{MeshProxySection, SectionTopology};
pub use vertex_binding::{
    ATTRIBUTE_BARY_BASE_ID, ATTRIBUTE_COLOR, ATTRIBUTE_LIGHT_MAP, ATTRIBUTE_POSITION,
    ATTRIBUTE_SHARD_ID, ATTRIBUTE_TANGENT_X, ATTRIBUTE_TANGENT_Z, ATTRIBUTE_TEX_COORD,
    BindingState, DeformationStreams, DeformationVertexBinding, MAX_TEXCOORD_STREAMS,
};
pub use vertex_buffer::{ColorVertexBuffer, FemIndexBuffer, FemVertexBuffer};
