//! CPU-side mesh types for simulated render meshes.
//!
//! This module provides GPU-agnostic data structures:
//!
//! - [`RenderVertex`] - Vertex record uploaded to the GPU vertex buffer
//! - [`BarycentricPos`] / [`TetVertexTransform`] - Attachment and solver records
//! - [`FemRenderMesh`] - CPU mesh split into per-material [`SectionData`]
//! - [`validate_attachments`] - Attachment invariant checks
//! - [`deform_vertex`] - CPU reference of the GPU skinning
//!
//! These types are re-exported by `femfx-graphics` for convenience.

mod attachment;
mod data;
pub mod skinning;
mod topology;
mod vertex;

pub use attachment::{
    BarycentricPos, TetDeformation, TetIndices, TetVertexTransform, split_transforms,
};
pub use data::{FemRenderMesh, IndexFormat, SectionData};
pub use skinning::{DeformedVertex, SkinningTables, deform_vertex, deform_vertices};
pub use topology::{
    TopologyError, VertexAttachmentIds, resolve_bary_index, validate_attachment_ids,
    validate_attachments, validate_indices, validate_tet_ids,
};
pub use vertex::{PackedNormal, RenderVertex};
