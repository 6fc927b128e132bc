//! Render vertex layout shared by the CPU mesh and the GPU vertex buffer.

use bytemuck::{Pod, Zeroable};

use crate::math::Vec3;

/// A unit vector packed into four signed-normalized bytes.
///
/// `w` carries the tangent-basis handedness (`127` or `-127`) when used for
/// the tangent Z component; it is ignored for tangent X.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct PackedNormal {
    pub x: i8,
    pub y: i8,
    pub z: i8,
    pub w: i8,
}

impl PackedNormal {
    /// Pack a vector (expected in `[-1, 1]`) with the given `w` sign.
    pub fn pack(v: Vec3, w_sign: f32) -> Self {
        fn quantize(c: f32) -> i8 {
            (c.clamp(-1.0, 1.0) * 127.0).round() as i8
        }
        Self {
            x: quantize(v.x),
            y: quantize(v.y),
            z: quantize(v.z),
            w: if w_sign < 0.0 { -127 } else { 127 },
        }
    }

    /// Unpack into a vector (not renormalized).
    pub fn unpack(&self) -> Vec3 {
        Vec3::new(
            self.x as f32 / 127.0,
            self.y as f32 / 127.0,
            self.z as f32 / 127.0,
        )
    }

    /// Handedness sign stored in `w`.
    pub fn sign(&self) -> f32 {
        if self.w < 0 { -1.0 } else { 1.0 }
    }
}

/// Vertex record of a simulated render mesh.
///
/// Everything except `shard_id` and `bary_base_id` is immutable once
/// uploaded. Those two are rewritten when fracture reassigns the vertex to
/// other tetrahedra. They are stored as floats because the vertex stream
/// reads them as single-float attributes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct RenderVertex {
    pub position: [f32; 3],
    pub tangent_x: PackedNormal,
    pub tangent_z: PackedNormal,
    /// RGBA8 vertex color.
    pub color: [u8; 4],
    pub tex_coord: [f32; 2],
    /// Index into the section's shard offset table.
    pub shard_id: f32,
    /// Base index into the section's barycentric position table.
    pub bary_base_id: f32,
}

impl RenderVertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    pub const OFFSET_POSITION: u32 = 0;
    pub const OFFSET_TANGENT_X: u32 = 12;
    pub const OFFSET_TANGENT_Z: u32 = 16;
    pub const OFFSET_COLOR: u32 = 20;
    pub const OFFSET_TEX_COORD: u32 = 24;
    pub const OFFSET_SHARD_ID: u32 = 32;
    pub const OFFSET_BARY_BASE_ID: u32 = 36;

    /// Largest attachment id an `f32` vertex attribute holds exactly.
    pub const MAX_ATTACHMENT_ID: u32 = 1 << 24;

    /// Create a vertex at `position` with a default tangent frame and white color.
    pub fn new(position: [f32; 3]) -> Self {
        Self {
            position,
            tangent_x: PackedNormal::pack(Vec3::x(), 1.0),
            tangent_z: PackedNormal::pack(Vec3::z(), 1.0),
            color: [255; 4],
            tex_coord: [0.0; 2],
            shard_id: 0.0,
            bary_base_id: 0.0,
        }
    }

    /// Set the texture coordinate.
    pub fn with_tex_coord(mut self, tex_coord: [f32; 2]) -> Self {
        self.tex_coord = tex_coord;
        self
    }

    /// Set the vertex color.
    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        self.color = color;
        self
    }

    /// Set the tangent basis from tangent X and tangent Z (normal).
    pub fn with_tangents(mut self, tangent_x: Vec3, tangent_z: Vec3, handedness: f32) -> Self {
        self.tangent_x = PackedNormal::pack(tangent_x, 1.0);
        self.tangent_z = PackedNormal::pack(tangent_z, handedness);
        self
    }

    /// Set the simulation attachment ids.
    pub fn with_attachment(mut self, shard_id: u32, bary_base_id: u32) -> Self {
        self.set_attachment(shard_id, bary_base_id);
        self
    }

    /// Overwrite the simulation attachment ids.
    pub fn set_attachment(&mut self, shard_id: u32, bary_base_id: u32) {
        self.shard_id = shard_id as f32;
        self.bary_base_id = bary_base_id as f32;
    }

    /// Shard id as an integer index.
    pub fn shard_index(&self) -> u32 {
        self.shard_id as u32
    }

    /// Barycentric base id as an integer index.
    pub fn bary_base_index(&self) -> u32 {
        self.bary_base_id as u32
    }
}

const _: () = assert!(std::mem::size_of::<RenderVertex>() == 40);
const _: () = assert!(std::mem::offset_of!(RenderVertex, tangent_x) == 12);
const _: () = assert!(std::mem::offset_of!(RenderVertex, color) == 20);
const _: () = assert!(std::mem::offset_of!(RenderVertex, tex_coord) == 24);
const _: () = assert!(std::mem::offset_of!(RenderVertex, shard_id) == 32);
const _: () = assert!(std::mem::offset_of!(RenderVertex, bary_base_id) == 36);
