//! Shared fallback color stream.

use std::sync::Arc;

use super::{Buffer, BufferView};

/// Color written into the null color buffer (opaque white, RGBA8).
pub const NULL_COLOR: [u8; 4] = [255, 255, 255, 255];

/// A single RGBA8 color read with stride zero by meshes without vertex colors.
///
/// One instance exists per device while anything holds it; see
/// [`GraphicsDevice::null_color_buffer`](crate::GraphicsDevice::null_color_buffer).
#[derive(Debug)]
pub struct NullColorBuffer {
    buffer: Arc<Buffer>,
    view: Arc<BufferView>,
}

impl NullColorBuffer {
    pub(crate) fn new(buffer: Arc<Buffer>, view: Arc<BufferView>) -> Self {
        Self { buffer, view }
    }

    /// The 4-byte vertex buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Zero-stride `Unorm8x4` view for manual vertex fetch.
    pub fn view(&self) -> &Arc<BufferView> {
        &self.view
    }
}
