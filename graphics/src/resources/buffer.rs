//! GPU buffer resource.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::backend::GpuBuffer;
use crate::device::GraphicsDevice;
use crate::types::{BufferDescriptor, BufferUsage};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a buffer, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and are reference-counted.
/// They hold a weak reference back to their parent device.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))?;
/// println!("Buffer size: {}", buffer.size());
/// ```
pub struct Buffer {
    id: BufferId,
    device: Weak<GraphicsDevice>,
    descriptor: BufferDescriptor,
    gpu: GpuBuffer,
}

impl Buffer {
    /// Create a new buffer (called by GraphicsDevice).
    pub(crate) fn new(
        device: Weak<GraphicsDevice>,
        descriptor: BufferDescriptor,
        gpu: GpuBuffer,
    ) -> Self {
        Self {
            id: BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
            device,
            descriptor,
            gpu,
        }
    }

    /// Get the unique id of this buffer.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GraphicsDevice>> {
        self.device.upgrade()
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Get the backend handle.
    pub(crate) fn gpu_handle(&self) -> &GpuBuffer {
        &self.gpu
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);
