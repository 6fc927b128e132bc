//! Read-only shader views over buffers.

use std::sync::Arc;

use crate::types::{BufferViewDescriptor, ElementFormat};

use super::Buffer;

/// A typed, read-only view of a buffer range.
///
/// The view keeps its buffer alive. Views are immutable; resizing a buffer
/// means creating a new buffer and a new view.
pub struct BufferView {
    buffer: Arc<Buffer>,
    descriptor: BufferViewDescriptor,
}

impl BufferView {
    pub(crate) fn new(buffer: Arc<Buffer>, descriptor: BufferViewDescriptor) -> Self {
        Self { buffer, descriptor }
    }

    /// Get the viewed buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn descriptor(&self) -> &BufferViewDescriptor {
        &self.descriptor
    }

    pub fn format(&self) -> ElementFormat {
        self.descriptor.format
    }

    pub fn element_count(&self) -> u64 {
        self.descriptor.element_count
    }

    pub fn stride(&self) -> u32 {
        self.descriptor.stride
    }

    pub fn offset(&self) -> u64 {
        self.descriptor.offset
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Check whether two views cover the same range of the same buffer.
    pub fn same_range(&self, other: &BufferView) -> bool {
        self.buffer.id() == other.buffer.id() && self.descriptor == other.descriptor
    }
}

impl std::fmt::Debug for BufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferView")
            .field("buffer", &self.buffer.id())
            .field("format", &self.descriptor.format)
            .field("offset", &self.descriptor.offset)
            .field("stride", &self.descriptor.stride)
            .field("element_count", &self.descriptor.element_count)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(BufferView: Send, Sync);
