//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 4;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 5;
        /// Buffer is mappable for CPU access.
        const MAP_READ = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Element format a shader sees through a buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Sint32,
    /// Four signed-normalized bytes.
    Snorm8x4,
    /// Four unsigned-normalized bytes.
    Unorm8x4,
    /// Arbitrary structure of the given size in bytes.
    Structured(u32),
}

impl ElementFormat {
    /// Get the size in bytes of one element.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float32 | Self::Uint32 | Self::Sint32 => 4,
            Self::Snorm8x4 | Self::Unorm8x4 => 4,
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
            Self::Structured(size) => *size,
        }
    }
}

/// Descriptor for a read-only shader view over a buffer range.
///
/// `stride` may be larger than the element size to view one field of an
/// interleaved vertex buffer. A stride of zero repeats the first element.
///
/// # Example
///
/// ```ignore
/// // Texture coordinates of an interleaved 40-byte vertex
/// let desc = BufferViewDescriptor::new(ElementFormat::Float32x2, vertex_count)
///     .with_offset(24)
///     .with_stride(40)
///     .with_label("tex_coords");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferViewDescriptor {
    /// Debug label for the view.
    pub label: Option<String>,
    /// Element format.
    pub format: ElementFormat,
    /// Byte offset of the first element.
    pub offset: u64,
    /// Distance in bytes between elements.
    pub stride: u32,
    /// Number of elements visible through the view.
    pub element_count: u64,
}

impl BufferViewDescriptor {
    /// Create a tightly packed view starting at offset zero.
    pub fn new(format: ElementFormat, element_count: u64) -> Self {
        Self {
            label: None,
            format,
            offset: 0,
            stride: format.size(),
            element_count,
        }
    }

    /// Set the byte offset of the first element.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the element stride.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of buffer bytes the view spans, or `None` if it overflows `u64`.
    pub fn byte_extent(&self) -> Option<u64> {
        if self.element_count == 0 {
            return Some(0);
        }
        (self.element_count - 1)
            .checked_mul(self.stride as u64)?
            .checked_add(self.format.size() as u64)?
            .checked_add(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_format_size() {
        assert_eq!(ElementFormat::Float32x3.size(), 12);
        assert_eq!(ElementFormat::Unorm8x4.size(), 4);
        assert_eq!(ElementFormat::Structured(32).size(), 32);
    }

    #[test]
    fn test_view_extent() {
        let packed = BufferViewDescriptor::new(ElementFormat::Sint32, 10);
        assert_eq!(packed.byte_extent(), Some(40));

        let strided = BufferViewDescriptor::new(ElementFormat::Float32x2, 3)
            .with_offset(24)
            .with_stride(40);
        assert_eq!(strided.byte_extent(), Some(24 + 80 + 8));

        let repeated = BufferViewDescriptor::new(ElementFormat::Unorm8x4, 100).with_stride(0);
        assert_eq!(repeated.byte_extent(), Some(4));

        assert_eq!(
            BufferViewDescriptor::new(ElementFormat::Float32, 0).byte_extent(),
            Some(0)
        );
    }

    #[test]
    fn test_view_extent_overflow() {
        let huge = BufferViewDescriptor::new(ElementFormat::Float32, (1u64 << 62) + 1);
        assert_eq!(huge.byte_extent(), None);

        let offset = BufferViewDescriptor::new(ElementFormat::Float32, 1).with_offset(u64::MAX);
        assert_eq!(offset.byte_extent(), None);
    }
}
