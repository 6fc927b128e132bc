//! Graphics device.
//!
//! The [`GraphicsDevice`] is the main interface for creating GPU resources.
//! It is created by [`GraphicsInstance::create_device`].

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::GraphicsError;
use crate::instance::GraphicsInstance;
use crate::resources::{Buffer, BufferView, NULL_COLOR, NullColorBuffer};
use crate::types::{BufferDescriptor, BufferUsage, BufferViewDescriptor, ElementFormat};

/// Capabilities of a graphics device.
///
/// The instance passes the requested capabilities to the backend, which may
/// turn features off. Tests use this to exercise the fallback paths on the
/// dummy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Maximum buffer size.
    pub max_buffer_size: u64,
    /// Vertex shaders may read vertex attributes from buffer views.
    pub manual_vertex_fetch: bool,
    /// The vertex index seen by shaders already includes the base vertex.
    pub absolute_vertex_id: bool,
    /// Vertex shaders may bind read-only storage buffers.
    pub vertex_storage_buffers: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_buffer_size: 1 << 30, // 1 GB
            manual_vertex_fetch: true,
            absolute_vertex_id: true,
            vertex_storage_buffers: true,
        }
    }
}

impl DeviceCapabilities {
    pub fn with_max_buffer_size(mut self, size: u64) -> Self {
        self.max_buffer_size = size;
        self
    }

    pub fn with_manual_vertex_fetch(mut self, supported: bool) -> Self {
        self.manual_vertex_fetch = supported;
        self
    }

    pub fn with_absolute_vertex_id(mut self, supported: bool) -> Self {
        self.absolute_vertex_id = supported;
        self
    }

    pub fn with_vertex_storage_buffers(mut self, supported: bool) -> Self {
        self.vertex_storage_buffers = supported;
        self
    }
}

/// A graphics device for creating GPU resources.
///
/// The device is created by [`GraphicsInstance::create_device`] and provides
/// methods for creating buffers and views and for moving bytes in and out of
/// buffers.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync`. Creation may happen on any thread;
/// mutation of buffers that are visible to draws is serialized on the render
/// thread by the owners of those buffers.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new()?;
/// let device = instance.create_device()?;
///
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))?;
/// device.write_buffer(&buffer, 0, &bytes)?;
/// ```
pub struct GraphicsDevice {
    self_ref: Weak<GraphicsDevice>,
    instance: Arc<GraphicsInstance>,
    name: String,
    capabilities: DeviceCapabilities,
    // Track allocated resources (weak references for cleanup/debugging)
    buffers: RwLock<Vec<Weak<Buffer>>>,
    null_color: Mutex<Weak<NullColorBuffer>>,
}

impl GraphicsDevice {
    /// Create a new graphics device (called by GraphicsInstance).
    pub(crate) fn new(
        instance: Arc<GraphicsInstance>,
        name: String,
        capabilities: DeviceCapabilities,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            instance,
            name,
            capabilities,
            buffers: RwLock::new(Vec::new()),
            null_color: Mutex::new(Weak::new()),
        })
    }

    /// Get the parent instance.
    pub fn instance(&self) -> &Arc<GraphicsInstance> {
        &self.instance
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Create a GPU buffer. Contents start zeroed.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer size is zero, exceeds device limits, or
    /// allocation fails.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Arc<Buffer>, GraphicsError> {
        if descriptor.size > self.capabilities.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.capabilities.max_buffer_size
            )));
        }

        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let gpu = self.instance.backend().create_buffer(descriptor)?;
        let buffer = Arc::new(Buffer::new(self.self_ref.clone(), descriptor.clone(), gpu));

        self.buffers.write().push(Arc::downgrade(&buffer));

        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}",
            descriptor.label,
            descriptor.size
        );

        Ok(buffer)
    }

    /// Create a buffer and fill it with `data`.
    pub fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<Arc<Buffer>, GraphicsError> {
        let buffer = self.create_buffer(descriptor)?;
        self.write_buffer(&buffer, 0, data)?;
        Ok(buffer)
    }

    /// Write bytes into a buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write does not fit the buffer.
    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        if offset + data.len() as u64 > buffer.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {} exceeds buffer {:?} of size {}",
                data.len(),
                offset,
                buffer.label(),
                buffer.size()
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        log::trace!(
            "GraphicsDevice: write {} bytes to {:?} at {}",
            data.len(),
            buffer.label(),
            offset
        );
        self.instance
            .backend()
            .write_buffer(buffer.gpu_handle(), offset, data)
    }

    /// Read `size` bytes from a buffer at `offset`. Blocks until the data is
    /// available.
    pub fn read_buffer(&self, buffer: &Buffer, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        if offset + size > buffer.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "read of {} bytes at offset {} exceeds buffer {:?} of size {}",
                size,
                offset,
                buffer.label(),
                buffer.size()
            )));
        }
        if size == 0 {
            return Ok(Vec::new());
        }
        self.instance
            .backend()
            .read_buffer(buffer.gpu_handle(), offset, size)
    }

    /// Create a read-only view over part of a buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the view reaches past the end of the buffer.
    pub fn create_buffer_view(
        &self,
        buffer: &Arc<Buffer>,
        descriptor: BufferViewDescriptor,
    ) -> Result<Arc<BufferView>, GraphicsError> {
        let extent = descriptor.byte_extent().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "view {:?} of {} elements overflows the address space",
                descriptor.label, descriptor.element_count
            ))
        })?;
        if extent > buffer.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "view {:?} spans {} bytes but buffer {:?} has {}",
                descriptor.label,
                extent,
                buffer.label(),
                buffer.size()
            )));
        }
        log::trace!(
            "GraphicsDevice: created view {:?} over {:?} ({:?} x {})",
            descriptor.label,
            buffer.label(),
            descriptor.format,
            descriptor.element_count
        );
        Ok(Arc::new(BufferView::new(Arc::clone(buffer), descriptor)))
    }

    /// Get the shared null color buffer, creating it if no one holds it.
    ///
    /// The buffer lives as long as at least one caller keeps the returned
    /// `Arc`; the next request after that creates a fresh one.
    pub fn null_color_buffer(&self) -> Result<Arc<NullColorBuffer>, GraphicsError> {
        let mut slot = self.null_color.lock();
        if let Some(existing) = slot.upgrade() {
            return Ok(existing);
        }

        let buffer = self.create_buffer_with_data(
            &BufferDescriptor::new(
                NULL_COLOR.len() as u64,
                BufferUsage::VERTEX | BufferUsage::STORAGE | BufferUsage::COPY_DST,
            )
            .with_label("null_color"),
            &NULL_COLOR,
        )?;
        let view = self.create_buffer_view(
            &buffer,
            BufferViewDescriptor::new(ElementFormat::Unorm8x4, 1)
                .with_stride(0)
                .with_label("null_color"),
        )?;
        let null_color = Arc::new(NullColorBuffer::new(buffer, view));
        *slot = Arc::downgrade(&null_color);
        log::debug!("GraphicsDevice: created null color buffer");
        Ok(null_color)
    }

    /// Get the number of live buffers created by this device.
    pub fn buffer_count(&self) -> usize {
        self.buffers
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Clean up dead weak references to released resources.
    pub fn cleanup_dead_resources(&self) {
        self.buffers.write().retain(|w| w.strong_count() > 0);
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{BackendType, InstanceParameters};

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::with_parameters(
            InstanceParameters::default().with_backend(BackendType::Dummy),
        )
        .unwrap();
        instance.create_device().unwrap()
    }

    #[test]
    fn test_device_name() {
        let device = create_test_device();
        assert_eq!(device.name(), "Dummy Device");
    }

    #[test]
    fn test_create_buffer() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE).with_label("test"))
            .unwrap();
        assert_eq!(buffer.size(), 1024);
        assert_eq!(buffer.label(), Some("test"));
        assert!(buffer.device().is_some());
    }

    #[test]
    fn test_create_buffer_zero_size() {
        let device = create_test_device();
        let result = device.create_buffer(&BufferDescriptor::new(0, BufferUsage::STORAGE));
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_create_buffer_over_limit() {
        let instance = GraphicsInstance::with_parameters(
            InstanceParameters::default()
                .with_backend(BackendType::Dummy)
                .with_capabilities(DeviceCapabilities::default().with_max_buffer_size(64)),
        )
        .unwrap();
        let device = instance.create_device().unwrap();
        assert!(device
            .create_buffer(&BufferDescriptor::new(128, BufferUsage::STORAGE))
            .is_err());
    }

    #[test]
    fn test_write_and_read() {
        let device = create_test_device();
        let buffer = device
            .create_buffer_with_data(
                &BufferDescriptor::new(8, BufferUsage::STORAGE),
                &[1, 2, 3, 4, 5, 6, 7, 8],
            )
            .unwrap();
        device.write_buffer(&buffer, 4, &[9, 9]).unwrap();
        assert_eq!(
            device.read_buffer(&buffer, 2, 6).unwrap(),
            vec![3, 4, 9, 9, 7, 8]
        );
        assert!(device.write_buffer(&buffer, 7, &[0, 0]).is_err());
    }

    #[test]
    fn test_view_bounds() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(40, BufferUsage::STORAGE))
            .unwrap();
        let view = device
            .create_buffer_view(&buffer, BufferViewDescriptor::new(ElementFormat::Sint32, 10))
            .unwrap();
        assert_eq!(view.element_count(), 10);
        assert!(device
            .create_buffer_view(&buffer, BufferViewDescriptor::new(ElementFormat::Sint32, 11))
            .is_err());
    }

    #[test]
    fn test_null_color_shared_and_recreated() {
        let device = create_test_device();
        let a = device.null_color_buffer().unwrap();
        let b = device.null_color_buffer().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.view().stride(), 0);
        assert_eq!(
            device.read_buffer(a.buffer(), 0, 4).unwrap(),
            NULL_COLOR.to_vec()
        );

        let first_id = a.buffer().id();
        drop(a);
        drop(b);
        let c = device.null_color_buffer().unwrap();
        assert_ne!(c.buffer().id(), first_id);
    }

    #[test]
    fn test_resource_cleanup() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::STORAGE))
            .unwrap();
        assert_eq!(device.buffer_count(), 1);
        drop(buffer);
        assert_eq!(device.buffer_count(), 0);
        device.cleanup_dead_resources();
        assert_eq!(device.buffer_count(), 0);
    }
}
