//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. Buffers are plain byte vectors, so
//! writes and readback are exact and tests can inspect what a real backend
//! would have uploaded.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::BufferDescriptor;

use super::{GpuBackend, GpuBuffer};

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend;

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self
    }

    fn storage(buffer: &GpuBuffer) -> Result<&Arc<Mutex<Vec<u8>>>, GraphicsError> {
        match buffer {
            GpuBuffer::Dummy(data) => Ok(data),
            #[cfg(feature = "wgpu-backend")]
            GpuBuffer::Wgpu(_) => Err(GraphicsError::InvalidParameter(
                "wgpu buffer passed to dummy backend".to_string(),
            )),
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let size = usize::try_from(descriptor.size).map_err(|_| {
            GraphicsError::ResourceCreationFailed(format!(
                "buffer size {} does not fit host memory",
                descriptor.size
            ))
        })?;
        Ok(GpuBuffer::Dummy(Arc::new(Mutex::new(vec![0u8; size]))))
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: write_buffer offset={} len={}",
            offset,
            data.len()
        );
        let mut storage = Self::storage(buffer)?.lock();
        let start = offset as usize;
        let end = start + data.len();
        if end > storage.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                storage.len()
            )));
        }
        storage[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        log::trace!("DummyBackend: read_buffer offset={} size={}", offset, size);
        let storage = Self::storage(buffer)?.lock();
        let start = offset as usize;
        let end = start + size as usize;
        storage.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "read of {} bytes at offset {} exceeds buffer size {}",
                size,
                offset,
                storage.len()
            ))
        })
    }
}
