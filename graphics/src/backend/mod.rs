//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction for GPU backends,
//! allowing the graphics crate to work with different GPU APIs.
//!
//! # Available Backends
//!
//! - `dummy` (default): In-memory backend for testing and development
//! - `wgpu-backend`: Cross-platform backend using wgpu
//!
//! # Architecture
//!
//! Each backend implements the [`GpuBackend`] trait, which provides buffer
//! creation, writes and blocking readback. Everything above the backend
//! (views, vertex declarations, shader bindings) is backend-independent.

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub mod dummy;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::instance::BackendType;
use crate::types::BufferDescriptor;

/// Handle to a GPU buffer resource.
#[derive(Clone)]
pub enum GpuBuffer {
    /// Dummy backend buffer, contents kept in host memory
    Dummy(Arc<Mutex<Vec<u8>>>),
    /// wgpu backend buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Buffer>),
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(data) => f
                .debug_tuple("GpuBuffer::Dummy")
                .field(&data.lock().len())
                .finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => f.debug_tuple("GpuBuffer::Wgpu").field(buffer).finish(),
        }
    }
}

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Clamp requested device capabilities to what the backend supports.
    fn supported_capabilities(&self, requested: DeviceCapabilities) -> DeviceCapabilities {
        requested
    }

    /// Create a buffer resource. Contents start zeroed.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Write data to a buffer.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Read data from a buffer.
    ///
    /// This is a blocking operation that waits for the GPU to finish.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64)
    -> Result<Vec<u8>, GraphicsError>;
}

/// Creates the backend requested by `backend_type`.
///
/// `Auto` tries wgpu (when compiled in) and falls back to the dummy backend.
/// Requesting `Wgpu` without the `wgpu-backend` feature is an error.
pub fn create_backend(backend_type: BackendType) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match backend_type {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
        BackendType::Wgpu => {
            #[cfg(feature = "wgpu-backend")]
            {
                let backend = wgpu_backend::WgpuBackend::new()?;
                log::info!("Using wgpu backend");
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "wgpu-backend"))]
            {
                Err(GraphicsError::FeatureNotSupported(
                    "wgpu backend requires the `wgpu-backend` feature".to_string(),
                ))
            }
        }
        BackendType::Auto => {
            #[cfg(feature = "wgpu-backend")]
            {
                match wgpu_backend::WgpuBackend::new() {
                    Ok(backend) => {
                        log::info!("Using wgpu backend");
                        return Ok(Arc::new(backend));
                    }
                    Err(e) => {
                        log::warn!("Failed to create wgpu backend: {}", e);
                    }
                }
            }

            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
    }
}

/// Check if a real GPU backend is available.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}
