//! Graphics instance.
//!
//! The [`GraphicsInstance`] is the top-level entry point for the graphics system.
//! It owns the GPU backend and manages one or more [`GraphicsDevice`]s.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::backend::{self, GpuBackend};
use crate::device::{DeviceCapabilities, GraphicsDevice};
use crate::error::GraphicsError;

/// Which GPU backend an instance should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Best available: wgpu when compiled in and an adapter exists, else dummy.
    #[default]
    Auto,
    /// In-memory backend; always available.
    Dummy,
    /// wgpu backend; requires the `wgpu-backend` feature.
    Wgpu,
}

/// Parameters for creating a [`GraphicsInstance`].
///
/// # Example
///
/// ```ignore
/// let params = InstanceParameters::default()
///     .with_backend(BackendType::Dummy)
///     .with_capabilities(DeviceCapabilities::default().with_manual_vertex_fetch(false));
/// let instance = GraphicsInstance::with_parameters(params)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceParameters {
    /// Backend selection.
    pub backend: BackendType,
    /// Requested device capabilities, clamped by the backend.
    pub capabilities: DeviceCapabilities,
}

impl InstanceParameters {
    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Set the requested device capabilities.
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// The graphics instance manages devices.
///
/// # Thread Safety
///
/// `GraphicsInstance` is `Send + Sync` and can be safely shared across threads.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new()?;
/// let device = instance.create_device()?;
/// ```
pub struct GraphicsInstance {
    /// Weak self-reference for creating devices.
    self_ref: Weak<GraphicsInstance>,
    /// Devices created by this instance.
    devices: RwLock<Vec<Arc<GraphicsDevice>>>,
    /// GPU backend for this instance.
    backend: Arc<dyn GpuBackend>,
    parameters: InstanceParameters,
}

impl GraphicsInstance {
    /// Create a new graphics instance with default parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the graphics system cannot be initialized.
    pub fn new() -> Result<Arc<Self>, GraphicsError> {
        Self::with_parameters(InstanceParameters::default())
    }

    /// Create a new graphics instance with explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested backend is unavailable.
    pub fn with_parameters(parameters: InstanceParameters) -> Result<Arc<Self>, GraphicsError> {
        log::info!("Creating GraphicsInstance ({:?})", parameters.backend);

        let backend = backend::create_backend(parameters.backend)?;
        log::info!("Using GPU backend: {}", backend.name());

        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            devices: RwLock::new(Vec::new()),
            backend,
            parameters,
        }))
    }

    /// Get the GPU backend (internal use only).
    pub(crate) fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Get the backend name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get the parameters the instance was created with.
    pub fn parameters(&self) -> &InstanceParameters {
        &self.parameters
    }

    /// Create a graphics device.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is being dropped.
    pub fn create_device(&self) -> Result<Arc<GraphicsDevice>, GraphicsError> {
        let instance = self.self_ref.upgrade().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("instance has been dropped".to_string())
        })?;

        let capabilities = self
            .backend
            .supported_capabilities(self.parameters.capabilities);
        let name = format!("{} Device", self.backend.name());
        log::info!("Creating device {name} with {capabilities:?}");

        let device = GraphicsDevice::new(instance, name, capabilities);
        self.devices.write().push(Arc::clone(&device));
        Ok(device)
    }

    /// Get all devices created by this instance.
    pub fn devices(&self) -> Vec<Arc<GraphicsDevice>> {
        self.devices.read().clone()
    }

    /// Get the number of devices created by this instance.
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }
}

impl std::fmt::Debug for GraphicsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsInstance")
            .field("backend", &self.backend.name())
            .field("device_count", &self.device_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsInstance: Send, Sync);
