//! Typed GPU arrays with a read-only shader view.
//!
//! A [`StructuredBuffer`] pairs a storage buffer holding `capacity` elements of
//! `T` with a structured view the vertex shader reads. Capacity is fixed at
//! allocation: [`update`](StructuredBuffer::update) overwrites a prefix in
//! place, while [`upload`](StructuredBuffer::upload) reallocates to fit.
//!
//! All mutation happens on the render thread. Called there, the mutators run
//! immediately; called elsewhere, they copy their input and enqueue. Deferred
//! calls cannot return errors, so failures are logged and rejected updates
//! are counted. The `*_immediate` variants are the render-thread bodies and
//! return errors directly.
//!
//! # Example
//!
//! ```ignore
//! let offsets = StructuredBuffer::<i32>::new(&device, render_thread.handle(), "shard_offsets");
//! offsets.allocate(100);
//! offsets.update(&[0; 50]);
//! render_thread.handle().flush()?;
//! assert_eq!(offsets.capacity(), 100);
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::render_thread::RenderThreadHandle;
use crate::resources::{Buffer, BufferView};
use crate::types::{BufferDescriptor, BufferUsage, BufferViewDescriptor, ElementFormat};

#[derive(Default)]
struct StorageState {
    buffer: Option<Arc<Buffer>>,
    view: Option<Arc<BufferView>>,
    capacity: usize,
}

struct Shared<T> {
    device: Arc<GraphicsDevice>,
    render_thread: RenderThreadHandle,
    label: String,
    state: Mutex<StorageState>,
    rejected_updates: AtomicUsize,
    _marker: PhantomData<fn() -> T>,
}

/// GPU array of `T` plus a read view, mutated only on the render thread.
///
/// Cloning yields another handle to the same storage.
pub struct StructuredBuffer<T: Pod + Send> {
    shared: Arc<Shared<T>>,
}

impl<T: Pod + Send> Clone for StructuredBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Pod + Send> StructuredBuffer<T> {
    /// Usage flags of every structured buffer.
    pub const USAGE: BufferUsage = BufferUsage::STORAGE
        .union(BufferUsage::COPY_DST)
        .union(BufferUsage::COPY_SRC);

    /// Create an unallocated buffer (capacity 0).
    pub fn new(
        device: &Arc<GraphicsDevice>,
        render_thread: RenderThreadHandle,
        label: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                device: Arc::clone(device),
                render_thread,
                label: label.into(),
                state: Mutex::new(StorageState::default()),
                rejected_updates: AtomicUsize::new(0),
                _marker: PhantomData,
            }),
        }
    }

    /// Release any prior storage and reserve `capacity` elements.
    ///
    /// A capacity of zero is ignored and keeps the prior storage.
    pub fn allocate(&self, capacity: usize) {
        if capacity == 0 {
            log::debug!("'{}': ignoring allocation of 0 elements", self.shared.label);
            return;
        }
        self.dispatch_owned(Vec::new(), move |shared, _| {
            shared.report(shared.allocate_now(capacity))
        });
    }

    /// Allocate exactly `data.len()` elements and copy `data` in.
    ///
    /// An empty slice releases the storage.
    pub fn upload(&self, data: &[T]) {
        self.dispatch(data, |shared, data| shared.report(shared.upload_now(data)));
    }

    /// Overwrite the first `data.len()` elements in place.
    ///
    /// If `data` is longer than the capacity nothing is written; the update
    /// is logged and counted in [`rejected_update_count`](Self::rejected_update_count).
    pub fn update(&self, data: &[T]) {
        self.dispatch(data, |shared, data| shared.report(shared.update_now(data)));
    }

    /// Update in place when `data` fits, otherwise upload.
    pub fn publish(&self, data: &[T]) {
        self.dispatch(data, |shared, data| shared.report(shared.publish_now(data)));
    }

    /// Drop the buffer and view; capacity becomes 0. Idempotent.
    pub fn release(&self) {
        self.dispatch_owned(Vec::new(), |shared, _| shared.release_now());
    }

    /// Render-thread body of [`allocate`](Self::allocate).
    ///
    /// # Errors
    ///
    /// [`GraphicsError::WrongThread`] off the render thread,
    /// [`GraphicsError::InvalidParameter`] for a capacity of zero or one whose
    /// byte size overflows. The prior storage is kept in both cases.
    pub fn allocate_immediate(&self, capacity: usize) -> Result<(), GraphicsError> {
        self.check_thread("allocate")?;
        self.shared.allocate_now(capacity)
    }

    /// Render-thread body of [`upload`](Self::upload).
    pub fn upload_immediate(&self, data: &[T]) -> Result<(), GraphicsError> {
        self.check_thread("upload")?;
        self.shared.upload_now(data)
    }

    /// Render-thread body of [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// [`GraphicsError::UpdateOverflow`] if `data` is longer than the capacity;
    /// nothing is written in that case.
    pub fn update_immediate(&self, data: &[T]) -> Result<(), GraphicsError> {
        self.check_thread("update")?;
        self.shared.update_now(data)
    }

    /// Render-thread body of [`publish`](Self::publish).
    pub fn publish_immediate(&self, data: &[T]) -> Result<(), GraphicsError> {
        self.check_thread("publish")?;
        self.shared.publish_now(data)
    }

    /// Render-thread body of [`release`](Self::release).
    pub fn release_immediate(&self) -> Result<(), GraphicsError> {
        self.check_thread("release")?;
        self.shared.release_now();
        Ok(())
    }

    /// Number of elements the storage holds.
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().capacity
    }

    pub fn is_allocated(&self) -> bool {
        self.shared.state.lock().buffer.is_some()
    }

    /// Current GPU buffer, if allocated.
    pub fn buffer(&self) -> Option<Arc<Buffer>> {
        self.shared.state.lock().buffer.clone()
    }

    /// Current read view, if allocated.
    pub fn view(&self) -> Option<Arc<BufferView>> {
        self.shared.state.lock().view.clone()
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Number of deferred updates dropped because they exceeded capacity.
    pub fn rejected_update_count(&self) -> usize {
        self.shared.rejected_updates.load(Ordering::Acquire)
    }

    /// Read the whole storage back to the host.
    ///
    /// Runs on the render thread behind every command already queued and
    /// blocks the caller until it completes.
    pub fn read_back(&self) -> Result<Vec<T>, GraphicsError> {
        let shared = Arc::clone(&self.shared);
        self.shared
            .render_thread
            .execute_blocking(move || shared.read_now())?
    }

    fn check_thread(&self, op: &'static str) -> Result<(), GraphicsError> {
        if self.shared.render_thread.is_current() {
            Ok(())
        } else {
            Err(GraphicsError::WrongThread(op))
        }
    }

    fn dispatch<F>(&self, data: &[T], op: F)
    where
        F: FnOnce(&Shared<T>, &[T]) + Send + 'static,
    {
        if self.shared.render_thread.is_current() {
            op(&self.shared, data);
        } else {
            self.dispatch_owned(data.to_vec(), op);
        }
    }

    fn dispatch_owned<F>(&self, data: Vec<T>, op: F)
    where
        F: FnOnce(&Shared<T>, &[T]) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.shared
            .render_thread
            .run_or_enqueue(move || op(&shared, &data));
    }
}

impl<T: Pod + Send> Shared<T> {
    fn element_size() -> usize {
        std::mem::size_of::<T>()
    }

    fn byte_size(&self, count: usize) -> Result<u64, GraphicsError> {
        count
            .checked_mul(Self::element_size())
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "'{}': {} elements of {} bytes overflow the address space",
                    self.label,
                    count,
                    Self::element_size()
                ))
            })
    }

    fn allocate_now(&self, capacity: usize) -> Result<(), GraphicsError> {
        if capacity == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "'{}': cannot allocate 0 elements",
                self.label
            )));
        }

        let size = self.byte_size(capacity)?;
        self.release_now();

        let buffer = self.device.create_buffer(
            &BufferDescriptor::new(size, StructuredBuffer::<T>::USAGE).with_label(self.label.clone()),
        )?;
        let view = self.device.create_buffer_view(
            &buffer,
            BufferViewDescriptor::new(
                ElementFormat::Structured(Self::element_size() as u32),
                capacity as u64,
            )
            .with_label(self.label.clone()),
        )?;

        let mut state = self.state.lock();
        state.buffer = Some(buffer);
        state.view = Some(view);
        state.capacity = capacity;
        log::trace!("'{}': allocated {} elements", self.label, capacity);
        Ok(())
    }

    fn upload_now(&self, data: &[T]) -> Result<(), GraphicsError> {
        if data.is_empty() {
            self.release_now();
            return Ok(());
        }
        self.allocate_now(data.len())?;
        self.write(data)
    }

    fn update_now(&self, data: &[T]) -> Result<(), GraphicsError> {
        let capacity = self.state.lock().capacity;
        if data.len() > capacity {
            return Err(GraphicsError::UpdateOverflow {
                label: self.label.clone(),
                len: data.len(),
                capacity,
            });
        }
        self.write(data)
    }

    fn publish_now(&self, data: &[T]) -> Result<(), GraphicsError> {
        if data.len() > self.state.lock().capacity {
            self.upload_now(data)
        } else {
            self.update_now(data)
        }
    }

    fn release_now(&self) {
        let mut state = self.state.lock();
        if state.buffer.is_some() {
            log::trace!("'{}': released {} elements", self.label, state.capacity);
        }
        *state = StorageState::default();
    }

    fn write(&self, data: &[T]) -> Result<(), GraphicsError> {
        if data.is_empty() {
            return Ok(());
        }
        let buffer = self.state.lock().buffer.clone();
        match buffer {
            Some(buffer) => self
                .device
                .write_buffer(&buffer, 0, bytemuck::cast_slice(data)),
            None => Err(GraphicsError::Internal(format!(
                "'{}': write without storage",
                self.label
            ))),
        }
    }

    fn read_now(&self) -> Result<Vec<T>, GraphicsError> {
        let (buffer, capacity) = {
            let state = self.state.lock();
            (state.buffer.clone(), state.capacity)
        };
        match buffer {
            Some(buffer) => {
                let bytes = self.device.read_buffer(&buffer, 0, self.byte_size(capacity)?)?;
                Ok(bytemuck::pod_collect_to_vec(&bytes))
            }
            None => Ok(Vec::new()),
        }
    }

    fn report(&self, result: Result<(), GraphicsError>) {
        match result {
            Ok(()) => {}
            Err(e @ GraphicsError::UpdateOverflow { .. }) => {
                self.rejected_updates.fetch_add(1, Ordering::AcqRel);
                log::warn!("Rejected deferred update: {e}");
            }
            Err(e) => log::error!("Deferred operation on '{}' failed: {e}", self.label),
        }
    }
}

impl<T: Pod + Send> std::fmt::Debug for StructuredBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredBuffer")
            .field("label", &self.shared.label)
            .field("element_size", &std::mem::size_of::<T>())
            .field("capacity", &self.capacity())
            .finish()
    }
}

static_assertions::assert_impl_all!(StructuredBuffer<u32>: Send, Sync);
