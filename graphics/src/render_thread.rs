//! The render thread: sole owner of GPU resource mutation.
//!
//! Every object that is visible to draws (structured buffers, vertex
//! bindings, section vertex buffers) is mutated only on this thread. Callers
//! on other threads copy their arguments into a closure and enqueue it; the
//! thread runs closures in submission order. [`RenderThreadHandle::flush`] is
//! the frame boundary: once it returns, everything enqueued before it has run.
//!
//! # Example
//!
//! ```ignore
//! let render_thread = RenderThread::spawn(RenderThreadConfig::default())?;
//! let handle = render_thread.handle();
//!
//! handle.run_or_enqueue(|| log::info!("runs on the render thread"));
//! handle.flush()?;
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use femfx_core::{frame_mark, profile_plot, profile_scope, set_thread_name};
use parking_lot::RwLock;

use crate::error::GraphicsError;

/// Type-erased work closure sent to the render thread.
pub type RenderCommand = Box<dyn FnOnce() + Send + 'static>;

enum RenderMessage {
    Run(RenderCommand),
    Shutdown,
}

/// Configuration of the render thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderThreadConfig {
    /// OS thread name, also used as the profiler thread name.
    pub name: String,
}

impl Default for RenderThreadConfig {
    fn default() -> Self {
        Self {
            name: "femfx-render".to_string(),
        }
    }
}

impl RenderThreadConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Cloneable handle used to submit work to the render thread.
#[derive(Clone)]
pub struct RenderThreadHandle {
    sender: mpsc::Sender<RenderMessage>,
    thread_id: ThreadId,
    pending: Arc<AtomicUsize>,
    // Set under the write lock before the final drain; sends hold the read lock.
    closed: Arc<RwLock<bool>>,
}

impl RenderThreadHandle {
    /// Check whether the caller is running on the render thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Number of commands submitted but not yet finished.
    pub fn pending_commands(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Queue a command behind everything already submitted.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::RenderThreadGone`] if the thread has shut down.
    pub fn enqueue<F>(&self, command: F) -> Result<(), GraphicsError>
    where
        F: FnOnce() + Send + 'static,
    {
        let closed = self.closed.read();
        if *closed {
            return Err(GraphicsError::RenderThreadGone);
        }
        let depth = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        profile_plot!("render_queue_depth", depth);
        self.sender
            .send(RenderMessage::Run(Box::new(command)))
            .map_err(|_| {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                GraphicsError::RenderThreadGone
            })
    }

    /// Run `command` now if called on the render thread, otherwise enqueue it.
    ///
    /// A command that cannot be enqueued is dropped with a warning; deferred
    /// callers have no one to report to.
    pub fn run_or_enqueue<F>(&self, command: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_current() {
            command();
        } else if let Err(e) = self.enqueue(command) {
            log::warn!("Dropping render command: {e}");
        }
    }

    /// Like [`run_or_enqueue`](Self::run_or_enqueue), but reports a render
    /// thread that has shut down.
    pub fn submit<F>(&self, command: F) -> Result<(), GraphicsError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_current() {
            command();
            Ok(())
        } else {
            self.enqueue(command)
        }
    }

    /// Run `f` on the render thread and wait for its result.
    ///
    /// Runs inline when already on the render thread.
    pub fn execute_blocking<F, R>(&self, f: F) -> Result<R, GraphicsError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(f());
        }

        let (result_tx, result_rx) = mpsc::sync_channel::<R>(1);
        self.enqueue(move || {
            let _ = result_tx.send(f());
        })?;
        // A panicking command drops the sender without sending.
        result_rx.recv().map_err(|_| GraphicsError::RenderThreadGone)
    }

    /// Wait until every command submitted before this call has run.
    ///
    /// This is the frame boundary. Called on the render thread itself it only
    /// marks the frame, since the caller is one of the queued commands.
    pub fn flush(&self) -> Result<(), GraphicsError> {
        self.execute_blocking(|| {
            frame_mark!();
        })
    }
}

impl std::fmt::Debug for RenderThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderThreadHandle")
            .field("thread_id", &self.thread_id)
            .field("pending", &self.pending_commands())
            .finish()
    }
}

static_assertions::assert_impl_all!(RenderThreadHandle: Send, Sync);

/// Owner of the render thread.
///
/// Dropping it runs every command already queued, then joins the thread.
pub struct RenderThread {
    handle: RenderThreadHandle,
    join: Option<JoinHandle<()>>,
}

impl RenderThread {
    /// Start the render thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(config: RenderThreadConfig) -> Result<Self, GraphicsError> {
        let (sender, receiver) = mpsc::channel::<RenderMessage>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let closed = Arc::new(RwLock::new(false));
        let worker_closed = Arc::clone(&closed);
        let name = config.name.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                set_thread_name!("femfx-render");
                log::debug!("Render thread '{name}' started");
                render_loop(&receiver, &worker_pending, &worker_closed);
                log::debug!("Render thread '{name}' stopped");
            })
            .map_err(|e| {
                GraphicsError::InitializationFailed(format!("failed to spawn render thread: {e}"))
            })?;

        let handle = RenderThreadHandle {
            sender,
            thread_id: join.thread().id(),
            pending,
            closed,
        };

        Ok(Self {
            handle,
            join: Some(join),
        })
    }

    /// Get a handle for submitting work.
    pub fn handle(&self) -> RenderThreadHandle {
        self.handle.clone()
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        let _ = self.handle.sender.send(RenderMessage::Shutdown);
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            log::error!("Render thread panicked during shutdown");
        }
    }
}

impl std::fmt::Debug for RenderThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderThread")
            .field("handle", &self.handle)
            .finish()
    }
}

fn render_loop(
    receiver: &mpsc::Receiver<RenderMessage>,
    pending: &AtomicUsize,
    closed: &RwLock<bool>,
) {
    while let Ok(message) = receiver.recv() {
        match message {
            RenderMessage::Run(command) => run_command(command, pending),
            RenderMessage::Shutdown => break,
        }
    }

    // No send can start after this, so the drain below sees every accepted command.
    *closed.write() = true;

    // Commands sent by other handles after shutdown was requested.
    while let Ok(message) = receiver.try_recv() {
        if let RenderMessage::Run(command) = message {
            run_command(command, pending);
        }
    }
}

fn run_command(command: RenderCommand, pending: &AtomicUsize) {
    profile_scope!("render_command");
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(command)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("Render command panicked: {message}");
    }
    pending.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_commands_run_in_order_on_render_thread() {
        let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
        let handle = render_thread.handle();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let log = Arc::clone(&log);
            let inner = handle.clone();
            handle
                .enqueue(move || {
                    assert!(inner.is_current());
                    log.lock().unwrap().push(i);
                })
                .unwrap();
        }
        handle.flush().unwrap();

        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(handle.pending_commands(), 0);
        assert!(!handle.is_current());
    }

    #[test]
    fn test_execute_blocking_returns_value() {
        let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
        let handle = render_thread.handle();
        let inner = handle.clone();
        assert_eq!(handle.execute_blocking(move || inner.is_current()), Ok(true));
    }

    #[test]
    fn test_run_or_enqueue_inline_on_render_thread() {
        let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
        let handle = render_thread.handle();
        let inner = handle.clone();

        let order = handle
            .execute_blocking(move || {
                let order = Arc::new(Mutex::new(Vec::new()));
                let o = Arc::clone(&order);
                inner.run_or_enqueue(move || o.lock().unwrap().push("inline"));
                order.lock().unwrap().push("after");
                let result = order.lock().unwrap().clone();
                result
            })
            .unwrap();
        assert_eq!(order, vec!["inline", "after"]);
    }

    #[test]
    fn test_panicking_command_is_contained() {
        let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
        let handle = render_thread.handle();

        handle.enqueue(|| panic!("boom")).unwrap();
        assert_eq!(
            handle.execute_blocking(|| -> u32 { panic!("boom") }),
            Err(GraphicsError::RenderThreadGone)
        );
        assert_eq!(handle.execute_blocking(|| 7), Ok(7));
    }

    #[test]
    fn test_drop_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = {
            let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
            let handle = render_thread.handle();
            for _ in 0..5 {
                let counter = Arc::clone(&counter);
                handle
                    .enqueue(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
            handle
        };
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(handle.enqueue(|| {}), Err(GraphicsError::RenderThreadGone));
        assert_eq!(handle.flush(), Err(GraphicsError::RenderThreadGone));
    }

    #[test]
    fn test_accepted_commands_run_across_shutdown() {
        let render_thread = RenderThread::spawn(RenderThreadConfig::default()).unwrap();
        let handle = render_thread.handle();
        let ran = Arc::new(AtomicUsize::new(0));

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                let ran = Arc::clone(&ran);
                thread::spawn(move || {
                    let mut accepted = 0;
                    for _ in 0..2000 {
                        let ran = Arc::clone(&ran);
                        let result = handle.enqueue(move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                        });
                        match result {
                            Ok(()) => accepted += 1,
                            Err(_) => break,
                        }
                    }
                    accepted
                })
            })
            .collect();

        drop(render_thread);
        let accepted: usize = senders.into_iter().map(|s| s.join().unwrap()).sum();

        assert_eq!(ran.load(Ordering::SeqCst), accepted);
        assert_eq!(handle.pending_commands(), 0);
        assert_eq!(handle.enqueue(|| {}), Err(GraphicsError::RenderThreadGone));
    }
}
