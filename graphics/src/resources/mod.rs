//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer
//! - [`BufferView`] - Typed read-only view of a buffer range
//! - [`NullColorBuffer`] - Shared zero-stride white color stream
//!
//! Resources are reference-counted with [`Arc`] and can be shared across threads.
//! Each buffer holds a weak reference back to its parent device.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Arc`]: std::sync::Arc

mod buffer;
mod null_color;
mod view;

pub use buffer::{Buffer, BufferId};
pub use null_color::{NULL_COLOR, NullColorBuffer};
pub use view::BufferView;
