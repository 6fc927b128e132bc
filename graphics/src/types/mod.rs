//! Common types and descriptors for graphics resources.
//!
//! This module contains usage flags, element formats and descriptor structs
//! used throughout the graphics system.

mod buffer;

pub use buffer::{BufferDescriptor, BufferUsage, BufferViewDescriptor, ElementFormat};
