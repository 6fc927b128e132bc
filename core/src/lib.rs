//! # FEMFX Core
//!
//! GPU-agnostic data model for meshes skinned to a tetrahedral simulation.

pub mod math;
pub mod mesh;
pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup.
pub fn init() {
    log::info!("FEMFX Core v{} initialized", VERSION);
}
