//! Graphics error types.

use std::fmt;

use femfx_core::mesh::TopologyError;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An owner-thread operation was called from another thread.
    WrongThread(&'static str),
    /// An in-place update is larger than the allocated capacity.
    UpdateOverflow {
        label: String,
        len: usize,
        capacity: usize,
    },
    /// A vertex layout without a position stream was supplied.
    MissingPositionStream,
    /// A vertex layout uses an unsupported attribute encoding.
    InvalidVertexLayout(String),
    /// Attachment tables failed validation.
    InvalidTopology(TopologyError),
    /// Shader source could not be parsed for reflection.
    ShaderReflection(String),
    /// The render thread has shut down.
    RenderThreadGone,
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::WrongThread(op) => write!(f, "{op} must run on the render thread"),
            Self::UpdateOverflow {
                label,
                len,
                capacity,
            } => write!(
                f,
                "update of {len} elements exceeds capacity {capacity} of '{label}'"
            ),
            Self::MissingPositionStream => write!(f, "vertex layout has no position stream"),
            Self::InvalidVertexLayout(msg) => write!(f, "invalid vertex layout: {msg}"),
            Self::InvalidTopology(err) => write!(f, "invalid topology: {err}"),
            Self::ShaderReflection(msg) => write!(f, "shader reflection failed: {msg}"),
            Self::RenderThreadGone => write!(f, "render thread has shut down"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidTopology(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TopologyError> for GraphicsError {
    fn from(err: TopologyError) -> Self {
        Self::InvalidTopology(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::MissingPositionStream;
        assert_eq!(err.to_string(), "vertex layout has no position stream");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");

        let err = GraphicsError::UpdateOverflow {
            label: "offsets".to_string(),
            len: 150,
            capacity: 100,
        };
        assert_eq!(
            err.to_string(),
            "update of 150 elements exceeds capacity 100 of 'offsets'"
        );
    }

    #[test]
    fn test_topology_error_source() {
        use std::error::Error;

        let err: GraphicsError = TopologyError::IncompleteTriangle { index_count: 4 }.into();
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("invalid topology"));
    }
}
