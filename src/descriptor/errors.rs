//! # Descriptor Errors

use thiserror::Error;

/// Result type for descriptor operations
pub type DescriptorResult<T> = Result<T, DescriptorError>;

/// Descriptor errors
///
/// Per-record variants (`Decode`, `Creation`, `HandlerPanic`) are counted
/// inside a generation and never cross the worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Parent cell could not be decoded into the handler's object type
    #[error("Cannot decode parent object: {0}")]
    Decode(String),

    /// Handler failed to create a descriptor from a decoded object
    #[error("Descriptor creation failed: {0}")]
    Creation(String),

    /// Encoded descriptor text is malformed
    #[error("Malformed encoded descriptor: {0}")]
    Encoding(String),

    /// Handler panicked while processing one record
    #[error("Descriptor handler panicked: {0}")]
    HandlerPanic(String),

    /// A worker thread could not be started
    #[error("Failed to spawn descriptor worker: {0}")]
    SpawnFailed(String),

    /// Computation was stopped before it completed
    #[error("Descriptor computation cancelled")]
    Cancelled,
}

impl DescriptorError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            DescriptorError::Decode(_) => "CT_DESCRIPTOR_DECODE",
            DescriptorError::Creation(_) => "CT_DESCRIPTOR_CREATION",
            DescriptorError::Encoding(_) => "CT_DESCRIPTOR_ENCODING",
            DescriptorError::HandlerPanic(_) => "CT_DESCRIPTOR_PANIC",
            DescriptorError::SpawnFailed(_) => "CT_DESCRIPTOR_SPAWN",
            DescriptorError::Cancelled => "CT_DESCRIPTOR_CANCELLED",
        }
    }

    /// True for failures scoped to a single record
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            DescriptorError::Decode(_) | DescriptorError::Creation(_) | DescriptorError::HandlerPanic(_)
        )
    }
}
