//! Error types for partition-fuser
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Main error type for graph transformation and fusion operations
#[derive(Error, Debug)]
pub enum TransformError {
    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// Invalid model
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Shape inference failed
    #[error("Shape inference failed: {0}")]
    ShapeInferenceFailed(String),

    /// Invalid tensor data type
    #[error("Invalid data type: {0}")]
    InvalidDataType(i32),

    /// Region metadata does not describe a well-formed subgraph.
    ///
    /// Local to one region: the pass leaves that region unfused.
    #[error("Invalid descriptor for region {region}: {reason}")]
    InvalidDescriptor {
        /// Arena index of the offending region
        region: usize,
        /// What was wrong
        reason: String,
    },

    /// The device compiler rejected a region descriptor
    #[error("Compilation of fused node '{node}' failed: {source}")]
    CompilationFailed {
        /// Name of the fused node being compiled
        node: String,
        /// Error reported by the compiler
        #[source]
        source: CompileError,
    },

    /// The kernel registry rejected a fused kernel
    #[error("Kernel registration failed: {0}")]
    RegistrationFailed(String),

    /// A fused kernel could not run
    #[error("Kernel execution failed: {0}")]
    KernelExecution(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protobuf decode error
    #[error("Protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransformError {
    /// Whether this error only affects the region being fused.
    ///
    /// Region-local errors are recovered by leaving the region unfused;
    /// everything else aborts the pass.
    pub fn is_region_local(&self) -> bool {
        matches!(self, TransformError::InvalidDescriptor { .. })
    }
}

/// Error reported by a [`DeviceCompiler`](crate::descriptor::DeviceCompiler)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CompileError {
    message: String,
}

impl CompileError {
    /// Create a compile error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The compiler's message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type alias for ONNX operations
pub type OnnxResult<T> = Result<T, TransformError>;
