//! Tensor utilities for ONNX models
//!
//! This module provides utilities for working with ONNX tensors:
//! - Data type mappings (`dtype`)
//! - Shape utilities (`shape`)
//! - Conversion between TensorProto and ndarray (`convert`)
//!
//! # Example
//!
//! ```ignore
//! use partition_fuser::tensor::{tensor_to_array_f32, array_to_tensor_f32};
//!
//! let array = tensor_to_array_f32(&tensor)?;
//! let output = array_to_tensor_f32(&array.mapv(f32::exp), "output");
//! ```

pub mod convert;
pub mod dtype;
pub mod shape;

// Re-export commonly used items
pub use convert::{array_to_tensor_f32, tensor_byte_size, tensor_to_array_f32};
pub use dtype::{dtype_size, i32_to_dtype};
pub use shape::{is_dynamic, numel, static_shape};
