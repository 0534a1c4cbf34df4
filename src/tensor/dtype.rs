//! ONNX data type mappings
//!
//! Maps between ONNX TensorProto data types and Rust types.

use crate::error::{OnnxResult, TransformError};
use crate::proto::tensor_proto::DataType;

/// Size in bytes for each fixed-width ONNX data type
pub fn dtype_size(dtype: DataType) -> OnnxResult<usize> {
    match dtype {
        DataType::Uint8 | DataType::Int8 | DataType::Bool => Ok(1),
        DataType::Uint16 | DataType::Int16 | DataType::Float16 | DataType::Bfloat16 => Ok(2),
        DataType::Float | DataType::Int32 | DataType::Uint32 => Ok(4),
        DataType::Int64 | DataType::Uint64 | DataType::Double | DataType::Complex64 => Ok(8),
        DataType::Complex128 => Ok(16),
        DataType::Undefined | DataType::String => Err(TransformError::InvalidDataType(dtype as i32)),
    }
}

/// Convert i32 to DataType enum
pub fn i32_to_dtype(value: i32) -> OnnxResult<DataType> {
    DataType::try_from(value).map_err(|_| TransformError::InvalidDataType(value))
}
