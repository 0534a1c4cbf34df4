//! Tensor conversion utilities
//!
//! Convert between ONNX TensorProto and ndarray types.

use ndarray::{Array, ArrayD, IxDyn};

use crate::error::{OnnxResult, TransformError};
use crate::proto::tensor_proto::DataType;
use crate::proto::TensorProto;

use super::dtype::{dtype_size, i32_to_dtype};
use super::shape::numel;

/// Convert TensorProto to f32 ndarray
///
/// This handles both raw_data and typed data fields.
pub fn tensor_to_array_f32(tensor: &TensorProto) -> OnnxResult<ArrayD<f32>> {
    let dtype = i32_to_dtype(tensor.data_type)?;
    let shape: Vec<usize> = tensor.dims.iter().map(|&d| d.max(0) as usize).collect();
    let expected_len = numel(&tensor.dims);

    let data: Vec<f32> = if !tensor.raw_data.is_empty() {
        decode_raw_to_f32(&tensor.raw_data, dtype, expected_len)?
    } else {
        match dtype {
            DataType::Float => tensor.float_data.clone(),
            DataType::Double => tensor.double_data.iter().map(|&v| v as f32).collect(),
            DataType::Int32 => tensor.int32_data.iter().map(|&v| v as f32).collect(),
            DataType::Int64 => tensor.int64_data.iter().map(|&v| v as f32).collect(),
            _ => return Err(TransformError::InvalidDataType(tensor.data_type)),
        }
    };

    if data.len() != expected_len {
        return Err(TransformError::ShapeInferenceFailed(format!(
            "Data length {} does not match shape {:?} (expected {})",
            data.len(),
            tensor.dims,
            expected_len
        )));
    }

    Array::from_shape_vec(IxDyn(&shape), data).map_err(|e| TransformError::Internal(e.to_string()))
}

/// Create TensorProto from f32 array
pub fn array_to_tensor_f32(array: &ArrayD<f32>, name: &str) -> TensorProto {
    TensorProto {
        dims: array.shape().iter().map(|&d| d as i64).collect(),
        data_type: DataType::Float as i32,
        float_data: array.iter().copied().collect(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// Approximate in-memory payload size of a tensor in bytes
///
/// Uses the element type width when known, otherwise the raw buffer length.
pub fn tensor_byte_size(tensor: &TensorProto) -> usize {
    if !tensor.raw_data.is_empty() {
        return tensor.raw_data.len();
    }
    i32_to_dtype(tensor.data_type)
        .and_then(dtype_size)
        .map(|width| width * numel(&tensor.dims))
        .unwrap_or(0)
}

fn decode_raw_to_f32(raw: &[u8], dtype: DataType, expected: usize) -> OnnxResult<Vec<f32>> {
    let elem_size = dtype_size(dtype)?;
    if raw.len() != expected * elem_size {
        return Err(TransformError::ShapeInferenceFailed(format!(
            "Raw data size {} does not match expected {} * {}",
            raw.len(),
            expected,
            elem_size
        )));
    }

    match dtype {
        DataType::Float => Ok(raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()),
        DataType::Int32 => Ok(raw
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
            .collect()),
        DataType::Int64 => Ok(raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect()),
        _ => Err(TransformError::InvalidDataType(dtype as i32)),
    }
}
