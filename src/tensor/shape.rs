//! Shape utilities for ONNX tensors

/// Calculate total number of elements from shape
pub fn numel(shape: &[i64]) -> usize {
    shape.iter().map(|&d| d.max(0) as usize).product()
}

/// Check if shape contains dynamic dimensions (negative values)
pub fn is_dynamic(shape: &[i64]) -> bool {
    shape.iter().any(|&d| d < 0)
}

/// The shape itself if it is fully known, `None` otherwise
pub fn static_shape(shape: &[i64]) -> Option<Vec<i64>> {
    (!is_dynamic(shape)).then(|| shape.to_vec())
}
