//! ONNX model writer

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
use prost::Message;

use crate::error::{OnnxResult, TransformError};
use crate::proto::ModelProto;

/// Save an ONNX model to a file
pub fn save_model<P: AsRef<Path>>(model: &ModelProto, path: P) -> OnnxResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        TransformError::InvalidModel(format!("Failed to create '{}': {}", path.display(), e))
    })?;

    let bytes = model_to_bytes(model);
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Encode an ONNX model to bytes
pub fn model_to_bytes(model: &ModelProto) -> Vec<u8> {
    model.encode_to_vec()
}

/// Size of the encoded model in bytes
pub fn model_size(model: &ModelProto) -> usize {
    model.encoded_len()
}
