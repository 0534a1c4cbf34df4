//! ONNX model reader

use std::fs;
use std::path::Path;

use log::debug;
use prost::Message;

use crate::error::{OnnxResult, TransformError};
use crate::proto::ModelProto;

/// Load an ONNX model from a file path
pub fn load_model<P: AsRef<Path>>(path: P) -> OnnxResult<ModelProto> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        TransformError::InvalidModel(format!("Failed to read '{}': {}", path.display(), e))
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    load_model_from_bytes(&bytes)
}

/// Decode an ONNX model from bytes
pub fn load_model_from_bytes(bytes: &[u8]) -> OnnxResult<ModelProto> {
    Ok(ModelProto::decode(bytes)?)
}

/// Summary of a model, before or after fusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub ir_version: i64,
    pub producer_name: String,
    /// Opset imports as (domain, version)
    pub opsets: Vec<(String, i64)>,
    pub graph_name: String,
    pub node_count: usize,
    pub initializer_count: usize,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl ModelInfo {
    pub fn from_model(model: &ModelProto) -> Self {
        let graph = model.graph.as_ref();

        Self {
            ir_version: model.ir_version,
            producer_name: model.producer_name.clone(),
            opsets: model
                .opset_import
                .iter()
                .map(|op| (op.domain.clone(), op.version))
                .collect(),
            graph_name: graph.map(|g| g.name.clone()).unwrap_or_default(),
            node_count: graph.map_or(0, |g| g.node.len()),
            initializer_count: graph.map_or(0, |g| g.initializer.len()),
            inputs: graph
                .map(|g| g.input.iter().map(|i| i.name.clone()).collect())
                .unwrap_or_default(),
            outputs: graph
                .map(|g| g.output.iter().map(|o| o.name.clone()).collect())
                .unwrap_or_default(),
        }
    }

    /// Number of nodes from `domain` in `model`
    pub fn count_in_domain(model: &ModelProto, domain: &str) -> usize {
        model
            .graph
            .as_ref()
            .map_or(0, |g| g.node.iter().filter(|n| n.is_in_domain(domain)).count())
    }
}
