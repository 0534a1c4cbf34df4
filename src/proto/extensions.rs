//! Extension methods for ONNX protobuf types
//!
//! Provides convenient helper methods for working with ONNX protobuf types.

use super::onnx::*;

// ============================================================================
// ModelProto extensions
// ============================================================================

impl ModelProto {
    /// Get the opset version imported for a domain ("" is the default domain)
    pub fn get_opset_version(&self, domain: &str) -> Option<i64> {
        self.opset_import
            .iter()
            .find(|op| op.domain == domain)
            .map(|op| op.version)
    }

    /// Import `domain` at `version` unless the model already imports it
    pub fn ensure_opset_import(&mut self, domain: &str, version: i64) {
        if self.get_opset_version(domain).is_none() {
            self.opset_import.push(OperatorSetIdProto {
                domain: domain.to_string(),
                version,
            });
        }
    }

    /// Get mutable reference to graph, creating if necessary
    pub fn graph_mut(&mut self) -> &mut GraphProto {
        self.graph.get_or_insert_with(GraphProto::default)
    }
}

// ============================================================================
// NodeProto extensions
// ============================================================================

impl NodeProto {
    /// Check if the node belongs to `domain`.
    ///
    /// The empty string and `ai.onnx` both denote the default domain.
    pub fn is_in_domain(&self, domain: &str) -> bool {
        let normalize = |d: &str| if d == "ai.onnx" { "" } else { d }.to_string();
        normalize(&self.domain) == normalize(domain)
    }

    /// Non-empty input names, in order
    pub fn live_inputs(&self) -> impl Iterator<Item = &String> {
        self.input.iter().filter(|name| !name.is_empty())
    }

    /// Non-empty output names, in order
    pub fn live_outputs(&self) -> impl Iterator<Item = &String> {
        self.output.iter().filter(|name| !name.is_empty())
    }
}

// ============================================================================
// ValueInfoProto extensions
// ============================================================================

impl ValueInfoProto {
    /// Get the shape dimensions if available (symbolic dims become -1)
    pub fn get_shape(&self) -> Option<Vec<i64>> {
        match self.r#type.as_ref()?.value.as_ref()? {
            type_proto::Value::TensorType(tensor) => tensor.shape.as_ref().map(|s| {
                s.dim
                    .iter()
                    .map(|d| match &d.value {
                        Some(tensor_shape_proto::dimension::Value::DimValue(v)) => *v,
                        Some(tensor_shape_proto::dimension::Value::DimParam(_)) | None => -1,
                    })
                    .collect()
            }),
        }
    }

}

// ============================================================================
// Helper functions
// ============================================================================

/// Create a new ValueInfoProto for a tensor
pub fn make_tensor_value_info(name: &str, elem_type: i32, shape: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: Some(TensorShapeProto {
                    dim: shape
                        .iter()
                        .map(|&d| tensor_shape_proto::Dimension {
                            value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
                            denotation: String::new(),
                        })
                        .collect(),
                }),
            })),
            denotation: String::new(),
        }),
        doc_string: String::new(),
    }
}

/// Create a new NodeProto in the default domain
pub fn make_node(op_type: &str, inputs: &[&str], outputs: &[&str], name: &str) -> NodeProto {
    NodeProto {
        op_type: op_type.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// Create a float initializer with the given dims and values
pub fn make_initializer(name: &str, dims: &[i64], values: &[f32]) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: dims.to_vec(),
        data_type: tensor_proto::DataType::Float as i32,
        float_data: values.to_vec(),
        ..Default::default()
    }
}
