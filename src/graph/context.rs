//! Graph context for ONNX model manipulation
//!
//! `GraphContext` is the central structure for working with ONNX graphs.
//! It maintains efficient maps for node lookup, traversal, and manipulation.

use crate::error::{OnnxResult, TransformError};
use crate::proto::{GraphProto, ModelProto, NodeProto, TensorProto};

use super::maps::{
    build_consumer_map, build_graph_input_map, build_graph_output_map, build_initializer_map,
    build_node_map, build_producer_map, build_value_info_map, ConsumerMap, GraphIoMap,
    InitializerMap, NodeMap, ProducerMap, ValueInfoMap,
};

/// Graph context for efficient graph operations
///
/// Provides O(1) lookups for nodes, tensors, and their relationships. The
/// fusion pass holds it by `&mut` for its whole run.
#[derive(Debug, Clone)]
pub struct GraphContext {
    /// Maps output tensor name → producer node name
    pub producer_map: ProducerMap,

    /// Maps tensor name → consumer node names
    pub consumer_map: ConsumerMap,

    /// Maps node name → OpEntry (preserves insertion order)
    pub node_map: NodeMap,

    /// Maps initializer name → TensorProto
    pub initializer_map: InitializerMap,

    /// Maps tensor name → ValueInfoProto (inputs + outputs + value_info)
    pub value_info_map: ValueInfoMap,

    /// Maps graph input name → ValueInfoProto
    pub graph_input_map: GraphIoMap,

    /// Maps graph output name → ValueInfoProto
    pub graph_output_map: GraphIoMap,
}

impl GraphContext {
    /// Create a new GraphContext from a GraphProto
    pub fn new(graph: &GraphProto) -> Self {
        Self {
            producer_map: build_producer_map(graph),
            consumer_map: build_consumer_map(graph),
            node_map: build_node_map(graph),
            initializer_map: build_initializer_map(graph),
            value_info_map: build_value_info_map(graph),
            graph_input_map: build_graph_input_map(graph),
            graph_output_map: build_graph_output_map(graph),
        }
    }

    /// Create from a ModelProto
    pub fn from_model(model: &ModelProto) -> OnnxResult<Self> {
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| TransformError::MissingField("model.graph".to_string()))?;

        Ok(Self::new(graph))
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by name
    pub fn get_node(&self, name: &str) -> Option<&NodeProto> {
        self.node_map.get(name).map(|e| &e.node)
    }

    /// Check if a node exists (placeholders included)
    pub fn has_node(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    /// Get the number of nodes (placeholders included)
    pub fn node_count(&self) -> usize {
        self.node_map.len()
    }

    /// Iterate over node names in insertion order
    pub fn node_names(&self) -> impl Iterator<Item = &String> {
        self.node_map.keys()
    }

    /// Whether `name` is a staged placeholder
    pub fn is_placeholder(&self, name: &str) -> bool {
        self.node_map
            .get(name)
            .map(|e| e.placeholder)
            .unwrap_or(false)
    }

    // ========================================================================
    // Graph traversal
    // ========================================================================

    /// Get the producer node name for a tensor
    pub fn get_producer_name(&self, tensor_name: &str) -> Option<&String> {
        self.producer_map.get(tensor_name)
    }

    /// Get consumer node names for a tensor
    pub fn get_consumer_names(&self, tensor_name: &str) -> Option<&[String]> {
        self.consumer_map.get(tensor_name).map(|v| v.as_slice())
    }

    /// Check if a tensor is a graph input
    pub fn is_graph_input(&self, name: &str) -> bool {
        self.graph_input_map.contains_key(name)
    }

    /// Check if a tensor is a graph output
    pub fn is_graph_output(&self, name: &str) -> bool {
        self.graph_output_map.contains_key(name)
    }

    /// Check if a tensor is an initializer
    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializer_map.contains_key(name)
    }

    // ========================================================================
    // Initializer accessors
    // ========================================================================

    /// Get initializer by name
    pub fn get_initializer(&self, name: &str) -> Option<&TensorProto> {
        self.initializer_map.get(name)
    }
}
