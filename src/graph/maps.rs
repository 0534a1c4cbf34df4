//! Graph map types and builders
//!
//! Defines the core data structures for efficient graph traversal.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::proto::{GraphProto, NodeProto, TensorProto, ValueInfoProto};

/// Entry in the node map - tracks a node and whether it is a staged placeholder
#[derive(Debug, Clone)]
pub struct OpEntry {
    /// The node itself
    pub node: NodeProto,
    /// Staged by a fusion transaction but not yet committed.
    ///
    /// Placeholders consume their inputs but do not own their outputs, and
    /// are skipped when the graph is built.
    pub placeholder: bool,
}

impl OpEntry {
    /// Create a new committed entry with the given node
    pub fn new(node: NodeProto) -> Self {
        Self {
            node,
            placeholder: false,
        }
    }

    /// Create a staged placeholder entry
    pub fn placeholder(node: NodeProto) -> Self {
        Self {
            node,
            placeholder: true,
        }
    }
}

/// Type alias for producer map: output_name → node_name
pub type ProducerMap = FxHashMap<String, String>;

/// Type alias for consumer map: tensor_name → [consumer_node_names]
/// SmallVec optimized for common case of 1-4 consumers
pub type ConsumerMap = FxHashMap<String, SmallVec<[String; 4]>>;

/// Type alias for node map: node_name → OpEntry (order preserved)
pub type NodeMap = IndexMap<String, OpEntry>;

/// Type alias for initializer map: name → TensorProto (order preserved)
pub type InitializerMap = IndexMap<String, TensorProto>;

/// Type alias for value info map: name → ValueInfoProto
pub type ValueInfoMap = FxHashMap<String, ValueInfoProto>;

/// Type alias for graph input/output maps, in declaration order
pub type GraphIoMap = IndexMap<String, ValueInfoProto>;

/// Build producer map from graph nodes
///
/// Maps each output tensor name to the node that produces it.
pub fn build_producer_map(graph: &GraphProto) -> ProducerMap {
    let mut map = FxHashMap::default();

    for node in &graph.node {
        for output in node.live_outputs() {
            map.insert(output.clone(), node.name.clone());
        }
    }

    map
}

/// Build consumer map from graph nodes
///
/// Maps each tensor name to the list of nodes that consume it. A node that
/// reads the same tensor twice is listed once.
pub fn build_consumer_map(graph: &GraphProto) -> ConsumerMap {
    let mut map: ConsumerMap = FxHashMap::default();

    for node in &graph.node {
        for input in node.live_inputs() {
            let consumers = map.entry(input.clone()).or_default();
            if !consumers.contains(&node.name) {
                consumers.push(node.name.clone());
            }
        }
    }

    map
}

/// Build node map from graph nodes
///
/// Preserves node order using IndexMap.
pub fn build_node_map(graph: &GraphProto) -> NodeMap {
    graph
        .node
        .iter()
        .map(|node| (node.name.clone(), OpEntry::new(node.clone())))
        .collect()
}

/// Build initializer map from graph
pub fn build_initializer_map(graph: &GraphProto) -> InitializerMap {
    graph
        .initializer
        .iter()
        .map(|t| (t.name.clone(), t.clone()))
        .collect()
}

/// Build value info map from graph
///
/// Combines graph inputs, outputs, and intermediate value_info.
pub fn build_value_info_map(graph: &GraphProto) -> ValueInfoMap {
    graph
        .input
        .iter()
        .chain(&graph.output)
        .chain(&graph.value_info)
        .map(|vi| (vi.name.clone(), vi.clone()))
        .collect()
}

/// Build graph input map
pub fn build_graph_input_map(graph: &GraphProto) -> GraphIoMap {
    graph
        .input
        .iter()
        .map(|vi| (vi.name.clone(), vi.clone()))
        .collect()
}

/// Build graph output map
pub fn build_graph_output_map(graph: &GraphProto) -> GraphIoMap {
    graph
        .output
        .iter()
        .map(|vi| (vi.name.clone(), vi.clone()))
        .collect()
}
