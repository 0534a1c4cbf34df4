//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding, removing and staging
//! nodes, and moving initializers out of the host store.

use crate::error::{OnnxResult, TransformError};
use crate::proto::{NodeProto, TensorProto};

use super::context::GraphContext;
use super::maps::OpEntry;

impl GraphContext {
    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Insert a new committed node into the graph
    ///
    /// Updates all relevant maps. The node claims its outputs.
    pub fn insert_node(&mut self, node: NodeProto) -> OnnxResult<()> {
        self.check_insertable(&node)?;
        self.link_inputs(&node);
        for output in node.live_outputs() {
            self.producer_map.insert(output.clone(), node.name.clone());
        }
        self.node_map.insert(node.name.clone(), OpEntry::new(node));
        Ok(())
    }

    /// Stage a placeholder node
    ///
    /// The placeholder is registered as a consumer of its inputs but does not
    /// claim its outputs; their current producers stay in place until
    /// [`commit_placeholder`](Self::commit_placeholder).
    pub fn insert_placeholder(&mut self, node: NodeProto) -> OnnxResult<()> {
        self.check_insertable(&node)?;
        self.link_inputs(&node);
        self.node_map
            .insert(node.name.clone(), OpEntry::placeholder(node));
        Ok(())
    }

    /// Turn a staged placeholder into a committed node that owns its outputs
    pub fn commit_placeholder(&mut self, name: &str) -> OnnxResult<()> {
        let entry = self
            .node_map
            .get_mut(name)
            .filter(|e| e.placeholder)
            .ok_or_else(|| TransformError::InvalidNode(format!("no placeholder named '{name}'")))?;
        entry.placeholder = false;

        let outputs: Vec<String> = entry.node.live_outputs().cloned().collect();
        for output in outputs {
            self.producer_map.insert(output, name.to_string());
        }
        Ok(())
    }

    /// Remove a node from the graph
    ///
    /// Node order of the remaining entries is preserved. Output producers are
    /// only dropped when this node owns them, so removing a placeholder never
    /// disturbs the nodes it was staged to replace.
    pub fn remove_node(&mut self, name: &str) -> Option<NodeProto> {
        let entry = self.node_map.shift_remove(name)?;
        let node = entry.node;

        for output in node.live_outputs() {
            if self.producer_map.get(output).map(String::as_str) == Some(name) {
                self.producer_map.remove(output);
            }
        }

        for input in node.live_inputs() {
            self.remove_consumer(input, name);
        }

        Some(node)
    }

    // ========================================================================
    // Initializer mutation
    // ========================================================================

    /// Add or update an initializer
    pub fn set_initializer(&mut self, tensor: TensorProto) {
        let name = tensor.name.clone();
        self.initializer_map.insert(name, tensor);
    }

    /// Move an initializer out of the host store
    ///
    /// Returns `None` when the tensor is not (or no longer) present, so
    /// extracting twice is harmless.
    pub fn extract_initializer(&mut self, name: &str) -> Option<TensorProto> {
        self.initializer_map.shift_remove(name)
    }

    // ========================================================================
    // Map update helpers
    // ========================================================================

    /// Add a consumer to a tensor
    pub fn add_consumer(&mut self, tensor_name: &str, node_name: &str) {
        let consumers = self
            .consumer_map
            .entry(tensor_name.to_string())
            .or_default();
        if !consumers.iter().any(|n| n == node_name) {
            consumers.push(node_name.to_string());
        }
    }

    /// Remove a consumer from a tensor
    pub fn remove_consumer(&mut self, tensor_name: &str, node_name: &str) {
        if let Some(consumers) = self.consumer_map.get_mut(tensor_name) {
            consumers.retain(|n| n != node_name);
            if consumers.is_empty() {
                self.consumer_map.remove(tensor_name);
            }
        }
    }

    fn link_inputs(&mut self, node: &NodeProto) {
        for input in node.live_inputs() {
            self.add_consumer(input, &node.name);
        }
    }

    fn check_insertable(&self, node: &NodeProto) -> OnnxResult<()> {
        if node.name.is_empty() {
            return Err(TransformError::InvalidNode(format!(
                "{} node has no name",
                node.op_type
            )));
        }
        if self.has_node(&node.name) {
            return Err(TransformError::InvalidNode(format!(
                "node '{}' already exists",
                node.name
            )));
        }
        Ok(())
    }
}
