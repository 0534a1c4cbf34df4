//! Graph analysis methods
//!
//! Ordering and shape queries used by partitioning and descriptor building.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::error::{OnnxResult, TransformError};
use crate::proto::NodeProto;
use crate::tensor::static_shape;

use super::context::GraphContext;

impl GraphContext {
    /// Position of a node in insertion order
    pub fn node_position(&self, name: &str) -> Option<usize> {
        self.node_map.get_index_of(name)
    }

    /// Names of the distinct nodes producing `node`'s inputs
    pub fn producer_names<'a>(&'a self, node: &'a NodeProto) -> Vec<&'a str> {
        let mut producers: Vec<&str> = Vec::new();
        for input in node.live_inputs() {
            if let Some(producer) = self.producer_map.get(input) {
                if producer != &node.name && !producers.contains(&producer.as_str()) {
                    producers.push(producer);
                }
            }
        }
        producers
    }

    /// Get the topological order of nodes (Kahn's algorithm)
    ///
    /// Ready nodes are emitted lowest insertion position first, so the order
    /// is reproducible for a given graph. Fails if the graph has a cycle.
    pub fn topological_order(&self) -> OnnxResult<Vec<&str>> {
        let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
        let mut successors: FxHashMap<&str, Vec<&str>> = FxHashMap::default();

        for (name, entry) in &self.node_map {
            let producers = self.producer_names(&entry.node);
            in_degree.insert(name.as_str(), producers.len());
            for producer in producers {
                successors.entry(producer).or_default().push(name.as_str());
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = self
            .node_map
            .keys()
            .enumerate()
            .filter(|(_, name)| in_degree.get(name.as_str()) == Some(&0))
            .map(|(pos, _)| Reverse(pos))
            .collect();

        let mut order = Vec::with_capacity(self.node_map.len());
        while let Some(Reverse(pos)) = ready.pop() {
            let Some((name, _)) = self.node_map.get_index(pos) else {
                continue;
            };
            order.push(name.as_str());

            for succ in successors.get(name.as_str()).into_iter().flatten() {
                if let Some(count) = in_degree.get_mut(succ) {
                    *count -= 1;
                    if *count == 0 {
                        if let Some(succ_pos) = self.node_position(succ) {
                            ready.push(Reverse(succ_pos));
                        }
                    }
                }
            }
        }

        if order.len() != self.node_map.len() {
            return Err(TransformError::InvalidModel(format!(
                "graph contains a cycle ({} of {} nodes ordered)",
                order.len(),
                self.node_map.len()
            )));
        }

        Ok(order)
    }

    /// Get the shape of a tensor from value info or initializers
    pub fn get_tensor_shape(&self, name: &str) -> Option<Vec<i64>> {
        if let Some(shape) = self.value_info_map.get(name).and_then(|vi| vi.get_shape()) {
            return Some(shape);
        }

        self.initializer_map.get(name).map(|init| init.dims.clone())
    }

    /// Get the shape of a tensor only if every dimension is known
    pub fn get_static_shape(&self, name: &str) -> Option<Vec<i64>> {
        self.get_tensor_shape(name)
            .and_then(|shape| static_shape(&shape))
    }
}
