//! Greedy region growing
//!
//! Nodes are visited in topological order. Each node gets a fresh region;
//! a supported node then tries to join the native regions of its producers,
//! lowest root first, skipping any merge that would route a dependency path
//! out of the merged region and back in.

use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::capability::CapabilityOracle;
use crate::error::{OnnxResult, TransformError};
use crate::graph::GraphContext;
use crate::proto::NodeProto;

use super::arena::{RegionArena, RegionId};
use super::region::{NodeProperties, PartitionSet, Region};

/// Builds a [`PartitionSet`] for a graph
pub struct Partitioner<'a> {
    oracle: &'a dyn CapabilityOracle,
    excluded_domain: Option<String>,
}

impl<'a> Partitioner<'a> {
    pub fn new(oracle: &'a dyn CapabilityOracle) -> Self {
        Self {
            oracle,
            excluded_domain: None,
        }
    }

    /// Treat every node in `domain` as unsupported
    ///
    /// Used for the domain fused nodes are emitted into, so an already fused
    /// graph partitions to singleton regions.
    pub fn exclude_domain(mut self, domain: &str) -> Self {
        self.excluded_domain = Some(domain.to_string());
        self
    }

    fn is_supported(&self, node: &NodeProto) -> bool {
        if let Some(domain) = &self.excluded_domain {
            if node.domain == *domain {
                return false;
            }
        }
        self.oracle.supports(node)
    }

    /// Partition the committed nodes of `ctx`
    ///
    /// Fails with `InvalidModel` when the graph has a cycle.
    pub fn partition(&self, ctx: &GraphContext) -> OnnxResult<PartitionSet> {
        let order = ctx.topological_order()?;
        let position: FxHashMap<&str, usize> =
            order.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let mut arena = RegionArena::with_capacity(order.len());
        let mut node_producers: Vec<Vec<usize>> = Vec::with_capacity(order.len());
        let mut node_properties = FxHashMap::default();
        let mut required_constants = FxHashSet::default();

        for (pos, &name) in order.iter().enumerate() {
            // Region ids are node positions, so no position may be skipped
            let node = ctx.get_node(name).ok_or_else(|| {
                TransformError::Internal(format!("ordered node '{name}' is not in the graph"))
            })?;
            let supported = self.is_supported(node);

            let producers: Vec<usize> = ctx
                .producer_names(node)
                .into_iter()
                .filter_map(|p| position.get(p).copied())
                .collect();

            let id = arena.push(pos, supported);
            arena.add_deps(id, producers.iter().copied());

            if supported {
                let slots = self.oracle.required_constant_inputs(node);
                for &slot in &slots {
                    if let Some(input) = node.input.get(slot).filter(|i| ctx.is_initializer(i)) {
                        required_constants.insert(input.clone());
                    }
                }
                node_properties.insert(
                    name.to_string(),
                    NodeProperties {
                        required_constant_inputs: slots,
                    },
                );

                self.merge_with_producers(&mut arena, id, &producers, name);
            }

            node_producers.push(producers);
        }

        let partitions = self.freeze(
            ctx,
            &mut arena,
            order.iter().map(|n| n.to_string()).collect(),
            node_producers,
            node_properties,
            required_constants,
        );

        debug!(
            "Partitioned {} nodes into {} regions ({} native)",
            partitions.node_names.len(),
            partitions.root_count(),
            partitions.native_roots().count()
        );
        Ok(partitions)
    }

    fn merge_with_producers(
        &self,
        arena: &mut RegionArena,
        id: RegionId,
        producers: &[usize],
        name: &str,
    ) {
        // Node positions double as their singleton region ids
        let mut candidates: Vec<RegionId> = producers.iter().map(|&p| arena.find(p)).collect();
        candidates.retain(|&r| arena.is_native(r));
        candidates.sort_unstable();
        candidates.dedup();

        for candidate in candidates {
            let current = arena.find(id);
            let candidate = arena.find(candidate);
            if candidate == current {
                continue;
            }
            if arena.can_merge(candidate, current) {
                let root = arena.union(candidate, current);
                trace!("Merged '{}' into region {}", name, root);
            } else {
                trace!(
                    "Kept '{}' out of region {}: merge would create a cycle",
                    name,
                    candidate
                );
            }
        }
    }

    fn freeze(
        &self,
        ctx: &GraphContext,
        arena: &mut RegionArena,
        node_names: Vec<String>,
        node_producers: Vec<Vec<usize>>,
        node_properties: FxHashMap<String, NodeProperties>,
        required_constants: FxHashSet<String>,
    ) -> PartitionSet {
        let node_region: Vec<RegionId> = (0..arena.len()).map(|id| arena.find(id)).collect();
        let position: FxHashMap<&str, usize> = node_names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let regions = (0..arena.len())
            .map(|id| {
                let root = node_region[id];
                if root != id {
                    return Region {
                        id,
                        root,
                        native: arena.is_native(id),
                        nodes: Vec::new(),
                        inputs: Vec::new(),
                        outputs: Vec::new(),
                    };
                }
                let nodes = arena.members(id).to_vec();
                let (inputs, outputs) =
                    region_boundary(ctx, &node_names, &position, &node_region, id, &nodes);
                Region {
                    id,
                    root,
                    native: arena.is_native(id),
                    nodes,
                    inputs,
                    outputs,
                }
            })
            .collect();

        PartitionSet {
            node_names,
            regions,
            node_region,
            node_producers,
            node_properties,
            required_constants,
        }
    }
}

/// External inputs and outputs of the root region `id`
fn region_boundary(
    ctx: &GraphContext,
    node_names: &[String],
    position: &FxHashMap<&str, usize>,
    node_region: &[RegionId],
    id: RegionId,
    nodes: &[usize],
) -> (Vec<String>, Vec<String>) {
    let members: FxHashSet<&str> = nodes.iter().map(|&p| node_names[p].as_str()).collect();

    let produced_inside = |tensor: &str| {
        ctx.get_producer_name(tensor)
            .map(|p| members.contains(p.as_str()))
            .unwrap_or(false)
    };
    let consumed_outside = |tensor: &str| {
        ctx.get_consumer_names(tensor)
            .unwrap_or_default()
            .iter()
            .any(|c| match position.get(c.as_str()) {
                Some(&pos) => node_region[pos] != id,
                None => false,
            })
    };

    let mut inputs: Vec<String> = Vec::new();
    let mut outputs: Vec<String> = Vec::new();
    for &pos in nodes {
        let Some(node) = ctx.get_node(&node_names[pos]) else {
            continue;
        };
        for input in node.live_inputs() {
            if !produced_inside(input) && !inputs.contains(input) {
                inputs.push(input.clone());
            }
        }
        for output in node.live_outputs() {
            if (ctx.is_graph_output(output) || consumed_outside(output))
                && !outputs.contains(output)
            {
                outputs.push(output.clone());
            }
        }
    }
    (inputs, outputs)
}
