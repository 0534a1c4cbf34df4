//! Partition results
//!
//! A [`PartitionSet`] is the frozen view of the region arena after
//! partitioning: every root region with its member nodes and external
//! inputs and outputs, plus the per-node backend properties gathered while
//! walking the graph.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::capability::InputSlots;
use crate::error::{OnnxResult, TransformError};

use super::arena::RegionId;

/// Backend properties recorded for a supported node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeProperties {
    /// Input slots the backend needs as compile-time constants
    pub required_constant_inputs: InputSlots,
}

/// A set of nodes destined to run together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Arena index; equals the topological position of the first member
    pub id: RegionId,
    /// Root this region was merged into (`== id` for roots)
    pub root: RegionId,
    /// Whether the backend executes this region natively
    pub native: bool,
    /// Member node positions in topological order (empty when absorbed)
    pub nodes: Vec<usize>,
    /// Tensors consumed by members but produced outside, first use first
    pub inputs: Vec<String>,
    /// Tensors produced by members and needed outside (or graph outputs)
    pub outputs: Vec<String>,
}

impl Region {
    /// Whether this region is the representative of its set
    pub fn is_root(&self) -> bool {
        self.root == self.id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Result of partitioning a graph
#[derive(Debug, Clone, Default)]
pub struct PartitionSet {
    /// Node names in topological order; a node's index here is its position
    pub node_names: Vec<String>,
    /// One region per node, indexed by region id
    pub regions: Vec<Region>,
    /// Root region of each node, indexed by position
    pub node_region: Vec<RegionId>,
    /// Positions of the nodes producing each node's inputs
    pub node_producers: Vec<Vec<usize>>,
    /// Properties of supported nodes keyed by node name
    pub node_properties: FxHashMap<String, NodeProperties>,
    /// Initializers some supported node needs as compile-time constants
    pub required_constants: FxHashSet<String>,
}

impl PartitionSet {
    /// Root regions in ascending id order
    pub fn roots(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| r.is_root())
    }

    /// Native root regions in ascending id order
    pub fn native_roots(&self) -> impl Iterator<Item = &Region> {
        self.roots().filter(|r| r.native)
    }

    pub fn root_count(&self) -> usize {
        self.roots().count()
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id)
    }

    /// Root region holding the named node
    pub fn region_of_node(&self, name: &str) -> Option<&Region> {
        let pos = self.node_names.iter().position(|n| n == name)?;
        self.regions.get(self.node_region[pos])
    }

    /// Member node names of a region in topological order
    pub fn member_names(&self, region: &Region) -> Vec<&str> {
        region
            .nodes
            .iter()
            .map(|&pos| self.node_names[pos].as_str())
            .collect()
    }

    pub fn properties(&self, node: &str) -> Option<&NodeProperties> {
        self.node_properties.get(node)
    }

    /// Region-level dependencies: for each root, the other roots it reads from
    pub fn region_dependencies(&self) -> FxHashMap<RegionId, Vec<RegionId>> {
        let mut deps: FxHashMap<RegionId, Vec<RegionId>> = FxHashMap::default();
        for region in self.roots() {
            let mut region_deps: Vec<RegionId> = region
                .nodes
                .iter()
                .flat_map(|&pos| self.node_producers[pos].iter())
                .map(|&pos| self.node_region[pos])
                .filter(|&r| r != region.id)
                .collect();
            region_deps.sort_unstable();
            region_deps.dedup();
            deps.insert(region.id, region_deps);
        }
        deps
    }

    /// Roots ordered so every region follows the regions it depends on
    ///
    /// Fails if the region graph has a cycle, which partitioning never
    /// produces for an acyclic input graph.
    pub fn region_order(&self) -> OnnxResult<Vec<RegionId>> {
        let deps = self.region_dependencies();

        let mut in_degree: FxHashMap<RegionId, usize> = FxHashMap::default();
        let mut successors: FxHashMap<RegionId, Vec<RegionId>> = FxHashMap::default();
        for (&region, region_deps) in &deps {
            in_degree.insert(region, region_deps.len());
            for &dep in region_deps {
                successors.entry(dep).or_default().push(region);
            }
        }

        let mut ready: BinaryHeap<Reverse<RegionId>> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&region, _)| Reverse(region))
            .collect();

        let mut order = Vec::with_capacity(deps.len());
        while let Some(Reverse(region)) = ready.pop() {
            order.push(region);
            for succ in successors.get(&region).into_iter().flatten() {
                if let Some(count) = in_degree.get_mut(succ) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(*succ));
                    }
                }
            }
        }

        if order.len() != deps.len() {
            return Err(TransformError::Internal(format!(
                "region graph contains a cycle ({} of {} regions ordered)",
                order.len(),
                deps.len()
            )));
        }
        Ok(order)
    }
}
