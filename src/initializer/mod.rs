//! Constant ownership across regions
//!
//! Decides, for each initializer a region reads, whether the region takes
//! the tensor out of the host graph or leaves it shared:
//!
//! | References | Required by backend | Host graph | Region map |
//! |------------|---------------------|------------|------------|
//! | one region | -                   | removed    | moved in   |
//! | several    | yes                 | kept       | copy       |
//! | several    | no                  | kept       | absent     |
//!
//! References are counted over every root region, native or not, so a
//! tensor also read by a node that stays on the host is never taken away
//! from it.

use std::sync::Arc;

use indexmap::IndexMap;
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::graph::GraphContext;
use crate::partition::{PartitionSet, Region, RegionId};
use crate::proto::TensorProto;
use crate::tensor::tensor_byte_size;

/// Constants owned by one region, keyed by tensor name
pub type ConstantMap = IndexMap<String, TensorProto>;

/// Root regions reading one initializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantRecord {
    pub name: String,
    pub regions: SmallVec<[RegionId; 2]>,
}

impl ConstantRecord {
    /// Read by exactly one region
    pub fn is_exclusive(&self) -> bool {
        self.regions.len() == 1
    }
}

/// Initializer name -> record, in first-reference order
pub type ConstantRecords = IndexMap<String, ConstantRecord>;

/// Count region references to every initializer in the host graph
pub fn constant_records(ctx: &GraphContext, partitions: &PartitionSet) -> ConstantRecords {
    let mut records = ConstantRecords::new();
    for region in partitions.roots() {
        for input in region.inputs.iter().filter(|i| ctx.is_initializer(i)) {
            let record = records
                .entry(input.clone())
                .or_insert_with(|| ConstantRecord {
                    name: input.clone(),
                    regions: SmallVec::new(),
                });
            if !record.regions.contains(&region.id) {
                record.regions.push(region.id);
            }
        }
    }
    records
}

/// Constants resolved for one region
#[derive(Debug, Clone, Default)]
pub struct RegionConstants {
    pub constants: Arc<ConstantMap>,
    /// Names moved out of the host graph
    pub transferred: Vec<String>,
    /// Names copied while staying in the host graph
    pub copied: Vec<String>,
}

impl RegionConstants {
    /// Put transferred tensors back into the host graph
    pub fn restore(&self, ctx: &mut GraphContext) {
        for name in &self.transferred {
            if let Some(tensor) = self.constants.get(name) {
                ctx.set_initializer(tensor.clone());
            }
        }
    }
}

/// Resolve ownership of the constants `region` reads
///
/// Exclusive tensors are extracted from `ctx`; extracting a tensor that is
/// already gone does nothing.
pub fn resolve_region_constants(
    ctx: &mut GraphContext,
    region: &Region,
    records: &ConstantRecords,
    required: &FxHashSet<String>,
) -> RegionConstants {
    let mut constants = ConstantMap::new();
    let mut resolved = RegionConstants::default();

    for input in &region.inputs {
        let Some(record) = records.get(input) else {
            continue;
        };

        if record.is_exclusive() && !ctx.is_graph_output(input) {
            if let Some(tensor) = ctx.extract_initializer(input) {
                trace!(
                    "Region {} takes ownership of '{}' ({} bytes)",
                    region.id,
                    input,
                    tensor_byte_size(&tensor)
                );
                constants.insert(input.clone(), tensor);
                resolved.transferred.push(input.clone());
            }
        } else if required.contains(input) {
            if let Some(tensor) = ctx.get_initializer(input) {
                trace!("Region {} copies shared constant '{}'", region.id, input);
                constants.insert(input.clone(), tensor.clone());
                resolved.copied.push(input.clone());
            }
        }
    }

    resolved.constants = Arc::new(constants);
    resolved
}

/// Region id -> constants owned by that region
#[derive(Debug, Clone, Default)]
pub struct ResolvedConstants {
    pub by_region: FxHashMap<RegionId, Arc<ConstantMap>>,
    pub transferred: usize,
    pub copied: usize,
}

impl ResolvedConstants {
    pub fn get(&self, region: RegionId) -> Option<&Arc<ConstantMap>> {
        self.by_region.get(&region)
    }
}

/// Resolve constants for every native root region at once
pub fn resolve_initializers(ctx: &mut GraphContext, partitions: &PartitionSet) -> ResolvedConstants {
    let records = constant_records(ctx, partitions);
    let mut resolved = ResolvedConstants::default();

    for region in partitions.native_roots() {
        let region_constants =
            resolve_region_constants(ctx, region, &records, &partitions.required_constants);
        resolved.transferred += region_constants.transferred.len();
        resolved.copied += region_constants.copied.len();
        resolved
            .by_region
            .insert(region.id, region_constants.constants);
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SupportedOps;
    use crate::partition::Partitioner;
    use crate::proto::extensions::{make_initializer, make_node, make_tensor_value_info};
    use crate::proto::{GraphProto, NodeProto};

    // A (Mul W) -> T (TopK, host) -> C (Add W, Add B)
    fn shared_weight_graph() -> GraphProto {
        GraphProto {
            node: vec![
                make_node("Mul", &["X", "W"], &["a"], "A"),
                make_node("TopK", &["a"], &["t"], "T"),
                make_node("Add", &["t", "W"], &["c"], "C"),
                make_node("Add", &["c", "B"], &["Y"], "D"),
            ],
            input: vec![make_tensor_value_info("X", 1, &[4])],
            output: vec![make_tensor_value_info("Y", 1, &[4])],
            initializer: vec![
                make_initializer("W", &[4], &[1.0, 2.0, 3.0, 4.0]),
                make_initializer("B", &[4], &[0.5; 4]),
            ],
            ..Default::default()
        }
    }

    fn partition(ctx: &GraphContext, oracle: &SupportedOps) -> PartitionSet {
        Partitioner::new(oracle).partition(ctx).unwrap()
    }

    #[test]
    fn test_records_count_regions() {
        let ctx = GraphContext::new(&shared_weight_graph());
        let parts = partition(&ctx, &SupportedOps::new(["Mul", "Add"]));

        let records = constant_records(&ctx, &parts);

        assert_eq!(records["W"].regions.as_slice(), &[0, 2]);
        assert!(!records["W"].is_exclusive());
        assert!(records["B"].is_exclusive());
    }

    #[test]
    fn test_exclusive_constant_moves_into_region() {
        let mut ctx = GraphContext::new(&shared_weight_graph());
        let parts = partition(&ctx, &SupportedOps::new(["Mul", "Add"]));

        let resolved = resolve_initializers(&mut ctx, &parts);

        assert!(!ctx.is_initializer("B"));
        assert_eq!(resolved.get(2).unwrap()["B"].float_data, vec![0.5; 4]);
        assert_eq!(resolved.transferred, 1);
    }

    #[test]
    fn test_shared_constant_stays_in_host() {
        let mut ctx = GraphContext::new(&shared_weight_graph());
        let before = ctx.get_initializer("W").cloned();
        let parts = partition(&ctx, &SupportedOps::new(["Mul", "Add"]));

        let resolved = resolve_initializers(&mut ctx, &parts);

        assert_eq!(ctx.get_initializer("W").cloned(), before);
        assert!(!resolved.get(0).unwrap().contains_key("W"));
        assert!(!resolved.get(2).unwrap().contains_key("W"));
        assert_eq!(resolved.copied, 0);
    }

    #[test]
    fn test_required_shared_constant_is_copied() {
        let mut ctx = GraphContext::new(&shared_weight_graph());
        let oracle = SupportedOps::new(["Add"]).with_required_constants("Mul", &[1]);
        let parts = partition(&ctx, &oracle);

        let resolved = resolve_initializers(&mut ctx, &parts);

        assert!(ctx.is_initializer("W"));
        assert_eq!(resolved.get(0).unwrap()["W"].float_data, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(resolved.get(2).unwrap().contains_key("W"));
        assert_eq!(resolved.copied, 2);
    }

    #[test]
    fn test_reference_from_host_region_keeps_constant_shared() {
        // The unsupported TopK also reads K, so K is shared with the host
        let graph = GraphProto {
            node: vec![
                make_node("Mul", &["X", "K"], &["a"], "A"),
                make_node("TopK", &["a", "K"], &["Y"], "T"),
            ],
            initializer: vec![make_initializer("K", &[1], &[3.0])],
            ..Default::default()
        };
        let mut ctx = GraphContext::new(&graph);
        let oracle = |node: &NodeProto| node.op_type == "Mul";
        let parts = Partitioner::new(&oracle).partition(&ctx).unwrap();

        let resolved = resolve_initializers(&mut ctx, &parts);

        assert!(ctx.is_initializer("K"));
        assert!(resolved.get(0).unwrap().is_empty());
    }

    #[test]
    fn test_graph_output_constant_is_shared() {
        let graph = GraphProto {
            node: vec![make_node("Mul", &["X", "W"], &["Y"], "A")],
            output: vec![
                make_tensor_value_info("Y", 1, &[1]),
                make_tensor_value_info("W", 1, &[1]),
            ],
            initializer: vec![make_initializer("W", &[1], &[2.0])],
            ..Default::default()
        };
        let mut ctx = GraphContext::new(&graph);
        let parts = partition(&ctx, &SupportedOps::new(["Mul"]));

        resolve_initializers(&mut ctx, &parts);

        assert!(ctx.is_initializer("W"));
    }

    #[test]
    fn test_resolving_twice_is_harmless() {
        let mut ctx = GraphContext::new(&shared_weight_graph());
        let parts = partition(&ctx, &SupportedOps::new(["Mul", "Add"]));
        let records = constant_records(&ctx, &parts);
        let region = parts.region(2).unwrap();

        let first = resolve_region_constants(&mut ctx, region, &records, &FxHashSet::default());
        let second = resolve_region_constants(&mut ctx, region, &records, &FxHashSet::default());

        assert_eq!(first.transferred, vec!["B"]);
        assert!(second.transferred.is_empty());
        assert!(!ctx.is_initializer("B"));

        first.restore(&mut ctx);
        assert!(ctx.is_initializer("B"));
    }
}
