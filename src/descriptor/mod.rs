//! Backend-neutral region descriptors
//!
//! A [`RegionDescriptor`] is the self-contained subgraph a device compiler
//! sees: the member operators plus the edges connecting them to the
//! region's inputs, outputs and each other. [`compile_region`] hands it to a
//! [`DeviceCompiler`] exactly once.

pub mod compiler;

pub use compiler::{compile_region, CompileFlags, CompiledArtifact, DeviceCompiler, Executable};

use rustc_hash::FxHashMap;

use crate::error::{OnnxResult, TransformError};
use crate::graph::GraphContext;
use crate::initializer::ConstantMap;
use crate::partition::{NodeProperties, PartitionSet, Region, RegionId};
use crate::proto::{AttributeProto, NodeProto};

/// How a fused kernel obtains one of its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Supplied by the caller at execution time
    Live,
    /// Bound from the region's constant map
    ConstantBacked,
}

/// One operator inside a region
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorNode {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    pub attributes: Vec<AttributeProto>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub properties: NodeProperties,
}

/// Region input `graph_input` feeds slot `to_node_input` of `to_node`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEdge {
    pub graph_input: usize,
    pub to_node: usize,
    pub to_node_input: usize,
}

/// Slot `from_node_output` of `from_node` is region output `graph_output`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEdge {
    pub from_node: usize,
    pub from_node_output: usize,
    pub graph_output: usize,
}

/// Value passed between two operators of the same region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntermediateEdge {
    pub from_node: usize,
    pub from_node_output: usize,
    pub to_node: usize,
    pub to_node_input: usize,
}

/// Everything a device compiler needs to know about one region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionDescriptor {
    pub region: RegionId,
    pub nodes: Vec<DescriptorNode>,
    pub inputs: Vec<String>,
    pub input_kinds: Vec<InputKind>,
    pub outputs: Vec<String>,
    pub input_edges: Vec<InputEdge>,
    pub output_edges: Vec<OutputEdge>,
    pub intermediate_edges: Vec<IntermediateEdge>,
    /// Static output shapes where every dimension is known
    pub output_shapes: Vec<Option<Vec<i64>>>,
}

impl RegionDescriptor {
    /// Number of inputs the caller supplies at execution time
    pub fn live_input_count(&self) -> usize {
        self.input_kinds
            .iter()
            .filter(|k| **k == InputKind::Live)
            .count()
    }

    pub fn is_constant_backed(&self, input: usize) -> bool {
        self.input_kinds.get(input) == Some(&InputKind::ConstantBacked)
    }
}

fn invalid(region: &Region, reason: String) -> TransformError {
    TransformError::InvalidDescriptor {
        region: region.id,
        reason,
    }
}

/// Check that a region describes a well-formed subgraph
///
/// Every input must be a graph input, an initializer or a node product,
/// and every output must come from a member node. Runs before any
/// constant is moved out of the host graph.
pub fn validate_region(
    ctx: &GraphContext,
    partitions: &PartitionSet,
    region: &Region,
) -> OnnxResult<()> {
    if region.nodes.is_empty() {
        return Err(invalid(region, "region has no nodes".to_string()));
    }
    if region.outputs.is_empty() {
        return Err(invalid(
            region,
            "region produces no externally visible output".to_string(),
        ));
    }

    let members = partitions.member_names(region);
    for name in &members {
        if ctx.get_node(name).is_none() {
            return Err(invalid(region, format!("member node '{name}' is missing")));
        }
    }

    for input in &region.inputs {
        let resolvable = ctx.is_graph_input(input)
            || ctx.is_initializer(input)
            || ctx.get_producer_name(input).is_some();
        if !resolvable {
            return Err(invalid(region, format!("input '{input}' has no source")));
        }
    }

    for output in &region.outputs {
        let produced = ctx
            .get_producer_name(output)
            .map(|p| members.contains(&p.as_str()))
            .unwrap_or(false);
        if !produced {
            return Err(invalid(
                region,
                format!("output '{output}' is not produced inside the region"),
            ));
        }
    }
    Ok(())
}

/// Build the descriptor of `region`
///
/// `constants` is the region's resolved constant map; inputs found there are
/// marked [`InputKind::ConstantBacked`].
pub fn describe_region(
    ctx: &GraphContext,
    partitions: &PartitionSet,
    region: &Region,
    constants: &ConstantMap,
) -> OnnxResult<RegionDescriptor> {
    let members: Vec<&NodeProto> = partitions
        .member_names(region)
        .into_iter()
        .map(|name| {
            ctx.get_node(name)
                .ok_or_else(|| invalid(region, format!("member node '{name}' is missing")))
        })
        .collect::<OnnxResult<_>>()?;

    // tensor -> (node index, output slot) for values produced in the region
    let mut produced: FxHashMap<&str, (usize, usize)> = FxHashMap::default();
    for (i, node) in members.iter().enumerate() {
        for (slot, output) in node.output.iter().enumerate() {
            if !output.is_empty() {
                produced.insert(output.as_str(), (i, slot));
            }
        }
    }

    let input_index: FxHashMap<&str, usize> = region
        .inputs
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut input_edges = Vec::new();
    let mut intermediate_edges = Vec::new();
    for (to_node, node) in members.iter().enumerate() {
        for (to_node_input, input) in node.input.iter().enumerate() {
            if input.is_empty() {
                continue;
            }
            if let Some(&(from_node, from_node_output)) = produced.get(input.as_str()) {
                intermediate_edges.push(IntermediateEdge {
                    from_node,
                    from_node_output,
                    to_node,
                    to_node_input,
                });
            } else if let Some(&graph_input) = input_index.get(input.as_str()) {
                input_edges.push(InputEdge {
                    graph_input,
                    to_node,
                    to_node_input,
                });
            } else {
                return Err(invalid(
                    region,
                    format!("input '{input}' of '{}' is not a region input", node.name),
                ));
            }
        }
    }

    let output_edges = region
        .outputs
        .iter()
        .enumerate()
        .map(|(graph_output, name)| {
            produced
                .get(name.as_str())
                .map(|&(from_node, from_node_output)| OutputEdge {
                    from_node,
                    from_node_output,
                    graph_output,
                })
                .ok_or_else(|| invalid(region, format!("output '{name}' has no producer")))
        })
        .collect::<OnnxResult<Vec<_>>>()?;

    let nodes = members
        .iter()
        .map(|node| DescriptorNode {
            name: node.name.clone(),
            op_type: node.op_type.clone(),
            domain: node.domain.clone(),
            attributes: node.attribute.clone(),
            inputs: node.input.clone(),
            outputs: node.output.clone(),
            properties: partitions
                .properties(&node.name)
                .cloned()
                .unwrap_or_default(),
        })
        .collect();

    let input_kinds = region
        .inputs
        .iter()
        .map(|name| {
            if constants.contains_key(name) {
                InputKind::ConstantBacked
            } else {
                InputKind::Live
            }
        })
        .collect();

    Ok(RegionDescriptor {
        region: region.id,
        nodes,
        inputs: region.inputs.clone(),
        input_kinds,
        outputs: region.outputs.clone(),
        input_edges,
        output_edges,
        intermediate_edges,
        output_shapes: region
            .outputs
            .iter()
            .map(|name| ctx.get_static_shape(name))
            .collect(),
    })
}
