//! Model builder for fused ONNX models
//!
//! Assembles a `ModelProto` from a `GraphContext` after fusion.

use rustc_hash::FxHashSet;

use crate::error::{OnnxResult, TransformError};
use crate::graph::GraphContext;
use crate::proto::{GraphProto, ModelProto, NodeProto, TensorProto, ValueInfoProto};

/// Model builder for constructing fused models
#[derive(Debug)]
pub struct ModelBuilder {
    /// Original model (for metadata)
    original: ModelProto,
    /// Working graph context
    ctx: Option<GraphContext>,
    /// Domain fused nodes live in
    fusion_domain: Option<String>,
    /// Producer name override
    producer_name: Option<String>,
    /// Producer version override
    producer_version: Option<String>,
}

impl ModelBuilder {
    /// Create a new builder from an original model
    pub fn new(model: ModelProto) -> Self {
        Self {
            original: model,
            ctx: None,
            fusion_domain: None,
            producer_name: None,
            producer_version: None,
        }
    }

    /// Set the graph context
    pub fn with_context(mut self, ctx: GraphContext) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Import `domain` at version 1 when the graph holds nodes from it
    pub fn fusion_domain(mut self, domain: &str) -> Self {
        self.fusion_domain = Some(domain.to_string());
        self
    }

    /// Set producer name
    pub fn producer_name(mut self, name: &str) -> Self {
        self.producer_name = Some(name.to_string());
        self
    }

    /// Set producer version
    pub fn producer_version(mut self, version: &str) -> Self {
        self.producer_version = Some(version.to_string());
        self
    }

    /// Build the final model
    pub fn build(self) -> OnnxResult<ModelProto> {
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| TransformError::MissingField("context".to_string()))?;

        let mut model = match &self.fusion_domain {
            Some(domain) => build_fused_model(ctx, &self.original, domain)?,
            None => {
                let mut model = self.original.clone();
                model.graph = Some(build_graph_from_context(ctx)?);
                model
            }
        };

        if let Some(name) = self.producer_name {
            model.producer_name = name;
        }
        if let Some(version) = self.producer_version {
            model.producer_version = version;
        }

        Ok(model)
    }
}

/// Build a GraphProto from a GraphContext
///
/// Nodes are emitted in topological order; staged placeholders are left out.
/// Initializers and value_info no node or graph boundary refers to any more
/// are dropped.
pub fn build_graph_from_context(ctx: &GraphContext) -> OnnxResult<GraphProto> {
    let nodes: Vec<NodeProto> = ctx
        .topological_order()?
        .into_iter()
        .filter(|name| !ctx.is_placeholder(name))
        .filter_map(|name| ctx.get_node(name).cloned())
        .collect();

    let mut used_tensors: FxHashSet<&str> = FxHashSet::default();
    for node in &nodes {
        used_tensors.extend(node.live_inputs().map(String::as_str));
        used_tensors.extend(node.live_outputs().map(String::as_str));
    }
    used_tensors.extend(ctx.graph_input_map.keys().map(String::as_str));
    used_tensors.extend(ctx.graph_output_map.keys().map(String::as_str));

    let initializer: Vec<TensorProto> = ctx
        .initializer_map
        .values()
        .filter(|t| used_tensors.contains(t.name.as_str()))
        .cloned()
        .collect();

    let input: Vec<ValueInfoProto> = ctx.graph_input_map.values().cloned().collect();
    let output: Vec<ValueInfoProto> = ctx.graph_output_map.values().cloned().collect();

    let value_info: Vec<ValueInfoProto> = ctx
        .value_info_map
        .values()
        .filter(|vi| {
            used_tensors.contains(vi.name.as_str())
                && !ctx.is_graph_input(&vi.name)
                && !ctx.is_graph_output(&vi.name)
        })
        .cloned()
        .collect();

    Ok(GraphProto {
        node: nodes,
        initializer,
        input,
        output,
        value_info,
        ..Default::default()
    })
}

/// Build the fused model from context and original model
///
/// Keeps the original graph's name and metadata. When any node lives in
/// `fusion_domain`, that domain is imported at version 1.
pub fn build_fused_model(
    ctx: &GraphContext,
    original: &ModelProto,
    fusion_domain: &str,
) -> OnnxResult<ModelProto> {
    let mut graph = build_graph_from_context(ctx)?;
    if let Some(source) = &original.graph {
        graph.name = source.name.clone();
        graph.doc_string = source.doc_string.clone();
    }

    let has_fused = graph.node.iter().any(|n| n.is_in_domain(fusion_domain));

    let mut model = original.clone();
    model.graph = Some(graph);
    if has_fused {
        model.ensure_opset_import(fusion_domain, 1);
    }
    Ok(model)
}

/// Give every unnamed node a unique name
///
/// Partitioning identifies nodes by name, so models exported without node
/// names are named `<op_type>_<index>` before fusion. Returns the number of
/// nodes renamed.
pub fn assign_node_names(graph: &mut GraphProto) -> usize {
    let mut taken: FxHashSet<String> = graph
        .node
        .iter()
        .filter(|n| !n.name.is_empty())
        .map(|n| n.name.clone())
        .collect();

    let mut renamed = 0;
    for (index, node) in graph.node.iter_mut().enumerate() {
        if !node.name.is_empty() {
            continue;
        }
        let mut name = format!("{}_{}", node.op_type, index);
        let mut suffix = 0;
        while taken.contains(&name) {
            suffix += 1;
            name = format!("{}_{}_{}", node.op_type, index, suffix);
        }
        taken.insert(name.clone());
        node.name = name;
        renamed += 1;
    }
    renamed
}
