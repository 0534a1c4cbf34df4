//! ONNX I/O module
//!
//! Loading, saving and validating models, plus the file-level fusion driver.
//!
//! # Example
//!
//! ```ignore
//! use partition_fuser::fusion::GraphFusionPass;
//! use partition_fuser::io::{fuse_file, FuseOptions};
//!
//! let pass = GraphFusionPass::new(&oracle, &compiler);
//! let stats = fuse_file("model.onnx", "fused.onnx", &pass, FuseOptions::default())?;
//! println!("Fused {} regions", stats.fusion.regions_fused);
//! ```

pub mod reader;
pub mod validation;
pub mod writer;

pub use reader::{load_model, load_model_from_bytes, ModelInfo};
pub use validation::{
    check_model, check_model_with_options, validate_graph, validate_model,
    validate_model_with_options, ValidationOptions, ValidationResult,
};
pub use writer::{model_size, model_to_bytes, save_model};

use std::path::Path;

use log::info;

use crate::builder::{assign_node_names, build_fused_model};
use crate::error::{OnnxResult, TransformError};
use crate::fusion::{FusionStats, GraphFusionPass};
use crate::graph::GraphContext;
use crate::proto::ModelProto;

/// Statistics of a model-level fusion run
#[derive(Debug, Clone, Default)]
pub struct FuseStats {
    /// Node count before fusion
    pub original_nodes: usize,
    /// Node count after fusion
    pub fused_nodes: usize,
    /// Unnamed nodes given a name before partitioning
    pub nodes_renamed: usize,
    pub original_size: usize,
    pub fused_size: usize,
    /// Statistics of the fusion pass itself
    pub fusion: FusionStats,
}

impl FuseStats {
    /// Nodes removed from the graph, net of the fused nodes added
    pub fn nodes_reduced(&self) -> usize {
        self.original_nodes.saturating_sub(self.fused_nodes)
    }
}

/// Driver options
#[derive(Debug, Clone)]
pub struct FuseOptions {
    /// Validate before fusion
    pub validate_input: bool,
    /// Validate after fusion
    pub validate_output: bool,
    /// Name unnamed nodes instead of rejecting the model
    pub assign_node_names: bool,
}

impl Default for FuseOptions {
    fn default() -> Self {
        Self {
            validate_input: true,
            validate_output: true,
            assign_node_names: true,
        }
    }
}

/// Fuse an ONNX model in memory
pub fn fuse_model(
    model: &ModelProto,
    pass: &GraphFusionPass<'_>,
    options: &FuseOptions,
) -> OnnxResult<(ModelProto, FuseStats)> {
    let mut model = model.clone();
    let nodes_renamed = if options.assign_node_names {
        assign_node_names(model.graph_mut())
    } else {
        0
    };

    // Fused nodes from an earlier run keep their kernel-bound inputs
    let validation =
        ValidationOptions::default().with_kernel_bound_domain(&pass.config().domain);
    if options.validate_input {
        check_model_with_options(&model, &validation)?;
    }

    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| TransformError::InvalidModel("No graph".to_string()))?;
    let original_nodes = graph.node.len();
    let original_size = model_size(&model);

    let mut ctx = GraphContext::new(graph);
    let fusion = pass.run(&mut ctx)?;
    let fused = build_fused_model(&ctx, &model, &pass.config().domain)?;

    if options.validate_output {
        check_model_with_options(&fused, &validation)?;
    }

    let stats = FuseStats {
        original_nodes,
        fused_nodes: fused.graph.as_ref().map_or(0, |g| g.node.len()),
        nodes_renamed,
        original_size,
        fused_size: model_size(&fused),
        fusion,
    };

    Ok((fused, stats))
}

/// Fuse an ONNX file and save the result to another file
pub fn fuse_file<P1: AsRef<Path>, P2: AsRef<Path>>(
    input: P1,
    output: P2,
    pass: &GraphFusionPass<'_>,
    options: FuseOptions,
) -> OnnxResult<FuseStats> {
    let model = load_model(&input)?;
    let (fused, stats) = fuse_model(&model, pass, &options)?;
    save_model(&fused, &output)?;

    info!(
        "Fused {} into {}: {} -> {} nodes",
        input.as_ref().display(),
        output.as_ref().display(),
        stats.original_nodes,
        stats.fused_nodes
    );
    Ok(stats)
}
