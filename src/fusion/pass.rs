//! The graph fusion pass
//!
//! Runs partitioning, constant resolution, compilation and fusion for every
//! native region of a graph, in ascending region order.

use std::cell::{Cell, Ref, RefCell};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::builder::build_fused_model;
use crate::capability::CapabilityOracle;
use crate::descriptor::{compile_region, describe_region, validate_region, CompileFlags, DeviceCompiler};
use crate::error::{OnnxResult, TransformError};
use crate::graph::GraphContext;
use crate::initializer::{constant_records, resolve_region_constants};
use crate::kernel::KernelRegistry;
use crate::partition::{PartitionSet, Partitioner, Region};
use crate::proto::ModelProto;
use crate::traits::{OnnxTransformer, TransformResult, Transformer};

use super::config::{FusedNodeSpec, FusionConfig, FusionSession};
use super::registrar::fuse_region;

/// Statistics from one fusion pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FusionStats {
    /// Root regions produced by partitioning
    pub regions_built: usize,
    /// Root regions the backend can run
    pub native_regions: usize,
    /// Regions replaced by a fused node
    pub regions_fused: usize,
    /// Native regions left alone because their descriptor was invalid
    pub regions_skipped_invalid: usize,
    /// Constants moved out of the host graph
    pub constants_transferred: usize,
    /// Shared constants copied into a region
    pub constants_copied: usize,
    /// Original nodes removed from the graph
    pub nodes_removed: usize,
    /// Names of the fused nodes, in creation order
    pub fused_nodes: Vec<String>,
}

impl FusionStats {
    /// Fold another pass's statistics into this one
    pub fn merge(&mut self, other: FusionStats) {
        self.regions_built += other.regions_built;
        self.native_regions += other.native_regions;
        self.regions_fused += other.regions_fused;
        self.regions_skipped_invalid += other.regions_skipped_invalid;
        self.constants_transferred += other.constants_transferred;
        self.constants_copied += other.constants_copied;
        self.nodes_removed += other.nodes_removed;
        self.fused_nodes.extend(other.fused_nodes);
    }
}

impl From<FusionStats> for TransformResult {
    fn from(stats: FusionStats) -> Self {
        TransformResult {
            patterns_matched: stats.native_regions,
            transforms_applied: stats.regions_fused,
            nodes_eliminated: stats.nodes_removed,
            transformed_nodes: stats.fused_nodes,
        }
    }
}

/// Compile flags for a region under `config`
pub fn compile_flags(region: &Region, config: &FusionConfig) -> CompileFlags {
    CompileFlags {
        reuse_execution_plan: region.len() >= config.min_nodes_for_plan_reuse,
        disable_vendor_extensions: !config.vendor_extensions,
    }
}

/// Fuse every native region of `ctx`
///
/// An invalid region descriptor only skips that region. Compilation and
/// registration failures abort the pass. Either way the failing region's
/// constants are put back into the host graph first.
pub fn fuse_graph(
    ctx: &mut GraphContext,
    oracle: &dyn CapabilityOracle,
    compiler: &dyn DeviceCompiler,
    config: &FusionConfig,
    session: &mut FusionSession,
    registry: &mut KernelRegistry,
) -> OnnxResult<FusionStats> {
    let partitions = Partitioner::new(oracle)
        .exclude_domain(&config.domain)
        .partition(ctx)?;
    fuse_partitions(ctx, &partitions, compiler, config, session, registry)
}

/// Fuse the native regions of an existing partition of `ctx`
pub fn fuse_partitions(
    ctx: &mut GraphContext,
    partitions: &PartitionSet,
    compiler: &dyn DeviceCompiler,
    config: &FusionConfig,
    session: &mut FusionSession,
    registry: &mut KernelRegistry,
) -> OnnxResult<FusionStats> {
    let records = constant_records(ctx, partitions);

    let mut stats = FusionStats {
        regions_built: partitions.root_count(),
        ..Default::default()
    };

    for region in partitions.roots() {
        if !region.native {
            debug!(
                "Region {} stays on the host ({})",
                region.id, partitions.node_names[region.id]
            );
            continue;
        }
        stats.native_regions += 1;

        if let Err(e) = validate_region(ctx, partitions, region) {
            if e.is_region_local() {
                warn!("Skipping region {}: {}", region.id, e);
                stats.regions_skipped_invalid += 1;
                continue;
            }
            return Err(e);
        }

        let spec = FusedNodeSpec::for_region(region, session, config);
        let constants =
            resolve_region_constants(ctx, region, &records, &partitions.required_constants);

        let fused = describe_region(ctx, partitions, region, &constants.constants).and_then(
            |descriptor| {
                let flags = compile_flags(region, config);
                let artifact = compile_region(compiler, &descriptor, flags, &spec.name)?;
                let member_names = partitions
                    .member_names(region)
                    .into_iter()
                    .map(String::from)
                    .collect();
                fuse_region(
                    ctx,
                    registry,
                    &spec,
                    member_names,
                    &config.provider,
                    &descriptor,
                    artifact,
                    Arc::clone(&constants.constants),
                )
            },
        );

        match fused {
            Ok(removed) => {
                debug!(
                    "Fused region {} ({} nodes) into '{}'",
                    region.id,
                    removed.len(),
                    spec.name
                );
                stats.regions_fused += 1;
                stats.nodes_removed += removed.len();
                stats.constants_transferred += constants.transferred.len();
                stats.constants_copied += constants.copied.len();
                stats.fused_nodes.push(spec.name);
            }
            Err(e) => {
                constants.restore(ctx);
                if !e.is_region_local() {
                    return Err(e);
                }
                warn!("Skipping region {}: {}", region.id, e);
                stats.regions_skipped_invalid += 1;
            }
        }
    }

    info!(
        "Fusion pass: {} of {} native regions fused, {} nodes replaced, {} skipped",
        stats.regions_fused, stats.native_regions, stats.nodes_removed, stats.regions_skipped_invalid
    );
    Ok(stats)
}

/// Fusion pass bound to one capability oracle and device compiler
///
/// Owns the kernel registry the fused kernels are registered in and the
/// naming session, so running it repeatedly never reuses a fused name.
pub struct GraphFusionPass<'a> {
    oracle: &'a dyn CapabilityOracle,
    compiler: &'a dyn DeviceCompiler,
    config: FusionConfig,
    session: Cell<FusionSession>,
    registry: RefCell<KernelRegistry>,
}

impl<'a> GraphFusionPass<'a> {
    pub fn new(oracle: &'a dyn CapabilityOracle, compiler: &'a dyn DeviceCompiler) -> Self {
        Self {
            oracle,
            compiler,
            config: FusionConfig::default(),
            session: Cell::new(FusionSession::new()),
            registry: RefCell::new(KernelRegistry::new()),
        }
    }

    /// Configure the pass
    pub fn with_config(mut self, config: FusionConfig) -> Self {
        self.config = config;
        self
    }

    /// Continue naming from an existing session
    pub fn with_session(mut self, session: FusionSession) -> Self {
        self.session = Cell::new(session);
        self
    }

    /// Register kernels into an existing registry
    pub fn with_registry(mut self, registry: KernelRegistry) -> Self {
        self.registry = RefCell::new(registry);
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn session(&self) -> FusionSession {
        self.session.get()
    }

    pub fn registry(&self) -> Ref<'_, KernelRegistry> {
        self.registry.borrow()
    }

    /// Give up the pass, keeping the registered kernels
    pub fn into_registry(self) -> KernelRegistry {
        self.registry.into_inner()
    }

    /// Fuse the native regions of `ctx`
    pub fn run(&self, ctx: &mut GraphContext) -> OnnxResult<FusionStats> {
        let mut registry = self
            .registry
            .try_borrow_mut()
            .map_err(|e| TransformError::Internal(format!("kernel registry in use: {e}")))?;
        let mut session = self.session.get();

        let result = fuse_graph(
            ctx,
            self.oracle,
            self.compiler,
            &self.config,
            &mut session,
            &mut registry,
        );
        self.session.set(session);
        result
    }

    /// Fuse a whole model, returning the rewritten model
    pub fn run_on_model(&self, model: &ModelProto) -> OnnxResult<(ModelProto, FusionStats)> {
        let mut ctx = GraphContext::from_model(model)?;
        let stats = self.run(&mut ctx)?;
        let fused = build_fused_model(&ctx, model, &self.config.domain)?;
        Ok((fused, stats))
    }
}

impl OnnxTransformer for GraphFusionPass<'_> {
    fn name(&self) -> &'static str {
        "GraphFusionPass"
    }

    fn transform(&self, ctx: &mut GraphContext) -> OnnxResult<TransformResult> {
        self.run(ctx).map(TransformResult::from)
    }
}

impl Transformer for GraphFusionPass<'_> {
    fn transform(&self, model: ModelProto) -> OnnxResult<ModelProto> {
        self.run_on_model(&model).map(|(fused, _)| fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SupportedOps;
    use crate::proto::extensions::{make_node, make_tensor_value_info};
    use crate::proto::GraphProto;
    use crate::test_utils::{
        float_tensor, mul_add_relu_graph, split_graph, InterpreterCompiler, RejectingCompiler,
    };

    fn elementwise_ops() -> SupportedOps {
        SupportedOps::new(["Mul", "Add", "Relu", "Neg"])
    }

    #[test]
    fn test_fuses_whole_graph() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let pass = GraphFusionPass::new(&oracle, &compiler);
        let mut ctx = GraphContext::new(&mul_add_relu_graph());

        let stats = pass.run(&mut ctx).unwrap();

        assert_eq!(stats.regions_built, 1);
        assert_eq!(stats.regions_fused, 1);
        assert_eq!(stats.nodes_removed, 3);
        assert_eq!(stats.constants_transferred, 2);
        assert_eq!(stats.fused_nodes, vec!["FusedPartition_0_0"]);

        let node = ctx.get_node("FusedPartition_0_0").unwrap().clone();
        assert_eq!(ctx.node_count(), 1);
        assert_eq!(node.domain, "com.partition_fuser");
        assert_eq!(node.input, vec!["X", "W", "B"]);
        assert_eq!(node.output, vec!["Y"]);
        assert!(!ctx.is_initializer("W"));
        assert!(!ctx.is_initializer("B"));

        let kernel = pass.registry().create_kernel(&node).unwrap();
        let x = float_tensor("X", &[2, 2], &[3.0, -1.0, 1.0, 0.5]);
        assert_eq!(kernel.compute(&[&x]).unwrap()[0].float_data, vec![0.0, 0.0, 3.0, 2.0]);
    }

    #[test]
    fn test_second_run_is_noop() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let pass = GraphFusionPass::new(&oracle, &compiler);
        let mut ctx = GraphContext::new(&mul_add_relu_graph());
        pass.run(&mut ctx).unwrap();
        let nodes: Vec<String> = ctx.node_names().cloned().collect();

        let stats = pass.run(&mut ctx).unwrap();

        assert_eq!(stats.regions_fused, 0);
        assert_eq!(stats.native_regions, 0);
        assert_eq!(ctx.node_names().cloned().collect::<Vec<_>>(), nodes);
        assert_eq!(compiler.calls.borrow().len(), 1);
        assert_eq!(pass.registry().len(), 1);
    }

    #[test]
    fn test_unsupported_node_splits_regions() {
        let oracle = SupportedOps::new(["Mul", "Add"]);
        let compiler = InterpreterCompiler::default();
        let pass = GraphFusionPass::new(&oracle, &compiler);
        let mut ctx = GraphContext::new(&split_graph());

        let stats = pass.run(&mut ctx).unwrap();

        assert_eq!(stats.regions_built, 3);
        assert_eq!(stats.native_regions, 2);
        assert_eq!(stats.fused_nodes, vec!["FusedPartition_0_0", "FusedPartition_1_2"]);
        assert!(ctx.has_node("U"));
        assert_eq!(ctx.node_count(), 3);

        // W is read by both sides and stays; B belongs to the C/D region
        assert!(ctx.is_initializer("W"));
        assert!(!ctx.is_initializer("B"));
        assert_eq!(stats.constants_transferred, 1);
        assert_eq!(stats.constants_copied, 0);

        let tail = ctx.get_node("FusedPartition_1_2").unwrap().clone();
        assert_eq!(tail.input, vec!["u", "W", "B"]);
        assert_eq!(ctx.get_producer_name("u"), Some(&"U".to_string()));
        assert_eq!(
            ctx.get_producer_name("a"),
            Some(&"FusedPartition_0_0".to_string())
        );

        // Live inputs only: u and the shared W
        let kernel = pass.registry().create_kernel(&tail).unwrap();
        let u = float_tensor("u", &[4], &[1.0, 2.0, 3.0, 4.0]);
        let w = float_tensor("W", &[4], &[1.0; 4]);
        assert_eq!(
            kernel.compute(&[&u, &w]).unwrap()[0].float_data,
            vec![4.0, 5.0, 6.0, 7.0]
        );
    }

    #[test]
    fn test_names_stay_unique_across_runs() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let pass = GraphFusionPass::new(&oracle, &compiler);
        let mut first = GraphContext::new(&mul_add_relu_graph());
        let mut second = GraphContext::new(&mul_add_relu_graph());

        let a = pass.run(&mut first).unwrap();
        let b = pass.run(&mut second).unwrap();

        assert_eq!(a.fused_nodes, vec!["FusedPartition_0_0"]);
        assert_eq!(b.fused_nodes, vec!["FusedPartition_1_0"]);
        assert_eq!(pass.session().fused_count(), 2);
        assert_eq!(pass.registry().len(), 2);
    }

    #[test]
    fn test_session_carries_over() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let mut session = FusionSession::new();
        session.next_name("FusedPartition_", 0);
        let pass = GraphFusionPass::new(&oracle, &compiler).with_session(session);
        let mut ctx = GraphContext::new(&mul_add_relu_graph());

        let stats = pass.run(&mut ctx).unwrap();

        assert_eq!(stats.fused_nodes, vec!["FusedPartition_1_0"]);
    }

    #[test]
    fn test_compile_failure_is_fatal() {
        let oracle = elementwise_ops();
        let pass = GraphFusionPass::new(&oracle, &RejectingCompiler);
        let mut ctx = GraphContext::new(&mul_add_relu_graph());

        let err = pass.run(&mut ctx).unwrap_err();

        assert!(matches!(err, TransformError::CompilationFailed { .. }));
        assert!(err.to_string().contains("device out of memory"));
        assert_eq!(ctx.node_count(), 3);
        assert!(ctx.is_initializer("W"));
        assert!(ctx.is_initializer("B"));
        assert!(pass.registry().is_empty());
    }

    #[test]
    fn test_invalid_region_is_skipped() {
        // Neg's output is never read, so its region has no visible output
        let graph = GraphProto {
            node: vec![
                make_node("Relu", &["X"], &["Y"], "relu"),
                make_node("Neg", &["X"], &["dead"], "neg"),
            ],
            input: vec![make_tensor_value_info("X", 1, &[4])],
            output: vec![make_tensor_value_info("Y", 1, &[4])],
            ..Default::default()
        };
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let pass = GraphFusionPass::new(&oracle, &compiler);
        let mut ctx = GraphContext::new(&graph);

        let stats = pass.run(&mut ctx).unwrap();

        assert_eq!(stats.native_regions, 2);
        assert_eq!(stats.regions_fused, 1);
        assert_eq!(stats.regions_skipped_invalid, 1);
        assert!(ctx.has_node("neg"));
        assert!(!ctx.has_node("relu"));
    }

    #[test]
    fn test_constant_shared_with_skipped_region_stays_in_host() {
        // Both regions read W; the Neg region has no visible output
        let graph = GraphProto {
            node: vec![
                make_node("Mul", &["X", "W"], &["Y"], "mul"),
                make_node("Neg", &["W"], &["dead"], "neg"),
            ],
            input: vec![make_tensor_value_info("X", 1, &[4])],
            output: vec![make_tensor_value_info("Y", 1, &[4])],
            initializer: vec![float_tensor("W", &[4], &[2.0; 4])],
            ..Default::default()
        };
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let pass = GraphFusionPass::new(&oracle, &compiler);
        let mut ctx = GraphContext::new(&graph);

        let stats = pass.run(&mut ctx).unwrap();

        assert_eq!(stats.regions_fused, 1);
        assert_eq!(stats.regions_skipped_invalid, 1);
        assert_eq!(stats.constants_transferred, 0);
        assert_eq!(ctx.get_initializer("W").unwrap().float_data, vec![2.0; 4]);

        // W was not captured, so the kernel takes it as a live input
        let node = ctx.get_node("FusedPartition_0_0").unwrap().clone();
        assert_eq!(node.input, vec!["X", "W"]);
        let kernel = pass.registry().create_kernel(&node).unwrap();
        let x = float_tensor("X", &[4], &[1.0, 2.0, 3.0, 4.0]);
        let w = float_tensor("W", &[4], &[2.0; 4]);
        assert!(kernel.compute(&[&x]).is_err());
        assert_eq!(
            kernel.compute(&[&x, &w]).unwrap()[0].float_data,
            vec![2.0, 4.0, 6.0, 8.0]
        );
    }

    #[test]
    fn test_invalid_description_skips_region_and_restores_constants() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let config = FusionConfig::default();
        let mut ctx = GraphContext::new(&mul_add_relu_graph());
        let mut partitions = Partitioner::new(&oracle).partition(&ctx).unwrap();
        // Mul still reads X, which the region no longer lists as an input
        partitions.regions[0].inputs.retain(|input| input != "X");
        let mut session = FusionSession::new();
        let mut registry = KernelRegistry::new();

        let stats = fuse_partitions(
            &mut ctx,
            &partitions,
            &compiler,
            &config,
            &mut session,
            &mut registry,
        )
        .unwrap();

        assert_eq!(stats.native_regions, 1);
        assert_eq!(stats.regions_fused, 0);
        assert_eq!(stats.regions_skipped_invalid, 1);
        assert_eq!(ctx.node_count(), 3);
        assert!(ctx.is_initializer("W"));
        assert!(ctx.is_initializer("B"));
        assert!(compiler.calls.borrow().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_compile_flags_follow_config() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let reuse = GraphFusionPass::new(&oracle, &compiler)
            .with_config(FusionConfig::new().with_min_nodes_for_plan_reuse(3));
        let no_reuse = GraphFusionPass::new(&oracle, &compiler).with_config(
            FusionConfig::new()
                .with_min_nodes_for_plan_reuse(4)
                .with_vendor_extensions(false),
        );

        reuse.run(&mut GraphContext::new(&mul_add_relu_graph())).unwrap();
        no_reuse.run(&mut GraphContext::new(&mul_add_relu_graph())).unwrap();

        let calls = compiler.calls.borrow();
        assert_eq!(
            calls[0].1,
            CompileFlags {
                reuse_execution_plan: true,
                disable_vendor_extensions: false,
            }
        );
        assert_eq!(
            calls[1].1,
            CompileFlags {
                reuse_execution_plan: false,
                disable_vendor_extensions: true,
            }
        );
    }

    #[test]
    fn test_onnx_transformer_reports_result() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let pass = GraphFusionPass::new(&oracle, &compiler);
        let mut ctx = GraphContext::new(&mul_add_relu_graph());

        let result = OnnxTransformer::transform(&pass, &mut ctx).unwrap();

        assert_eq!(result.transforms_applied, 1);
        assert_eq!(result.nodes_eliminated, 3);
        assert_eq!(result.transformed_nodes, vec!["FusedPartition_0_0"]);
    }

    #[test]
    fn test_model_transformer_imports_domain() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let pass = GraphFusionPass::new(&oracle, &compiler);
        let model = ModelProto {
            graph: Some(mul_add_relu_graph()),
            ..Default::default()
        };

        let fused = Transformer::transform(&pass, model).unwrap();

        assert_eq!(fused.get_opset_version("com.partition_fuser"), Some(1));
        assert_eq!(fused.graph.unwrap().node.len(), 1);
    }

    #[test]
    fn test_kernels_land_in_given_registry() {
        let oracle = elementwise_ops();
        let compiler = InterpreterCompiler::default();
        let mut first = GraphContext::new(&mul_add_relu_graph());
        let first_pass = GraphFusionPass::new(&oracle, &compiler);
        first_pass.run(&mut first).unwrap();
        let session = first_pass.session();

        let second_pass = GraphFusionPass::new(&oracle, &compiler)
            .with_session(session)
            .with_registry(first_pass.into_registry());
        second_pass.run(&mut GraphContext::new(&mul_add_relu_graph())).unwrap();

        let registry = second_pass.into_registry();
        let names: Vec<&str> = registry.signatures().map(|s| s.op_type.as_str()).collect();
        assert_eq!(names, vec!["FusedPartition_0_0", "FusedPartition_1_0"]);
    }

    #[test]
    fn test_stats_merge() {
        let mut total = FusionStats {
            regions_fused: 1,
            fused_nodes: vec!["a".to_string()],
            ..Default::default()
        };
        total.merge(FusionStats {
            regions_fused: 2,
            nodes_removed: 5,
            fused_nodes: vec!["b".to_string()],
            ..Default::default()
        });

        assert_eq!(total.regions_fused, 3);
        assert_eq!(total.nodes_removed, 5);
        assert_eq!(total.fused_nodes, vec!["a", "b"]);
    }
}
