//! Kernel registration for fused nodes

use std::sync::Arc;

use log::warn;

use crate::descriptor::{CompiledArtifact, RegionDescriptor};
use crate::error::OnnxResult;
use crate::graph::GraphContext;
use crate::initializer::ConstantMap;
use crate::kernel::{
    CompiledKernelDescriptor, FusedKernel, Kernel, KernelFactory, KernelRegistry, KernelSignature,
};
use crate::proto::NodeProto;

use super::config::FusedNodeSpec;
use super::transaction::FusionTransaction;

/// Register the kernel behind a fused node
///
/// The factory captures one immutable [`CompiledKernelDescriptor`] shared by
/// every kernel instance it creates.
pub fn register_fused_kernel(
    registry: &mut KernelRegistry,
    spec: &FusedNodeSpec,
    provider: &str,
    descriptor: &RegionDescriptor,
    artifact: CompiledArtifact,
    constants: Arc<ConstantMap>,
) -> OnnxResult<()> {
    let compiled = Arc::new(CompiledKernelDescriptor {
        node_name: spec.name.clone(),
        artifact,
        inputs: descriptor.inputs.clone(),
        input_kinds: descriptor.input_kinds.clone(),
        input_edges: descriptor.input_edges.clone(),
        outputs: descriptor.outputs.clone(),
        constants,
    });

    let factory: KernelFactory =
        Arc::new(move |_: &NodeProto| -> OnnxResult<Box<dyn Kernel>> {
            Ok(Box::new(FusedKernel::new(Arc::clone(&compiled))))
        });

    registry.register(
        KernelSignature::new(&spec.domain, &spec.name, spec.since_version, provider),
        factory,
    )
}

/// Replace a region by its fused node and register the node's kernel
///
/// The graph is only rewritten when registration succeeds; on failure the
/// staged node is rolled back and the error returned. Returns the removed
/// region nodes.
#[allow(clippy::too_many_arguments)]
pub fn fuse_region(
    ctx: &mut GraphContext,
    registry: &mut KernelRegistry,
    spec: &FusedNodeSpec,
    region_nodes: Vec<String>,
    provider: &str,
    descriptor: &RegionDescriptor,
    artifact: CompiledArtifact,
    constants: Arc<ConstantMap>,
) -> OnnxResult<Vec<NodeProto>> {
    let tx = FusionTransaction::stage(ctx, spec, region_nodes)?;

    if let Err(e) = register_fused_kernel(registry, spec, provider, descriptor, artifact, constants)
    {
        warn!("Rolling back '{}': {}", spec.name, e);
        tx.rollback();
        return Err(e);
    }

    match tx.commit() {
        Ok(removed) => Ok(removed),
        Err(e) => {
            registry.unregister(&spec.domain, &spec.name);
            Err(e)
        }
    }
}
