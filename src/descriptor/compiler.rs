//! Device compiler interface

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::error::{CompileError, OnnxResult, TransformError};
use crate::kernel::ExecutionScratch;
use crate::proto::TensorProto;

use super::RegionDescriptor;

/// Options passed to the device compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileFlags {
    /// Compile a reusable execution plan instead of recording each run
    pub reuse_execution_plan: bool,
    /// Forbid vendor-specific operator implementations
    pub disable_vendor_extensions: bool,
}

/// Executable produced by a device compiler
///
/// Receives every region input in slot order (live values and constants
/// alike) and returns the region outputs in order.
pub trait Executable: Send + Sync + fmt::Debug {
    fn execute(
        &self,
        inputs: &[&TensorProto],
        scratch: &mut ExecutionScratch,
    ) -> OnnxResult<Vec<TensorProto>>;
}

/// Compiles region descriptors for one device
pub trait DeviceCompiler {
    /// Compile `descriptor`; called once per region and never retried
    fn compile(
        &self,
        descriptor: &RegionDescriptor,
        flags: CompileFlags,
    ) -> Result<Arc<dyn Executable>, CompileError>;
}

/// A compiled region together with the hints recorded at compile time
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    executable: Arc<dyn Executable>,
    /// Whether the executable was built as a reusable plan
    pub reuses_execution_plan: bool,
    /// Static output shapes, `None` where unknown
    pub output_shapes: Vec<Option<Vec<i64>>>,
}

impl CompiledArtifact {
    pub fn new(executable: Arc<dyn Executable>) -> Self {
        Self {
            executable,
            reuses_execution_plan: false,
            output_shapes: Vec::new(),
        }
    }

    pub fn executable(&self) -> &Arc<dyn Executable> {
        &self.executable
    }
}

/// Compile `descriptor` for the fused node `node_name`
///
/// A compiler error is wrapped as `CompilationFailed`, which aborts the pass.
pub fn compile_region(
    compiler: &dyn DeviceCompiler,
    descriptor: &RegionDescriptor,
    flags: CompileFlags,
    node_name: &str,
) -> OnnxResult<CompiledArtifact> {
    debug!(
        "Compiling '{}' ({} nodes, plan reuse: {})",
        node_name,
        descriptor.nodes.len(),
        flags.reuse_execution_plan
    );

    let executable =
        compiler
            .compile(descriptor, flags)
            .map_err(|source| TransformError::CompilationFailed {
                node: node_name.to_string(),
                source,
            })?;

    Ok(CompiledArtifact {
        executable,
        reuses_execution_plan: flags.reuse_execution_plan,
        output_shapes: descriptor.output_shapes.clone(),
    })
}
