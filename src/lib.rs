//! # Partition Fuser
//!
//! Hardware-partition fusion pass for ONNX graphs.
//!
//! Given a capability oracle for an accelerator and a device compiler, the
//! pass partitions a graph into maximal regions the device can run, hands
//! each region's constants over to it, compiles the region ahead of time and
//! replaces it by a single fused node backed by a registered kernel.
//!
//! ## Pipeline
//!
//! - **Partitioning** ([`partition`]): union-find over nodes in topological
//!   order, merging supported neighbours while the region graph stays acyclic
//! - **Constant ownership** ([`initializer`]): exclusive constants move into
//!   their region, shared ones stay in the host graph
//! - **Description and compilation** ([`descriptor`]): backend-neutral
//!   region description and a one-shot compile call
//! - **Fusion** ([`fusion`]): transactional graph rewrite plus kernel
//!   registration ([`kernel`])
//!
//! ## Example
//!
//! ```ignore
//! use partition_fuser::prelude::*;
//!
//! let oracle = SupportedOps::new(["Conv", "Relu", "Add"]);
//! let pass = GraphFusionPass::new(&oracle, &device_compiler);
//! let stats = fuse_file("model.onnx", "fused.onnx", &pass, FuseOptions::default())?;
//! ```

#![deny(unsafe_code)]

pub mod builder;
pub mod capability;
pub mod descriptor;
pub mod error;
pub mod fusion;
pub mod graph;
pub mod initializer;
pub mod io;
pub mod kernel;
pub mod partition;
pub mod proto;
pub mod tensor;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_utils;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use partition_fuser::prelude::*`
pub mod prelude {
    pub use crate::builder::{build_fused_model, ModelBuilder};
    pub use crate::capability::{CapabilityOracle, SupportedOps};
    pub use crate::descriptor::{
        CompileFlags, CompiledArtifact, DeviceCompiler, Executable, RegionDescriptor,
    };
    pub use crate::error::{CompileError, OnnxResult, TransformError};
    pub use crate::fusion::{FusionConfig, FusionSession, FusionStats, GraphFusionPass};
    pub use crate::graph::GraphContext;
    pub use crate::io::{fuse_file, fuse_model, load_model, save_model, FuseOptions, FuseStats};
    pub use crate::kernel::{ExecutionScratch, Kernel, KernelRegistry};
    pub use crate::partition::{PartitionSet, Partitioner};
    pub use crate::proto::onnx::*;
    pub use crate::traits::{OnnxTransformer, Transformer};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{OnnxResult, TransformError};
pub use traits::Transformer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
