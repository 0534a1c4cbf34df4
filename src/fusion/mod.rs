//! Region fusion
//!
//! Turns every native region found by the partitioner into one fused node
//! backed by a compiled kernel:
//!
//! 1. [`FusedNodeSpec::for_region`] captures the region interface and draws
//!    a unique name from the [`FusionSession`].
//! 2. Constants are resolved and the region described and compiled.
//! 3. [`fuse_region`] stages the node in a [`FusionTransaction`], registers
//!    the kernel and commits. A registration failure rolls the graph back.
//!
//! [`GraphFusionPass`] drives the whole sequence and plugs into the
//! [`OnnxTransformer`](crate::traits::OnnxTransformer) and
//! [`Transformer`](crate::traits::Transformer) traits.
//!
//! # Example
//!
//! ```ignore
//! use partition_fuser::capability::SupportedOps;
//! use partition_fuser::fusion::{FusionConfig, GraphFusionPass};
//!
//! let oracle = SupportedOps::new(["Conv", "Relu", "Add"]);
//! let pass = GraphFusionPass::new(&oracle, &device_compiler)
//!     .with_config(FusionConfig::new().with_min_nodes_for_plan_reuse(3));
//! let stats = pass.run(&mut ctx)?;
//! ```

pub mod config;
pub mod pass;
pub mod registrar;
pub mod transaction;

pub use config::{FusedNodeSpec, FusionConfig, FusionSession};
pub use pass::{compile_flags, fuse_graph, fuse_partitions, FusionStats, GraphFusionPass};
pub use registrar::{fuse_region, register_fused_kernel};
pub use transaction::FusionTransaction;
