//! Model builder module
//!
//! After the fusion pass has rewritten a `GraphContext`, the builder
//! assembles the final model:
//!
//! - [`ModelBuilder`]: Fluent builder for constructing models
//! - [`build_fused_model`]: Graph in topological order plus the fusion
//!   domain's opset import
//!
//! # Example
//!
//! ```ignore
//! use partition_fuser::builder::ModelBuilder;
//!
//! let model = ModelBuilder::new(original_model)
//!     .with_context(ctx)
//!     .fusion_domain("com.partition_fuser")
//!     .producer_name("partition-fuser")
//!     .build()?;
//! ```

pub mod model;

pub use model::{
    assign_node_names, build_fused_model, build_graph_from_context, ModelBuilder,
};
