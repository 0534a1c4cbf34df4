//! Graph manipulation module for ONNX models
//!
//! This module provides the core infrastructure for working with ONNX graphs:
//!
//! - [`GraphContext`]: Central structure for graph operations with O(1) lookups
//! - [`maps`]: Type definitions and builders for graph maps
//!
//! # Example
//!
//! ```ignore
//! use partition_fuser::graph::GraphContext;
//!
//! let ctx = GraphContext::new(&graph);
//!
//! let producer = ctx.get_producer_name("conv_out");
//! let consumers = ctx.get_consumer_names("conv_out");
//! let order = ctx.topological_order()?;
//! ```
//!
//! # Maps
//!
//! | Map | Description |
//! |-----|-------------|
//! | `producer_map` | output_name → producer node name |
//! | `consumer_map` | tensor_name → consumer node names |
//! | `node_map` | node_name → OpEntry (order preserved) |
//! | `initializer_map` | name → TensorProto |
//! | `value_info_map` | name → ValueInfoProto |

pub mod accessors;
pub mod context;
pub mod maps;
pub mod mutators;

// Re-export main types
pub use context::GraphContext;
pub use maps::{
    ConsumerMap, GraphIoMap, InitializerMap, NodeMap, OpEntry, ProducerMap, ValueInfoMap,
};
