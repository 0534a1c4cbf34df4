//! Graph partitioning
//!
//! Splits a graph into regions of nodes the backend can run natively and
//! singleton regions for everything else, keeping the region graph acyclic.
//!
//! # Example
//!
//! ```ignore
//! use partition_fuser::capability::SupportedOps;
//! use partition_fuser::partition::Partitioner;
//!
//! let oracle = SupportedOps::new(["Conv", "Relu", "Add"]);
//! let partitions = Partitioner::new(&oracle).partition(&ctx)?;
//! for region in partitions.native_roots() {
//!     println!("{} nodes, inputs {:?}", region.len(), region.inputs);
//! }
//! ```

pub mod arena;
pub mod partitioner;
pub mod region;

pub use arena::{RegionArena, RegionId};
pub use partitioner::Partitioner;
pub use region::{NodeProperties, PartitionSet, Region};
