//! Kernel registry and fused kernels
//!
//! Every fused node gets a registry entry whose factory builds a
//! [`FusedKernel`] bound to the region's compiled artifact and constants.
//! The kernel state is immutable and shared; each call to
//! [`Kernel::compute`] gets its own [`ExecutionScratch`].

pub mod fused;
pub mod registry;

pub use fused::{CompiledKernelDescriptor, ExecutionScratch, FusedKernel};
pub use registry::{Kernel, KernelFactory, KernelRegistry, KernelSignature};
