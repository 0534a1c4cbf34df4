//! Kernels backed by a compiled region

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::descriptor::{CompiledArtifact, InputEdge, InputKind};
use crate::error::{OnnxResult, TransformError};
use crate::initializer::ConstantMap;
use crate::proto::TensorProto;

use super::registry::Kernel;

/// Per-call working storage for an executable
///
/// Holds intermediate values by tensor name. A fresh scratch is created for
/// every call, so concurrent calls never share mutable state.
#[derive(Debug, Default)]
pub struct ExecutionScratch {
    values: FxHashMap<String, TensorProto>,
}

impl ExecutionScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: &str, value: TensorProto) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&TensorProto> {
        self.values.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<TensorProto> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Immutable state shared by every instance of one fused kernel
#[derive(Debug)]
pub struct CompiledKernelDescriptor {
    pub node_name: String,
    pub artifact: CompiledArtifact,
    pub inputs: Vec<String>,
    pub input_kinds: Vec<InputKind>,
    pub input_edges: Vec<InputEdge>,
    pub outputs: Vec<String>,
    pub constants: Arc<ConstantMap>,
}

impl CompiledKernelDescriptor {
    pub fn live_input_count(&self) -> usize {
        self.input_kinds
            .iter()
            .filter(|k| **k == InputKind::Live)
            .count()
    }

    /// Whether some operator reads region input `slot`
    pub fn is_input_used(&self, slot: usize) -> bool {
        self.input_edges.iter().any(|e| e.graph_input == slot)
    }
}

/// Kernel running a compiled region
#[derive(Debug, Clone)]
pub struct FusedKernel {
    descriptor: Arc<CompiledKernelDescriptor>,
}

impl FusedKernel {
    pub fn new(descriptor: Arc<CompiledKernelDescriptor>) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &CompiledKernelDescriptor {
        &self.descriptor
    }

    /// Interleave live inputs with captured constants in slot order
    fn bind_inputs<'a>(&'a self, live: &[&'a TensorProto]) -> OnnxResult<Vec<&'a TensorProto>> {
        let desc = &self.descriptor;
        let expected = desc.live_input_count();
        if live.len() != expected {
            return Err(TransformError::KernelExecution(format!(
                "'{}' expects {} live inputs, got {}",
                desc.node_name,
                expected,
                live.len()
            )));
        }

        let mut live = live.iter();
        desc.inputs
            .iter()
            .zip(&desc.input_kinds)
            .map(|(name, kind)| match kind {
                InputKind::Live => live.next().copied().ok_or_else(|| {
                    TransformError::KernelExecution(format!("missing live input '{name}'"))
                }),
                InputKind::ConstantBacked => desc.constants.get(name).ok_or_else(|| {
                    TransformError::KernelExecution(format!(
                        "constant '{name}' missing from '{}'",
                        desc.node_name
                    ))
                }),
            })
            .collect()
    }

    fn check_outputs(&self, outputs: &[TensorProto]) -> OnnxResult<()> {
        let desc = &self.descriptor;
        if outputs.len() != desc.outputs.len() {
            return Err(TransformError::KernelExecution(format!(
                "'{}' produced {} outputs, expected {}",
                desc.node_name,
                outputs.len(),
                desc.outputs.len()
            )));
        }

        let hints = &desc.artifact.output_shapes;
        for (i, output) in outputs.iter().enumerate() {
            if let Some(Some(shape)) = hints.get(i) {
                if &output.dims != shape {
                    return Err(TransformError::KernelExecution(format!(
                        "output '{}' has shape {:?}, compiled for {:?}",
                        desc.outputs[i], output.dims, shape
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Kernel for FusedKernel {
    fn compute(&self, inputs: &[&TensorProto]) -> OnnxResult<Vec<TensorProto>> {
        let bound = self.bind_inputs(inputs)?;
        let mut scratch = ExecutionScratch::new();
        let outputs = self
            .descriptor
            .artifact
            .executable()
            .execute(&bound, &mut scratch)?;
        self.check_outputs(&outputs)?;
        Ok(outputs)
    }
}
