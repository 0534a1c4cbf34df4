//! Shared fixtures for unit tests

use std::cell::RefCell;
use std::sync::Arc;

use crate::descriptor::{CompileFlags, DeviceCompiler, Executable, RegionDescriptor};
use crate::error::{CompileError, OnnxResult, TransformError};
use crate::kernel::ExecutionScratch;
use crate::partition::RegionId;
use crate::proto::extensions::{make_initializer, make_node, make_tensor_value_info};
use crate::proto::{GraphProto, TensorProto};
use crate::tensor::{array_to_tensor_f32, tensor_to_array_f32};

/// Reference executable that evaluates a handful of elementwise ops
#[derive(Debug)]
pub(crate) struct Interpreter {
    descriptor: RegionDescriptor,
}

impl Executable for Interpreter {
    fn execute(
        &self,
        inputs: &[&TensorProto],
        scratch: &mut ExecutionScratch,
    ) -> OnnxResult<Vec<TensorProto>> {
        for (name, value) in self.descriptor.inputs.iter().zip(inputs) {
            scratch.put(name, (*value).clone());
        }

        for node in &self.descriptor.nodes {
            let args = node
                .inputs
                .iter()
                .filter(|i| !i.is_empty())
                .map(|i| {
                    scratch
                        .get(i)
                        .ok_or_else(|| TransformError::KernelExecution(format!("unbound '{i}'")))
                        .and_then(tensor_to_array_f32)
                })
                .collect::<OnnxResult<Vec<_>>>()?;

            let result = match (node.op_type.as_str(), args.as_slice()) {
                ("Add", [a, b]) => a + b,
                ("Sub", [a, b]) => a - b,
                ("Mul", [a, b]) => a * b,
                ("Relu", [a]) => a.mapv(|v| v.max(0.0)),
                ("Neg", [a]) => a.mapv(|v| -v),
                (op, _) => {
                    return Err(TransformError::KernelExecution(format!(
                        "interpreter cannot run {op}"
                    )))
                }
            };
            scratch.put(&node.outputs[0], array_to_tensor_f32(&result, &node.outputs[0]));
        }

        self.descriptor
            .outputs
            .iter()
            .map(|name| {
                scratch
                    .take(name)
                    .ok_or_else(|| TransformError::KernelExecution(format!("missing '{name}'")))
            })
            .collect()
    }
}

/// Compiler producing [`Interpreter`]s and recording every call
#[derive(Debug, Default)]
pub(crate) struct InterpreterCompiler {
    pub calls: RefCell<Vec<(RegionId, CompileFlags)>>,
}

impl DeviceCompiler for InterpreterCompiler {
    fn compile(
        &self,
        descriptor: &RegionDescriptor,
        flags: CompileFlags,
    ) -> Result<Arc<dyn Executable>, CompileError> {
        self.calls.borrow_mut().push((descriptor.region, flags));
        Ok(Arc::new(Interpreter {
            descriptor: descriptor.clone(),
        }))
    }
}

/// Compiler that rejects everything
#[derive(Debug, Default)]
pub(crate) struct RejectingCompiler;

impl DeviceCompiler for RejectingCompiler {
    fn compile(
        &self,
        _descriptor: &RegionDescriptor,
        _flags: CompileFlags,
    ) -> Result<Arc<dyn Executable>, CompileError> {
        Err(CompileError::new("device out of memory"))
    }
}

/// `X * W + B -> Relu -> Y`, all ops elementwise over `[2, 2]`
pub(crate) fn mul_add_relu_graph() -> GraphProto {
    GraphProto {
        node: vec![
            make_node("Mul", &["X", "W"], &["m"], "mul"),
            make_node("Add", &["m", "B"], &["a"], "add"),
            make_node("Relu", &["a"], &["Y"], "relu"),
        ],
        input: vec![make_tensor_value_info("X", 1, &[2, 2])],
        output: vec![make_tensor_value_info("Y", 1, &[2, 2])],
        initializer: vec![
            make_initializer("W", &[2, 2], &[1.0, 2.0, 3.0, 4.0]),
            make_initializer("B", &[2, 2], &[-10.0, 0.0, 0.0, 0.0]),
        ],
        ..Default::default()
    }
}

/// `A -> U -> C` where `U` (TopK) is meant to stay on the host and both
/// sides read the shared weight `W`
pub(crate) fn split_graph() -> GraphProto {
    GraphProto {
        node: vec![
            make_node("Mul", &["X", "W"], &["a"], "A"),
            make_node("TopK", &["a"], &["u"], "U"),
            make_node("Add", &["u", "W"], &["c"], "C"),
            make_node("Add", &["c", "B"], &["Y"], "D"),
        ],
        input: vec![make_tensor_value_info("X", 1, &[4])],
        output: vec![make_tensor_value_info("Y", 1, &[4])],
        initializer: vec![
            make_initializer("W", &[4], &[1.0; 4]),
            make_initializer("B", &[4], &[2.0; 4]),
        ],
        ..Default::default()
    }
}

/// Float tensor named `name` with the given shape and values
pub(crate) fn float_tensor(name: &str, dims: &[i64], values: &[f32]) -> TensorProto {
    make_initializer(name, dims, values)
}
