//! Backend capability queries
//!
//! The partitioner asks a [`CapabilityOracle`] whether each node can run
//! natively on the target backend. [`SupportedOps`] covers the common case of
//! a fixed operator table; any `Fn(&NodeProto) -> bool` works as well.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::proto::NodeProto;

/// Input slot indices of a node
pub type InputSlots = SmallVec<[usize; 2]>;

/// Reports whether a backend can execute a node natively
pub trait CapabilityOracle {
    /// Whether the backend can execute `node` inside a fused region
    fn supports(&self, node: &NodeProto) -> bool;

    /// Input slots whose concrete constant value the backend needs at
    /// compile time (for example the `shape` operand of `Reshape`)
    fn required_constant_inputs(&self, _node: &NodeProto) -> InputSlots {
        InputSlots::new()
    }
}

impl<F> CapabilityOracle for F
where
    F: Fn(&NodeProto) -> bool,
{
    fn supports(&self, node: &NodeProto) -> bool {
        self(node)
    }
}

/// Operator table oracle keyed by op type within one domain
#[derive(Debug, Clone, Default)]
pub struct SupportedOps {
    domain: String,
    ops: FxHashMap<String, InputSlots>,
}

impl SupportedOps {
    /// Support the given op types in the default ONNX domain
    pub fn new<I, S>(op_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domain: String::new(),
            ops: op_types
                .into_iter()
                .map(|op| (op.into(), InputSlots::new()))
                .collect(),
        }
    }

    /// Match nodes of `domain` instead of the default domain
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    /// Support `op_type` and require constant values at `slots`
    pub fn with_required_constants(mut self, op_type: &str, slots: &[usize]) -> Self {
        self.ops
            .insert(op_type.to_string(), slots.iter().copied().collect());
        self
    }

    /// Number of supported op types
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether no op type is supported
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl CapabilityOracle for SupportedOps {
    fn supports(&self, node: &NodeProto) -> bool {
        node.is_in_domain(&self.domain) && self.ops.contains_key(&node.op_type)
    }

    fn required_constant_inputs(&self, node: &NodeProto) -> InputSlots {
        if !self.supports(node) {
            return InputSlots::new();
        }
        self.ops.get(&node.op_type).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::make_node;

    #[test]
    fn test_supported_ops_matches_op_type() {
        let oracle = SupportedOps::new(["Conv", "Relu"]);

        assert!(oracle.supports(&make_node("Conv", &["X"], &["Y"], "c")));
        assert!(!oracle.supports(&make_node("TopK", &["X"], &["Y"], "t")));
        assert_eq!(oracle.len(), 2);
    }

    #[test]
    fn test_supported_ops_respects_domain() {
        let oracle = SupportedOps::new(["Relu"]);
        let mut node = make_node("Relu", &["X"], &["Y"], "r");
        node.domain = "com.vendor".to_string();

        assert!(!oracle.supports(&node));
        assert!(SupportedOps::new(["Relu"])
            .with_domain("com.vendor")
            .supports(&node));
    }

    #[test]
    fn test_required_constants() {
        let oracle = SupportedOps::new(["Relu"]).with_required_constants("Reshape", &[1]);
        let reshape = make_node("Reshape", &["X", "shape"], &["Y"], "r");

        assert!(oracle.supports(&reshape));
        assert_eq!(oracle.required_constant_inputs(&reshape).as_slice(), &[1]);
        assert!(oracle
            .required_constant_inputs(&make_node("Relu", &["X"], &["Y"], "x"))
            .is_empty());
    }

    #[test]
    fn test_closure_oracle() {
        let oracle = |node: &NodeProto| node.op_type != "Loop";

        assert!(oracle.supports(&make_node("Add", &["a", "b"], &["c"], "add")));
        assert!(!oracle.supports(&make_node("Loop", &["a"], &["c"], "loop")));
        assert!(oracle
            .required_constant_inputs(&make_node("Add", &["a"], &["c"], "add"))
            .is_empty());
    }
}
