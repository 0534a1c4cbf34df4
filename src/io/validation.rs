//! ONNX model validation
//!
//! Structural checks run before and after fusion. Partitioning identifies
//! nodes by name and needs an acyclic graph, so both are checked here; node
//! order in the file is not.

use rustc_hash::FxHashSet;

use crate::error::{OnnxResult, TransformError};
use crate::graph::GraphContext;
use crate::proto::{GraphProto, ModelProto, NodeProto};

/// Validation result with detailed issues
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the model is valid
    pub is_valid: bool,
    /// Critical issues
    pub errors: Vec<String>,
    /// Non-critical issues
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validation options
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Domains whose nodes carry their own constants
    ///
    /// A fused node keeps the names of the constants moved into its kernel
    /// as inputs, so those inputs have no source in the graph.
    pub kernel_bound_domains: Vec<String>,
}

impl ValidationOptions {
    pub fn with_kernel_bound_domain(mut self, domain: &str) -> Self {
        self.kernel_bound_domains.push(domain.to_string());
        self
    }

    fn is_kernel_bound(&self, node: &NodeProto) -> bool {
        self.kernel_bound_domains
            .iter()
            .any(|d| node.is_in_domain(d))
    }
}

/// Validate an ONNX model
pub fn validate_model(model: &ModelProto) -> ValidationResult {
    validate_model_with_options(model, &ValidationOptions::default())
}

/// Validate an ONNX model under `options`
pub fn validate_model_with_options(
    model: &ModelProto,
    options: &ValidationOptions,
) -> ValidationResult {
    let mut result = ValidationResult::valid();

    if model.opset_import.is_empty() {
        result.add_warning("No opset imports specified");
    }

    match &model.graph {
        Some(graph) => result.merge(validate_graph_with_options(graph, options)),
        None => result.add_error("Model does not contain a graph"),
    }

    result
}

/// Validate a graph
pub fn validate_graph(graph: &GraphProto) -> ValidationResult {
    validate_graph_with_options(graph, &ValidationOptions::default())
}

/// Validate a graph under `options`
pub fn validate_graph_with_options(
    graph: &GraphProto,
    options: &ValidationOptions,
) -> ValidationResult {
    let mut result = ValidationResult::valid();

    let mut known_tensors: FxHashSet<&str> = FxHashSet::default();
    for input in &graph.input {
        if input.name.is_empty() {
            result.add_error("Graph input has empty name");
        } else {
            known_tensors.insert(&input.name);
        }
    }
    for init in &graph.initializer {
        if init.name.is_empty() {
            result.add_warning("Initializer has empty name");
        } else {
            known_tensors.insert(&init.name);
        }
    }

    // Outputs first, so inputs may refer to nodes later in the file
    let mut node_names: FxHashSet<&str> = FxHashSet::default();
    let mut node_outputs: FxHashSet<&str> = FxHashSet::default();
    for (idx, node) in graph.node.iter().enumerate() {
        if node.op_type.is_empty() {
            result.add_error(format!("Node {} has empty op_type", idx));
        }
        if node.name.is_empty() {
            result.add_error(format!("Node {} ({}) has no name", idx, node.op_type));
        } else if !node_names.insert(&node.name) {
            result.add_error(format!("Duplicate node name '{}'", node.name));
        }
        if node.output.is_empty() {
            result.add_warning(format!(
                "Node '{}' ({}) has no outputs",
                node.name, node.op_type
            ));
        }
        for output in node.live_outputs() {
            if !node_outputs.insert(output) {
                result.add_error(format!(
                    "Duplicate output '{}' in node '{}'",
                    output, node.name
                ));
            }
            known_tensors.insert(output);
        }
    }

    for node in &graph.node {
        for input in node.live_inputs() {
            if known_tensors.contains(input.as_str()) {
                continue;
            }
            if options.is_kernel_bound(node) {
                result.add_warning(format!(
                    "Node '{}': input '{}' is bound by its kernel",
                    node.name, input
                ));
            } else {
                result.add_error(format!(
                    "Node '{}' ({}): input '{}' not found",
                    node.name, node.op_type, input
                ));
            }
        }
    }

    for output in &graph.output {
        if output.name.is_empty() {
            result.add_error("Graph output has empty name");
        } else if !known_tensors.contains(output.name.as_str()) {
            result.add_error(format!(
                "Graph output '{}' not produced by any node",
                output.name
            ));
        }
    }

    // Ordering is only meaningful once names are unique
    if result.is_valid {
        if let Err(e) = GraphContext::new(graph).topological_order() {
            result.add_error(e.to_string());
        }
    }

    if graph.node.is_empty() && graph.output.is_empty() {
        result.add_warning("Graph is empty (no nodes or outputs)");
    }

    result
}

/// Quick validation that returns an error if invalid
pub fn check_model(model: &ModelProto) -> OnnxResult<()> {
    check_model_with_options(model, &ValidationOptions::default())
}

/// [`check_model`] under `options`
pub fn check_model_with_options(model: &ModelProto, options: &ValidationOptions) -> OnnxResult<()> {
    let result = validate_model_with_options(model, options);
    if result.is_valid {
        Ok(())
    } else {
        Err(TransformError::InvalidModel(result.errors.join("; ")))
    }
}
