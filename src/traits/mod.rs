//! Core traits for graph rewriting
//!
//! [`Transformer`] rewrites a whole model; [`OnnxTransformer`] rewrites a
//! [`GraphContext`] in place and reports what it did.

use crate::error::OnnxResult;
use crate::graph::GraphContext;
use crate::proto::ModelProto;

/// Model-level transformation
///
/// # Example
///
/// ```ignore
/// struct MyTransformer;
///
/// impl Transformer for MyTransformer {
///     fn transform(&self, model: ModelProto) -> OnnxResult<ModelProto> {
///         Ok(model)
///     }
/// }
/// ```
pub trait Transformer {
    /// Transform the given model
    fn transform(&self, model: ModelProto) -> OnnxResult<ModelProto>;
}

/// Transformation result for statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformResult {
    /// Number of patterns matched
    pub patterns_matched: usize,
    /// Number of transformations applied
    pub transforms_applied: usize,
    /// Number of nodes eliminated
    pub nodes_eliminated: usize,
    /// Names of transformed nodes
    pub transformed_nodes: Vec<String>,
}

impl TransformResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge with another result
    pub fn merge(&mut self, other: TransformResult) {
        self.patterns_matched += other.patterns_matched;
        self.transforms_applied += other.transforms_applied;
        self.nodes_eliminated += other.nodes_eliminated;
        self.transformed_nodes.extend(other.transformed_nodes);
    }
}

/// Graph-level transformation over a [`GraphContext`]
pub trait OnnxTransformer {
    /// Name of the transformer
    fn name(&self) -> &'static str;

    /// Apply the transformation
    fn transform(&self, ctx: &mut GraphContext) -> OnnxResult<TransformResult>;

    /// Check if this transformer is applicable to the graph
    fn is_applicable(&self, _ctx: &GraphContext) -> bool {
        true
    }
}

/// Run transformers in sequence, stopping at the first error
pub fn run_transformers(
    ctx: &mut GraphContext,
    transformers: &[&dyn OnnxTransformer],
) -> OnnxResult<TransformResult> {
    let mut total = TransformResult::new();

    for transformer in transformers {
        if transformer.is_applicable(ctx) {
            log::debug!("Running {}", transformer.name());
            total.merge(transformer.transform(ctx)?);
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mul_add_relu_graph;

    /// Drops the node named `target`
    struct DropNode {
        target: &'static str,
    }

    impl OnnxTransformer for DropNode {
        fn name(&self) -> &'static str {
            "DropNode"
        }

        fn transform(&self, ctx: &mut GraphContext) -> OnnxResult<TransformResult> {
            let mut result = TransformResult::new();
            if ctx.remove_node(self.target).is_some() {
                result.nodes_eliminated += 1;
                result.transformed_nodes.push(self.target.to_string());
            }
            Ok(result)
        }

        fn is_applicable(&self, ctx: &GraphContext) -> bool {
            ctx.has_node(self.target)
        }
    }

    #[test]
    fn test_run_transformers_merges_results() {
        let mut ctx = GraphContext::new(&mul_add_relu_graph());
        let relu = DropNode { target: "relu" };
        let add = DropNode { target: "add" };

        let total = run_transformers(&mut ctx, &[&relu, &add, &relu]).unwrap();

        assert_eq!(total.nodes_eliminated, 2);
        assert_eq!(total.transformed_nodes, vec!["relu", "add"]);
        assert_eq!(ctx.node_count(), 1);
    }
}
