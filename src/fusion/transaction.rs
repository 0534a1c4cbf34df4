//! Staged replacement of a region by its fused node
//!
//! [`FusionTransaction::stage`] inserts the fused node as a placeholder
//! that reads the region inputs but does not own the region outputs yet.
//! [`commit`](FusionTransaction::commit) removes the region and hands the
//! outputs over; [`rollback`](FusionTransaction::rollback), or dropping an
//! unfinished transaction, removes the placeholder again.

use log::trace;

use crate::error::{OnnxResult, TransformError};
use crate::graph::GraphContext;
use crate::proto::NodeProto;

use super::config::FusedNodeSpec;

/// An in-flight replacement of a region
pub struct FusionTransaction<'g> {
    ctx: &'g mut GraphContext,
    fused_name: String,
    region_nodes: Vec<String>,
    finished: bool,
}

impl<'g> FusionTransaction<'g> {
    /// Stage the fused node for `region_nodes`
    ///
    /// Every region node must exist and the fused name must be free.
    pub fn stage(
        ctx: &'g mut GraphContext,
        spec: &FusedNodeSpec,
        region_nodes: Vec<String>,
    ) -> OnnxResult<Self> {
        if let Some(missing) = region_nodes.iter().find(|n| !ctx.has_node(n)) {
            return Err(TransformError::InvalidNode(format!(
                "region node '{missing}' is not in the graph"
            )));
        }
        ctx.insert_placeholder(spec.to_node())?;
        trace!("Staged '{}' for {} nodes", spec.name, region_nodes.len());

        Ok(Self {
            ctx,
            fused_name: spec.name.clone(),
            region_nodes,
            finished: false,
        })
    }

    /// Graph view while the transaction is open
    pub fn context(&self) -> &GraphContext {
        self.ctx
    }

    pub fn fused_name(&self) -> &str {
        &self.fused_name
    }

    /// Remove the region and make the fused node own its outputs
    ///
    /// Returns the removed nodes in region order. Fails without touching the
    /// region when the staged node is no longer a placeholder.
    pub fn commit(mut self) -> OnnxResult<Vec<NodeProto>> {
        if !self.ctx.is_placeholder(&self.fused_name) {
            return Err(TransformError::InvalidNode(format!(
                "'{}' is not staged",
                self.fused_name
            )));
        }
        let removed: Vec<NodeProto> = self
            .region_nodes
            .iter()
            .filter_map(|name| self.ctx.remove_node(name))
            .collect();
        self.ctx.commit_placeholder(&self.fused_name)?;
        self.finished = true;
        trace!("Committed '{}'", self.fused_name);
        Ok(removed)
    }

    /// Undo the staging, leaving the graph as it was before
    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        if !self.finished {
            self.ctx.remove_node(&self.fused_name);
            self.finished = true;
            trace!("Rolled back '{}'", self.fused_name);
        }
    }
}

impl Drop for FusionTransaction<'_> {
    fn drop(&mut self) {
        self.undo();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mul_add_relu_graph;

    fn spec() -> FusedNodeSpec {
        FusedNodeSpec {
            name: "Fused_0_0".to_string(),
            domain: "com.test".to_string(),
            since_version: 1,
            region: 0,
            inputs: vec!["X".to_string(), "W".to_string(), "B".to_string()],
            outputs: vec!["Y".to_string()],
        }
    }

    fn region_nodes() -> Vec<String> {
        vec!["mul".to_string(), "add".to_string(), "relu".to_string()]
    }

    fn snapshot(ctx: &GraphContext) -> (Vec<String>, Option<String>, Vec<String>) {
        (
            ctx.node_names().cloned().collect(),
            ctx.get_producer_name("Y").cloned(),
            ctx.get_consumer_names("X").unwrap_or_default().to_vec(),
        )
    }

    #[test]
    fn test_commit_replaces_region() {
        let mut ctx = GraphContext::new(&mul_add_relu_graph());

        let tx = FusionTransaction::stage(&mut ctx, &spec(), region_nodes()).unwrap();
        assert!(tx.context().is_placeholder("Fused_0_0"));
        let removed = tx.commit().unwrap();

        assert_eq!(removed.len(), 3);
        assert_eq!(ctx.node_names().collect::<Vec<_>>(), vec!["Fused_0_0"]);
        assert_eq!(ctx.get_producer_name("Y"), Some(&"Fused_0_0".to_string()));
        assert!(ctx.get_producer_name("m").is_none());
        assert_eq!(
            ctx.get_consumer_names("X"),
            Some(&["Fused_0_0".to_string()][..])
        );
    }

    #[test]
    fn test_rollback_restores_graph() {
        let mut ctx = GraphContext::new(&mul_add_relu_graph());
        let before = snapshot(&ctx);

        let tx = FusionTransaction::stage(&mut ctx, &spec(), region_nodes()).unwrap();
        tx.rollback();

        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn test_drop_rolls_back() {
        let mut ctx = GraphContext::new(&mul_add_relu_graph());
        let before = snapshot(&ctx);

        {
            let _tx = FusionTransaction::stage(&mut ctx, &spec(), region_nodes()).unwrap();
        }

        assert_eq!(snapshot(&ctx), before);
        assert!(!ctx.has_node("Fused_0_0"));
    }

    #[test]
    fn test_commit_without_placeholder_keeps_region() {
        let mut ctx = GraphContext::new(&mul_add_relu_graph());
        let before = snapshot(&ctx);

        let mut tx = FusionTransaction::stage(&mut ctx, &spec(), region_nodes()).unwrap();
        tx.ctx.remove_node("Fused_0_0");

        assert!(tx.commit().is_err());
        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn test_stage_rejects_unknown_region_node() {
        let mut ctx = GraphContext::new(&mul_add_relu_graph());

        assert!(FusionTransaction::stage(&mut ctx, &spec(), vec!["ghost".to_string()]).is_err());
        assert!(!ctx.has_node("Fused_0_0"));
    }
}
