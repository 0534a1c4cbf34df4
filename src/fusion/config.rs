//! Fusion configuration and naming

use crate::partition::{Region, RegionId};
use crate::proto::NodeProto;

/// Fusion pass configuration
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Prefix of fused node names
    pub name_prefix: String,
    /// Domain fused nodes and their kernels are registered in
    pub domain: String,
    /// Execution provider recorded in kernel signatures
    pub provider: String,
    /// Regions with at least this many nodes compile to a reusable plan
    pub min_nodes_for_plan_reuse: usize,
    /// Allow vendor-specific operator implementations
    pub vendor_extensions: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            name_prefix: "FusedPartition_".to_string(),
            domain: "com.partition_fuser".to_string(),
            provider: "DeviceExecutionProvider".to_string(),
            min_nodes_for_plan_reuse: 5,
            vendor_extensions: true,
        }
    }
}

impl FusionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fused node name prefix
    pub fn with_name_prefix(mut self, prefix: &str) -> Self {
        self.name_prefix = prefix.to_string();
        self
    }

    /// Set the fusion domain
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    /// Set the execution provider name
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    /// Set the node count from which execution plans are reused
    pub fn with_min_nodes_for_plan_reuse(mut self, min_nodes: usize) -> Self {
        self.min_nodes_for_plan_reuse = min_nodes;
        self
    }

    /// Enable or disable vendor extensions
    pub fn with_vendor_extensions(mut self, enabled: bool) -> Self {
        self.vendor_extensions = enabled;
        self
    }
}

/// Naming state carried across fusion passes
///
/// The counter grows by one for every fused region, so names stay unique
/// for as long as one session is reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionSession {
    counter: u64,
}

impl FusionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fused nodes named so far
    pub fn fused_count(&self) -> u64 {
        self.counter
    }

    /// Allocate the name for the fused node replacing `region`
    pub fn next_name(&mut self, prefix: &str, region: RegionId) -> String {
        let name = format!("{}{}_{}", prefix, self.counter, region);
        self.counter += 1;
        name
    }
}

/// The node that will stand in for a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedNodeSpec {
    /// Node name, also used as op type
    pub name: String,
    pub domain: String,
    pub since_version: i64,
    pub region: RegionId,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl FusedNodeSpec {
    /// Capture a region's interface under a freshly allocated name
    pub fn for_region(region: &Region, session: &mut FusionSession, config: &FusionConfig) -> Self {
        Self {
            name: session.next_name(&config.name_prefix, region.id),
            domain: config.domain.clone(),
            since_version: 1,
            region: region.id,
            inputs: region.inputs.clone(),
            outputs: region.outputs.clone(),
        }
    }

    /// Graph node for this spec
    pub fn to_node(&self) -> NodeProto {
        NodeProto {
            name: self.name.clone(),
            op_type: self.name.clone(),
            domain: self.domain.clone(),
            input: self.inputs.clone(),
            output: self.outputs.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_names_are_unique() {
        let mut session = FusionSession::new();

        assert_eq!(session.next_name("Fused_", 0), "Fused_0_0");
        assert_eq!(session.next_name("Fused_", 0), "Fused_1_0");
        assert_eq!(session.next_name("Fused_", 7), "Fused_2_7");
        assert_eq!(session.fused_count(), 3);
    }

    #[test]
    fn test_spec_to_node() {
        let region = Region {
            id: 4,
            root: 4,
            native: true,
            nodes: vec![4, 5],
            inputs: vec!["X".to_string(), "W".to_string()],
            outputs: vec!["Y".to_string()],
        };
        let config = FusionConfig::default().with_domain("com.test");
        let mut session = FusionSession::new();

        let spec = FusedNodeSpec::for_region(&region, &mut session, &config);
        let node = spec.to_node();

        assert_eq!(node.name, "FusedPartition_0_4");
        assert_eq!(node.op_type, node.name);
        assert_eq!(node.domain, "com.test");
        assert_eq!(node.input, vec!["X", "W"]);
        assert_eq!(node.output, vec!["Y"]);
        assert_eq!(spec.since_version, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = FusionConfig::new()
            .with_name_prefix("Dml_")
            .with_provider("DmlExecutionProvider")
            .with_min_nodes_for_plan_reuse(2)
            .with_vendor_extensions(false);

        assert_eq!(config.name_prefix, "Dml_");
        assert_eq!(config.provider, "DmlExecutionProvider");
        assert_eq!(config.min_nodes_for_plan_reuse, 2);
        assert!(!config.vendor_extensions);
    }
}
