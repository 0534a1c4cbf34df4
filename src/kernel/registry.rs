//! Kernel registry keyed by (domain, op type, version)

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use crate::error::{OnnxResult, TransformError};
use crate::proto::{NodeProto, TensorProto};

/// Something that computes a node's outputs from its inputs
pub trait Kernel: Send + Sync {
    /// Run the kernel on the caller-supplied inputs
    fn compute(&self, inputs: &[&TensorProto]) -> OnnxResult<Vec<TensorProto>>;
}

/// Builds a kernel instance for a node
pub type KernelFactory = Arc<dyn Fn(&NodeProto) -> OnnxResult<Box<dyn Kernel>> + Send + Sync>;

/// Identity of a registered kernel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelSignature {
    pub domain: String,
    pub op_type: String,
    pub since_version: i64,
    pub provider: String,
}

impl KernelSignature {
    pub fn new(domain: &str, op_type: &str, since_version: i64, provider: &str) -> Self {
        Self {
            domain: domain.to_string(),
            op_type: op_type.to_string(),
            since_version,
            provider: provider.to_string(),
        }
    }

    fn validate(&self) -> OnnxResult<()> {
        if self.domain.is_empty() || self.op_type.is_empty() {
            return Err(TransformError::RegistrationFailed(format!(
                "malformed signature {self}: domain and op type must be set"
            )));
        }
        if self.since_version < 1 {
            return Err(TransformError::RegistrationFailed(format!(
                "malformed signature {self}: version must be at least 1"
            )));
        }
        Ok(())
    }

    fn key(&self) -> (String, String) {
        (self.domain.clone(), self.op_type.clone())
    }
}

impl fmt::Display for KernelSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{} (v{}, {})",
            self.domain, self.op_type, self.since_version, self.provider
        )
    }
}

struct Entry {
    signature: KernelSignature,
    factory: KernelFactory,
}

/// Registry of kernels for custom-domain nodes
#[derive(Default)]
pub struct KernelRegistry {
    entries: IndexMap<(String, String), Entry>,
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|e| &e.signature))
            .finish()
    }
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `signature`
    ///
    /// Fails with `RegistrationFailed` on a malformed signature or when a
    /// kernel is already registered for the same domain and op type.
    pub fn register(&mut self, signature: KernelSignature, factory: KernelFactory) -> OnnxResult<()> {
        signature.validate()?;
        let key = signature.key();
        if self.entries.contains_key(&key) {
            return Err(TransformError::RegistrationFailed(format!(
                "duplicate kernel {signature}"
            )));
        }
        debug!("Registered kernel {}", signature);
        self.entries.insert(key, Entry { signature, factory });
        Ok(())
    }

    /// Remove a kernel, returning whether it was present
    pub fn unregister(&mut self, domain: &str, op_type: &str) -> bool {
        self.entries
            .shift_remove(&(domain.to_string(), op_type.to_string()))
            .is_some()
    }

    pub fn contains(&self, domain: &str, op_type: &str) -> bool {
        self.entries
            .contains_key(&(domain.to_string(), op_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered signatures in registration order
    pub fn signatures(&self) -> impl Iterator<Item = &KernelSignature> {
        self.entries.values().map(|e| &e.signature)
    }

    /// Instantiate the kernel registered for `node`
    pub fn create_kernel(&self, node: &NodeProto) -> OnnxResult<Box<dyn Kernel>> {
        let entry = self
            .entries
            .get(&(node.domain.clone(), node.op_type.clone()))
            .ok_or_else(|| {
                TransformError::InvalidNode(format!(
                    "no kernel registered for {}::{}",
                    node.domain, node.op_type
                ))
            })?;
        (entry.factory)(node)
    }
}
