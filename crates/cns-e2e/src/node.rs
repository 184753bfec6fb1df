//! Orchestrator node to VM resolution.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ApiError;

/// Prefix of provider IDs assigned to nodes by the vSphere cloud provider.
pub const PROVIDER_PREFIX: &str = "vsphere://";

/// Extract the VM instance UUID from a node provider ID.
///
/// Returns `None` for IDs of other providers or an empty UUID.
pub fn vm_uuid_from_provider_id(provider_id: &str) -> Option<String> {
    let uuid = provider_id.trim().strip_prefix(PROVIDER_PREFIX)?;
    let uuid = uuid.trim().to_lowercase();
    if uuid.is_empty() { None } else { Some(uuid) }
}

/// Orchestrator-side node lookups.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Provider ID of `node`, or `None` if the node has none.
    async fn provider_id(&self, node: &str) -> Result<Option<String>, ApiError>;
}

/// Map-backed directory, for suites that already know their nodes.
#[derive(Debug, Clone, Default)]
pub struct StaticNodeDirectory {
    nodes: HashMap<String, String>,
}

impl StaticNodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: impl Into<String>, provider_id: impl Into<String>) -> Self {
        self.nodes.insert(node.into(), provider_id.into());
        self
    }
}

#[async_trait]
impl NodeDirectory for StaticNodeDirectory {
    async fn provider_id(&self, node: &str) -> Result<Option<String>, ApiError> {
        Ok(self.nodes.get(node).cloned())
    }
}
