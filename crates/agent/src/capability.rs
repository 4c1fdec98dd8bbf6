use serde_json::Value;
use tracing::{info, warn};

use crate::error::SessionError;
use crate::session::CapabilitySession;

/// A named operation offered by the remote server.
#[derive(Clone, Debug, PartialEq)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Capabilities discovered once per session. Names are unique; there is no
/// refresh.
#[derive(Clone, Debug, Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<Capability>,
}

impl CapabilityRegistry {
    pub fn new(capabilities: Vec<Capability>) -> Self {
        let mut registry = Self::default();
        for capability in capabilities {
            registry.register(capability);
        }
        registry
    }

    pub async fn discover<S>(session: &S) -> Result<Self, SessionError>
    where
        S: CapabilitySession + ?Sized,
    {
        let registry = Self::new(session.list_capabilities().await?);
        info!(
            event_name = "agent.capabilities.discovered",
            count = registry.len(),
            names = ?registry.names(),
            "capabilities discovered"
        );
        Ok(registry)
    }

    /// Adds a capability unless one with the same name is already present.
    pub fn register(&mut self, capability: Capability) {
        if self.contains(&capability.name) {
            warn!(
                event_name = "agent.capabilities.duplicate",
                capability = %capability.name,
                "duplicate capability name ignored"
            );
            return;
        }
        self.capabilities.push(capability);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|capability| capability.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|capability| capability.name.as_str()).collect()
    }

    pub fn as_slice(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
