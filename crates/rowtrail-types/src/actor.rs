//! Acting identity attached to audit entries.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Who issued a mutation and from where.
///
/// Both parts are absent unless the hosting session sets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorContext {
    /// Acting identity (user name, service account, ...).
    pub actor: Option<String>,
    /// Originating network address.
    pub client_addr: Option<IpAddr>,
}

impl ActorContext {
    /// Context with no actor and no address.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for a named actor.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            client_addr: None,
        }
    }

    /// Set the originating address.
    pub fn with_client_addr(mut self, addr: IpAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Display identifier for logs.
    pub fn identifier(&self) -> String {
        match (&self.actor, &self.client_addr) {
            (Some(actor), Some(addr)) => format!("{}@{}", actor, addr),
            (Some(actor), None) => actor.clone(),
            (None, Some(addr)) => format!("unknown@{}", addr),
            (None, None) => "unknown".to_string(),
        }
    }
}
