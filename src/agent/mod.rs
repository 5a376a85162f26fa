//! Capability interface for the injected wallet agent.
//!
//! The session manager never talks to a wallet directly. It asks an
//! [`AgentHost`] for the agent on every connect attempt (the agent may be
//! injected late or not at all) and drives it through [`WalletAgent`].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Account identity as reported by the agent, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

impl AccountInfo {
    pub fn new(address: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            public_key: Some(public_key.into()),
        }
    }
}

/// Network identity as reported by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub name: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl NetworkInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The identifier used for registry lookups: chain id when present,
    /// otherwise the name.
    pub fn identifier(&self) -> &str {
        self.chain_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&self.name)
    }

    /// Value written to the preferred-network key: the raw name, or the
    /// identifier when the agent left the name blank.
    pub fn stored_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.identifier()
        } else {
            &self.name
        }
    }
}

pub type AccountChangeCallback = Box<dyn Fn(AccountInfo) + Send + Sync>;
pub type NetworkChangeCallback = Box<dyn Fn(NetworkInfo) + Send + Sync>;

/// Change notifications pushed by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    AccountChanged(AccountInfo),
    NetworkChanged(NetworkInfo),
}

/// The narrow contract required from a wallet agent.
///
/// `disconnect` may return an error but callers treat it as best-effort.
#[async_trait]
pub trait WalletAgent: Send + Sync {
    async fn connect(&self) -> Result<AccountInfo, AgentError>;

    async fn disconnect(&self) -> Result<(), AgentError>;

    async fn account(&self) -> Result<AccountInfo, AgentError>;

    async fn network(&self) -> Result<NetworkInfo, AgentError>;

    fn on_account_change(&self, callback: AccountChangeCallback);

    fn on_network_change(&self, callback: NetworkChangeCallback);
}

/// Locates the wallet agent in the host environment.
pub trait AgentHost: Send + Sync {
    /// `None` means the agent is not installed.
    fn agent(&self) -> Option<Arc<dyn WalletAgent>>;
}

/// An [`AgentHost`] whose agent slot is filled in by the embedder.
#[derive(Default)]
pub struct InjectedAgent {
    slot: RwLock<Option<Arc<dyn WalletAgent>>>,
}

impl InjectedAgent {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_agent(agent: Arc<dyn WalletAgent>) -> Self {
        Self {
            slot: RwLock::new(Some(agent)),
        }
    }

    pub fn inject(&self, agent: Arc<dyn WalletAgent>) {
        match self.slot.write() {
            Ok(mut guard) => *guard = Some(agent),
            Err(poisoned) => *poisoned.into_inner() = Some(agent),
        }
    }

    pub fn remove(&self) {
        match self.slot.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

impl AgentHost for InjectedAgent {
    fn agent(&self) -> Option<Arc<dyn WalletAgent>> {
        match self.slot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
