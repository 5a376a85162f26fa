//! Wallet connection lifecycle management.
//!
//! The [`session::SessionManager`] connects to an injected wallet agent,
//! validates what it returns, persists the session and keeps a single
//! observable [`session::ConnectionState`] current. Failures are classified
//! into a small set of [`error::WalletErrorKind`]s with recovery suggestions.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod observability;
pub mod reconnect;
pub mod recovery;
pub mod retry;
pub mod session;
pub mod store;
pub mod validate;

pub use agent::{AgentHost, InjectedAgent, WalletAgent};
pub use config::SessionConfig;
pub use error::{SessionError, WalletError, WalletErrorKind};
pub use reconnect::{AutoReconnect, ReconnectOutcome};
pub use session::{ConnectionSnapshot, ConnectionState, SessionManager};
pub use store::{FileStore, MemoryStore, SessionStore};
