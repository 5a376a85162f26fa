//! Error types for wallet sessions.

use serde::{Deserialize, Serialize};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read environment variable {key}: {message}")]
    EnvRead { key: String, message: String },
}

/// Raw failures raised by the injected wallet agent.
///
/// These never reach the UI as-is: the session manager classifies them into a
/// [`WalletError`] first.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("User rejected the request: {0}")]
    Rejected(String),

    #[error("{0}")]
    Failed(String),

    #[error("Connection timeout after {millis}ms (temporary)")]
    Timeout { millis: u64 },

    #[error("Wallet agent not installed")]
    Unavailable,
}

/// Validator failure. `Display` is the exact reason string.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Address is required")]
    MissingAddress,

    #[error("Invalid address format")]
    InvalidAddress,

    #[error("Public key is required")]
    MissingPublicKey,

    #[error("Invalid public key format")]
    InvalidPublicKey,

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
}

/// Persistence backend errors. Swallowed by the persistence adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Closed taxonomy of user-visible wallet failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletErrorKind {
    NotInstalled,
    ConnectionRejected,
    NetworkUnsupported,
    WalletLocked,
    Unknown,
}

impl WalletErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::ConnectionRejected => "connection_rejected",
            Self::NetworkUnsupported => "network_unsupported",
            Self::WalletLocked => "wallet_locked",
            Self::Unknown => "unknown",
        }
    }

    /// Canonical user-facing sentence. UIs display this verbatim.
    pub fn message(self) -> &'static str {
        match self {
            Self::NotInstalled => {
                "Petra wallet is not installed. Please install the extension to continue."
            }
            Self::ConnectionRejected => {
                "Connection request was rejected. Please approve the request in your wallet."
            }
            Self::NetworkUnsupported => {
                "The selected network is not supported. Please switch to a supported network."
            }
            Self::WalletLocked => "Your wallet is locked. Please unlock it and try again.",
            Self::Unknown => "An unexpected error occurred while connecting to your wallet.",
        }
    }
}

impl std::fmt::Display for WalletErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure as surfaced to the UI.
///
/// `message` is always the canonical sentence for `kind`; `detail` keeps the
/// raw failure text for logs and is skipped when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct WalletError {
    pub kind: WalletErrorKind,
    pub message: String,
    #[serde(skip)]
    pub detail: String,
}

impl WalletError {
    pub fn new(kind: WalletErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
            detail: detail.into(),
        }
    }

    /// Key used for per-error auto-recovery bookkeeping. The raw detail
    /// tells apart failures that share a kind.
    pub fn recovery_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.detail)
    }
}

/// Errors returned by [`crate::session::SessionManager::connect`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("A connection attempt is already in progress")]
    ConnectInProgress,

    #[error("Connection attempt was cancelled by a disconnect")]
    Cancelled,

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl SessionError {
    /// The classified wallet error, if this failure carries one.
    pub fn wallet_error(&self) -> Option<&WalletError> {
        match self {
            Self::Wallet(err) => Some(err),
            Self::ConnectInProgress | Self::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_error_uses_canonical_message() {
        let err = WalletError::new(WalletErrorKind::WalletLocked, "Wallet is locked (code 4100)");

        assert_eq!(
            err.to_string(),
            "Your wallet is locked. Please unlock it and try again."
        );
        assert_eq!(err.detail, "Wallet is locked (code 4100)");
    }

    #[test]
    fn serialized_wallet_error_omits_raw_detail() {
        let err = WalletError::new(WalletErrorKind::Unknown, "stack trace at foo.js:12");
        let value = serde_json::to_value(&err).expect("valid json");

        assert_eq!(value["kind"], "unknown");
        assert!(value.get("detail").is_none());
    }

    #[test]
    fn validation_reasons_are_stable() {
        assert_eq!(ValidationError::MissingAddress.to_string(), "Address is required");
        assert_eq!(
            ValidationError::UnsupportedNetwork("foo".to_string()).to_string(),
            "Unsupported network: foo"
        );
    }

    #[test]
    fn timeout_message_is_retryable_text() {
        let message = AgentError::Timeout { millis: 30_000 }.to_string();
        assert!(message.contains("timeout"));
    }

    #[test]
    fn recovery_key_combines_kind_and_detail() {
        let err = WalletError::new(WalletErrorKind::Unknown, "boom");
        assert_eq!(err.recovery_key(), "unknown:boom");

        let other = WalletError::new(WalletErrorKind::Unknown, "bang");
        assert_ne!(err.recovery_key(), other.recovery_key());
    }
}
