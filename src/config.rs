//! Configuration for wallet sessions.
//!
//! Values come from environment variables (the binary loads `.env` through
//! dotenvy first) and fall back to defaults. Blank values count as unset.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const DEFAULT_INSTALL_URL: &str = "https://petra.app/";
pub const DEFAULT_SUPPORT_URL: &str = "https://aptos.dev/";

/// Startup auto-reconnect settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Wait before the first attempt so the agent has time to inject itself.
    pub delay: Duration,
    /// Lifetime cap on scheduler attempts.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }
}

/// Per-error auto-recovery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoRecoveryConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for AutoRecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(2000),
        }
    }
}

/// Main configuration for a [`crate::session::SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    pub reconnect: ReconnectConfig,
    pub auto_recovery: AutoRecoveryConfig,
    /// Validate the agent-reported network against the registry on connect.
    pub strict_network: bool,
    pub install_url: String,
    pub support_url: String,
    /// JSON file used by [`crate::store::FileStore`].
    pub session_path: PathBuf,
    pub address_prefix_len: usize,
    pub address_suffix_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(30_000),
            retry: RetryPolicy::default(),
            reconnect: ReconnectConfig::default(),
            auto_recovery: AutoRecoveryConfig::default(),
            strict_network: false,
            install_url: DEFAULT_INSTALL_URL.to_string(),
            support_url: DEFAULT_SUPPORT_URL.to_string(),
            session_path: default_session_path(),
            address_prefix_len: 6,
            address_suffix_len: 4,
        }
    }
}

/// Default session file path (`~/.wallet-session/session.json`).
pub fn default_session_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wallet-session")
        .join("session.json")
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            connect_timeout: millis_env("WALLET_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?,
            retry: RetryPolicy {
                max_attempts: parse_env("WALLET_RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                base_delay: millis_env("WALLET_RETRY_BASE_DELAY_MS", defaults.retry.base_delay)?,
            },
            reconnect: ReconnectConfig {
                delay: millis_env("WALLET_RECONNECT_DELAY_MS", defaults.reconnect.delay)?,
                max_attempts: parse_env(
                    "WALLET_RECONNECT_MAX_ATTEMPTS",
                    defaults.reconnect.max_attempts,
                )?,
            },
            auto_recovery: AutoRecoveryConfig {
                max_attempts: parse_env(
                    "WALLET_AUTO_RECOVERY_MAX_ATTEMPTS",
                    defaults.auto_recovery.max_attempts,
                )?,
                retry_delay: millis_env(
                    "WALLET_AUTO_RECOVERY_DELAY_MS",
                    defaults.auto_recovery.retry_delay,
                )?,
            },
            strict_network: bool_env("WALLET_STRICT_NETWORK", defaults.strict_network)?,
            install_url: url_env("WALLET_INSTALL_URL", &defaults.install_url)?,
            support_url: url_env("WALLET_SUPPORT_URL", &defaults.support_url)?,
            session_path: optional_env("WALLET_SESSION_PATH")?
                .map(PathBuf::from)
                .unwrap_or(defaults.session_path),
            address_prefix_len: defaults.address_prefix_len,
            address_suffix_len: defaults.address_suffix_len,
        })
    }
}

fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvRead {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a number: {e}"),
        })
        .map(|value| value.unwrap_or(default))
}

fn millis_env(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = parse_env::<u64>(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

fn bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key)? {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got '{value}'"),
            }),
        },
    }
}

fn url_env(key: &str, default: &str) -> Result<String, ConfigError> {
    let Some(value) = optional_env(key)? else {
        return Ok(default.to_string());
    };
    url::Url::parse(&value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be an absolute URL: {e}"),
    })?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes env-mutating tests to prevent parallel races.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const KEYS: [&str; 4] = [
        "WALLET_RETRY_MAX_ATTEMPTS",
        "WALLET_CONNECT_TIMEOUT_MS",
        "WALLET_STRICT_NETWORK",
        "WALLET_INSTALL_URL",
    ];

    fn clear_env() {
        for key in KEYS {
            // SAFETY: Serialized by ENV_MUTEX in tests.
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_without_env() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let config = SessionConfig::from_env().unwrap();
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert!(!config.strict_network);
        assert_eq!(config.install_url, DEFAULT_INSTALL_URL);
    }

    #[test]
    fn reads_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        // SAFETY: Serialized by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("WALLET_RETRY_MAX_ATTEMPTS", "5");
            std::env::set_var("WALLET_CONNECT_TIMEOUT_MS", " 250 ");
            std::env::set_var("WALLET_STRICT_NETWORK", "TRUE");
        }

        let config = SessionConfig::from_env().unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert!(config.strict_network);

        clear_env();
    }

    #[test]
    fn rejects_bad_values() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        // SAFETY: Serialized by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("WALLET_INSTALL_URL", "not a url");
        }

        let err = SessionConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "WALLET_INSTALL_URL"
        ));

        clear_env();
    }

    #[test]
    fn default_session_path_is_under_home() {
        let path = default_session_path();
        assert!(path.ends_with("session.json"));
        assert!(path.to_string_lossy().contains(".wallet-session"));
    }
}
