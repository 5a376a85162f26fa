//! Error classification, recovery suggestions and recovery bookkeeping.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AgentError, ValidationError, WalletError, WalletErrorKind};

/// Priority given to the trailing "contact support" entry.
pub const SUPPORT_PRIORITY: u32 = 99;

const REPORT_HISTORY_LIMIT: usize = 50;

/// Map a raw failure message onto the taxonomy.
pub fn classify_message(message: &str) -> WalletErrorKind {
    let lowered = message.to_ascii_lowercase();

    if lowered.contains("not installed")
        || lowered.contains("not found")
        || lowered.contains("no wallet")
    {
        WalletErrorKind::NotInstalled
    } else if lowered.contains("rejected")
        || lowered.contains("user denied")
        || lowered.contains("cancelled")
        || lowered.contains("canceled")
    {
        WalletErrorKind::ConnectionRejected
    } else if lowered.contains("locked") {
        WalletErrorKind::WalletLocked
    } else if lowered.contains("unsupported network")
        || lowered.contains("network not supported")
        || lowered.contains("wrong network")
    {
        WalletErrorKind::NetworkUnsupported
    } else {
        WalletErrorKind::Unknown
    }
}

pub fn classify_agent_error(err: &AgentError) -> WalletError {
    let kind = match err {
        AgentError::Unavailable => WalletErrorKind::NotInstalled,
        AgentError::Rejected(_) => WalletErrorKind::ConnectionRejected,
        AgentError::Failed(message) => classify_message(message),
        AgentError::Timeout { .. } => WalletErrorKind::Unknown,
    };
    WalletError::new(kind, err.to_string())
}

pub fn classify_validation_error(err: &ValidationError) -> WalletError {
    WalletError::new(classify_message(&err.to_string()), err.to_string())
}

/// What a recovery suggestion asks the user (or the app) to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Install,
    Retry,
    Unlock,
    SwitchNetwork,
    Reload,
    ContactSupport,
}

/// A suggested action. Lists are sorted by ascending `priority`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStrategy {
    pub action: RecoveryAction,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub priority: u32,
}

impl RecoveryStrategy {
    fn new(action: RecoveryAction, title: &str, description: &str, priority: u32) -> Self {
        Self {
            action,
            title: title.to_string(),
            description: description.to_string(),
            action_url: None,
            priority,
        }
    }

    fn with_url(mut self, url: &str) -> Self {
        self.action_url = Some(url.to_string());
        self
    }
}

/// Fixed recovery suggestions per error kind.
#[derive(Debug, Clone)]
pub struct RecoveryCatalog {
    install_url: String,
    support_url: String,
}

impl Default for RecoveryCatalog {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_INSTALL_URL, crate::config::DEFAULT_SUPPORT_URL)
    }
}

impl RecoveryCatalog {
    pub fn new(install_url: impl Into<String>, support_url: impl Into<String>) -> Self {
        Self {
            install_url: install_url.into(),
            support_url: support_url.into(),
        }
    }

    pub fn strategies(&self, kind: WalletErrorKind) -> Vec<RecoveryStrategy> {
        use RecoveryAction::*;

        let mut strategies = match kind {
            WalletErrorKind::NotInstalled => vec![
                RecoveryStrategy::new(
                    Install,
                    "Install Petra wallet",
                    "Install the Petra browser extension, then reload this page.",
                    1,
                )
                .with_url(&self.install_url),
            ],
            WalletErrorKind::ConnectionRejected => vec![RecoveryStrategy::new(
                Retry,
                "Try again",
                "Start the connection again and approve the request in your wallet.",
                1,
            )],
            WalletErrorKind::NetworkUnsupported => vec![RecoveryStrategy::new(
                SwitchNetwork,
                "Switch network",
                "Open your wallet and switch to Mainnet, Testnet or Devnet.",
                1,
            )],
            WalletErrorKind::WalletLocked => vec![
                RecoveryStrategy::new(
                    Unlock,
                    "Unlock your wallet",
                    "Open the wallet extension and enter your password.",
                    1,
                ),
                RecoveryStrategy::new(
                    Retry,
                    "Try again",
                    "Once unlocked, start the connection again.",
                    2,
                ),
            ],
            WalletErrorKind::Unknown => vec![
                RecoveryStrategy::new(
                    Retry,
                    "Try again",
                    "The problem may be temporary. Try connecting again.",
                    1,
                ),
                RecoveryStrategy::new(
                    Reload,
                    "Reload the page",
                    "Reload the page to reinitialize the wallet extension.",
                    2,
                ),
            ],
        };

        if !strategies.is_empty() {
            strategies.push(
                RecoveryStrategy::new(
                    ContactSupport,
                    "Contact support",
                    "If the problem persists, reach out to support.",
                    SUPPORT_PRIORITY,
                )
                .with_url(&self.support_url),
            );
        }
        strategies.sort_by_key(|strategy| strategy.priority);
        strategies
    }
}

/// One recorded, user-visible error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub id: Uuid,
    pub kind: WalletErrorKind,
    pub message: String,
    pub detail: String,
    pub context: String,
    pub reported_at: DateTime<Utc>,
}

/// Bounded in-memory history of surfaced errors.
pub struct ErrorReporter {
    reports: Mutex<VecDeque<ErrorReport>>,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(VecDeque::with_capacity(REPORT_HISTORY_LIMIT)),
        }
    }

    pub fn report(&self, err: &WalletError, context: &str) -> ErrorReport {
        tracing::warn!(
            kind = %err.kind,
            context,
            detail = %err.detail,
            "Wallet error surfaced"
        );

        let report = ErrorReport {
            id: Uuid::new_v4(),
            kind: err.kind,
            message: err.message.clone(),
            detail: err.detail.clone(),
            context: context.to_string(),
            reported_at: Utc::now(),
        };

        let mut reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        if reports.len() == REPORT_HISTORY_LIMIT {
            reports.pop_front();
        }
        reports.push_back(report.clone());
        report
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<ErrorReport> {
        let reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        reports.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// A scheduled recovery retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryAttempt {
    pub attempt: u32,
    pub delay: Duration,
}

/// Per-error recovery budget, keyed by kind and raw failure text.
///
/// Independent of the retry policy and of the startup reconnect counter.
pub struct AutoRecovery {
    max_attempts: u32,
    retry_delay: Duration,
    attempts: Mutex<HashMap<String, u32>>,
}

impl AutoRecovery {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Kinds that can resolve without the user changing anything first.
    pub fn is_recoverable(kind: WalletErrorKind) -> bool {
        matches!(kind, WalletErrorKind::WalletLocked | WalletErrorKind::Unknown)
    }

    /// Reserve the next attempt for `err`, or `None` if it is not eligible or
    /// its budget is spent. The delay grows with the attempt number.
    pub fn next_attempt(&self, err: &WalletError) -> Option<RecoveryAttempt> {
        if !Self::is_recoverable(err.kind) {
            return None;
        }

        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let count = attempts.entry(err.recovery_key()).or_insert(0);
        if *count >= self.max_attempts {
            return None;
        }
        *count += 1;

        Some(RecoveryAttempt {
            attempt: *count,
            delay: self.retry_delay.saturating_mul(*count),
        })
    }

    pub fn attempts_for(&self, err: &WalletError) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.get(&err.recovery_key()).copied().unwrap_or(0)
    }

    pub fn reset(&self) {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_substring() {
        assert_eq!(classify_message("Petra not installed"), WalletErrorKind::NotInstalled);
        assert_eq!(
            classify_message("User rejected the request"),
            WalletErrorKind::ConnectionRejected
        );
        assert_eq!(classify_message("Wallet is LOCKED"), WalletErrorKind::WalletLocked);
        assert_eq!(
            classify_message("Unsupported network: localnet"),
            WalletErrorKind::NetworkUnsupported
        );
        assert_eq!(classify_message("boom"), WalletErrorKind::Unknown);
    }

    #[test]
    fn classifies_agent_errors() {
        assert_eq!(
            classify_agent_error(&AgentError::Unavailable).kind,
            WalletErrorKind::NotInstalled
        );
        assert_eq!(
            classify_agent_error(&AgentError::Rejected("nope".to_string())).kind,
            WalletErrorKind::ConnectionRejected
        );
        assert_eq!(
            classify_agent_error(&AgentError::Timeout { millis: 10 }).kind,
            WalletErrorKind::Unknown
        );
    }

    #[test]
    fn validation_failures_map_to_taxonomy() {
        let err = classify_validation_error(&ValidationError::UnsupportedNetwork("x".into()));
        assert_eq!(err.kind, WalletErrorKind::NetworkUnsupported);

        let err = classify_validation_error(&ValidationError::InvalidAddress);
        assert_eq!(err.kind, WalletErrorKind::Unknown);
        assert_eq!(err.detail, "Invalid address format");
    }

    #[test]
    fn not_installed_leads_with_install_link() {
        let catalog = RecoveryCatalog::new("https://petra.app/", "https://support.example");
        let strategies = catalog.strategies(WalletErrorKind::NotInstalled);

        assert_eq!(strategies[0].action, RecoveryAction::Install);
        assert_eq!(strategies[0].priority, 1);
        assert_eq!(strategies[0].action_url.as_deref(), Some("https://petra.app/"));
    }

    #[test]
    fn unknown_gets_retry_then_reload() {
        let strategies = RecoveryCatalog::default().strategies(WalletErrorKind::Unknown);
        let actions: Vec<_> = strategies.iter().map(|s| (s.action, s.priority)).collect();

        assert_eq!(
            actions,
            vec![
                (RecoveryAction::Retry, 1),
                (RecoveryAction::Reload, 2),
                (RecoveryAction::ContactSupport, SUPPORT_PRIORITY),
            ]
        );
    }

    #[test]
    fn support_is_always_last() {
        let catalog = RecoveryCatalog::default();
        for kind in [
            WalletErrorKind::NotInstalled,
            WalletErrorKind::ConnectionRejected,
            WalletErrorKind::NetworkUnsupported,
            WalletErrorKind::WalletLocked,
            WalletErrorKind::Unknown,
        ] {
            let strategies = catalog.strategies(kind);
            let last = strategies.last().unwrap();
            assert_eq!(last.action, RecoveryAction::ContactSupport, "{kind}");
            assert!(strategies.windows(2).all(|w| w[0].priority <= w[1].priority));
        }
    }

    #[test]
    fn reporter_keeps_bounded_history() {
        let reporter = ErrorReporter::new();
        let err = WalletError::new(WalletErrorKind::Unknown, "boom");
        for _ in 0..(REPORT_HISTORY_LIMIT + 5) {
            reporter.report(&err, "connect");
        }
        assert_eq!(reporter.recent().len(), REPORT_HISTORY_LIMIT);

        reporter.clear();
        assert!(reporter.recent().is_empty());
    }

    #[test]
    fn auto_recovery_escalates_and_caps() {
        let recovery = AutoRecovery::new(2, Duration::from_millis(500));
        let err = WalletError::new(WalletErrorKind::WalletLocked, "locked");

        assert_eq!(
            recovery.next_attempt(&err),
            Some(RecoveryAttempt {
                attempt: 1,
                delay: Duration::from_millis(500)
            })
        );
        assert_eq!(recovery.next_attempt(&err).unwrap().delay, Duration::from_millis(1000));
        assert_eq!(recovery.next_attempt(&err), None);

        recovery.reset();
        assert_eq!(recovery.attempts_for(&err), 0);
    }

    #[test]
    fn distinct_failures_of_one_kind_get_separate_budgets() {
        let recovery = AutoRecovery::new(1, Duration::from_millis(10));
        let first = WalletError::new(WalletErrorKind::Unknown, "socket closed");
        let second = WalletError::new(WalletErrorKind::Unknown, "extension crashed");

        assert!(recovery.next_attempt(&first).is_some());
        assert_eq!(recovery.next_attempt(&first), None);
        assert_eq!(recovery.next_attempt(&second).unwrap().attempt, 1);
        assert_eq!(recovery.attempts_for(&first), 1);
        assert_eq!(recovery.attempts_for(&second), 1);
    }

    #[test]
    fn auto_recovery_skips_user_actionable_kinds() {
        let recovery = AutoRecovery::new(3, Duration::from_millis(10));
        let err = WalletError::new(WalletErrorKind::ConnectionRejected, "rejected");
        assert_eq!(recovery.next_attempt(&err), None);
        assert_eq!(recovery.attempts_for(&err), 0);
    }
}
