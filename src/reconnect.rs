//! Startup auto-reconnect.
//!
//! If the last session ended connected, wait for the agent to settle and then
//! reconnect through the retry policy. The attempt budget is shared by every
//! run for the lifetime of the scheduler and is never refilled.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::task::JoinHandle;

use crate::config::ReconnectConfig;
use crate::error::SessionError;
use crate::retry::{RetryPolicy, execute_with_retry, should_retry_error};
use crate::session::{ConnectionSnapshot, SessionManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// No persisted session asked for a reconnect.
    Skipped,
    Reconnected(ConnectionSnapshot),
    /// Stopped on a non-retryable error.
    Failed(SessionError),
    /// The lifetime budget ran out.
    Exhausted(Option<SessionError>),
}

fn is_retryable(err: &SessionError) -> bool {
    match err {
        SessionError::Wallet(wallet) => should_retry_error(&wallet.detail),
        SessionError::ConnectInProgress | SessionError::Cancelled => false,
    }
}

pub struct AutoReconnect {
    manager: Arc<SessionManager>,
    config: ReconnectConfig,
    attempts: AtomicU32,
}

impl AutoReconnect {
    pub fn new(manager: Arc<SessionManager>, config: ReconnectConfig) -> Self {
        Self {
            manager,
            config,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        self.config.max_attempts.saturating_sub(self.attempts_used())
    }

    pub async fn run(&self) -> ReconnectOutcome {
        let record = self.manager.persisted_session().await;
        if !record.wants_reconnect() {
            tracing::debug!("No persisted session to restore");
            return ReconnectOutcome::Skipped;
        }
        if self.remaining() == 0 {
            tracing::info!("Auto-reconnect budget already spent");
            return ReconnectOutcome::Exhausted(None);
        }

        tracing::info!(
            account = record.last_account.as_deref().unwrap_or_default(),
            delay_ms = self.config.delay.as_millis() as u64,
            "Restoring previous wallet session"
        );
        tokio::time::sleep(self.config.delay).await;

        let policy = RetryPolicy::new(self.remaining(), self.manager.config().retry.base_delay);
        let result = execute_with_retry(
            || async {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                self.manager.connect().await
            },
            is_retryable,
            policy,
        )
        .await;

        match result {
            Ok(snapshot) => {
                tracing::info!("Previous wallet session restored");
                ReconnectOutcome::Reconnected(snapshot)
            }
            Err(err) if is_retryable(&err) && self.remaining() == 0 => {
                tracing::warn!("Auto-reconnect gave up: {}", err);
                ReconnectOutcome::Exhausted(Some(err))
            }
            Err(err) => {
                tracing::warn!("Auto-reconnect failed: {}", err);
                ReconnectOutcome::Failed(err)
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<ReconnectOutcome> {
        tokio::spawn(async move { self.run().await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::agent::{
        AccountChangeCallback, AccountInfo, InjectedAgent, NetworkChangeCallback, NetworkInfo,
        WalletAgent,
    };
    use crate::config::SessionConfig;
    use crate::error::{AgentError, WalletErrorKind};
    use crate::store::{MemoryStore, PersistenceAdapter};

    const KEY: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

    struct ScriptedAgent {
        outcomes: StdMutex<Vec<Result<AccountInfo, AgentError>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl WalletAgent for ScriptedAgent {
        async fn connect(&self) -> Result<AccountInfo, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Err(AgentError::Failed("network unreachable".to_string()))
            } else {
                outcomes.remove(0)
            }
        }

        async fn disconnect(&self) -> Result<(), AgentError> {
            Ok(())
        }

        async fn account(&self) -> Result<AccountInfo, AgentError> {
            Ok(AccountInfo::new("0xabc", KEY))
        }

        async fn network(&self) -> Result<NetworkInfo, AgentError> {
            Ok(NetworkInfo::named("Mainnet"))
        }

        fn on_account_change(&self, _callback: AccountChangeCallback) {}

        fn on_network_change(&self, _callback: NetworkChangeCallback) {}
    }

    async fn scheduler(
        outcomes: Vec<Result<AccountInfo, AgentError>>,
        persisted: bool,
    ) -> (AutoReconnect, Arc<ScriptedAgent>) {
        let agent = Arc::new(ScriptedAgent {
            outcomes: StdMutex::new(outcomes),
            calls: AtomicU32::new(0),
        });
        let store = Arc::new(MemoryStore::new());
        if persisted {
            PersistenceAdapter::new(store.clone())
                .save_session("0xabc", "Mainnet", Utc::now())
                .await;
        }

        let config = SessionConfig {
            retry: RetryPolicy::new(1, Duration::from_millis(100)),
            ..SessionConfig::default()
        };
        let manager = Arc::new(SessionManager::new(
            config,
            Arc::new(InjectedAgent::with_agent(agent.clone())),
            store,
        ));
        let reconnect = AutoReconnect::new(
            manager,
            ReconnectConfig {
                delay: Duration::from_millis(500),
                max_attempts: 3,
            },
        );
        (reconnect, agent)
    }

    #[tokio::test(start_paused = true)]
    async fn skips_without_persisted_session() {
        let (reconnect, agent) = scheduler(vec![], false).await;
        assert_eq!(reconnect.run().await, ReconnectOutcome::Skipped);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restores_session_after_delay() {
        let (reconnect, agent) = scheduler(vec![Ok(AccountInfo::new("0xabc", KEY))], true).await;
        let started = tokio::time::Instant::now();

        let outcome = reconnect.run().await;

        assert!(matches!(outcome, ReconnectOutcome::Reconnected(ref s) if s.is_connected));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_non_retryable_error() {
        let (reconnect, agent) = scheduler(
            vec![Err(AgentError::Rejected("denied".to_string()))],
            true,
        )
        .await;

        let outcome = reconnect.run().await;

        let ReconnectOutcome::Failed(err) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(
            err.wallet_error().unwrap().kind,
            WalletErrorKind::ConnectionRejected
        );
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
        assert_eq!(reconnect.remaining(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lifetime_budget_is_not_refilled() {
        let (reconnect, agent) = scheduler(vec![], true).await;

        let outcome = reconnect.run().await;
        assert!(matches!(outcome, ReconnectOutcome::Exhausted(Some(_))));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 3);

        assert_eq!(reconnect.run().await, ReconnectOutcome::Exhausted(None));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 3);
        assert!(reconnect.manager.state().error().is_some());
    }
}
