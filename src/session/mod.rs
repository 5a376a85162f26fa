//! Wallet session lifecycle.
//!
//! [`SessionManager`] is the only writer of [`ConnectionState`]. Every change
//! goes through [`state::transition`]; the manager adds the side effects
//! (agent calls, persistence, error reporting) around it.

pub mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_stream::{Stream, StreamExt, wrappers::WatchStream};

use crate::agent::{AccountInfo, AgentEvent, AgentHost, NetworkInfo, WalletAgent};
use crate::config::SessionConfig;
use crate::error::{AgentError, SessionError, WalletError};
use crate::recovery::{
    AutoRecovery, ErrorReport, ErrorReporter, RecoveryCatalog, RecoveryStrategy,
    classify_agent_error, classify_validation_error,
};
use crate::retry::{execute_with_retry, should_retry_error};
use crate::store::{
    KEY_LAST_ACCOUNT, KEY_PREFERRED_NETWORK, PersistedSession, PersistenceAdapter, SessionStore,
};
use crate::validate::{
    Address, NetworkDescriptor, ValidatedPayload, describe_network, validate_connection_payload,
};

pub use self::state::{
    ConnectionSnapshot, ConnectionState, SessionEvent, SessionPhase, SessionStatus,
    TransitionError, transition,
};

/// Network name used when the agent cannot report one.
const UNREPORTED_NETWORK: &str = "unknown";

struct ConnectOutcome {
    payload: ValidatedPayload,
    network: NetworkDescriptor,
    raw_network: String,
}

/// An agent notification stamped with the epoch it arrived in.
struct QueuedEvent {
    epoch: u64,
    event: AgentEvent,
}

/// Owns the connection state and mediates every transition.
pub struct SessionManager {
    config: SessionConfig,
    host: Arc<dyn AgentHost>,
    persistence: PersistenceAdapter,
    catalog: RecoveryCatalog,
    reporter: ErrorReporter,
    recovery: AutoRecovery,
    state: watch::Sender<ConnectionState>,
    /// Held for the whole agent round-trip of a connect attempt.
    connect_gate: Mutex<()>,
    /// Bumped by every disconnect and every established session. Connect
    /// results and queued notifications from an older epoch are discarded.
    epoch: Arc<AtomicU64>,
    listening: AtomicBool,
    events_tx: mpsc::UnboundedSender<QueuedEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<QueuedEvent>>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        host: Arc<dyn AgentHost>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            catalog: RecoveryCatalog::new(config.install_url.clone(), config.support_url.clone()),
            recovery: AutoRecovery::new(
                config.auto_recovery.max_attempts,
                config.auto_recovery.retry_delay,
            ),
            config,
            host,
            persistence: PersistenceAdapter::new(store),
            reporter: ErrorReporter::new(),
            state,
            connect_gate: Mutex::new(()),
            epoch: Arc::new(AtomicU64::new(0)),
            listening: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(events_rx),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.state.borrow().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Stream of snapshots, starting with the current one.
    pub fn updates(&self) -> impl Stream<Item = ConnectionSnapshot> + Send + 'static {
        WatchStream::new(self.state.subscribe()).map(|state| state.snapshot())
    }

    /// Connected account in `prefix...suffix` form.
    pub fn formatted_address(&self) -> Option<String> {
        self.snapshot().account.map(|account| {
            account.formatted(self.config.address_prefix_len, self.config.address_suffix_len)
        })
    }

    pub fn network_descriptor(&self) -> Option<NetworkDescriptor> {
        self.snapshot().network
    }

    /// Recovery suggestions for the error currently on display.
    pub fn recovery_strategies(&self) -> Vec<RecoveryStrategy> {
        self.state
            .borrow()
            .error()
            .map(|err| self.catalog.strategies(err.kind))
            .unwrap_or_default()
    }

    pub fn error_reports(&self) -> Vec<ErrorReport> {
        self.reporter.recent()
    }

    pub async fn persisted_session(&self) -> PersistedSession {
        self.persistence.load_record().await
    }

    fn apply(&self, event: SessionEvent) -> Result<ConnectionState, TransitionError> {
        let mut outcome = Ok(ConnectionState::default());
        self.state.send_if_modified(|current| {
            let from = current.phase();
            match transition(current, &event) {
                Ok(next) => {
                    let changed = *current != next;
                    if changed {
                        tracing::debug!(
                            from = from.as_str(),
                            to = next.phase().as_str(),
                            "Session transition"
                        );
                    }
                    *current = next.clone();
                    outcome = Ok(next);
                    changed
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome
    }

    /// Connect to the agent.
    ///
    /// Resolves immediately when already connected. A second call while an
    /// attempt is in flight is rejected with [`SessionError::ConnectInProgress`]
    /// and never reaches the agent.
    pub async fn connect(&self) -> Result<ConnectionSnapshot, SessionError> {
        let current = self.state();
        if current.is_connected() {
            tracing::debug!("Connect requested while already connected");
            return Ok(current.snapshot());
        }
        if current.is_connecting() {
            return Err(SessionError::ConnectInProgress);
        }

        let Some(agent) = self.host.agent() else {
            let err = classify_agent_error(&AgentError::Unavailable);
            self.reporter.report(&err, "connect");
            if self.apply(SessionEvent::AgentUnavailable(err.clone())).is_err() {
                return Err(SessionError::ConnectInProgress);
            }
            return Err(err.into());
        };

        self.apply(SessionEvent::ConnectRequested)
            .map_err(|_| SessionError::ConnectInProgress)?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        let _gate = self.connect_gate.lock().await;
        if !self.state.borrow().is_connecting() || self.epoch.load(Ordering::SeqCst) != epoch {
            // A disconnect landed before the attempt started.
            return Err(SessionError::Cancelled);
        }

        let result = self.run_connect(agent.as_ref(), epoch).await;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::info!("Discarding connect result after disconnect");
            if result.is_ok() {
                self.disconnect_agent(agent.as_ref()).await;
            }
            return Err(SessionError::Cancelled);
        }

        match result {
            Ok(connected) => {
                // New session: notifications queued for the old one go stale.
                self.epoch.fetch_add(1, Ordering::SeqCst);
                let at = Utc::now();
                self.persistence
                    .save_session(connected.payload.address.as_str(), &connected.raw_network, at)
                    .await;
                self.apply(SessionEvent::ConnectSucceeded {
                    account: connected.payload.address.clone(),
                    network: connected.network.clone(),
                    at,
                })
                .map_err(|e| {
                    tracing::warn!("Connect result rejected by state machine: {}", e);
                    SessionError::Cancelled
                })?;
                self.recovery.reset();
                self.attach_listeners(&agent);

                tracing::info!(
                    account = %connected.payload.address,
                    network = %connected.network.name,
                    "Wallet connected"
                );
                Ok(self.snapshot())
            }
            Err(err) => {
                self.reporter.report(&err, "connect");
                self.apply(SessionEvent::ConnectFailed(err.clone()))
                    .map_err(|_| SessionError::Cancelled)?;
                Err(err.into())
            }
        }
    }

    /// One bounded attempt: the agent connect and the network lookup share
    /// the connect timeout.
    async fn attempt_connect(
        agent: &dyn WalletAgent,
        timeout: Duration,
    ) -> Result<(AccountInfo, NetworkInfo), AgentError> {
        let attempt = async {
            let account = agent.connect().await?;
            let network = match agent.network().await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!("Agent did not report a network: {}", e);
                    NetworkInfo::named(UNREPORTED_NETWORK)
                }
            };
            Ok::<_, AgentError>((account, network))
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout {
                millis: timeout.as_millis() as u64,
            }),
        }
    }

    /// Retries stop as soon as a disconnect moves the epoch past `epoch`.
    async fn run_connect(
        &self,
        agent: &dyn WalletAgent,
        epoch: u64,
    ) -> Result<ConnectOutcome, WalletError> {
        let timeout = self.config.connect_timeout;

        let (account, network_info) = execute_with_retry(
            || Self::attempt_connect(agent, timeout),
            |err: &AgentError| {
                self.epoch.load(Ordering::SeqCst) == epoch && should_retry_error(&err.to_string())
            },
            self.config.retry,
        )
        .await
        .map_err(|e| classify_agent_error(&e))?;

        let strict_network = self
            .config
            .strict_network
            .then(|| network_info.identifier());
        let payload = validate_connection_payload(
            account.address.as_deref(),
            account.public_key.as_deref(),
            strict_network,
        )
        .map_err(|e| classify_validation_error(&e))?;

        let network = payload
            .network
            .clone()
            .unwrap_or_else(|| describe_network(network_info.identifier()));

        Ok(ConnectOutcome {
            payload,
            network,
            raw_network: network_info.stored_name().to_string(),
        })
    }

    /// Best-effort agent disconnect, bounded by the connect timeout.
    async fn disconnect_agent(&self, agent: &dyn WalletAgent) {
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, agent.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Agent disconnect failed: {}", e),
            Err(_) => tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Agent disconnect timed out"
            ),
        }
    }

    /// Tear the session down. Never fails.
    ///
    /// Waits for an in-flight connect to resolve (each attempt is bounded by
    /// the connect timeout) and discards its result.
    pub async fn disconnect(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(agent) = self.host.agent() {
            self.disconnect_agent(agent.as_ref()).await;
        }

        let _gate = self.connect_gate.lock().await;
        self.persistence.clear_session().await;
        if let Err(e) = self.apply(SessionEvent::DisconnectRequested) {
            tracing::warn!("Disconnect transition rejected: {}", e);
        }
        self.recovery.reset();
        self.reporter.clear();
        tracing::info!("Wallet disconnected");
    }

    /// Dismiss the error on display. No-op when there is none.
    pub fn clear_error(&self) {
        if let Err(e) = self.apply(SessionEvent::ErrorCleared) {
            tracing::debug!("Clear error ignored: {}", e);
        }
    }

    /// Run one delayed recovery attempt for the error on display, if its
    /// budget allows. Returns `Ok(None)` when nothing was attempted.
    pub async fn try_auto_recover(&self) -> Result<Option<ConnectionSnapshot>, SessionError> {
        let Some(error) = self.state.borrow().error().cloned() else {
            return Ok(None);
        };
        let Some(attempt) = self.recovery.next_attempt(&error) else {
            tracing::debug!(kind = %error.kind, "Auto-recovery not available");
            return Ok(None);
        };

        tracing::info!(
            kind = %error.kind,
            attempt = attempt.attempt,
            delay_ms = attempt.delay.as_millis() as u64,
            "Scheduling auto-recovery"
        );
        tokio::time::sleep(attempt.delay).await;

        if self.state.borrow().error() != Some(&error) {
            tracing::debug!("Error changed during recovery delay, skipping");
            return Ok(None);
        }
        self.connect().await.map(Some)
    }

    fn attach_listeners(&self, agent: &Arc<dyn WalletAgent>) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let enqueue = self.event_sink();
        agent.on_account_change(Box::new(move |account| {
            enqueue(AgentEvent::AccountChanged(account));
        }));
        let enqueue = self.event_sink();
        agent.on_network_change(Box::new(move |network| {
            enqueue(AgentEvent::NetworkChanged(network));
        }));
    }

    /// Callback body shared by the agent listeners. Notifications arriving
    /// while not connected are dropped on the spot.
    fn event_sink(&self) -> impl Fn(AgentEvent) + Send + Sync + 'static {
        let tx = self.events_tx.clone();
        let state = self.state.subscribe();
        let epoch = Arc::clone(&self.epoch);
        move |event| {
            if !state.borrow().is_connected() {
                tracing::debug!("Dropping agent notification while not connected");
                return;
            }
            let _ = tx.send(QueuedEvent {
                epoch: epoch.load(Ordering::SeqCst),
                event,
            });
        }
    }

    async fn handle_queued(&self, queued: QueuedEvent) -> bool {
        if queued.epoch != self.epoch.load(Ordering::SeqCst) {
            tracing::debug!("Dropping agent notification from an earlier session");
            return false;
        }
        self.handle_agent_event(queued.event).await
    }

    /// Apply one agent notification. Returns whether the state changed.
    pub async fn handle_agent_event(&self, event: AgentEvent) -> bool {
        if !self.state.borrow().is_connected() {
            tracing::debug!("Ignoring agent notification while not connected");
            return false;
        }

        match event {
            AgentEvent::AccountChanged(info) => {
                let address = match Address::parse(info.address.as_deref().unwrap_or_default()) {
                    Ok(address) => address,
                    Err(e) => {
                        tracing::warn!("Ignoring account change with bad address: {}", e);
                        return false;
                    }
                };
                if let Err(e) = self.apply(SessionEvent::AccountChanged(address.clone())) {
                    tracing::debug!("Account change ignored: {}", e);
                    return false;
                }
                self.persistence
                    .set(KEY_LAST_ACCOUNT, address.as_str())
                    .await;
                tracing::info!(account = %address, "Wallet account changed");
                true
            }
            AgentEvent::NetworkChanged(info) => {
                let network = describe_network(info.identifier());
                if let Err(e) = self.apply(SessionEvent::NetworkChanged(network.clone())) {
                    tracing::debug!("Network change ignored: {}", e);
                    return false;
                }
                self.persistence
                    .set(KEY_PREFERRED_NETWORK, info.stored_name())
                    .await;
                tracing::info!(network = %network.name, "Wallet network changed");
                true
            }
        }
    }

    /// Apply every queued agent notification. Returns how many changed state.
    pub async fn drain_agent_events(&self) -> usize {
        let mut rx = self.events_rx.lock().await;
        let mut applied = 0;
        while let Ok(queued) = rx.try_recv() {
            if self.handle_queued(queued).await {
                applied += 1;
            }
        }
        applied
    }

    /// Apply agent notifications as they arrive. Runs until the task is
    /// dropped; do not combine with [`Self::drain_agent_events`].
    pub async fn run_agent_events(&self) {
        let mut rx = self.events_rx.lock().await;
        while let Some(queued) = rx.recv().await {
            self.handle_queued(queued).await;
        }
    }
}
