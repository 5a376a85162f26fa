//! Connection state and its transition table.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::WalletError;
use crate::validate::{Address, NetworkDescriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Resting state. Carries the last classified error until cleared.
    Disconnected { error: Option<WalletError> },
    Connecting,
    Connected {
        account: Address,
        network: NetworkDescriptor,
    },
}

/// Coarse phase label, used for logging and transition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Disconnected,
    DisconnectedWithError,
    Connecting,
    Connected,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::DisconnectedWithError => "disconnected_with_error",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: SessionStatus,
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Disconnected { error: None },
            last_connected_at: None,
        }
    }
}

impl ConnectionState {
    pub fn phase(&self) -> SessionPhase {
        match &self.status {
            SessionStatus::Disconnected { error: None } => SessionPhase::Disconnected,
            SessionStatus::Disconnected { error: Some(_) } => SessionPhase::DisconnectedWithError,
            SessionStatus::Connecting => SessionPhase::Connecting,
            SessionStatus::Connected { .. } => SessionPhase::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.status, SessionStatus::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.status, SessionStatus::Connecting)
    }

    pub fn error(&self) -> Option<&WalletError> {
        match &self.status {
            SessionStatus::Disconnected { error } => error.as_ref(),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let (account, network) = match &self.status {
            SessionStatus::Connected { account, network } => {
                (Some(account.clone()), Some(network.clone()))
            }
            _ => (None, None),
        };

        ConnectionSnapshot {
            is_connected: self.is_connected(),
            is_connecting: self.is_connecting(),
            account,
            network,
            error: self.error().cloned(),
            last_connected_at: self.last_connected_at,
        }
    }
}

/// Flat read-only view handed to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub account: Option<Address>,
    pub network: Option<NetworkDescriptor>,
    pub error: Option<WalletError>,
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Facts fed into the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectRequested,
    ConnectSucceeded {
        account: Address,
        network: NetworkDescriptor,
        at: DateTime<Utc>,
    },
    ConnectFailed(WalletError),
    /// The agent could not be reached before any attempt started.
    AgentUnavailable(WalletError),
    DisconnectRequested,
    ErrorCleared,
    AccountChanged(Address),
    NetworkChanged(NetworkDescriptor),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event} while {}: {reason}", .from.as_str())]
pub struct TransitionError {
    pub from: SessionPhase,
    pub event: String,
    pub reason: String,
}

pub fn transition(
    current: &ConnectionState,
    event: &SessionEvent,
) -> Result<ConnectionState, TransitionError> {
    let last_connected_at = current.last_connected_at;
    let next = |status| ConnectionState {
        status,
        last_connected_at,
    };

    match (&current.status, event) {
        (SessionStatus::Disconnected { .. }, SessionEvent::ConnectRequested) => {
            Ok(next(SessionStatus::Connecting))
        }
        (SessionStatus::Connecting, SessionEvent::ConnectRequested) => Err(reject(
            current,
            event,
            "a connection attempt is already in flight",
        )),
        (
            SessionStatus::Connecting,
            SessionEvent::ConnectSucceeded {
                account,
                network,
                at,
            },
        ) => Ok(ConnectionState {
            status: SessionStatus::Connected {
                account: account.clone(),
                network: network.clone(),
            },
            last_connected_at: Some(*at),
        }),
        (SessionStatus::Connecting, SessionEvent::ConnectFailed(error))
        | (SessionStatus::Disconnected { .. }, SessionEvent::AgentUnavailable(error)) => {
            Ok(next(SessionStatus::Disconnected {
                error: Some(error.clone()),
            }))
        }
        (_, SessionEvent::DisconnectRequested) => Ok(ConnectionState::default()),
        (SessionStatus::Disconnected { error: Some(_) }, SessionEvent::ErrorCleared) => {
            Ok(next(SessionStatus::Disconnected { error: None }))
        }
        (_, SessionEvent::ErrorCleared) => Ok(current.clone()),
        (SessionStatus::Connected { network, .. }, SessionEvent::AccountChanged(account)) => {
            Ok(next(SessionStatus::Connected {
                account: account.clone(),
                network: network.clone(),
            }))
        }
        (SessionStatus::Connected { account, .. }, SessionEvent::NetworkChanged(network)) => {
            Ok(next(SessionStatus::Connected {
                account: account.clone(),
                network: network.clone(),
            }))
        }
        (_, SessionEvent::AccountChanged(_) | SessionEvent::NetworkChanged(_)) => {
            Err(reject(current, event, "not connected"))
        }
        _ => Err(reject(current, event, "invalid transition")),
    }
}

fn reject(current: &ConnectionState, event: &SessionEvent, reason: &str) -> TransitionError {
    TransitionError {
        from: current.phase(),
        event: event_name(event).to_string(),
        reason: reason.to_string(),
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::ConnectRequested => "connect_requested",
        SessionEvent::ConnectSucceeded { .. } => "connect_succeeded",
        SessionEvent::ConnectFailed(_) => "connect_failed",
        SessionEvent::AgentUnavailable(_) => "agent_unavailable",
        SessionEvent::DisconnectRequested => "disconnect_requested",
        SessionEvent::ErrorCleared => "error_cleared",
        SessionEvent::AccountChanged(_) => "account_changed",
        SessionEvent::NetworkChanged(_) => "network_changed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WalletErrorKind;
    use crate::validate::describe_network;

    fn connected() -> ConnectionState {
        let connecting = transition(&ConnectionState::default(), &SessionEvent::ConnectRequested)
            .unwrap();
        transition(
            &connecting,
            &SessionEvent::ConnectSucceeded {
                account: Address::parse("0xabc").unwrap(),
                network: describe_network("testnet"),
                at: Utc::now(),
            },
        )
        .unwrap()
    }

    fn errored() -> ConnectionState {
        transition(
            &ConnectionState::default(),
            &SessionEvent::AgentUnavailable(WalletError::new(WalletErrorKind::NotInstalled, "")),
        )
        .unwrap()
    }

    #[test]
    fn connect_flow_reaches_connected() {
        let state = connected();
        let snapshot = state.snapshot();

        assert!(snapshot.is_connected);
        assert!(!snapshot.is_connecting);
        assert_eq!(snapshot.account.unwrap().as_str(), "0xabc");
        assert_eq!(snapshot.network.unwrap().name, "Aptos Testnet");
        assert!(snapshot.last_connected_at.is_some());
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn second_connect_request_is_rejected_while_connecting() {
        let connecting = transition(&ConnectionState::default(), &SessionEvent::ConnectRequested)
            .unwrap();
        let err = transition(&connecting, &SessionEvent::ConnectRequested).unwrap_err();
        assert_eq!(err.from, SessionPhase::Connecting);
    }

    #[test]
    fn connect_from_error_clears_it() {
        let state = transition(&errored(), &SessionEvent::ConnectRequested).unwrap();
        assert!(state.is_connecting());
        assert!(state.error().is_none());
    }

    #[test]
    fn disconnect_resets_to_initial_from_any_state() {
        let connecting = transition(&ConnectionState::default(), &SessionEvent::ConnectRequested)
            .unwrap();
        for state in [connected(), errored(), connecting, ConnectionState::default()] {
            let next = transition(&state, &SessionEvent::DisconnectRequested).unwrap();
            assert_eq!(next, ConnectionState::default());
        }
    }

    #[test]
    fn clear_error_is_noop_without_error() {
        let cleared = transition(&errored(), &SessionEvent::ErrorCleared).unwrap();
        assert_eq!(cleared.phase(), SessionPhase::Disconnected);

        let state = connected();
        assert_eq!(transition(&state, &SessionEvent::ErrorCleared).unwrap(), state);
    }

    #[test]
    fn change_notifications_only_apply_while_connected() {
        let account = Address::parse("0xdef").unwrap();
        let state = transition(&connected(), &SessionEvent::AccountChanged(account.clone()))
            .unwrap();
        assert_eq!(state.snapshot().account, Some(account.clone()));
        assert!(state.is_connected());

        let state =
            transition(&state, &SessionEvent::NetworkChanged(describe_network("1"))).unwrap();
        assert_eq!(state.snapshot().network.unwrap().name, "Aptos Mainnet");

        let err = transition(&ConnectionState::default(), &SessionEvent::AccountChanged(account))
            .unwrap_err();
        assert_eq!(err.reason, "not connected");
    }

    #[test]
    fn failures_land_in_disconnected_with_error() {
        let connecting = transition(&ConnectionState::default(), &SessionEvent::ConnectRequested)
            .unwrap();
        let error = WalletError::new(WalletErrorKind::ConnectionRejected, "User rejected");
        let state = transition(&connecting, &SessionEvent::ConnectFailed(error.clone())).unwrap();

        assert_eq!(state.phase(), SessionPhase::DisconnectedWithError);
        assert_eq!(state.error(), Some(&error));
        assert!(state.snapshot().account.is_none());
    }

    #[test]
    fn missing_agent_does_not_interrupt_an_attempt() {
        let connecting = transition(&ConnectionState::default(), &SessionEvent::ConnectRequested)
            .unwrap();
        let error = WalletError::new(WalletErrorKind::NotInstalled, "");
        assert!(transition(&connecting, &SessionEvent::AgentUnavailable(error)).is_err());
        assert!(errored().error().is_some());
    }

    #[test]
    fn success_is_only_accepted_while_connecting() {
        let err = transition(
            &ConnectionState::default(),
            &SessionEvent::ConnectSucceeded {
                account: Address::parse("0x1").unwrap(),
                network: describe_network("2"),
                at: Utc::now(),
            },
        )
        .unwrap_err();
        assert_eq!(err.reason, "invalid transition");
    }
}
