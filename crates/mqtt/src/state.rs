//! Connection state as seen by observers.
//!
//! The manager keeps one authoritative `ConnectionState` and only ever moves it
//! along the walks `can_transition_to` allows. `Disconnecting` exists for
//! display purposes: front-ends may show it while a user-initiated disconnect is
//! in flight, but the manager never emits it.
//!
//! # Examples
//!
//! ```ignore
//! let state = ConnectionState::Connecting;
//! assert_eq!(state.as_str(), "Connecting");
//! assert!(state.can_transition_to(ConnectionState::Connected));
//! ```

use std::fmt;

/// Four-state view of the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// No client session; nothing will be published.
    #[default]
    Disconnected = 0,

    /// A client exists and is handshaking or retrying after a transient loss.
    Connecting = 1,

    /// The broker acknowledged the session.
    Connected = 2,

    /// Display-only label for a user-initiated teardown in progress.
    Disconnecting = 3,
}

impl ConnectionState {
    /// Short static name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether the manager may move from `self` to `next`.
    ///
    /// Self-transitions are not listed; the manager suppresses them instead of
    /// notifying twice.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Connecting)
                | (Connected, Disconnected)
        )
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
