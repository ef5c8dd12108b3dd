//! Connection manager: one live event-stream connection per session.
//!
//! ARCHITECTURE
//! ============
//! [`Connection`] owns the transport loop, the outbound queue and the listener
//! registry. Features never share listeners: each `subscribe` returns its own
//! [`Subscription`] handle, and dropping the handle removes exactly that
//! listener. Inbound frames are decoded into [`frames::ServerEvent`] before
//! dispatch; lifecycle transitions are dispatched through the same registry.

mod connection;
mod registry;
mod transport;

pub use connection::{Connection, ConnectionState};
pub use registry::{Listener, Subscription};
pub use transport::{Connector, Link, MemoryConnector, WsConnector};

use frames::ServerEvent;

/// Connection lifecycle notifications. Advisory only: consumers treat
/// `Disconnect` as "data may be stale", never as fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Connect,
    Disconnect,
    Reconnecting,
    /// 1-based attempt counter since the last successful connect.
    ReconnectAttempt(u32),
}

/// Everything a listener can receive.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Lifecycle(Lifecycle),
    Server(ServerEvent),
}

/// Subscription key: one per lifecycle notification and server event variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Reconnecting,
    ReconnectAttempt,
    PositionUpdate,
    MonitorUpdate,
    TimerSync,
    Ack,
    ServerError,
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Lifecycle(Lifecycle::Connect) => EventKind::Connect,
            Self::Lifecycle(Lifecycle::Disconnect) => EventKind::Disconnect,
            Self::Lifecycle(Lifecycle::Reconnecting) => EventKind::Reconnecting,
            Self::Lifecycle(Lifecycle::ReconnectAttempt(_)) => EventKind::ReconnectAttempt,
            Self::Server(ServerEvent::PositionUpdate(_)) => EventKind::PositionUpdate,
            Self::Server(ServerEvent::MonitorUpdate(_)) => EventKind::MonitorUpdate,
            Self::Server(ServerEvent::TimerSync(_)) => EventKind::TimerSync,
            Self::Server(ServerEvent::Ack { .. }) => EventKind::Ack,
            Self::Server(ServerEvent::ServerError(_)) => EventKind::ServerError,
        }
    }
}
