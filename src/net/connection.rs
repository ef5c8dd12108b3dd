//! The live connection: one reconnecting loop, one outbound queue, one registry.
//!
//! The loop runs as a single tokio task. It holds only a `Weak` reference to
//! the connection state, so dropping the last [`Connection`] handle stops it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use frames::{ClientMessage, EventError, Frame, ServerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::registry::{self, Registry, SharedRegistry, Subscription};
use super::transport::{Backoff, Connector, Link, WsConnector};
use super::{Event, EventKind, Lifecycle};
use crate::config::{EngineConfig, ReconnectPolicy};
use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// First attempt after `connect()`.
    Connecting,
    Connected,
    Reconnecting,
}

/// Handle to the session's event-stream connection. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    state: Mutex<ConnectionState>,
    registry: SharedRegistry,
    outbound: Mutex<mpsc::UnboundedSender<Frame>>,
    /// Receiving half of the outbound queue while no loop owns it.
    pending: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Connection {
    /// Build a connection for `config.ws_url()`. Nothing happens until
    /// [`connect`](Self::connect) is called.
    #[must_use]
    pub fn new(config: &EngineConfig, connector: Arc<dyn Connector>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                url: config.ws_url(),
                policy: config.reconnect,
                connector,
                state: Mutex::new(ConnectionState::Disconnected),
                registry: Arc::new(Mutex::new(Registry::default())),
                outbound: Mutex::new(tx),
                pending: Mutex::new(Some(rx)),
                task: Mutex::new(None),
            }),
        }
    }

    /// Connection over the production websocket transport.
    #[must_use]
    pub fn websocket(config: &EngineConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *guard(&self.inner.state)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Start the connection loop if it is not already running.
    ///
    /// Returns `Ok(true)` when a loop was spawned, `Ok(false)` when one was
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] outside a tokio runtime.
    pub fn connect(&self) -> Result<bool> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let mut task = guard(&self.inner.task);
        if task.as_ref().is_some_and(|running| !running.is_finished()) {
            return Ok(false);
        }

        let outbound = match guard(&self.inner.pending).take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                *guard(&self.inner.outbound) = tx;
                rx
            }
        };

        let weak = Arc::downgrade(&self.inner);
        let connector = Arc::clone(&self.inner.connector);
        let url = self.inner.url.clone();
        let policy = self.inner.policy;
        *task = Some(handle.spawn(run(weak, connector, url, policy, outbound)));
        Ok(true)
    }

    /// Stop the loop and drop the link. Queued messages are discarded.
    pub fn close(&self) {
        if let Some(task) = guard(&self.inner.task).take() {
            task.abort();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *guard(&self.inner.outbound) = tx;
        *guard(&self.inner.pending) = Some(rx);
        self.inner.set_state(ConnectionState::Disconnected);
        debug!(url = %self.inner.url, "connection closed");
    }

    /// Register `callback` for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = registry::lock(&self.inner.registry).insert(kind, Arc::new(callback));
        Subscription::new(kind, id, &self.inner.registry)
    }

    /// Queue a message. Delivered immediately when connected, otherwise once
    /// the next link is up.
    pub fn send(&self, message: &ClientMessage) {
        let frame = message.to_frame();
        debug!(syscall = %frame.syscall, room = ?frame.room, "queue outbound frame");
        if guard(&self.inner.outbound).send(frame).is_err() {
            warn!(syscall = message.syscall(), "outbound queue closed; message dropped");
        }
    }

    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        registry::lock(&self.inner.registry).count(kind)
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        self.inner.set_state(next);
    }

    pub(crate) fn dispatch_frame(&self, frame: &Frame) {
        self.inner.dispatch_frame(frame);
    }

    /// Frames queued while no loop is running.
    #[cfg(test)]
    pub(crate) fn drain_queued(&self) -> Vec<Frame> {
        let mut pending = guard(&self.inner.pending);
        let mut frames = Vec::new();
        if let Some(rx) = pending.as_mut() {
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("url", &self.inner.url).field("state", &self.state()).finish()
    }
}

impl Inner {
    /// Store the new state and emit `Connect`/`Disconnect` on the matching
    /// transitions.
    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *guard(&self.state), next);
        if previous == next {
            return;
        }
        debug!(from = ?previous, to = ?next, "connection state");
        match next {
            ConnectionState::Connected => self.emit(&Event::Lifecycle(Lifecycle::Connect)),
            ConnectionState::Disconnected if previous == ConnectionState::Connected => {
                self.emit(&Event::Lifecycle(Lifecycle::Disconnect));
            }
            _ => {}
        }
    }

    fn emit(&self, event: &Event) {
        let listeners = registry::lock(&self.registry).listeners_for(event.kind());
        for listener in listeners {
            listener(event);
        }
    }

    fn dispatch_frame(&self, frame: &Frame) {
        match ServerEvent::from_frame(frame) {
            Ok(event) => {
                if let ServerEvent::ServerError(error) = &event {
                    warn!(syscall = %error.syscall, message = %error.message, "server reported error");
                }
                self.emit(&Event::Server(event));
            }
            Err(EventError::UnknownSyscall(syscall)) => debug!(%syscall, "ignoring unknown syscall"),
            Err(error) => warn!(%error, frame_id = %frame.id, "dropping malformed frame"),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = guard(&self.task).take() {
            task.abort();
        }
    }
}

/// Why a pump over one link ended.
enum PumpEnd {
    LinkClosed,
    OwnerGone,
}

async fn run(
    inner: Weak<Inner>,
    connector: Arc<dyn Connector>,
    url: String,
    policy: ReconnectPolicy,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) {
    let mut backoff = Backoff::new(policy);
    let mut attempt: u32 = 0;
    let mut first = true;
    let mut held: Option<Frame> = None;

    loop {
        {
            let Some(inner) = inner.upgrade() else { return };
            if first {
                inner.set_state(ConnectionState::Connecting);
            } else {
                attempt = attempt.saturating_add(1);
                inner.set_state(ConnectionState::Reconnecting);
                inner.emit(&Event::Lifecycle(Lifecycle::Reconnecting));
                inner.emit(&Event::Lifecycle(Lifecycle::ReconnectAttempt(attempt)));
            }
        }
        first = false;

        match connector.open(&url).await {
            Ok(mut link) => {
                backoff.reset();
                attempt = 0;
                info!(%url, "connected");
                {
                    let Some(inner) = inner.upgrade() else { return };
                    inner.set_state(ConnectionState::Connected);
                }
                if let Some(frame) = held.take() {
                    if let Err(unsent) = link.outgoing.send(frame) {
                        held = Some(unsent.0);
                    }
                }
                let end = pump(&inner, &mut link, &mut outbound, &mut held).await;
                let Some(owner) = inner.upgrade() else { return };
                owner.set_state(ConnectionState::Disconnected);
                if matches!(end, PumpEnd::OwnerGone) {
                    return;
                }
                warn!(%url, "connection lost");
            }
            Err(error) => {
                warn!(%url, %error, attempt, "connect failed");
            }
        }

        tokio::time::sleep(backoff.next_delay()).await;
    }
}

async fn pump(
    inner: &Weak<Inner>,
    link: &mut Link,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    held: &mut Option<Frame>,
) -> PumpEnd {
    loop {
        tokio::select! {
            inbound = link.incoming.recv() => {
                let Some(frame) = inbound else { return PumpEnd::LinkClosed };
                let Some(owner) = inner.upgrade() else { return PumpEnd::OwnerGone };
                owner.dispatch_frame(&frame);
            }
            queued = outbound.recv() => {
                let Some(frame) = queued else { return PumpEnd::OwnerGone };
                if let Err(unsent) = link.outgoing.send(frame) {
                    *held = Some(unsent.0);
                    return PumpEnd::LinkClosed;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
