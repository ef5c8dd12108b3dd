//! Transport seam: how a [`Connection`](super::Connection) obtains a live link.
//!
//! A [`Link`] is a pair of frame channels. [`WsConnector`] backs it with a
//! websocket carrying protobuf frames; [`MemoryConnector`] hands out in-process
//! links so the engine can be driven without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use frames::Frame;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::config::ReconnectPolicy;
use crate::error::{EngineError, Result};

/// One open physical connection, seen as two frame channels.
///
/// The link is closed when `incoming` yields `None`; dropping the link closes
/// the underlying transport.
#[derive(Debug)]
pub struct Link {
    pub outgoing: mpsc::UnboundedSender<Frame>,
    pub incoming: mpsc::UnboundedReceiver<Frame>,
}

impl Link {
    /// Two connected in-memory ends: what one sends, the other receives.
    #[must_use]
    pub fn pair() -> (Link, Link) {
        let (near_tx, far_rx) = mpsc::unbounded_channel();
        let (far_tx, near_rx) = mpsc::unbounded_channel();
        (Link { outgoing: near_tx, incoming: near_rx }, Link { outgoing: far_tx, incoming: far_rx })
    }
}

/// Opens links on demand. Called once per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Link>;
}

/// Websocket connector: binary messages carry protobuf-encoded frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link> {
        let (stream, _) = connect_async(url).await?;
        let (mut sink, mut source) = stream.split();
        let (outgoing, mut to_socket) = mpsc::unbounded_channel::<Frame>();
        let (from_socket, incoming) = mpsc::unbounded_channel::<Frame>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    queued = to_socket.recv() => {
                        let Some(frame) = queued else {
                            let _ = sink.close().await;
                            break;
                        };
                        if let Err(error) = sink.send(Message::Binary(frames::encode_frame(&frame).into())).await {
                            warn!(%error, syscall = %frame.syscall, "websocket send failed");
                            break;
                        }
                    }
                    message = source.next() => match message {
                        Some(Ok(Message::Binary(bytes))) => match frames::decode_frame(&bytes) {
                            Ok(frame) => {
                                if from_socket.send(frame).is_err() {
                                    break;
                                }
                            }
                            Err(error) => warn!(%error, "dropping undecodable frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            warn!(%error, "websocket receive failed");
                            break;
                        }
                    },
                }
            }
            debug!("websocket pump stopped");
        });

        Ok(Link { outgoing, incoming })
    }
}

/// Connector that serves pre-queued in-memory links, then refuses.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    links: Mutex<VecDeque<Link>>,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a link for the next `open` and return its server end.
    pub fn push_link(&self) -> Link {
        let (near, far) = Link::pair();
        self.links.lock().unwrap_or_else(PoisonError::into_inner).push_back(near);
        far
    }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _url: &str) -> Result<Link> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or(EngineError::LinkUnavailable)
    }
}

/// Exponential reconnect backoff with up to 25% jitter.
#[derive(Debug)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    next: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, next: policy.initial }
    }

    pub(crate) fn reset(&mut self) {
        self.next = self.policy.initial;
    }

    /// Un-jittered delay for the next attempt; doubles up to the cap.
    pub(crate) fn next_base(&mut self) -> Duration {
        let current = self.next;
        self.next = current.saturating_mul(2).min(self.policy.max);
        current
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let base = self.next_base();
        base + jitter(base)
    }
}

fn jitter(base: Duration) -> Duration {
    let quarter_ms = u64::try_from(base.as_millis() / 4).unwrap_or(u64::MAX);
    if quarter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=quarter_ms))
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
