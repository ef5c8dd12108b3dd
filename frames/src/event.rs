//! Typed events and messages carried by frames.
//!
//! DESIGN
//! ======
//! Inbound frames are decoded into the closed [`ServerEvent`] union and
//! outbound traffic is built from [`ClientMessage`]. Component code never
//! matches on syscall strings or digs through raw payloads; an unknown syscall
//! or a payload that does not fit its type is an [`EventError`] at the edge.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ident::UserKey;
use crate::monitoring::MonitoringSnapshot;
use crate::{Frame, Status};

/// Backend quiz identifier.
pub type QuizId = u64;

/// Syscall names used on the live stream.
pub mod syscall {
    pub const ROOM_JOIN: &str = "room:join";
    pub const ROOM_LEAVE: &str = "room:leave";
    pub const MONITOR_REFRESH: &str = "monitor:refresh";
    pub const POSITION_UPDATE: &str = "position:update";
    pub const MONITOR_UPDATE: &str = "monitor:update";
    pub const TIMER_SYNC: &str = "timer:sync";
    pub const GATEWAY_ERROR: &str = "gateway:error";
    /// Event name emitted by older backends for rank pushes.
    pub const LEGACY_POSITION_UPDATE: &str = "userPositionUpdate";
    /// Event name emitted by older backends for monitoring pushes.
    pub const LEGACY_PROGRESS_UPDATE: &str = "progressTrackingUpdate";
}

/// Participant role inside a quiz.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
        }
    }
}

/// A logical server-side room the connection can be a member of.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RoomKey {
    /// Everyone taking or watching one quiz.
    Quiz { quiz_id: QuizId },
    /// Everyone with one role in a quiz.
    Role { quiz_id: QuizId, role: Role },
    /// A single user's private channel within a quiz.
    Personal { quiz_id: QuizId, user_id: UserKey },
}

impl RoomKey {
    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        match self {
            Self::Quiz { quiz_id } | Self::Role { quiz_id, .. } | Self::Personal { quiz_id, .. } => *quiz_id,
        }
    }

    /// Channel name used in the frame `room` field.
    #[must_use]
    pub fn channel(&self) -> String {
        match self {
            Self::Quiz { quiz_id } => format!("quiz:{quiz_id}"),
            Self::Role { quiz_id, role } => format!("quiz:{quiz_id}:role:{}", role.as_str()),
            Self::Personal { quiz_id, user_id } => format!("quiz:{quiz_id}:user:{user_id}"),
        }
    }

    /// Declarative join/leave payload.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Quiz { quiz_id } => json!({ "kind": "quiz", "quiz_id": quiz_id }),
            Self::Role { quiz_id, role } => json!({ "kind": "role", "quiz_id": quiz_id, "role": role.as_str() }),
            Self::Personal { quiz_id, user_id } => {
                json!({ "kind": "personal", "quiz_id": quiz_id, "user_id": user_id.as_str() })
            }
        }
    }

    /// Extract the quiz id from a channel name produced by [`RoomKey::channel`].
    #[must_use]
    pub fn quiz_id_from_channel(channel: &str) -> Option<QuizId> {
        channel.strip_prefix("quiz:")?.split(':').next()?.parse().ok()
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel())
    }
}

/// Messages the engine sends to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    JoinRoom(RoomKey),
    LeaveRoom(RoomKey),
    /// Ask the backend to re-emit the monitoring aggregate for a quiz.
    RefreshMonitor { quiz_id: QuizId },
}

impl ClientMessage {
    #[must_use]
    pub fn syscall(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => syscall::ROOM_JOIN,
            Self::LeaveRoom(_) => syscall::ROOM_LEAVE,
            Self::RefreshMonitor { .. } => syscall::MONITOR_REFRESH,
        }
    }

    /// Build the request frame for this message.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::JoinRoom(room) | Self::LeaveRoom(room) => {
                Frame::request(self.syscall(), Some(room.channel()), room.payload())
            }
            Self::RefreshMonitor { quiz_id } => Frame::request(
                self.syscall(),
                Some(RoomKey::Quiz { quiz_id: *quiz_id }.channel()),
                json!({ "quiz_id": quiz_id }),
            ),
        }
    }
}

/// Rank push for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: UserKey,
    pub position: u32,
    #[serde(rename = "totalParticipants", alias = "total_participants")]
    pub total_participants: u32,
    /// Filled from the frame's room when the payload omits it.
    #[serde(default)]
    pub quiz_id: Option<QuizId>,
}

/// Authoritative remaining time for a quiz attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSync {
    #[serde(default)]
    pub quiz_id: Option<QuizId>,
    #[serde(alias = "remainingSeconds", alias = "time_remaining")]
    pub remaining_seconds: u32,
}

/// Error reported by the backend for a request or the gateway itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerError {
    pub syscall: String,
    pub message: String,
}

/// Everything the backend can push to the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    PositionUpdate(PositionUpdate),
    MonitorUpdate(Box<MonitoringSnapshot>),
    TimerSync(TimerSync),
    /// Successful completion of one of our requests (joins, leaves, refresh).
    Ack { syscall: String, request_id: Option<String> },
    ServerError(ServerError),
}

/// Error decoding a frame into a [`ServerEvent`].
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error("invalid {syscall} payload: {source}")]
    Payload {
        syscall: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ServerEvent {
    /// Decode an inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownSyscall`] for syscalls outside the protocol
    /// and [`EventError::Payload`] when the payload does not fit its type.
    pub fn from_frame(frame: &Frame) -> Result<Self, EventError> {
        if frame.status == Status::Error || frame.syscall == syscall::GATEWAY_ERROR {
            let message = frame
                .data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown server error")
                .to_owned();
            return Ok(Self::ServerError(ServerError { syscall: frame.syscall.clone(), message }));
        }

        let room_quiz = frame.room.as_deref().and_then(RoomKey::quiz_id_from_channel);
        match frame.syscall.as_str() {
            syscall::POSITION_UPDATE | syscall::LEGACY_POSITION_UPDATE => {
                let mut update: PositionUpdate = decode_payload(frame)?;
                update.quiz_id = update.quiz_id.or(room_quiz);
                Ok(Self::PositionUpdate(update))
            }
            syscall::MONITOR_UPDATE | syscall::LEGACY_PROGRESS_UPDATE => {
                let mut snapshot: MonitoringSnapshot = decode_payload(frame)?;
                snapshot.quiz_id = snapshot.quiz_id.or(room_quiz);
                Ok(Self::MonitorUpdate(Box::new(snapshot)))
            }
            syscall::TIMER_SYNC => {
                let mut sync: TimerSync = decode_payload(frame)?;
                sync.quiz_id = sync.quiz_id.or(room_quiz);
                Ok(Self::TimerSync(sync))
            }
            syscall::ROOM_JOIN | syscall::ROOM_LEAVE | syscall::MONITOR_REFRESH if frame.status == Status::Done => {
                Ok(Self::Ack { syscall: frame.syscall.clone(), request_id: frame.parent_id.clone() })
            }
            other => Err(EventError::UnknownSyscall(other.to_owned())),
        }
    }

    /// Quiz this event is scoped to, when known.
    #[must_use]
    pub fn quiz_id(&self) -> Option<QuizId> {
        match self {
            Self::PositionUpdate(update) => update.quiz_id,
            Self::MonitorUpdate(snapshot) => snapshot.quiz_id,
            Self::TimerSync(sync) => sync.quiz_id,
            Self::Ack { .. } | Self::ServerError(_) => None,
        }
    }
}

fn decode_payload<T: DeserializeOwned>(frame: &Frame) -> Result<T, EventError> {
    serde_json::from_value(frame.data.clone())
        .map_err(|source| EventError::Payload { syscall: frame.syscall.clone(), source })
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
