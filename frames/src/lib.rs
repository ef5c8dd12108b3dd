//! Wire model for the live quiz event stream.
//!
//! This crate owns everything that crosses the socket: the [`Frame`] envelope,
//! its protobuf codec, and the closed set of typed events and messages the
//! session engine exchanges with the quiz backend. Frame payloads stay as
//! `serde_json::Value` on the wire and are decoded into typed values here, at
//! the boundary, so nothing past this crate inspects raw JSON.

mod codec;
mod event;
mod ident;
mod monitoring;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use codec::{CodecError, decode_frame, encode_frame};
pub use event::{
    ClientMessage, EventError, PositionUpdate, QuizId, Role, RoomKey, ServerError, ServerEvent, TimerSync,
    syscall,
};
pub use ident::{UserKey, normalize_id};
pub use monitoring::{
    Alert, AlertKind, ChoiceStat, ClassMetrics, MonitoringSnapshot, ParticipantsSummary, PassRatePrediction,
    PredictiveMetrics, QuestionAnalytics, RiskLevel, ScoreBucket, StrugglingStudent, StudentSegment, Trend,
};

/// Lifecycle status of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Client-initiated request (joins, leaves, refresh).
    Request,
    /// Unsolicited server push scoped to a room.
    Event,
    /// Successful terminal response to a request.
    Done,
    /// Error terminal response.
    Error,
    /// Cancellation of an in-flight request.
    Cancel,
}

/// A single message on the live event stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Unique identifier for this frame (UUID string).
    pub id: String,
    /// ID of the request frame this answers, if any.
    pub parent_id: Option<String>,
    /// Milliseconds since the Unix epoch when the frame was created.
    pub ts: i64,
    /// Room channel the frame is scoped to, e.g. `"quiz:12"`.
    pub room: Option<String>,
    /// Sender identifier (user ID or system label).
    pub from: Option<String>,
    /// Namespaced operation name, e.g. `"position:update"`.
    pub syscall: String,
    /// Lifecycle position of the frame.
    pub status: Status,
    /// JSON payload.
    pub data: Value,
}

impl Frame {
    /// Build a fresh request frame with a random id and the current timestamp.
    #[must_use]
    pub fn request(syscall: &str, room: Option<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
            ts: now_ms(),
            room,
            from: None,
            syscall: syscall.to_owned(),
            status: Status::Request,
            data,
        }
    }
}

fn now_ms() -> i64 {
    let Ok(elapsed) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(elapsed.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
