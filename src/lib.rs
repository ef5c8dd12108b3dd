//! Real-time quiz session engine.
//!
//! ARCHITECTURE
//! ============
//! One [`Connection`] per client session carries the live event stream. Room
//! membership, the countdown timer, leaderboard position and the teacher's
//! monitoring view are independent features layered on it; each subscribes
//! through its own [`Subscription`] handle and reads the REST backend through
//! the [`QuizApi`] seam. [`StudentSession`] and [`TeacherSession`] compose the
//! features for one screen and release everything on close.

pub mod api;
pub mod config;
pub mod error;
pub mod monitor;
pub mod net;
pub mod position;
pub mod rooms;
pub mod session;
pub mod timer;

#[cfg(test)]
mod test_support;

pub use api::{HttpQuizApi, LeaderboardEntry, QuestionSummary, QuizApi, QuizMeta};
pub use config::{EngineConfig, HttpTimeouts, ReconnectPolicy};
pub use error::{EngineError, Result};
pub use monitor::{LiveMonitor, MonitorView};
pub use net::{Connection, ConnectionState, Connector, Event, EventKind, Lifecycle, Subscription, WsConnector};
pub use position::{PositionSnapshot, PositionTracker, RankNotice};
pub use rooms::Rooms;
pub use session::{StudentSession, TeacherSession};
pub use timer::{DurationSeed, SessionTimer, TimerHooks, TimerPhase, TimerSnapshot, format_clock};
