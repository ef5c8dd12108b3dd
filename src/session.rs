//! Per-view session composition.
//!
//! A session bundles everything one screen needs from the live stream: its
//! room memberships, its feature state, and the subscriptions feeding that
//! state. Closing (or dropping) the session releases all of it at once.

use std::sync::Arc;

use frames::{QuizId, Role, UserKey};
use tracing::info;

use crate::api::QuizApi;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::monitor::LiveMonitor;
use crate::net::{Connection, Subscription};
use crate::position::PositionTracker;
use crate::rooms::Rooms;
use crate::timer::{DurationSeed, SessionTimer, TimerHooks};

/// A student's quiz attempt: timer, rank tracking and the student rooms.
pub struct StudentSession {
    quiz_id: QuizId,
    rooms: Rooms,
    timer: SessionTimer,
    tracker: PositionTracker,
    subscriptions: Vec<Subscription>,
}

impl StudentSession {
    #[must_use]
    pub fn open(conn: &Connection, api: Arc<dyn QuizApi>, config: &EngineConfig, quiz_id: QuizId, user_id: UserKey) -> Self {
        Self::open_with_hooks(conn, api, config, quiz_id, user_id, TimerHooks::default())
    }

    /// Join the quiz, student and personal rooms and wire the timer and
    /// tracker to `conn`. The timer stays idle until [`begin`](Self::begin).
    #[must_use]
    pub fn open_with_hooks(
        conn: &Connection,
        api: Arc<dyn QuizApi>,
        config: &EngineConfig,
        quiz_id: QuizId,
        user_id: UserKey,
        hooks: TimerHooks,
    ) -> Self {
        let rooms = Rooms::new(conn);
        rooms.join_quiz_room(quiz_id);
        rooms.join_role_room(quiz_id, Role::Student);
        if user_id.is_identifying() {
            rooms.join_personal_room(quiz_id, user_id.clone());
        }

        let timer = SessionTimer::new(quiz_id, Arc::clone(&api), config.default_duration_minutes, hooks);
        let tracker = PositionTracker::new(quiz_id, Some(user_id), api);
        let subscriptions = vec![timer.follow(conn), tracker.follow(conn)];
        info!(quiz_id, user = ?tracker.user(), "student session opened");

        Self { quiz_id, rooms, timer, tracker, subscriptions }
    }

    /// Start the timer and take an initial leaderboard reading.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionTimer::start`] errors.
    pub async fn begin(&self, seed: DurationSeed) -> Result<()> {
        self.timer.start(seed).await?;
        self.tracker.update_position().await;
        Ok(())
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }

    #[must_use]
    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    #[must_use]
    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    /// Unsubscribe, stop the timer and leave every room. Idempotent.
    pub fn close(&mut self) {
        if self.subscriptions.is_empty() && self.rooms.memberships().is_empty() {
            return;
        }
        self.subscriptions.clear();
        self.timer.stop();
        self.rooms.leave_all();
        info!(quiz_id = self.quiz_id, "student session closed");
    }
}

impl Drop for StudentSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// A teacher's live dashboard for one quiz.
pub struct TeacherSession {
    quiz_id: QuizId,
    rooms: Rooms,
    monitor: LiveMonitor,
    subscriptions: Vec<Subscription>,
}

impl TeacherSession {
    /// Join the quiz and teacher rooms and follow monitoring pushes. A fresh
    /// aggregate is requested after every (re)join, or at once when already
    /// connected.
    #[must_use]
    pub fn open(conn: &Connection, quiz_id: QuizId) -> Self {
        let rooms = Rooms::new(conn);
        rooms.join_quiz_room(quiz_id);
        rooms.join_role_room(quiz_id, Role::Teacher);

        let monitor = LiveMonitor::new(quiz_id, conn);
        let subscriptions = vec![monitor.follow(), monitor.refresh_on_connect()];
        if conn.is_connected() {
            monitor.request_refresh();
        }
        info!(quiz_id, "teacher session opened");

        Self { quiz_id, rooms, monitor, subscriptions }
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn monitor(&self) -> &LiveMonitor {
        &self.monitor
    }

    #[must_use]
    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    /// Drop the monitoring subscription and leave the rooms. Idempotent.
    pub fn close(&mut self) {
        if self.subscriptions.is_empty() && self.rooms.memberships().is_empty() {
            return;
        }
        self.subscriptions.clear();
        self.rooms.leave_all();
        info!(quiz_id = self.quiz_id, "teacher session closed");
    }
}

impl Drop for TeacherSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
