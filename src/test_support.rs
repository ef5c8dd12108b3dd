//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use frames::{Frame, QuizId, Status};
use serde_json::Value;
use tokio::sync::Notify;

use crate::api::{LeaderboardEntry, QuestionSummary, QuizApi, QuizMeta};
use crate::config::{EngineConfig, ReconnectPolicy};
use crate::error::{EngineError, Result};
use crate::net::{Connection, Connector, MemoryConnector};

/// Config with millisecond reconnect delays.
pub(crate) fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::new("http://127.0.0.1:9").unwrap();
    config.reconnect = ReconnectPolicy { initial: Duration::from_millis(10), max: Duration::from_millis(40) };
    config
}

/// Connection whose loop is never started; tests drive its state directly.
pub(crate) fn offline_connection() -> Connection {
    Connection::new(&fast_config(), Arc::new(MemoryConnector::new()) as Arc<dyn Connector>)
}

/// Server push frame as the backend would send it.
pub(crate) fn push_frame(syscall: &str, room: Option<&str>, data: Value) -> Frame {
    Frame {
        id: "srv-1".to_owned(),
        parent_id: None,
        ts: 0,
        room: room.map(str::to_owned),
        from: None,
        syscall: syscall.to_owned(),
        status: Status::Event,
        data,
    }
}

fn unavailable(path: &str) -> EngineError {
    EngineError::Status { status: 503, path: path.to_owned() }
}

/// Scriptable in-memory [`QuizApi`]. `None` responses fail with HTTP 503.
#[derive(Default)]
pub(crate) struct MockQuizApi {
    pub(crate) board: Mutex<Option<Vec<LeaderboardEntry>>>,
    pub(crate) meta: Mutex<Option<QuizMeta>>,
    pub(crate) questions: Mutex<Option<Vec<QuestionSummary>>>,
    pub(crate) leaderboard_calls: AtomicUsize,
    pub(crate) quiz_calls: AtomicUsize,
    /// When set, `leaderboard` waits for [`release`](Self::release).
    pub(crate) hold_leaderboard: Mutex<bool>,
    /// When set, `quiz` waits for [`release_quiz`](Self::release_quiz).
    pub(crate) hold_quiz: Mutex<bool>,
    gate: Notify,
    quiz_gate: Notify,
}

impl MockQuizApi {
    pub(crate) fn with_board(entries: Vec<LeaderboardEntry>) -> Self {
        let api = Self::default();
        *api.board.lock().unwrap() = Some(entries);
        api
    }

    pub(crate) fn with_duration(minutes: Option<u32>) -> Self {
        let api = Self::default();
        *api.meta.lock().unwrap() = Some(QuizMeta { duration: minutes, title: None });
        api
    }

    pub(crate) fn release(&self) {
        self.gate.notify_one();
    }

    pub(crate) fn release_quiz(&self) {
        self.quiz_gate.notify_one();
    }
}

#[async_trait]
impl QuizApi for MockQuizApi {
    async fn leaderboard(&self, quiz_id: QuizId) -> Result<Vec<LeaderboardEntry>> {
        self.leaderboard_calls.fetch_add(1, Ordering::SeqCst);
        let hold = *self.hold_leaderboard.lock().unwrap();
        if hold {
            self.gate.notified().await;
        }
        self.board.lock().unwrap().clone().ok_or_else(|| unavailable(&format!("/api/quizzes/{quiz_id}/leaderboard")))
    }

    async fn quiz(&self, quiz_id: QuizId) -> Result<QuizMeta> {
        self.quiz_calls.fetch_add(1, Ordering::SeqCst);
        let hold = *self.hold_quiz.lock().unwrap();
        if hold {
            self.quiz_gate.notified().await;
        }
        self.meta.lock().unwrap().clone().ok_or_else(|| unavailable(&format!("/api/quizzes/{quiz_id}")))
    }

    async fn questions(&self, quiz_id: QuizId) -> Result<Vec<QuestionSummary>> {
        self.questions.lock().unwrap().clone().ok_or_else(|| unavailable(&format!("/api/quizzes/{quiz_id}/questions")))
    }
}

/// Leaderboard rows with scores descending from 100.
pub(crate) fn board_of(ids: &[&str]) -> Vec<LeaderboardEntry> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| LeaderboardEntry {
            user_id: frames::UserKey::new(id).unwrap(),
            score: 100.0 - index as f64,
            name: None,
        })
        .collect()
}
