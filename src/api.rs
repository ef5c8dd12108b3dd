//! REST collaborator: leaderboard, quiz metadata and question sets.
//!
//! The engine only ever reads from the backend over HTTP. [`QuizApi`] is the
//! seam; [`HttpQuizApi`] is the `reqwest` implementation used in production,
//! and tests substitute an in-memory one.

use std::time::Duration;

use async_trait::async_trait;
use frames::{QuizId, UserKey};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// One row of a quiz leaderboard, best first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserKey,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeaderboardResponse {
    #[serde(default)]
    leaderboard: Vec<LeaderboardEntry>,
}

/// Quiz metadata the engine cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizMeta {
    /// Attempt duration in minutes; `None` when the quiz is untimed.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Summary of one question in a quiz's question set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: u64,
    #[serde(default, alias = "question_text")]
    pub text: String,
    #[serde(default)]
    pub points: Option<f64>,
    /// Per-question time limit in seconds, if the quiz paces questions.
    #[serde(default)]
    pub time_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    #[serde(default)]
    questions: Vec<QuestionSummary>,
}

/// Read-only backend queries used by the session engine.
#[async_trait]
pub trait QuizApi: Send + Sync {
    /// `GET /api/quizzes/{id}/leaderboard`
    async fn leaderboard(&self, quiz_id: QuizId) -> Result<Vec<LeaderboardEntry>>;

    /// `GET /api/quizzes/{id}`
    async fn quiz(&self, quiz_id: QuizId) -> Result<QuizMeta>;

    /// `GET /api/quizzes/{id}/questions`
    async fn questions(&self, quiz_id: QuizId) -> Result<Vec<QuestionSummary>>;
}

/// `reqwest`-backed [`QuizApi`].
pub struct HttpQuizApi {
    client: reqwest::Client,
    config: EngineConfig,
}

impl HttpQuizApi {
    /// Build the HTTP client with the configured token and timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the
    /// client cannot be built.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()?;
        Ok(Self { client, config: config.clone() })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.config.api_url(path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Status { status: status.as_u16(), path: path.to_owned() });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl QuizApi for HttpQuizApi {
    async fn leaderboard(&self, quiz_id: QuizId) -> Result<Vec<LeaderboardEntry>> {
        let body: LeaderboardResponse = self.get_json(&leaderboard_path(quiz_id)).await?;
        Ok(body.leaderboard)
    }

    async fn quiz(&self, quiz_id: QuizId) -> Result<QuizMeta> {
        self.get_json(&quiz_path(quiz_id)).await
    }

    async fn questions(&self, quiz_id: QuizId) -> Result<Vec<QuestionSummary>> {
        let body: QuestionsResponse = self.get_json(&questions_path(quiz_id)).await?;
        Ok(body.questions)
    }
}

fn quiz_path(quiz_id: QuizId) -> String {
    format!("/api/quizzes/{quiz_id}")
}

fn leaderboard_path(quiz_id: QuizId) -> String {
    format!("/api/quizzes/{quiz_id}/leaderboard")
}

fn questions_path(quiz_id: QuizId) -> String {
    format!("/api/quizzes/{quiz_id}/questions")
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
