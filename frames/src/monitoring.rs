//! Live monitoring aggregate pushed to teacher dashboards.
//!
//! The backend computes the whole aggregate and emits it in one payload.
//! Substructures the backend has not computed yet arrive as `null` and stay
//! `None` here: "no data yet" is not the same as a computed zero. Malformed
//! entries in the student and alert lists are skipped, not fatal.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::event::QuizId;
use crate::ident::UserKey;

/// Full class-wide monitoring snapshot for one quiz.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    #[serde(default)]
    pub quiz_id: Option<QuizId>,
    #[serde(default, alias = "participants_summary")]
    pub participants: ParticipantsSummary,
    #[serde(default)]
    pub class_metrics: Option<ClassMetrics>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub struggling_students: Option<Vec<StrugglingStudent>>,
    #[serde(default, alias = "current_question_analytics")]
    pub current_question: Option<QuestionAnalytics>,
    #[serde(default, alias = "predictive_metrics")]
    pub predictive: Option<PredictiveMetrics>,
    #[serde(default, deserialize_with = "lenient_list_or_empty")]
    pub alerts: Vec<Alert>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantsSummary {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub active: u32,
    #[serde(default)]
    pub completed: u32,
}

/// Class-level aggregates. Rates are fractions in `[0, 1]`, times in seconds.
/// Each metric is `None` until the backend can compute it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    #[serde(default)]
    pub avg_score: Option<f64>,
    #[serde(default)]
    pub median_score: Option<f64>,
    #[serde(default)]
    pub avg_accuracy: Option<f64>,
    #[serde(default)]
    pub avg_response_time: Option<f64>,
    #[serde(default)]
    pub completion_rate: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrugglingStudent {
    pub user_id: UserKey,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub percentile: Option<f64>,
}

/// Live statistics for the question currently on screen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnalytics {
    #[serde(default)]
    pub question_id: Option<u64>,
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default, alias = "choices")]
    pub choice_breakdown: Vec<ChoiceStat>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub segments: Option<Vec<StudentSegment>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceStat {
    pub choice: String,
    pub count: u32,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudentSegment {
    pub label: String,
    pub count: u32,
    #[serde(default)]
    pub avg_score: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassRatePrediction {
    /// Predicted fraction of participants passing, in `[0, 1]`.
    pub predicted_rate: f64,
    pub trend: Trend,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictiveMetrics {
    #[serde(default)]
    pub pass_rate: Option<PassRatePrediction>,
    /// Estimated seconds until the class finishes.
    #[serde(default)]
    pub completion_time_estimate: Option<f64>,
    #[serde(default)]
    pub score_distribution: Vec<ScoreBucket>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub range: String,
    pub count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Info,
    Warning,
    Critical,
}

/// Dashboard alert. Lower `priority` means more urgent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub priority: i32,
}

/// `null` stays `None`; list entries that fail to decode are dropped.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(items) = Option::<Vec<serde_json::Value>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(items.into_iter().filter_map(|item| serde_json::from_value(item).ok()).collect()))
}

fn lenient_list_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(lenient_list(deserializer)?.unwrap_or_default())
}
