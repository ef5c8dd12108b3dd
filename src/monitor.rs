//! Live monitoring aggregator for the teacher dashboard.
//!
//! Each `monitor:update` push carries the whole aggregate; it replaces the
//! previous one outright, so nothing from an older snapshot survives into a
//! newer one. Derived display values (percentages, rounded times, ordering)
//! are computed on read from the raw snapshot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frames::{Alert, ChoiceStat, ClientMessage, MonitoringSnapshot, QuizId, ServerEvent, StrugglingStudent};
use tokio::sync::watch;
use tracing::debug;

use crate::net::{Connection, Event, EventKind, Subscription};

/// Alerts sorted ascending by priority. Equal priorities keep input order.
#[must_use]
pub fn sorted_alerts(alerts: &[Alert]) -> Vec<Alert> {
    let mut sorted = alerts.to_vec();
    sorted.sort_by_key(|alert| alert.priority);
    sorted
}

/// `0.853` renders as `"85%"`.
#[must_use]
pub fn percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

/// Whole seconds, never negative.
#[must_use]
pub fn round_seconds(seconds: f64) -> String {
    format!("{:.0}s", seconds.max(0.0))
}

/// Share of responses per choice, as fractions. All zero when nobody answered.
#[must_use]
pub fn choice_shares(breakdown: &[ChoiceStat]) -> Vec<f64> {
    let answered: u32 = breakdown.iter().map(|stat| stat.count).sum();
    breakdown
        .iter()
        .map(|stat| if answered == 0 { 0.0 } else { f64::from(stat.count) / f64::from(answered) })
        .collect()
}

/// Most at-risk first: by level, then score. Unscored students sort last
/// within their level.
#[must_use]
pub fn students_by_risk(students: &[StrugglingStudent]) -> Vec<&StrugglingStudent> {
    let score = |student: &StrugglingStudent| student.risk_score.unwrap_or(f64::NEG_INFINITY);
    let mut ranked: Vec<&StrugglingStudent> = students.iter().collect();
    ranked.sort_by(|a, b| b.risk_level.cmp(&a.risk_level).then(score(b).total_cmp(&score(a))));
    ranked
}

/// What the dashboard shows: the latest snapshot plus its visible alerts in
/// display order.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorView {
    pub snapshot: MonitoringSnapshot,
    pub alerts: Vec<Alert>,
}

#[derive(Default)]
struct MonitorState {
    latest: Option<MonitoringSnapshot>,
    /// `(category, title)` of alerts the teacher acknowledged.
    dismissed: HashSet<(String, String)>,
}

impl MonitorState {
    fn view(&self) -> Option<MonitorView> {
        let snapshot = self.latest.clone()?;
        let alerts = sorted_alerts(&snapshot.alerts)
            .into_iter()
            .filter(|alert| !self.dismissed.contains(&(alert.category.clone(), alert.title.clone())))
            .collect();
        Some(MonitorView { snapshot, alerts })
    }
}

struct MonitorShared {
    quiz_id: QuizId,
    conn: Connection,
    state: Mutex<MonitorState>,
    tx: watch::Sender<Option<MonitorView>>,
}

impl MonitorShared {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, snapshot: MonitoringSnapshot) {
        let view = {
            let mut state = self.state();
            state.latest = Some(snapshot);
            state.view()
        };
        self.tx.send_replace(view);
    }

    fn republish(&self) {
        let view = self.state().view();
        self.tx.send_replace(view);
    }

    fn request_refresh(&self) {
        self.conn.send(&ClientMessage::RefreshMonitor { quiz_id: self.quiz_id });
    }
}

/// Live view of one quiz's monitoring aggregate.
pub struct LiveMonitor {
    shared: Arc<MonitorShared>,
}

impl LiveMonitor {
    #[must_use]
    pub fn new(quiz_id: QuizId, conn: &Connection) -> Self {
        let (tx, _) = watch::channel(None);
        let state = Mutex::new(MonitorState::default());
        Self { shared: Arc::new(MonitorShared { quiz_id, conn: conn.clone(), state, tx }) }
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.shared.quiz_id
    }

    /// Replace the current snapshot wholesale.
    pub fn apply(&self, snapshot: MonitoringSnapshot) {
        self.shared.apply(snapshot);
    }

    /// Hide an alert, by category and title, in this and later snapshots.
    /// Returns `false` if it was already dismissed.
    pub fn dismiss_alert(&self, category: &str, title: &str) -> bool {
        let inserted = self.shared.state().dismissed.insert((category.to_owned(), title.to_owned()));
        if inserted {
            debug!(quiz_id = self.shared.quiz_id, category, title, "alert dismissed");
            self.shared.republish();
        }
        inserted
    }

    /// Current alerts minus dismissed ones, most urgent first.
    #[must_use]
    pub fn visible_alerts(&self) -> Vec<Alert> {
        self.current().map(|view| view.alerts).unwrap_or_default()
    }

    /// Ask the backend to push a fresh aggregate.
    pub fn request_refresh(&self) {
        self.shared.request_refresh();
    }

    /// Request a fresh aggregate on every transition to connected. Register
    /// after the room controller so the refresh follows the join replay.
    pub fn refresh_on_connect(&self) -> Subscription {
        let weak = Arc::downgrade(&self.shared);
        self.shared.conn.subscribe(EventKind::Connect, move |_| {
            let Some(shared) = weak.upgrade() else { return };
            debug!(quiz_id = shared.quiz_id, "requesting monitor refresh after connect");
            shared.request_refresh();
        })
    }

    /// Apply `monitor:update` pushes for this quiz.
    pub fn follow(&self) -> Subscription {
        let weak = Arc::downgrade(&self.shared);
        self.shared.conn.subscribe(EventKind::MonitorUpdate, move |event| {
            let Event::Server(ServerEvent::MonitorUpdate(snapshot)) = event else { return };
            let Some(shared) = weak.upgrade() else { return };
            if snapshot.quiz_id.is_some_and(|quiz_id| quiz_id != shared.quiz_id) {
                return;
            }
            shared.apply((**snapshot).clone());
        })
    }

    /// `None` until the first snapshot arrives.
    #[must_use]
    pub fn current(&self) -> Option<MonitorView> {
        self.shared.state().view()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<MonitorView>> {
        self.shared.tx.subscribe()
    }
}

impl std::fmt::Debug for LiveMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMonitor").field("quiz_id", &self.shared.quiz_id).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "monitor_test.rs"]
mod tests;
