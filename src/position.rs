//! Leaderboard position tracking for the local user.
//!
//! Two producers feed one snapshot: a pull that scans the REST leaderboard and
//! `position:update` pushes from the live stream. Pushes are fresher than any
//! pull started before them, so a pull that overlaps a push is discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frames::{PositionUpdate, QuizId, ServerEvent, UserKey};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{LeaderboardEntry, QuizApi};
use crate::net::{Connection, Event, EventKind, Subscription};

/// Rank and participant count; `None` until first known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub rank: Option<u32>,
    pub total: Option<u32>,
}

/// Surfaced to the user when a push moves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankNotice {
    pub rank: u32,
    pub total: u32,
}

impl RankNotice {
    #[must_use]
    pub fn message(&self) -> String {
        format!("You are now #{} of {}", self.rank, self.total)
    }
}

/// 1-based rank of `user` on `board` and the board size.
#[must_use]
pub fn rank_of(board: &[LeaderboardEntry], user: &UserKey) -> Option<(u32, u32)> {
    let index = board.iter().position(|entry| entry.user_id.matches(user))?;
    let rank = u32::try_from(index + 1).ok()?;
    let total = u32::try_from(board.len()).ok()?;
    Some((rank, total))
}

type Notifier = Arc<dyn Fn(&RankNotice) + Send + Sync>;

#[derive(Default)]
struct TrackerState {
    snapshot: PositionSnapshot,
    /// Count of applied pushes.
    push_epoch: u64,
}

struct TrackerShared {
    quiz_id: QuizId,
    user: Option<UserKey>,
    state: Mutex<TrackerState>,
    tx: watch::Sender<PositionSnapshot>,
    notifier: Mutex<Option<Notifier>>,
}

impl TrackerShared {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_push(&self, update: &PositionUpdate) -> bool {
        let Some(user) = &self.user else { return false };
        if !update.user_id.matches(user) {
            debug!(local = %user, pushed = %update.user_id, "position push for another user");
            return false;
        }
        if update.quiz_id.is_some_and(|quiz_id| quiz_id != self.quiz_id) {
            return false;
        }
        if update.position == 0 {
            warn!(quiz_id = self.quiz_id, "ignoring position push with rank 0");
            return false;
        }

        let snapshot = PositionSnapshot { rank: Some(update.position), total: Some(update.total_participants) };
        {
            let mut state = self.state();
            state.snapshot = snapshot;
            state.push_epoch += 1;
        }
        self.tx.send_replace(snapshot);

        let notifier = self.notifier.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(notify) = notifier {
            notify(&RankNotice { rank: update.position, total: update.total_participants });
        }
        true
    }
}

/// Tracks the local user's rank within one quiz.
pub struct PositionTracker {
    shared: Arc<TrackerShared>,
    api: Arc<dyn QuizApi>,
}

impl PositionTracker {
    /// `user_id` of `None`, blank or `"0"` disables every update.
    #[must_use]
    pub fn new(quiz_id: QuizId, user_id: Option<UserKey>, api: Arc<dyn QuizApi>) -> Self {
        let (tx, _) = watch::channel(PositionSnapshot::default());
        Self {
            shared: Arc::new(TrackerShared {
                quiz_id,
                user: user_id.filter(UserKey::is_identifying),
                state: Mutex::new(TrackerState::default()),
                tx,
                notifier: Mutex::new(None),
            }),
            api,
        }
    }

    /// Receive a [`RankNotice`] for every applied push.
    pub fn set_notifier(&self, notifier: impl Fn(&RankNotice) + Send + Sync + 'static) {
        *self.shared.notifier.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(notifier));
    }

    /// Pull the leaderboard and locate the local user.
    ///
    /// Returns `true` when the snapshot changed. A failed fetch or a missing
    /// row leaves the last known values in place.
    pub async fn update_position(&self) -> bool {
        let Some(user) = &self.shared.user else {
            debug!(quiz_id = self.shared.quiz_id, "no local user; skipping position update");
            return false;
        };
        let epoch = self.shared.state().push_epoch;

        let board = match self.api.leaderboard(self.shared.quiz_id).await {
            Ok(board) => board,
            Err(error) => {
                warn!(quiz_id = self.shared.quiz_id, %error, "leaderboard fetch failed; keeping last position");
                return false;
            }
        };
        let Some((rank, total)) = rank_of(&board, user) else {
            debug!(quiz_id = self.shared.quiz_id, user = %user, "user not on leaderboard");
            return false;
        };

        let snapshot = PositionSnapshot { rank: Some(rank), total: Some(total) };
        {
            let mut state = self.shared.state();
            if state.push_epoch != epoch {
                debug!(quiz_id = self.shared.quiz_id, "push arrived during fetch; discarding pull");
                return false;
            }
            state.snapshot = snapshot;
        }
        self.shared.tx.send_replace(snapshot);
        true
    }

    /// Apply a pushed rank. Returns `false` when it is not for this user/quiz.
    pub fn apply_push(&self, update: &PositionUpdate) -> bool {
        self.shared.apply_push(update)
    }

    /// Apply `position:update` pushes from `conn`.
    pub fn follow(&self, conn: &Connection) -> Subscription {
        let weak = Arc::downgrade(&self.shared);
        conn.subscribe(EventKind::PositionUpdate, move |event| {
            let Event::Server(ServerEvent::PositionUpdate(update)) = event else { return };
            if let Some(shared) = weak.upgrade() {
                shared.apply_push(update);
            }
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> PositionSnapshot {
        self.shared.state().snapshot
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<PositionSnapshot> {
        self.shared.tx.subscribe()
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserKey> {
        self.shared.user.as_ref()
    }
}

impl std::fmt::Debug for PositionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionTracker")
            .field("quiz_id", &self.shared.quiz_id)
            .field("user", &self.shared.user)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
#[path = "position_test.rs"]
mod tests;
