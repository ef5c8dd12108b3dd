//! Session countdown timer.
//!
//! LIFECYCLE
//! =========
//! `Idle -> Running -> Expired`, with `Stopped` reachable from any phase on
//! teardown. Server `timer:sync` pushes overwrite the remaining time through
//! [`SessionTimer::reconcile`]; a push of zero expires a running timer, any
//! other push leaves the phase alone. A push that lands while a `Fetch` seed
//! is in flight beats the fetched duration. Expiry fires `on_time_up` exactly
//! once per start, even if more than one ticker is alive.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use frames::{QuizId, ServerEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::QuizApi;
use crate::error::{EngineError, Result};
use crate::net::{Connection, Event, EventKind, Subscription};

const TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimerPhase {
    #[default]
    Idle,
    Running,
    Expired,
    Stopped,
}

/// Where a timer's starting duration comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurationSeed {
    /// Fresh attempt of the given length.
    Minutes(u32),
    /// Resumed attempt with this much time left.
    Remaining(u32),
    /// Read the quiz duration from the backend.
    Fetch,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub remaining_seconds: u32,
    pub running: bool,
    pub phase: TimerPhase,
    /// `MM:SS`
    pub formatted: String,
}

type TimeChange = Arc<dyn Fn(u32) + Send + Sync>;
type TimeUp = Arc<dyn Fn() + Send + Sync>;

/// Optional callbacks. Invoked from the ticker task, never under a lock.
#[derive(Clone, Default)]
pub struct TimerHooks {
    on_time_change: Option<TimeChange>,
    on_time_up: Option<TimeUp>,
}

impl TimerHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_time_change(mut self, callback: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_time_change = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_time_up(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_time_up = Some(Arc::new(callback));
        self
    }
}

/// Render seconds as zero-padded `MM:SS`. Minutes are not wrapped at 60.
#[must_use]
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Default)]
struct TimerCore {
    remaining: u32,
    phase: TimerPhase,
    enabled: bool,
    expiry_fired: bool,
    /// Bumped by every start and stop; a fetch that lost the race is dropped.
    generation: u64,
    /// Bumped by every applied `reconcile`.
    syncs: u64,
}

impl TimerCore {
    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            remaining_seconds: self.remaining,
            running: self.phase == TimerPhase::Running && self.enabled,
            phase: self.phase,
            formatted: format_clock(self.remaining),
        }
    }
}

/// What a state change asks the caller to do once the lock is released.
struct Publish {
    snapshot: TimerSnapshot,
    changed: Option<u32>,
    expired: bool,
}

struct TimerShared {
    quiz_id: QuizId,
    core: Mutex<TimerCore>,
    hooks: TimerHooks,
    tx: watch::Sender<TimerSnapshot>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerShared {
    fn core(&self) -> MutexGuard<'_, TimerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, publish: Publish) {
        self.tx.send_replace(publish.snapshot);
        if let (Some(remaining), Some(callback)) = (publish.changed, &self.hooks.on_time_change) {
            callback(remaining);
        }
        if publish.expired {
            info!(quiz_id = self.quiz_id, "time is up");
            if let Some(callback) = &self.hooks.on_time_up {
                callback();
            }
        }
    }

    /// One second elapsed. Returns `false` once the timer has left `Running`.
    fn tick(&self) -> bool {
        let publish = {
            let mut core = self.core();
            if core.phase != TimerPhase::Running {
                return false;
            }
            if !core.enabled {
                return true;
            }
            core.remaining = core.remaining.saturating_sub(1);
            let expired = core.remaining == 0 && !core.expiry_fired;
            if core.remaining == 0 {
                core.phase = TimerPhase::Expired;
                core.expiry_fired = true;
            }
            Publish { snapshot: core.snapshot(), changed: Some(core.remaining), expired }
        };
        let running = publish.snapshot.phase == TimerPhase::Running;
        self.publish(publish);
        running
    }

    fn reconcile(&self, seconds: u32) {
        let publish = {
            let mut core = self.core();
            if core.phase == TimerPhase::Stopped {
                return;
            }
            core.remaining = seconds;
            core.syncs += 1;
            let expired = seconds == 0 && core.phase == TimerPhase::Running && !core.expiry_fired;
            if expired {
                core.phase = TimerPhase::Expired;
                core.expiry_fired = true;
            }
            Publish { snapshot: core.snapshot(), changed: Some(seconds), expired }
        };
        debug!(quiz_id = self.quiz_id, seconds, "timer reconciled");
        self.publish(publish);
    }

    fn halt(&self) {
        if let Some(task) = self.ticker().take() {
            task.abort();
        }
    }
}

/// Spawn a once-per-second ticker for `shared`. Holds only a weak reference.
fn spawn_ticker(shared: &Arc<TimerShared>) -> Result<JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
    let weak: Weak<TimerShared> = Arc::downgrade(shared);
    Ok(handle.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + TICK, TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(shared) = weak.upgrade() else { break };
            if !shared.tick() {
                break;
            }
        }
    }))
}

/// Countdown for one quiz attempt.
pub struct SessionTimer {
    shared: Arc<TimerShared>,
    api: Arc<dyn QuizApi>,
    default_minutes: u32,
}

impl SessionTimer {
    #[must_use]
    pub fn new(quiz_id: QuizId, api: Arc<dyn QuizApi>, default_minutes: u32, hooks: TimerHooks) -> Self {
        let core = TimerCore { enabled: true, ..TimerCore::default() };
        let (tx, _) = watch::channel(core.snapshot());
        Self {
            shared: Arc::new(TimerShared {
                quiz_id,
                core: Mutex::new(core),
                hooks,
                tx,
                ticker: Mutex::new(None),
            }),
            api,
            default_minutes,
        }
    }

    /// Resolve the seed and start counting down.
    ///
    /// A `Fetch` seed makes one metadata request; if it fails or the quiz has
    /// no duration, the configured default is used. A `stop()` issued while
    /// the request is in flight wins, and so does a `timer:sync` value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] outside a tokio runtime.
    pub async fn start(&self, seed: DurationSeed) -> Result<()> {
        let seconds = match seed {
            DurationSeed::Minutes(minutes) => minutes.saturating_mul(60),
            DurationSeed::Remaining(seconds) => seconds,
            DurationSeed::Fetch => {
                let (generation, syncs) = {
                    let core = self.shared.core();
                    (core.generation, core.syncs)
                };
                let minutes = match self.api.quiz(self.shared.quiz_id).await {
                    Ok(meta) => meta.duration.unwrap_or(self.default_minutes),
                    Err(error) => {
                        warn!(quiz_id = self.shared.quiz_id, %error, "quiz duration fetch failed; using default");
                        self.default_minutes
                    }
                };
                let synced = {
                    let core = self.shared.core();
                    if core.generation != generation {
                        debug!(quiz_id = self.shared.quiz_id, "timer restarted or stopped during fetch");
                        return Ok(());
                    }
                    (core.syncs != syncs).then_some(core.remaining)
                };
                match synced {
                    Some(remaining) => {
                        debug!(quiz_id = self.shared.quiz_id, remaining, "sync arrived during fetch; keeping it");
                        remaining
                    }
                    None => minutes.saturating_mul(60),
                }
            }
        };
        self.start_with(seconds)
    }

    /// Start counting down from `seconds`, replacing any running ticker.
    /// Zero expires immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] outside a tokio runtime.
    pub fn start_with(&self, seconds: u32) -> Result<()> {
        self.shared.halt();
        let publish = {
            let mut core = self.shared.core();
            core.generation += 1;
            core.remaining = seconds;
            core.expiry_fired = seconds == 0;
            core.phase = if seconds == 0 { TimerPhase::Expired } else { TimerPhase::Running };
            Publish { snapshot: core.snapshot(), changed: Some(seconds), expired: seconds == 0 }
        };
        if seconds > 0 {
            let task = spawn_ticker(&self.shared)?;
            *self.shared.ticker() = Some(task);
        }
        info!(quiz_id = self.shared.quiz_id, seconds, "timer started");
        self.shared.publish(publish);
        Ok(())
    }

    /// Overwrite the remaining time with an authoritative value. Zero expires
    /// a running timer.
    pub fn reconcile(&self, seconds: u32) {
        self.shared.reconcile(seconds);
    }

    /// Pause or resume ticking without changing phase.
    pub fn set_enabled(&self, enabled: bool) {
        let publish = {
            let mut core = self.shared.core();
            if core.enabled == enabled {
                return;
            }
            core.enabled = enabled;
            Publish { snapshot: core.snapshot(), changed: None, expired: false }
        };
        self.shared.publish(publish);
    }

    /// Halt the ticker. No callback fires after this returns.
    pub fn stop(&self) {
        self.shared.halt();
        let publish = {
            let mut core = self.shared.core();
            if core.phase == TimerPhase::Stopped {
                return;
            }
            core.phase = TimerPhase::Stopped;
            core.generation += 1;
            Publish { snapshot: core.snapshot(), changed: None, expired: false }
        };
        self.shared.publish(publish);
    }

    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        self.shared.core().snapshot()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TimerSnapshot> {
        self.shared.tx.subscribe()
    }

    /// Apply `timer:sync` pushes for this quiz. Pushes without a quiz id are
    /// taken as addressed to us.
    pub fn follow(&self, conn: &Connection) -> Subscription {
        let weak = Arc::downgrade(&self.shared);
        conn.subscribe(EventKind::TimerSync, move |event| {
            let Event::Server(ServerEvent::TimerSync(sync)) = event else { return };
            let Some(shared) = weak.upgrade() else { return };
            if sync.quiz_id.is_some_and(|quiz_id| quiz_id != shared.quiz_id) {
                return;
            }
            shared.reconcile(sync.remaining_seconds);
        })
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.shared.halt();
    }
}

impl std::fmt::Debug for SessionTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTimer").field("quiz_id", &self.shared.quiz_id).field("state", &self.snapshot()).finish()
    }
}

#[cfg(test)]
#[path = "timer_test.rs"]
mod tests;
