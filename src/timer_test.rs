use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;

use super::*;
use crate::test_support::{MockQuizApi, offline_connection, push_frame};

struct Recorded {
    changes: Arc<Mutex<Vec<u32>>>,
    time_ups: Arc<AtomicUsize>,
}

fn recording_timer(api: MockQuizApi) -> (SessionTimer, Recorded) {
    timer_over(&Arc::new(api))
}

fn timer_over(api: &Arc<MockQuizApi>) -> (SessionTimer, Recorded) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let time_ups = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&changes);
    let t = Arc::clone(&time_ups);
    let hooks = TimerHooks::new()
        .on_time_change(move |seconds| c.lock().unwrap().push(seconds))
        .on_time_up(move || {
            t.fetch_add(1, Ordering::SeqCst);
        });
    let api: Arc<dyn QuizApi> = Arc::clone(api) as Arc<dyn QuizApi>;
    (SessionTimer::new(7, api, 30, hooks), Recorded { changes, time_ups })
}

async fn seconds(n: f64) {
    tokio::time::sleep(Duration::from_secs_f64(n)).await;
}

#[test]
fn format_clock_pads_and_does_not_wrap_minutes() {
    assert_eq!(format_clock(65), "01:05");
    assert_eq!(format_clock(3600), "60:00");
    assert_eq!(format_clock(0), "00:00");
    assert_eq!(format_clock(9), "00:09");
}

#[test]
fn new_timer_is_idle() {
    let (timer, _) = recording_timer(MockQuizApi::default());
    let snapshot = timer.snapshot();
    assert_eq!(snapshot.phase, TimerPhase::Idle);
    assert!(!snapshot.running);
    assert_eq!(snapshot.formatted, "00:00");
}

#[test]
fn start_outside_runtime_fails() {
    let (timer, _) = recording_timer(MockQuizApi::default());
    assert!(matches!(timer.start_with(10), Err(EngineError::NoRuntime)));
}

#[tokio::test(start_paused = true)]
async fn counts_down_once_per_second_without_increasing() {
    let (timer, recorded) = recording_timer(MockQuizApi::default());
    timer.start(DurationSeed::Remaining(5)).await.unwrap();
    seconds(3.5).await;

    let changes = recorded.changes.lock().unwrap().clone();
    assert_eq!(changes, vec![5, 4, 3, 2]);
    assert!(changes.windows(2).all(|pair| pair[1] <= pair[0]));
    assert_eq!(timer.snapshot().remaining_seconds, 2);
    assert!(timer.snapshot().running);
}

#[tokio::test(start_paused = true)]
async fn expiry_fires_exactly_once_and_halts() {
    let (timer, recorded) = recording_timer(MockQuizApi::default());
    timer.start_with(2).unwrap();
    seconds(10.5).await;

    assert_eq!(recorded.time_ups.load(Ordering::SeqCst), 1);
    assert_eq!(*recorded.changes.lock().unwrap(), vec![2, 1, 0]);
    let snapshot = timer.snapshot();
    assert_eq!(snapshot.phase, TimerPhase::Expired);
    assert_eq!(snapshot.remaining_seconds, 0);
    assert!(!snapshot.running);
}

#[tokio::test(start_paused = true)]
async fn overlapping_tickers_still_expire_once() {
    let (timer, recorded) = recording_timer(MockQuizApi::default());
    timer.start_with(3).unwrap();
    let extra = spawn_ticker(&timer.shared).unwrap();
    let another = spawn_ticker(&timer.shared).unwrap();
    seconds(5.5).await;

    assert_eq!(recorded.time_ups.load(Ordering::SeqCst), 1);
    assert_eq!(timer.snapshot().remaining_seconds, 0);
    assert!(extra.is_finished());
    assert!(another.is_finished());
}

#[tokio::test(start_paused = true)]
async fn zero_duration_expires_immediately() {
    let (timer, recorded) = recording_timer(MockQuizApi::default());
    timer.start_with(0).unwrap();
    assert_eq!(recorded.time_ups.load(Ordering::SeqCst), 1);
    assert_eq!(timer.snapshot().phase, TimerPhase::Expired);
    seconds(2.5).await;
    assert_eq!(recorded.time_ups.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn reconcile_overwrites_without_changing_phase() {
    let (timer, recorded) = recording_timer(MockQuizApi::default());
    timer.start_with(10).unwrap();
    timer.reconcile(500);

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.remaining_seconds, 500);
    assert_eq!(snapshot.phase, TimerPhase::Running);
    assert_eq!(recorded.changes.lock().unwrap().last(), Some(&500));

    seconds(1.5).await;
    assert_eq!(timer.snapshot().remaining_seconds, 499);
}

#[tokio::test(start_paused = true)]
async fn reconcile_after_expiry_only_sets_value() {
    let (timer, recorded) = recording_timer(MockQuizApi::default());
    timer.start_with(1).unwrap();
    seconds(1.5).await;
    timer.reconcile(30);
    seconds(3.5).await;

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.phase, TimerPhase::Expired);
    assert_eq!(snapshot.remaining_seconds, 30);
    assert_eq!(recorded.time_ups.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_timer_does_not_tick() {
    let (timer, _) = recording_timer(MockQuizApi::default());
    timer.start_with(10).unwrap();
    timer.set_enabled(false);
    seconds(3.5).await;
    assert_eq!(timer.snapshot().remaining_seconds, 10);
    assert!(!timer.snapshot().running);

    timer.set_enabled(true);
    seconds(1.0).await;
    assert!(timer.snapshot().remaining_seconds < 10);
}

#[tokio::test(start_paused = true)]
async fn stop_silences_callbacks() {
    let (timer, recorded) = recording_timer(MockQuizApi::default());
    timer.start_with(3).unwrap();
    seconds(1.5).await;
    timer.stop();
    let before = recorded.changes.lock().unwrap().len();
    seconds(5.0).await;
    timer.reconcile(100);

    assert_eq!(recorded.changes.lock().unwrap().len(), before);
    assert_eq!(recorded.time_ups.load(Ordering::SeqCst), 0);
    assert_eq!(timer.snapshot().phase, TimerPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn zero_sync_expires_a_running_timer_at_once() {
    let (timer, recorded) = recording_timer(MockQuizApi::default());
    timer.start_with(10).unwrap();
    timer.reconcile(0);

    assert_eq!(timer.snapshot().phase, TimerPhase::Expired);
    assert_eq!(recorded.time_ups.load(Ordering::SeqCst), 1);
    seconds(3.5).await;
    assert_eq!(*recorded.changes.lock().unwrap(), vec![10, 0]);
    assert_eq!(recorded.time_ups.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_seed_uses_quiz_duration() {
    let api = Arc::new(MockQuizApi::with_duration(Some(2)));
    let (timer, _) = timer_over(&api);
    timer.start(DurationSeed::Fetch).await.unwrap();
    assert_eq!(timer.snapshot().remaining_seconds, 120);
    assert_eq!(api.quiz_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_falls_back_to_default() {
    let api = Arc::new(MockQuizApi::default());
    let (timer, _) = timer_over(&api);
    timer.start(DurationSeed::Fetch).await.unwrap();
    assert_eq!(timer.snapshot().remaining_seconds, 30 * 60);
    assert_eq!(timer.snapshot().formatted, "30:00");
    assert_eq!(api.quiz_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_seeds_skip_the_metadata_request() {
    let api = Arc::new(MockQuizApi::with_duration(Some(2)));
    let (timer, _) = timer_over(&api);
    timer.start(DurationSeed::Minutes(1)).await.unwrap();
    timer.start(DurationSeed::Remaining(15)).await.unwrap();
    assert_eq!(api.quiz_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn sync_during_fetch_beats_the_fetched_duration() {
    let conn = offline_connection();
    let api = Arc::new(MockQuizApi::with_duration(Some(30)));
    *api.hold_quiz.lock().unwrap() = true;
    let (timer, _) = timer_over(&api);
    let _sub = timer.follow(&conn);

    let (started, ()) = tokio::join!(timer.start(DurationSeed::Fetch), async {
        tokio::task::yield_now().await;
        conn.dispatch_frame(&push_frame(frames::syscall::TIMER_SYNC, Some("quiz:7"), json!({ "remaining_seconds": 120 })));
        api.release_quiz();
    });
    started.unwrap();

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.remaining_seconds, 120);
    assert_eq!(snapshot.phase, TimerPhase::Running);
    assert_eq!(api.quiz_calls.load(Ordering::SeqCst), 1);
    seconds(1.5).await;
    assert_eq!(timer.snapshot().remaining_seconds, 119);
}

#[tokio::test(start_paused = true)]
async fn stop_during_fetch_wins() {
    let api = Arc::new(MockQuizApi::with_duration(Some(5)));
    *api.hold_quiz.lock().unwrap() = true;
    let (timer, recorded) = timer_over(&api);

    let (started, ()) = tokio::join!(timer.start(DurationSeed::Fetch), async {
        tokio::task::yield_now().await;
        timer.stop();
        api.release_quiz();
    });
    started.unwrap();

    assert_eq!(timer.snapshot().phase, TimerPhase::Stopped);
    assert!(recorded.changes.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn untimed_quiz_falls_back_to_default() {
    let (timer, _) = recording_timer(MockQuizApi::with_duration(None));
    timer.start(DurationSeed::Minutes(0)).await.unwrap();
    assert_eq!(timer.snapshot().phase, TimerPhase::Expired);
    timer.start(DurationSeed::Fetch).await.unwrap();
    assert_eq!(timer.snapshot().remaining_seconds, 30 * 60);
}

#[tokio::test(start_paused = true)]
async fn watch_sees_each_tick() {
    let (timer, _) = recording_timer(MockQuizApi::default());
    let mut rx = timer.watch();
    timer.start_with(4).unwrap();
    seconds(1.5).await;
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().formatted, "00:03");
}

#[tokio::test(start_paused = true)]
async fn follow_applies_sync_for_own_quiz_only() {
    let conn = offline_connection();
    let (timer, _) = recording_timer(MockQuizApi::default());
    timer.start_with(100).unwrap();
    let sub = timer.follow(&conn);

    conn.dispatch_frame(&push_frame(frames::syscall::TIMER_SYNC, Some("quiz:8"), json!({ "remaining_seconds": 5 })));
    assert_eq!(timer.snapshot().remaining_seconds, 100);

    conn.dispatch_frame(&push_frame(frames::syscall::TIMER_SYNC, Some("quiz:7"), json!({ "remaining_seconds": 42 })));
    assert_eq!(timer.snapshot().remaining_seconds, 42);

    drop(sub);
    conn.dispatch_frame(&push_frame(frames::syscall::TIMER_SYNC, None, json!({ "remaining_seconds": 1 })));
    assert_eq!(timer.snapshot().remaining_seconds, 42);
}
