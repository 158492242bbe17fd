use std::sync::Arc;

use chrono::{TimeZone, Utc};
use focus_timer_lib::{
    db::{Database, FocusSessionFilter},
    sessions::spawn_session_writer,
    settings::TimerSettings,
    snapshot_store::{FileSnapshotStore, MemorySnapshotStore},
    sync::BroadcastNotifier,
    timer::{
        CollectingSink, ManualClock, SessionType, TimerController, TimerMachine, TimerPhase,
        TimerStatus,
    },
};
use tokio::{sync::broadcast, time::Duration};

fn fifty_minute_work() -> Arc<TimerSettings> {
    Arc::new(TimerSettings {
        work_min: 50,
        ..TimerSettings::default()
    })
}

fn run_ticks(machine: &mut TimerMachine, clock: &ManualClock, n: u32) {
    for _ in 0..n {
        clock.advance_secs(1);
        machine.tick();
    }
}

#[tokio::test]
async fn switching_mid_phase_stores_one_session_per_target() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("focus.sqlite3")).unwrap();
    let (events, _) = broadcast::channel(64);
    let (queue, writer) = spawn_session_writer(db.clone(), events);

    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
    let store = Arc::new(FileSnapshotStore::new(dir.path().join("timer_snapshot.json")));
    let mut machine = TimerMachine::with_clock(
        fifty_minute_work(),
        store.clone(),
        Arc::new(queue),
        clock.clone(),
    );

    machine.start_timer(SessionType::Pomodoro, "P", None);
    run_ticks(&mut machine, &clock, 1200);
    machine.switch_task("Q", Some("T".into()));
    run_ticks(&mut machine, &clock, 1800);

    // autoStartNext is off: the work phase halted with its target retained
    assert_eq!(machine.status(), TimerStatus::Halted);
    assert_eq!(machine.snapshot().current_phase, TimerPhase::Work);

    drop(machine);
    writer.await.unwrap();

    let mut stored = db
        .list_focus_sessions(FocusSessionFilter::default())
        .await
        .unwrap();
    stored.reverse();
    assert_eq!(stored.len(), 2);

    assert_eq!(stored[0].record.project_id, "P");
    assert_eq!(stored[0].record.task_id, None);
    assert_eq!(stored[0].record.duration_sec, 1200);
    assert_eq!(stored[1].record.project_id, "Q");
    assert_eq!(stored[1].record.task_id.as_deref(), Some("T"));
    assert_eq!(stored[1].record.duration_sec, 1800);
    for session in &stored {
        assert_eq!(session.record.session_type, SessionType::Pomodoro);
        assert_eq!(session.record.pomodoro_cycles, Some(1));
        assert!(session.record.start <= session.record.end);
    }

    let day = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let totals = db
        .project_totals(day, day + chrono::Duration::days(1))
        .await
        .unwrap();
    let total: u64 = totals.iter().map(|t| t.total_sec).sum();
    assert_eq!(total, 3000);
}

#[tokio::test]
async fn a_new_process_picks_up_the_persisted_timer() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("timer_snapshot.json");
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
    let sink = Arc::new(CollectingSink::new());

    let mut first = TimerMachine::with_clock(
        fifty_minute_work(),
        Arc::new(FileSnapshotStore::new(snapshot_path.clone())),
        sink.clone(),
        clock.clone(),
    );
    first.start_timer(SessionType::Pomodoro, "P", None);
    run_ticks(&mut first, &clock, 100);
    drop(first);

    // an hour passes with nothing open
    clock.advance_secs(3600);

    let mut second = TimerMachine::with_clock(
        fifty_minute_work(),
        Arc::new(FileSnapshotStore::new(snapshot_path)),
        sink.clone(),
        clock.clone(),
    );
    assert_eq!(second.restore_state(), TimerStatus::Running);
    assert_eq!(second.snapshot().time_remaining, 2900);
    assert_eq!(second.snapshot().session_start, Some(clock_now(&clock)));

    run_ticks(&mut second, &clock, 50);
    let record = second.stop_timer().unwrap();
    assert_eq!(record.duration_sec, 150);
    assert_eq!(second.status(), TimerStatus::Idle);
}

fn clock_now(clock: &ManualClock) -> chrono::DateTime<Utc> {
    use focus_timer_lib::timer::Clock;
    clock.now()
}

#[tokio::test(start_paused = true)]
async fn surfaces_sharing_a_store_follow_each_other() {
    let store = Arc::new(MemorySnapshotStore::new());
    let notifier = Arc::new(BroadcastNotifier::new());
    let sink = Arc::new(CollectingSink::new());
    let (events, _) = broadcast::channel(512);

    let popup = TimerController::for_surface(
        fifty_minute_work(),
        store.clone(),
        sink.clone(),
        notifier.clone(),
        events.clone(),
    )
    .await;
    let tray = TimerController::for_surface(
        fifty_minute_work(),
        store.clone(),
        sink.clone(),
        notifier.clone(),
        events,
    )
    .await;
    assert_ne!(popup.surface_id(), tray.surface_id());

    popup
        .start_timer(SessionType::Pomodoro, "P".into(), Some("T".into()))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = tray.snapshot().await;
    assert_eq!(seen.status(), TimerStatus::Running);
    assert_eq!(seen.selected_project_id.as_deref(), Some("P"));
    assert_eq!(seen.selected_task_id.as_deref(), Some("T"));

    tray.pause_timer().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(popup.status().await, TimerStatus::Paused);

    popup.stop_timer().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(tray.status().await, TimerStatus::Idle);
    assert!(store.peek().is_none());

    popup.shutdown().await;
    tray.shutdown().await;
}
