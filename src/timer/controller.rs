use std::sync::Arc;

use log::warn;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};

use crate::sync::{ChangeNotifier, NotifyingSnapshotStore, SurfaceId};

use super::{
    events::TimerEvent,
    machine::{TickOutcome, TimerMachine},
    ports::{SessionSink, SettingsProvider, SnapshotStore},
    state::{FocusSessionRecord, SessionType, TimerPhase, TimerSnapshot, TimerStatus},
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// One surface's handle on the shared timer: owns a [`TimerMachine`], drives
/// it once per second while running, and reloads it whenever another
/// surface writes the shared snapshot.
#[derive(Clone)]
pub struct TimerController {
    surface: SurfaceId,
    machine: Arc<Mutex<TimerMachine>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    reconciler: Arc<Mutex<Option<JoinHandle<()>>>>,
    events: broadcast::Sender<TimerEvent>,
}

impl TimerController {
    pub fn new(
        surface: SurfaceId,
        machine: TimerMachine,
        events: broadcast::Sender<TimerEvent>,
    ) -> Self {
        Self {
            surface,
            machine: Arc::new(Mutex::new(machine)),
            ticker: Arc::new(Mutex::new(None)),
            reconciler: Arc::new(Mutex::new(None)),
            events,
        }
    }

    /// Wire up a surface over a shared store: writes are announced through
    /// `notifier`, and announcements from other surfaces trigger a reload.
    pub async fn for_surface(
        settings: Arc<dyn SettingsProvider>,
        shared_store: Arc<dyn SnapshotStore>,
        sink: Arc<dyn SessionSink>,
        notifier: Arc<dyn ChangeNotifier>,
        events: broadcast::Sender<TimerEvent>,
    ) -> Self {
        let surface = SurfaceId::new();
        let store = NotifyingSnapshotStore::new(shared_store, notifier.clone(), surface);
        let machine = TimerMachine::new(settings, Arc::new(store), sink);
        let controller = Self::new(surface, machine, events);
        controller.attach(notifier.as_ref()).await;
        controller
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        self.machine.lock().await.snapshot().clone()
    }

    pub async fn status(&self) -> TimerStatus {
        self.machine.lock().await.status()
    }

    pub async fn start_timer(
        &self,
        session_type: SessionType,
        project_id: String,
        task_id: Option<String>,
    ) -> TimerSnapshot {
        self.apply(|m| m.start_timer(session_type, project_id, task_id))
            .await
            .1
    }

    pub async fn switch_task(
        &self,
        project_id: String,
        task_id: Option<String>,
    ) -> Option<FocusSessionRecord> {
        self.apply(|m| m.switch_task(project_id, task_id)).await.0
    }

    pub async fn pause_timer(&self) -> TimerSnapshot {
        self.apply(|m| m.pause_timer()).await.1
    }

    pub async fn resume_timer(&self) -> TimerSnapshot {
        self.apply(|m| m.resume_timer()).await.1
    }

    pub async fn stop_timer(&self) -> Option<FocusSessionRecord> {
        self.apply(|m| m.stop_timer()).await.0
    }

    pub async fn reset_timer(&self) -> TimerSnapshot {
        self.apply(|m| m.reset_timer()).await.1
    }

    pub async fn next_phase(&self) -> TimerSnapshot {
        self.apply(|m| m.next_phase()).await.1
    }

    /// Call when the surface becomes active.
    pub async fn mount(&self) -> TimerStatus {
        let (status, _) = self.apply(|m| m.restore_state()).await;
        log_info!("Surface {} mounted with timer {:?}", self.surface, status);
        status
    }

    pub async fn reconcile(&self) -> TimerStatus {
        self.apply(|m| m.reconcile()).await.0
    }

    /// Listen for snapshot changes made elsewhere.
    pub async fn attach(&self, notifier: &dyn ChangeNotifier) {
        let mut rx = notifier.subscribe();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) if change.concerns(this.surface) => {
                        log_debug!("Surface {} reconciling after external write", this.surface);
                        this.reconcile().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Surface {} missed {skipped} snapshot notices", this.surface);
                        this.reconcile().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.reconciler.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Stop background tasks and wait for them to go away. State is left as
    /// persisted.
    pub async fn shutdown(&self) {
        let handles = [
            self.ticker.lock().await.take(),
            self.reconciler.lock().await.take(),
        ];
        for handle in handles.into_iter().flatten() {
            handle.abort();
            let _ = handle.await;
        }
    }

    async fn apply<R>(&self, op: impl FnOnce(&mut TimerMachine) -> R) -> (R, TimerSnapshot) {
        let (result, was_running, snapshot) = {
            let mut machine = self.machine.lock().await;
            let was_running = machine.snapshot().is_running;
            let result = op(&mut machine);
            (result, was_running, machine.snapshot().clone())
        };

        // The ticker exits by itself once it sees the timer stopped, so a
        // transition into running always needs a fresh one.
        if !snapshot.is_running {
            self.cancel_ticker().await;
        } else if !was_running || !self.ticker_alive().await {
            self.spawn_ticker().await;
        }

        let _ = self.events.send(TimerEvent::state_changed(snapshot.clone()));
        (result, snapshot)
    }

    async fn ticker_alive(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let machine = self.machine.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let mut interval =
                time::interval_at(time::Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                let (outcome, snapshot, chime) = {
                    let mut guard = machine.lock().await;
                    let outcome = guard.tick();
                    let chime = match outcome {
                        TickOutcome::PhaseCompleted { .. } | TickOutcome::Stopped { .. } => {
                            guard.settings().sound_on
                        }
                        _ => false,
                    };
                    (outcome, guard.snapshot().clone(), chime)
                };

                match outcome {
                    TickOutcome::Skipped => {
                        if !snapshot.is_running {
                            break;
                        }
                    }
                    TickOutcome::Counted => {
                        let _ = events.send(TimerEvent::state_changed(snapshot));
                    }
                    TickOutcome::PhaseCompleted { finished, next, .. } => {
                        let _ = events.send(TimerEvent::PhaseCompleted {
                            finished,
                            next,
                            chime,
                        });
                        let running = snapshot.is_running;
                        let _ = events.send(TimerEvent::state_changed(snapshot));
                        if !running {
                            break;
                        }
                    }
                    TickOutcome::Stopped { .. } => {
                        let _ = events.send(TimerEvent::PhaseCompleted {
                            finished: TimerPhase::Manual,
                            next: None,
                            chime,
                        });
                        let _ = events.send(TimerEvent::state_changed(snapshot));
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        settings::TimerSettings,
        snapshot_store::MemorySnapshotStore,
        sync::BroadcastNotifier,
        timer::ports::CollectingSink,
    };

    fn quick_settings(auto_start_next: bool) -> Arc<TimerSettings> {
        Arc::new(TimerSettings {
            work_min: 1,
            short_break_min: 1,
            long_break_min: 1,
            cycles_to_long_break: 2,
            auto_start_next,
            sound_on: true,
        })
    }

    fn controller(auto: bool) -> (TimerController, Arc<CollectingSink>, Arc<MemorySnapshotStore>) {
        let sink = Arc::new(CollectingSink::new());
        let store = Arc::new(MemorySnapshotStore::new());
        let machine = TimerMachine::new(quick_settings(auto), store.clone(), sink.clone());
        let (events, _) = broadcast::channel(512);
        (
            TimerController::new(SurfaceId::new(), machine, events),
            sink,
            store,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_counts_down_once_per_second() {
        let (controller, _, store) = controller(false);
        controller
            .start_timer(SessionType::Pomodoro, "p".into(), None)
            .await;

        time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(controller.snapshot().await.time_remaining, 50);
        assert_eq!(store.peek().map(|s| s.time_remaining), Some(50));
    }

    #[tokio::test(start_paused = true)]
    async fn paused_timer_does_not_count() {
        let (controller, _, _) = controller(false);
        controller
            .start_timer(SessionType::Pomodoro, "p".into(), None)
            .await;
        time::sleep(Duration::from_millis(3_500)).await;
        controller.pause_timer().await;
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(controller.snapshot().await.time_remaining, 57);

        controller.resume_timer().await;
        time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(controller.snapshot().await.time_remaining, 55);
    }

    #[tokio::test(start_paused = true)]
    async fn phase_completion_halts_and_broadcasts() {
        let (controller, sink, _) = controller(false);
        let mut rx = controller.subscribe();
        controller
            .start_timer(SessionType::Pomodoro, "p".into(), None)
            .await;

        time::sleep(Duration::from_secs(65)).await;
        assert_eq!(controller.status().await, TimerStatus::Halted);
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].duration_sec, 60);

        let mut completed = None;
        while let Ok(event) = rx.try_recv() {
            if let TimerEvent::PhaseCompleted {
                finished,
                next,
                chime,
            } = event
            {
                completed = Some((finished, next, chime));
            }
        }
        assert_eq!(completed, Some((TimerPhase::Work, None, true)));

        // resume after skipping ahead starts a fresh ticker
        controller.next_phase().await;
        controller.resume_timer().await;
        time::sleep(Duration::from_millis(5_500)).await;
        let snap = controller.snapshot().await;
        assert_eq!(snap.current_phase, TimerPhase::ShortBreak);
        assert_eq!(snap.time_remaining, 55);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_advance_keeps_ticking_into_the_break() {
        let (controller, _, _) = controller(true);
        controller
            .start_timer(SessionType::Pomodoro, "p".into(), None)
            .await;
        time::sleep(Duration::from_millis(70_500)).await;

        let snap = controller.snapshot().await;
        assert_eq!(snap.current_phase, TimerPhase::ShortBreak);
        assert_eq!(snap.current_cycle, 2);
        assert_eq!(snap.time_remaining, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_ticker() {
        let (controller, sink, store) = controller(false);
        controller
            .start_timer(SessionType::Manual, "p".into(), None)
            .await;
        time::sleep(Duration::from_millis(4_500)).await;

        let record = controller.stop_timer().await.unwrap();
        assert_eq!(record.duration_sec, 4);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(controller.snapshot().await, TimerSnapshot::idle());
        assert!(store.peek().is_none());
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_reconcile_through_the_notifier() {
        let notifier: Arc<dyn ChangeNotifier> = Arc::new(BroadcastNotifier::new());
        let shared = Arc::new(MemorySnapshotStore::new());
        let sink = Arc::new(CollectingSink::new());
        let (events, _) = broadcast::channel(512);

        let main = TimerController::for_surface(
            quick_settings(false),
            shared.clone(),
            sink.clone(),
            notifier.clone(),
            events.clone(),
        )
        .await;
        let mini = TimerController::for_surface(
            quick_settings(false),
            shared.clone(),
            sink.clone(),
            notifier.clone(),
            events.clone(),
        )
        .await;
        assert_ne!(main.surface_id(), mini.surface_id());

        main.start_timer(SessionType::Pomodoro, "p".into(), None)
            .await;
        time::sleep(Duration::from_millis(100)).await;
        let seen = mini.snapshot().await;
        assert!(seen.is_running);
        assert_eq!(seen.selected_project_id.as_deref(), Some("p"));

        mini.pause_timer().await;
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(main.status().await, TimerStatus::Paused);

        main.stop_timer().await;
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mini.status().await, TimerStatus::Idle);
        assert!(shared.peek().is_none());

        main.shutdown().await;
        mini.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn every_running_surface_drives_the_shared_countdown() {
        let notifier: Arc<dyn ChangeNotifier> = Arc::new(BroadcastNotifier::new());
        let shared = Arc::new(MemorySnapshotStore::new());
        let sink = Arc::new(CollectingSink::new());
        let (events, _) = broadcast::channel(512);

        let main = TimerController::for_surface(
            quick_settings(false),
            shared.clone(),
            sink.clone(),
            notifier.clone(),
            events.clone(),
        )
        .await;
        main.start_timer(SessionType::Pomodoro, "p".into(), None)
            .await;

        // second surface opens half a second later, so its ticks land between
        // the first one's
        time::sleep(Duration::from_millis(500)).await;
        let mini = TimerController::for_surface(
            quick_settings(false),
            shared.clone(),
            sink.clone(),
            notifier.clone(),
            events,
        )
        .await;
        assert_eq!(mini.mount().await, TimerStatus::Running);

        time::sleep(Duration::from_millis(10_250)).await;

        // ten ticks from each surface in ten seconds
        assert_eq!(main.snapshot().await.time_remaining, 40);
        assert_eq!(mini.snapshot().await.time_remaining, 40);
        assert_eq!(shared.peek().map(|s| s.time_remaining), Some(40));

        main.shutdown().await;
        mini.shutdown().await;
    }
}
