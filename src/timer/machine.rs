use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::{
    ports::{Clock, SessionSink, SettingsProvider, SnapshotStore, SystemClock},
    state::{FocusSessionRecord, SessionType, TimerPhase, TimerSnapshot, TimerStatus},
};
use crate::settings::TimerSettings;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Length of a manual (non-Pomodoro) run.
pub const MANUAL_DURATION_SECS: u64 = 25 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, or paused.
    Skipped,
    Counted,
    PhaseCompleted {
        finished: TimerPhase,
        /// The phase that auto-started, `None` when the timer halted.
        next: Option<TimerPhase>,
        record: Option<FocusSessionRecord>,
    },
    /// A manual run ran out and the timer returned to idle.
    Stopped { record: Option<FocusSessionRecord> },
}

/// The single active timer.
///
/// Every operation runs to completion without blocking: records go to the
/// [`SessionSink`] and snapshots to the [`SnapshotStore`], and failures of
/// either are logged rather than surfaced.
pub struct TimerMachine {
    snapshot: TimerSnapshot,
    settings: Arc<dyn SettingsProvider>,
    store: Arc<dyn SnapshotStore>,
    sink: Arc<dyn SessionSink>,
    clock: Arc<dyn Clock>,
}

impl TimerMachine {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        store: Arc<dyn SnapshotStore>,
        sink: Arc<dyn SessionSink>,
    ) -> Self {
        Self::with_clock(settings, store, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: Arc<dyn SettingsProvider>,
        store: Arc<dyn SnapshotStore>,
        sink: Arc<dyn SessionSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            snapshot: TimerSnapshot::idle(),
            settings,
            store,
            sink,
            clock,
        }
    }

    pub fn snapshot(&self) -> &TimerSnapshot {
        &self.snapshot
    }

    pub fn status(&self) -> TimerStatus {
        self.snapshot.status()
    }

    /// Current settings, or the defaults when the provider hands out values
    /// no phase could run with.
    pub fn settings(&self) -> TimerSettings {
        self.settings.timer_settings().or_defaults()
    }

    /// Begin a fresh run, replacing whatever was loaded.
    pub fn start_timer(
        &mut self,
        session_type: SessionType,
        project_id: impl Into<String>,
        task_id: Option<String>,
    ) {
        let settings = self.settings();
        let now = self.clock.now();

        let (phase, total, cycles, current_cycle) = match session_type {
            SessionType::Pomodoro => (
                TimerPhase::Work,
                settings.work_secs(),
                settings.cycles_to_long_break.max(1),
                1,
            ),
            SessionType::Manual => (TimerPhase::Manual, MANUAL_DURATION_SECS, 0, 0),
        };

        self.snapshot = TimerSnapshot {
            is_running: true,
            is_paused: false,
            current_phase: phase,
            time_remaining: total,
            total_time: total,
            cycles,
            current_cycle,
            selected_project_id: Some(project_id.into()),
            selected_task_id: task_id,
            session_start: Some(now),
            elapsed_in_cycle: 0,
        };

        log_info!(
            "Timer started: {} for {}s on project {:?}",
            phase.as_str(),
            total,
            self.snapshot.selected_project_id
        );
        self.persist();
    }

    /// Attribute the open segment to the current target, then point the
    /// running countdown at a new one.
    pub fn switch_task(
        &mut self,
        project_id: impl Into<String>,
        task_id: Option<String>,
    ) -> Option<FocusSessionRecord> {
        if !self.snapshot.is_running {
            log_warn!("switch_task ignored: no timer running");
            return None;
        }

        let now = self.clock.now();
        let elapsed = self.snapshot.elapsed();
        let record = self.emit_segment(self.snapshot.segment_elapsed(), now);

        self.snapshot.selected_project_id = Some(project_id.into());
        self.snapshot.selected_task_id = task_id;
        self.snapshot.session_start = Some(now);
        self.snapshot.elapsed_in_cycle = elapsed;

        log_debug!(
            "Switched target to {:?} with {}s already used in phase",
            self.snapshot.selected_project_id,
            elapsed
        );
        self.persist();
        record
    }

    pub fn pause_timer(&mut self) {
        if !self.snapshot.is_running {
            return;
        }
        self.snapshot.is_paused = true;
        self.persist();
    }

    /// Unfreeze a paused countdown. A halted Pomodoro with time on the clock
    /// (after `next_phase` or `reset_timer`) is re-armed as a new segment.
    pub fn resume_timer(&mut self) {
        if self.snapshot.is_running {
            self.snapshot.is_paused = false;
            self.persist();
            return;
        }

        if self.snapshot.status() == TimerStatus::Halted && self.snapshot.time_remaining > 0 {
            self.snapshot.is_running = true;
            self.snapshot.is_paused = false;
            self.snapshot.session_start = Some(self.clock.now());
            self.snapshot.elapsed_in_cycle = self.snapshot.elapsed();
            log_info!("Resumed halted {} phase", self.snapshot.current_phase.as_str());
            self.persist();
        }
    }

    /// Close the open segment and return to idle. The persisted snapshot is
    /// removed, not overwritten.
    pub fn stop_timer(&mut self) -> Option<FocusSessionRecord> {
        let record = if self.snapshot.is_running {
            let now = self.clock.now();
            self.emit_segment(self.snapshot.segment_elapsed(), now)
        } else {
            None
        };

        self.snapshot = TimerSnapshot::idle();
        if let Err(err) = self.store.clear() {
            log::error!("Failed to clear timer snapshot: {err:?}");
        }
        log_info!("Timer stopped");
        record
    }

    /// Start the current phase over. Progress since the last emitted segment
    /// is discarded.
    pub fn reset_timer(&mut self) {
        if self.snapshot.status() == TimerStatus::Idle {
            return;
        }
        self.snapshot.time_remaining = self.snapshot.total_time;
        self.snapshot.is_paused = false;
        self.snapshot.elapsed_in_cycle = 0;
        self.persist();
    }

    /// Move to the following Pomodoro phase. A manual skip never records the
    /// skipped remainder; only natural expiry of a work phase does.
    pub fn next_phase(&mut self) {
        if self.snapshot.current_phase == TimerPhase::Manual || self.snapshot.cycles == 0 {
            log_debug!("next_phase ignored outside Pomodoro mode");
            return;
        }

        let settings = self.settings();
        let (phase, total) = match self.snapshot.current_phase {
            TimerPhase::Work if self.snapshot.current_cycle >= self.snapshot.cycles => {
                self.snapshot.current_cycle = 1;
                (TimerPhase::LongBreak, settings.long_break_secs())
            }
            TimerPhase::Work => {
                self.snapshot.current_cycle += 1;
                (TimerPhase::ShortBreak, settings.short_break_secs())
            }
            TimerPhase::ShortBreak | TimerPhase::LongBreak | TimerPhase::Manual => {
                (TimerPhase::Work, settings.work_secs())
            }
        };

        self.snapshot.current_phase = phase;
        self.snapshot.total_time = total;
        self.snapshot.time_remaining = total;
        self.snapshot.session_start = Some(self.clock.now());
        self.snapshot.elapsed_in_cycle = 0;

        log_info!(
            "Entered {} ({}s), cycle {}/{}",
            phase.as_str(),
            total,
            self.snapshot.current_cycle,
            self.snapshot.cycles
        );
        self.persist();
    }

    /// Advance the countdown by one second. Expected once per elapsed second
    /// while running; extra calls under-count wall-clock time.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.snapshot.is_ticking() {
            return TickOutcome::Skipped;
        }

        if self.snapshot.time_remaining > 0 {
            self.snapshot.time_remaining -= 1;
            if self.snapshot.time_remaining > 0 {
                self.persist();
                return TickOutcome::Counted;
            }
        }

        self.complete_phase()
    }

    /// Load the persisted snapshot on mount or focus. Wall-clock time spent
    /// with no surface ticking is not credited to anyone: a running
    /// snapshot's segment restarts at now.
    pub fn restore_state(&mut self) -> TimerStatus {
        let mut snapshot = self.load_persisted().unwrap_or_default();
        if snapshot.is_ticking() {
            snapshot.session_start = Some(self.clock.now());
        }
        self.snapshot = snapshot;
        log_debug!("Restored timer state: {:?}", self.snapshot.status());
        self.snapshot.status()
    }

    /// Adopt the persisted snapshot verbatim after another surface wrote it.
    pub fn reconcile(&mut self) -> TimerStatus {
        self.snapshot = self.load_persisted().unwrap_or_default();
        self.snapshot.status()
    }

    fn complete_phase(&mut self) -> TickOutcome {
        let finished = self.snapshot.current_phase;
        let now = self.clock.now();

        let record = match finished {
            TimerPhase::Manual => {
                let record = self.stop_timer();
                return TickOutcome::Stopped { record };
            }
            TimerPhase::Work => {
                let duration = self
                    .snapshot
                    .total_time
                    .saturating_sub(self.snapshot.elapsed_in_cycle);
                self.emit_segment(duration, now)
            }
            TimerPhase::ShortBreak | TimerPhase::LongBreak => None,
        };

        let next = if self.settings().auto_start_next {
            self.next_phase();
            Some(self.snapshot.current_phase)
        } else {
            self.halt();
            None
        };

        log_info!(
            "Phase {} complete, next: {:?}",
            finished.as_str(),
            next.map(|p| p.as_str())
        );
        TickOutcome::PhaseCompleted {
            finished,
            next,
            record,
        }
    }

    fn halt(&mut self) {
        self.snapshot.is_running = false;
        self.snapshot.is_paused = false;
        self.snapshot.session_start = None;
        self.snapshot.elapsed_in_cycle = 0;
        self.persist();
    }

    /// Build and hand off a record for the open segment if it has a target
    /// and a positive duration.
    fn emit_segment(
        &self,
        duration_sec: u64,
        now: DateTime<Utc>,
    ) -> Option<FocusSessionRecord> {
        let project_id = self.snapshot.selected_project_id.clone()?;
        if duration_sec == 0 {
            return None;
        }

        let start = self.snapshot.session_start.unwrap_or_else(|| {
            i64::try_from(duration_sec)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|elapsed| now.checked_sub_signed(elapsed))
                .unwrap_or(now)
        });
        // A clock that stepped backwards must not produce end < start.
        let start = start.min(now);

        let session_type = self.snapshot.session_type();
        let record = FocusSessionRecord {
            project_id,
            task_id: self.snapshot.selected_task_id.clone(),
            start,
            end: now,
            duration_sec,
            session_type,
            pomodoro_cycles: (session_type == SessionType::Pomodoro)
                .then_some(self.snapshot.current_cycle),
        };

        log_info!(
            "Recording {}s of {} time for project {}",
            record.duration_sec,
            session_type.as_str(),
            record.project_id
        );
        self.sink.submit(record.clone());
        Some(record)
    }

    fn load_persisted(&self) -> Option<TimerSnapshot> {
        match self.store.load() {
            Ok(snapshot) => snapshot.map(TimerSnapshot::sanitized),
            Err(err) => {
                log_warn!("Discarding unreadable timer snapshot: {err:?}");
                None
            }
        }
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.snapshot) {
            log::error!("Failed to persist timer snapshot: {err:?}");
        }
    }
}
