use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TimerPhase {
    Work,
    ShortBreak,
    LongBreak,
    /// Freeform timing; a single phase with no transitions.
    Manual,
}

impl Default for TimerPhase {
    fn default() -> Self {
        TimerPhase::Work
    }
}

impl TimerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPhase::Work => "work",
            TimerPhase::ShortBreak => "short-break",
            TimerPhase::LongBreak => "long-break",
            TimerPhase::Manual => "manual",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimerPhase::Work => "Focus",
            TimerPhase::ShortBreak => "Short Break",
            TimerPhase::LongBreak => "Long Break",
            TimerPhase::Manual => "Manual",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    Manual,
    Pomodoro,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Manual => "manual",
            SessionType::Pomodoro => "pomodoro",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(SessionType::Manual),
            "pomodoro" => Some(SessionType::Pomodoro),
            _ => None,
        }
    }
}

/// Longest phase a snapshot may describe. Settings cannot configure more.
pub const MAX_PHASE_SECS: u64 = 24 * 60 * 60;

/// Coarse lifecycle derived from the snapshot flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    /// A Pomodoro phase ran out without auto-advance. Phase, cycle and target
    /// stay loaded for display until the user resumes or stops.
    Halted,
}

/// Complete state of the single active timer. This is what gets persisted and
/// what other surfaces reload during reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSnapshot {
    pub is_running: bool,
    pub is_paused: bool,
    pub current_phase: TimerPhase,
    pub time_remaining: u64,
    pub total_time: u64,
    pub cycles: u32,
    pub current_cycle: u32,
    pub selected_project_id: Option<String>,
    pub selected_task_id: Option<String>,
    pub session_start: Option<DateTime<Utc>>,
    /// Seconds of the current phase already credited to earlier segments.
    pub elapsed_in_cycle: u64,
}

impl TimerSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn status(&self) -> TimerStatus {
        match (self.is_running, self.is_paused) {
            (true, true) => TimerStatus::Paused,
            (true, false) => TimerStatus::Running,
            (false, _) if self.total_time > 0 => TimerStatus::Halted,
            (false, _) => TimerStatus::Idle,
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.is_running && !self.is_paused
    }

    pub fn session_type(&self) -> SessionType {
        if self.current_phase == TimerPhase::Manual {
            SessionType::Manual
        } else {
            SessionType::Pomodoro
        }
    }

    /// Seconds consumed in the current phase.
    pub fn elapsed(&self) -> u64 {
        self.total_time.saturating_sub(self.time_remaining)
    }

    /// Seconds attributable to the open segment. Clamped at zero.
    pub fn segment_elapsed(&self) -> u64 {
        self.elapsed().saturating_sub(self.elapsed_in_cycle)
    }

    pub fn progress(&self) -> f64 {
        format::progress_fraction(self.total_time, self.time_remaining)
    }

    pub fn countdown_display(&self) -> String {
        format::format_clock(self.time_remaining)
    }

    /// Clamp fields a hand-edited or stale snapshot could have pushed out of
    /// range.
    pub fn sanitized(mut self) -> Self {
        self.total_time = self.total_time.min(MAX_PHASE_SECS);
        self.time_remaining = self.time_remaining.min(self.total_time);
        self.elapsed_in_cycle = self.elapsed_in_cycle.min(self.elapsed());
        if !self.is_running {
            self.is_paused = false;
        }
        if self.status() == TimerStatus::Idle {
            return Self::idle();
        }
        self
    }
}

/// A finished slice of focus time attributed to one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSessionRecord {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_sec: u64,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pomodoro_cycles: Option<u32>,
}
