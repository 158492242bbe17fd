use serde::Serialize;

use super::state::{TimerPhase, TimerSnapshot, TimerStatus};
use crate::db::StoredFocusSession;

/// Everything a surface needs to redraw, pushed over a broadcast channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TimerEvent {
    #[serde(rename_all = "camelCase")]
    StateChanged {
        status: TimerStatus,
        remaining_display: String,
        snapshot: TimerSnapshot,
    },
    /// `chime` mirrors the sound setting at the moment the phase ended.
    PhaseCompleted {
        finished: TimerPhase,
        next: Option<TimerPhase>,
        chime: bool,
    },
    SessionRecorded { session: StoredFocusSession },
}

impl TimerEvent {
    pub fn state_changed(snapshot: TimerSnapshot) -> Self {
        TimerEvent::StateChanged {
            status: snapshot.status(),
            remaining_display: snapshot.countdown_display(),
            snapshot,
        }
    }
}
