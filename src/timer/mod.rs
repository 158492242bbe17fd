pub mod commands;
pub mod controller;
pub mod events;
pub mod format;
pub mod machine;
pub mod ports;
pub mod state;

pub use controller::TimerController;
pub use events::TimerEvent;
pub use machine::{TickOutcome, TimerMachine, MANUAL_DURATION_SECS};
pub use ports::{Clock, CollectingSink, ManualClock, SessionSink, SettingsProvider, SnapshotStore, SystemClock};
pub use state::{
    FocusSessionRecord, SessionType, TimerPhase, TimerSnapshot, TimerStatus, MAX_PHASE_SECS,
};
