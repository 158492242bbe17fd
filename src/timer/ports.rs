//! Seams between the timer core and the outside world.

use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use super::state::{FocusSessionRecord, TimerSnapshot};
use crate::settings::TimerSettings;

pub trait SettingsProvider: Send + Sync {
    /// Looked up live on every phase start so edits apply to the next phase.
    fn timer_settings(&self) -> TimerSettings;
}

/// Durable per-device home of the current [`TimerSnapshot`].
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<TimerSnapshot>>;
    fn save(&self, snapshot: &TimerSnapshot) -> Result<()>;
    /// Remove the snapshot entirely so a fresh load sees no timer.
    fn clear(&self) -> Result<()>;
}

/// Receives finished session records. Must not block the caller.
pub trait SessionSink: Send + Sync {
    fn submit(&self, record: FocusSessionRecord);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut guard = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Settings that never change; handy for headless runs and tests.
impl SettingsProvider for TimerSettings {
    fn timer_settings(&self) -> TimerSettings {
        self.clone()
    }
}

/// Sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<FocusSessionRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FocusSessionRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SessionSink for CollectingSink {
    fn submit(&self, record: FocusSessionRecord) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
