use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::timer::{SettingsProvider, MAX_PHASE_SECS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    pub work_min: u32,
    pub short_break_min: u32,
    pub long_break_min: u32,
    pub cycles_to_long_break: u32,
    pub auto_start_next: bool,
    pub sound_on: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_min: 25,
            short_break_min: 5,
            long_break_min: 15,
            cycles_to_long_break: 4,
            auto_start_next: false,
            sound_on: true,
        }
    }
}

impl TimerSettings {
    pub fn work_secs(&self) -> u64 {
        u64::from(self.work_min) * 60
    }

    pub fn short_break_secs(&self) -> u64 {
        u64::from(self.short_break_min) * 60
    }

    pub fn long_break_secs(&self) -> u64 {
        u64::from(self.long_break_min) * 60
    }

    pub fn validate(&self) -> Result<()> {
        if self.work_min == 0 {
            bail!("work duration must be at least one minute");
        }
        if self.short_break_min == 0 || self.long_break_min == 0 {
            bail!("break durations must be at least one minute");
        }
        if self.cycles_to_long_break == 0 {
            bail!("cycles before a long break must be at least one");
        }
        let longest = self
            .work_min
            .max(self.short_break_min)
            .max(self.long_break_min);
        if u64::from(longest) * 60 > MAX_PHASE_SECS {
            bail!("phases cannot be longer than {} minutes", MAX_PHASE_SECS / 60);
        }
        Ok(())
    }

    /// These settings if they pass [`validate`](Self::validate), else the
    /// defaults.
    pub fn or_defaults(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(err) => {
                warn!("Using default timer settings: {err}");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    timer: TimerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Missing, unreadable or out-of-range settings fall back to defaults;
    /// the timer never refuses to start over a bad settings file.
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring unparseable settings at {}: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };
        data.timer = data.timer.or_defaults();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn timer(&self) -> TimerSettings {
        self.read().timer.clone()
    }

    pub fn update_timer(&self, settings: TimerSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        guard.timer = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SettingsProvider for SettingsStore {
    fn timer_settings(&self) -> TimerSettings {
        self.timer()
    }
}
