use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const DATA_DIR_ENV: &str = "FOCUS_TIMER_DATA_DIR";
const DEBUG_ENV: &str = "FOCUS_TIMER_DEBUG";
const APP_DIR_NAME: &str = "focus-timer";

/// Where the app keeps its files on this device.
#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// `FOCUS_TIMER_DATA_DIR` if set, else the platform data directory.
    pub fn from_env() -> Result<Self> {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return Ok(Self::new(PathBuf::from(dir)));
        }

        let base = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .context("could not determine a data directory; set FOCUS_TIMER_DATA_DIR")?;
        Ok(Self::new(base.join(APP_DIR_NAME)))
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("failed to create data directory {}", self.data_dir.display())
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.data_dir.join("timer_snapshot.json")
    }

    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("focus.sqlite3")
    }
}

pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
