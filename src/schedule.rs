//! Scheduled activation windows.
//!
//! Per-user ordered list of time windows during which the surrounding
//! scheduler may arm automatic triggers. Stored as JSON at
//! `~/.aegis/schedule-<user>.json`; this module only persists and evaluates
//! the windows, it does not fire anything itself.

use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::config::aegis_dir;

/// One recurring activation window.
///
/// `start`/`end` are times of day in `HH:MM`; `days` are weekdays with
/// 0 = Monday through 6 = Sunday. A window whose end precedes its start
/// spans midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationWindow {
    pub name: String,
    pub start: String,
    pub end: String,
    pub days: Vec<u8>,
    pub enabled: bool,
}

impl ActivationWindow {
    fn parse_time(value: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(value, "%H:%M").ok()
    }

    /// Whether the given instant falls inside this window.
    ///
    /// Disabled windows and malformed times never match.
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let (Some(start), Some(end)) = (
            Self::parse_time(&self.start),
            Self::parse_time(&self.end),
        ) else {
            tracing::warn!("Window {:?} has malformed times, skipping", self.name);
            return false;
        };

        let weekday = at.weekday().num_days_from_monday() as u8;
        let time = NaiveTime::from_hms_opt(at.hour(), at.minute(), 0).unwrap_or(start);

        if start <= end {
            self.days.contains(&weekday) && time >= start && time < end
        } else {
            // Overnight window: the early-morning half belongs to the
            // previous day's entry.
            let previous_day = (weekday + 6) % 7;
            (self.days.contains(&weekday) && time >= start)
                || (self.days.contains(&previous_day) && time < end)
        }
    }
}

/// JSON-backed store for one user's activation windows.
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    /// Store at the default per-user location.
    pub fn for_user(user_id: &str) -> Self {
        Self {
            path: aegis_dir().join(format!("schedule-{}.json", user_id)),
        }
    }

    /// Store at an explicit path (tests, custom layouts).
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the window list. A missing file is an empty schedule.
    pub fn load(&self) -> anyhow::Result<Vec<ActivationWindow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read schedule file {:?}", self.path))?;
        let windows: Vec<ActivationWindow> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse schedule file {:?}", self.path))?;
        Ok(windows)
    }

    /// Persist the window list, preserving order.
    pub fn save(&self, windows: &[ActivationWindow]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create schedule directory {:?}", parent))?;
        }
        let content =
            serde_json::to_string_pretty(windows).context("Failed to serialise schedule")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write schedule file {:?}", self.path))?;

        tracing::debug!("Schedule saved: {} window(s)", windows.len());
        Ok(())
    }

    /// Whether any enabled window covers the given instant.
    pub fn active_at(&self, at: &DateTime<Utc>) -> anyhow::Result<bool> {
        Ok(self.load()?.iter().any(|w| w.contains(at)))
    }
}
