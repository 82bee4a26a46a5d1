//! Location tracking.
//!
//! Maintains the freshest known position in a single owned cache cell. A
//! continuous subscription feeds the cache in the background; `get_current`
//! serves the cache when fresh enough, performs a bounded single-shot fetch
//! when it is not, and degrades to the stale cache (or nothing) rather than
//! failing an activation.

use crate::config::LocationConfig;
use crate::error::FailureKind;
use crate::notice::NoticeHub;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A raw position observation from the external source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

/// A timestamped location owned by the tracker cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    /// When the observation was made.
    pub observed_at: DateTime<Utc>,
}

impl Location {
    fn from_position(p: Position) -> Self {
        Self {
            lat: p.lat,
            lng: p.lng,
            observed_at: Utc::now(),
        }
    }

    /// Age of the observation relative to now.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.observed_at
    }
}

/// Options passed to the external position source.
#[derive(Debug, Clone, Copy)]
pub struct PositionOptions {
    /// Request high-accuracy positioning.
    pub high_accuracy: bool,
    /// Accept cached observations from the source up to this age.
    pub max_age_ms: u64,
    /// Source-side timeout for a single observation.
    pub timeout_ms: u64,
}

/// Errors from the external position source.
#[derive(Debug, Clone, Error)]
pub enum PositionError {
    #[error("Position permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Position request timed out")]
    Timeout,

    #[error("Positioning not supported in this environment")]
    Unsupported,
}

impl PositionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PositionError::PermissionDenied => FailureKind::PermissionDenied,
            PositionError::Unavailable(_) => FailureKind::DeviceUnavailable,
            PositionError::Timeout => FailureKind::Timeout,
            PositionError::Unsupported => FailureKind::Unsupported,
        }
    }
}

/// External position source: a continuous subscription plus a single-shot
/// fetch, both configurable with accuracy/staleness/timeout options.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Begin a continuous subscription. Observations (or errors) arrive on
    /// the returned channel until it is dropped.
    fn watch(
        &self,
        options: PositionOptions,
    ) -> Result<mpsc::Receiver<Result<Position, PositionError>>, PositionError>;

    /// Perform one position fetch.
    async fn fetch(&self, options: PositionOptions) -> Result<Position, PositionError>;
}

/// Maintains the freshest known position for a session.
///
/// The cache cell is written only by this tracker; every other component
/// reads through `get_current`/`cached`.
pub struct LocationTracker {
    source: Arc<dyn PositionSource>,
    config: LocationConfig,
    cache: Arc<RwLock<Option<Location>>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
    notices: NoticeHub,
}

impl LocationTracker {
    pub fn new(source: Arc<dyn PositionSource>, config: LocationConfig, notices: NoticeHub) -> Self {
        Self {
            source,
            config,
            cache: Arc::new(RwLock::new(None)),
            watch_task: Mutex::new(None),
            notices,
        }
    }

    /// Options for the continuous subscription: moderate staleness is
    /// accepted to trade freshness for reliability.
    fn watch_options(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: self.config.high_accuracy,
            max_age_ms: self.config.watch_max_age_ms,
            timeout_ms: self.config.fetch_timeout_ms,
        }
    }

    /// Options for a single-shot fetch: no source-side caching.
    fn fetch_options(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: self.config.high_accuracy,
            max_age_ms: 0,
            timeout_ms: self.config.fetch_timeout_ms,
        }
    }

    /// Begin the continuous subscription. A no-op if already started.
    pub fn start(&self) -> Result<(), PositionError> {
        let mut task = self.watch_task.lock();
        if task.is_some() {
            return Ok(());
        }

        let mut rx = self.source.watch(self.watch_options())?;
        let cache = Arc::clone(&self.cache);
        let notices = self.notices.clone();

        let handle = tokio::spawn(async move {
            while let Some(observation) = rx.recv().await {
                match observation {
                    Ok(position) => {
                        *cache.write() = Some(Location::from_position(position));
                    }
                    Err(e) => {
                        // The cached value is retained; the failure is only
                        // user-visible while no observation exists yet.
                        if cache.read().is_none() {
                            notices.publish(e.kind(), format!("Location unavailable: {}", e));
                        } else {
                            tracing::debug!("Position observation failed, keeping cache: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Position subscription ended");
        });

        *task = Some(handle);
        tracing::info!("Location tracking started");
        Ok(())
    }

    /// Cancel the continuous subscription.
    pub fn stop(&self) {
        if let Some(handle) = self.watch_task.lock().take() {
            handle.abort();
            tracing::info!("Location tracking stopped");
        }
    }

    /// Whether the subscription task is running.
    pub fn is_tracking(&self) -> bool {
        self.watch_task.lock().is_some()
    }

    /// The cached observation, regardless of age.
    pub fn cached(&self) -> Option<Location> {
        *self.cache.read()
    }

    /// Returns the most recent observation.
    ///
    /// The cache is served directly when younger than the freshness
    /// threshold. Otherwise a fresh single-shot fetch is attempted, bounded
    /// by the configured timeout; on failure the stale cache is returned if
    /// one exists, else `None`.
    pub async fn get_current(&self) -> Option<Location> {
        if let Some(cached) = self.cached() {
            if cached.age() < chrono::Duration::milliseconds(self.config.freshness_ms as i64) {
                return Some(cached);
            }
        }

        let deadline = Duration::from_millis(self.config.fetch_timeout_ms);
        match tokio::time::timeout(deadline, self.source.fetch(self.fetch_options())).await {
            Ok(Ok(position)) => {
                let location = Location::from_position(position);
                *self.cache.write() = Some(location);
                Some(location)
            }
            Ok(Err(e)) => {
                tracing::warn!("Position fetch failed: {}", e);
                if self.cached().is_none() {
                    self.notices
                        .publish(e.kind(), format!("Location unavailable: {}", e));
                }
                self.cached()
            }
            Err(_) => {
                tracing::warn!("Position fetch timed out after {:?}", deadline);
                if self.cached().is_none() {
                    self.notices
                        .publish(FailureKind::Timeout, "Location fetch timed out");
                }
                self.cached()
            }
        }
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.watch_task.lock().take() {
            handle.abort();
        }
    }
}
