//! Aegis - personal safety SOS coordinator.
//!
//! Coordinates SOS sessions for a single user: location tracking, audio
//! capture, contact notification, durable history, and a continuous voice
//! trigger. External device and transport primitives (positioning, media
//! capture, speech recognition, message delivery, object storage, record
//! store) are injected as trait objects; nothing in the crate touches a
//! process-wide singleton.

pub mod audio;
pub mod config;
pub mod contacts;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod location;
pub mod notice;
pub mod orchestrator;
pub mod schedule;
pub mod storage;
pub mod voice;

use crate::audio::{AudioCapture, MediaSource};
use crate::config::Config;
use crate::contacts::ContactDirectory;
use crate::database::RecordStore;
use crate::dispatch::{DeliveryGateway, NotificationDispatcher};
use crate::error::SosResult;
use crate::history::HistoryLedger;
use crate::location::{LocationTracker, PositionSource};
use crate::notice::NoticeHub;
use crate::orchestrator::{SosActivator, SosOrchestrator};
use crate::storage::ObjectStore;
use crate::voice::{SpeechSource, VoiceTriggerEngine};
use std::sync::Arc;

/// Initialise tracing with an env-filter, defaulting to `info`.
///
/// Call once on startup; safe to skip in tests.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The external primitives a context is built from.
///
/// Production wires real device and transport implementations; tests wire
/// fakes.
pub struct ExternalDeps {
    pub positions: Arc<dyn PositionSource>,
    pub media: Arc<dyn MediaSource>,
    pub speech: Arc<dyn SpeechSource>,
    pub delivery: Arc<dyn DeliveryGateway>,
    pub objects: Arc<dyn ObjectStore>,
    pub records: Arc<dyn RecordStore>,
}

/// Fully wired per-user SOS context.
pub struct SosContext {
    pub notices: NoticeHub,
    pub location: Arc<LocationTracker>,
    pub contacts: Arc<ContactDirectory>,
    pub audio: Arc<AudioCapture>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub ledger: Arc<HistoryLedger>,
    pub orchestrator: Arc<SosOrchestrator>,
    pub voice: VoiceTriggerEngine,
    config: Config,
}

impl SosContext {
    /// Wire all components for one user from the injected externals.
    pub fn new(user_id: &str, config: Config, deps: ExternalDeps) -> Self {
        let notices = NoticeHub::new();

        let location = Arc::new(LocationTracker::new(
            deps.positions,
            config.location.clone(),
            notices.clone(),
        ));
        let contacts = Arc::new(ContactDirectory::new(Arc::clone(&deps.records)));
        let audio = Arc::new(AudioCapture::new(
            deps.media,
            deps.objects,
            config.audio.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            deps.delivery,
            Arc::clone(&contacts),
            Arc::clone(&location),
            config.dispatch.clone(),
            notices.clone(),
        ));
        let ledger = Arc::new(HistoryLedger::new(Arc::clone(&deps.records)));
        let orchestrator = Arc::new(SosOrchestrator::new(
            user_id,
            Arc::clone(&audio),
            Arc::clone(&dispatcher),
            Arc::clone(&contacts),
            Arc::clone(&ledger),
            config.dispatch.clone(),
            notices.clone(),
        ));
        let voice = VoiceTriggerEngine::new(
            user_id,
            deps.speech,
            Arc::clone(&orchestrator) as Arc<dyn SosActivator>,
            deps.records,
            config.voice.clone(),
            notices.clone(),
        );

        Self {
            notices,
            location,
            contacts,
            audio,
            dispatcher,
            ledger,
            orchestrator,
            voice,
            config,
        }
    }

    /// Start the background services: location tracking always, the voice
    /// engine only when enabled in config. Failures degrade, they do not
    /// abort startup.
    pub async fn start_background(&self) -> SosResult<()> {
        if let Err(e) = self.location.start() {
            tracing::warn!("Location tracking unavailable: {}", e);
            self.notices
                .publish(e.kind(), format!("Location unavailable: {}", e));
        }

        if self.config.voice.enabled {
            self.voice.start().await?;
        } else {
            tracing::info!("Voice trigger disabled in config");
        }

        Ok(())
    }

    /// Tear everything down: stop listening, stop tracking, and force any
    /// open capture session closed.
    pub async fn shutdown(&self) {
        self.voice.stop();
        self.location.stop();
        if let Ok(Some(session)) = self.orchestrator.deactivate().await {
            tracing::info!("Shutdown closed live session {}", session.session_id);
        }
        tracing::info!("SOS context shut down");
    }
}
