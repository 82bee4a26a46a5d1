//! SOS session orchestration.
//!
//! Owns the activation lifecycle: `Idle → Activating → Active → Deactivating
//! → Idle`. The phase cell is flipped under its lock before the first await
//! of an activation, so concurrent triggers (button press racing a voice
//! match) collapse into exactly one session. Every step of an activation is
//! best-effort: a dead microphone or an empty contact cache degrades the
//! alert, it never blocks it.

use crate::audio::AudioCapture;
use crate::config::DispatchConfig;
use crate::contacts::ContactDirectory;
use crate::dispatch::NotificationDispatcher;
use crate::error::SosResult;
use crate::history::{HistoryLedger, HistoryRecord};
use crate::notice::NoticeHub;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// What initiated an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Manual SOS button press.
    #[default]
    Button,
    /// Matched voice codeword.
    Codeword,
    /// Crash / impact detection.
    Crash,
    /// Expired check-in timer.
    Timer,
}

impl TriggerType {
    /// Stable textual form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Button => "button",
            TriggerType::Codeword => "codeword",
            TriggerType::Crash => "crash",
            TriggerType::Timer => "timer",
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "button" => Ok(TriggerType::Button),
            "codeword" => Ok(TriggerType::Codeword),
            "crash" => Ok(TriggerType::Crash),
            "timer" => Ok(TriggerType::Timer),
            other => Err(format!("Unknown trigger type: {}", other)),
        }
    }
}

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    Activating,
    Active,
    Deactivating,
}

/// Parameters for one activation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    /// Alert text; the configured default when absent.
    #[serde(default)]
    pub message: Option<String>,
    /// Explicit recipient selection; all contacts when absent.
    #[serde(default)]
    pub contact_ids: Option<Vec<String>>,
    /// What initiated this activation.
    #[serde(default)]
    pub trigger: TriggerType,
    /// The matched codeword, for codeword triggers.
    #[serde(default)]
    pub codeword: Option<String>,
}

/// A live or completed SOS session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trigger: TriggerType,
    pub codeword_used: Option<String>,
    /// Live audio stream URL, when capture started for this session.
    pub stream_url: Option<String>,
    /// Durable recording URL, known only after deactivation.
    pub recording_url: Option<String>,
}

impl Session {
    /// Session duration, for completed sessions.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|ended| ended - self.started_at)
    }
}

/// Outcome of an activation attempt.
#[derive(Debug, Clone)]
pub enum ActivationOutcome {
    /// A new session was started.
    Started(Session),
    /// A session was already live (or starting); the request was absorbed.
    AlreadyActive,
}

/// Entry point the voice engine (and any other automatic trigger) uses to
/// fire an SOS without holding the whole orchestrator type.
#[async_trait]
pub trait SosActivator: Send + Sync {
    async fn activate(&self, request: ActivateRequest) -> SosResult<ActivationOutcome>;
    fn is_active(&self) -> bool;
}

/// Coordinates one user's SOS sessions.
pub struct SosOrchestrator {
    user_id: String,
    audio: Arc<AudioCapture>,
    dispatcher: Arc<NotificationDispatcher>,
    contacts: Arc<ContactDirectory>,
    ledger: Arc<HistoryLedger>,
    config: DispatchConfig,
    notices: NoticeHub,
    phase: Mutex<Phase>,
    current: Mutex<Option<Session>>,
}

impl SosOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: &str,
        audio: Arc<AudioCapture>,
        dispatcher: Arc<NotificationDispatcher>,
        contacts: Arc<ContactDirectory>,
        ledger: Arc<HistoryLedger>,
        config: DispatchConfig,
        notices: NoticeHub,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            audio,
            dispatcher,
            contacts,
            ledger,
            config,
            notices,
            phase: Mutex::new(Phase::Idle),
            current: Mutex::new(None),
        }
    }

    /// The live session, if one exists.
    pub fn current_session(&self) -> Option<Session> {
        self.current.lock().clone()
    }

    /// Activate an SOS session.
    ///
    /// Returns `AlreadyActive` without side effects when a session is live
    /// or mid-transition. The activation itself never fails: capture,
    /// location, refresh and delivery all degrade individually.
    pub async fn activate(&self, request: ActivateRequest) -> SosResult<ActivationOutcome> {
        {
            // Claim the activation before the first await so a concurrent
            // trigger cannot start a second session.
            let mut phase = self.phase.lock();
            if *phase != Phase::Idle {
                tracing::info!("Activation ignored, session already {:?}", *phase);
                return Ok(ActivationOutcome::AlreadyActive);
            }
            *phase = Phase::Activating;
        }

        let session_id = Uuid::new_v4().to_string();
        tracing::info!(
            "SOS activating: session {} trigger {:?}",
            session_id,
            request.trigger
        );

        // Recording is best-effort; a denied microphone degrades the alert
        // to text and location only.
        let capture_started = match self.audio.start().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Audio capture unavailable for this session: {}", e);
                self.notices
                    .publish(e.kind(), format!("Recording unavailable: {}", e));
                false
            }
        };

        let stream_url = capture_started
            .then(|| format!("{}/{}", self.config.stream_base_url, session_id));

        // Best-effort cache refresh; on failure dispatch works from the
        // previous cache.
        if let Err(e) = self.contacts.refresh(&self.user_id).await {
            tracing::warn!("Contact refresh failed, dispatching from cache: {}", e);
        }

        let message = request
            .message
            .unwrap_or_else(|| self.config.default_message.clone());

        let outcome = self
            .dispatcher
            .dispatch(&message, request.contact_ids.as_deref(), stream_url.as_deref())
            .await;

        let record = HistoryRecord::new(
            &self.user_id,
            outcome.location,
            &message,
            outcome.contacts.iter().map(|c| c.id.clone()).collect(),
            request.trigger,
            request.codeword.clone(),
            stream_url.clone(),
        );
        self.ledger.append(&record).await;

        let session = Session {
            session_id,
            user_id: self.user_id.clone(),
            started_at: Utc::now(),
            ended_at: None,
            trigger: request.trigger,
            codeword_used: request.codeword,
            stream_url,
            recording_url: None,
        };

        *self.current.lock() = Some(session.clone());
        *self.phase.lock() = Phase::Active;
        tracing::info!(
            "SOS active: session {} ({} contact(s) reached)",
            session.session_id,
            outcome.delivered
        );

        Ok(ActivationOutcome::Started(session))
    }

    /// Deactivate the live session.
    ///
    /// Returns `Ok(None)` when there is nothing to deactivate, including
    /// while an activation is still in flight.
    pub async fn deactivate(&self) -> SosResult<Option<Session>> {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Active {
                tracing::debug!("Deactivation ignored in phase {:?}", *phase);
                return Ok(None);
            }
            *phase = Phase::Deactivating;
        }

        let recording_url = self.audio.stop().await;

        let session = {
            let mut current = self.current.lock();
            current.take().map(|mut s| {
                s.ended_at = Some(Utc::now());
                s.recording_url = recording_url;
                s
            })
        };

        *self.phase.lock() = Phase::Idle;

        if let Some(session) = &session {
            let duration = session
                .duration()
                .map(|d| d.num_seconds())
                .unwrap_or_default();
            tracing::info!(
                "SOS deactivated: session {} after {}s",
                session.session_id,
                duration
            );
        }

        Ok(session)
    }
}

#[async_trait]
impl SosActivator for SosOrchestrator {
    async fn activate(&self, request: ActivateRequest) -> SosResult<ActivationOutcome> {
        SosOrchestrator::activate(self, request).await
    }

    /// Transient phases count as active so racing triggers are absorbed.
    fn is_active(&self) -> bool {
        *self.phase.lock() != Phase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::{AudioChunk, CaptureError, CaptureHandle, DeviceGuard, MediaSource};
    use crate::config::{AudioConfig, LocationConfig};
    use crate::contacts::Contact;
    use crate::database::RecordStore;
    use crate::dispatch::DeliveryGateway;
    use crate::error::SosError;
    use crate::location::{LocationTracker, Position, PositionError, PositionOptions, PositionSource};
    use crate::storage::{AudioArtifact, ObjectStore};
    use crate::voice::codewords::CodeWord;
    use parking_lot::Mutex as PlMutex;
    use tokio::sync::{mpsc, oneshot};

    struct FakeMedia {
        deny: bool,
    }

    #[async_trait]
    impl MediaSource for FakeMedia {
        async fn open(&self) -> Result<CaptureHandle, CaptureError> {
            if self.deny {
                return Err(CaptureError::PermissionDenied("mic denied".into()));
            }
            let (chunk_tx, chunk_rx) = mpsc::channel(4);
            let (release_tx, _release_rx) = oneshot::channel();
            tokio::spawn(async move {
                let _ = chunk_tx.send(AudioChunk { data: vec![1] }).await;
            });
            Ok(CaptureHandle {
                chunks: chunk_rx,
                guard: DeviceGuard::new(release_tx),
            })
        }
    }

    struct FakeStorage;

    #[async_trait]
    impl ObjectStore for FakeStorage {
        async fn upload(&self, artifact: &AudioArtifact) -> SosResult<String> {
            Ok(format!("https://store.example/{}", artifact.file_name))
        }
    }

    struct FakeSource;

    #[async_trait]
    impl PositionSource for FakeSource {
        fn watch(
            &self,
            _options: PositionOptions,
        ) -> Result<mpsc::Receiver<Result<Position, PositionError>>, PositionError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn fetch(&self, _options: PositionOptions) -> Result<Position, PositionError> {
            Ok(Position { lat: 51.5, lng: -0.12 })
        }
    }

    struct FakeGateway {
        sent: PlMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DeliveryGateway for FakeGateway {
        async fn send(&self, contact: &Contact, message: &str) -> SosResult<()> {
            self.sent
                .lock()
                .push((contact.id.clone(), message.to_string()));
            Ok(())
        }
    }

    struct FakeStore {
        contacts: Vec<Contact>,
        history: PlMutex<Vec<HistoryRecord>>,
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn contacts_for(&self, _user_id: &str) -> SosResult<Vec<Contact>> {
            Ok(self.contacts.clone())
        }

        async fn codewords_for(&self, _user_id: &str) -> SosResult<Vec<CodeWord>> {
            Ok(Vec::new())
        }

        async fn insert_history(&self, record: &HistoryRecord) -> SosResult<()> {
            self.history.lock().push(record.clone());
            Ok(())
        }

        async fn history_for(&self, _user_id: &str) -> SosResult<Vec<HistoryRecord>> {
            Ok(self.history.lock().clone())
        }
    }

    struct Rig {
        orchestrator: Arc<SosOrchestrator>,
        gateway: Arc<FakeGateway>,
        store: Arc<FakeStore>,
    }

    fn rig(deny_mic: bool, contacts: Vec<Contact>) -> Rig {
        let notices = NoticeHub::new();
        let store = Arc::new(FakeStore {
            contacts,
            history: PlMutex::new(Vec::new()),
        });
        let gateway = Arc::new(FakeGateway {
            sent: PlMutex::new(Vec::new()),
        });

        let audio = Arc::new(AudioCapture::new(
            Arc::new(FakeMedia { deny: deny_mic }),
            Arc::new(FakeStorage),
            AudioConfig::default(),
        ));
        let directory = Arc::new(ContactDirectory::new(store.clone() as Arc<dyn RecordStore>));
        let tracker = Arc::new(LocationTracker::new(
            Arc::new(FakeSource),
            LocationConfig::default(),
            notices.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            gateway.clone(),
            directory.clone(),
            tracker,
            DispatchConfig::default(),
            notices.clone(),
        ));
        let ledger = Arc::new(HistoryLedger::new(store.clone() as Arc<dyn RecordStore>));

        let orchestrator = Arc::new(SosOrchestrator::new(
            "u1",
            audio,
            dispatcher,
            directory,
            ledger,
            DispatchConfig::default(),
            notices,
        ));

        Rig {
            orchestrator,
            gateway,
            store,
        }
    }

    fn contact(id: &str, name: &str) -> Contact {
        let mut contact = Contact::new("u1", name, "+447700900000");
        contact.id = id.to_string();
        contact
    }

    #[tokio::test]
    async fn test_full_activation_cycle() {
        let rig = rig(false, vec![contact("a", "Ada"), contact("b", "Brian")]);

        let outcome = rig
            .orchestrator
            .activate(ActivateRequest::default())
            .await
            .unwrap();

        let session = match outcome {
            ActivationOutcome::Started(s) => s,
            ActivationOutcome::AlreadyActive => panic!("expected a new session"),
        };
        assert!(SosActivator::is_active(rig.orchestrator.as_ref()));
        assert!(session.stream_url.as_deref().unwrap().contains(&session.session_id));

        // Both contacts got the composed message
        let sent = rig.gateway.sent.lock().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1.contains("Live audio:"));

        // One history record with the session's stream URL
        let history = rig.store.history.lock().clone();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].audio_url, session.stream_url);
        assert_eq!(history[0].trigger, TriggerType::Button);

        let ended = rig.orchestrator.deactivate().await.unwrap().unwrap();
        assert!(ended.ended_at.is_some());
        assert!(ended.recording_url.is_some());
        assert!(!SosActivator::is_active(rig.orchestrator.as_ref()));
    }

    #[tokio::test]
    async fn test_second_activation_is_absorbed() {
        let rig = rig(false, vec![contact("a", "Ada")]);

        rig.orchestrator
            .activate(ActivateRequest::default())
            .await
            .unwrap();
        let second = rig
            .orchestrator
            .activate(ActivateRequest::default())
            .await
            .unwrap();

        assert!(matches!(second, ActivationOutcome::AlreadyActive));
        // Only one dispatch happened
        assert_eq!(rig.gateway.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_activations_start_one_session() {
        let rig = rig(false, vec![contact("a", "Ada")]);

        let a = {
            let orchestrator = rig.orchestrator.clone();
            tokio::spawn(async move { orchestrator.activate(ActivateRequest::default()).await })
        };
        let b = {
            let orchestrator = rig.orchestrator.clone();
            tokio::spawn(async move { orchestrator.activate(ActivateRequest::default()).await })
        };

        let results = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let started = results
            .iter()
            .filter(|r| matches!(r, ActivationOutcome::Started(_)))
            .count();
        assert_eq!(started, 1);
        assert_eq!(rig.store.history.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_mic_denial_degrades_to_text_alert() {
        let rig = rig(true, vec![contact("a", "Ada")]);

        let outcome = rig
            .orchestrator
            .activate(ActivateRequest::default())
            .await
            .unwrap();

        let session = match outcome {
            ActivationOutcome::Started(s) => s,
            ActivationOutcome::AlreadyActive => panic!("expected a new session"),
        };
        assert!(session.stream_url.is_none());

        // Alert still delivered, without an audio link
        let sent = rig.gateway.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].1.contains("Live audio:"));

        // History records no audio reference
        assert_eq!(rig.store.history.lock()[0].audio_url, None);
    }

    #[tokio::test]
    async fn test_deactivate_when_idle_is_noop() {
        let rig = rig(false, vec![contact("a", "Ada")]);
        assert!(rig.orchestrator.deactivate().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_codeword_trigger_recorded_in_history() {
        let rig = rig(false, vec![contact("a", "Ada")]);

        let request = ActivateRequest {
            message: Some("Danger at home".to_string()),
            contact_ids: None,
            trigger: TriggerType::Codeword,
            codeword: Some("red alert".to_string()),
        };
        rig.orchestrator.activate(request).await.unwrap();

        let history = rig.store.history.lock().clone();
        assert_eq!(history[0].trigger, TriggerType::Codeword);
        assert_eq!(history[0].codeword_used.as_deref(), Some("red alert"));
        assert_eq!(history[0].message, "Danger at home");
    }
}
