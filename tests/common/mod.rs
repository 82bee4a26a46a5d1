//! Shared mock external interfaces for integration tests.

#![allow(dead_code)]

use aegis::audio::{AudioChunk, CaptureError, CaptureHandle, DeviceGuard, MediaSource};
use aegis::contacts::Contact;
use aegis::dispatch::DeliveryGateway;
use aegis::error::{SosError, SosResult};
use aegis::location::{Position, PositionError, PositionOptions, PositionSource};
use aegis::storage::{AudioArtifact, ObjectStore};
use aegis::voice::{SpeechError, SpeechEvent, SpeechSession, SpeechSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Position source answering every fetch with one fixed position.
pub struct FixedPositions {
    pub position: Option<Position>,
}

#[async_trait]
impl PositionSource for FixedPositions {
    fn watch(
        &self,
        _options: PositionOptions,
    ) -> Result<mpsc::Receiver<Result<Position, PositionError>>, PositionError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn fetch(&self, _options: PositionOptions) -> Result<Position, PositionError> {
        self.position
            .ok_or(PositionError::Unavailable("no fix".to_string()))
    }
}

/// Media source producing a small fixed chunk stream, optionally denying
/// the device.
pub struct FakeMedia {
    pub deny: bool,
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn open(&self) -> Result<CaptureHandle, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied("mic denied".to_string()));
        }
        let (chunk_tx, chunk_rx) = mpsc::channel(4);
        let (release_tx, _release_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = chunk_tx.send(AudioChunk { data: vec![0; 64] }).await;
        });
        Ok(CaptureHandle {
            chunks: chunk_rx,
            guard: DeviceGuard::new(release_tx),
        })
    }
}

/// Object store that remembers uploads and mints fake URLs.
#[derive(Default)]
pub struct FakeObjects {
    pub uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for FakeObjects {
    async fn upload(&self, artifact: &AudioArtifact) -> SosResult<String> {
        self.uploads.lock().push(artifact.file_name.clone());
        Ok(format!("https://store.example/{}", artifact.file_name))
    }
}

/// Delivery gateway that records every send.
#[derive(Default)]
pub struct FakeDelivery {
    pub sent: Mutex<Vec<(String, String)>>,
    pub reject: Vec<String>,
}

#[async_trait]
impl DeliveryGateway for FakeDelivery {
    async fn send(&self, contact: &Contact, message: &str) -> SosResult<()> {
        if self.reject.contains(&contact.id) {
            return Err(SosError::Transport("carrier rejected".to_string()));
        }
        self.sent
            .lock()
            .push((contact.id.clone(), message.to_string()));
        Ok(())
    }
}

/// Speech source replaying one scripted event list per session.
pub struct ScriptedSpeech {
    scripts: Mutex<Vec<Vec<SpeechEvent>>>,
    pub sessions_opened: Mutex<usize>,
}

impl ScriptedSpeech {
    pub fn new(scripts: Vec<Vec<SpeechEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            sessions_opened: Mutex::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        *self.sessions_opened.lock()
    }
}

#[async_trait]
impl SpeechSource for ScriptedSpeech {
    async fn start_session(&self) -> Result<SpeechSession, SpeechError> {
        *self.sessions_opened.lock() += 1;
        let script = {
            let mut scripts = self.scripts.lock();
            if scripts.is_empty() {
                Vec::new()
            } else {
                scripts.remove(0)
            }
        };

        let (event_tx, event_rx) = mpsc::channel(8);
        let (stop_tx, _stop_rx) = oneshot::channel();
        tokio::spawn(async move {
            for event in script {
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            std::future::pending::<()>().await;
        });

        Ok(SpeechSession::new(event_rx, stop_tx))
    }
}

/// Transcript helper for speech scripts.
pub fn transcript(text: &str) -> SpeechEvent {
    SpeechEvent::Transcript(text.to_string())
}

/// Standard externals bundle wired from the fakes above.
pub fn external_deps(
    records: Arc<dyn aegis::database::RecordStore>,
    delivery: Arc<FakeDelivery>,
    speech: Arc<ScriptedSpeech>,
    deny_mic: bool,
) -> aegis::ExternalDeps {
    aegis::ExternalDeps {
        positions: Arc::new(FixedPositions {
            position: Some(Position { lat: 51.5, lng: -0.12 }),
        }),
        media: Arc::new(FakeMedia { deny: deny_mic }),
        speech,
        delivery,
        objects: Arc::new(FakeObjects::default()),
        records,
    }
}
