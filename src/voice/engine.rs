//! Continuous voice trigger engine.
//!
//! Keeps a recognition session open while enabled, scans finalised
//! transcripts for codewords, and fires the SOS activator on a match. A
//! matched activation is spawned detached so tearing the session down can
//! never cancel an alert in flight. After a match the engine cools down,
//! then listens again; a session that ends or fails recoverably is restarted
//! after a backoff, with at most one restart timer pending at a time.

use super::codewords::{default_codeword, load_codewords, match_codeword, CodeWord};
use super::speech::{SpeechEvent, SpeechSource};
use crate::config::VoiceConfig;
use crate::database::RecordStore;
use crate::error::SosResult;
use crate::notice::NoticeHub;
use crate::orchestrator::{ActivateRequest, SosActivator, TriggerType};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EnginePhase {
    #[default]
    Stopped,
    Listening,
    /// A codeword just fired; listening resumes after the cooldown.
    CoolingDown,
}

#[derive(Default)]
struct EngineState {
    phase: EnginePhase,
    codewords: Vec<CodeWord>,
    session_task: Option<JoinHandle<()>>,
    /// At most one restart pending; replaced, never accumulated.
    restart_timer: Option<JoinHandle<()>>,
}

struct EngineInner {
    user_id: String,
    speech: Arc<dyn SpeechSource>,
    activator: Arc<dyn SosActivator>,
    store: Arc<dyn RecordStore>,
    config: VoiceConfig,
    notices: NoticeHub,
    state: Mutex<EngineState>,
}

/// Listens for spoken codewords and fires SOS activations.
pub struct VoiceTriggerEngine {
    inner: Arc<EngineInner>,
}

impl VoiceTriggerEngine {
    pub fn new(
        user_id: &str,
        speech: Arc<dyn SpeechSource>,
        activator: Arc<dyn SosActivator>,
        store: Arc<dyn RecordStore>,
        config: VoiceConfig,
        notices: NoticeHub,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                user_id: user_id.to_string(),
                speech,
                activator,
                store,
                config,
                notices,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Whether the engine is listening (or cooling down between sessions).
    pub fn is_listening(&self) -> bool {
        self.inner.state.lock().phase != EnginePhase::Stopped
    }

    /// Load codewords and begin listening. A no-op when already running.
    ///
    /// A store failure does not prevent arming: the engine falls back to
    /// the built-in default codeword and raises a notice.
    pub async fn start(&self) -> SosResult<()> {
        let codewords = match load_codewords(&self.inner.store, &self.inner.user_id).await {
            Ok(codewords) => codewords,
            Err(e) => {
                tracing::warn!("Codeword load failed, arming with the built-in default: {}", e);
                self.inner.notices.publish(
                    e.kind(),
                    "Saved codewords could not be loaded; the default codeword is still active",
                );
                vec![default_codeword()]
            }
        };

        {
            let mut state = self.inner.state.lock();
            if state.phase != EnginePhase::Stopped {
                tracing::debug!("Voice engine already running");
                return Ok(());
            }
            state.phase = EnginePhase::Listening;
            state.codewords = codewords;
        }

        spawn_session(Arc::clone(&self.inner));
        tracing::info!("Voice trigger engine started");
        Ok(())
    }

    /// Stop listening: cancels the open session and any pending restart.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == EnginePhase::Stopped {
            return;
        }
        state.phase = EnginePhase::Stopped;
        if let Some(task) = state.session_task.take() {
            task.abort();
        }
        if let Some(timer) = state.restart_timer.take() {
            timer.abort();
        }
        tracing::info!("Voice trigger engine stopped");
    }

    /// Re-read the codeword set, picking up CRUD changes without a restart.
    pub async fn reload_codewords(&self) -> SosResult<()> {
        let codewords = load_codewords(&self.inner.store, &self.inner.user_id).await?;
        let count = codewords.len();
        self.inner.state.lock().codewords = codewords;
        tracing::info!("Voice codewords reloaded: {} active", count);
        Ok(())
    }
}

impl Drop for VoiceTriggerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a new recognition session task, replacing the stored handle.
///
/// The phase check and the handle store happen under one lock acquisition,
/// so a stale cooldown or restart timer that raced past `stop()` cannot
/// open a session on a stopped engine.
fn spawn_session(inner: Arc<EngineInner>) {
    let mut state = inner.state.lock();
    if state.phase == EnginePhase::Stopped {
        return;
    }
    let task = tokio::spawn(run_session(Arc::clone(&inner)));
    state.session_task = Some(task);
}

/// One recognition session from open to close.
///
/// Boxed because a session respawns its successor after a cooldown, which
/// would otherwise make the future type recursive.
fn run_session(inner: Arc<EngineInner>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let mut session = match inner.speech.start_session().await {
            Ok(session) => session,
            Err(e) => {
                handle_session_error(&inner, e);
                return;
            }
        };
        tracing::debug!("Recognition session open");

        while let Some(event) = session.events.recv().await {
            match event {
                SpeechEvent::Transcript(text) => {
                    tracing::debug!("Transcript: {:?}", text);
                    let matched = {
                        let state = inner.state.lock();
                        match_codeword(&state.codewords, &text).cloned()
                    };
                    if let Some(codeword) = matched {
                        session.stop();
                        fire(&inner, codeword);
                        cooldown_then_respawn(inner).await;
                        return;
                    }
                }
                SpeechEvent::Ended => {
                    tracing::debug!("Recognition session ended by source");
                    schedule_restart(&inner);
                    return;
                }
                SpeechEvent::Error(e) => {
                    handle_session_error(&inner, e);
                    return;
                }
            }
        }

        // Channel closed without a terminal event; treat as an ordinary end.
        schedule_restart(&inner);
    })
}

/// Fire the activator for a matched codeword, detached from the session
/// task so engine teardown cannot cancel the alert.
fn fire(inner: &Arc<EngineInner>, codeword: CodeWord) {
    tracing::info!("Codeword matched: {:?}", codeword.word);

    // An empty selection on a codeword means "everyone".
    let contact_ids = if codeword.contact_ids.is_empty() {
        None
    } else {
        Some(codeword.contact_ids)
    };
    let request = ActivateRequest {
        message: Some(codeword.message),
        contact_ids,
        trigger: TriggerType::Codeword,
        codeword: Some(codeword.word),
    };

    let activator = Arc::clone(&inner.activator);
    tokio::spawn(async move {
        if let Err(e) = activator.activate(request).await {
            tracing::error!("Voice-triggered activation failed: {}", e);
        }
    });
}

/// Wait out the post-match cooldown, then open the next session.
async fn cooldown_then_respawn(inner: Arc<EngineInner>) {
    {
        let mut state = inner.state.lock();
        if state.phase == EnginePhase::Stopped {
            return;
        }
        state.phase = EnginePhase::CoolingDown;
    }

    tokio::time::sleep(Duration::from_millis(inner.config.cooldown_ms)).await;

    {
        let mut state = inner.state.lock();
        if state.phase == EnginePhase::Stopped {
            return;
        }
        state.phase = EnginePhase::Listening;
    }
    spawn_session(inner);
}

/// Schedule a session restart after the backoff, replacing any pending one.
fn schedule_restart(inner: &Arc<EngineInner>) {
    let mut state = inner.state.lock();
    if state.phase == EnginePhase::Stopped {
        return;
    }
    if let Some(previous) = state.restart_timer.take() {
        previous.abort();
    }

    let backoff = Duration::from_millis(inner.config.restart_backoff_ms);
    let inner_for_timer = Arc::clone(inner);
    state.restart_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(backoff).await;
        spawn_session(inner_for_timer);
    }));
}

/// Classify a session failure: permanent errors stop the engine with a
/// notice, anything else restarts after the backoff.
fn handle_session_error(inner: &Arc<EngineInner>, e: super::speech::SpeechError) {
    if e.is_permanent() {
        tracing::error!("Voice engine stopping on permanent error: {}", e);
        inner
            .notices
            .publish(e.kind(), format!("Voice trigger disabled: {}", e));
        let mut state = inner.state.lock();
        state.phase = EnginePhase::Stopped;
        if let Some(timer) = state.restart_timer.take() {
            timer.abort();
        }
    } else {
        tracing::warn!("Recognition session failed, will restart: {}", e);
        schedule_restart(inner);
    }
}
