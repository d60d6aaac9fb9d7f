//! Start / stop control of the voice session.
//!
//! [`VoiceController`] owns at most one running [`VoiceSession`] task.  It
//! acquires the microphone and the output sink up front so device failures
//! are reported synchronously by [`start`](VoiceController::start), then
//! hands both to the session task.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};

use crate::audio::{
    AudioInput, AudioOutput, CaptureError, MicrophoneInput, PlaybackError, PlaybackScheduler,
    SpeakerOutput,
};
use crate::config::AppConfig;
use crate::pipeline::{lock_state, EditOrchestrator, VoiceState};

use super::protocol::SessionSetup;
use super::session::{SessionError, VoiceSession};
use super::transport::{GeminiLiveConnector, RealtimeConnector};

/// Channel count of the service's audio.
const OUTPUT_CHANNELS: u16 = 1;

// ---------------------------------------------------------------------------
// VoiceDeps
// ---------------------------------------------------------------------------

/// External resources a voice session needs.
#[derive(Clone)]
pub struct VoiceDeps {
    pub connector: Arc<dyn RealtimeConnector>,
    pub input: Arc<dyn AudioInput>,
    pub output: Arc<dyn AudioOutput>,
}

impl VoiceDeps {
    /// Gemini Live over WebSocket, the default microphone and speakers.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            connector: Arc::new(GeminiLiveConnector::from_config(&config.api, &config.voice)),
            input: Arc::new(MicrophoneInput::from_config(&config.audio)),
            output: Arc::new(SpeakerOutput::from_config(&config.audio)),
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceController
// ---------------------------------------------------------------------------

struct RunningSession {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Turns voice mode on and off.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use nano_edit::config::AppConfig;
/// use nano_edit::editor::GeminiImageEditor;
/// use nano_edit::pipeline::{new_shared_state, EditOrchestrator};
/// use nano_edit::voice::{VoiceController, VoiceDeps};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let editor = Arc::new(GeminiImageEditor::from_config(&config.api, &config.edit));
/// let orchestrator = EditOrchestrator::new(new_shared_state(), editor);
///
/// let mut voice = VoiceController::new(&config, VoiceDeps::from_config(&config), orchestrator);
/// voice.start().await.unwrap();
/// // ... talk ...
/// voice.stop().await;
/// # }
/// ```
pub struct VoiceController {
    deps: VoiceDeps,
    orchestrator: EditOrchestrator,
    setup: SessionSetup,
    frame_queue: usize,
    output_rate: u32,
    running: Option<RunningSession>,
}

impl VoiceController {
    pub fn new(config: &AppConfig, deps: VoiceDeps, orchestrator: EditOrchestrator) -> Self {
        Self {
            deps,
            orchestrator,
            setup: SessionSetup::from_config(&config.voice),
            frame_queue: config.voice.frame_queue.max(1),
            output_rate: config.audio.output_sample_rate,
            running: None,
        }
    }

    /// Acquire the audio devices and spawn a session task.
    ///
    /// Waits for a session that is still tearing down.  Fails with
    /// [`SessionError::AlreadyActive`] while one is connecting or active.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if let Some(running) = &self.running {
            let voice = lock_state(self.orchestrator.state()).voice;
            if matches!(voice, VoiceState::Connecting | VoiceState::Active)
                && !running.task.is_finished()
            {
                return Err(SessionError::AlreadyActive);
            }
        }
        if let Some(previous) = self.running.take() {
            if let Err(e) = previous.task.await {
                log::error!("voice: previous session task failed: {e}");
            }
        }

        // Opening a device waits on its audio thread.
        let (frames_tx, frames_rx) = mpsc::channel(self.frame_queue);
        let input = Arc::clone(&self.deps.input);
        let opened = tokio::task::spawn_blocking(move || input.open(frames_tx))
            .await
            .unwrap_or_else(|e| Err(CaptureError::Thread(e.to_string())));
        let capture = match opened {
            Ok(capture) => capture,
            Err(e) => return Err(self.fail(e.into())),
        };

        let output = Arc::clone(&self.deps.output);
        let opened = tokio::task::spawn_blocking(move || output.open())
            .await
            .unwrap_or_else(|e| Err(PlaybackError::Device(e.to_string())));
        let sink = match opened {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(join) = tokio::task::spawn_blocking(move || capture.release()).await {
                    log::error!("voice: releasing microphone failed: {join}");
                }
                return Err(self.fail(e.into()));
            }
        };
        let scheduler = PlaybackScheduler::new(sink, self.output_rate, OUTPUT_CHANNELS);

        {
            let mut st = lock_state(self.orchestrator.state());
            st.voice = VoiceState::Connecting;
            st.error = None;
            st.transcript.clear();
        }
        log::info!("voice: connecting");

        let session = VoiceSession::new(
            Arc::clone(&self.deps.connector),
            self.setup.clone(),
            capture,
            frames_rx,
            scheduler,
            self.orchestrator.clone(),
        );
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(session.run(stop_rx));
        self.running = Some(RunningSession {
            stop: Some(stop_tx),
            task,
        });
        Ok(())
    }

    /// Signal the session to end and wait for its teardown.  No-op when idle.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        {
            let mut st = lock_state(self.orchestrator.state());
            if matches!(st.voice, VoiceState::Connecting | VoiceState::Active) {
                st.voice = VoiceState::Closing;
            }
        }
        if let Some(stop) = running.stop.take() {
            let _ = stop.send(());
        }
        let result = running.task.await;
        self.joined(result);
    }

    /// Start when stopped, stop when running.
    pub async fn toggle(&mut self) -> Result<(), SessionError> {
        if self.is_running() {
            self.stop().await;
            Ok(())
        } else {
            self.start().await
        }
    }

    /// `true` while a session task is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Wait for the session to end on its own (remote close or error).
    ///
    /// Cancel-safe: dropping the future leaves the session running and
    /// still stoppable.
    pub async fn wait_closed(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        let result = (&mut running.task).await;
        self.running = None;
        self.joined(result);
    }

    fn joined(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            log::error!("voice: session task failed: {e}");
            let mut st = lock_state(self.orchestrator.state());
            st.voice = VoiceState::Idle;
            st.transcript.clear();
        }
    }

    fn fail(&self, err: SessionError) -> SessionError {
        log::error!("voice: cannot start: {err}");
        let mut st = lock_state(self.orchestrator.state());
        st.voice = VoiceState::Idle;
        st.error = Some(err.user_message().to_string());
        err
    }
}

impl Drop for VoiceController {
    fn drop(&mut self) {
        // The task tears itself down once signalled.
        if let Some(stop) = self.running.as_mut().and_then(|r| r.stop.take()) {
            let _ = stop.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
