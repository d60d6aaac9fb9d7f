//! The realtime voice session task.
//!
//! A [`VoiceSession`] owns everything one conversation needs: the capture
//! stream, the captured-frame receiver, the playback scheduler and its sink,
//! the transcript accumulator, the ordered queue of pending tool replies and
//! the edit queue that applies requested edits one after another.
//! It is created by [`VoiceController`](super::VoiceController) and consumed by
//! [`VoiceSession::run`], which drives a single `tokio::select!` loop:
//!
//! ```text
//! loop {
//!     stop signal          → leave the loop
//!     inbound message      → tool calls, transcription, turn complete, audio, interruption
//!     captured frame       → realtimeInput
//!     next ready tool reply → toolResponse (in call order)
//! }
//! ```
//!
//! Every exit path ends in the same teardown: close the connection, release
//! the microphone, hard-stop playback, drop pending replies, clear the
//! transcript and return the shared state to `Idle`.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesOrdered;
use futures_util::{FutureExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::audio::{CaptureError, CaptureStream, PlaybackError, PlaybackScheduler, WireFrame};
use crate::pipeline::{lock_state, EditOrchestrator, EditOutcome, SharedState, VoiceState};

use super::protocol::{
    ClientMessage, FunctionCall, InboundEvent, SessionSetup, APPLY_IMAGE_EDIT_TOOL,
};
use super::transport::{RealtimeConnection, RealtimeConnector};

/// An instruction waiting for the edit worker, and where to report the outcome.
type EditJob = (String, oneshot::Sender<EditOutcome>);

/// Tool result for any function the assistant is not allowed to call.
pub const UNSUPPORTED_TOOL_RESULT: &str = "Unsupported tool.";

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors that end (or prevent) a voice session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The microphone could not be acquired.
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),

    /// No output device could be opened for the assistant's speech.
    #[error("audio output unavailable: {0}")]
    AudioOutput(String),

    /// Connecting, sending, or receiving failed, or the server closed the
    /// stream abnormally.
    #[error("connection failed: {0}")]
    Connection(String),

    /// `start` was called while a session is connecting or active.
    #[error("a voice session is already running")]
    AlreadyActive,

    /// The server sent something that cannot be handled.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Message suitable for the error banner.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::PermissionDenied(_) => "Microphone access denied or connection failed.",
            SessionError::AudioOutput(_) => "Could not open the audio output device.",
            SessionError::Connection(_) => "The voice connection was lost.",
            SessionError::AlreadyActive => "Voice mode is already active.",
            SessionError::Protocol(_) => "The voice service sent an unexpected response.",
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        SessionError::PermissionDenied(e.to_string())
    }
}

impl From<PlaybackError> for SessionError {
    fn from(e: PlaybackError) -> Self {
        SessionError::AudioOutput(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// VoiceSession
// ---------------------------------------------------------------------------

/// One voice conversation, from handshake to teardown.
pub struct VoiceSession {
    connector: Arc<dyn RealtimeConnector>,
    setup: SessionSetup,
    capture: Box<dyn CaptureStream>,
    frames: mpsc::Receiver<WireFrame>,
    scheduler: PlaybackScheduler,
    orchestrator: EditOrchestrator,
    state: SharedState,
    transcript: String,
    /// Tool replies, resolved in the order the calls arrived.
    pending: FuturesOrdered<BoxFuture<'static, ClientMessage>>,
    /// Feeds the edit worker; spawned on the first tool call.
    edits: Option<mpsc::UnboundedSender<EditJob>>,
}

impl VoiceSession {
    pub fn new(
        connector: Arc<dyn RealtimeConnector>,
        setup: SessionSetup,
        capture: Box<dyn CaptureStream>,
        frames: mpsc::Receiver<WireFrame>,
        scheduler: PlaybackScheduler,
        orchestrator: EditOrchestrator,
    ) -> Self {
        let state = orchestrator.state().clone();
        Self {
            connector,
            setup,
            capture,
            frames,
            scheduler,
            orchestrator,
            state,
            transcript: String::new(),
            pending: FuturesOrdered::new(),
            edits: None,
        }
    }

    /// Run until `stop` fires (or its sender is dropped), the server closes
    /// the stream, or an error occurs.  Always tears down before returning.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        let result = self.drive(&mut stop).await;
        self.teardown(result).await;
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    async fn drive(&mut self, stop: &mut oneshot::Receiver<()>) -> Result<(), SessionError> {
        let mut conn = tokio::select! {
            _ = &mut *stop => {
                log::info!("voice: stopped while connecting");
                return Ok(());
            }
            result = self.connector.connect(&self.setup) => result?,
        };

        // Audio captured during the handshake is stale.
        let mut stale = 0usize;
        while self.frames.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            log::debug!("voice: discarded {stale} frames captured during handshake");
        }

        {
            let mut st = lock_state(&self.state);
            if st.voice == VoiceState::Connecting {
                st.voice = VoiceState::Active;
            }
        }
        log::info!("voice: session active");

        let result = self.pump(conn.as_mut(), stop).await;
        conn.close().await;
        result
    }

    async fn pump(
        &mut self,
        conn: &mut dyn RealtimeConnection,
        stop: &mut oneshot::Receiver<()>,
    ) -> Result<(), SessionError> {
        loop {
            tokio::select! {
                _ = &mut *stop => {
                    log::info!("voice: stop requested");
                    return Ok(());
                }
                inbound = conn.recv() => match inbound {
                    Some(Ok(message)) => {
                        for event in message.into_events() {
                            self.handle_event(event);
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        log::info!("voice: server closed the session");
                        return Ok(());
                    }
                },
                Some(frame) = self.frames.recv() => {
                    conn.send(&ClientMessage::audio(frame)).await?;
                }
                Some(reply) = self.pending.next(), if !self.pending.is_empty() => {
                    conn.send(&reply).await?;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::ToolCall(call) => self.dispatch_tool_call(call),
            InboundEvent::Transcription(text) => {
                self.transcript.push(' ');
                self.transcript.push_str(&text);
                self.publish_transcript();
            }
            InboundEvent::TurnComplete => {
                self.transcript.clear();
                self.publish_transcript();
            }
            InboundEvent::Audio(payload) => {
                if let Err(e) = self.scheduler.enqueue(&payload) {
                    log::warn!("voice: dropping audio segment: {e}");
                }
            }
            InboundEvent::Interrupted => {
                let stopped = self.scheduler.interrupt();
                log::debug!("voice: interrupted, stopped {stopped} segments");
            }
        }
    }

    /// Queue the reply for `call`.  Edits are handed to the edit worker in
    /// call order and applied one at a time off the session task, so a slow
    /// edit never stalls audio; the reply waits its turn in `pending`.
    fn dispatch_tool_call(&mut self, call: FunctionCall) {
        let instruction = call.instruction();
        let FunctionCall { id, name, .. } = call;

        if name != APPLY_IMAGE_EDIT_TOOL {
            log::warn!("voice: model called unknown tool {name:?}");
            let reply = ClientMessage::tool_result(id, name, UNSUPPORTED_TOOL_RESULT);
            self.pending.push_back(futures_util::future::ready(reply).boxed());
            return;
        }

        log::info!("voice: tool call {id} → {instruction:?}");

        let (outcome_tx, outcome_rx) = oneshot::channel();
        if self.edit_queue().send((instruction, outcome_tx)).is_err() {
            log::error!("voice: edit worker is gone");
        }

        self.pending.push_back(
            async move {
                let outcome = outcome_rx.await.unwrap_or_else(|_| {
                    log::error!("voice: edit finished without an outcome");
                    EditOutcome::Failed
                });
                ClientMessage::tool_result(id, name, outcome.message())
            }
            .boxed(),
        );
    }

    fn edit_queue(&mut self) -> &mpsc::UnboundedSender<EditJob> {
        let orchestrator = &self.orchestrator;
        self.edits
            .get_or_insert_with(|| spawn_edit_worker(orchestrator.clone()))
    }

    fn publish_transcript(&self) {
        lock_state(&self.state).transcript = self.transcript.clone();
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    async fn teardown(self, result: Result<(), SessionError>) {
        let VoiceSession {
            capture,
            mut scheduler,
            pending,
            edits,
            state,
            ..
        } = self;

        lock_state(&state).voice = VoiceState::Closing;

        let stopped = scheduler.interrupt();
        if !pending.is_empty() {
            log::debug!(
                "voice: dropping {} pending tool replies; their edits continue",
                pending.len()
            );
        }
        drop(pending);
        // Queued edits still run; the worker exits once the queue is drained.
        drop(edits);

        // Joining the device threads blocks.
        let released = tokio::task::spawn_blocking(move || {
            capture.release();
            drop(scheduler);
        })
        .await;
        if let Err(e) = released {
            log::error!("voice: releasing audio devices failed: {e}");
        }

        let mut st = lock_state(&state);
        st.voice = VoiceState::Idle;
        st.transcript.clear();
        match result {
            Ok(()) => log::info!("voice: session closed ({stopped} segments cut)"),
            Err(e) => {
                log::error!("voice: session ended with error: {e}");
                st.error = Some(e.user_message().to_string());
            }
        }
    }
}

/// Apply queued edits one after another, in the order they were queued.
fn spawn_edit_worker(orchestrator: EditOrchestrator) -> mpsc::UnboundedSender<EditJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<EditJob>();
    tokio::spawn(async move {
        while let Some((instruction, outcome_tx)) = rx.recv().await {
            let outcome = orchestrator.apply_edit(&instruction).await;
            // The session may be gone; the edit still counts.
            let _ = outcome_tx.send(outcome);
        }
        log::debug!("voice: edit worker finished");
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_details() {
        let err = SessionError::Connection("tls handshake eof at 10.0.0.1".into());
        assert!(!err.user_message().contains("10.0.0.1"));
        assert_eq!(
            SessionError::PermissionDenied("no device".into()).user_message(),
            "Microphone access denied or connection failed."
        );
    }

    #[test]
    fn capture_errors_map_to_permission_denied() {
        let err: SessionError = CaptureError::NoDevice.into();
        assert!(matches!(err, SessionError::PermissionDenied(_)));
    }

    #[test]
    fn playback_errors_map_to_audio_output() {
        let err: SessionError = PlaybackError::NoDevice.into();
        assert!(matches!(err, SessionError::AudioOutput(_)));
    }
}
