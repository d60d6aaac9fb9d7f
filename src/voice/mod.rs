//! Realtime voice control of the editor.
//!
//! # Architecture
//!
//! ```text
//! VoiceController::start()
//!   ├─ AudioInput::open  ──▶ CaptureStream  (mic thread → WireFrame mpsc)
//!   ├─ AudioOutput::open ──▶ AudioSink      (wrapped in PlaybackScheduler)
//!   └─ tokio::spawn(VoiceSession::run)
//!         ├─ RealtimeConnector::connect (setup → setupComplete)   [Connecting → Active]
//!         └─ select! loop
//!               ├─ WireFrame          → realtimeInput
//!               ├─ toolCall           → edit worker → EditOrchestrator::apply_edit (one at a time)
//!               ├─ tool reply ready   → toolResponse (call order)
//!               ├─ inputTranscription → AppState::transcript
//!               ├─ modelTurn audio    → PlaybackScheduler::enqueue
//!               └─ interrupted        → PlaybackScheduler::interrupt
//! ```

pub mod controller;
pub mod protocol;
pub mod session;
pub mod transport;

pub use crate::pipeline::VoiceState;
pub use controller::{VoiceController, VoiceDeps};
pub use protocol::{ClientMessage, InboundEvent, ServerMessage, SessionSetup, APPLY_IMAGE_EDIT_TOOL};
pub use session::{SessionError, VoiceSession};
pub use transport::{GeminiLiveConnector, RealtimeConnection, RealtimeConnector};
