//! Edit pipeline: shared state plus the orchestrator that mutates it.
//!
//! # Architecture
//!
//! ```text
//!  typed prompt ──submit_prompt()──┐
//!                                  ▼
//!  voice tool call ──apply_edit()──▶ EditOrchestrator ──▶ ImageEditor (remote)
//!                                  │
//!                                  ▼
//!               SharedState (Arc<Mutex<AppState>>) ←── snapshot() by the UI
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nano_edit::config::AppConfig;
//! use nano_edit::editor::GeminiImageEditor;
//! use nano_edit::pipeline::{new_shared_state, EditOrchestrator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let editor = Arc::new(GeminiImageEditor::from_config(&config.api, &config.edit));
//!     let orchestrator = EditOrchestrator::new(new_shared_state(), editor);
//!
//!     orchestrator.upload_file(std::path::Path::new("photo.png")).unwrap();
//!     orchestrator.set_prompt("turn the sky purple");
//!     let outcome = orchestrator.submit_prompt().await;
//!     println!("{}", outcome.message());
//! }
//! ```

pub mod orchestrator;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use orchestrator::{EditOrchestrator, EditOutcome, SkipReason};
pub use state::{
    lock_state, new_shared_state, AppState, EditHistoryItem, SharedState, StateSnapshot,
    VoiceState,
};
