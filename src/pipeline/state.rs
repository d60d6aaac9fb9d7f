//! Voice state machine labels and shared application state.
//!
//! [`AppState`] is the single source of truth for everything a front end
//! renders: the original and current image, edit history, prompt text,
//! processing flag, last error, and a projection of the voice session.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<AppState>>`, cheap to clone
//! and safe to share across threads.  Renderers take a [`StateSnapshot`]
//! instead of holding the lock.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::editor::ImageData;

// ---------------------------------------------------------------------------
// VoiceState
// ---------------------------------------------------------------------------

/// Lifecycle of the realtime voice session.
///
/// ```text
/// Idle ──start──▶ Connecting ──handshake ok──▶ Active
///                     │                          │
///                     └──stop / error──▶ Closing ◀┘
///                                          │
///                                          ▼
///                                         Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    /// No session; the microphone is released.
    #[default]
    Idle,

    /// Microphone acquired, waiting for the service handshake.
    Connecting,

    /// Handshake complete; audio flows in both directions.
    Active,

    /// Teardown in progress.
    Closing,
}

impl VoiceState {
    /// `true` only when audio is streaming.
    ///
    /// ```
    /// use nano_edit::pipeline::VoiceState;
    ///
    /// assert!(VoiceState::Active.is_active());
    /// assert!(!VoiceState::Connecting.is_active());
    /// assert!(!VoiceState::Idle.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(self, VoiceState::Active)
    }

    /// A short human-readable label suitable for a status bar.
    pub fn label(&self) -> &'static str {
        match self {
            VoiceState::Idle => "Voice off",
            VoiceState::Connecting => "Connecting",
            VoiceState::Active => "Listening",
            VoiceState::Closing => "Closing",
        }
    }
}

// ---------------------------------------------------------------------------
// EditHistoryItem
// ---------------------------------------------------------------------------

/// One applied edit.  Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct EditHistoryItem {
    pub id: Uuid,
    pub image: ImageData,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl EditHistoryItem {
    pub fn new(image: ImageData, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            prompt: prompt.into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared application state.
///
/// Held behind [`SharedState`].  The edit orchestrator and the voice session
/// mutate it; front ends read it through [`AppState::snapshot`].
#[derive(Debug, Default)]
pub struct AppState {
    /// The image as uploaded, before any edit.
    pub original_image: Option<ImageData>,

    /// The image currently shown and used as the input of the next edit.
    pub current_image: Option<ImageData>,

    /// Applied edits, newest first.
    pub history: Vec<EditHistoryItem>,

    /// `true` while an edit request is in flight.
    pub is_processing: bool,

    /// Text prompt being composed.
    pub prompt: String,

    /// User-facing error message, if any.
    pub error: Option<String>,

    pub voice: VoiceState,

    /// Accumulated input transcription of the current voice turn.
    pub transcript: String,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both the original and the current image.  History is kept.
    pub fn upload_image(&mut self, image: ImageData) {
        self.original_image = Some(image.clone());
        self.current_image = Some(image);
        self.error = None;
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Make a history entry's image current.  Returns `false` for an unknown id.
    pub fn select_history(&mut self, id: Uuid) -> bool {
        match self.history.iter().find(|item| item.id == id) {
            Some(item) => {
                self.current_image = Some(item.image.clone());
                true
            }
            None => false,
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Go back to the uploaded image and drop the prompt text.
    pub fn reset_to_original(&mut self) {
        self.current_image = self.original_image.clone();
        self.prompt.clear();
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Cloned, lock-free view for rendering.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            original_image: self.original_image.clone(),
            current_image: self.current_image.clone(),
            history: self.history.clone(),
            is_processing: self.is_processing,
            prompt: self.prompt.clone(),
            error: self.error.clone(),
            voice: self.voice,
            voice_active: self.voice.is_active(),
            transcript: self.transcript.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// StateSnapshot
// ---------------------------------------------------------------------------

/// Read-only copy of [`AppState`] taken under a short lock.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub original_image: Option<ImageData>,
    pub current_image: Option<ImageData>,
    pub history: Vec<EditHistoryItem>,
    pub is_processing: bool,
    pub prompt: String,
    pub error: Option<String>,
    pub voice: VoiceState,
    pub voice_active: bool,
    pub transcript: String,
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`AppState`].
///
/// Cheap to clone (`Arc` clone).  Lock with [`lock_state`] for a short
/// critical section; do **not** hold the lock across `.await` points.
pub type SharedState = Arc<Mutex<AppState>>;

/// Construct a new [`SharedState`] wrapping an empty [`AppState`].
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(AppState::new()))
}

/// Lock the state, recovering the guard if a previous holder panicked.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn png(byte: u8) -> ImageData {
        ImageData::new("image/png", vec![byte])
    }

    // ---- VoiceState ---

    #[test]
    fn default_voice_state_is_idle() {
        assert_eq!(VoiceState::default(), VoiceState::Idle);
    }

    #[test]
    fn only_active_is_active() {
        assert!(VoiceState::Active.is_active());
        assert!(!VoiceState::Idle.is_active());
        assert!(!VoiceState::Connecting.is_active());
        assert!(!VoiceState::Closing.is_active());
    }

    #[test]
    fn labels() {
        assert_eq!(VoiceState::Idle.label(), "Voice off");
        assert_eq!(VoiceState::Active.label(), "Listening");
    }

    // ---- AppState ---

    #[test]
    fn new_state_is_empty() {
        let st = AppState::new();
        assert!(st.current_image.is_none());
        assert!(st.history.is_empty());
        assert!(!st.is_processing);
        assert!(st.error.is_none());
        assert_eq!(st.voice, VoiceState::Idle);
    }

    #[test]
    fn upload_sets_both_images_and_keeps_history() {
        let mut st = AppState::new();
        st.history.push(EditHistoryItem::new(png(9), "old"));
        st.error = Some("stale".into());

        st.upload_image(png(1));

        assert_eq!(st.original_image, Some(png(1)));
        assert_eq!(st.current_image, Some(png(1)));
        assert_eq!(st.history.len(), 1);
        assert!(st.error.is_none());
    }

    #[test]
    fn select_history_switches_current_image() {
        let mut st = AppState::new();
        st.upload_image(png(1));
        let item = EditHistoryItem::new(png(2), "brighter");
        let id = item.id;
        st.history.insert(0, item);

        assert!(st.select_history(id));
        assert_eq!(st.current_image, Some(png(2)));
        assert!(!st.select_history(Uuid::new_v4()));
        assert_eq!(st.current_image, Some(png(2)));
    }

    #[test]
    fn reset_restores_original_and_clears_prompt() {
        let mut st = AppState::new();
        st.upload_image(png(1));
        st.current_image = Some(png(2));
        st.set_prompt("add a hat");

        st.reset_to_original();

        assert_eq!(st.current_image, Some(png(1)));
        assert!(st.prompt.is_empty());
    }

    #[test]
    fn history_ids_are_unique() {
        let a = EditHistoryItem::new(png(1), "a");
        let b = EditHistoryItem::new(png(1), "a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn snapshot_projects_voice_flag() {
        let mut st = AppState::new();
        st.voice = VoiceState::Active;
        st.transcript = " hello".into();

        let snap = st.snapshot();
        assert!(snap.voice_active);
        assert_eq!(snap.transcript, " hello");
    }

    // ---- SharedState ---

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn shared_state_can_be_cloned_and_mutated() {
        let state = new_shared_state();
        let state2 = Arc::clone(&state);

        lock_state(&state).voice = VoiceState::Connecting;
        assert_eq!(lock_state(&state2).voice, VoiceState::Connecting);
    }
}
