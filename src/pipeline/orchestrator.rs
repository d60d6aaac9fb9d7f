//! Edit orchestrator: the single entry point for image edits.
//!
//! Typed prompts and voice tool calls both end up in
//! [`EditOrchestrator::apply_edit`], which guards against missing input,
//! repeated instructions and overlapping requests before calling the
//! [`ImageEditor`].
//!
//! # Edit flow
//!
//! ```text
//! apply_edit(instruction)
//!   ├─ no current image        → Skipped(NoImage)
//!   ├─ blank instruction       → Skipped(EmptyInstruction)
//!   ├─ same as last accepted   → Skipped(Duplicate)
//!   ├─ edit already in flight  → Skipped(Busy)
//!   └─ is_processing = true, fingerprint = instruction
//!        └─▶ editor.edit_image(current, instruction)
//!              ├─ Ok  → current = edited, history.push_front, prompt = ""  → Applied
//!              └─ Err → error = "AI was unable to process this edit."      → Failed
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::editor::{ImageData, ImageEditor, ImageError};

use super::state::{lock_state, EditHistoryItem, SharedState, StateSnapshot};

/// Shown to the user when the remote edit fails, whatever the cause.
pub const EDIT_FAILED_MESSAGE: &str = "AI was unable to process this edit.";

/// Shown to the user when an image file cannot be read.
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load image";

// ---------------------------------------------------------------------------
// EditOutcome
// ---------------------------------------------------------------------------

/// Why an edit request was dropped without calling the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoImage,
    EmptyInstruction,
    Duplicate,
    Busy,
}

/// Result of [`EditOrchestrator::apply_edit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Failed,
    Skipped(SkipReason),
}

impl EditOutcome {
    /// Text reported back to the voice model as the tool result.
    ///
    /// ```
    /// use nano_edit::pipeline::EditOutcome;
    ///
    /// assert_eq!(EditOutcome::Applied.message(), "Edit applied successfully.");
    /// assert_eq!(EditOutcome::Failed.message(), "Failed to apply edit.");
    /// ```
    pub fn message(&self) -> &'static str {
        match self {
            EditOutcome::Applied => "Edit applied successfully.",
            EditOutcome::Failed => "Failed to apply edit.",
            EditOutcome::Skipped(SkipReason::NoImage) => {
                "No image is loaded. Ask the user to upload a photo first."
            }
            EditOutcome::Skipped(SkipReason::EmptyInstruction) => {
                "The edit instruction was empty."
            }
            EditOutcome::Skipped(SkipReason::Duplicate) => "That edit was already applied.",
            EditOutcome::Skipped(SkipReason::Busy) => "Another edit is still in progress.",
        }
    }
}

// ---------------------------------------------------------------------------
// EditOrchestrator
// ---------------------------------------------------------------------------

/// Applies edits to the shared state through an [`ImageEditor`].
///
/// Cheap to clone; every clone shares the same state, editor and dedup
/// fingerprint, so the text box and the voice session cannot both apply the
/// same instruction.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use nano_edit::config::AppConfig;
/// use nano_edit::editor::GeminiImageEditor;
/// use nano_edit::pipeline::{new_shared_state, EditOrchestrator};
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let editor = Arc::new(GeminiImageEditor::from_config(&config.api, &config.edit));
/// let orchestrator = EditOrchestrator::new(new_shared_state(), editor);
///
/// orchestrator.upload_file(std::path::Path::new("photo.png")).unwrap();
/// let outcome = orchestrator.apply_edit("add a rainbow").await;
/// println!("{}", outcome.message());
/// # }
/// ```
#[derive(Clone)]
pub struct EditOrchestrator {
    state: SharedState,
    editor: Arc<dyn ImageEditor>,
    /// Most recently accepted instruction.
    last_processed: Arc<Mutex<Option<String>>>,
}

impl EditOrchestrator {
    pub fn new(state: SharedState, editor: Arc<dyn ImageEditor>) -> Self {
        Self {
            state,
            editor,
            last_processed: Arc::new(Mutex::new(None)),
        }
    }

    /// The shared state this orchestrator writes to.
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Apply `instruction` to the current image.
    pub async fn apply_edit(&self, instruction: &str) -> EditOutcome {
        let image = match self.begin(instruction) {
            Ok(image) => image,
            Err(reason) => {
                log::debug!("orchestrator: skipped {instruction:?} ({reason:?})");
                return EditOutcome::Skipped(reason);
            }
        };

        log::info!("orchestrator: applying edit {instruction:?}");
        let result = self.editor.edit_image(&image, instruction).await;

        let mut st = lock_state(&self.state);
        st.is_processing = false;
        match result {
            Ok(edited) => {
                st.current_image = Some(edited.clone());
                st.history.insert(0, EditHistoryItem::new(edited, instruction));
                st.prompt.clear();
                log::info!("orchestrator: edit applied ({} in history)", st.history.len());
                EditOutcome::Applied
            }
            Err(e) => {
                log::error!("orchestrator: edit failed: {e}");
                st.error = Some(EDIT_FAILED_MESSAGE.to_string());
                EditOutcome::Failed
            }
        }
    }

    /// Apply the prompt currently held in the state.
    pub async fn submit_prompt(&self) -> EditOutcome {
        let prompt = lock_state(&self.state).prompt.clone();
        self.apply_edit(&prompt).await
    }

    /// Run the guards and, if they pass, mark the edit as in flight.
    ///
    /// Returns the image to edit.  State and fingerprint are untouched when a
    /// guard rejects the request.
    fn begin(&self, instruction: &str) -> Result<ImageData, SkipReason> {
        let mut st = lock_state(&self.state);
        let mut last = self
            .last_processed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let image = st.current_image.clone().ok_or(SkipReason::NoImage)?;
        if instruction.trim().is_empty() {
            return Err(SkipReason::EmptyInstruction);
        }
        if last.as_deref() == Some(instruction) {
            return Err(SkipReason::Duplicate);
        }
        if st.is_processing {
            return Err(SkipReason::Busy);
        }

        st.is_processing = true;
        st.error = None;
        *last = Some(instruction.to_string());
        Ok(image)
    }

    // -----------------------------------------------------------------------
    // UI write surface
    // -----------------------------------------------------------------------

    pub fn upload_image(&self, image: ImageData) {
        log::info!("orchestrator: uploaded {image:?}");
        lock_state(&self.state).upload_image(image);
    }

    /// Load an image file and make it both the original and current image.
    ///
    /// On failure the user error is set to "Failed to load image" and the
    /// images are left as they were.
    pub fn upload_file(&self, path: &Path) -> Result<(), ImageError> {
        match ImageData::load(path) {
            Ok(image) => {
                self.upload_image(image);
                Ok(())
            }
            Err(e) => {
                log::warn!("orchestrator: cannot load {}: {e}", path.display());
                lock_state(&self.state).set_error(LOAD_FAILED_MESSAGE);
                Err(e)
            }
        }
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        lock_state(&self.state).set_prompt(prompt);
    }

    /// Returns `false` if no history item has this id.
    pub fn select_history(&self, id: Uuid) -> bool {
        lock_state(&self.state).select_history(id)
    }

    pub fn clear_history(&self) {
        lock_state(&self.state).clear_history();
    }

    pub fn reset_to_original(&self) {
        lock_state(&self.state).reset_to_original();
    }

    /// Write the current image into `dir` as `nano-edit-<millis>.<ext>`.
    ///
    /// Returns the written path, or `None` when there is no image to export.
    pub fn export_current(&self, dir: &Path) -> Result<Option<PathBuf>, ImageError> {
        let Some(image) = lock_state(&self.state).current_image.clone() else {
            return Ok(None);
        };

        let name = format!(
            "nano-edit-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            image.extension()
        );
        let path = dir.join(name);
        image.save(&path)?;
        log::info!("orchestrator: exported {}", path.display());
        Ok(Some(path))
    }

    pub fn snapshot(&self) -> StateSnapshot {
        lock_state(&self.state).snapshot()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::editor::EditError;
    use crate::pipeline::state::new_shared_state;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Editor that returns a fixed image and counts calls.
    ///
    /// Optionally waits on a gate and then sleeps before answering.
    pub(crate) struct OkEditor {
        pub result: ImageData,
        pub calls: Arc<AtomicUsize>,
        pub instructions: Arc<Mutex<Vec<String>>>,
        pub gate: Option<Arc<Notify>>,
        pub delay: Duration,
    }

    impl OkEditor {
        pub fn new(result: ImageData) -> Self {
            Self {
                result,
                calls: Arc::new(AtomicUsize::new(0)),
                instructions: Arc::new(Mutex::new(Vec::new())),
                gate: None,
                delay: Duration::ZERO,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    #[async_trait]
    impl ImageEditor for OkEditor {
        async fn edit_image(&self, _image: &ImageData, instruction: &str) -> Result<ImageData, EditError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.instructions.lock().unwrap().push(instruction.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.result.clone())
        }
    }

    /// Editor that always fails.
    struct FailEditor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ImageEditor for FailEditor {
        async fn edit_image(&self, _image: &ImageData, _instruction: &str) -> Result<ImageData, EditError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EditError::NoImageReturned)
        }
    }

    /// Editor that blocks until the gate is opened.
    struct GatedEditor {
        gate: Arc<Notify>,
        result: ImageData,
    }

    #[async_trait]
    impl ImageEditor for GatedEditor {
        async fn edit_image(&self, _image: &ImageData, _instruction: &str) -> Result<ImageData, EditError> {
            self.gate.notified().await;
            Ok(self.result.clone())
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn png(byte: u8) -> ImageData {
        ImageData::new("image/png", vec![byte])
    }

    fn with_ok_editor() -> (EditOrchestrator, Arc<AtomicUsize>) {
        let editor = OkEditor::new(png(2));
        let calls = Arc::clone(&editor.calls);
        (EditOrchestrator::new(new_shared_state(), Arc::new(editor)), calls)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn upload_then_edit_updates_image_and_history() {
        let (orc, calls) = with_ok_editor();
        orc.upload_image(png(1));
        orc.set_prompt("add a hat");

        let outcome = orc.submit_prompt().await;

        assert_eq!(outcome, EditOutcome::Applied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snap = orc.snapshot();
        assert_eq!(snap.current_image, Some(png(2)));
        assert_eq!(snap.original_image, Some(png(1)));
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].prompt, "add a hat");
        assert!(snap.prompt.is_empty());
        assert!(!snap.is_processing);
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let (orc, _) = with_ok_editor();
        orc.upload_image(png(1));

        orc.apply_edit("first").await;
        orc.apply_edit("second").await;

        let snap = orc.snapshot();
        assert_eq!(snap.history.len(), 2);
        assert_eq!(snap.history[0].prompt, "second");
        assert_eq!(snap.history[1].prompt, "first");
    }

    #[tokio::test]
    async fn duplicate_instruction_calls_service_once() {
        let (orc, calls) = with_ok_editor();
        orc.upload_image(png(1));

        assert_eq!(orc.apply_edit("make it brighter").await, EditOutcome::Applied);
        assert_eq!(
            orc.apply_edit("make it brighter").await,
            EditOutcome::Skipped(SkipReason::Duplicate)
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orc.snapshot().history.len(), 1);
    }

    #[tokio::test]
    async fn dedup_is_exact_string_equality() {
        let (orc, calls) = with_ok_editor();
        orc.upload_image(png(1));

        orc.apply_edit("make it brighter").await;
        orc.apply_edit("make it brighter ").await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_image_or_blank_instruction_changes_nothing() {
        let (orc, calls) = with_ok_editor();

        assert_eq!(
            orc.apply_edit("add a hat").await,
            EditOutcome::Skipped(SkipReason::NoImage)
        );

        orc.upload_image(png(1));
        assert_eq!(
            orc.apply_edit("   ").await,
            EditOutcome::Skipped(SkipReason::EmptyInstruction)
        );
        assert_eq!(
            orc.apply_edit("").await,
            EditOutcome::Skipped(SkipReason::EmptyInstruction)
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let snap = orc.snapshot();
        assert_eq!(snap.current_image, Some(png(1)));
        assert!(snap.history.is_empty());
        assert!(!snap.is_processing);
    }

    #[tokio::test]
    async fn skipped_no_image_does_not_record_fingerprint() {
        let (orc, calls) = with_ok_editor();

        orc.apply_edit("add a hat").await;
        orc.upload_image(png(1));

        assert_eq!(orc.apply_edit("add a hat").await, EditOutcome::Applied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_failure_sets_generic_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let editor = FailEditor {
            calls: Arc::clone(&calls),
        };
        let orc = EditOrchestrator::new(new_shared_state(), Arc::new(editor));
        orc.upload_image(png(1));
        orc.set_prompt("add a hat");

        let outcome = orc.submit_prompt().await;

        assert_eq!(outcome, EditOutcome::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snap = orc.snapshot();
        assert!(!snap.is_processing);
        assert_eq!(snap.error.as_deref(), Some(EDIT_FAILED_MESSAGE));
        assert_eq!(snap.current_image, Some(png(1)));
        assert!(snap.history.is_empty());
        // The prompt is kept so the user can retry after editing it.
        assert_eq!(snap.prompt, "add a hat");
    }

    #[tokio::test]
    async fn overlapping_edit_is_rejected_as_busy() {
        let gate = Arc::new(Notify::new());
        let editor = GatedEditor {
            gate: Arc::clone(&gate),
            result: png(2),
        };
        let orc = EditOrchestrator::new(new_shared_state(), Arc::new(editor));
        orc.upload_image(png(1));

        let first = tokio::spawn({
            let orc = orc.clone();
            async move { orc.apply_edit("first").await }
        });
        while !orc.snapshot().is_processing {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            orc.apply_edit("second").await,
            EditOutcome::Skipped(SkipReason::Busy)
        );

        gate.notify_one();
        assert_eq!(first.await.unwrap(), EditOutcome::Applied);
        assert_eq!(orc.snapshot().history.len(), 1);
    }

    #[tokio::test]
    async fn new_edit_clears_previous_error() {
        let (orc, _) = with_ok_editor();
        orc.upload_image(png(1));
        orc.state().lock().unwrap().error = Some("old".into());

        orc.apply_edit("add a hat").await;

        assert!(orc.snapshot().error.is_none());
    }

    #[test]
    fn upload_file_failure_sets_load_error() {
        let (orc, _) = with_ok_editor();
        let dir = tempfile::tempdir().unwrap();

        let result = orc.upload_file(&dir.path().join("missing.png"));

        assert!(result.is_err());
        let snap = orc.snapshot();
        assert_eq!(snap.error.as_deref(), Some(LOAD_FAILED_MESSAGE));
        assert!(snap.current_image.is_none());
    }

    #[test]
    fn upload_file_loads_image() {
        let (orc, _) = with_ok_editor();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.webp");
        std::fs::write(&path, [7, 7, 7]).unwrap();

        orc.upload_file(&path).unwrap();

        let snap = orc.snapshot();
        assert_eq!(
            snap.current_image,
            Some(ImageData::new("image/webp", vec![7, 7, 7]))
        );
    }

    #[tokio::test]
    async fn select_clear_and_reset_history() {
        let (orc, _) = with_ok_editor();
        orc.upload_image(png(1));
        orc.apply_edit("add a hat").await;
        let id = orc.snapshot().history[0].id;

        orc.reset_to_original();
        assert_eq!(orc.snapshot().current_image, Some(png(1)));

        assert!(orc.select_history(id));
        assert_eq!(orc.snapshot().current_image, Some(png(2)));

        orc.clear_history();
        let snap = orc.snapshot();
        assert!(snap.history.is_empty());
        assert_eq!(snap.current_image, Some(png(2)));
    }

    #[test]
    fn export_writes_current_image() {
        let (orc, _) = with_ok_editor();
        let dir = tempfile::tempdir().unwrap();

        assert!(orc.export_current(dir.path()).unwrap().is_none());

        orc.upload_image(ImageData::new("image/jpeg", vec![0xFF, 0xD8]));
        let path = orc.export_current(dir.path()).unwrap().unwrap();

        assert_eq!(path.extension().unwrap(), "jpg");
        assert_eq!(std::fs::read(path).unwrap(), vec![0xFF, 0xD8]);
    }

    #[test]
    fn skipped_messages_are_distinct() {
        let reasons = [
            SkipReason::NoImage,
            SkipReason::EmptyInstruction,
            SkipReason::Duplicate,
            SkipReason::Busy,
        ];
        let mut messages: Vec<_> = reasons
            .iter()
            .map(|r| EditOutcome::Skipped(*r).message())
            .collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), 4);
    }
}
