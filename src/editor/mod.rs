//! Remote image editing.
//!
//! * [`ImageEditor`]: async trait consumed by the edit orchestrator.
//! * [`GeminiImageEditor`]: REST implementation against the image model.
//! * [`ImageData`]: encoded image bytes + media type.
//! * [`EditError`]: failure variants; never shown raw to the user.
//!
//! ```rust,no_run
//! use nano_edit::config::AppConfig;
//! use nano_edit::editor::{GeminiImageEditor, ImageData, ImageEditor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let editor = GeminiImageEditor::from_config(&config.api, &config.edit);
//!
//!     let photo = ImageData::load(std::path::Path::new("photo.png")).unwrap();
//!     let edited = editor.edit_image(&photo, "make it a winter scene").await.unwrap();
//!     edited.save(std::path::Path::new("edited.png")).unwrap();
//! }
//! ```

pub mod client;
pub mod image;

pub use client::{EditError, GeminiImageEditor, ImageEditor};
pub use image::{ImageData, ImageError};
