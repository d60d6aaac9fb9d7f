//! Core `ImageEditor` trait and the `GeminiImageEditor` implementation.
//!
//! `GeminiImageEditor` calls the `generateContent` REST endpoint of the
//! image model with the current image inlined next to a text instruction and
//! returns the first image found among the response parts.  All connection
//! details come from [`ApiConfig`] / [`EditConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::image::ImageData;
use crate::config::{ApiConfig, EditConfig};

// ---------------------------------------------------------------------------
// EditError
// ---------------------------------------------------------------------------

/// Errors that can occur while asking the service for an edit.
#[derive(Debug, Error)]
pub enum EditError {
    /// The input image is not a well-formed `type/subtype` + payload.
    #[error("invalid input image")]
    InvalidInput,

    /// The service answered but no part carried an image.
    #[error("no image was generated in the response")]
    NoImageReturned,

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("edit request timed out")]
    Timeout,

    /// The service returned a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be parsed.
    #[error("failed to parse edit response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for EditError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EditError::Timeout
        } else {
            EditError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ImageEditor trait
// ---------------------------------------------------------------------------

/// Async interface to an image-editing backend.
///
/// Implementors must be `Send + Sync` so they can be held behind an
/// `Arc<dyn ImageEditor>` shared by the text and voice entry points.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Apply `instruction` to `image` and return the edited image.
    async fn edit_image(&self, image: &ImageData, instruction: &str)
        -> Result<ImageData, EditError>;
}

// ---------------------------------------------------------------------------
// GeminiImageEditor
// ---------------------------------------------------------------------------

/// Calls `POST {base_url}/v1beta/models/{model}:generateContent`.
pub struct GeminiImageEditor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl GeminiImageEditor {
    /// Build an editor from application config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `edit.timeout_secs`; a default client is used if the builder fails.
    pub fn from_config(api: &ApiConfig, edit: &EditConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(edit.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key: api.resolve_api_key(),
            model: edit.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// JSON request body for one edit.
pub(crate) fn build_request(image: &ImageData, instruction: &str) -> Value {
    serde_json::json!({
        "contents": {
            "parts": [
                {
                    "inlineData": {
                        "data": image.to_base64(),
                        "mimeType": image.media_type,
                    }
                },
                {
                    "text": format!(
                        "Please edit this image according to the following instruction: \
                         {instruction}. Return only the edited image."
                    )
                }
            ]
        }
    })
}

/// First inline image among `candidates[0].content.parts`.
pub(crate) fn extract_image(response: &Value) -> Result<ImageData, EditError> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(EditError::NoImageReturned)?;

    for part in parts {
        let inline = &part["inlineData"];
        if let Some(data) = inline["data"].as_str() {
            let media_type = inline["mimeType"].as_str().unwrap_or("image/png");
            return ImageData::from_base64(media_type, data)
                .map_err(|e| EditError::Parse(e.to_string()));
        }
    }

    Err(EditError::NoImageReturned)
}

#[async_trait]
impl ImageEditor for GeminiImageEditor {
    async fn edit_image(
        &self,
        image: &ImageData,
        instruction: &str,
    ) -> Result<ImageData, EditError> {
        if !image.is_well_formed() {
            return Err(EditError::InvalidInput);
        }

        let mut req = self.client.post(self.endpoint()).json(&build_request(image, instruction));

        // Attach the key header only when a non-empty key is configured.
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.header("x-goog-api-key", key);
        }

        log::debug!(
            "editor: requesting edit ({} bytes, {:?})",
            image.bytes.len(),
            instruction
        );
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EditError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| EditError::Parse(e.to_string()))?;

        let edited = extract_image(&json)?;
        log::debug!("editor: received {} ({} bytes)", edited.media_type, edited.bytes.len());
        Ok(edited)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> GeminiImageEditor {
        let api = ApiConfig {
            base_url: "http://127.0.0.1:9/".into(),
            api_key: Some("test-key".into()),
            ..ApiConfig::default()
        };
        GeminiImageEditor::from_config(&api, &EditConfig::default())
    }

    #[test]
    fn endpoint_joins_base_url_and_model() {
        assert_eq!(
            editor().endpoint(),
            "http://127.0.0.1:9/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }

    #[test]
    fn editor_is_object_safe() {
        let editor: Box<dyn ImageEditor> = Box::new(editor());
        drop(editor);
    }

    #[tokio::test]
    async fn malformed_image_fails_before_any_request() {
        // Port 9 is unreachable; InvalidInput proves no request was attempted.
        let bad = ImageData::new("not-a-type", vec![1, 2, 3]);
        let err = editor().edit_image(&bad, "add a hat").await.unwrap_err();
        assert!(matches!(err, EditError::InvalidInput));

        let empty = ImageData::new("image/png", vec![]);
        let err = editor().edit_image(&empty, "add a hat").await.unwrap_err();
        assert!(matches!(err, EditError::InvalidInput));
    }

    #[test]
    fn request_inlines_image_and_instruction() {
        let img = ImageData::new("image/png", vec![1, 2, 3]);
        let body = build_request(&img, "add a hat");
        let parts = &body["contents"]["parts"];

        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert!(parts[1]["text"].as_str().unwrap().contains("add a hat"));
    }

    #[test]
    fn extract_skips_text_parts() {
        let response = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here is your image" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "AQID" } }
                    ]
                }
            }]
        });
        let img = extract_image(&response).unwrap();
        assert_eq!(img.media_type, "image/jpeg");
        assert_eq!(img.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn extract_without_image_is_no_image_returned() {
        let text_only = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Sorry" }] } }]
        });
        assert!(matches!(
            extract_image(&text_only),
            Err(EditError::NoImageReturned)
        ));

        let no_candidates = serde_json::json!({ "promptFeedback": {} });
        assert!(matches!(
            extract_image(&no_candidates),
            Err(EditError::NoImageReturned)
        ));
    }
}
