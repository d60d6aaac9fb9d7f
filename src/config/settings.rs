//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to override.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Fallback environment variable consulted after [`ApiConfig::api_key_env`].
const FALLBACK_KEY_ENV: &str = "API_KEY";

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

/// Connection details shared by the image and speech services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST endpoint used for image edits.
    pub base_url: String,
    /// Base URL of the realtime WebSocket endpoint.
    pub realtime_url: String,
    /// API key.  `None` (or empty) means "read it from the environment".
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            realtime_url: "wss://generativelanguage.googleapis.com".into(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".into(),
        }
    }
}

impl ApiConfig {
    /// The key from the settings file, else `$api_key_env`, else `$API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
            .or_else(|| std::env::var(FALLBACK_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

// ---------------------------------------------------------------------------
// EditConfig
// ---------------------------------------------------------------------------

/// Settings for the remote image-editing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Image model identifier.
    pub model: String,
    /// Maximum seconds to wait for an edit before timing out.
    pub timeout_secs: u64,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-image".into(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceConfig
// ---------------------------------------------------------------------------

/// Settings for the realtime voice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Live model identifier.
    pub model: String,
    /// Prebuilt voice used for the assistant's speech.
    pub voice_name: String,
    /// System instruction constraining the assistant.
    pub system_instruction: String,
    /// Seconds to wait for the server to acknowledge the session setup.
    pub handshake_timeout_secs: u64,
    /// Capacity of the captured-frame queue between the microphone thread
    /// and the session.  Frames beyond it are dropped.
    pub frame_queue: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-09-2025".into(),
            voice_name: "Puck".into(),
            system_instruction: "You are a professional photo editing assistant. When a user \
                describes a change for their photo, call the \"apply_image_edit\" tool with a \
                concise description of the edit. Be friendly and confirm you are starting the edit."
                .into(),
            handshake_timeout_secs: 15,
            frame_queue: 32,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture and speaker playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of the audio sent to the speech service (Hz).
    pub input_sample_rate: u32,
    /// Rate of the audio the speech service sends back (Hz).
    pub output_sample_rate: u32,
    /// Samples per outbound frame.
    pub block_size: usize,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            block_size: 4096,
            input_device: None,
            output_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use nano_edit::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Service endpoints and credentials.
    pub api: ApiConfig,
    /// Image-editing settings.
    pub edit: EditConfig,
    /// Realtime voice settings.
    pub voice: VoiceConfig,
    /// Audio device settings.
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.api.base_url, loaded.api.base_url);
        assert_eq!(original.api.realtime_url, loaded.api.realtime_url);
        assert_eq!(original.api.api_key, loaded.api.api_key);
        assert_eq!(original.edit.model, loaded.edit.model);
        assert_eq!(original.edit.timeout_secs, loaded.edit.timeout_secs);
        assert_eq!(original.voice.model, loaded.voice.model);
        assert_eq!(original.voice.voice_name, loaded.voice.voice_name);
        assert_eq!(
            original.voice.system_instruction,
            loaded.voice.system_instruction
        );
        assert_eq!(original.audio.block_size, loaded.audio.block_size);
        assert_eq!(
            original.audio.input_sample_rate,
            loaded.audio.input_sample_rate
        );
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.edit.model, EditConfig::default().model);
        assert_eq!(config.audio.output_sample_rate, 24_000);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[voice]\nvoice_name = \"Kore\"\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.voice.voice_name, "Kore");
        assert_eq!(config.voice.handshake_timeout_secs, 15);
        assert_eq!(config.audio.block_size, 4096);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.api.base_url, "https://generativelanguage.googleapis.com");
        assert_eq!(cfg.api.api_key_env, "GEMINI_API_KEY");
        assert!(cfg.api.api_key.is_none());
        assert_eq!(cfg.edit.model, "gemini-2.5-flash-image");
        assert_eq!(cfg.voice.voice_name, "Puck");
        assert!(cfg.voice.system_instruction.contains("apply_image_edit"));
        assert_eq!(cfg.audio.input_sample_rate, 16_000);
        assert_eq!(cfg.audio.output_sample_rate, 24_000);
        assert_eq!(cfg.audio.block_size, 4096);
    }

    #[test]
    fn explicit_api_key_wins() {
        let api = ApiConfig {
            api_key: Some("from-file".into()),
            api_key_env: "NANO_EDIT_TEST_UNSET_VAR".into(),
            ..ApiConfig::default()
        };
        assert_eq!(api.resolve_api_key().as_deref(), Some("from-file"));
    }

    #[test]
    fn api_key_read_from_named_env_var() {
        std::env::set_var("NANO_EDIT_TEST_KEY", "from-env");
        let api = ApiConfig {
            api_key: Some(String::new()),
            api_key_env: "NANO_EDIT_TEST_KEY".into(),
            ..ApiConfig::default()
        };
        assert_eq!(api.resolve_api_key().as_deref(), Some("from-env"));
        std::env::remove_var("NANO_EDIT_TEST_KEY");
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.api.api_key = Some("sk-test".into());
        cfg.edit.timeout_secs = 120;
        cfg.voice.frame_queue = 8;
        cfg.audio.input_device = Some("USB Mic".into());

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.api.api_key, Some("sk-test".into()));
        assert_eq!(loaded.edit.timeout_secs, 120);
        assert_eq!(loaded.voice.frame_queue, 8);
        assert_eq!(loaded.audio.input_device.as_deref(), Some("USB Mic"));
    }
}
