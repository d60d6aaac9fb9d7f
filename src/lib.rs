//! nano-edit: edit images with typed prompts or a live voice conversation.
//!
//! * [`editor`]: remote image-editing client and the [`editor::ImageData`] type.
//! * [`pipeline`]: shared state and the edit orchestrator used by both entry points.
//! * [`voice`]: realtime voice session: connection, state machine, tool bridging.
//! * [`audio`]: microphone capture, PCM16 wire codec, scheduled playback.
//! * [`config`]: TOML settings and platform paths.

pub mod audio;
pub mod config;
pub mod editor;
pub mod pipeline;
pub mod voice;
