//! Audio plumbing for voice mode: capture, wire codec, playback.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk → downmix_to_mono → resample(16 kHz)
//!           → FrameAssembler (4096-sample blocks) → encode_frame → WireFrame
//!
//! Server audio (base64 PCM16 @ 24 kHz) → decode_frame → PlaybackScheduler
//!           → AudioSink::play_at → Mixer → cpal output callback
//! ```
//!
//! The device-facing halves ([`MicrophoneInput`], [`SpeakerOutput`]) sit
//! behind the [`AudioInput`] / [`AudioOutput`] traits so the voice session
//! can be exercised without hardware.

pub mod capture;
pub mod codec;
pub mod frame;
pub mod output;
pub mod playback;
pub mod resample;

pub use capture::{AudioChunk, AudioInput, CaptureError, CaptureStream, MicrophoneInput};
pub use codec::{decode_frame, encode_frame, CodecError, SampleBuffer};
pub use frame::{pcm_mime_type, FrameAssembler, WireFrame};
pub use output::{Mixer, SpeakerOutput};
pub use playback::{
    AudioOutput, AudioSink, PlaybackError, PlaybackScheduler, ScheduledSegment, SegmentHandle,
};
pub use resample::{downmix_to_mono, resample};
