//! Microphone capture via `cpal`, feeding wire frames to the voice session.
//!
//! [`MicrophoneInput`] implements [`AudioInput`]: each call to
//! [`AudioInput::open`] spawns a dedicated `mic-capture` thread that owns the
//! cpal stream (which is not `Send` on every platform), converts every device
//! buffer to 16 kHz mono, cuts it into fixed blocks and pushes the encoded
//! [`WireFrame`]s into a bounded tokio channel with `try_send`.  The audio
//! callback never waits on the session; when the queue is full the frame is
//! dropped.
//!
//! ```text
//! cpal callback ──AudioChunk──▶ mic-capture thread
//!                                 downmix_to_mono → resample → FrameAssembler
//!                                 └─try_send(WireFrame)──▶ session task
//! ```
//!
//! The returned [`CaptureStream`] is released exactly once: either through
//! [`CaptureStream::release`] (which consumes it) or, as a fallback, on drop.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

use super::frame::{FrameAssembler, WireFrame};
use super::resample::{downmix_to_mono, resample};
use crate::config::AudioConfig;

/// How often the capture thread checks for a stop request.
const STOP_POLL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring the microphone.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device \"{0}\" not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("capture thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// AudioInput / CaptureStream
// ---------------------------------------------------------------------------

/// Source of microphone audio for a voice session.
pub trait AudioInput: Send + Sync {
    /// Acquire the microphone and start forwarding frames into `frames`.
    fn open(&self, frames: mpsc::Sender<WireFrame>) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// A running capture, owned by exactly one voice session.
pub trait CaptureStream: Send {
    /// Stop capturing and release the device.
    fn release(self: Box<Self>);
}

// ---------------------------------------------------------------------------
// MicrophoneInput
// ---------------------------------------------------------------------------

/// cpal-backed [`AudioInput`].
#[derive(Debug, Clone)]
pub struct MicrophoneInput {
    device: Option<String>,
    target_rate: u32,
    block_size: usize,
}

impl MicrophoneInput {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            device: config.input_device.clone(),
            target_rate: config.input_sample_rate,
            block_size: config.block_size.max(1),
        }
    }
}

impl AudioInput for MicrophoneInput {
    fn open(&self, frames: mpsc::Sender<WireFrame>) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let settings = self.clone();

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || run_capture(settings, frames, stop_rx, ready_tx))
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok((sample_rate, channels))) => {
                log::info!(
                    "capture: microphone open ({sample_rate} Hz, {channels} ch) → {} Hz mono, {} sample blocks",
                    self.target_rate,
                    self.block_size
                );
                Ok(Box::new(MicrophoneStream {
                    stop_tx: Some(stop_tx),
                    thread: Some(thread),
                }))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::Thread("capture thread exited during start-up".into()))
            }
        }
    }
}

/// Body of the `mic-capture` thread.
fn run_capture(
    settings: MicrophoneInput,
    frames: mpsc::Sender<WireFrame>,
    stop_rx: std_mpsc::Receiver<()>,
    ready_tx: std_mpsc::Sender<Result<(u32, u16), CaptureError>>,
) {
    let (chunk_tx, chunk_rx) = std_mpsc::channel::<AudioChunk>();
    let mut assembler = FrameAssembler::new(settings.block_size, settings.target_rate);

    let (stream, sample_rate, channels) = match build_stream(settings.device.as_deref(), chunk_tx) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok((sample_rate, channels)));

    let mut dropped: u64 = 0;

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(std_mpsc::TryRecvError::Disconnected) => break,
            Err(std_mpsc::TryRecvError::Empty) => {}
        }

        let chunk = match chunk_rx.recv_timeout(STOP_POLL) {
            Ok(chunk) => chunk,
            Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        };

        let mono = downmix_to_mono(&chunk.samples, chunk.channels);
        let converted = resample(&mono, chunk.sample_rate, settings.target_rate);

        for frame in assembler.push(&converted) {
            match frames.try_send(frame) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    dropped += 1;
                    if dropped == 1 {
                        log::warn!("capture: session is not keeping up, dropping frames");
                    } else {
                        log::debug!("capture: dropped frame #{dropped}");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("capture: frame receiver closed");
                }
            }
        }
    }

    drop(stream);
    log::debug!(
        "capture: stream released ({dropped} frames dropped, {} samples unsent)",
        assembler.pending()
    );
}

/// Open the requested (or default) input device and start streaming.
fn build_stream(
    device_name: Option<&str>,
    tx: std_mpsc::Sender<AudioChunk>,
) -> Result<(cpal::Stream, u32, u16), CaptureError> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
        None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
    };

    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let on_error = |err: cpal::StreamError| {
        log::error!("cpal input stream error: {err}");
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            on_error,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.iter().map(|&s| s as f32 / 32_768.0).collect(),
                    sample_rate,
                    channels,
                });
            },
            on_error,
            None,
        )?,
        other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    Ok((stream, sample_rate, channels))
}

// ---------------------------------------------------------------------------
// MicrophoneStream
// ---------------------------------------------------------------------------

/// Handle to the `mic-capture` thread.
struct MicrophoneStream {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneStream {
    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("capture: mic-capture thread panicked");
            }
        }
    }
}

impl CaptureStream for MicrophoneStream {
    fn release(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
