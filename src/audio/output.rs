//! Speaker output via `cpal`.
//!
//! [`SpeakerOutput`] opens the output device on a dedicated `speaker-output`
//! thread (the cpal stream is not `Send`).  The device callback and the
//! session share a [`Mixer`] behind an `Arc<Mutex<…>>`:
//!
//! * the callback renders every voice whose start frame has been reached and
//!   advances the frame clock. This clock *is* the playback clock reported
//!   by [`AudioSink::now`];
//! * the session adds voices (`play_at`) and removes them (`stop`).
//!
//! Segments are resampled from the service rate to the device rate when
//! scheduled, and the mono signal is copied to every device channel.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::codec::SampleBuffer;
use super::playback::{AudioOutput, AudioSink, PlaybackError, SegmentHandle};
use super::resample::resample;
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

struct Voice {
    handle: SegmentHandle,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Frame clock plus the set of scheduled voices.
#[derive(Default)]
pub struct Mixer {
    clock_frames: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    /// Frames rendered so far.
    pub fn clock_frames(&self) -> u64 {
        self.clock_frames
    }

    /// Number of voices not yet finished.
    #[cfg(test)]
    fn voice_count(&self) -> usize {
        self.voices.len()
    }

    fn add(&mut self, handle: SegmentHandle, start_frame: u64, samples: Vec<f32>) {
        self.voices.push(Voice {
            handle,
            start_frame,
            samples,
        });
    }

    fn remove(&mut self, handle: SegmentHandle) {
        self.voices.retain(|v| v.handle != handle);
    }

    /// Fill an interleaved output buffer and advance the clock.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;

        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            let t = self.clock_frames + i as u64;
            let mut acc = 0.0_f32;
            for voice in &self.voices {
                if t >= voice.start_frame {
                    if let Some(s) = voice.samples.get((t - voice.start_frame) as usize) {
                        acc += s;
                    }
                }
            }
            frame.fill(acc.clamp(-1.0, 1.0));
        }

        self.clock_frames += frames as u64;
        let now = self.clock_frames;
        self.voices.retain(|v| v.end_frame() > now);
    }
}

// ---------------------------------------------------------------------------
// SpeakerOutput
// ---------------------------------------------------------------------------

/// cpal-backed [`AudioOutput`].
#[derive(Debug, Clone)]
pub struct SpeakerOutput {
    device: Option<String>,
}

impl SpeakerOutput {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            device: config.output_device.clone(),
        }
    }
}

impl AudioOutput for SpeakerOutput {
    fn open(&self) -> Result<Box<dyn AudioSink>, PlaybackError> {
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let device = self.device.clone();
        let thread_mixer = Arc::clone(&mixer);

        let thread = std::thread::Builder::new()
            .name("speaker-output".into())
            .spawn(move || {
                let stream = match build_stream(device.as_deref(), thread_mixer) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the sink is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("playback: output stream released");
            })
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(device_rate)) => {
                log::info!("playback: speaker open ({device_rate} Hz)");
                Ok(Box::new(SpeakerSink {
                    mixer,
                    device_rate,
                    next_id: 0,
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
                Err(PlaybackError::Device("output thread exited during start-up".into()))
            }
        }
    }
}

fn build_stream(
    device_name: Option<&str>,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<(cpal::Stream, u32), PlaybackError> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| PlaybackError::Device(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| PlaybackError::Device(format!("output device \"{name}\" not found")))?,
        None => host.default_output_device().ok_or(PlaybackError::NoDevice)?,
    };

    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError::Device(e.to_string()))?;
    let sample_format = supported.sample_format();
    let channels = supported.channels() as usize;
    let rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let on_error = |err: cpal::StreamError| {
        log::error!("cpal output stream error: {err}");
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match mixer.lock() {
                Ok(mut m) => m.render(data, channels),
                Err(_) => data.fill(0.0),
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    match mixer.lock() {
                        Ok(mut m) => m.render(&mut scratch, channels),
                        Err(_) => scratch.fill(0.0),
                    }
                    for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                        *dst = (src * 32_767.0) as i16;
                    }
                },
                on_error,
                None,
            )
        }
        other => {
            return Err(PlaybackError::Device(format!(
                "unsupported output sample format {other:?}"
            )))
        }
    }
    .map_err(|e| PlaybackError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::Device(e.to_string()))?;
    Ok((stream, rate))
}

// ---------------------------------------------------------------------------
// SpeakerSink
// ---------------------------------------------------------------------------

struct SpeakerSink {
    mixer: Arc<Mutex<Mixer>>,
    device_rate: u32,
    next_id: u64,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioSink for SpeakerSink {
    fn now(&self) -> f64 {
        let frames = self.mixer.lock().map(|m| m.clock_frames()).unwrap_or(0);
        frames as f64 / self.device_rate as f64
    }

    fn play_at(&mut self, buffer: SampleBuffer, start: f64) -> SegmentHandle {
        self.next_id += 1;
        let handle = SegmentHandle(self.next_id);

        let samples = resample(&buffer.to_mono(), buffer.sample_rate, self.device_rate);
        let start_frame = (start * self.device_rate as f64).round() as u64;
        if let Ok(mut m) = self.mixer.lock() {
            m.add(handle, start_frame, samples);
        }
        handle
    }

    fn stop(&mut self, handle: SegmentHandle) {
        if let Ok(mut m) = self.mixer.lock() {
            m.remove(handle);
        }
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
