//! Wire codec for realtime audio: `f32` samples ⇄ base64 PCM16 LE.
//!
//! The speech service exchanges raw signed 16-bit little-endian PCM, base64
//! encoded inside JSON messages.  [`encode_frame`] produces that text from an
//! interleaved `f32` buffer; [`decode_frame`] turns a payload back into a
//! de-interleaved [`SampleBuffer`].
//!
//! ## Clipping
//!
//! Encoding scales by 32 768 and truncates toward zero, saturating at the
//! `i16` range.  A full-scale `1.0` therefore encodes as `32767`, anything
//! beyond `±1.0` clips, and `NaN` encodes as `0`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

/// Scale factor between normalised `f32` samples and PCM16.
const PCM16_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Errors raised while converting audio to or from the wire format.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// The payload cannot be interpreted as PCM16 with the given layout.
    #[error("malformed audio payload: {0}")]
    MalformedPayload(String),
}

// ---------------------------------------------------------------------------
// SampleBuffer
// ---------------------------------------------------------------------------

/// Decoded audio, one `Vec<f32>` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// De-interleaved samples in `[-1.0, 1.0)`; every channel has the same
    /// length.
    pub channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Re-interleave the channels (L R L R …).
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Average all channels into a single mono track.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// encode / decode
// ---------------------------------------------------------------------------

/// Convert interleaved `f32` samples into base64-encoded PCM16 LE.
///
/// # Errors
///
/// [`CodecError::MalformedPayload`] when `channels` is zero or the sample
/// count is not a whole number of frames.
///
/// ```rust
/// use nano_edit::audio::encode_frame;
///
/// // 0.5 → 16384 → [0x00, 0x40]
/// assert_eq!(encode_frame(&[0.5], 1).unwrap(), "AEA=");
/// ```
pub fn encode_frame(samples: &[f32], channels: u16) -> Result<String, CodecError> {
    if channels == 0 {
        return Err(CodecError::MalformedPayload("channel count is zero".into()));
    }
    if samples.len() % channels as usize != 0 {
        return Err(CodecError::MalformedPayload(format!(
            "{} samples is not a multiple of {channels} channels",
            samples.len()
        )));
    }

    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        // `as` saturates and maps NaN to 0.
        let pcm = (s * PCM16_SCALE) as i16;
        bytes.extend_from_slice(&pcm.to_le_bytes());
    }
    Ok(BASE64.encode(bytes))
}

/// Decode a base64 PCM16 LE payload into a de-interleaved [`SampleBuffer`].
///
/// # Errors
///
/// [`CodecError::MalformedPayload`] on invalid base64, zero channels, or a
/// byte length that is not a multiple of `channels * 2`.
pub fn decode_frame(
    payload: &str,
    sample_rate: u32,
    channels: u16,
) -> Result<SampleBuffer, CodecError> {
    if channels == 0 {
        return Err(CodecError::MalformedPayload("channel count is zero".into()));
    }

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| CodecError::MalformedPayload(format!("invalid base64: {e}")))?;

    let frame_bytes = channels as usize * 2;
    if bytes.len() % frame_bytes != 0 {
        return Err(CodecError::MalformedPayload(format!(
            "{} bytes is not a multiple of {frame_bytes}",
            bytes.len()
        )));
    }

    let frames = bytes.len() / frame_bytes;
    let mut out = vec![Vec::with_capacity(frames); channels as usize];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let pcm = i16::from_le_bytes([pair[0], pair[1]]);
        out[i % channels as usize].push(pcm as f32 / PCM16_SCALE);
    }

    Ok(SampleBuffer {
        sample_rate,
        channels: out,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
