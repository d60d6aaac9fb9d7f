//! Fixed-size block assembly for outbound microphone audio.
//!
//! The capture callback delivers buffers of arbitrary length; the speech
//! service is fed blocks of a fixed size (4096 samples at 16 kHz by default,
//! ~256 ms).  [`FrameAssembler`] accumulates mono samples and hands back one
//! encoded [`WireFrame`] per complete block.  Unlike a ring buffer it never
//! overwrites: every sample ends up in exactly one frame, in order.
//!
//! ```rust
//! use nano_edit::audio::FrameAssembler;
//!
//! let mut asm = FrameAssembler::new(4, 16_000);
//! assert!(asm.push(&[0.0, 0.1, 0.2]).is_empty());
//! let frames = asm.push(&[0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
//! assert_eq!(frames.len(), 2);
//! assert_eq!(asm.pending(), 1);
//! ```

use super::codec::encode_frame;

// ---------------------------------------------------------------------------
// WireFrame
// ---------------------------------------------------------------------------

/// One transport-encoded block of microphone audio, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct WireFrame {
    /// MIME type announced to the service, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
    /// Base64 PCM16 LE payload.
    pub data: String,
}

impl WireFrame {
    /// Encode a mono block recorded at `sample_rate` Hz.
    pub fn from_mono(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            mime_type: pcm_mime_type(sample_rate),
            // Mono input is always a whole number of frames.
            data: encode_frame(samples, 1).unwrap_or_default(),
        }
    }
}

/// MIME type for raw PCM16 at the given rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Accumulates mono samples into fixed-size [`WireFrame`]s.
pub struct FrameAssembler {
    pending: Vec<f32>,
    block_size: usize,
    sample_rate: u32,
}

impl FrameAssembler {
    /// Create an assembler emitting blocks of `block_size` samples recorded
    /// at `sample_rate` Hz.
    ///
    /// # Panics
    ///
    /// Panics if `block_size == 0`.
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        assert!(block_size > 0, "FrameAssembler block size must be > 0");
        Self {
            pending: Vec::with_capacity(block_size * 2),
            block_size,
            sample_rate,
        }
    }

    /// Append `samples` and return every block completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<WireFrame> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.block_size;
        if complete == 0 {
            return Vec::new();
        }

        let frames = self
            .pending
            .chunks_exact(self.block_size)
            .map(|block| WireFrame::from_mono(block, self.sample_rate))
            .collect();
        self.pending.drain(..complete * self.block_size);
        frames
    }

    /// Samples waiting for the next block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
