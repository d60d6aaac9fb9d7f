//! Gap-free scheduling of server speech with hard interruption.
//!
//! The speech service streams its reply as many short PCM segments.
//! [`PlaybackScheduler`] places each one on the output clock immediately
//! after the previous one:
//!
//! ```text
//! start = max(next_start, sink.now())
//! next_start = start + duration
//! ```
//!
//! so segments play back-to-back in arrival order, and a segment that
//! arrives late (after the cursor has fallen behind the clock) starts "now"
//! instead of in the past.  [`interrupt`](PlaybackScheduler::interrupt) stops
//! everything that is scheduled or playing.  The cursor is left alone on
//! interrupt; once it lies in the past the `max` makes it irrelevant.
//!
//! The scheduler is owned by a single voice session task and is the only
//! writer of its active set.

use thiserror::Error;

use super::codec::{decode_frame, CodecError, SampleBuffer};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the playback path.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The segment payload could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No output device is available.
    #[error("no output device found on the default audio host")]
    NoDevice,

    /// The output device could not be opened or started.
    #[error("audio output failed: {0}")]
    Device(String),
}

// ---------------------------------------------------------------------------
// AudioSink / AudioOutput
// ---------------------------------------------------------------------------

/// Opaque identifier of a scheduled segment on a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentHandle(pub u64);

/// An output device with its own monotonic playback clock.
pub trait AudioSink: Send {
    /// Current playback clock time in seconds.
    fn now(&self) -> f64;

    /// Schedule `buffer` to start at clock time `start` (seconds).
    fn play_at(&mut self, buffer: SampleBuffer, start: f64) -> SegmentHandle;

    /// Stop a segment immediately, whether it has started or not.
    fn stop(&mut self, handle: SegmentHandle);
}

/// Factory for [`AudioSink`]s, one per voice session.
pub trait AudioOutput: Send + Sync {
    fn open(&self) -> Result<Box<dyn AudioSink>, PlaybackError>;
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Where a segment landed on the playback clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub handle: SegmentHandle,
    pub start: f64,
    pub duration: f64,
}

impl ScheduledSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Orders decoded speech segments on an [`AudioSink`].
pub struct PlaybackScheduler {
    sink: Box<dyn AudioSink>,
    sample_rate: u32,
    channels: u16,
    next_start: f64,
    active: Vec<ScheduledSegment>,
}

impl PlaybackScheduler {
    /// Create a scheduler for segments encoded at `sample_rate` Hz with
    /// `channels` interleaved channels (24 kHz mono for the speech service).
    pub fn new(sink: Box<dyn AudioSink>, sample_rate: u32, channels: u16) -> Self {
        Self {
            sink,
            sample_rate,
            channels,
            next_start: 0.0,
            active: Vec::new(),
        }
    }

    /// Decode `payload` and schedule it right after the previous segment.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::Codec`] when the payload is malformed; nothing is
    /// scheduled and the cursor does not move.
    pub fn enqueue(&mut self, payload: &str) -> Result<ScheduledSegment, PlaybackError> {
        let buffer = decode_frame(payload, self.sample_rate, self.channels)?;
        Ok(self.schedule(buffer))
    }

    /// Schedule an already-decoded buffer.
    pub fn schedule(&mut self, buffer: SampleBuffer) -> ScheduledSegment {
        let now = self.sink.now();
        self.prune(now);

        let start = self.next_start.max(now);
        let duration = buffer.duration_secs();
        let handle = self.sink.play_at(buffer, start);
        self.next_start = start + duration;

        let segment = ScheduledSegment {
            handle,
            start,
            duration,
        };
        self.active.push(segment);
        log::trace!("playback: segment {:?} at {start:.3}s for {duration:.3}s", handle);
        segment
    }

    /// Stop every scheduled or playing segment.
    ///
    /// Returns the number of segments that were stopped.
    pub fn interrupt(&mut self) -> usize {
        let now = self.sink.now();
        self.prune(now);

        let stopped = self.active.len();
        for segment in self.active.drain(..) {
            self.sink.stop(segment.handle);
        }
        if stopped > 0 {
            log::debug!("playback: interrupted {stopped} segment(s)");
        }
        stopped
    }

    /// Number of segments that have not finished yet.
    pub fn active_count(&mut self) -> usize {
        let now = self.sink.now();
        self.prune(now);
        self.active.len()
    }

    /// Earliest time the next segment may start.
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Current playback clock time.
    pub fn now(&self) -> f64 {
        self.sink.now()
    }

    /// Forget segments that ended naturally.
    fn prune(&mut self, now: f64) {
        self.active.retain(|s| s.end() > now);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
