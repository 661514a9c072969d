//! Tap-based tempo estimation.
//!
//! The user taps along to the beat; we stamp each tap on arrival and turn the
//! span between the first and last tap into beats per minute:
//!
//! ```text
//! bpm = ceil(60 * (tap_count - 1) / elapsed_seconds)
//! ```
//!
//! A reset signal throws away the taps collected so far and starts over with
//! a fresh first-tap anchor.

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Taps collected per track unless configured otherwise.
pub const DEFAULT_TAP_COUNT: u32 = 8;

/// A single input event from the tapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapSignal {
    /// A beat, stamped when it arrived
    Tap(Instant),
    /// Discard the taps counted so far
    Reset,
}

/// Errors that can occur while estimating a tempo.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TempoError {
    #[error("Invalid tap timing: {0}")]
    InvalidTiming(String),

    #[error("Input closed before all taps were collected")]
    InputClosed,

    #[error("Failed to read tap input: {0}")]
    Input(String),
}

/// Source of tap signals (the console in production, a script in tests).
#[async_trait]
pub trait TapSource: Send {
    /// Block until the next tap or reset arrives.
    async fn next_signal(&mut self) -> Result<TapSignal, TempoError>;
}

/// Anything that can produce a tempo for the track currently playing.
///
/// The orchestrator only sees this trait, so tests can substitute a spy.
#[async_trait]
pub trait TempoEstimator: Send {
    async fn estimate(&mut self, tap_count: u32) -> Result<u32, TempoError>;
}

/// Estimator driven by a [`TapSource`].
pub struct TapEstimator<S> {
    source: S,
}

impl<S: TapSource> TapEstimator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

#[async_trait]
impl<S: TapSource> TempoEstimator for TapEstimator<S> {
    async fn estimate(&mut self, tap_count: u32) -> Result<u32, TempoError> {
        estimate(&mut self.source, tap_count).await
    }
}

/// Collect `tap_count` taps from `source` and convert them to BPM.
pub async fn estimate<S>(source: &mut S, tap_count: u32) -> Result<u32, TempoError>
where
    S: TapSource + ?Sized,
{
    if tap_count < 2 {
        return Err(TempoError::InvalidTiming(format!(
            "need at least 2 taps to measure an interval, got {}",
            tap_count
        )));
    }

    let mut first: Option<Instant> = None;
    let mut last: Option<Instant> = None;
    let mut counted = 0u32;

    while counted < tap_count {
        match source.next_signal().await? {
            TapSignal::Tap(at) => {
                if first.is_none() {
                    first = Some(at);
                }
                last = Some(at);
                counted += 1;
            }
            TapSignal::Reset => {
                if counted == 0 {
                    tracing::debug!("Reset before first tap ignored");
                    continue;
                }
                tracing::debug!("Tap sequence reset after {} taps", counted);
                first = None;
                last = None;
                counted = 0;
            }
        }
    }

    let (Some(first), Some(last)) = (first, last) else {
        return Err(TempoError::InvalidTiming("no taps recorded".to_string()));
    };
    let elapsed = last
        .checked_duration_since(first)
        .ok_or_else(|| TempoError::InvalidTiming("last tap precedes first tap".to_string()))?;

    bpm_from_elapsed(tap_count, elapsed)
}

/// Convert `tap_count` taps spanning `elapsed` into BPM, rounding up.
pub fn bpm_from_elapsed(tap_count: u32, elapsed: Duration) -> Result<u32, TempoError> {
    if tap_count < 2 {
        return Err(TempoError::InvalidTiming(format!(
            "need at least 2 taps, got {}",
            tap_count
        )));
    }

    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return Err(TempoError::InvalidTiming(
            "taps span zero time".to_string(),
        ));
    }

    let bpm = (60.0 * f64::from(tap_count - 1) / secs).ceil();
    if !bpm.is_finite() || bpm > f64::from(u32::MAX) {
        return Err(TempoError::InvalidTiming(format!(
            "taps {:?} apart give no usable tempo",
            elapsed
        )));
    }

    Ok(bpm as u32)
}
