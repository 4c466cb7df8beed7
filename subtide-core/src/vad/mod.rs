//! Voice Activity Detection (VAD) over whole audio files.
//!
//! Two abstractions live here:
//!
//! - [`SpeechDetector`]: a complete engine that maps an audio file to
//!   ascending, non-overlapping [`SpeechSpan`]s. The coordinator picks one
//!   by preference order and availability.
//! - [`FrameClassifier`]: a per-frame speech/silence decision used by the
//!   heuristic engine. Swap in `EnergyClassifier` or the earshot-backed
//!   classifier without touching span construction.
//!
//! An empty span list means "no determination", never "confirmed silence".

pub mod coordinator;
pub mod energy;
pub mod silero;
pub mod webrtc;

#[cfg(feature = "vad-earshot")]
pub mod earshot_gmm;

pub use coordinator::SpeechActivityCoordinator;
pub use energy::EnergyClassifier;
pub use silero::{probabilities_to_spans, SileroEngine, SileroHandle, SpanParams};
pub use webrtc::{ClassifierKind, WebRtcVad};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::segment::EnhancedSegment;

/// A contiguous interval (seconds) classified as containing speech.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechSpan {
    pub start: f64,
    pub end: f64,
}

impl SpeechSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Length of the intersection with `[start, end]`, zero when disjoint.
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.end.min(end) - self.start.max(start)).max(0.0)
    }
}

impl From<(f64, f64)> for SpeechSpan {
    fn from((start, end): (f64, f64)) -> Self {
        Self::new(start, end)
    }
}

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Per-frame classifier used by the heuristic engine.
///
/// Implementors may be stateful (smoothing, adaptive noise floors), so a
/// fresh instance is built for every file.
pub trait FrameClassifier: Send {
    /// Sample rate the classifier requires, if any.
    fn required_sample_rate(&self) -> Option<u32>;

    /// Classify exactly one full frame.
    fn classify(&mut self, frame: &[f32]) -> VadDecision;

    /// Reset any internal state.
    fn reset(&mut self);
}

/// Contract for whole-file speech detectors.
pub trait SpeechDetector: Send + Sync {
    /// Stable engine identifier reported in metrics (`"silero"`, `"webrtc"`).
    fn name(&self) -> &'static str;

    /// Dependency/model presence probe. Must not load anything.
    fn is_available(&self) -> bool;

    /// Detect speech spans in `audio_path`.
    ///
    /// Returns ascending, non-overlapping spans. `Ok(vec![])` and `Err(_)` are
    /// both treated as "no determination" by the coordinator.
    fn detect_speech(&self, audio_path: &Path) -> Result<Vec<SpeechSpan>>;
}

/// Turn per-frame decisions into speech spans.
///
/// Contiguous speech frames form raw spans; spans shorter than
/// `min_speech_secs` are dropped, then survivors separated by a gap of at most
/// `max_silence_secs` are merged in one left-to-right pass.
pub fn frames_to_spans(
    decisions: &[VadDecision],
    frame_secs: f64,
    min_speech_secs: f64,
    max_silence_secs: f64,
) -> Vec<SpeechSpan> {
    let mut raw = Vec::new();
    let mut run_start: Option<usize> = None;
    for (idx, decision) in decisions.iter().enumerate() {
        match (decision.is_speech(), run_start) {
            (true, None) => run_start = Some(idx),
            (false, Some(start)) => {
                raw.push(SpeechSpan::new(
                    start as f64 * frame_secs,
                    idx as f64 * frame_secs,
                ));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        raw.push(SpeechSpan::new(
            start as f64 * frame_secs,
            decisions.len() as f64 * frame_secs,
        ));
    }

    // Small epsilon so a run of exactly min_speech frames survives float error.
    let kept = raw
        .into_iter()
        .filter(|span| span.duration() + 1e-9 >= min_speech_secs);

    let mut merged: Vec<SpeechSpan> = Vec::new();
    for span in kept {
        match merged.last_mut() {
            Some(last) if span.start - last.end <= max_silence_secs + 1e-9 => {
                last.end = span.end;
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Drop segments that look like pure silence.
///
/// A segment is dropped only when it lasts at least `min_silence_duration`
/// and overlaps no span at all. Shorter segments are always kept so brief
/// utterances survive a detector miss.
pub fn filter_segments(
    segments: &[EnhancedSegment],
    spans: &[SpeechSpan],
    min_silence_duration: f64,
) -> Vec<EnhancedSegment> {
    segments
        .iter()
        .filter(|seg| {
            seg.duration() < min_silence_duration
                || spans.iter().any(|span| span.overlap(seg.start, seg.end) > 0.0)
        })
        .cloned()
        .collect()
}
