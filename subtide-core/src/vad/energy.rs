//! Energy-based frame classifier using an RMS threshold.
//!
//! Always available. Used by the heuristic engine when the earshot backend is
//! compiled out, and in tests where a deterministic classifier is wanted.

use super::{FrameClassifier, VadDecision};
use crate::audio::rms;

/// A simple energy-based frame classifier.
#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    /// RMS amplitude threshold. Frames at or above this are speech.
    /// Typical range: 0.005–0.05 for broadcast-level recordings.
    threshold: f32,
}

impl EnergyClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl FrameClassifier for EnergyClassifier {
    fn required_sample_rate(&self) -> Option<u32> {
        None
    }

    fn classify(&mut self, frame: &[f32]) -> VadDecision {
        if !frame.is_empty() && rms(frame) >= self.threshold {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_below_threshold() {
        let mut vad = EnergyClassifier::new(0.02);
        assert_eq!(vad.classify(&[0.0; 480]), VadDecision::Silence);
    }

    #[test]
    fn speech_above_threshold() {
        let mut vad = EnergyClassifier::new(0.02);
        assert_eq!(vad.classify(&[0.5; 480]), VadDecision::Speech);
    }

    #[test]
    fn empty_frame_is_silence() {
        let mut vad = EnergyClassifier::new(0.0);
        assert_eq!(vad.classify(&[]), VadDecision::Silence);
    }
}
