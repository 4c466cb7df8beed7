//! Earshot adapter: WebRTC-style GMM frame classification behind
//! [`FrameClassifier`].

use ::earshot::{VoiceActivityDetector, VoiceActivityProfile};

use super::{FrameClassifier, VadDecision};

/// earshot only predicts on 16 kHz input.
pub const EARSHOT_SAMPLE_RATE: u32 = 16_000;

pub struct EarshotClassifier {
    detector: VoiceActivityDetector,
    scratch: Vec<i16>,
}

fn float_sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * i16::MAX as f32).round() as i16
    } else {
        (clamped * 32_768.0).round() as i16
    }
}

impl EarshotClassifier {
    pub fn new() -> Self {
        Self {
            detector: VoiceActivityDetector::new(VoiceActivityProfile::QUALITY),
            scratch: Vec::new(),
        }
    }
}

impl Default for EarshotClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClassifier for EarshotClassifier {
    fn required_sample_rate(&self) -> Option<u32> {
        Some(EARSHOT_SAMPLE_RATE)
    }

    fn classify(&mut self, frame: &[f32]) -> VadDecision {
        self.scratch.clear();
        self.scratch
            .extend(frame.iter().copied().map(float_sample_to_i16));
        match self.detector.predict_16khz(&self.scratch) {
            Ok(true) => VadDecision::Speech,
            // Unsupported frame lengths count as silence; spans are built
            // only from frames the detector positively accepted.
            Ok(false) | Err(_) => VadDecision::Silence,
        }
    }

    fn reset(&mut self) {
        self.detector.reset();
    }
}
