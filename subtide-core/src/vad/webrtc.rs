//! Heuristic frame-classifier engine (`"webrtc"`).
//!
//! ## Algorithm
//!
//! 1. Decode the file to mono and resample if the classifier needs a fixed rate.
//! 2. Cut the waveform into fixed frames (default 30 ms). A partial trailing
//!    frame is dropped, never classified.
//! 3. Classify each frame, then hand the decisions to [`frames_to_spans`]
//!    for minimum-speech filtering and short-gap merging.

use std::path::Path;

use tracing::debug;

use super::{frames_to_spans, EnergyClassifier, FrameClassifier, SpeechDetector, SpeechSpan};
use crate::audio::{decode_wav, resample::resample_to, AudioBuffer};
use crate::config::{FrameClassifierChoice, VadConfig};
use crate::error::Result;

/// Which frame classifier the heuristic engine instantiates per file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassifierKind {
    /// earshot's WebRTC-style GMM (16 kHz only).
    #[cfg(feature = "vad-earshot")]
    Earshot,
    /// Plain RMS threshold.
    Energy { threshold: f32 },
}

impl ClassifierKind {
    /// The best classifier compiled into this build.
    pub fn preferred(energy_threshold: f32) -> Self {
        #[cfg(feature = "vad-earshot")]
        {
            let _ = energy_threshold;
            ClassifierKind::Earshot
        }
        #[cfg(not(feature = "vad-earshot"))]
        {
            ClassifierKind::Energy {
                threshold: energy_threshold,
            }
        }
    }

    fn build(self) -> Box<dyn FrameClassifier> {
        match self {
            #[cfg(feature = "vad-earshot")]
            ClassifierKind::Earshot => Box::new(super::earshot_gmm::EarshotClassifier::new()),
            ClassifierKind::Energy { threshold } => Box::new(EnergyClassifier::new(threshold)),
        }
    }
}

/// Frame-classifier speech detector.
#[derive(Debug, Clone)]
pub struct WebRtcVad {
    classifier: ClassifierKind,
    frame_ms: u32,
    min_speech_secs: f64,
    max_silence_secs: f64,
}

impl WebRtcVad {
    pub fn new(
        classifier: ClassifierKind,
        frame_ms: u32,
        min_speech_ms: u32,
        max_silence_ms: u32,
    ) -> Self {
        Self {
            classifier,
            frame_ms: frame_ms.max(1),
            min_speech_secs: min_speech_ms as f64 / 1000.0,
            max_silence_secs: max_silence_ms as f64 / 1000.0,
        }
    }

    pub fn from_config(cfg: &VadConfig) -> Self {
        let classifier = match cfg.classifier {
            FrameClassifierChoice::Auto => ClassifierKind::preferred(cfg.energy_threshold),
            FrameClassifierChoice::Energy => ClassifierKind::Energy {
                threshold: cfg.energy_threshold,
            },
        };
        Self::new(
            classifier,
            cfg.frame_ms,
            cfg.min_speech_ms,
            cfg.max_silence_ms,
        )
    }

    /// Run detection on an already-decoded buffer.
    pub fn detect_in_buffer(&self, buffer: &AudioBuffer) -> Result<Vec<SpeechSpan>> {
        let mut classifier = self.classifier.build();
        let resampled;
        let buffer = match classifier.required_sample_rate() {
            Some(rate) if rate != buffer.sample_rate => {
                resampled = resample_to(buffer, rate)?;
                &resampled
            }
            _ => buffer,
        };
        if buffer.sample_rate == 0 {
            return Ok(Vec::new());
        }

        let frame_len = (buffer.sample_rate as usize * self.frame_ms as usize / 1000).max(1);
        let frame_secs = frame_len as f64 / buffer.sample_rate as f64;

        classifier.reset();
        let decisions: Vec<_> = buffer
            .samples
            .chunks_exact(frame_len)
            .map(|frame| classifier.classify(frame))
            .collect();

        let spans = frames_to_spans(
            &decisions,
            frame_secs,
            self.min_speech_secs,
            self.max_silence_secs,
        );
        debug!(
            frames = decisions.len(),
            speech_frames = decisions.iter().filter(|d| d.is_speech()).count(),
            spans = spans.len(),
            "webrtc vad classified"
        );
        Ok(spans)
    }
}

impl SpeechDetector for WebRtcVad {
    fn name(&self) -> &'static str {
        "webrtc"
    }

    fn is_available(&self) -> bool {
        // Both classifiers are pure Rust; whichever was compiled in works.
        true
    }

    fn detect_speech(&self, audio_path: &Path) -> Result<Vec<SpeechSpan>> {
        let buffer = decode_wav(audio_path)?;
        self.detect_in_buffer(&buffer)
    }
}
