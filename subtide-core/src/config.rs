//! Enhancement configuration (JSON, camelCase, every field optional).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SubtideError};

/// Default ordered component list.
pub const DEFAULT_PIPELINE: &str = "vad,refine,split";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EnhancementConfig {
    /// Ordered, comma-separated subset of `vad`, `refine`, `split`.
    /// An empty string builds a no-op pipeline.
    pub pipeline: String,
    pub vad: VadConfig,
    pub refine: RefineConfig,
    pub split: SplitConfig,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            pipeline: DEFAULT_PIPELINE.into(),
            vad: VadConfig::default(),
            refine: RefineConfig::default(),
            split: SplitConfig::default(),
        }
    }
}

impl EnhancementConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut cfg: Self = serde_json::from_str(json)?;
        cfg.normalize();
        Ok(cfg)
    }

    pub fn normalize(&mut self) {
        self.pipeline = self.pipeline.trim().to_ascii_lowercase();
        self.vad.normalize();
        self.refine.normalize();
        self.split.normalize();
    }

    /// Component names in configured order, blanks removed.
    pub fn component_names(&self) -> Vec<String> {
        self.pipeline
            .split(',')
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// VAD
// ---------------------------------------------------------------------------

/// Engine preference for the speech-activity coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadEngineKind {
    /// Neural first, heuristic fallback.
    #[default]
    Auto,
    /// Neural, then heuristic fallback.
    Silero,
    /// Heuristic only.
    Webrtc,
}

impl std::str::FromStr for VadEngineKind {
    type Err = SubtideError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "silero" => Ok(Self::Silero),
            "webrtc" => Ok(Self::Webrtc),
            other => Err(SubtideError::Configuration(format!(
                "unknown vad engine '{other}' (expected auto|silero|webrtc)"
            ))),
        }
    }
}

/// Frame classifier used by the heuristic engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameClassifierChoice {
    /// GMM classifier when compiled in, energy otherwise.
    #[default]
    Auto,
    /// RMS threshold only.
    Energy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct VadConfig {
    pub engine: VadEngineKind,
    pub classifier: FrameClassifierChoice,
    /// Segments at least this long (seconds) with no speech overlap are dropped.
    pub min_silence_duration: f64,
    /// Heuristic frame length in ms (10, 20 or 30).
    pub frame_ms: u32,
    /// Speech runs shorter than this are discarded (ms).
    pub min_speech_ms: u32,
    /// Gaps up to this long between speech runs are bridged (ms).
    pub max_silence_ms: u32,
    /// RMS threshold for the energy frame classifier.
    pub energy_threshold: f32,
    /// Neural speech-probability onset threshold.
    pub onset_threshold: f32,
    /// Neural speech-probability offset threshold (`<= onset`).
    pub offset_threshold: f32,
    /// Override path for the Silero VAD ONNX model.
    pub silero_model_path: Option<PathBuf>,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            engine: VadEngineKind::Auto,
            classifier: FrameClassifierChoice::Auto,
            min_silence_duration: 0.5,
            frame_ms: 30,
            min_speech_ms: 300,
            max_silence_ms: 500,
            energy_threshold: 0.01,
            onset_threshold: 0.5,
            offset_threshold: 0.35,
            silero_model_path: None,
        }
    }
}

impl VadConfig {
    pub fn normalize(&mut self) {
        self.min_silence_duration = self.min_silence_duration.clamp(0.0, 60.0);
        // earshot only accepts 10/20/30 ms frames
        self.frame_ms = match self.frame_ms {
            0..=14 => 10,
            15..=24 => 20,
            _ => 30,
        };
        self.min_speech_ms = self.min_speech_ms.min(10_000);
        self.max_silence_ms = self.max_silence_ms.min(10_000);
        self.energy_threshold = self.energy_threshold.clamp(0.0, 1.0);
        self.onset_threshold = self.onset_threshold.clamp(0.01, 0.99);
        self.offset_threshold = self.offset_threshold.clamp(0.0, self.onset_threshold);
        self.silero_model_path = self
            .silero_model_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
    }
}

// ---------------------------------------------------------------------------
// Refiner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct RefineConfig {
    /// Half-width of the boundary search window (ms).
    pub search_window_ms: u32,
    /// RMS frame length in samples.
    pub frame_size: usize,
    /// RMS hop length in samples.
    pub hop_size: usize,
    /// Language assumed when neither a hint nor CJK text is present.
    pub default_language: String,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            search_window_ms: 200,
            frame_size: 2048,
            hop_size: 512,
            default_language: "en".into(),
        }
    }
}

impl RefineConfig {
    pub fn normalize(&mut self) {
        self.search_window_ms = self.search_window_ms.min(5_000);
        self.frame_size = self.frame_size.clamp(16, 1 << 16);
        self.hop_size = self.hop_size.clamp(1, self.frame_size);
        self.default_language = self.default_language.trim().to_ascii_lowercase();
        if self.default_language.is_empty() {
            self.default_language = "en".into();
        }
    }

    pub fn search_window_secs(&self) -> f64 {
        self.search_window_ms as f64 / 1000.0
    }
}

// ---------------------------------------------------------------------------
// Splitter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SplitConfig {
    pub enabled: bool,
    /// Maximum output duration in seconds.
    pub max_duration: f64,
    /// Maximum output text length in characters.
    pub max_chars: usize,
    /// Segments shorter than this (seconds) are merge candidates.
    pub min_duration: f64,
    /// Speech seconds per character, used for zero-length segments.
    pub char_duration_sec: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_duration: 7.0,
            max_chars: 200,
            min_duration: 1.0,
            char_duration_sec: 0.25,
        }
    }
}

impl SplitConfig {
    pub fn normalize(&mut self) {
        self.max_duration = self.max_duration.clamp(0.5, 600.0);
        self.max_chars = self.max_chars.clamp(1, 100_000);
        self.min_duration = self.min_duration.clamp(0.0, self.max_duration);
        self.char_duration_sec = self.char_duration_sec.clamp(0.01, 5.0);
    }
}
