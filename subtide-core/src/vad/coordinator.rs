//! Picks a speech detector by preference and availability, then prunes
//! segments that lie entirely in silence.

use std::path::Path;

use tracing::{debug, info, warn};

use super::{filter_segments, SileroEngine, SileroHandle, SpeechDetector, WebRtcVad};
use crate::config::{VadConfig, VadEngineKind};
use crate::segment::EnhancedSegment;

/// Label appended to segments that survived VAD filtering.
pub const VAD_LABEL: &str = "vad_filter";

/// Result of one [`SpeechActivityCoordinator::process_segments`] call.
#[derive(Debug, Clone)]
pub struct VadOutcome {
    pub segments: Vec<EnhancedSegment>,
    /// Engine that produced the spans; `None` when no engine was available.
    pub engine: Option<&'static str>,
    /// Number of spans the engine reported (0 = no determination).
    pub span_count: usize,
}

pub struct SpeechActivityCoordinator {
    /// Engines in preference order.
    engines: Vec<Box<dyn SpeechDetector>>,
    min_silence_duration: f64,
}

impl SpeechActivityCoordinator {
    pub fn new(engines: Vec<Box<dyn SpeechDetector>>, min_silence_duration: f64) -> Self {
        Self {
            engines,
            min_silence_duration,
        }
    }

    /// Build the engine list for `cfg.engine`:
    ///
    /// - `auto` / `silero`: neural first, heuristic fallback
    /// - `webrtc`: heuristic only
    pub fn from_config(cfg: &VadConfig, silero: SileroHandle) -> Self {
        let heuristic: Box<dyn SpeechDetector> = Box::new(WebRtcVad::from_config(cfg));
        let engines = match cfg.engine {
            VadEngineKind::Auto | VadEngineKind::Silero => {
                vec![
                    Box::new(SileroEngine::from_config(cfg, silero)) as Box<dyn SpeechDetector>,
                    heuristic,
                ]
            }
            VadEngineKind::Webrtc => vec![heuristic],
        };
        Self::new(engines, cfg.min_silence_duration)
    }

    /// Names of the configured engines, in preference order.
    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// `true` when at least one engine reports available.
    pub fn is_available(&self) -> bool {
        self.engines.iter().any(|e| e.is_available())
    }

    /// First engine whose availability probe passes.
    pub fn select_engine(&self) -> Option<&dyn SpeechDetector> {
        self.engines
            .iter()
            .find(|e| e.is_available())
            .map(|e| e.as_ref())
    }

    /// Detect speech in `audio_path` and drop segments that contain none.
    ///
    /// The input is returned unchanged when no engine is available, when the
    /// path is missing, or when the engine reports zero spans. An empty span
    /// list is never taken as proof that everything is silence.
    pub fn process_segments(
        &self,
        segments: &[EnhancedSegment],
        audio_path: Option<&Path>,
    ) -> VadOutcome {
        let unchanged = |engine, span_count| VadOutcome {
            segments: segments.to_vec(),
            engine,
            span_count,
        };

        let Some(engine) = self.select_engine() else {
            warn!(configured = ?self.engine_names(), "no vad engine available; keeping all segments");
            return unchanged(None, 0);
        };
        let Some(audio_path) = audio_path else {
            warn!(engine = engine.name(), "no audio path for job; keeping all segments");
            return unchanged(Some(engine.name()), 0);
        };

        let spans = match engine.detect_speech(audio_path) {
            Ok(spans) => spans,
            Err(e) => {
                warn!(engine = engine.name(), "speech detection failed: {e}");
                Vec::new()
            }
        };
        if spans.is_empty() {
            info!(
                engine = engine.name(),
                "vad returned no spans; treating as no determination"
            );
            return unchanged(Some(engine.name()), 0);
        }

        let mut kept = filter_segments(segments, &spans, self.min_silence_duration);
        for seg in &mut kept {
            seg.tag(VAD_LABEL);
        }
        debug!(
            engine = engine.name(),
            spans = spans.len(),
            input = segments.len(),
            kept = kept.len(),
            "vad filtered segments"
        );
        VadOutcome {
            segments: kept,
            engine: Some(engine.name()),
            span_count: spans.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SubtideError};
    use crate::vad::SpeechSpan;
    use std::path::PathBuf;

    struct FixedEngine {
        name: &'static str,
        available: bool,
        spans: Result<Vec<SpeechSpan>>,
    }

    impl FixedEngine {
        fn boxed(
            name: &'static str,
            available: bool,
            spans: Result<Vec<SpeechSpan>>,
        ) -> Box<dyn SpeechDetector> {
            Box::new(Self {
                name,
                available,
                spans,
            })
        }
    }

    impl SpeechDetector for FixedEngine {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_available(&self) -> bool {
            self.available
        }
        fn detect_speech(&self, _audio_path: &Path) -> Result<Vec<SpeechSpan>> {
            match &self.spans {
                Ok(spans) => Ok(spans.clone()),
                Err(e) => Err(SubtideError::ComponentExecution {
                    component: "vad",
                    message: e.to_string(),
                }),
            }
        }
    }

    fn segments() -> Vec<EnhancedSegment> {
        vec![
            EnhancedSegment::new(0.0, 2.0, "hello there"),
            EnhancedSegment::new(3.0, 6.0, "thanks for watching"),
        ]
    }

    fn path() -> PathBuf {
        PathBuf::from("/jobs/a.wav")
    }

    #[test]
    fn no_available_engine_returns_input_and_none() {
        let coord = SpeechActivityCoordinator::new(
            vec![
                FixedEngine::boxed("silero", false, Ok(vec![])),
                FixedEngine::boxed("webrtc", false, Ok(vec![])),
            ],
            0.5,
        );
        let out = coord.process_segments(&segments(), Some(path().as_path()));
        assert_eq!(out.engine, None);
        assert_eq!(out.segments, segments());
    }

    #[test]
    fn first_available_engine_wins() {
        let coord = SpeechActivityCoordinator::new(
            vec![
                FixedEngine::boxed("silero", false, Ok(vec![])),
                FixedEngine::boxed("webrtc", true, Ok(vec![SpeechSpan::new(0.1, 1.9)])),
            ],
            0.5,
        );
        let out = coord.process_segments(&segments(), Some(path().as_path()));
        assert_eq!(out.engine, Some("webrtc"));
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].text, "hello there");
        assert_eq!(out.segments[0].enhancements_applied, vec![VAD_LABEL]);
    }

    #[test]
    fn empty_spans_mean_no_determination() {
        let coord = SpeechActivityCoordinator::new(
            vec![FixedEngine::boxed("webrtc", true, Ok(vec![]))],
            0.5,
        );
        let out = coord.process_segments(&segments(), Some(path().as_path()));
        assert_eq!(out.engine, Some("webrtc"));
        assert_eq!(out.segments, segments());
    }

    #[test]
    fn detection_error_keeps_everything() {
        let coord = SpeechActivityCoordinator::new(
            vec![FixedEngine::boxed(
                "webrtc",
                true,
                Err(SubtideError::Configuration("boom".into())),
            )],
            0.5,
        );
        let out = coord.process_segments(&segments(), Some(path().as_path()));
        assert_eq!(out.segments, segments());
        assert_eq!(out.span_count, 0);
    }

    #[test]
    fn engine_order_follows_preference() {
        let mut cfg = VadConfig::default();
        let auto = SpeechActivityCoordinator::from_config(&cfg, SileroHandle::new());
        assert_eq!(auto.engine_names(), vec!["silero", "webrtc"]);

        cfg.engine = VadEngineKind::Webrtc;
        let webrtc = SpeechActivityCoordinator::from_config(&cfg, SileroHandle::new());
        assert_eq!(webrtc.engine_names(), vec!["webrtc"]);
    }

    #[test]
    fn auto_falls_back_to_heuristic_without_model() {
        let cfg = VadConfig {
            silero_model_path: Some(PathBuf::from("/nonexistent/silero.onnx")),
            ..Default::default()
        };
        let coord = SpeechActivityCoordinator::from_config(&cfg, SileroHandle::new());
        assert_eq!(coord.select_engine().map(|e| e.name()), Some("webrtc"));
    }
}
