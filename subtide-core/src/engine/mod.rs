//! Enhancement engine: the component contract, job inputs and run metrics.
//!
//! ## Flow
//!
//! ```text
//! EnhancementConfig ──► ComponentRegistry::build() ──► EnhancementPipeline
//!                                                         │
//!   segments + JobContext ──► [vad] ──► [refine] ──► [split] ──► segments
//!                                                         │
//!                                                  PipelineMetrics
//! ```
//!
//! Every stage receives a borrowed slice and returns an owned list, so stage
//! boundaries are always copies. A failing stage is skipped and its input is
//! handed to the next stage unchanged.

pub mod components;
pub mod pipeline;
pub mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::refine::{AnalysisCache, RefineStats};
use crate::segment::EnhancedSegment;
use crate::split::SplitMetrics;
use crate::vad::SileroHandle;

pub use components::{RefineEnhancer, SplitEnhancer, VadEnhancer};
pub use pipeline::EnhancementPipeline;
pub use registry::ComponentRegistry;

/// Per-job inputs that travel alongside the segment list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    /// Audio for the job. Must be absolute; checked before decoding.
    pub audio_path: Option<PathBuf>,
    /// Language hint (`"zh"`, `"ja-JP"`, ...).
    pub language: Option<String>,
    /// Externally detected pauses, absolute seconds, ascending.
    #[serde(default)]
    pub pause_times: Vec<f64>,
}

impl JobContext {
    pub fn new(audio_path: Option<PathBuf>) -> Self {
        Self {
            audio_path,
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language.filter(|l| !l.trim().is_empty());
        self
    }

    /// Attach pause offsets given per input segment (seconds from that
    /// segment's start, indexed like `segments`).
    ///
    /// Offsets are converted to absolute times once, here, so later stages
    /// can drop or move segments without the pauses drifting. Offsets outside
    /// `(0, duration)` are discarded.
    pub fn with_segment_pauses(mut self, segments: &[EnhancedSegment], pauses: &[Vec<f64>]) -> Self {
        for (seg, offsets) in segments.iter().zip(pauses) {
            let duration = seg.duration();
            self.pause_times.extend(
                offsets
                    .iter()
                    .filter(|&&o| o > 0.0 && o < duration)
                    .map(|&o| seg.start + o),
            );
        }
        self.pause_times.sort_by(f64::total_cmp);
        self.pause_times.dedup();
        self
    }
}

/// State shared by every pipeline built from one registry.
#[derive(Debug, Clone, Default)]
pub struct SharedResources {
    pub silero: SileroHandle,
    pub analysis: Arc<AnalysisCache>,
}

impl SharedResources {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One enhancement stage.
///
/// `process` must not mutate its input. An `Err` makes the pipeline skip the
/// stage and record the message; it never aborts the job.
pub trait Enhancer: Send + Sync {
    /// Registry name (`"vad"`, `"refine"`, `"split"`).
    fn name(&self) -> &'static str;

    /// Cheap probe; unavailable stages are skipped.
    fn is_available(&self) -> bool;

    fn process(
        &self,
        segments: &[EnhancedSegment],
        job: &JobContext,
    ) -> Result<(Vec<EnhancedSegment>, ComponentDetail)>;
}

/// Stage-specific counters attached to [`ComponentMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ComponentDetail {
    Vad {
        engine: Option<String>,
        spans: usize,
        input: usize,
        kept: usize,
        dropped: usize,
    },
    Refine(RefineStats),
    Split(SplitMetrics),
    /// Stage did not run (unavailable or failed).
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetrics {
    pub name: String,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub detail: ComponentDetail,
}

impl ComponentMetrics {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// The one structured record emitted per job run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    pub components_configured: usize,
    pub components_executed: usize,
    pub input_segments: usize,
    pub output_segments: usize,
    pub component_metrics: Vec<ComponentMetrics>,
    pub total_duration_ms: f64,
    pub component_names: Vec<String>,
    /// Union of `enhancements_applied` over the output, first-seen order.
    pub enhancements: Vec<String>,
}

impl PipelineMetrics {
    pub fn errors(&self) -> impl Iterator<Item = &ComponentMetrics> {
        self.component_metrics.iter().filter(|m| !m.succeeded())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_pauses_become_absolute_times() {
        let segs = vec![
            EnhancedSegment::new(10.0, 20.0, "a"),
            EnhancedSegment::new(30.0, 32.0, "b"),
        ];
        let job = JobContext::new(None)
            .with_segment_pauses(&segs, &[vec![4.0, 0.0, 11.0], vec![1.5]]);
        assert_eq!(job.pause_times, vec![14.0, 31.5]);
    }

    #[test]
    fn blank_language_hint_is_dropped() {
        let job = JobContext::new(None).with_language(Some("  ".into()));
        assert!(job.language.is_none());
    }

    #[test]
    fn metrics_serialize_with_detail_kind() {
        let m = ComponentMetrics {
            name: "vad".into(),
            duration_ms: 1.5,
            error: None,
            detail: ComponentDetail::Vad {
                engine: Some("webrtc".into()),
                spans: 2,
                input: 3,
                kept: 2,
                dropped: 1,
            },
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"kind\":\"vad\""), "{json}");
        assert!(json.contains("\"durationMs\":1.5"), "{json}");
        assert!(!json.contains("error"), "{json}");
    }
}
