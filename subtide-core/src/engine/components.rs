//! [`Enhancer`] adapters for the three built-in stages.

use crate::config::{RefineConfig, SplitConfig, VadConfig};
use crate::error::Result;
use crate::refine::TimestampRefiner;
use crate::segment::EnhancedSegment;
use crate::split::SegmentSplitter;
use crate::vad::SpeechActivityCoordinator;

use super::{ComponentDetail, Enhancer, JobContext, SharedResources};

pub struct VadEnhancer {
    coordinator: SpeechActivityCoordinator,
}

impl VadEnhancer {
    pub fn new(coordinator: SpeechActivityCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn from_config(cfg: &VadConfig, shared: &SharedResources) -> Self {
        Self::new(SpeechActivityCoordinator::from_config(cfg, shared.silero.clone()))
    }
}

impl Enhancer for VadEnhancer {
    fn name(&self) -> &'static str {
        "vad"
    }

    fn is_available(&self) -> bool {
        self.coordinator.is_available()
    }

    fn process(
        &self,
        segments: &[EnhancedSegment],
        job: &JobContext,
    ) -> Result<(Vec<EnhancedSegment>, ComponentDetail)> {
        let outcome = self
            .coordinator
            .process_segments(segments, job.audio_path.as_deref());
        let kept = outcome.segments.len();
        let detail = ComponentDetail::Vad {
            engine: outcome.engine.map(str::to_string),
            spans: outcome.span_count,
            input: segments.len(),
            kept,
            dropped: segments.len().saturating_sub(kept),
        };
        Ok((outcome.segments, detail))
    }
}

pub struct RefineEnhancer {
    refiner: TimestampRefiner,
}

impl RefineEnhancer {
    pub fn new(refiner: TimestampRefiner) -> Self {
        Self { refiner }
    }

    pub fn from_config(cfg: &RefineConfig, shared: &SharedResources) -> Self {
        Self::new(TimestampRefiner::new(cfg.clone(), shared.analysis.clone()))
    }
}

impl Enhancer for RefineEnhancer {
    fn name(&self) -> &'static str {
        "refine"
    }

    fn is_available(&self) -> bool {
        self.refiner.is_available()
    }

    fn process(
        &self,
        segments: &[EnhancedSegment],
        job: &JobContext,
    ) -> Result<(Vec<EnhancedSegment>, ComponentDetail)> {
        let (out, stats) = self.refiner.refine(
            segments,
            job.audio_path.as_deref(),
            job.language.as_deref(),
        );
        Ok((out, ComponentDetail::Refine(stats)))
    }
}

pub struct SplitEnhancer {
    splitter: SegmentSplitter,
}

impl SplitEnhancer {
    pub fn new(splitter: SegmentSplitter) -> Self {
        Self { splitter }
    }

    pub fn from_config(cfg: &SplitConfig) -> Self {
        Self::new(SegmentSplitter::new(cfg.clone()))
    }
}

impl Enhancer for SplitEnhancer {
    fn name(&self) -> &'static str {
        "split"
    }

    fn is_available(&self) -> bool {
        self.splitter.is_available()
    }

    fn process(
        &self,
        segments: &[EnhancedSegment],
        job: &JobContext,
    ) -> Result<(Vec<EnhancedSegment>, ComponentDetail)> {
        let (out, metrics) = self.splitter.process(segments, &job.pause_times);
        Ok((out, ComponentDetail::Split(metrics)))
    }
}
