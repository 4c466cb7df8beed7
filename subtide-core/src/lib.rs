//! # subtide-core
//!
//! Post-processing for ASR transcripts: prune silent segments, snap
//! boundaries to the waveform, and reflow segments into subtitle-sized
//! pieces.
//!
//! ## Architecture
//!
//! ```text
//! ASR segments ──► EnhancementPipeline ──────────────────────────────► EnhancedSegments
//!                    │ vad:    SpeechActivityCoordinator (silero → webrtc)
//!                    │ refine: TimestampRefiner (RMS energy, AnalysisCache)
//!                    │ split:  SegmentSplitter (punctuation / pauses, merge pass)
//!                    └──────► PipelineMetrics
//! ```
//!
//! Each job runs synchronously on one thread. Concurrent jobs share only the
//! neural model slot and the energy-analysis cache (see
//! [`engine::SharedResources`]).

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod refine;
pub mod segment;
pub mod split;
pub mod vad;

// Convenience re-exports for downstream crates
pub use config::{
    EnhancementConfig, FrameClassifierChoice, RefineConfig, SplitConfig, VadConfig, VadEngineKind,
};
pub use engine::{
    ComponentDetail, ComponentMetrics, ComponentRegistry, EnhancementPipeline, Enhancer,
    JobContext, PipelineMetrics, SharedResources,
};
pub use error::{Result, SubtideError};
pub use refine::TimestampRefiner;
pub use segment::{CharTiming, EnhancedSegment, Segment, WordTiming};
pub use split::{SegmentSplitter, SplitMetrics};
pub use vad::{SpeechActivityCoordinator, SpeechDetector, SpeechSpan};
