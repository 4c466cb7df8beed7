//! Timestamp refiner.
//!
//! Two passes per job:
//!
//! 1. **Boundary search** (needs decodable audio): segments are visited in
//!    chronological order and each boundary snaps to the quietest energy
//!    frame inside a ±window. The start window is floored at the previous
//!    segment's refined end and the end window is capped at the next
//!    segment's original start, so refined neighbours never cross.
//! 2. **Timing synthesis**: word timings are normalized when present and
//!    spread evenly over the tokens otherwise; CJK text also gets
//!    character timings.
//!
//! Audio problems only disable pass 1. The refiner never fails and always
//! returns exactly as many segments as it was given.

pub mod analysis;
pub mod timing;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RefineConfig;
use crate::segment::EnhancedSegment;

pub use analysis::{AnalysisCache, AudioAnalysis};
use timing::{contains_cjk, detect_language, normalize_words, synthesize_chars, synthesize_words, tokenize};

/// Label appended to every refined segment.
pub const REFINE_LABEL: &str = "timestamp_refine";
/// `alignment_model` when boundaries were searched against the waveform.
pub const ENERGY_ALIGNMENT: &str = "rms-energy-boundary";
/// `alignment_model` when only proportional synthesis ran.
pub const PROPORTIONAL_ALIGNMENT: &str = "proportional-synthesis";

/// Boundaries that move less than this are not counted as adjusted.
const ADJUST_EPSILON: f64 = 0.001;

/// Per-call counters, surfaced in the component metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineStats {
    pub boundary_search: bool,
    pub adjusted_starts: usize,
    pub adjusted_ends: usize,
    /// Segments that received synthesized word timings.
    pub words_synthesized: usize,
    /// Segments that received synthesized character timings.
    pub chars_synthesized: usize,
}

#[derive(Debug, Clone)]
pub struct TimestampRefiner {
    config: RefineConfig,
    cache: Arc<AnalysisCache>,
}

impl TimestampRefiner {
    pub fn new(config: RefineConfig, cache: Arc<AnalysisCache>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Energy analysis and synthesis are pure Rust.
    pub fn is_available(&self) -> bool {
        true
    }

    pub fn refine(
        &self,
        segments: &[EnhancedSegment],
        audio_path: Option<&Path>,
        language: Option<&str>,
    ) -> (Vec<EnhancedSegment>, RefineStats) {
        let mut out = segments.to_vec();
        let mut stats = RefineStats::default();

        if let Some(analysis) = self.load_analysis(audio_path) {
            stats.boundary_search = true;
            self.refine_boundaries(&mut out, &analysis, &mut stats);
        }

        let alignment = if stats.boundary_search {
            ENERGY_ALIGNMENT
        } else {
            PROPORTIONAL_ALIGNMENT
        };
        for seg in &mut out {
            self.fill_timings(seg, language, &mut stats);
            seg.alignment_model = Some(alignment.to_string());
            seg.tag(REFINE_LABEL);
        }

        debug!(
            segments = out.len(),
            boundary_search = stats.boundary_search,
            adjusted_starts = stats.adjusted_starts,
            adjusted_ends = stats.adjusted_ends,
            "timestamps refined"
        );
        (out, stats)
    }

    fn load_analysis(&self, audio_path: Option<&Path>) -> Option<Arc<AudioAnalysis>> {
        if self.config.search_window_ms == 0 {
            return None;
        }
        let path = audio_path?;
        match self
            .cache
            .get_or_analyze(path, self.config.frame_size, self.config.hop_size)
        {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!("boundary search disabled: {e}");
                None
            }
        }
    }

    /// Left-to-right cascade over segments in chronological order. Output
    /// order is the input order; only `start`/`end` change.
    fn refine_boundaries(
        &self,
        segments: &mut [EnhancedSegment],
        analysis: &AudioAnalysis,
        stats: &mut RefineStats,
    ) {
        let window = self.config.search_window_secs();
        let original: Vec<(f64, f64)> = segments.iter().map(|s| (s.start, s.end)).collect();

        let mut order: Vec<usize> = (0..segments.len())
            .filter(|&i| original[i].0.is_finite() && original[i].1.is_finite())
            .collect();
        order.sort_by(|&a, &b| {
            original[a]
                .0
                .total_cmp(&original[b].0)
                .then(original[a].1.total_cmp(&original[b].1))
        });

        let mut prev_end = 0.0f64;
        for (pos, &idx) in order.iter().enumerate() {
            let (orig_start, orig_end) = original[idx];
            let next_start = order
                .get(pos + 1)
                .map_or(f64::INFINITY, |&next| original[next].0);

            let start_lo = (orig_start - window).max(prev_end).max(0.0);
            let start_hi = (orig_start + window).min(orig_end);
            let new_start = analysis
                .quietest_between(start_lo, start_hi, orig_start)
                .unwrap_or(orig_start);

            let end_lo = (orig_end - window).max(new_start);
            let end_hi = (orig_end + window)
                .min(next_start)
                .min(analysis.duration_secs);
            let new_end = analysis
                .quietest_between(end_lo, end_hi, orig_end)
                .unwrap_or(orig_end)
                .max(new_start);

            if (new_start - orig_start).abs() > ADJUST_EPSILON {
                stats.adjusted_starts += 1;
            }
            if (new_end - orig_end).abs() > ADJUST_EPSILON {
                stats.adjusted_ends += 1;
            }

            let seg = &mut segments[idx];
            seg.start = new_start;
            seg.end = new_end;
            prev_end = prev_end.max(new_end);
        }
    }

    fn fill_timings(&self, seg: &mut EnhancedSegment, hint: Option<&str>, stats: &mut RefineStats) {
        let lang = detect_language(&seg.text, hint, &self.config.default_language);

        match seg.words.take() {
            Some(mut words) if !words.is_empty() => {
                normalize_words(seg, &mut words);
                seg.words = Some(words);
            }
            _ => {
                let words = synthesize_words(seg, tokenize(&seg.text), &lang);
                if !words.is_empty() {
                    stats.words_synthesized += 1;
                    seg.words = Some(words);
                }
            }
        }

        if seg.has_chars() {
            seg.clamp_timings();
        } else if contains_cjk(&seg.text) {
            let chars = synthesize_chars(seg, seg.words.as_deref(), &lang);
            if !chars.is_empty() {
                stats.chars_synthesized += 1;
                seg.chars = Some(chars);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::write_sections;
    use crate::segment::WordTiming;
    use std::path::PathBuf;

    fn refiner() -> TimestampRefiner {
        TimestampRefiner::new(RefineConfig::default(), Arc::new(AnalysisCache::new()))
    }

    /// Speech at 1–3 s and 4–6 s, silence elsewhere, 7 s total.
    fn two_utterances(dir: &Path) -> PathBuf {
        write_sections(
            dir,
            "job.wav",
            16_000,
            &[(1.0, 0.0), (2.0, 0.4), (1.0, 0.0), (2.0, 0.4), (1.0, 0.0)],
        )
    }

    #[test]
    fn boundaries_move_towards_silence() {
        let dir = tempfile::tempdir().unwrap();
        let path = two_utterances(dir.path());
        let segs = vec![EnhancedSegment::new(1.15, 2.85, "hello there")];

        let (out, stats) = refiner().refine(&segs, Some(path.as_path()), None);
        assert!(stats.boundary_search);
        assert!(out[0].start < 1.0, "start {}", out[0].start);
        assert!(out[0].end > 3.0, "end {}", out[0].end);
        approx::assert_abs_diff_eq!(out[0].start, 0.96, epsilon = 0.04);
        approx::assert_abs_diff_eq!(out[0].end, 3.04, epsilon = 0.04);
        assert_eq!(stats.adjusted_starts, 1);
        assert_eq!(stats.adjusted_ends, 1);
        assert_eq!(out[0].alignment_model.as_deref(), Some(ENERGY_ALIGNMENT));
    }

    #[test]
    fn adjacent_boundaries_never_cross() {
        let dir = tempfile::tempdir().unwrap();
        let path = two_utterances(dir.path());
        let segs = vec![
            EnhancedSegment::new(1.0, 3.5, "first"),
            EnhancedSegment::new(3.5, 6.0, "second"),
        ];
        let (out, _) = refiner().refine(&segs, Some(path.as_path()), None);
        assert!(out[0].end <= out[1].start, "{out:?}");
        assert!(out.iter().all(|s| s.start <= s.end));
    }

    #[test]
    fn output_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = two_utterances(dir.path());
        let segs = vec![
            EnhancedSegment::new(4.0, 6.0, "later"),
            EnhancedSegment::new(1.0, 3.0, "earlier"),
        ];
        let (out, _) = refiner().refine(&segs, Some(path.as_path()), None);
        assert_eq!(out[0].text, "later");
        assert_eq!(out[1].text, "earlier");
        assert!(out[1].end <= out[0].start);
    }

    #[test]
    fn rejected_path_degrades_to_synthesis() {
        let segs = vec![
            EnhancedSegment::new(0.0, 2.0, "hello world"),
            EnhancedSegment::new(2.0, 3.0, "你好"),
        ];
        let (out, stats) = refiner().refine(&segs, Some(Path::new("relative/job.wav")), None);
        assert_eq!(out.len(), 2);
        assert!(!stats.boundary_search);
        assert_eq!(out[0].start, 0.0);
        assert_eq!(out[0].words.as_ref().unwrap().len(), 2);
        assert!(out[0].chars.is_none());
        assert_eq!(out[1].chars.as_ref().unwrap().len(), 2);
        assert_eq!(stats.words_synthesized, 2);
        assert_eq!(stats.chars_synthesized, 1);
        assert!(out
            .iter()
            .all(|s| s.alignment_model.as_deref() == Some(PROPORTIONAL_ALIGNMENT)
                && s.enhancements_applied == vec![REFINE_LABEL]));
    }

    #[test]
    fn existing_words_are_clamped_not_replaced() {
        let mut seg = EnhancedSegment::new(0.0, 1.0, "hi there");
        seg.words = Some(vec![
            WordTiming {
                text: "there".into(),
                start: 0.6,
                end: 1.4,
                score: 0.8,
                language: None,
            },
            WordTiming {
                text: "hi".into(),
                start: 0.1,
                end: 0.4,
                score: 0.9,
                language: None,
            },
        ]);
        let (out, stats) = refiner().refine(&[seg], None, Some("en"));
        let words = out[0].words.as_ref().unwrap();
        assert_eq!(stats.words_synthesized, 0);
        assert_eq!(words[0].text, "hi");
        assert_eq!(words[1].end, 1.0);
    }

    #[test]
    fn empty_input_is_fine() {
        let (out, stats) = refiner().refine(&[], None, None);
        assert!(out.is_empty());
        assert_eq!(stats, RefineStats::default());
    }
}
