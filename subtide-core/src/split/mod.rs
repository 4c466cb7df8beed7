//! Segment splitter.
//!
//! Long or wordy segments are cut at punctuation (or, failing that, at
//! externally detected pauses) until every slice fits `max_duration` and
//! `max_chars`. A single merge pass then folds sub-`min_duration`
//! fragments into their successor where the result still fits.
//!
//! A segment with no usable boundary is left as it is. Splitting never cuts
//! blindly in the middle of a word.

pub mod boundaries;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SplitConfig;
use crate::segment::{EnhancedSegment, Timed};

use boundaries::{pause_offsets, punctuation_offsets, select_boundaries};

/// Label appended to every segment leaving the splitter.
pub const SPLIT_LABEL: &str = "segment_split";

/// Recursion guard for slices that still violate the limits.
const MAX_DEPTH: usize = 32;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitMetrics {
    pub enabled: bool,
    pub input_segments: usize,
    pub output_segments: usize,
    /// Input segments that were cut at least once.
    pub segments_split: usize,
    /// Extra segments produced by cutting.
    pub splits_created: usize,
    pub merges: usize,
    /// Fraction of outputs inside `[min_duration, max_duration]` and under
    /// `max_chars`. `1.0` for empty output.
    pub compliance_ratio: f64,
    pub max_duration: f64,
    pub max_chars: usize,
    pub min_duration: f64,
}

#[derive(Debug, Clone)]
pub struct SegmentSplitter {
    config: SplitConfig,
}

impl SegmentSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    pub fn is_available(&self) -> bool {
        true
    }

    /// Duration used for the split trigger. Zero-length segments (no usable
    /// timing from upstream) are estimated from their text length.
    fn effective_duration(&self, seg: &EnhancedSegment) -> f64 {
        if seg.end > seg.start {
            seg.duration()
        } else {
            seg.char_len() as f64 * self.config.char_duration_sec
        }
    }

    pub fn needs_split(&self, seg: &EnhancedSegment) -> bool {
        self.effective_duration(seg) > self.config.max_duration + EPS
            || seg.char_len() > self.config.max_chars
    }

    pub fn is_compliant(&self, seg: &EnhancedSegment) -> bool {
        let d = seg.duration();
        d + EPS >= self.config.min_duration
            && d <= self.config.max_duration + EPS
            && seg.char_len() <= self.config.max_chars
    }

    pub fn compliance_ratio(&self, segments: &[EnhancedSegment]) -> f64 {
        if segments.is_empty() {
            return 1.0;
        }
        let ok = segments.iter().filter(|s| self.is_compliant(s)).count();
        ok as f64 / segments.len() as f64
    }

    /// Split, merge and tag.
    ///
    /// `pauses` are absolute pause times in seconds for the whole job; each
    /// segment only considers the ones strictly inside its own span.
    pub fn process(
        &self,
        segments: &[EnhancedSegment],
        pauses: &[f64],
    ) -> (Vec<EnhancedSegment>, SplitMetrics) {
        let mut metrics = SplitMetrics {
            enabled: self.config.enabled,
            input_segments: segments.len(),
            max_duration: self.config.max_duration,
            max_chars: self.config.max_chars,
            min_duration: self.config.min_duration,
            ..Default::default()
        };

        if !self.config.enabled {
            metrics.output_segments = segments.len();
            metrics.compliance_ratio = self.compliance_ratio(segments);
            return (segments.to_vec(), metrics);
        }

        let mut split = Vec::with_capacity(segments.len());
        for seg in segments {
            let pieces = self.split_segment(seg, pauses, 0);
            if pieces.len() > 1 {
                metrics.segments_split += 1;
                metrics.splits_created += pieces.len() - 1;
            }
            split.extend(pieces);
        }

        let (mut out, merges) = self.merge_short(split);
        for seg in &mut out {
            seg.tag(SPLIT_LABEL);
        }

        metrics.merges = merges;
        metrics.output_segments = out.len();
        metrics.compliance_ratio = self.compliance_ratio(&out);
        debug!(
            input = metrics.input_segments,
            output = metrics.output_segments,
            split = metrics.segments_split,
            merges = metrics.merges,
            compliance = metrics.compliance_ratio,
            "segments split"
        );
        (out, metrics)
    }

    fn split_segment(&self, seg: &EnhancedSegment, pauses: &[f64], depth: usize) -> Vec<EnhancedSegment> {
        if depth >= MAX_DEPTH || !self.needs_split(seg) {
            return vec![seg.clone()];
        }
        let Some(pieces) = split_once(seg, pauses) else {
            return vec![seg.clone()];
        };

        let parent_len = seg.char_len();
        pieces
            .into_iter()
            .flat_map(|piece| {
                if piece.char_len() < parent_len {
                    self.split_segment(&piece, pauses, depth + 1)
                } else {
                    vec![piece]
                }
            })
            .collect()
    }

    /// One left-to-right pass; each merge consumes exactly two segments.
    fn merge_short(&self, segments: Vec<EnhancedSegment>) -> (Vec<EnhancedSegment>, usize) {
        let mut out = Vec::with_capacity(segments.len());
        let mut merges = 0;
        let mut iter = segments.into_iter().peekable();

        while let Some(cur) = iter.next() {
            let mergeable = iter.peek().is_some_and(|next| {
                let chars = cur.char_len() + 1 + next.char_len();
                let mut combined = next.end.max(cur.end) - cur.start.min(next.start);
                if combined <= 0.0 {
                    combined = chars as f64 * self.config.char_duration_sec;
                }
                cur.duration() < self.config.min_duration
                    && combined < self.config.max_duration
                    && chars < self.config.max_chars
            });
            match iter.next_if(|_| mergeable) {
                Some(next) => {
                    out.push(merge_pair(cur, next));
                    merges += 1;
                }
                None => out.push(cur),
            }
        }
        (out, merges)
    }
}

/// Cut `seg` once at the selected boundaries. `None` when no boundary is
/// usable.
fn split_once(seg: &EnhancedSegment, pauses: &[f64]) -> Option<Vec<EnhancedSegment>> {
    let chars: Vec<char> = seg.text.chars().collect();
    let len = chars.len();
    if len < 2 {
        return None;
    }

    let mut candidates = punctuation_offsets(&chars);
    if candidates.is_empty() {
        let local: Vec<f64> = pauses
            .iter()
            .filter(|&&p| p > seg.start && p < seg.end)
            .map(|&p| p - seg.start)
            .collect();
        candidates = pause_offsets(&local, seg.duration(), len);
    }
    if candidates.is_empty() {
        return None;
    }

    let ends = select_boundaries(&candidates, len);
    let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(ends.len());
    let mut prev = 0;
    for end in ends {
        ranges.push((prev, end));
        prev = end;
    }
    // A trailing whitespace-only range belongs to the slice before it.
    if ranges.len() > 1 {
        if let Some(&(a, b)) = ranges.last() {
            if chars[a..b].iter().all(|c| c.is_whitespace()) {
                ranges.pop();
                if let Some(last) = ranges.last_mut() {
                    last.1 = b;
                }
            }
        }
    }
    if ranges.len() < 2 {
        return None;
    }

    Some(slice_segment(seg, &chars, &ranges))
}

/// Where each timing entry sits in the text, by sequential matching of its
/// trimmed text. Whitespace-only entries and entries not found after the
/// previous match map to `None`.
fn locate<'a>(chars: &[char], texts: impl Iterator<Item = &'a str>) -> Vec<Option<usize>> {
    let mut cursor = 0;
    texts
        .map(|text| {
            let needle: Vec<char> = text.trim().chars().collect();
            if needle.is_empty() || needle.len() > chars.len() {
                return None;
            }
            let found = (cursor..=chars.len() - needle.len())
                .find(|&i| chars[i..i + needle.len()] == needle[..]);
            if let Some(pos) = found {
                cursor = pos + needle.len();
            }
            found
        })
        .collect()
}

/// Index of the slice owning an entry: the range containing its text offset,
/// else the proportional time window containing its midpoint, else the last.
fn owner(ranges: &[(usize, usize)], windows: &[(f64, f64)], offset: Option<usize>, midpoint: f64) -> usize {
    let last = ranges.len() - 1;
    if let Some(k) = offset.and_then(|o| ranges.iter().position(|&(a, b)| o >= a && o < b)) {
        return k;
    }
    if !midpoint.is_finite() {
        return last;
    }
    match windows.first() {
        Some(&(lo, _)) if midpoint < lo => 0,
        _ => windows
            .iter()
            .position(|&(lo, hi)| midpoint >= lo && midpoint < hi)
            .unwrap_or(last),
    }
}

fn distribute<T: Clone + Timed>(
    entries: Option<&Vec<T>>,
    positions: &[Option<usize>],
    ranges: &[(usize, usize)],
    windows: &[(f64, f64)],
) -> Vec<Vec<T>> {
    let mut buckets = vec![Vec::new(); ranges.len()];
    for (entry, pos) in entries.into_iter().flatten().zip(positions) {
        let midpoint = (entry.start() + entry.end()) / 2.0;
        buckets[owner(ranges, windows, *pos, midpoint)].push(entry.clone());
    }
    for bucket in &mut buckets {
        bucket.sort_by(|a, b| a.start().total_cmp(&b.start()));
    }
    buckets
}

fn slice_segment(seg: &EnhancedSegment, chars: &[char], ranges: &[(usize, usize)]) -> Vec<EnhancedSegment> {
    let len = chars.len() as f64;
    let (seg_start, seg_end) = (seg.start, seg.end.max(seg.start));
    let span = seg_end - seg_start;
    let at = |offset: usize| seg_start + span * offset as f64 / len;

    let windows: Vec<(f64, f64)> = ranges.iter().map(|&(a, b)| (at(a), at(b))).collect();

    let word_pos = locate(chars, seg.words.iter().flatten().map(|w| w.text.as_str()));
    let char_pos = locate(chars, seg.chars.iter().flatten().map(|c| c.ch.as_str()));

    let word_buckets = distribute(seg.words.as_ref(), &word_pos, ranges, &windows);
    let char_buckets = distribute(seg.chars.as_ref(), &char_pos, ranges, &windows);

    let last = ranges.len() - 1;
    let mut prev_end = seg_start;
    let mut out = Vec::with_capacity(ranges.len());

    for (k, (&(a, b), (words, chs))) in ranges
        .iter()
        .zip(word_buckets.into_iter().zip(char_buckets))
        .enumerate()
    {
        // Character timings are finer, so they win over word timings.
        let anchored: Option<(f64, f64)> = if !chs.is_empty() {
            bounds_of(&chs)
        } else if !words.is_empty() {
            bounds_of(&words)
        } else {
            None
        };
        let (mut start, mut end) = anchored.unwrap_or((at(a), at(b)));
        if k == last {
            end = seg_end;
        }
        start = start.clamp(seg_start, seg_end).max(prev_end);
        end = end.clamp(seg_start, seg_end).max(start);
        prev_end = end;

        let text: String = chars[a..b].iter().collect::<String>().trim().to_string();
        let mut piece = EnhancedSegment {
            start,
            end,
            text,
            words: seg.words.as_ref().and(Some(words)).filter(|w| !w.is_empty()),
            chars: seg.chars.as_ref().and(Some(chs)).filter(|c| !c.is_empty()),
            confidence: seg.confidence,
            speaker: seg.speaker.clone(),
            alignment_model: seg.alignment_model.clone(),
            enhancements_applied: seg.enhancements_applied.clone(),
        };
        piece.clamp_timings();
        out.push(piece);
    }
    out
}

/// `(start, end)` of a bucket sorted by start: the first start and the
/// latest end.
fn bounds_of<T: Timed>(entries: &[T]) -> Option<(f64, f64)> {
    let start = entries.first()?.start();
    let end = entries.iter().map(|e| e.end()).fold(start, f64::max);
    Some((start, end))
}

fn merge_pair(mut cur: EnhancedSegment, next: EnhancedSegment) -> EnhancedSegment {
    cur.start = cur.start.min(next.start);
    cur.end = cur.end.max(next.end);
    cur.text = match (cur.text.trim().is_empty(), next.text.trim().is_empty()) {
        (_, true) => cur.text,
        (true, false) => next.text,
        (false, false) => format!("{} {}", cur.text, next.text),
    };
    cur.words = concat(cur.words, next.words);
    cur.chars = concat(cur.chars, next.chars);
    cur.confidence = match (cur.confidence, next.confidence) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    cur.speaker = cur.speaker.or(next.speaker);
    cur.alignment_model = cur.alignment_model.or(next.alignment_model);
    cur.tag_all(&next.enhancements_applied);
    cur
}

fn concat<T>(a: Option<Vec<T>>, b: Option<Vec<T>>) -> Option<Vec<T>> {
    match (a, b) {
        (Some(mut a), Some(b)) => {
            a.extend(b);
            Some(a)
        }
        (a, b) => a.or(b),
    }
}
