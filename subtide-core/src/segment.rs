//! Segment data model shared by every stage.
//!
//! JSON field names follow the ASR engine's output (`start`, `end`, `text`,
//! `words`, `chars`) so files produced upstream deserialize directly.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input segments
// ---------------------------------------------------------------------------

/// A time-coded text segment as produced by the ASR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds (`end >= start`).
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Timing entries
// ---------------------------------------------------------------------------

/// Word-level timing inside a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    #[serde(alias = "word")]
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(default = "default_score")]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Character-level timing, produced for CJK content only.
///
/// `ch` is a string: upstream aligners may emit a grapheme cluster (a base
/// character plus combining marks) as one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharTiming {
    #[serde(rename = "char")]
    pub ch: String,
    pub start: f64,
    pub end: f64,
    #[serde(default = "default_score")]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

fn default_score() -> f32 {
    1.0
}

/// Anything with a `[start, end]` interval that must stay inside its parent.
pub trait Timed {
    fn start(&self) -> f64;
    fn end(&self) -> f64;
    fn set_bounds(&mut self, start: f64, end: f64);

    /// Clamp into `[lo, hi]`, keeping `end >= start`. NaN collapses to `lo`.
    fn clamp_into(&mut self, lo: f64, hi: f64) {
        let clamp = |v: f64| if v.is_nan() { lo } else { v.clamp(lo, hi) };
        let start = clamp(self.start());
        let end = clamp(self.end()).max(start);
        self.set_bounds(start, end);
    }
}

impl Timed for WordTiming {
    fn start(&self) -> f64 {
        self.start
    }
    fn end(&self) -> f64 {
        self.end
    }
    fn set_bounds(&mut self, start: f64, end: f64) {
        self.start = start;
        self.end = end;
    }
}

impl Timed for CharTiming {
    fn start(&self) -> f64 {
        self.start
    }
    fn end(&self) -> f64 {
        self.end
    }
    fn set_bounds(&mut self, start: f64, end: f64) {
        self.start = start;
        self.end = end;
    }
}

// ---------------------------------------------------------------------------
// Enhanced segments
// ---------------------------------------------------------------------------

/// A segment plus everything the enhancement stages attach to it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnhancedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordTiming>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chars: Option<Vec<CharTiming>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_model: Option<String>,
    /// Ordered, duplicate-free, append-only.
    #[serde(default)]
    pub enhancements_applied: Vec<String>,
}

impl From<Segment> for EnhancedSegment {
    fn from(seg: Segment) -> Self {
        Self {
            start: seg.start,
            end: seg.end,
            text: seg.text,
            ..Default::default()
        }
    }
}

impl From<&Segment> for EnhancedSegment {
    fn from(seg: &Segment) -> Self {
        Self::from(seg.clone())
    }
}

impl EnhancedSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self::from(Segment::new(start, end, text))
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Text length in Unicode scalar values.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn has_words(&self) -> bool {
        self.words.as_ref().is_some_and(|w| !w.is_empty())
    }

    pub fn has_chars(&self) -> bool {
        self.chars.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Append an enhancement label unless it is already present.
    pub fn tag(&mut self, label: &str) {
        if !self.enhancements_applied.iter().any(|l| l == label) {
            self.enhancements_applied.push(label.to_string());
        }
    }

    /// Append every label of `labels` in order, skipping ones already present.
    pub fn tag_all<'a>(&mut self, labels: impl IntoIterator<Item = &'a String>) {
        for label in labels {
            self.tag(label);
        }
    }

    /// Clamp every word/char timing into `[start, end]`.
    pub fn clamp_timings(&mut self) {
        let (lo, hi) = (self.start, self.end.max(self.start));
        for word in self.words.iter_mut().flatten() {
            word.clamp_into(lo, hi);
        }
        for ch in self.chars.iter_mut().flatten() {
            ch.clamp_into(lo, hi);
        }
    }

    /// Strip everything except the base fields.
    pub fn to_segment(&self) -> Segment {
        Segment::new(self.start, self.end, self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_ordered_and_duplicate_free() {
        let mut seg = EnhancedSegment::new(0.0, 1.0, "hi");
        seg.tag("timestamp_refine");
        seg.tag("segment_split");
        seg.tag("timestamp_refine");
        assert_eq!(
            seg.enhancements_applied,
            vec!["timestamp_refine".to_string(), "segment_split".to_string()]
        );
    }

    #[test]
    fn clamp_timings_pulls_entries_inside_parent() {
        let mut seg = EnhancedSegment::new(1.0, 2.0, "a b");
        seg.words = Some(vec![
            WordTiming {
                text: "a".into(),
                start: 0.5,
                end: 1.2,
                score: 1.0,
                language: None,
            },
            WordTiming {
                text: "b".into(),
                start: 1.9,
                end: f64::NAN,
                score: 1.0,
                language: None,
            },
        ]);
        seg.clamp_timings();
        let words = seg.words.unwrap();
        assert_eq!(words[0].start, 1.0);
        assert_eq!(words[0].end, 1.2);
        assert_eq!(words[1].start, 1.9);
        assert_eq!(words[1].end, 1.9);
    }

    #[test]
    fn deserializes_plain_asr_output() {
        let json = r#"[{"start":0.0,"end":1.5,"text":"hello"}]"#;
        let segs: Vec<EnhancedSegment> = serde_json::from_str(json).unwrap();
        assert_eq!(segs[0].text, "hello");
        assert!(segs[0].words.is_none());
        assert!(segs[0].enhancements_applied.is_empty());
    }

    #[test]
    fn char_timing_uses_char_field_name() {
        let ch = CharTiming {
            ch: "好".into(),
            start: 0.0,
            end: 0.1,
            score: 0.9,
            language: Some("zh".into()),
        };
        let json = serde_json::to_string(&ch).unwrap();
        assert!(json.contains("\"char\":\"好\""), "{json}");
    }

    #[test]
    fn char_timing_accepts_grapheme_clusters() {
        let json = r#"{"char": "e\u0301", "start": 0.0, "end": 0.2}"#;
        let ch: CharTiming = serde_json::from_str(json).unwrap();
        assert_eq!(ch.ch, "e\u{301}");
        assert_eq!(ch.score, 1.0);
    }
}
