//! Language detection, tokenization and even-split word/char timing.

use crate::segment::{CharTiming, EnhancedSegment, WordTiming};

/// Confidence assigned to synthesized word timings.
pub const SYNTH_WORD_SCORE: f32 = 0.95;
/// Confidence for char timings derived from the whole segment span.
pub const SYNTH_CHAR_SCORE: f32 = 0.9;

pub fn is_han(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FA1F)
}

pub fn is_kana(c: char) -> bool {
    matches!(c as u32, 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9D)
}

pub fn is_hangul(c: char) -> bool {
    matches!(c as u32, 0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF)
}

/// Ideographic, kana or hangul code point.
pub fn is_cjk(c: char) -> bool {
    is_han(c) || is_kana(c) || is_hangul(c)
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

pub fn is_cjk_language(lang: &str) -> bool {
    matches!(lang, "zh" | "ja" | "ko" | "yue" | "cmn" | "wuu")
}

/// Resolve the language for a segment.
///
/// An explicit hint wins (primary subtag, lowercased: `zh-Hans` → `zh`);
/// otherwise kana means `ja`, hangul means `ko`, other ideographs mean `zh`;
/// otherwise `default`.
pub fn detect_language(text: &str, hint: Option<&str>, default: &str) -> String {
    if let Some(hint) = hint {
        let primary = hint
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !primary.is_empty() {
            return primary;
        }
    }
    if text.chars().any(is_kana) {
        "ja".into()
    } else if text.chars().any(is_hangul) {
        "ko".into()
    } else if text.chars().any(is_han) {
        "zh".into()
    } else {
        default.to_string()
    }
}

/// Split text into timing tokens.
///
/// CJK code points are always single-character tokens. Everything else
/// forms runs of word characters (alphanumeric or `_`, plus apostrophes
/// inside a word), split on any other character.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if is_cjk(c) {
            flush(&mut current, &mut tokens);
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else if (c == '\'' || c == '\u{2019}')
            && !current.is_empty()
            && chars.peek().is_some_and(|n| n.is_alphanumeric() && !is_cjk(*n))
        {
            current.push(c);
        } else {
            flush(&mut current, &mut tokens);
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// Spread `tokens` evenly over the segment span.
pub fn synthesize_words(seg: &EnhancedSegment, tokens: Vec<String>, language: &str) -> Vec<WordTiming> {
    let n = tokens.len();
    if n == 0 {
        return Vec::new();
    }
    let step = seg.duration().max(0.0) / n as f64;
    tokens
        .into_iter()
        .enumerate()
        .map(|(i, text)| WordTiming {
            text,
            start: seg.start + step * i as f64,
            end: if i + 1 == n {
                seg.end.max(seg.start)
            } else {
                seg.start + step * (i + 1) as f64
            },
            score: SYNTH_WORD_SCORE,
            language: Some(language.to_string()),
        })
        .collect()
}

/// Clamp existing word timings into the segment, repair scores, order by start.
pub fn normalize_words(seg: &EnhancedSegment, words: &mut Vec<WordTiming>) {
    use crate::segment::Timed;

    let (lo, hi) = (seg.start, seg.end.max(seg.start));
    words.retain(|w| !w.text.trim().is_empty());
    for word in words.iter_mut() {
        word.clamp_into(lo, hi);
        word.score = if word.score.is_finite() {
            word.score.clamp(0.0, 1.0)
        } else {
            SYNTH_WORD_SCORE
        };
    }
    words.sort_by(|a, b| a.start.total_cmp(&b.start));
}

/// Character timings for the CJK characters of a segment.
///
/// Each word's span is divided evenly among its CJK characters; without
/// word timings the whole segment span is divided among all CJK characters.
pub fn synthesize_chars(seg: &EnhancedSegment, words: Option<&[WordTiming]>, language: &str) -> Vec<CharTiming> {
    let spread = |chars: Vec<char>, start: f64, end: f64, score: f32, out: &mut Vec<CharTiming>| {
        let n = chars.len();
        if n == 0 {
            return;
        }
        let step = (end - start).max(0.0) / n as f64;
        for (i, ch) in chars.into_iter().enumerate() {
            out.push(CharTiming {
                ch: ch.to_string(),
                start: start + step * i as f64,
                end: if i + 1 == n { end.max(start) } else { start + step * (i + 1) as f64 },
                score,
                language: Some(language.to_string()),
            });
        }
    };

    let mut out = Vec::new();
    match words.filter(|w| !w.is_empty()) {
        Some(words) => {
            for word in words {
                let chars: Vec<char> = word.text.chars().filter(|c| is_cjk(*c)).collect();
                spread(chars, word.start, word.end, word.score.min(SYNTH_WORD_SCORE), &mut out);
            }
        }
        None => {
            let chars: Vec<char> = seg.text.chars().filter(|c| is_cjk(*c)).collect();
            spread(chars, seg.start, seg.end, SYNTH_CHAR_SCORE, &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_language_from_script() {
        assert_eq!(detect_language("你好世界", None, "en"), "zh");
        assert_eq!(detect_language("こんにちは世界", None, "en"), "ja");
        assert_eq!(detect_language("안녕하세요", None, "en"), "ko");
        assert_eq!(detect_language("hello world", None, "en"), "en");
    }

    #[test]
    fn hint_overrides_script() {
        assert_eq!(detect_language("hello", Some("zh-Hans"), "en"), "zh");
        assert_eq!(detect_language("你好", Some("  "), "en"), "zh");
    }

    #[test]
    fn tokenizes_cjk_per_character() {
        assert_eq!(tokenize("你好，世界"), vec!["你", "好", "世", "界"]);
    }

    #[test]
    fn tokenizes_latin_words_and_mixed_text() {
        assert_eq!(tokenize("Don't stop, 2 go!"), vec!["Don't", "stop", "2", "go"]);
        assert_eq!(tokenize("我用iPhone拍"), vec!["我", "用", "iPhone", "拍"]);
        assert!(tokenize("... !!").is_empty());
    }

    #[test]
    fn synthesized_words_tile_the_segment() {
        let seg = EnhancedSegment::new(1.0, 3.0, "a b c d");
        let words = synthesize_words(&seg, tokenize(&seg.text), "en");
        assert_eq!(words.len(), 4);
        approx::assert_abs_diff_eq!(words[0].start, 1.0);
        approx::assert_abs_diff_eq!(words[1].start, 1.5);
        assert_eq!(words[3].end, 3.0);
        assert!(words.iter().all(|w| w.score == SYNTH_WORD_SCORE));
    }

    #[test]
    fn chars_subdivide_each_word() {
        let seg = EnhancedSegment::new(0.0, 2.0, "你好");
        let words = synthesize_words(&seg, tokenize(&seg.text), "zh");
        let chars = synthesize_chars(&seg, Some(&words), "zh");
        assert_eq!(chars.len(), 2);
        assert_eq!(chars[0].ch, "你");
        approx::assert_abs_diff_eq!(chars[1].start, 1.0);
        assert_eq!(chars[1].end, 2.0);
    }

    #[test]
    fn chars_fall_back_to_segment_span() {
        let seg = EnhancedSegment::new(0.0, 1.0, "好。");
        let chars = synthesize_chars(&seg, None, "zh");
        assert_eq!(chars.len(), 1);
        assert_eq!(chars[0].score, SYNTH_CHAR_SCORE);
        assert_eq!(chars[0].end, 1.0);
    }

    #[test]
    fn normalize_clamps_and_sorts() {
        let seg = EnhancedSegment::new(1.0, 2.0, "b a");
        let mut words = vec![
            WordTiming { text: "b".into(), start: 1.5, end: 2.5, score: f32::NAN, language: None },
            WordTiming { text: "a".into(), start: 0.5, end: 1.2, score: 1.7, language: None },
            WordTiming { text: " ".into(), start: 1.0, end: 1.0, score: 1.0, language: None },
        ];
        normalize_words(&seg, &mut words);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "a");
        assert_eq!(words[0].start, 1.0);
        assert_eq!(words[0].score, 1.0);
        assert_eq!(words[1].end, 2.0);
        assert_eq!(words[1].score, SYNTH_WORD_SCORE);
    }
}
