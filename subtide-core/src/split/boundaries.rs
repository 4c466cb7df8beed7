//! Candidate split offsets (in chars) and the spacing rule that thins them.

/// Sentence/clause marks that end a slice wherever they occur.
fn is_strong_mark(c: char) -> bool {
    matches!(
        c,
        '。' | '！' | '？' | '；' | '，' | '、' | '：' | '．' | '｡' | '､' | '…' | '⋯' | '!' | '?' | ';'
    )
}

/// ASCII marks that also appear inside numbers, times and URLs.
fn is_weak_mark(c: char) -> bool {
    matches!(c, '.' | ',' | ':')
}

/// Offsets just after each punctuation run, excluding `0` and `chars.len()`.
///
/// `.`, `,` and `:` only count when followed by whitespace or the end of the
/// text, so `3.14` and `10:30` stay whole. A run such as `?!` yields one
/// offset after its last mark.
pub fn punctuation_offsets(chars: &[char]) -> Vec<usize> {
    let len = chars.len();
    let is_mark = |i: usize| {
        let c = chars[i];
        is_strong_mark(c)
            || (is_weak_mark(c) && chars.get(i + 1).map_or(true, |n| n.is_whitespace()))
    };

    (0..len)
        .filter(|&i| is_mark(i) && !(i + 1 < len && is_mark(i + 1)))
        .map(|i| i + 1)
        .filter(|&offset| offset > 0 && offset < len)
        .collect()
}

/// Map pause offsets (seconds from segment start) onto char offsets by the
/// segment's time-per-char ratio. Pauses outside `(0, duration)` are ignored.
pub fn pause_offsets(pauses: &[f64], duration: f64, len: usize) -> Vec<usize> {
    if duration.is_nan() || duration <= 0.0 || len < 2 {
        return Vec::new();
    }
    let mut offsets: Vec<usize> = pauses
        .iter()
        .filter(|&&p| p > 0.0 && p < duration)
        .map(|&p| (p / duration * len as f64).round() as usize)
        .filter(|&offset| offset > 0 && offset < len)
        .collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

/// Keep candidates at least a third of the text apart, then close with `len`.
///
/// Returns the slice end offsets; a single `[len]` means nothing was kept.
pub fn select_boundaries(candidates: &[usize], len: usize) -> Vec<usize> {
    let min_gap = len as f64 / 3.0;
    let mut kept = Vec::new();
    let mut prev = 0usize;
    for &c in candidates {
        if c > prev && c < len && (c - prev) as f64 >= min_gap {
            kept.push(c);
            prev = c;
        }
    }
    kept.push(len);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn cjk_marks_are_candidates() {
        assert_eq!(punctuation_offsets(&chars("你好，我很好。你呢？")), vec![3, 7]);
    }

    #[test]
    fn ascii_period_needs_following_space() {
        let text = chars("Pi is 3.14 today. Next bit");
        assert_eq!(punctuation_offsets(&text), vec![17]);
        assert!(punctuation_offsets(&chars("at 10:30 sharp")).is_empty());
    }

    #[test]
    fn punctuation_runs_give_one_offset() {
        assert_eq!(punctuation_offsets(&chars("What?! Really")), vec![6]);
    }

    #[test]
    fn selection_enforces_third_spacing() {
        assert_eq!(select_boundaries(&[3, 7], 10), vec![7, 10]);
        assert_eq!(select_boundaries(&[4, 5, 8], 12), vec![4, 8, 12]);
        assert_eq!(select_boundaries(&[1], 12), vec![12]);
    }

    #[test]
    fn pauses_map_proportionally() {
        assert_eq!(pause_offsets(&[2.0, 5.0, 12.0, -1.0], 10.0, 40), vec![8, 20]);
        assert!(pause_offsets(&[1.0], 0.0, 40).is_empty());
    }
}
