#![allow(dead_code)]

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use subtide_core::{EnhancedSegment, EnhancementConfig, FrameClassifierChoice, VadEngineKind};

/// 16 kHz mono 16-bit WAV: (seconds, amplitude) sections of a 440 Hz square
/// wave; amplitude 0 writes digital silence.
pub fn write_wav(dir: &Path, name: &str, sections: &[(f64, f32)]) -> PathBuf {
    let rate = 16_000u32;
    let path = dir.join(name);
    let spec = WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).unwrap();
    let half_period = (rate / 880) as usize;
    let mut n = 0usize;
    for &(secs, amp) in sections {
        for _ in 0..(secs * rate as f64).round() as usize {
            let sign = if (n / half_period) % 2 == 0 { 1.0 } else { -1.0 };
            writer
                .write_sample((amp * sign * i16::MAX as f32) as i16)
                .unwrap();
            n += 1;
        }
    }
    writer.finalize().unwrap();
    path
}

/// Speech at 1–3 s and 5–7 s of an 8 s file.
pub fn two_utterances(dir: &Path) -> PathBuf {
    write_wav(
        dir,
        "job.wav",
        &[(1.0, 0.0), (2.0, 0.4), (2.0, 0.0), (2.0, 0.4), (1.0, 0.0)],
    )
}

/// Default pipeline with the deterministic energy classifier.
pub fn energy_config() -> EnhancementConfig {
    let mut cfg = EnhancementConfig::default();
    cfg.vad.engine = VadEngineKind::Webrtc;
    cfg.vad.classifier = FrameClassifierChoice::Energy;
    cfg.vad.energy_threshold = 0.05;
    cfg
}

pub fn seg(start: f64, end: f64, text: &str) -> EnhancedSegment {
    EnhancedSegment::new(start, end, text)
}

/// Every word/char timing lies inside its segment.
pub fn assert_clamped(segments: &[EnhancedSegment]) {
    for s in segments {
        for w in s.words.iter().flatten() {
            assert!(w.start >= s.start && w.end <= s.end, "word {w:?} outside {s:?}");
        }
        for c in s.chars.iter().flatten() {
            assert!(c.start >= s.start && c.end <= s.end, "char {c:?} outside {s:?}");
        }
    }
}

/// Adjacent outputs never overlap.
pub fn assert_ordered(segments: &[EnhancedSegment]) {
    for pair in segments.windows(2) {
        assert!(
            pair[0].end <= pair[1].start + 1e-9,
            "overlap: {:?} / {:?}",
            pair[0],
            pair[1]
        );
    }
}
