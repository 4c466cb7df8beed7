//! Waveform access: path screening, WAV decoding, mono down-mix.
//!
//! Container demuxing is out of scope. Upstream normalizes every job's audio
//! to WAV before it reaches this crate, so `hound` covers the formats seen in
//! practice (8/16/24/32-bit integer PCM and 32-bit float).

pub mod resample;

use std::path::{Component, Path, PathBuf};

use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::error::{Result, SubtideError};

/// A contiguous block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Screen an audio path before any decoder sees it.
///
/// Accepts only absolute paths to existing regular files with no `..`
/// component. Symlinks are followed for the regular-file check.
pub fn validate_audio_path(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(SubtideError::audio_access(path, "path must be absolute"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(SubtideError::audio_access(
            path,
            "parent-directory traversal is not allowed",
        ));
    }
    let metadata = std::fs::metadata(path)
        .map_err(|e| SubtideError::audio_access(path, format!("cannot stat: {e}")))?;
    if !metadata.is_file() {
        return Err(SubtideError::audio_access(path, "not a regular file"));
    }
    Ok(path.to_path_buf())
}

/// Decode a WAV file into mono f32.
///
/// Multi-channel audio is averaged down to one channel. The path is screened
/// with [`validate_audio_path`] first.
pub fn decode_wav(path: &Path) -> Result<AudioBuffer> {
    let path = validate_audio_path(path)?;
    let decode_err = |source| SubtideError::AudioDecode {
        path: path.clone(),
        source,
    };

    let mut reader = WavReader::open(&path).map_err(decode_err)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample.clamp(1, 32);
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(decode_err)?
        }
    };

    let samples = downmix(&interleaved, channels);
    debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels,
        frames = samples.len(),
        "decoded wav"
    );
    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Compute the root-mean-square of a sample slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    use hound::{SampleFormat, WavSpec, WavWriter};

    /// Write 16-bit mono PCM; `sections` is a list of (seconds, amplitude)
    /// rendered as a 220 Hz square wave (amplitude 0 = digital silence).
    pub fn write_sections(dir: &Path, name: &str, rate: u32, sections: &[(f64, f32)]) -> PathBuf {
        let path = dir.join(name);
        let spec = WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        let half_period = (rate / 440).max(1) as usize;
        let mut n = 0usize;
        for &(secs, amp) in sections {
            let count = (secs * rate as f64).round() as usize;
            for _ in 0..count {
                let sign = if (n / half_period) % 2 == 0 { 1.0 } else { -1.0 };
                let v = (amp * sign * i16::MAX as f32) as i16;
                writer.write_sample(v).unwrap();
                n += 1;
            }
        }
        writer.finalize().unwrap();
        path
    }
}
