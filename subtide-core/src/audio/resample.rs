//! Whole-buffer sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Detectors run at 16 kHz while job audio arrives at whatever rate the
//! upstream normalizer produced. When the rates already match the buffer is
//! returned as-is and no rubato session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use super::AudioBuffer;
use crate::error::{Result, SubtideError};

/// Input frames per rubato call.
const CHUNK_SIZE: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    ratio: f64,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Errors
    /// Returns `SubtideError::Resample` if either rate is zero or rubato fails
    /// to initialise.
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(SubtideError::Resample(format!(
                "invalid rates {source_rate} -> {target_rate}"
            )));
        }
        let ratio = target_rate as f64 / source_rate as f64;
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                ratio,
                output_buf: Vec::new(),
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            CHUNK_SIZE,
            1, // mono
        )
        .map_err(|e| SubtideError::Resample(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        Ok(Self {
            resampler: Some(resampler),
            ratio,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Returns `true` when source rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Convert a complete signal.
    ///
    /// The final partial chunk is zero-padded, the resampler's startup delay is
    /// trimmed, and the output is cut to `round(len * ratio)` samples.
    pub fn process_all(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(ref mut resampler) = self.resampler else {
            return Ok(samples.to_vec());
        };

        let expected = (samples.len() as f64 * self.ratio).round() as usize;
        let delay = resampler.output_delay();
        let mut out = Vec::with_capacity(expected + delay + CHUNK_SIZE);
        let mut scratch = vec![0f32; CHUNK_SIZE];
        let mut offset = 0usize;

        while out.len() < expected + delay {
            let take = samples.len().saturating_sub(offset).min(CHUNK_SIZE);
            scratch[..take].copy_from_slice(&samples[offset..offset + take]);
            scratch[take..].iter_mut().for_each(|s| *s = 0.0);
            offset += take;

            let (_consumed, produced) = resampler
                .process_into_buffer(&[&scratch[..]], &mut self.output_buf, None)
                .map_err(|e| SubtideError::Resample(e.to_string()))?;
            out.extend_from_slice(&self.output_buf[0][..produced]);

            if take == 0 && produced == 0 {
                break;
            }
        }

        let end = (delay + expected).min(out.len());
        Ok(out[delay.min(end)..end].to_vec())
    }
}

/// Resample `buffer` to `target_rate`, returning a new buffer.
pub fn resample_to(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.sample_rate == target_rate {
        return Ok(buffer.clone());
    }
    let mut converter = RateConverter::new(buffer.sample_rate, target_rate)?;
    let samples = converter.process_all(&buffer.samples)?;
    debug!(
        from = buffer.sample_rate,
        to = target_rate,
        in_frames = buffer.samples.len(),
        out_frames = samples.len(),
        "resampled"
    );
    Ok(AudioBuffer::new(samples, target_rate))
}
