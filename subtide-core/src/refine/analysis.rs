//! Short-time energy analysis and the per-path analysis cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::audio::{decode_wav, AudioBuffer};
use crate::error::{Result, SubtideError};

/// RMS energy per hop, with frames centred on `idx * hop_size`.
#[derive(Debug, Clone)]
pub struct AudioAnalysis {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,
    pub duration_secs: f64,
    pub energy: Vec<f32>,
}

impl AudioAnalysis {
    pub fn from_buffer(buffer: &AudioBuffer, frame_size: usize, hop_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        let hop_size = hop_size.max(1);
        let samples = &buffer.samples;
        let half = frame_size / 2;

        let n_frames = if samples.is_empty() {
            0
        } else {
            1 + samples.len() / hop_size
        };
        let energy = (0..n_frames)
            .map(|idx| {
                let centre = idx * hop_size;
                let lo = centre.saturating_sub(half);
                let hi = (centre + frame_size - half).min(samples.len());
                let window = &samples[lo.min(hi)..hi];
                if window.is_empty() {
                    return 0.0;
                }
                // Zero padding past either edge counts towards the mean.
                let sum_sq: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
                (sum_sq / frame_size as f64).sqrt() as f32
            })
            .collect();

        Self {
            sample_rate: buffer.sample_rate,
            frame_size,
            hop_size,
            duration_secs: buffer.duration_secs(),
            energy,
        }
    }

    /// Time (seconds) of frame `idx`.
    pub fn frame_time(&self, idx: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (idx * self.hop_size) as f64 / self.sample_rate as f64
    }

    /// The frame time in `[lo, hi]` with minimum energy.
    ///
    /// Ties go to the frame nearest `anchor`. `None` when no frame centre
    /// falls inside the window.
    pub fn quietest_between(&self, lo: f64, hi: f64, anchor: f64) -> Option<f64> {
        if self.energy.is_empty() || self.sample_rate == 0 || lo.is_nan() || hi.is_nan() || lo > hi {
            return None;
        }
        let step = self.hop_size as f64 / self.sample_rate as f64;
        let first = (lo.max(0.0) / step).ceil() as usize;
        let last = ((hi / step).floor().max(0.0) as usize).min(self.energy.len() - 1);
        if first > last {
            return None;
        }

        (first..=last)
            .map(|idx| (self.energy[idx], self.frame_time(idx)))
            .min_by(|(ea, ta), (eb, tb)| {
                ea.total_cmp(eb)
                    .then_with(|| (ta - anchor).abs().total_cmp(&(tb - anchor).abs()))
            })
            .map(|(_, t)| t)
    }
}

type CacheKey = (PathBuf, usize, usize);
type Outcome = std::result::Result<Arc<AudioAnalysis>, String>;

/// Size and modification time of the file an entry was computed from.
/// `None` when the file could not be stat'ed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn read(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug, Default)]
struct CacheSlot {
    stamp: Option<FileStamp>,
    outcome: OnceLock<Outcome>,
}

/// Path-keyed analysis cache shared by every refiner built from one
/// registry.
///
/// The map lock is held only to find or insert a slot; decoding happens
/// inside the slot's `OnceLock`, so concurrent first use of the same path
/// decodes once while other paths proceed in parallel. Lookups take the
/// read lock for the duration of one `Arc` clone; every lookup also stats
/// the file, which dominates that cost.
///
/// A slot is only reused while the file's size and modification time are
/// unchanged, so a file rewritten in place is analysed again. Failures are
/// remembered under the same rule. Hosts that run many jobs call
/// [`AnalysisCache::evict`] when a job finishes.
#[derive(Default)]
pub struct AnalysisCache {
    entries: RwLock<HashMap<CacheKey, Arc<CacheSlot>>>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_analyze(
        &self,
        path: &Path,
        frame_size: usize,
        hop_size: usize,
    ) -> Result<Arc<AudioAnalysis>> {
        let key = (path.to_path_buf(), frame_size, hop_size);
        let stamp = FileStamp::read(path);
        let existing = self
            .entries
            .read()
            .get(&key)
            .filter(|slot| slot.stamp == stamp)
            .cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => {
                let mut entries = self.entries.write();
                let slot = entries.entry(key).or_default();
                if slot.stamp != stamp {
                    *slot = Arc::new(CacheSlot {
                        stamp,
                        outcome: OnceLock::new(),
                    });
                }
                Arc::clone(slot)
            }
        };

        let outcome = slot.outcome.get_or_init(|| match decode_wav(path) {
            Ok(buffer) => {
                let analysis = AudioAnalysis::from_buffer(&buffer, frame_size, hop_size);
                debug!(
                    path = %path.display(),
                    frames = analysis.energy.len(),
                    duration = analysis.duration_secs,
                    "energy analysis computed"
                );
                Ok(Arc::new(analysis))
            }
            Err(e) => {
                warn!(path = %path.display(), "energy analysis failed: {e}");
                Err(e.to_string())
            }
        });

        match outcome {
            Ok(analysis) => Ok(Arc::clone(analysis)),
            Err(message) => Err(SubtideError::audio_access(path, message.clone())),
        }
    }

    /// Drop cached entries for `path` (all frame/hop variants).
    pub fn evict(&self, path: &Path) {
        self.entries.write().retain(|(p, _, _), _| p != path);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::write_sections;

    #[test]
    fn energy_tracks_loud_and_quiet_regions() {
        let mut samples = vec![0.0f32; 8_000];
        samples.extend(vec![0.5f32; 8_000]);
        let analysis = AudioAnalysis::from_buffer(&AudioBuffer::new(samples, 16_000), 2048, 512);
        assert_eq!(analysis.energy.len(), 1 + 16_000 / 512);
        assert_eq!(analysis.energy[0], 0.0);
        assert!(analysis.energy[analysis.energy.len() - 2] > 0.4);
    }

    #[test]
    fn quietest_between_finds_the_silence_dip() {
        let mut samples = vec![0.5f32; 16_000];
        samples[7_680..8_320].iter_mut().for_each(|s| *s = 0.0);
        let analysis = AudioAnalysis::from_buffer(&AudioBuffer::new(samples, 16_000), 512, 160);
        let t = analysis.quietest_between(0.3, 0.7, 0.3).unwrap();
        approx::assert_abs_diff_eq!(t, 0.5, epsilon = 0.011);
    }

    #[test]
    fn ties_prefer_anchor() {
        let analysis = AudioAnalysis::from_buffer(&AudioBuffer::new(vec![0.0; 16_000], 16_000), 512, 160);
        let t = analysis.quietest_between(0.2, 0.8, 0.61).unwrap();
        approx::assert_abs_diff_eq!(t, 0.61, epsilon = 1e-9);
    }

    #[test]
    fn empty_window_yields_none() {
        let analysis = AudioAnalysis::from_buffer(&AudioBuffer::new(vec![0.1; 16_000], 16_000), 512, 160);
        assert!(analysis.quietest_between(0.5, 0.4, 0.45).is_none());
        assert!(analysis.quietest_between(5.0, 6.0, 5.5).is_none());
    }

    #[test]
    fn cache_reuses_analysis_for_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sections(dir.path(), "a.wav", 16_000, &[(0.5, 0.3)]);
        let cache = AnalysisCache::new();
        let a = cache.get_or_analyze(&path, 2048, 512).unwrap();
        let b = cache.get_or_analyze(&path, 2048, 512).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        cache.evict(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn rewritten_file_is_analysed_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sections(dir.path(), "c.wav", 16_000, &[(0.5, 0.3)]);
        let cache = AnalysisCache::new();
        let before = cache.get_or_analyze(&path, 2048, 512).unwrap();
        approx::assert_abs_diff_eq!(before.duration_secs, 0.5, epsilon = 1e-6);

        write_sections(dir.path(), "c.wav", 16_000, &[(1.5, 0.3)]);
        let after = cache.get_or_analyze(&path, 2048, 512).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        approx::assert_abs_diff_eq!(after.duration_secs, 1.5, epsilon = 1e-6);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failure_is_forgotten_once_the_file_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.wav");
        let cache = AnalysisCache::new();
        assert!(cache.get_or_analyze(&path, 2048, 512).is_err());
        write_sections(dir.path(), "late.wav", 16_000, &[(0.5, 0.3)]);
        assert!(cache.get_or_analyze(&path, 2048, 512).is_ok());
    }

    #[test]
    fn cache_remembers_failures() {
        let cache = AnalysisCache::new();
        let path = Path::new("/nonexistent/missing.wav");
        assert!(cache.get_or_analyze(path, 2048, 512).is_err());
        assert!(matches!(
            cache.get_or_analyze(path, 2048, 512),
            Err(SubtideError::AudioAccess { .. })
        ));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_first_use_decodes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sections(dir.path(), "b.wav", 16_000, &[(1.0, 0.3)]);
        let cache = Arc::new(AnalysisCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let path = path.clone();
                std::thread::spawn(move || cache.get_or_analyze(&path, 2048, 512).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
