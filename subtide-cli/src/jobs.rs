//! Job files: ASR segment input, pause offsets, batch manifests, output.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use subtide_core::{EnhancedSegment, JobContext};

/// Segment files are either a bare array or `{"segments": [...]}` (the
/// shape most ASR front-ends write).
#[derive(Deserialize)]
#[serde(untagged)]
enum SegmentFile {
    Bare(Vec<EnhancedSegment>),
    Wrapped { segments: Vec<EnhancedSegment> },
}

pub fn read_segments(path: &Path) -> anyhow::Result<Vec<EnhancedSegment>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading segments {}", path.display()))?;
    let file: SegmentFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing segments {}", path.display()))?;
    Ok(match file {
        SegmentFile::Bare(segments) | SegmentFile::Wrapped { segments } => segments,
    })
}

/// Per-segment pause offsets: `[[1.2, 3.4], [], ...]`, seconds from each
/// segment's start.
pub fn read_pauses(path: &Path) -> anyhow::Result<Vec<Vec<f64>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading pauses {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing pauses {}", path.display()))
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

/// Absolute form of `path` without touching the filesystem; relative paths
/// are taken against `base`.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// One entry of a batch manifest. Relative paths are resolved against the
/// manifest's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub segments: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub audio: Option<PathBuf>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub pauses: Option<PathBuf>,
    #[serde(default)]
    pub metrics: Option<PathBuf>,
}

impl JobSpec {
    pub fn resolve(mut self, base: &Path) -> Self {
        self.segments = absolutize(&self.segments, base);
        self.output = absolutize(&self.output, base);
        self.audio = self.audio.map(|p| absolutize(&p, base));
        self.pauses = self.pauses.map(|p| absolutize(&p, base));
        self.metrics = self.metrics.map(|p| absolutize(&p, base));
        self
    }

    /// Read the job's inputs.
    pub fn load(&self) -> anyhow::Result<(Vec<EnhancedSegment>, JobContext)> {
        let segments = read_segments(&self.segments)?;
        let mut job = JobContext::new(self.audio.clone()).with_language(self.language.clone());
        if let Some(pauses) = &self.pauses {
            job = job.with_segment_pauses(&segments, &read_pauses(pauses)?);
        }
        Ok((segments, job))
    }
}

pub fn read_manifest(path: &Path) -> anyhow::Result<Vec<JobSpec>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let jobs: Vec<JobSpec> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    let manifest = fs::canonicalize(path)
        .with_context(|| format!("resolving manifest {}", path.display()))?;
    let base = manifest.parent().unwrap_or(Path::new("/")).to_path_buf();
    Ok(jobs.into_iter().map(|job| job.resolve(&base)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_bare_and_wrapped_segment_files() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("bare.json");
        let wrapped = dir.path().join("wrapped.json");
        fs::write(&bare, r#"[{"start":0,"end":1,"text":"a"}]"#).unwrap();
        fs::write(
            &wrapped,
            r#"{"segments":[{"start":0,"end":1,"text":"a"},{"start":1,"end":2,"text":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(read_segments(&bare).unwrap().len(), 1);
        assert_eq!(read_segments(&wrapped).unwrap().len(), 2);
    }

    #[test]
    fn manifest_paths_resolve_against_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("jobs.json");
        fs::write(
            &manifest,
            r#"[{"segments":"a.json","output":"out/a.json","audio":"/abs/a.wav","language":"zh"}]"#,
        )
        .unwrap();
        let jobs = read_manifest(&manifest).unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(jobs[0].segments, base.join("a.json"));
        assert_eq!(jobs[0].output, base.join("out/a.json"));
        assert_eq!(jobs[0].audio.as_deref(), Some(Path::new("/abs/a.wav")));
    }

    #[test]
    fn job_load_converts_pauses() {
        let dir = tempfile::tempdir().unwrap();
        let segs = dir.path().join("s.json");
        let pauses = dir.path().join("p.json");
        fs::write(&segs, r#"[{"start":5,"end":15,"text":"a"}]"#).unwrap();
        fs::write(&pauses, "[[2.5]]").unwrap();
        let spec = JobSpec {
            segments: segs,
            output: dir.path().join("o.json"),
            audio: None,
            language: None,
            pauses: Some(pauses),
            metrics: None,
        };
        let (_, job) = spec.load().unwrap();
        assert_eq!(job.pause_times, vec![7.5]);
    }
}
