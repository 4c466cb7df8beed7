//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use subtide_core::{
    ComponentRegistry, EnhancedSegment, EnhancementConfig, Enhancer, JobContext, PipelineMetrics,
};
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn};

use crate::jobs::{absolutize, read_manifest, write_json, JobSpec};

/// Arguments for a single `enhance` run, already resolved.
#[derive(Debug, Clone)]
pub struct EnhanceJob {
    pub spec: JobSpec,
    /// Write to stdout instead of `spec.output`.
    pub stdout: bool,
}

/// Build a pipeline from `registry` and run one job.
fn run_job(
    registry: &ComponentRegistry,
    cfg: &EnhancementConfig,
    segments: &[EnhancedSegment],
    job: &JobContext,
) -> anyhow::Result<(Vec<EnhancedSegment>, PipelineMetrics)> {
    let pipeline = registry.build(cfg)?;
    Ok(pipeline.run(segments, job))
}

fn execute(
    registry: &ComponentRegistry,
    cfg: &EnhancementConfig,
    job: &EnhanceJob,
) -> anyhow::Result<PipelineMetrics> {
    let (segments, ctx) = job.spec.load()?;
    let result = run_job(registry, cfg, &segments, &ctx);
    // Analysis lives only as long as the job that needed it.
    if let Some(audio) = &ctx.audio_path {
        registry.shared().analysis.evict(audio);
    }
    let (out, metrics) = result?;

    if job.stdout {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        write_json(&job.spec.output, &out)?;
    }
    if let Some(path) = &job.spec.metrics {
        write_json(path, &metrics)?;
    }
    Ok(metrics)
}

pub async fn enhance(cfg: EnhancementConfig, job: EnhanceJob) -> anyhow::Result<()> {
    let metrics = tokio::task::spawn_blocking(move || {
        let registry = ComponentRegistry::with_builtins();
        execute(&registry, &cfg, &job)
    })
    .await
    .context("enhance worker panicked")??;

    for failed in metrics.errors() {
        warn!(component = %failed.name, error = ?failed.error, "component degraded");
    }
    Ok(())
}

/// Run every manifest job, at most `max_jobs` at a time.
///
/// All pipelines come from one registry, so concurrent jobs share the model
/// slot and analysis cache. Each job drops its audio's analysis when it
/// finishes. A failed job is logged and counted; the rest still run.
pub async fn batch(cfg: EnhancementConfig, manifest: &Path, max_jobs: usize) -> anyhow::Result<()> {
    let jobs = read_manifest(manifest)?;
    let registry = Arc::new(ComponentRegistry::with_builtins());
    // Fail on a bad pipeline before queueing anything.
    registry.build(&cfg)?;

    let cfg = Arc::new(cfg);
    let permits = Arc::new(Semaphore::new(max_jobs.max(1)));
    info!(jobs = jobs.len(), concurrency = max_jobs.max(1), "batch started");

    let mut handles = Vec::with_capacity(jobs.len());
    for (idx, spec) in jobs.into_iter().enumerate() {
        let permit = Arc::clone(&permits).acquire_owned().await?;
        let registry = Arc::clone(&registry);
        let cfg = Arc::clone(&cfg);
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let span = info_span!("job", idx, segments = %spec.segments.display());
            let _enter = span.enter();
            let job = EnhanceJob {
                spec,
                stdout: false,
            };
            execute(&registry, &cfg, &job)
        }));
    }

    let mut failed = 0usize;
    for (idx, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(metrics)) => info!(
                idx,
                output = metrics.output_segments,
                ms = metrics.total_duration_ms,
                "job done"
            ),
            Ok(Err(e)) => {
                failed += 1;
                error!(idx, "job failed: {e:#}");
            }
            Err(e) => {
                failed += 1;
                error!(idx, "job worker panicked: {e}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    Ok(())
}

/// Print each registered component with its availability under `cfg`.
pub fn components(cfg: &EnhancementConfig) -> anyhow::Result<()> {
    let registry = ComponentRegistry::with_builtins();
    let configured = cfg.component_names();
    for name in registry.names() {
        let component = registry.create(name, cfg)?;
        let status = if component.is_available() {
            "available"
        } else {
            "unavailable"
        };
        let marker = if configured.iter().any(|c| c == name) {
            "*"
        } else {
            " "
        };
        println!("{marker} {name:<8} {status}");
    }
    Ok(())
}

/// Resolve CLI paths for a single job. Relative paths are taken against the
/// working directory; audio stays unchecked here so a missing file degrades
/// inside the pipeline instead of aborting.
pub fn single_job(
    segments: PathBuf,
    output: Option<PathBuf>,
    audio: Option<PathBuf>,
    language: Option<String>,
    pauses: Option<PathBuf>,
    metrics: Option<PathBuf>,
) -> anyhow::Result<EnhanceJob> {
    let cwd = std::env::current_dir().context("reading working directory")?;
    let stdout = output.is_none();
    let spec = JobSpec {
        segments,
        output: output.unwrap_or_default(),
        audio: audio.map(|p| absolutize(&p, &cwd)),
        language,
        pauses,
        metrics,
    };
    Ok(EnhanceJob { spec, stdout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use hound::{SampleFormat, WavSpec, WavWriter};

    /// 16 kHz mono square wave; amplitude 0 is digital silence.
    fn write_wav(path: &Path, sections: &[(f64, f32)]) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        let mut n = 0usize;
        for &(secs, amp) in sections {
            for _ in 0..(secs * 16_000.0) as usize {
                let sign = if (n / 18) % 2 == 0 { 1.0 } else { -1.0 };
                writer.write_sample((amp * sign * i16::MAX as f32) as i16).unwrap();
                n += 1;
            }
        }
        writer.finalize().unwrap();
    }

    fn read_out(path: &Path) -> Vec<EnhancedSegment> {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn each_job_sees_the_audio_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("take.wav");
        let segments = dir.path().join("segments.json");
        fs::write(&segments, r#"[{"start":1.1,"end":2.9,"text":"hello there"}]"#).unwrap();

        let cfg = EnhancementConfig {
            pipeline: "refine".into(),
            ..Default::default()
        };
        let registry = ComponentRegistry::with_builtins();
        let job = |output: &str| EnhanceJob {
            spec: JobSpec {
                segments: segments.clone(),
                output: dir.path().join(output),
                audio: Some(audio.clone()),
                language: None,
                pauses: None,
                metrics: None,
            },
            stdout: false,
        };

        write_wav(&audio, &[(1.0, 0.0), (2.0, 0.4), (1.0, 0.0)]);
        execute(&registry, &cfg, &job("first.json")).unwrap();
        assert!(registry.shared().analysis.is_empty());

        write_wav(&audio, &[(4.0, 0.4)]);
        execute(&registry, &cfg, &job("second.json")).unwrap();
        assert!(registry.shared().analysis.is_empty());

        let first = read_out(&dir.path().join("first.json"));
        let second = read_out(&dir.path().join("second.json"));
        // Silence before 1.0 s pulls the start back; uniform tone leaves it
        // at the frame nearest the original.
        assert!(first[0].start < 1.0, "{:?}", first[0]);
        assert!((second[0].start - 1.1).abs() < 0.02, "{:?}", second[0]);
    }
}
