//! Pipeline throughput benchmark.
//!
//! Runs the configured pipeline over every `*.json` segment file under a
//! fixtures directory (a sibling `*.wav` is used as the job audio when
//! present) or, without fixtures, over a synthetic CJK transcript. Prints
//! per-run latency and writes an optional JSON summary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use subtide_core::{
    ComponentDetail, ComponentRegistry, EnhancedSegment, EnhancementConfig, JobContext,
};

#[derive(Debug)]
struct Args {
    fixtures_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    iterations: usize,
    synthetic_segments: usize,
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct CaseResult {
    case: String,
    iteration: usize,
    latency_ms: f64,
    input_segments: usize,
    output_segments: usize,
    compliance_ratio: Option<f64>,
    failed_components: usize,
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    pipeline: String,
    iterations: usize,
    total_runs: usize,
    p50_latency_ms: f64,
    p95_latency_ms: f64,
    avg_latency_ms: f64,
    avg_compliance_ratio: Option<f64>,
    component_avg_ms: BTreeMap<String, f64>,
    cases: Vec<CaseResult>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        fixtures_dir: None,
        config: None,
        iterations: 3,
        synthetic_segments: 500,
        output: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().ok_or_else(|| format!("missing value for {flag}"));
        match arg.as_str() {
            "--fixtures" => args.fixtures_dir = Some(PathBuf::from(value("--fixtures")?)),
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--iterations" => {
                args.iterations = value("--iterations")?
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --iterations".to_string())?
                    .clamp(1, 100);
            }
            "--segments" => {
                args.synthetic_segments = value("--segments")?
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --segments".to_string())?
                    .clamp(1, 1_000_000);
            }
            "--output" => args.output = Some(PathBuf::from(value("--output")?)),
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p subtide-core --bin benchmark -- \\
  [--fixtures <dir>] [--config <cfg.json>] [--iterations <n>] [--segments <n>] [--output <file.json>]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn collect_json(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir).map_err(|e| e.to_string())?;
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.is_dir() {
            collect_json(&path, out)?;
        } else if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("json"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Two-second segments of about twenty CJK characters with a clause break.
fn synthetic_transcript(count: usize) -> Vec<EnhancedSegment> {
    const PHRASES: [&str; 4] = [
        "今天的天气非常好，我们一起去公园散步吧。",
        "这个问题需要仔细考虑，然后再做决定。",
        "他说明天会早一点到，请大家不要迟到。",
        "会议结束以后，我们再讨论下一步计划。",
    ];
    (0..count)
        .map(|i| {
            let start = i as f64 * 2.0;
            EnhancedSegment::new(start, start + 2.0, PHRASES[i % PHRASES.len()])
        })
        .collect()
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let cfg = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
            EnhancementConfig::from_json(&raw).map_err(|e| e.to_string())?
        }
        None => EnhancementConfig::default(),
    };
    let registry = ComponentRegistry::with_builtins();
    let pipeline = registry.build(&cfg).map_err(|e| e.to_string())?;

    let mut cases: Vec<(String, Vec<EnhancedSegment>, JobContext)> = Vec::new();
    match &args.fixtures_dir {
        Some(dir) => {
            let mut files = Vec::new();
            collect_json(dir, &mut files)?;
            files.sort();
            if files.is_empty() {
                return Err(format!("no .json fixtures found in {}", dir.display()));
            }
            for file in files {
                let raw = std::fs::read_to_string(&file).map_err(|e| e.to_string())?;
                let segments: Vec<EnhancedSegment> =
                    serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", file.display()))?;
                let wav = file.with_extension("wav");
                let audio = wav
                    .is_file()
                    .then(|| std::fs::canonicalize(&wav).ok())
                    .flatten();
                let name = file
                    .strip_prefix(dir)
                    .unwrap_or(&file)
                    .display()
                    .to_string();
                cases.push((name, segments, JobContext::new(audio)));
            }
        }
        None => cases.push((
            format!("synthetic-cjk-{}", args.synthetic_segments),
            synthetic_transcript(args.synthetic_segments),
            JobContext::new(None).with_language(Some("zh".into())),
        )),
    }

    println!(
        "Running subtide benchmark: pipeline=[{}] cases={} iterations={}",
        pipeline.component_names().join(","),
        cases.len(),
        args.iterations
    );

    let mut results = Vec::new();
    let mut component_ms: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (name, segments, job) in &cases {
        for iteration in 1..=args.iterations {
            let started = Instant::now();
            let (out, metrics) = pipeline.run(segments, job);
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let compliance_ratio = metrics.component_metrics.iter().find_map(|m| match &m.detail {
                ComponentDetail::Split(split) => Some(split.compliance_ratio),
                _ => None,
            });
            for m in &metrics.component_metrics {
                component_ms.entry(m.name.clone()).or_default().push(m.duration_ms);
            }
            results.push(CaseResult {
                case: name.clone(),
                iteration,
                latency_ms,
                input_segments: segments.len(),
                output_segments: out.len(),
                compliance_ratio,
                failed_components: metrics.errors().count(),
            });
            println!(
                "{name} [{iteration}/{iters}] {latency_ms:.1} ms, {n_in} → {n_out} segments",
                iters = args.iterations,
                n_in = segments.len(),
                n_out = out.len()
            );
        }
    }

    let latencies: Vec<f64> = results.iter().map(|r| r.latency_ms).collect();
    let compliance: Vec<f64> = results.iter().filter_map(|r| r.compliance_ratio).collect();
    let summary = Summary {
        pipeline: pipeline.component_names().join(","),
        iterations: args.iterations,
        total_runs: results.len(),
        p50_latency_ms: percentile(&latencies, 0.50),
        p95_latency_ms: percentile(&latencies, 0.95),
        avg_latency_ms: mean(&latencies).unwrap_or(0.0),
        avg_compliance_ratio: mean(&compliance),
        component_avg_ms: component_ms
            .into_iter()
            .map(|(name, values)| (name, mean(&values).unwrap_or(0.0)))
            .collect(),
        cases: results,
    };

    println!(
        "p50 {:.1} ms, p95 {:.1} ms, avg compliance {}",
        summary.p50_latency_ms,
        summary.p95_latency_ms,
        summary
            .avg_compliance_ratio
            .map_or_else(|| "n/a".to_string(), |c| format!("{c:.3}"))
    );

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        std::fs::write(path, json).map_err(|e| format!("{}: {e}", path.display()))?;
        println!("summary written to {}", path.display());
    }
    Ok(())
}
