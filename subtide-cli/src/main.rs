//! subtide command-line entry point.
//!
//! ```text
//! subtide enhance --segments in.json --audio job.wav --output out.json
//! subtide batch --manifest jobs.json --jobs 4
//! subtide components
//! ```
//!
//! Logging goes to stderr (`RUST_LOG`, default `subtide=info`) so enhanced
//! segments can be piped from stdout.

mod commands;
mod jobs;
mod settings;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use subtide_core::VadEngineKind;
use tracing::info;

use settings::{load_config, Overrides};

#[derive(Debug, Parser)]
#[command(
    name = "subtide",
    version,
    about = "Transcript enhancement: VAD pruning, boundary refinement, subtitle reflow"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Enhance one segment file.
    Enhance(EnhanceArgs),
    /// Enhance every job listed in a manifest.
    Batch(BatchArgs),
    /// List pipeline components and whether they can run here.
    Components(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Configuration JSON (defaults to the user config file, if any).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ordered components, e.g. `vad,refine,split`. Empty string disables all.
    #[arg(long)]
    pipeline: Option<String>,
    /// VAD engine preference.
    #[arg(long, value_parser = parse_engine)]
    vad_engine: Option<VadEngineKind>,
    /// Maximum subtitle duration in seconds.
    #[arg(long)]
    max_duration: Option<f64>,
    /// Maximum subtitle length in characters.
    #[arg(long)]
    max_chars: Option<usize>,
}

impl ConfigArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            pipeline: self.pipeline.clone(),
            vad_engine: self.vad_engine,
            max_duration: self.max_duration,
            max_chars: self.max_chars,
        }
    }
}

#[derive(Debug, Args)]
struct EnhanceArgs {
    /// ASR segments (JSON array or `{"segments": [...]}`).
    #[arg(long)]
    segments: PathBuf,
    /// Audio for the job (WAV).
    #[arg(long)]
    audio: Option<PathBuf>,
    /// Language hint, e.g. `zh` or `ja-JP`.
    #[arg(long)]
    language: Option<String>,
    /// Per-segment pause offsets (JSON `[[secs, ...], ...]`).
    #[arg(long)]
    pauses: Option<PathBuf>,
    /// Output file; stdout when omitted.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Write the run's metrics record here.
    #[arg(long)]
    metrics: Option<PathBuf>,
    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// JSON array of jobs: `{segments, output, audio?, language?, pauses?, metrics?}`.
    #[arg(long)]
    manifest: PathBuf,
    /// Maximum concurrent jobs.
    #[arg(long, short, default_value_t = 2)]
    jobs: usize,
    #[command(flatten)]
    config: ConfigArgs,
}

fn parse_engine(raw: &str) -> Result<VadEngineKind, String> {
    raw.parse().map_err(|e: subtide_core::SubtideError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("subtide=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Enhance(args) => {
            let cfg = load_config(args.config.config.as_deref(), &args.config.overrides())?;
            info!(pipeline = %cfg.pipeline, "enhancing {}", args.segments.display());
            let job = commands::single_job(
                args.segments,
                args.output,
                args.audio,
                args.language,
                args.pauses,
                args.metrics,
            )?;
            commands::enhance(cfg, job).await
        }
        Command::Batch(args) => {
            let cfg = load_config(args.config.config.as_deref(), &args.config.overrides())?;
            commands::batch(cfg, &args.manifest, args.jobs).await
        }
        Command::Components(args) => {
            let cfg = load_config(args.config.as_deref(), &args.overrides())?;
            commands::components(&cfg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_enhance_flags() {
        let cli = Cli::try_parse_from([
            "subtide",
            "enhance",
            "--segments",
            "in.json",
            "--vad-engine",
            "webrtc",
            "--pipeline",
            "vad,split",
        ])
        .unwrap();
        let Command::Enhance(args) = cli.command else {
            panic!("expected enhance");
        };
        assert_eq!(args.config.vad_engine, Some(VadEngineKind::Webrtc));
        assert_eq!(args.config.pipeline.as_deref(), Some("vad,split"));
    }
}
