//! Enhancement configuration loading (JSON file + `SUBTIDE_*` overrides).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use subtide_core::{EnhancementConfig, VadEngineKind};
use tracing::{debug, warn};

/// Options a user may override per invocation.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub pipeline: Option<String>,
    pub vad_engine: Option<VadEngineKind>,
    pub max_duration: Option<f64>,
    pub max_chars: Option<usize>,
}

/// Load the configuration for one invocation.
///
/// An explicit `path` must exist and parse. Without one, the default location
/// is tried and silently skipped when missing or broken. Environment
/// variables override the file; `overrides` (command-line flags) override
/// both.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<EnhancementConfig> {
    let mut cfg = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EnhancementConfig::from_json(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => load_default(&default_config_path()),
    };

    apply_env(&mut cfg)?;
    apply_overrides(&mut cfg, overrides);
    cfg.normalize();
    Ok(cfg)
}

fn load_default(path: &Path) -> EnhancementConfig {
    match fs::read_to_string(path) {
        Ok(raw) => EnhancementConfig::from_json(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), "ignoring unreadable default config: {e}");
            EnhancementConfig::default()
        }),
        Err(_) => {
            debug!(path = %path.display(), "no default config; using built-in defaults");
            EnhancementConfig::default()
        }
    }
}

fn apply_env(cfg: &mut EnhancementConfig) -> anyhow::Result<()> {
    if let Ok(pipeline) = std::env::var("SUBTIDE_PIPELINE") {
        cfg.pipeline = pipeline;
    }
    if let Ok(engine) = std::env::var("SUBTIDE_VAD_ENGINE") {
        cfg.vad.engine = engine.parse().context("SUBTIDE_VAD_ENGINE")?;
    }
    if let Ok(model) = std::env::var("SUBTIDE_SILERO_MODEL") {
        cfg.vad.silero_model_path = Some(PathBuf::from(model));
    }
    Ok(())
}

fn apply_overrides(cfg: &mut EnhancementConfig, overrides: &Overrides) {
    if let Some(pipeline) = &overrides.pipeline {
        cfg.pipeline = pipeline.clone();
    }
    if let Some(engine) = overrides.vad_engine {
        cfg.vad.engine = engine;
    }
    if let Some(max_duration) = overrides.max_duration {
        cfg.split.max_duration = max_duration;
    }
    if let Some(max_chars) = overrides.max_chars {
        cfg.split.max_chars = max_chars;
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("subtide")
            .join("config.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("subtide")
            .join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{"pipeline":"vad,split","split":{"maxChars":80}}"#).unwrap();

        let overrides = Overrides {
            pipeline: Some("split".into()),
            max_chars: Some(40),
            ..Default::default()
        };
        let cfg = load_config(Some(&path), &overrides).unwrap();
        assert_eq!(cfg.component_names(), vec!["split"]);
        assert_eq!(cfg.split.max_chars, 40);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/cfg.json")), &Overrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("reading config"), "{err:#}");
    }

    #[test]
    fn broken_default_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let cfg = load_default(&path);
        assert_eq!(cfg.pipeline, subtide_core::config::DEFAULT_PIPELINE);
    }
}
