use std::path::PathBuf;

use thiserror::Error;

/// All errors produced by subtide-core.
///
/// Only [`SubtideError::Configuration`] and [`SubtideError::UnknownComponent`]
/// ever reach the caller of a pipeline run. Everything else is raised inside a
/// component and converted into degraded output plus a metrics entry.
#[derive(Debug, Error)]
pub enum SubtideError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown pipeline component '{name}' (known: {known})")]
    UnknownComponent { name: String, known: String },

    #[error("{component} unavailable: {reason}")]
    DependencyUnavailable {
        component: &'static str,
        reason: String,
    },

    #[error("audio file rejected: {path}: {reason}")]
    AudioAccess { path: PathBuf, reason: String },

    #[error("audio decode failed: {path}: {source}")]
    AudioDecode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("{component} failed: {message}")]
    ComponentExecution {
        component: &'static str,
        message: String,
    },

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SubtideError {
    pub(crate) fn audio_access(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AudioAccess {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(component: &'static str, reason: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            component,
            reason: reason.into(),
        }
    }

    /// `true` for the errors that must abort before any audio is touched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SubtideError::Configuration(_) | SubtideError::UnknownComponent { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SubtideError>;
