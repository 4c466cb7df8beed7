//! Silero neural speech detector (`"silero"`).
//!
//! The ONNX session (feature `onnx`) produces one speech probability per
//! 512-sample window at 16 kHz. [`probabilities_to_spans`] turns those into
//! spans with onset/offset hysteresis and is compiled in every build.
//!
//! The session is loaded lazily on first detection, under the lock held by
//! the shared [`SileroHandle`], so concurrent jobs never load it twice.
//!
//! ## Model I/O
//!
//! | Name     | Shape       | DType | Notes              |
//! |----------|-------------|-------|--------------------|
//! | `input`  | `[1, 512]`  | f32   |                    |
//! | `sr`     | `[1]`       | i64   | optional           |
//! | `h`/`c`  | `[2,1,64]`  | f32   | v3/v4 LSTM state   |
//! | `state`  | `[2,1,128]` | f32   | v5 GRU state       |
//! | `output` | `[1, 1]`    | f32   | speech probability |

use std::path::{Path, PathBuf};
#[cfg(feature = "onnx")]
use std::sync::Arc;

#[cfg(feature = "onnx")]
use parking_lot::Mutex;

use super::{SpeechDetector, SpeechSpan};
use crate::config::VadConfig;
use crate::error::{Result, SubtideError};

/// Fixed model sample rate.
pub const SILERO_SAMPLE_RATE: u32 = 16_000;
/// Window size expected by Silero VAD (samples at 16 kHz = 32 ms).
pub const SILERO_WINDOW: usize = 512;

/// Hysteresis parameters for [`probabilities_to_spans`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanParams {
    /// A window at or above this probability opens (or keeps open) a span.
    pub onset: f32,
    /// A window below this probability starts a candidate silence.
    pub offset: f32,
    /// Candidate silence must last this long (seconds) to close a span.
    pub min_silence_secs: f64,
    /// Closed spans shorter than this (seconds) are discarded.
    pub min_speech_secs: f64,
}

impl SpanParams {
    pub fn from_config(cfg: &VadConfig) -> Self {
        Self {
            onset: cfg.onset_threshold,
            offset: cfg.offset_threshold.min(cfg.onset_threshold),
            min_silence_secs: cfg.max_silence_ms as f64 / 1000.0,
            min_speech_secs: cfg.min_speech_ms as f64 / 1000.0,
        }
    }
}

/// Convert per-window speech probabilities into spans (seconds).
///
/// Sample indices are converted to seconds at [`SILERO_SAMPLE_RATE`].
pub fn probabilities_to_spans(probs: &[f32], params: &SpanParams) -> Vec<SpeechSpan> {
    let rate = SILERO_SAMPLE_RATE as f64;
    let min_silence = (params.min_silence_secs * rate) as usize;
    let min_speech = (params.min_speech_secs * rate) as usize;
    let total = probs.len() * SILERO_WINDOW;

    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    let mut silence_from: Option<usize> = None;

    let close = |start: usize, end: usize, spans: &mut Vec<SpeechSpan>| {
        if end.saturating_sub(start) >= min_speech {
            spans.push(SpeechSpan::new(start as f64 / rate, end as f64 / rate));
        }
    };

    for (idx, &prob) in probs.iter().enumerate() {
        let sample = idx * SILERO_WINDOW;
        if prob >= params.onset {
            silence_from = None;
            if open.is_none() {
                open = Some(sample);
            }
            continue;
        }
        let Some(start) = open else { continue };
        if prob < params.offset {
            let from = *silence_from.get_or_insert(sample);
            if sample + SILERO_WINDOW - from >= min_silence {
                close(start, from, &mut spans);
                open = None;
                silence_from = None;
            }
        }
    }
    if let Some(start) = open {
        close(start, silence_from.unwrap_or(total), &mut spans);
    }
    spans
}

/// Platform default location of `silero_vad.onnx`.
pub fn default_model_path() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("subtide")
        .join("models")
        .join("silero_vad.onnx")
}

/// Shared, lazily-populated model slot. Clones share one session.
///
/// Without the `onnx` feature there is nothing to hold and the handle is
/// empty.
#[derive(Clone, Default)]
pub struct SileroHandle {
    #[cfg(feature = "onnx")]
    slot: Arc<Mutex<Option<session::SileroSession>>>,
}

impl SileroHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session has been loaded into this slot.
    #[cfg(feature = "onnx")]
    pub fn is_loaded(&self) -> bool {
        self.slot.lock().is_some()
    }

    #[cfg(not(feature = "onnx"))]
    pub fn is_loaded(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for SileroHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SileroHandle").finish_non_exhaustive()
    }
}

/// Neural speech detector backed by a shared [`SileroHandle`].
#[derive(Debug, Clone)]
pub struct SileroEngine {
    model_path: PathBuf,
    params: SpanParams,
    handle: SileroHandle,
}

impl SileroEngine {
    pub fn new(model_path: PathBuf, params: SpanParams, handle: SileroHandle) -> Self {
        Self {
            model_path,
            params,
            handle,
        }
    }

    pub fn from_config(cfg: &VadConfig, handle: SileroHandle) -> Self {
        let model_path = cfg
            .silero_model_path
            .clone()
            .unwrap_or_else(default_model_path);
        Self::new(model_path, SpanParams::from_config(cfg), handle)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl SpeechDetector for SileroEngine {
    fn name(&self) -> &'static str {
        "silero"
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "onnx") && self.model_path.is_file()
    }

    #[cfg(feature = "onnx")]
    fn detect_speech(&self, audio_path: &Path) -> Result<Vec<SpeechSpan>> {
        use crate::audio::{decode_wav, resample::resample_to};

        let buffer = decode_wav(audio_path)?;
        let buffer = resample_to(&buffer, SILERO_SAMPLE_RATE)?;

        let probs = {
            let mut slot = self.handle.slot.lock();
            if slot.is_none() {
                *slot = Some(session::SileroSession::load(&self.model_path)?);
            }
            match slot.as_mut() {
                Some(session) => session.speech_probabilities(&buffer.samples)?,
                None => return Ok(Vec::new()),
            }
        };

        let spans = probabilities_to_spans(&probs, &self.params);
        tracing::debug!(windows = probs.len(), spans = spans.len(), "silero vad classified");
        Ok(spans)
    }

    #[cfg(not(feature = "onnx"))]
    fn detect_speech(&self, _audio_path: &Path) -> Result<Vec<SpeechSpan>> {
        Err(SubtideError::unavailable(
            "silero",
            "built without the `onnx` feature",
        ))
    }
}

#[cfg(feature = "onnx")]
mod session {
    use std::path::Path;

    use ndarray::{Array1, Array2, Array3};
    use ort::session::builder::SessionBuilder;
    use ort::session::{Session, SessionInputValue};
    use ort::value::Value;
    use tracing::{info, warn};

    use super::{Result, SubtideError, SILERO_SAMPLE_RATE, SILERO_WINDOW};

    fn onnx_err(e: impl std::fmt::Display) -> SubtideError {
        SubtideError::OnnxSession(e.to_string())
    }

    /// Recurrent state layout, detected from the model's input names.
    enum Recurrent {
        /// v3/v4: separate `h`/`c` tensors, each `[2,1,64]`.
        Lstm {
            inputs: (String, String),
            outputs: (String, String),
            h: Vec<f32>,
            c: Vec<f32>,
        },
        /// v5: single `state` tensor `[2,1,128]`.
        Gru {
            input: String,
            output: String,
            state: Vec<f32>,
        },
        Stateless,
    }

    impl Recurrent {
        fn clear(&mut self) {
            match self {
                Recurrent::Lstm { h, c, .. } => {
                    h.iter_mut().for_each(|v| *v = 0.0);
                    c.iter_mut().for_each(|v| *v = 0.0);
                }
                Recurrent::Gru { state, .. } => state.iter_mut().for_each(|v| *v = 0.0),
                Recurrent::Stateless => {}
            }
        }
    }

    pub(super) struct SileroSession {
        session: Session,
        input_name: String,
        sr_name: Option<String>,
        output_name: String,
        recurrent: Recurrent,
    }

    fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
        preferred.iter().find_map(|needle| {
            candidates
                .iter()
                .find(|name| name.eq_ignore_ascii_case(needle))
                .cloned()
        })
    }

    impl SileroSession {
        pub(super) fn load(path: &Path) -> Result<Self> {
            if !path.is_file() {
                return Err(SubtideError::unavailable(
                    "silero",
                    format!("model file not found: {}", path.display()),
                ));
            }

            let session = SessionBuilder::new()
                .map_err(onnx_err)?
                .commit_from_file(path)
                .map_err(onnx_err)?;

            let inputs: Vec<String> = session
                .inputs()
                .iter()
                .map(|outlet| outlet.name().to_string())
                .collect();
            let outputs: Vec<String> = session
                .outputs()
                .iter()
                .map(|outlet| outlet.name().to_string())
                .collect();

            let input_name = resolve_name(&inputs, &["input", "audio", "x"])
                .or_else(|| inputs.first().cloned())
                .ok_or_else(|| onnx_err("Silero model has no inputs"))?;
            let output_name = resolve_name(&outputs, &["output", "speech_prob", "prob"])
                .or_else(|| outputs.first().cloned())
                .ok_or_else(|| onnx_err("Silero model has no outputs"))?;
            let sr_name = resolve_name(&inputs, &["sr", "sample_rate"]);

            let lstm = (
                resolve_name(&inputs, &["h", "state_h"]),
                resolve_name(&inputs, &["c", "state_c"]),
                resolve_name(&outputs, &["hn", "state_hn", "h_out"]),
                resolve_name(&outputs, &["cn", "state_cn", "c_out"]),
            );
            let recurrent = match lstm {
                (Some(h_in), Some(c_in), Some(h_out), Some(c_out)) => Recurrent::Lstm {
                    inputs: (h_in, c_in),
                    outputs: (h_out, c_out),
                    h: vec![0.0; 128],
                    c: vec![0.0; 128],
                },
                _ => match (
                    resolve_name(&inputs, &["state", "h_0", "hidden"]),
                    resolve_name(&outputs, &["stateN", "state_out", "hn_out"]),
                ) {
                    (Some(input), Some(output)) => Recurrent::Gru {
                        input,
                        output,
                        state: vec![0.0; 256],
                    },
                    _ => Recurrent::Stateless,
                },
            };

            info!(
                path = %path.display(),
                inputs = ?inputs,
                outputs = ?outputs,
                "silero vad model loaded"
            );

            Ok(Self {
                session,
                input_name,
                sr_name,
                output_name,
                recurrent,
            })
        }

        /// One probability per window; the last window is zero-padded.
        pub(super) fn speech_probabilities(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
            self.recurrent.clear();
            let mut probs = Vec::with_capacity(samples.len() / SILERO_WINDOW + 1);
            let mut window = [0f32; SILERO_WINDOW];
            for chunk in samples.chunks(SILERO_WINDOW) {
                window[..chunk.len()].copy_from_slice(chunk);
                window[chunk.len()..].iter_mut().for_each(|s| *s = 0.0);
                probs.push(self.run_window(&window)?);
            }
            Ok(probs)
        }

        fn run_window(&mut self, window: &[f32]) -> Result<f32> {
            let input = Array2::<f32>::from_shape_vec((1, SILERO_WINDOW), window.to_vec())
                .map_err(onnx_err)?;
            let mut feeds: Vec<(String, SessionInputValue<'_>)> = vec![(
                self.input_name.clone(),
                Value::from_array(input).map_err(onnx_err)?.into(),
            )];

            if let Some(sr_name) = &self.sr_name {
                let sr = Array1::<i64>::from_elem(1, SILERO_SAMPLE_RATE as i64);
                feeds.push((sr_name.clone(), Value::from_array(sr).map_err(onnx_err)?.into()));
            }

            match &self.recurrent {
                Recurrent::Lstm {
                    inputs: (h_name, c_name),
                    h,
                    c,
                    ..
                } => {
                    let h = Array3::<f32>::from_shape_vec((2, 1, 64), h.clone()).map_err(onnx_err)?;
                    let c = Array3::<f32>::from_shape_vec((2, 1, 64), c.clone()).map_err(onnx_err)?;
                    feeds.push((h_name.clone(), Value::from_array(h).map_err(onnx_err)?.into()));
                    feeds.push((c_name.clone(), Value::from_array(c).map_err(onnx_err)?.into()));
                }
                Recurrent::Gru { input, state, .. } => {
                    let state =
                        Array3::<f32>::from_shape_vec((2, 1, 128), state.clone()).map_err(onnx_err)?;
                    feeds.push((input.clone(), Value::from_array(state).map_err(onnx_err)?.into()));
                }
                Recurrent::Stateless => {}
            }

            let outputs = self.session.run(feeds).map_err(onnx_err)?;

            let prob = match outputs.get(self.output_name.as_str()) {
                Some(value) => {
                    let (_, data) = value.try_extract_tensor::<f32>().map_err(onnx_err)?;
                    data.first().copied().unwrap_or(0.0)
                }
                None => 0.0,
            };

            let mut lost_state = false;
            match &mut self.recurrent {
                Recurrent::Lstm {
                    outputs: (hn, cn),
                    h,
                    c,
                    ..
                } => match (outputs.get(hn.as_str()), outputs.get(cn.as_str())) {
                    (Some(hn), Some(cn)) => {
                        *h = hn.try_extract_tensor::<f32>().map_err(onnx_err)?.1.to_vec();
                        *c = cn.try_extract_tensor::<f32>().map_err(onnx_err)?.1.to_vec();
                    }
                    _ => lost_state = true,
                },
                Recurrent::Gru { output, state, .. } => match outputs.get(output.as_str()) {
                    Some(next) => {
                        *state = next.try_extract_tensor::<f32>().map_err(onnx_err)?.1.to_vec();
                    }
                    None => lost_state = true,
                },
                Recurrent::Stateless => {}
            }
            drop(outputs);
            if lost_state {
                warn!("silero state outputs missing; continuing stateless");
                self.recurrent = Recurrent::Stateless;
            }

            Ok(prob)
        }
    }
}
