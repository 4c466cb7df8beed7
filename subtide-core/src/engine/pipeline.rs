//! Sequential pipeline runner.
//!
//! ## Per component
//!
//! ```text
//! 1. is_available()? no → record DependencyUnavailable, keep segments
//! 2. process(&current, job) inside catch_unwind
//! 3. Ok  → current = output, record detail
//!    Err → record error, keep current (the stage's own input)
//! ```
//!
//! Runs synchronously on the caller's thread. Batch callers wrap `run` in
//! `spawn_blocking`.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{error, info, info_span, warn};

use crate::error::SubtideError;
use crate::segment::EnhancedSegment;

use super::{ComponentDetail, ComponentMetrics, Enhancer, JobContext, PipelineMetrics};

pub struct EnhancementPipeline {
    components: Vec<Box<dyn Enhancer>>,
}

impl EnhancementPipeline {
    pub fn new(components: Vec<Box<dyn Enhancer>>) -> Self {
        Self { components }
    }

    /// A pipeline that returns its input untouched.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn component_names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Run every component in order. Never fails: stage errors end up in
    /// `component_metrics[].error`.
    pub fn run(
        &self,
        segments: &[EnhancedSegment],
        job: &JobContext,
    ) -> (Vec<EnhancedSegment>, PipelineMetrics) {
        let started = Instant::now();
        let span = info_span!(
            "enhance",
            components = self.components.len(),
            segments = segments.len(),
            audio = ?job.audio_path,
        );
        let _enter = span.enter();

        let mut metrics = PipelineMetrics {
            components_configured: self.components.len(),
            input_segments: segments.len(),
            component_names: self
                .component_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            ..Default::default()
        };

        let mut current = segments.to_vec();
        for component in &self.components {
            let entry = run_component(component.as_ref(), &mut current, job);
            if entry.succeeded() {
                metrics.components_executed += 1;
            }
            metrics.component_metrics.push(entry);
        }

        metrics.output_segments = current.len();
        metrics.enhancements = applied_labels(&current);
        metrics.total_duration_ms = elapsed_ms(started);

        match metrics.to_json() {
            Ok(json) => info!(metrics = %json, "enhancement finished"),
            Err(e) => warn!("could not serialize pipeline metrics: {e}"),
        }
        (current, metrics)
    }
}

impl std::fmt::Debug for EnhancementPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnhancementPipeline")
            .field("components", &self.component_names())
            .finish()
    }
}

/// Run one stage; on success `current` is replaced by its output.
fn run_component(
    component: &dyn Enhancer,
    current: &mut Vec<EnhancedSegment>,
    job: &JobContext,
) -> ComponentMetrics {
    let name = component.name();
    let span = info_span!("component", name);
    let _enter = span.enter();
    let started = Instant::now();

    if !component.is_available() {
        let err = SubtideError::unavailable(name, "availability probe failed");
        warn!("{err}; skipping");
        return ComponentMetrics {
            name: name.to_string(),
            duration_ms: elapsed_ms(started),
            error: Some(err.to_string()),
            detail: ComponentDetail::Skipped,
        };
    }

    let input = current.as_slice();
    let result = panic::catch_unwind(AssertUnwindSafe(|| component.process(input, job)))
        .unwrap_or_else(|payload| {
            Err(SubtideError::ComponentExecution {
                component: name,
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            })
        });
    let duration_ms = elapsed_ms(started);

    match result {
        Ok((output, detail)) => {
            info!(
                duration_ms,
                input = current.len(),
                output = output.len(),
                "component finished"
            );
            *current = output;
            ComponentMetrics {
                name: name.to_string(),
                duration_ms,
                error: None,
                detail,
            }
        }
        Err(e) => {
            error!(duration_ms, error = %e, "component failed; passing its input through");
            ComponentMetrics {
                name: name.to_string(),
                duration_ms,
                error: Some(e.to_string()),
                detail: ComponentDetail::Skipped,
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}

fn applied_labels(segments: &[EnhancedSegment]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for label in segments.iter().flat_map(|s| &s.enhancements_applied) {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    labels
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
