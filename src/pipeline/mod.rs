pub mod context;
pub mod metrics;
pub mod stage;

pub use context::{ContextValue, PipelineContext};
pub use metrics::{CollectingMetricsSink, LogMetricsSink, MetricsSink, StageMetric};
pub use stage::{ContextFn, Processor, Stage, StageBody, StageOutput, StageStatus};

use crate::error::VideoForgeError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-stage entry in the pipeline report.
#[derive(Debug, Clone)]
pub struct StageSummary {
    pub name: &'static str,
    pub status: StageStatus,
    pub duration: Duration,
}

/// Outcome of a full pipeline run. On failure, `error` carries the wrapped
/// message naming the failing stage.
#[derive(Debug)]
pub struct PipelineReport {
    pub success: bool,
    pub total_duration: Duration,
    pub stages: Vec<StageSummary>,
    pub failed_stage: Option<&'static str>,
    pub error: Option<String>,
}

impl PipelineReport {
    /// Convert a failed report into the stage-level error it recorded.
    pub fn into_error(self) -> Option<VideoForgeError> {
        match (self.failed_stage, self.error) {
            (Some(stage), Some(message)) => Some(VideoForgeError::Processing {
                stage: stage.to_string(),
                message,
            }),
            (None, Some(message)) => Some(VideoForgeError::Processing {
                stage: "pipeline".to_string(),
                message,
            }),
            _ => None,
        }
    }
}

/// An ordered list of stages executed sequentially against one context.
/// Parallelism lives inside stage bodies, never between stages.
pub struct Pipeline {
    stages: Vec<Stage>,
    metrics: Arc<dyn MetricsSink>,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            metrics: Arc::new(LogMetricsSink),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    /// Run every stage in order. Always returns a report; a failed stage
    /// aborts the remainder and the report carries the wrapped error.
    pub async fn execute(&self, ctx: &mut PipelineContext) -> PipelineReport {
        let start = Instant::now();
        let total = self.stages.len();
        let mut summaries: Vec<StageSummary> = Vec::with_capacity(total);
        let mut failed_stage = None;
        let mut error = None;

        for (idx, stage) in self.stages.iter().enumerate() {
            if self.cancelled.load(Ordering::Relaxed) {
                warn!("pipeline cancelled before stage '{}'", stage.name);
                failed_stage = Some(stage.name);
                error = Some(VideoForgeError::Cancelled.to_string());
                break;
            }

            if let Some(predicate) = stage.skip_when {
                if predicate(ctx) {
                    debug!("skipping stage '{}'", stage.name);
                    summaries.push(StageSummary {
                        name: stage.name,
                        status: StageStatus::Skipped,
                        duration: Duration::ZERO,
                    });
                    continue;
                }
            }

            let missing = ctx.missing_keys(stage.required_inputs);
            if !missing.is_empty() {
                let message = format!("missing required inputs: {}", missing.join(", "));
                self.metrics
                    .record(stage.name, false, Duration::ZERO, 0, Some(&message));
                summaries.push(StageSummary {
                    name: stage.name,
                    status: StageStatus::Failed,
                    duration: Duration::ZERO,
                });
                failed_stage = Some(stage.name);
                error = Some(message);
                break;
            }

            info!("[{}/{}] running stage '{}'", idx + 1, total, stage.name);
            let stage_start = Instant::now();

            let result = match &stage.body {
                StageBody::Processor {
                    input_key,
                    processor,
                } => match ctx.get(input_key) {
                    Some(input) => {
                        // The processor borrows the input out of the bag, so
                        // it runs against a clone and writes back via the
                        // output key.
                        let input = input.clone();
                        processor.process(&input, ctx).await
                    }
                    None => Err(VideoForgeError::processing(
                        stage.name,
                        format!("input key '{}' not present", input_key),
                    )),
                },
                StageBody::Function(func) => func.call(ctx).await,
            };

            let duration = stage_start.elapsed();

            match result {
                Ok(output) => {
                    self.metrics.record(
                        stage.name,
                        true,
                        duration,
                        output.items_processed,
                        None,
                    );
                    ctx.set(stage.output_key, output.value);
                    summaries.push(StageSummary {
                        name: stage.name,
                        status: StageStatus::Completed,
                        duration,
                    });
                    info!(
                        "stage '{}' completed in {:.2}s",
                        stage.name,
                        duration.as_secs_f64()
                    );
                }
                Err(e) => {
                    let message = e.to_string();
                    self.metrics
                        .record(stage.name, false, duration, 0, Some(&message));
                    summaries.push(StageSummary {
                        name: stage.name,
                        status: StageStatus::Failed,
                        duration,
                    });
                    warn!("stage '{}' failed: {}", stage.name, message);
                    failed_stage = Some(stage.name);
                    error = Some(message);
                    break;
                }
            }
        }

        PipelineReport {
            success: error.is_none(),
            total_duration: start.elapsed(),
            stages: summaries,
            failed_stage,
            error,
        }
    }
}
