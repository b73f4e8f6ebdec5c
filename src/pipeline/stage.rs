use crate::error::Result;
use crate::pipeline::context::{ContextValue, PipelineContext};
use async_trait::async_trait;

/// Status of a single stage over the life of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// What a stage body hands back: the value to store under the stage's
/// output key, and how many items it processed (for the metrics sink).
#[derive(Debug)]
pub struct StageOutput {
    pub value: ContextValue,
    pub items_processed: usize,
}

impl StageOutput {
    pub fn new(value: ContextValue, items_processed: usize) -> Self {
        Self {
            value,
            items_processed,
        }
    }

    pub fn single(value: ContextValue) -> Self {
        Self::new(value, 1)
    }
}

/// A processor-backed stage body: receives the value stored at the stage's
/// input key, with read access to the rest of the context.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, input: &ContextValue, ctx: &PipelineContext) -> Result<StageOutput>;
}

/// A function-backed stage body: receives the whole context.
#[async_trait]
pub trait ContextFn: Send + Sync {
    async fn call(&self, ctx: &PipelineContext) -> Result<StageOutput>;
}

/// The two stage variants, dispatched by tag. Processor stages read their
/// declared input key; function stages see the whole context.
pub enum StageBody {
    Processor {
        input_key: &'static str,
        processor: Box<dyn Processor>,
    },
    Function(Box<dyn ContextFn>),
}

/// One unit of the pipeline: a name, declared inputs, an output key, and a
/// body. Stages are assembled into a static table in `job.rs`.
pub struct Stage {
    pub name: &'static str,
    pub required_inputs: &'static [&'static str],
    pub output_key: &'static str,
    pub body: StageBody,
    /// When set and returning true for the current context, the stage is
    /// skipped and the context is left untouched.
    pub skip_when: Option<fn(&PipelineContext) -> bool>,
}

impl Stage {
    pub fn processor(
        name: &'static str,
        input_key: &'static str,
        output_key: &'static str,
        required_inputs: &'static [&'static str],
        processor: Box<dyn Processor>,
    ) -> Self {
        Self {
            name,
            required_inputs,
            output_key,
            body: StageBody::Processor {
                input_key,
                processor,
            },
            skip_when: None,
        }
    }

    pub fn function(
        name: &'static str,
        output_key: &'static str,
        required_inputs: &'static [&'static str],
        func: Box<dyn ContextFn>,
    ) -> Self {
        Self {
            name,
            required_inputs,
            output_key,
            body: StageBody::Function(func),
            skip_when: None,
        }
    }

    pub fn with_skip_when(mut self, predicate: fn(&PipelineContext) -> bool) -> Self {
        self.skip_when = Some(predicate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Pending.to_string(), "pending");
        assert_eq!(StageStatus::Completed.to_string(), "completed");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_stage_output_single() {
        let output = StageOutput::single(ContextValue::Url("x".into()));
        assert_eq!(output.items_processed, 1);
    }
}
