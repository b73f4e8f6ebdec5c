use crate::agent::AgentClient;
use crate::align::TranscriptAligner;
use crate::concat::Concatenator;
use crate::config::Config;
use crate::enrich::ImageQualifier;
use crate::error::{Result, VideoForgeError};
use crate::fetch::Fetcher;
use crate::pipeline::{
    ContextFn, ContextValue, Pipeline, PipelineContext, PipelineReport, Processor, Stage,
    StageOutput,
};
use crate::render::{Renderer, Toolchain};
use crate::resource::TempDirGuard;
use crate::spec::BackgroundMusic;
use crate::upload::Uploader;
use crate::validate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Job lifecycle states as persisted by the job store collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

/// Result of one completed job.
#[derive(Debug)]
pub struct JobOutcome {
    pub video_id: String,
    pub output_path: PathBuf,
    pub result_url: String,
    pub report: PipelineReport,
}

struct ValidateStage {
    agent: Arc<AgentClient>,
}

#[async_trait]
impl Processor for ValidateStage {
    async fn process(&self, input: &ContextValue, _ctx: &PipelineContext) -> Result<StageOutput> {
        let data = input
            .as_json()
            .ok_or_else(|| VideoForgeError::Validation("expected raw JSON input".to_string()))?
            .clone();
        let spec = validate::validate_spec(&self.agent, data).await?;
        let count = spec.segments.len();
        Ok(StageOutput::new(ContextValue::Spec(spec), count))
    }
}

struct FetchStage {
    fetcher: Fetcher,
}

#[async_trait]
impl Processor for FetchStage {
    async fn process(&self, input: &ContextValue, ctx: &PipelineContext) -> Result<StageOutput> {
        let spec = input
            .as_spec()
            .ok_or_else(|| VideoForgeError::Validation("expected validated spec".to_string()))?;
        let assets = self.fetcher.fetch_all(spec, &ctx.temp_dir).await?;
        let count = assets.segments.len();
        Ok(StageOutput::new(ContextValue::Assets(assets), count))
    }
}

struct EnrichStage {
    qualifier: ImageQualifier,
}

#[async_trait]
impl ContextFn for EnrichStage {
    async fn call(&self, ctx: &PipelineContext) -> Result<StageOutput> {
        let spec = ctx
            .get("spec")
            .and_then(ContextValue::as_spec)
            .ok_or_else(|| VideoForgeError::Validation("spec missing from context".to_string()))?;
        let assets = ctx
            .get("assets")
            .and_then(ContextValue::as_assets)
            .ok_or_else(|| VideoForgeError::Validation("assets missing from context".to_string()))?;
        let segments = self.qualifier.enrich(spec, assets, &ctx.temp_dir).await?;
        let count = segments.len();
        Ok(StageOutput::new(ContextValue::Segments(segments), count))
    }
}

struct AlignStage {
    aligner: TranscriptAligner,
}

#[async_trait]
impl Processor for AlignStage {
    async fn process(&self, input: &ContextValue, _ctx: &PipelineContext) -> Result<StageOutput> {
        let segments = input
            .as_segments()
            .ok_or_else(|| VideoForgeError::Validation("expected segment list".to_string()))?;
        let aligned = self.aligner.align_all(segments).await?;
        let count = aligned.iter().filter(|s| s.text_over.is_some()).count();
        Ok(StageOutput::new(ContextValue::Segments(aligned), count))
    }
}

struct RenderStage {
    renderer: Renderer,
}

#[async_trait]
impl Processor for RenderStage {
    async fn process(&self, input: &ContextValue, ctx: &PipelineContext) -> Result<StageOutput> {
        let segments = input
            .as_segments()
            .ok_or_else(|| VideoForgeError::Validation("expected segment list".to_string()))?;
        let clips = self.renderer.render_all(segments, &ctx.temp_dir).await?;
        let count = clips.len();
        Ok(StageOutput::new(ContextValue::Clips(clips), count))
    }
}

struct ConcatStage {
    concatenator: Concatenator,
    output_dir: PathBuf,
}

#[async_trait]
impl ContextFn for ConcatStage {
    async fn call(&self, ctx: &PipelineContext) -> Result<StageOutput> {
        let clips = ctx
            .get("clips")
            .and_then(ContextValue::as_clips)
            .ok_or_else(|| VideoForgeError::Validation("clips missing from context".to_string()))?;

        // Rebuild the music descriptor with the fetched local path.
        let spec = ctx.get("spec").and_then(ContextValue::as_spec);
        let music_record = ctx
            .get("assets")
            .and_then(ContextValue::as_assets)
            .and_then(|a| a.background_music.as_ref());
        let background_music = match (spec.and_then(|s| s.background_music.as_ref()), music_record)
        {
            (Some(music), Some(record)) => Some(BackgroundMusic {
                url: music.url.clone(),
                start_delay: music.start_delay,
                local_path: Some(record.local_path.clone()),
            }),
            _ => None,
        };

        let output_path = self
            .output_dir
            .join(format!("final_video_{}.mp4", ctx.video_id));
        let path = self
            .concatenator
            .concatenate(clips, background_music.as_ref(), &output_path, &ctx.temp_dir)
            .await?;
        let count = clips.len();
        Ok(StageOutput::new(ContextValue::Path(path), count))
    }
}

struct UploadStage {
    uploader: Uploader,
}

#[async_trait]
impl Processor for UploadStage {
    async fn process(&self, input: &ContextValue, ctx: &PipelineContext) -> Result<StageOutput> {
        let path = input
            .as_path()
            .ok_or_else(|| VideoForgeError::Validation("expected output path".to_string()))?;
        let url = self.uploader.upload(path, &ctx.video_id).await?;
        Ok(StageOutput::single(ContextValue::Url(url)))
    }
}

/// The static stage table: constructor-wired, strictly ordered. Parallelism
/// lives inside the stage bodies; the cancellation flag reaches every
/// fan-out loop so outstanding tasks stop with the job.
pub fn build_pipeline(
    config: &Config,
    show_progress: bool,
    cancelled: Arc<AtomicBool>,
) -> Pipeline {
    let stages = vec![
        Stage::processor(
            "validation",
            "spec_json",
            "spec",
            &["spec_json"],
            Box::new(ValidateStage {
                agent: Arc::new(AgentClient::from_config(config)),
            }),
        ),
        Stage::processor(
            "asset_fetch",
            "spec",
            "assets",
            &["spec"],
            Box::new(FetchStage {
                fetcher: Fetcher::new(config.download_max_concurrent, config.download_timeout())
                    .with_progress(show_progress)
                    .with_cancellation(cancelled.clone()),
            }),
        ),
        Stage::function(
            "image_qualifier",
            "segments",
            &["spec", "assets"],
            Box::new(EnrichStage {
                qualifier: ImageQualifier::new(config, AgentClient::from_config(config)),
            }),
        ),
        Stage::processor(
            "transcript_alignment",
            "segments",
            "aligned_segments",
            &["segments"],
            Box::new(AlignStage {
                aligner: TranscriptAligner::new(config, AgentClient::from_config(config))
                    .with_cancellation(cancelled.clone()),
            }),
        ),
        Stage::processor(
            "segment_renderer",
            "aligned_segments",
            "clips",
            &["aligned_segments"],
            Box::new(RenderStage {
                renderer: Renderer::new(config).with_cancellation(cancelled.clone()),
            }),
        ),
        Stage::function(
            "concatenation",
            "output_path",
            &["clips", "spec", "assets"],
            Box::new(ConcatStage {
                concatenator: Concatenator::new(config),
                output_dir: config.output_dir.clone(),
            }),
        ),
        Stage::processor(
            "upload",
            "output_path",
            "result_url",
            &["output_path"],
            Box::new(UploadStage {
                uploader: Uploader::new(config),
            }),
        ),
    ];

    Pipeline::new(stages).with_cancellation(cancelled)
}

/// Run one job end to end with a fresh job identifier.
pub async fn run_job(
    spec_json: serde_json::Value,
    config: &Config,
    cancelled: Arc<AtomicBool>,
    show_progress: bool,
) -> Result<JobOutcome> {
    let video_id = Uuid::new_v4().simple().to_string();
    run_job_with_id(spec_json, config, cancelled, show_progress, video_id).await
}

/// Run one job end to end: create the scoped temp dir, execute the stage
/// table, and clean up whether the pipeline succeeded or not. The caller
/// may supply the job identifier so it can register the job before work
/// starts.
pub async fn run_job_with_id(
    spec_json: serde_json::Value,
    config: &Config,
    cancelled: Arc<AtomicBool>,
    show_progress: bool,
    video_id: String,
) -> Result<JobOutcome> {
    Toolchain::from_config(config).check_available().await?;

    let guard = TempDirGuard::create(config)?;
    info!("job {} starting (temp dir {})", video_id, guard.path().display());

    let mut ctx = PipelineContext::new(video_id.clone(), guard.path());
    ctx.set("spec_json", ContextValue::Json(spec_json));

    let pipeline = build_pipeline(config, show_progress, cancelled);
    let report = pipeline.execute(&mut ctx).await;

    // Cleanup runs on success and on failure alike.
    guard.cleanup().await;

    if !report.success {
        return Err(report
            .into_error()
            .unwrap_or_else(|| VideoForgeError::processing("pipeline", "unknown failure")));
    }

    let output_path = ctx
        .get("output_path")
        .and_then(ContextValue::as_path)
        .cloned()
        .ok_or_else(|| VideoForgeError::processing("pipeline", "no output path produced"))?;
    let result_url = ctx
        .get("result_url")
        .and_then(ContextValue::as_url)
        .map(str::to_string)
        .ok_or_else(|| VideoForgeError::processing("pipeline", "no result URL produced"))?;

    info!("job {} done: {}", video_id, result_url);
    Ok(JobOutcome {
        video_id,
        output_path,
        result_url,
        report,
    })
}

/// Print a human-readable summary of a finished job.
pub fn print_summary(outcome: &JobOutcome) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Video Assembly Complete                   ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Job:        {}", outcome.video_id);
    println!("  Output:     {}", outcome.output_path.display());
    println!("  Result:     {}", outcome.result_url);
    println!(
        "  Total:      {:.2}s",
        outcome.report.total_duration.as_secs_f64()
    );
    println!();
    println!("  Stages:");
    for stage in &outcome.report.stages {
        println!(
            "    {:<22} {:<10} {:.2}s",
            stage.name,
            stage.status.to_string(),
            stage.duration.as_secs_f64()
        );
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_serde_tags() {
        assert_eq!(serde_json::to_string(&JobStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&JobStatus::Done).unwrap(), "\"done\"");
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"failed\"");
        let status: JobStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, JobStatus::Failed);
    }

    #[test]
    fn test_pipeline_stage_order() {
        let pipeline = build_pipeline(
            &Config::default(),
            false,
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "validation",
                "asset_fetch",
                "image_qualifier",
                "transcript_alignment",
                "segment_renderer",
                "concatenation",
                "upload"
            ]
        );
    }
}
