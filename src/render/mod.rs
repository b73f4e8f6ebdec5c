pub mod audio;
pub mod ffmpeg;
pub mod image;
pub mod segment;
pub mod text;

pub use ffmpeg::Toolchain;
pub use segment::render_segment_clip;

use crate::config::Config;
use crate::error::{Result, VideoForgeError};
use crate::spec::Segment;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

/// One rendered per-segment clip, in input order.
#[derive(Debug, Clone)]
pub struct RenderedClip {
    pub id: String,
    pub path: PathBuf,
}

/// Renders every segment into its own clip. Rendering is CPU-heavy, so the
/// fan-out defaults to a single concurrent segment.
pub struct Renderer {
    toolchain: Toolchain,
    config: Config,
    max_concurrent: usize,
    cancelled: Arc<AtomicBool>,
}

impl Renderer {
    pub fn new(config: &Config) -> Self {
        Self {
            toolchain: Toolchain::from_config(config),
            config: config.clone(),
            max_concurrent: config.max_concurrent_segments,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub async fn render_all(&self, segments: &[Segment], temp_dir: &Path) -> Result<Vec<RenderedClip>> {
        if segments.is_empty() {
            return Err(VideoForgeError::processing(
                "segment_renderer",
                "no segments to render",
            ));
        }

        info!(
            "rendering {} segments (concurrency {})",
            segments.len(),
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut futures = FuturesUnordered::new();

        for (index, segment) in segments.iter().enumerate() {
            let sem = semaphore.clone();
            let future = async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                if self.cancelled.load(Ordering::Relaxed) {
                    return (index, Err(VideoForgeError::Cancelled));
                }
                let result =
                    render_segment_clip(&self.toolchain, &self.config, segment, temp_dir).await;
                (index, result)
            };
            futures.push(future);
        }

        let mut results: Vec<Option<Result<RenderedClip>>> =
            (0..segments.len()).map(|_| None).collect();
        while let Some((index, result)) = futures.next().await {
            results[index] = Some(result);
        }

        let mut clips = Vec::with_capacity(segments.len());
        for (segment, result) in segments.iter().zip(results.into_iter()) {
            match result {
                Some(Ok(clip)) => clips.push(clip),
                Some(Err(e)) => {
                    return Err(VideoForgeError::processing(
                        "segment_renderer",
                        format!("failed to render segment '{}': {}", segment.id, e),
                    ));
                }
                None => {
                    return Err(VideoForgeError::processing(
                        "segment_renderer",
                        format!("segment '{}' produced no result", segment.id),
                    ));
                }
            }
        }

        Ok(clips)
    }
}
