use crate::error::{Result, VideoForgeError};
use crate::spec::{AssetKind, AssetRecord, FetchedAssets, SegmentAssets, VideoSpec};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One URL to pull down before the pipeline can continue.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Index into the spec's segment list; `None` for the global music bed.
    pub segment_index: Option<usize>,
    pub segment_id: String,
    pub kind: AssetKind,
    pub url: String,
    pub dest: PathBuf,
}

/// Destination filename carrying the URL's extension, `.tmp` otherwise.
fn destination_path(temp_dir: &Path, kind: AssetKind, url: &str) -> PathBuf {
    let path_part = url.split(['?', '#']).next().unwrap_or(url);
    let ext = Path::new(path_part)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| ".tmp".to_string());
    temp_dir.join(format!("{}_{}{}", kind, Uuid::new_v4().simple(), ext))
}

/// Flatten the spec into a list of download tasks: per-segment image, video
/// and voice-over URLs plus the global background music.
pub fn collect_download_tasks(spec: &VideoSpec, temp_dir: &Path) -> Vec<DownloadTask> {
    let mut tasks = Vec::new();

    for (index, segment) in spec.segments.iter().enumerate() {
        if let Some(image) = &segment.image {
            tasks.push(DownloadTask {
                segment_index: Some(index),
                segment_id: segment.id.clone(),
                kind: AssetKind::Image,
                url: image.url.clone(),
                dest: destination_path(temp_dir, AssetKind::Image, &image.url),
            });
        }
        if let Some(video) = &segment.video {
            tasks.push(DownloadTask {
                segment_index: Some(index),
                segment_id: segment.id.clone(),
                kind: AssetKind::Video,
                url: video.url.clone(),
                dest: destination_path(temp_dir, AssetKind::Video, &video.url),
            });
        }
        if let Some(voice_over) = &segment.voice_over {
            tasks.push(DownloadTask {
                segment_index: Some(index),
                segment_id: segment.id.clone(),
                kind: AssetKind::VoiceOver,
                url: voice_over.url.clone(),
                dest: destination_path(temp_dir, AssetKind::VoiceOver, &voice_over.url),
            });
        }
    }

    if let Some(music) = &spec.background_music {
        tasks.push(DownloadTask {
            segment_index: None,
            segment_id: "background_music".to_string(),
            kind: AssetKind::BackgroundMusic,
            url: music.url.clone(),
            dest: destination_path(temp_dir, AssetKind::BackgroundMusic, &music.url),
        });
    }

    tasks
}

/// Downloads all referenced assets concurrently under a semaphore. A single
/// failure fails the whole fetch; partial files are left to temp-dir
/// cleanup.
pub struct Fetcher {
    client: reqwest::Client,
    max_concurrent: usize,
    timeout: Duration,
    show_progress: bool,
    cancelled: Arc<AtomicBool>,
}

impl Fetcher {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_concurrent,
            timeout,
            show_progress: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    async fn download_one(&self, task: &DownloadTask) -> Result<()> {
        let response = tokio::time::timeout(self.timeout, self.client.get(&task.url).send())
            .await
            .map_err(|_| VideoForgeError::Download {
                kind: task.kind.to_string(),
                message: format!("timed out after {:?} fetching {}", self.timeout, task.url),
            })?
            .map_err(|e| VideoForgeError::Download {
                kind: task.kind.to_string(),
                message: e.to_string(),
            })?;

        let response = response
            .error_for_status()
            .map_err(|e| VideoForgeError::Download {
                kind: task.kind.to_string(),
                message: e.to_string(),
            })?;

        let mut file = tokio::fs::File::create(&task.dest).await?;
        let mut stream = response.bytes_stream().map_err(std::io::Error::other);
        let copy = async {
            while let Some(chunk) = stream.try_next().await? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<_, std::io::Error>(())
        };

        tokio::time::timeout(self.timeout, copy)
            .await
            .map_err(|_| VideoForgeError::Download {
                kind: task.kind.to_string(),
                message: format!("timed out after {:?} writing {}", self.timeout, task.url),
            })?
            .map_err(|e| VideoForgeError::Download {
                kind: task.kind.to_string(),
                message: format!("failed writing {}: {}", task.dest.display(), e),
            })?;

        debug!("downloaded {} -> {}", task.url, task.dest.display());
        Ok(())
    }

    /// Fetch every asset for the spec, returning per-segment records
    /// index-aligned with the input segments plus the optional global
    /// background-music record.
    pub async fn fetch_all(&self, spec: &VideoSpec, temp_dir: &Path) -> Result<FetchedAssets> {
        let tasks = collect_download_tasks(spec, temp_dir);
        if tasks.is_empty() {
            return Ok(FetchedAssets {
                segments: vec![SegmentAssets::default(); spec.segments.len()],
                background_music: None,
            });
        }

        info!(
            "downloading {} assets with up to {} concurrent requests",
            tasks.len(),
            self.max_concurrent
        );

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(tasks.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} assets")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut futures = FuturesUnordered::new();

        for (task_index, task) in tasks.iter().enumerate() {
            let sem = semaphore.clone();
            let pb = progress_bar.clone();
            let future = async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                if self.cancelled.load(Ordering::Relaxed) {
                    return (task_index, Err(VideoForgeError::Cancelled));
                }
                let result = self.download_one(task).await;
                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
                (task_index, result)
            };
            futures.push(future);
        }

        let mut outcomes: Vec<Option<Result<()>>> = (0..tasks.len()).map(|_| None).collect();
        while let Some((task_index, result)) = futures.next().await {
            outcomes[task_index] = Some(result);
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("downloads complete");
        }
        drop(futures);

        // First failure fails the whole stage; partial results are discarded.
        for (task, outcome) in tasks.iter().zip(outcomes.into_iter()) {
            if let Some(Err(err)) = outcome {
                warn!(
                    "download failed for segment '{}' ({}): {}",
                    task.segment_id, task.kind, err
                );
                return Err(err);
            }
        }

        let mut assets = FetchedAssets {
            segments: vec![SegmentAssets::default(); spec.segments.len()],
            background_music: None,
        };

        for task in tasks {
            let record = AssetRecord {
                url: task.url,
                local_path: task.dest,
                kind: task.kind,
            };
            match (task.segment_index, task.kind) {
                (Some(i), AssetKind::Image) => assets.segments[i].image = Some(record),
                (Some(i), AssetKind::Video) => assets.segments[i].video = Some(record),
                (Some(i), AssetKind::VoiceOver) => assets.segments[i].voice_over = Some(record),
                (None, AssetKind::BackgroundMusic) => assets.background_music = Some(record),
                _ => {}
            }
        }

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{MediaSource, Segment, VoiceOver};

    fn segment(id: &str, image_url: Option<&str>, voice_url: Option<&str>) -> Segment {
        Segment {
            id: id.to_string(),
            image: image_url.map(|u| MediaSource {
                url: u.to_string(),
                local_path: None,
            }),
            video: None,
            voice_over: voice_url.map(|u| VoiceOver {
                url: u.to_string(),
                content: "hello".to_string(),
                start_delay: 0.0,
                end_delay: 0.0,
                local_path: None,
            }),
            transition_in: None,
            transition_out: None,
            text_over: None,
        }
    }

    fn spec_with(segments: Vec<Segment>) -> VideoSpec {
        VideoSpec {
            title: "t".to_string(),
            description: "d".to_string(),
            segments,
            background_music: None,
        }
    }

    #[test]
    fn test_destination_carries_extension() {
        let dest = destination_path(
            Path::new("/tmp/job"),
            AssetKind::Image,
            "https://cdn.example.com/photos/a.jpg?size=large",
        );
        let name = dest.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("image_"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn test_destination_falls_back_to_tmp() {
        let dest = destination_path(
            Path::new("/tmp/job"),
            AssetKind::VoiceOver,
            "https://cdn.example.com/stream/audio",
        );
        assert!(dest.to_str().unwrap().ends_with(".tmp"));
    }

    #[test]
    fn test_collect_tasks_covers_all_urls() {
        let mut spec = spec_with(vec![
            segment("a", Some("https://x/a.jpg"), Some("https://x/a.mp3")),
            segment("b", Some("https://x/b.png"), None),
        ]);
        spec.background_music = Some(crate::spec::BackgroundMusic {
            url: "https://x/music.mp3".to_string(),
            start_delay: 0.0,
            local_path: None,
        });

        let tasks = collect_download_tasks(&spec, Path::new("/tmp/job"));
        assert_eq!(tasks.len(), 4);
        assert_eq!(
            tasks
                .iter()
                .filter(|t| t.kind == AssetKind::BackgroundMusic)
                .count(),
            1
        );
        assert!(tasks
            .iter()
            .filter(|t| t.segment_id == "a")
            .all(|t| t.segment_index == Some(0)));
    }

    #[tokio::test]
    async fn test_fetch_empty_spec() {
        let spec = spec_with(vec![segment("a", None, None)]);
        let fetcher = Fetcher::new(4, Duration::from_secs(5));
        let assets = fetcher.fetch_all(&spec, Path::new("/tmp/job")).await.unwrap();
        assert_eq!(assets.segments.len(), 1);
        assert!(assets.segments[0].image.is_none());
        assert!(assets.background_music.is_none());
    }
}
