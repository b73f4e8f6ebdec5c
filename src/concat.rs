use crate::config::Config;
use crate::error::{Result, VideoForgeError};
use crate::render::ffmpeg::Toolchain;
use crate::render::RenderedClip;
use crate::spec::BackgroundMusic;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default background-music gain when volume probing fails.
const DEFAULT_BGM_FACTOR: f64 = 0.2;

/// Clamp range for the auto-matched background-music gain.
const BGM_FACTOR_MIN: f64 = 0.1;
const BGM_FACTOR_MAX: f64 = 0.5;

/// Minimum believable size for the final MP4.
const MIN_OUTPUT_BYTES: u64 = 1024;

/// Gain factor that brings the music `diff_db` decibels relative to the
/// spoken audio, clamped to a range that keeps the bed audible but quiet.
pub fn bgm_gain_factor(video_mean_db: f64, music_mean_db: f64) -> f64 {
    let diff_db = video_mean_db - music_mean_db;
    let factor = 10f64.powf(diff_db / 20.0);
    factor.clamp(BGM_FACTOR_MIN, BGM_FACTOR_MAX)
}

/// Stitches the per-segment clips into the final MP4, overlaying the
/// background-music bed when one is configured.
pub struct Concatenator {
    toolchain: Toolchain,
}

impl Concatenator {
    pub fn new(config: &Config) -> Self {
        Self {
            toolchain: Toolchain::from_config(config),
        }
    }

    fn validate_inputs(&self, clips: &[RenderedClip], output_path: &Path) -> Result<()> {
        if clips.is_empty() {
            return Err(VideoForgeError::processing(
                "concatenator",
                "no clips to concatenate",
            ));
        }
        for clip in clips {
            let metadata = std::fs::metadata(&clip.path).map_err(|e| {
                VideoForgeError::processing(
                    "concatenator",
                    format!("clip '{}' not found at {}: {}", clip.id, clip.path.display(), e),
                )
            })?;
            if metadata.len() == 0 {
                return Err(VideoForgeError::processing(
                    "concatenator",
                    format!("clip '{}' is empty", clip.id),
                ));
            }
        }
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    async fn write_concat_list(&self, clips: &[RenderedClip], temp_dir: &Path) -> Result<PathBuf> {
        let list_path = temp_dir.join("concat_list.txt");
        let mut contents = String::new();
        for clip in clips {
            let absolute = std::fs::canonicalize(&clip.path).unwrap_or_else(|_| clip.path.clone());
            contents.push_str(&format!("file '{}'\n", absolute.display()));
        }
        tokio::fs::write(&list_path, contents).await?;
        debug!("wrote concat list: {}", list_path.display());
        Ok(list_path)
    }

    /// Probe the spoken and music levels and derive the music gain; any
    /// probe trouble falls back to the default factor.
    async fn resolve_bgm_factor(&self, first_clip: &Path, music: &Path) -> f64 {
        let video_mean = self.toolchain.probe_mean_volume(first_clip).await;
        let music_mean = self.toolchain.probe_mean_volume(music).await;
        match (video_mean, music_mean) {
            (Ok(Some(v)), Ok(Some(m))) => {
                let factor = bgm_gain_factor(v, m);
                info!(
                    "auto-matched music gain {:.2} (video {}dB, music {}dB)",
                    factor, v, m
                );
                factor
            }
            _ => {
                warn!(
                    "could not probe mean volume, using default music gain {}",
                    DEFAULT_BGM_FACTOR
                );
                DEFAULT_BGM_FACTOR
            }
        }
    }

    pub async fn concatenate(
        &self,
        clips: &[RenderedClip],
        background_music: Option<&BackgroundMusic>,
        output_path: &Path,
        temp_dir: &Path,
    ) -> Result<PathBuf> {
        self.validate_inputs(clips, output_path)?;
        let list_path = self.write_concat_list(clips, temp_dir).await?;

        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.display().to_string(),
        ];

        let music_path = background_music.and_then(|m| m.local_path.as_deref());
        match (background_music, music_path) {
            (Some(music), Some(path)) => {
                if !path.exists() {
                    return Err(VideoForgeError::processing(
                        "concatenator",
                        format!("background music file not found: {}", path.display()),
                    ));
                }
                args.extend(["-i".to_string(), path.display().to_string()]);

                let factor = self.resolve_bgm_factor(&clips[0].path, path).await;
                let delay = if music.start_delay > 0.0 {
                    let ms = (music.start_delay * 1000.0) as u64;
                    format!(",adelay={}|{}", ms, ms)
                } else {
                    String::new()
                };
                // Loop the bed forever; amix duration=first keeps the video
                // length authoritative.
                let filter = format!(
                    "[1:a]aloop=loop=-1:size=2e+09{},volume={:.3}[bgm];[0:a][bgm]amix=inputs=2:duration=first[aout]",
                    delay, factor
                );
                args.extend([
                    "-c:v".to_string(),
                    "libx264".to_string(),
                    "-preset".to_string(),
                    "ultrafast".to_string(),
                    "-c:a".to_string(),
                    "aac".to_string(),
                    "-filter_complex".to_string(),
                    filter,
                    "-map".to_string(),
                    "0:v".to_string(),
                    "-map".to_string(),
                    "[aout]".to_string(),
                    "-shortest".to_string(),
                ]);
                info!("concatenating {} clips with background music", clips.len());
            }
            _ => {
                // Fast path: stream copy, no re-encode.
                args.extend(["-c".to_string(), "copy".to_string()]);
                info!("concatenating {} clips (stream copy)", clips.len());
            }
        }

        args.push(output_path.display().to_string());
        self.toolchain.run_ffmpeg(&args).await?;

        let size = std::fs::metadata(output_path).map(|m| m.len()).unwrap_or(0);
        if size < MIN_OUTPUT_BYTES {
            return Err(VideoForgeError::processing(
                "concatenator",
                format!(
                    "output file {} is suspiciously small ({} bytes)",
                    output_path.display(),
                    size
                ),
            ));
        }

        info!(
            "final video written: {} ({:.2} MB)",
            output_path.display(),
            size as f64 / (1024.0 * 1024.0)
        );
        Ok(output_path.to_path_buf())
    }
}
