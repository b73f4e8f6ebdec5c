use crate::config::Config;
use crate::error::{Result, VideoForgeError};
use crate::render::audio::{build_voice_composition, extend_with_silence};
use crate::render::ffmpeg::Toolchain;
use crate::render::image::{preprocess_image, ImagePrepOptions};
use crate::render::text::build_drawtext_filter;
use crate::render::RenderedClip;
use crate::spec::{Segment, TransitionKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Duration used when probing an input fails outright.
const PROBE_FALLBACK_SECS: f64 = 4.0;

/// Gain applied to every segment's audio track.
const SEGMENT_AUDIO_GAIN: f64 = 1.5;

enum InputMode {
    Video { path: PathBuf },
    Image { path: PathBuf, audio: Option<PathBuf> },
}

/// Resolve a transition kind to the fade filter color, degrading anything
/// unsupported to a plain fade.
fn fade_color(kind: TransitionKind) -> Option<&'static str> {
    match kind {
        TransitionKind::Fade => None,
        TransitionKind::FadeBlack => Some("black"),
        TransitionKind::FadeWhite => Some("white"),
        TransitionKind::Cut => None,
        TransitionKind::Unsupported => {
            warn!("unsupported transition type, degrading to fade");
            None
        }
    }
}

fn push_fade_in(
    video_filters: &mut Vec<String>,
    audio_filters: &mut Vec<String>,
    kind: TransitionKind,
    duration: f64,
) {
    if duration <= 0.0 || kind == TransitionKind::Cut {
        return;
    }
    let color = fade_color(kind)
        .map(|c| format!(":color={}", c))
        .unwrap_or_default();
    video_filters.push(format!("fade=t=in:st=0:d={}{}", duration, color));
    audio_filters.push(format!("afade=t=in:st=0:d={}", duration));
}

fn push_fade_out(
    video_filters: &mut Vec<String>,
    audio_filters: &mut Vec<String>,
    kind: TransitionKind,
    duration: f64,
    start: f64,
) {
    if duration <= 0.0 || kind == TransitionKind::Cut {
        return;
    }
    let color = fade_color(kind)
        .map(|c| format!(":color={}", c))
        .unwrap_or_default();
    video_filters.push(format!("fade=t=out:st={}:d={}{}", start, duration, color));
    audio_filters.push(format!("afade=t=out:st={}:d={}", start, duration));
}

/// Render one segment into an H.264/AAC clip in the temp directory.
pub async fn render_segment_clip(
    toolchain: &Toolchain,
    config: &Config,
    segment: &Segment,
    temp_dir: &Path,
) -> Result<RenderedClip> {
    let segment_id = &segment.id;
    let output = temp_dir.join(format!("temp_segment_{}.mp4", segment_id));
    let (width, height) = config.resolution();

    let fade_in = segment.fade_in_duration();
    let fade_out = segment.fade_out_duration();

    // Determine input mode and the base duration.
    let video_path = segment
        .video
        .as_ref()
        .and_then(|v| v.local_path.clone())
        .filter(|p| p.exists());

    let (mode, base_duration) = if let Some(path) = video_path {
        let duration = match toolchain.probe_duration(&path).await {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "could not probe video duration for segment '{}', using {}s: {}",
                    segment_id, PROBE_FALLBACK_SECS, e
                );
                PROBE_FALLBACK_SECS
            }
        };
        (InputMode::Video { path }, duration)
    } else {
        let image_path = segment
            .image
            .as_ref()
            .and_then(|i| i.local_path.clone())
            .ok_or_else(|| {
                VideoForgeError::processing(
                    "segment_renderer",
                    format!("no visual source for segment '{}'", segment_id),
                )
            })?;

        let prep_options = ImagePrepOptions {
            target_width: width,
            target_height: height,
            smart_pad_color: config.smart_pad_color,
            auto_enhance: config.auto_enhance,
        };
        let prep_dir = temp_dir.to_path_buf();
        let processed = tokio::task::spawn_blocking(move || {
            preprocess_image(&image_path, &prep_dir, prep_options)
        })
        .await
        .map_err(|e| VideoForgeError::processing("segment_renderer", e))??;

        match &segment.voice_over {
            Some(voice_over) => {
                let audio =
                    build_voice_composition(toolchain, voice_over, temp_dir, segment_id).await?;
                let duration = match toolchain.probe_duration(&audio).await {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(
                            "could not probe audio duration for segment '{}', using {}s: {}",
                            segment_id, PROBE_FALLBACK_SECS, e
                        );
                        PROBE_FALLBACK_SECS
                    }
                };
                let extended =
                    extend_with_silence(toolchain, &audio, fade_in, fade_out, temp_dir, segment_id)
                        .await?;
                (
                    InputMode::Image {
                        path: processed,
                        audio: Some(extended),
                    },
                    duration,
                )
            }
            None => {
                // Silent clip: the fades carry the duration; fall back to
                // the configured default when both are zero.
                let base = if fade_in + fade_out > 0.0 {
                    0.0
                } else {
                    config.default_segment_duration
                };
                (
                    InputMode::Image {
                        path: processed,
                        audio: None,
                    },
                    base,
                )
            }
        }
    };

    let total_duration = match mode {
        InputMode::Video { .. } => base_duration,
        InputMode::Image { .. } => fade_in + base_duration + fade_out,
    };

    // Filter graph: normalization, fades, then subtitles.
    let mut video_filters = vec![
        format!("scale={}:{}", width, height),
        "format=yuv420p".to_string(),
    ];
    let mut audio_filters = vec![format!("volume={}", SEGMENT_AUDIO_GAIN)];

    if let Some(t) = &segment.transition_in {
        push_fade_in(&mut video_filters, &mut audio_filters, t.kind, fade_in);
    }
    if let Some(t) = &segment.transition_out {
        let start = match mode {
            InputMode::Video { .. } => (total_duration - fade_out).max(0.0),
            InputMode::Image { .. } => fade_in + base_duration,
        };
        push_fade_out(&mut video_filters, &mut audio_filters, t.kind, fade_out, start);
    }

    if let Some(overlays) = &segment.text_over {
        let delay = fade_in
            + segment
                .voice_over
                .as_ref()
                .map(|v| v.start_delay)
                .unwrap_or(0.0);
        for overlay in overlays {
            if let Some(filter) = build_drawtext_filter(overlay, delay, config) {
                video_filters.push(filter);
            }
        }
    }

    let mut args = vec!["-y".to_string()];
    match &mode {
        InputMode::Video { path } => {
            // The clip's own audio is replaced by silence; narration is
            // carried by image-mode segments.
            args.extend([
                "-f".to_string(),
                "lavfi".to_string(),
                "-i".to_string(),
                "anullsrc=channel_layout=stereo:sample_rate=44100".to_string(),
                "-i".to_string(),
                path.display().to_string(),
                "-map".to_string(),
                "1:v".to_string(),
                "-map".to_string(),
                "0:a".to_string(),
            ]);
        }
        InputMode::Image { path, audio } => {
            args.extend([
                "-loop".to_string(),
                "1".to_string(),
                "-i".to_string(),
                path.display().to_string(),
            ]);
            match audio {
                Some(audio) => {
                    args.extend(["-i".to_string(), audio.display().to_string()]);
                }
                None => {
                    args.extend([
                        "-f".to_string(),
                        "lavfi".to_string(),
                        "-i".to_string(),
                        "anullsrc=channel_layout=stereo:sample_rate=44100".to_string(),
                    ]);
                }
            }
        }
    }

    args.extend([
        "-vf".to_string(),
        video_filters.join(","),
        "-af".to_string(),
        audio_filters.join(","),
        "-t".to_string(),
        format!("{}", total_duration),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        config.video_fps.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        config.audio_bitrate.clone(),
        output.display().to_string(),
    ]);

    toolchain.run_ffmpeg(&args).await?;

    if !output.exists() {
        return Err(VideoForgeError::processing(
            "segment_renderer",
            format!("clip for segment '{}' was not created", segment_id),
        ));
    }

    debug!(
        "rendered segment '{}' ({:.2}s) -> {}",
        segment_id,
        total_duration,
        output.display()
    );
    Ok(RenderedClip {
        id: segment_id.clone(),
        path: output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_color_mapping() {
        assert_eq!(fade_color(TransitionKind::Fade), None);
        assert_eq!(fade_color(TransitionKind::FadeBlack), Some("black"));
        assert_eq!(fade_color(TransitionKind::FadeWhite), Some("white"));
        assert_eq!(fade_color(TransitionKind::Unsupported), None);
    }

    #[test]
    fn test_cut_adds_no_filters() {
        let mut video = Vec::new();
        let mut audio = Vec::new();
        push_fade_in(&mut video, &mut audio, TransitionKind::Cut, 1.0);
        push_fade_out(&mut video, &mut audio, TransitionKind::Cut, 1.0, 5.0);
        assert!(video.is_empty());
        assert!(audio.is_empty());
    }

    #[test]
    fn test_fade_filters_formatting() {
        let mut video = Vec::new();
        let mut audio = Vec::new();
        push_fade_in(&mut video, &mut audio, TransitionKind::FadeWhite, 0.5);
        push_fade_out(&mut video, &mut audio, TransitionKind::Fade, 0.5, 2.5);

        assert_eq!(video[0], "fade=t=in:st=0:d=0.5:color=white");
        assert_eq!(audio[0], "afade=t=in:st=0:d=0.5");
        assert_eq!(video[1], "fade=t=out:st=2.5:d=0.5");
        assert_eq!(audio[1], "afade=t=out:st=2.5:d=0.5");
    }
}
