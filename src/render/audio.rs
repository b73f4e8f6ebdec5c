use crate::error::{Result, VideoForgeError};
use crate::render::ffmpeg::Toolchain;
use crate::spec::VoiceOver;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Two-pass style loudness target for spoken audio.
const LOUDNORM_FILTER: &str = "loudnorm=I=-8:TP=-0.5:LRA=5";

/// Fixed gain applied after normalization.
const VOICE_GAIN: f64 = 2.0;

/// Compose the voice-over track for an image-mode segment: leading silence
/// for `start_delay`, loudness normalization, a fixed gain boost, and
/// trailing silence for `end_delay`. Output is 44.1 kHz stereo WAV.
pub async fn build_voice_composition(
    toolchain: &Toolchain,
    voice_over: &VoiceOver,
    temp_dir: &Path,
    segment_id: &str,
) -> Result<PathBuf> {
    let input = voice_over.local_path.as_deref().ok_or_else(|| {
        VideoForgeError::AudioProcessing(format!(
            "voice-over for segment '{}' has no local file",
            segment_id
        ))
    })?;

    let mut filters = Vec::new();
    if voice_over.start_delay > 0.0 {
        let delay_ms = (voice_over.start_delay * 1000.0) as u64;
        filters.push(format!("adelay={}|{}", delay_ms, delay_ms));
    }
    filters.push(LOUDNORM_FILTER.to_string());
    filters.push(format!("volume={}", VOICE_GAIN));
    if voice_over.end_delay > 0.0 {
        filters.push(format!("apad=pad_dur={}", voice_over.end_delay));
    }

    let output = temp_dir.join(format!("audio_{}.wav", segment_id));
    let args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-filter_complex".to_string(),
        format!("[0:a]{}[aout]", filters.join(",")),
        "-map".to_string(),
        "[aout]".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        output.display().to_string(),
    ];

    toolchain
        .run_ffmpeg(&args)
        .await
        .map_err(|e| VideoForgeError::AudioProcessing(e.to_string()))?;
    debug!("composed voice-over for segment '{}'", segment_id);
    Ok(output)
}

/// Extend an audio track with silence before and/or after, so the spoken
/// audio lines up past the fade padding. Returns the input unchanged when
/// there is nothing to add.
pub async fn extend_with_silence(
    toolchain: &Toolchain,
    input: &Path,
    lead_secs: f64,
    trail_secs: f64,
    temp_dir: &Path,
    segment_id: &str,
) -> Result<PathBuf> {
    if lead_secs <= 0.0 && trail_secs <= 0.0 {
        return Ok(input.to_path_buf());
    }

    let output = temp_dir.join(format!("extended_audio_{}.wav", segment_id));
    let mut args = vec!["-y".to_string()];
    let mut input_count = 0usize;

    if lead_secs > 0.0 {
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-t".to_string(),
            format!("{}", lead_secs),
            "-i".to_string(),
            "anullsrc=channel_layout=stereo:sample_rate=44100".to_string(),
        ]);
        input_count += 1;
    }
    args.extend(["-i".to_string(), input.display().to_string()]);
    input_count += 1;
    if trail_secs > 0.0 {
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-t".to_string(),
            format!("{}", trail_secs),
            "-i".to_string(),
            "anullsrc=channel_layout=stereo:sample_rate=44100".to_string(),
        ]);
        input_count += 1;
    }

    let inputs: String = (0..input_count).map(|i| format!("[{}:a]", i)).collect();
    let filter = format!("{}concat=n={}:v=0:a=1[aout]", inputs, input_count);

    args.extend([
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "[aout]".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        output.display().to_string(),
    ]);

    toolchain
        .run_ffmpeg(&args)
        .await
        .map_err(|e| VideoForgeError::AudioProcessing(e.to_string()))?;
    debug!(
        "extended audio for segment '{}' (+{}s / +{}s)",
        segment_id, lead_secs, trail_secs
    );
    Ok(output)
}
