use crate::config::Config;
use crate::error::{Result, VideoForgeError};
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Wrapper around the external FFmpeg/FFprobe binaries. All invocations run
/// with a timeout and capture stderr for error reporting.
#[derive(Debug, Clone)]
pub struct Toolchain {
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
}

impl Toolchain {
    pub fn new(ffmpeg: String, ffprobe: String, timeout: Duration) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
            config.ffmpeg_timeout(),
        )
    }

    /// Check both binaries are installed and runnable.
    pub async fn check_available(&self) -> Result<()> {
        for binary in [&self.ffmpeg, &self.ffprobe] {
            let output = Command::new(binary)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|e| {
                    VideoForgeError::Config(format!(
                        "{} not found. Install FFmpeg and ensure it is in your PATH. Error: {}",
                        binary, e
                    ))
                })?;
            if !output.success() {
                return Err(VideoForgeError::Config(format!("{} check failed", binary)));
            }
        }
        debug!("FFmpeg toolchain is available");
        Ok(())
    }

    async fn run(&self, binary: &str, args: &[String]) -> Result<std::process::Output> {
        let command_line = format!("{} {}", binary, args.join(" "));
        debug!("running: {}", command_line);

        let child = Command::new(binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VideoForgeError::Subprocess {
                command: command_line.clone(),
                status: -1,
                stderr: format!("failed to spawn: {}", e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VideoForgeError::Subprocess {
                command: command_line.clone(),
                status: -1,
                stderr: format!("timed out after {:?}", self.timeout),
            })?
            .map_err(|e| VideoForgeError::Subprocess {
                command: command_line.clone(),
                status: -1,
                stderr: e.to_string(),
            })?;

        Ok(output)
    }

    /// Run FFmpeg with the given arguments, failing on non-zero exit.
    pub async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        let output = self.run(&self.ffmpeg, args).await?;
        if !output.status.success() {
            return Err(VideoForgeError::Subprocess {
                command: format!("{} {}", self.ffmpeg, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    /// Container duration in seconds via FFprobe.
    pub async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            input.display().to_string(),
        ];
        let output = self.run(&self.ffprobe, &args).await?;
        if !output.status.success() {
            return Err(VideoForgeError::Subprocess {
                command: format!("{} {}", self.ffprobe, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse::<f64>().map_err(|e| {
            VideoForgeError::AudioProcessing(format!(
                "failed to parse duration '{}': {}",
                stdout.trim(),
                e
            ))
        })
    }

    /// Mean volume in dB of the input's audio track, probed with the
    /// volumedetect filter. Returns `None` when the filter reports nothing
    /// (e.g. no audio stream).
    pub async fn probe_mean_volume(&self, input: &Path) -> Result<Option<f64>> {
        let args = vec![
            "-i".to_string(),
            input.display().to_string(),
            "-af".to_string(),
            "volumedetect".to_string(),
            "-vn".to_string(),
            "-sn".to_string(),
            "-dn".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];
        let output = self.run(&self.ffmpeg, &args).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(parse_mean_volume(&stderr))
    }
}

/// Extract `mean_volume: -23.5 dB` from volumedetect output.
pub fn parse_mean_volume(stderr: &str) -> Option<f64> {
    let re = Regex::new(r"mean_volume:\s*(-?\d+(?:\.\d+)?) dB").ok()?;
    let captures = re.captures(stderr)?;
    match captures.get(1)?.as_str().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("could not parse mean_volume: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mean_volume() {
        let stderr = "[Parsed_volumedetect_0 @ 0x7f8] n_samples: 441000\n\
                      [Parsed_volumedetect_0 @ 0x7f8] mean_volume: -23.5 dB\n\
                      [Parsed_volumedetect_0 @ 0x7f8] max_volume: -4.0 dB";
        assert_eq!(parse_mean_volume(stderr), Some(-23.5));
    }

    #[test]
    fn test_parse_mean_volume_integer() {
        assert_eq!(parse_mean_volume("mean_volume: -18 dB"), Some(-18.0));
    }

    #[test]
    fn test_parse_mean_volume_absent() {
        assert_eq!(parse_mean_volume("no volume info here"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_reports_config_error() {
        let toolchain = Toolchain::new(
            "definitely-not-ffmpeg".to_string(),
            "definitely-not-ffprobe".to_string(),
            Duration::from_secs(5),
        );
        let result = toolchain.check_available().await;
        assert!(matches!(result, Err(VideoForgeError::Config(_))));
    }
}
