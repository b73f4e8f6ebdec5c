use crate::error::{Result, VideoForgeError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// All tunables for the pipeline, loaded once at startup and immutable after.
///
/// Values are resolved in order: built-in defaults, then the optional config
/// file (`videoforge/config.toml` in the platform config directory), then
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Output, data and temp directories
    pub output_dir: PathBuf,
    pub data_dir: PathBuf,
    pub temp_base_dir: PathBuf,
    pub temp_dir_prefix: String,
    pub temp_cleanup_age_hours: f64,
    pub cleanup_retry_attempts: u32,
    pub cleanup_retry_delay_secs: f64,
    pub delayed_cleanup_delay_secs: f64,

    // Download settings
    pub download_max_concurrent: usize,
    pub download_timeout_secs: u64,

    // Process-wide cap for concurrent outbound requests (aligner, agents)
    pub max_concurrent_requests: usize,

    // FFmpeg toolchain
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ffmpeg_timeout_secs: u64,
    pub video_fps: u32,
    pub video_width: u32,
    pub video_height: u32,
    pub audio_bitrate: String,
    pub default_segment_duration: f64,
    pub max_concurrent_segments: usize,

    // Image preprocessing
    pub smart_pad_color: bool,
    pub auto_enhance: bool,
    pub min_image_width: u32,
    pub min_image_height: u32,

    // Text overlay
    pub font_file: String,
    pub font_size: u32,
    pub font_color: String,
    pub text_position_x: String,
    pub text_position_y: String,

    // Forced aligner
    pub aligner_url: String,
    pub aligner_timeout_secs: u64,
    pub aligner_max_retries: u32,
    pub aligner_retry_delay_secs: u64,
    pub min_success_ratio: f64,
    pub max_lookahead: usize,

    // AI agent (keyword extraction, phrase segmentation, schema validation)
    pub ai_enabled: bool,
    pub ai_api_key: Option<String>,
    pub ai_base_url: String,
    pub ai_model: String,
    pub ai_timeout_secs: u64,
    pub max_keywords: usize,

    // Image search
    pub image_search_url: String,
    pub image_search_api_key: Option<String>,

    // Object storage (all four must be set for uploads to run)
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_prefix: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/output"),
            data_dir: PathBuf::from("data"),
            temp_base_dir: PathBuf::from("."),
            temp_dir_prefix: "tmp_create_".to_string(),
            temp_cleanup_age_hours: 1.0,
            cleanup_retry_attempts: 3,
            cleanup_retry_delay_secs: 2.0,
            delayed_cleanup_delay_secs: 30.0,

            download_max_concurrent: 10,
            download_timeout_secs: 300,

            max_concurrent_requests: 10,

            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ffmpeg_timeout_secs: 300,
            video_fps: 24,
            video_width: 1920,
            video_height: 1080,
            audio_bitrate: "192k".to_string(),
            default_segment_duration: 5.0,
            max_concurrent_segments: 1,

            smart_pad_color: true,
            auto_enhance: true,
            min_image_width: 1024,
            min_image_height: 576,

            font_file: "fonts/Roboto-Black.ttf".to_string(),
            font_size: 48,
            font_color: "white".to_string(),
            text_position_x: "(w-text_w)/2".to_string(),
            text_position_y: "h-100".to_string(),

            aligner_url: "http://localhost:8765/transcriptions".to_string(),
            aligner_timeout_secs: 600,
            aligner_max_retries: 3,
            aligner_retry_delay_secs: 10,
            min_success_ratio: 0.8,
            max_lookahead: 30,

            ai_enabled: true,
            ai_api_key: None,
            ai_base_url: "https://api.openai.com/v1".to_string(),
            ai_model: "gpt-4.1-nano".to_string(),
            ai_timeout_secs: 30,
            max_keywords: 3,

            image_search_url: "https://pixabay.com/api/".to_string(),
            image_search_api_key: None,

            s3_bucket: String::new(),
            s3_region: "us-east-1".to_string(),
            s3_prefix: "videos/".to_string(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(url) = std::env::var("ALIGNER_URL") {
            config.aligner_url = url;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.ai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("PIXABAY_API_KEY") {
            config.image_search_api_key = Some(key);
        }
        if let Ok(bucket) = std::env::var("AWS_S3_BUCKET") {
            config.s3_bucket = bucket;
        }
        if let Ok(region) = std::env::var("AWS_S3_REGION") {
            config.s3_region = region;
        }
        if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
            config.aws_access_key_id = key;
        }
        if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            config.aws_secret_access_key = secret;
        }
        if let Ok(dir) = std::env::var("VIDEOFORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(n) = std::env::var("VIDEOFORGE_DOWNLOAD_CONCURRENCY") {
            if let Ok(n) = n.parse() {
                config.download_max_concurrent = n;
            }
        }
        if let Ok(n) = std::env::var("VIDEOFORGE_SEGMENT_CONCURRENCY") {
            if let Ok(n) = n.parse() {
                config.max_concurrent_segments = n;
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.download_max_concurrent == 0 {
            return Err(VideoForgeError::Config(
                "download_max_concurrent must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_segments == 0 {
            return Err(VideoForgeError::Config(
                "max_concurrent_segments must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_success_ratio) {
            return Err(VideoForgeError::Config(
                "min_success_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.video_width == 0 || self.video_height == 0 {
            return Err(VideoForgeError::Config(
                "video resolution must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Target resolution, forced to even dimensions for H.264.
    pub fn resolution(&self) -> (u32, u32) {
        (self.video_width & !1, self.video_height & !1)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn ffmpeg_timeout(&self) -> Duration {
        Duration::from_secs(self.ffmpeg_timeout_secs)
    }

    pub fn aligner_timeout(&self) -> Duration {
        Duration::from_secs(self.aligner_timeout_secs)
    }

    /// True when every S3 credential needed for an upload is present.
    pub fn s3_configured(&self) -> bool {
        !self.s3_bucket.is_empty()
            && !self.s3_region.is_empty()
            && !self.aws_access_key_id.is_empty()
            && !self.aws_secret_access_key.is_empty()
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("videoforge").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.download_max_concurrent, 10);
        assert_eq!(config.max_concurrent_segments, 1);
        assert_eq!(config.min_image_width, 1024);
        assert_eq!(config.min_image_height, 576);
        assert_eq!(config.min_success_ratio, 0.8);
        assert_eq!(config.max_lookahead, 30);
    }

    #[test]
    fn test_default_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            download_max_concurrent: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolution_forces_even() {
        let config = Config {
            video_width: 1921,
            video_height: 1081,
            ..Default::default()
        };
        assert_eq!(config.resolution(), (1920, 1080));
    }

    #[test]
    fn test_s3_configured() {
        let mut config = Config::default();
        assert!(!config.s3_configured());
        config.s3_bucket = "bucket".to_string();
        config.aws_access_key_id = "key".to_string();
        config.aws_secret_access_key = "secret".to_string();
        assert!(config.s3_configured());
    }
}
