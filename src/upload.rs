use crate::config::Config;
use crate::error::{Result, VideoForgeError};
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use tracing::info;

/// Pushes the final MP4 to object storage. When any credential is absent
/// the upload is skipped and a `local://` URL is returned instead; absent
/// configuration is not a failure.
pub struct Uploader {
    bucket: String,
    region: String,
    prefix: String,
    access_key_id: String,
    secret_access_key: String,
}

impl Uploader {
    pub fn new(config: &Config) -> Self {
        Self {
            bucket: config.s3_bucket.clone(),
            region: config.s3_region.clone(),
            prefix: config.s3_prefix.clone(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
        }
    }

    fn is_configured(&self) -> bool {
        !self.bucket.is_empty()
            && !self.region.is_empty()
            && !self.access_key_id.is_empty()
            && !self.secret_access_key.is_empty()
    }

    pub fn object_key(&self, video_id: &str) -> String {
        format!("{}{}.mp4", self.prefix, video_id)
    }

    pub async fn upload(&self, video_path: &Path, video_id: &str) -> Result<String> {
        if !self.is_configured() {
            info!("upload skipped - object storage not configured");
            return Ok(format!("local://{}", video_path.display()));
        }

        let key = self.object_key(video_id);
        let credentials = Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            None,
            None,
            "videoforge",
        );
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        let client = aws_sdk_s3::Client::new(&sdk_config);

        let body = ByteStream::from_path(video_path)
            .await
            .map_err(|e| VideoForgeError::Upload(format!("could not read {}: {}", video_path.display(), e)))?;

        client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("video/mp4")
            .body(body)
            .send()
            .await
            .map_err(|e| VideoForgeError::Upload(e.to_string()))?;

        let url = format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        );
        info!("video uploaded: {}", url);
        Ok(url)
    }
}
