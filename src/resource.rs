use crate::config::Config;
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Scoped working directory for one job. Created before any stage runs and
/// cleaned up when the job completes or fails; deletions that cannot
/// complete immediately are retried in a detached background task.
#[derive(Debug)]
pub struct TempDirGuard {
    path: PathBuf,
    retry_attempts: u32,
    retry_delay: Duration,
    delayed_delay: Duration,
}

impl TempDirGuard {
    /// Create a unique `{prefix}{hex}` directory under the base dir.
    pub fn create(config: &Config) -> Result<Self> {
        let name = format!("{}{}", config.temp_dir_prefix, Uuid::new_v4().simple());
        let path = config.temp_base_dir.join(name);
        std::fs::create_dir_all(&path)?;
        debug!("created temp directory: {}", path.display());
        Ok(Self {
            path,
            retry_attempts: config.cleanup_retry_attempts,
            retry_delay: Duration::from_secs_f64(config.cleanup_retry_delay_secs),
            delayed_delay: Duration::from_secs_f64(config.delayed_cleanup_delay_secs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt recursive deletion with retries; if the directory is still
    /// locked afterwards, schedule a delayed attempt and move on.
    pub async fn cleanup(self) {
        let path = self.path.clone();
        if !path.exists() {
            return;
        }

        for attempt in 1..=self.retry_attempts {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!("cleaned up temp directory: {}", path.display());
                    return;
                }
                Err(e) => {
                    if attempt < self.retry_attempts {
                        warn!(
                            "temp cleanup attempt {}/{} failed ({}), retrying",
                            attempt, self.retry_attempts, e
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    } else {
                        warn!(
                            "temp cleanup failed after {} attempts: {}",
                            self.retry_attempts, e
                        );
                    }
                }
            }
        }

        schedule_delayed_cleanup(path, self.delayed_delay);
    }
}

/// Fire-and-forget deletion attempt after a delay, for directories another
/// process still holds open.
pub fn schedule_delayed_cleanup(path: PathBuf, delay: Duration) {
    info!(
        "scheduling delayed cleanup of {} in {:?}",
        path.display(),
        delay
    );
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !path.exists() {
            return;
        }
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => info!("delayed cleanup removed {}", path.display()),
            Err(e) => warn!("delayed cleanup failed for {}: {}", path.display(), e),
        }
    });
}

/// Startup sweep: remove leftover temp directories carrying the configured
/// prefix that are older than the cleanup age. Failures schedule delayed
/// retries rather than aborting the sweep.
pub fn sweep_stale_dirs(config: &Config) -> Result<usize> {
    let max_age = Duration::from_secs_f64(config.temp_cleanup_age_hours * 3600.0);
    let now = SystemTime::now();
    let mut removed = 0usize;

    let entries = match std::fs::read_dir(&config.temp_base_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                "could not scan {} for stale temp dirs: {}",
                config.temp_base_dir.display(),
                e
            );
            return Ok(0);
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_dir() || !name.starts_with(&config.temp_dir_prefix) {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        let Some(age) = age else { continue };
        if age < max_age {
            continue;
        }

        info!(
            "removing stale temp directory {} (age {:.1}h)",
            path.display(),
            age.as_secs_f64() / 3600.0
        );
        if let Err(e) = std::fs::remove_dir_all(&path) {
            warn!("failed to remove {}: {}", path.display(), e);
            schedule_delayed_cleanup(
                path,
                Duration::from_secs_f64(config.delayed_cleanup_delay_secs),
            );
        } else {
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_base(base: &Path) -> Config {
        Config {
            temp_base_dir: base.to_path_buf(),
            temp_dir_prefix: "tmp_create_".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_cleanup() {
        let base = tempfile::tempdir().unwrap();
        let config = config_with_base(base.path());

        let guard = TempDirGuard::create(&config).unwrap();
        let path = guard.path().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("tmp_create_"));

        guard.cleanup().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_guards_are_unique() {
        let base = tempfile::tempdir().unwrap();
        let config = config_with_base(base.path());

        let a = TempDirGuard::create(&config).unwrap();
        let b = TempDirGuard::create(&config).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_sweep_skips_fresh_and_unrelated_dirs() {
        let base = tempfile::tempdir().unwrap();
        let config = config_with_base(base.path());

        std::fs::create_dir(base.path().join("tmp_create_fresh")).unwrap();
        std::fs::create_dir(base.path().join("unrelated")).unwrap();

        let removed = sweep_stale_dirs(&config).unwrap();
        assert_eq!(removed, 0);
        assert!(base.path().join("tmp_create_fresh").exists());
        assert!(base.path().join("unrelated").exists());
    }

    #[test]
    fn test_sweep_removes_old_dirs() {
        let base = tempfile::tempdir().unwrap();
        let mut config = config_with_base(base.path());
        // Everything counts as stale with a zero max age.
        config.temp_cleanup_age_hours = 0.0;

        std::fs::create_dir(base.path().join("tmp_create_old")).unwrap();
        std::fs::create_dir(base.path().join("keepme")).unwrap();

        let removed = sweep_stale_dirs(&config).unwrap();
        assert_eq!(removed, 1);
        assert!(!base.path().join("tmp_create_old").exists());
        assert!(base.path().join("keepme").exists());
    }
}
