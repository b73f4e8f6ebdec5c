use crate::error::{Result, VideoForgeError};
use crate::job::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long to wait for the store lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting on the lock file.
const LOCK_POLL: Duration = Duration::from_millis(50);

/// One persisted job entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl JobRecord {
    fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            result: None,
            error: None,
        }
    }
}

/// Exclusive lock held while the store file is read or written. The lock is
/// a sibling `.lock` file created atomically; dropping the guard releases
/// it. Adequate for a single node, which is all this store serves.
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(VideoForgeError::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            format!("timed out acquiring job store lock {}", path.display()),
                        )));
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}

/// File-based job store: a JSON object `{job_id: {status, result, error}}`
/// guarded by an exclusive file lock. Jobs left `pending` by a crash stay
/// untouched across restarts; there is no auto-recovery.
pub struct JobStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JobStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            path: data_dir.join("job_store.json"),
            lock_path: data_dir.join("job_store.json.lock"),
        }
    }

    fn load_locked(&self) -> Result<HashMap<String, JobRecord>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str(&contents) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!("job store unreadable ({}), starting empty", e);
                Ok(HashMap::new())
            }
        }
    }

    fn save_locked(&self, store: &HashMap<String, JobRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string(store)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, JobRecord>),
    {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _lock = StoreLock::acquire(&self.lock_path, LOCK_TIMEOUT)?;
        let mut store = self.load_locked()?;
        mutate(&mut store);
        self.save_locked(&store)
    }

    /// Register a new job as `pending`.
    pub fn create(&self, job_id: &str) -> Result<()> {
        debug!("registering job {}", job_id);
        self.update(|store| {
            store.insert(job_id.to_string(), JobRecord::pending());
        })
    }

    pub fn mark_done(&self, job_id: &str, result: &str) -> Result<()> {
        self.update(|store| {
            let record = store
                .entry(job_id.to_string())
                .or_insert_with(JobRecord::pending);
            record.status = JobStatus::Done;
            record.result = Some(result.to_string());
        })
    }

    pub fn mark_failed(&self, job_id: &str, error: &str) -> Result<()> {
        self.update(|store| {
            let record = store
                .entry(job_id.to_string())
                .or_insert_with(JobRecord::pending);
            record.status = JobStatus::Failed;
            record.error = Some(error.to_string());
        })
    }

    pub fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _lock = StoreLock::acquire(&self.lock_path, LOCK_TIMEOUT)?;
        Ok(self.load_locked()?.remove(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> JobStore {
        JobStore::new(dir.join("data"))
    }

    #[test]
    fn test_unknown_job_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_job_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.create("job1").unwrap();
        let record = store.get("job1").unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert!(record.result.is_none());

        store.mark_done("job1", "data/output/final_video_job1.mp4").unwrap();
        let record = store.get("job1").unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(
            record.result.as_deref(),
            Some("data/output/final_video_job1.mp4")
        );
    }

    #[test]
    fn test_failed_job_carries_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.create("job2").unwrap();
        store.mark_failed("job2", "Stage 'asset_fetch' failed").unwrap();

        let record = store.get("job2").unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("asset_fetch"));
    }

    #[test]
    fn test_store_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.create("job3").unwrap();

        let raw = std::fs::read_to_string(dir.path().join("data/job_store.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["job3"]["status"], "pending");
    }

    #[test]
    fn test_lock_released_after_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.create("job4").unwrap();
        assert!(!dir.path().join("data/job_store.json.lock").exists());
    }

    #[test]
    fn test_lock_contention_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("held.lock");
        let _held = StoreLock::acquire(&lock_path, LOCK_TIMEOUT).unwrap();

        let result = StoreLock::acquire(&lock_path, Duration::from_millis(150));
        assert!(result.is_err());
    }
}
