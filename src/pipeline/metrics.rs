use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Side-channel for per-stage execution metrics. Injected by the runtime so
/// stage bodies stay free of bookkeeping.
pub trait MetricsSink: Send + Sync {
    fn record(
        &self,
        stage: &str,
        success: bool,
        duration: Duration,
        items_processed: usize,
        error: Option<&str>,
    );
}

/// Default sink: structured log lines, nothing stored.
#[derive(Debug, Default)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn record(
        &self,
        stage: &str,
        success: bool,
        duration: Duration,
        items_processed: usize,
        error: Option<&str>,
    ) {
        if success {
            info!(
                stage,
                duration_ms = duration.as_millis() as u64,
                items_processed,
                "stage completed"
            );
        } else {
            warn!(
                stage,
                duration_ms = duration.as_millis() as u64,
                error = error.unwrap_or("unknown"),
                "stage failed"
            );
        }
    }
}

/// One recorded stage observation.
#[derive(Debug, Clone)]
pub struct StageMetric {
    pub stage: String,
    pub success: bool,
    pub duration: Duration,
    pub items_processed: usize,
    pub error: Option<String>,
}

/// Test sink that keeps every observation in memory.
#[derive(Debug, Default)]
pub struct CollectingMetricsSink {
    records: Mutex<Vec<StageMetric>>,
}

impl CollectingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StageMetric> {
        self.records.lock().expect("metrics lock poisoned").clone()
    }
}

impl MetricsSink for CollectingMetricsSink {
    fn record(
        &self,
        stage: &str,
        success: bool,
        duration: Duration,
        items_processed: usize,
        error: Option<&str>,
    ) {
        self.records
            .lock()
            .expect("metrics lock poisoned")
            .push(StageMetric {
                stage: stage.to_string(),
                success,
                duration,
                items_processed,
                error: error.map(str::to_string),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_records() {
        let sink = CollectingMetricsSink::new();
        sink.record("fetch", true, Duration::from_millis(120), 4, None);
        sink.record("render", false, Duration::from_secs(2), 0, Some("boom"));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].stage, "fetch");
        assert!(records[0].success);
        assert_eq!(records[1].error.as_deref(), Some("boom"));
    }
}
