pub mod aligner;
pub mod map;
pub mod phrase;

pub use aligner::{verify_alignment, AlignerClient, AlignmentVerification, WordRecord};
pub use map::map_phrases_to_words;
pub use phrase::PhraseSegmenter;

use crate::agent::AgentClient;
use crate::config::Config;
use crate::error::{Result, VideoForgeError};
use crate::spec::Segment;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Computes per-phrase subtitle timings for every segment with a voice-over
/// by splitting the transcript into phrases and matching them against the
/// forced aligner's word timestamps.
pub struct TranscriptAligner {
    client: Arc<AlignerClient>,
    segmenter: Arc<PhraseSegmenter>,
    min_success_ratio: f64,
    max_lookahead: usize,
    max_concurrent: usize,
    cancelled: Arc<AtomicBool>,
}

impl TranscriptAligner {
    pub fn new(config: &Config, agent: AgentClient) -> Self {
        let client = AlignerClient::new(config.aligner_url.clone(), config.aligner_timeout())
            .with_retries(
                config.aligner_max_retries,
                Duration::from_secs(config.aligner_retry_delay_secs),
            );
        Self {
            client: Arc::new(client),
            segmenter: Arc::new(PhraseSegmenter::new(agent)),
            min_success_ratio: config.min_success_ratio,
            max_lookahead: config.max_lookahead,
            max_concurrent: config.max_concurrent_requests,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Align one segment, returning its subtitle overlays. `None` means the
    /// segment stays without subtitles (no voice-over, empty content, or a
    /// degraded alignment).
    async fn align_segment(&self, segment: &Segment) -> Option<Vec<crate::spec::TextOverlay>> {
        let voice_over = segment.voice_over.as_ref()?;
        let audio_path = voice_over.local_path.as_deref()?;
        let content = voice_over.content.trim();
        if content.is_empty() {
            debug!("segment '{}' has empty content, skipping alignment", segment.id);
            return None;
        }

        let phrases = self.segmenter.segment(content).await;
        if phrases.is_empty() {
            return None;
        }

        let words = match self.client.align(audio_path, content).await {
            Ok(words) => words,
            Err(e) => {
                // Segment-scoped: a failed aligner degrades this segment to
                // no subtitles instead of failing the whole job.
                warn!("alignment failed for segment '{}': {}", segment.id, e);
                return None;
            }
        };

        let verification = verify_alignment(&words, self.min_success_ratio);
        info!(
            "segment '{}': {}/{} words aligned ({:.0}%)",
            segment.id,
            verification.success_count,
            verification.total_words,
            verification.success_ratio * 100.0
        );
        if !verification.passed {
            warn!(
                "segment '{}' below alignment floor ({:.0}% < {:.0}%), keeping no subtitles",
                segment.id,
                verification.success_ratio * 100.0,
                self.min_success_ratio * 100.0
            );
            return None;
        }

        let overlays = map_phrases_to_words(&phrases, &words, self.max_lookahead);
        if overlays.is_empty() {
            None
        } else {
            Some(overlays)
        }
    }

    /// Process all segments concurrently, reassembling results into input
    /// order. Segments that cannot be aligned pass through unchanged.
    pub async fn align_all(&self, segments: &[Segment]) -> Result<Vec<Segment>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut futures = FuturesUnordered::new();

        for (index, segment) in segments.iter().enumerate() {
            let sem = semaphore.clone();
            let future = async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                if self.cancelled.load(Ordering::Relaxed) {
                    return (index, Err(VideoForgeError::Cancelled));
                }
                let overlays = self.align_segment(segment).await;
                (index, Ok(overlays))
            };
            futures.push(future);
        }

        let mut results: Vec<(usize, Result<Option<Vec<crate::spec::TextOverlay>>>)> =
            Vec::with_capacity(segments.len());
        while let Some(result) = futures.next().await {
            results.push(result);
        }
        results.sort_by_key(|(index, _)| *index);

        let mut aligned = Vec::with_capacity(segments.len());
        for (segment, (_, overlays)) in segments.iter().cloned().zip(results) {
            let mut segment = segment;
            segment.text_over = overlays?;
            aligned.push(segment);
        }

        Ok(aligned)
    }
}
