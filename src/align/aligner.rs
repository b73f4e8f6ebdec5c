use crate::error::{Result, VideoForgeError};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// One word from the forced aligner. `case == "success"` means the word was
/// located in the audio and carries usable timestamps.
#[derive(Debug, Clone, Deserialize)]
pub struct WordRecord {
    pub word: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub case: String,
}

impl WordRecord {
    pub fn is_success(&self) -> bool {
        self.case == "success"
    }
}

#[derive(Debug, Deserialize)]
struct AlignmentResponse {
    #[serde(default)]
    words: Vec<WordRecord>,
}

/// Quality summary of one alignment result.
#[derive(Debug, Clone)]
pub struct AlignmentVerification {
    pub total_words: usize,
    pub success_count: usize,
    pub success_ratio: f64,
    pub passed: bool,
}

/// Ratio of successfully aligned words against the configured floor. The
/// result never aborts mapping; a failed check just means the segment keeps
/// no subtitles.
pub fn verify_alignment(words: &[WordRecord], min_success_ratio: f64) -> AlignmentVerification {
    let total_words = words.len();
    let success_count = words.iter().filter(|w| w.is_success()).count();
    let success_ratio = if total_words > 0 {
        success_count as f64 / total_words as f64
    } else {
        0.0
    };
    AlignmentVerification {
        total_words,
        success_count,
        success_ratio,
        passed: success_ratio >= min_success_ratio,
    }
}

/// Client for the external forced-aligner service (Gentle-compatible HTTP
/// API). Long calls are expected; retries use a linearly increasing delay.
pub struct AlignerClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl AlignerClient {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    async fn build_form(&self, audio_path: &Path, transcript: &str) -> Result<Form> {
        let audio_bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let audio_part = Part::bytes(audio_bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;
        let transcript_part = Part::text(transcript.to_string()).file_name("transcript.txt");

        Ok(Form::new()
            .part("audio", audio_part)
            .part("transcript", transcript_part))
    }

    /// Align the voice-over audio against its transcript, returning the
    /// word records in transcript order.
    pub async fn align(&self, audio_path: &Path, transcript: &str) -> Result<Vec<WordRecord>> {
        let url = format!("{}?async=false", self.url);
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let delay = self.retry_delay * (attempt - 1);
                warn!(
                    "alignment attempt {}/{} failed, retrying in {:?}",
                    attempt - 1,
                    self.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            // The form is consumed per request, so rebuild it each attempt.
            let form = self.build_form(audio_path, transcript).await?;

            debug!("POST {} (attempt {}/{})", url, attempt, self.max_retries);
            let response = tokio::time::timeout(
                self.timeout,
                self.client.post(&url).multipart(form).send(),
            )
            .await;

            match response {
                Ok(Ok(resp)) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp.text().await?;
                        let parsed: AlignmentResponse = serde_json::from_str(&body)?;
                        let success = parsed.words.iter().filter(|w| w.is_success()).count();
                        info!(
                            "aligner returned {}/{} successful words",
                            success,
                            parsed.words.len()
                        );
                        return Ok(parsed.words);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    last_error = Some(VideoForgeError::Alignment(format!(
                        "aligner returned {}: {}",
                        status, body
                    )));
                }
                Ok(Err(e)) => {
                    last_error = Some(VideoForgeError::Alignment(format!(
                        "aligner request failed: {}",
                        e
                    )));
                }
                Err(_) => {
                    last_error = Some(VideoForgeError::Alignment(format!(
                        "aligner timed out after {:?}",
                        self.timeout
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            VideoForgeError::Alignment("aligner failed with unknown error".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(w: &str, start: f64, end: f64, case: &str) -> WordRecord {
        WordRecord {
            word: w.to_string(),
            start,
            end,
            case: case.to_string(),
        }
    }

    #[test]
    fn test_verification_above_floor() {
        let words = vec![
            word("hello", 0.0, 0.4, "success"),
            word("world", 0.5, 0.9, "success"),
            word("today", 1.0, 1.4, "not-found-in-audio"),
        ];
        let v = verify_alignment(&words, 0.5);
        assert_eq!(v.total_words, 3);
        assert_eq!(v.success_count, 2);
        assert!(v.passed);
        assert!((v.success_ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_verification_below_floor() {
        let words = vec![
            word("hello", 0.0, 0.4, "success"),
            word("world", 0.0, 0.0, "not-found-in-audio"),
        ];
        let v = verify_alignment(&words, 0.8);
        assert!(!v.passed);
    }

    #[test]
    fn test_verification_empty() {
        let v = verify_alignment(&[], 0.8);
        assert_eq!(v.total_words, 0);
        assert!(!v.passed);
    }

    #[test]
    fn test_response_parsing_with_missing_timestamps() {
        let json = r#"{
            "words": [
                { "word": "hello", "start": 0.1, "end": 0.5, "case": "success" },
                { "word": "world", "case": "not-found-in-audio" }
            ]
        }"#;
        let parsed: AlignmentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.words.len(), 2);
        assert!(parsed.words[0].is_success());
        assert!(!parsed.words[1].is_success());
        assert_eq!(parsed.words[1].start, 0.0);
    }

    #[tokio::test]
    async fn test_align_missing_audio_file() {
        let client = AlignerClient::new(
            "http://localhost:8765/transcriptions".to_string(),
            Duration::from_secs(5),
        );
        let result = client
            .align(Path::new("/nonexistent/audio.mp3"), "hello world")
            .await;
        assert!(result.is_err());
    }
}
