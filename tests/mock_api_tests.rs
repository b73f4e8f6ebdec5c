//! Mock API tests for the external service clients
//!
//! These tests run the HTTP clients against wiremock servers so the wire
//! formats and fallback behaviors are validated without real endpoints.

use serde_json::json;
use std::time::Duration;
use videoforge::agent::AgentClient;
use videoforge::align::{AlignerClient, PhraseSegmenter};
use videoforge::enrich::{ImageSearchClient, KeywordExtractor};
use videoforge::fetch::Fetcher;
use videoforge::spec::{MediaSource, Segment, VideoSpec};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_reply(content: serde_json::Value) -> serde_json::Value {
    json!({
        "choices": [
            { "message": { "role": "assistant", "content": content.to_string() } }
        ]
    })
}

fn agent_for(server: &MockServer) -> AgentClient {
    AgentClient::new(
        server.uri(),
        Some("test-key".to_string()),
        "test-model".to_string(),
    )
}

// ============================================================================
// Forced Aligner Tests
// ============================================================================

mod aligner_tests {
    use super::*;

    #[tokio::test]
    async fn test_align_parses_word_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcriptions"))
            .and(query_param("async", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "words": [
                    { "word": "hello", "start": 0.1, "end": 0.5, "case": "success" },
                    { "word": "world", "start": 0.6, "end": 1.0, "case": "success" },
                    { "word": "again", "case": "not-found-in-audio" }
                ]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("voice.mp3");
        std::fs::write(&audio, b"fake audio bytes").unwrap();

        let client = AlignerClient::new(
            format!("{}/transcriptions", server.uri()),
            Duration::from_secs(5),
        );
        let words = client.align(&audio, "hello world again").await.unwrap();

        assert_eq!(words.len(), 3);
        assert!(words[0].is_success());
        assert_eq!(words[1].start, 0.6);
        assert!(!words[2].is_success());
    }

    #[tokio::test]
    async fn test_align_server_error_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcriptions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("voice.mp3");
        std::fs::write(&audio, b"fake audio bytes").unwrap();

        let client = AlignerClient::new(
            format!("{}/transcriptions", server.uri()),
            Duration::from_secs(5),
        )
        .with_retries(2, Duration::from_millis(10));

        let result = client.align(&audio, "hello").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("500"));
    }
}

// ============================================================================
// AI Agent Tests
// ============================================================================

mod agent_tests {
    use super::*;

    #[tokio::test]
    async fn test_run_json_parses_structured_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(json!({
                "keywords": ["mountain", "sunrise"],
                "primary_keyword": "mountain"
            }))))
            .mount(&server)
            .await;

        #[derive(serde::Deserialize)]
        struct Keywords {
            keywords: Vec<String>,
        }

        let agent = agent_for(&server);
        let parsed: Keywords = agent.run_json("system", "user").await.unwrap();
        assert_eq!(parsed.keywords, vec!["mountain", "sunrise"]);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let agent = agent_for(&server);
        let result: Result<serde_json::Value, _> = agent.run_json("system", "user").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_keyword_extractor_uses_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(json!({
                "keywords": ["business", "meeting", "office", "teamwork"],
                "primary_keyword": "business"
            }))))
            .mount(&server)
            .await;

        let extractor = KeywordExtractor::new(agent_for(&server), 3);
        let keywords = extractor.extract("a business meeting in the office").await;
        // Capped by max_keywords.
        assert_eq!(keywords, vec!["business", "meeting", "office"]);
    }

    #[tokio::test]
    async fn test_keyword_extractor_falls_back_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("nope"))
            .mount(&server)
            .await;

        let extractor = KeywordExtractor::new(agent_for(&server), 3);
        let keywords = extractor.extract("a business meeting").await;
        assert_eq!(keywords, vec!["a business meeting"]);
    }

    #[tokio::test]
    async fn test_phrase_segmenter_accepts_valid_agent_phrases() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(json!({
                "phrases": ["Hello everyone", "welcome back to", "our channel"]
            }))))
            .mount(&server)
            .await;

        let segmenter = PhraseSegmenter::new(agent_for(&server));
        let phrases = segmenter
            .segment("Hello everyone welcome back to our channel")
            .await;
        assert_eq!(
            phrases,
            vec!["Hello everyone", "welcome back to", "our channel"]
        );
    }

    #[tokio::test]
    async fn test_phrase_segmenter_rejects_word_dropping_agent() {
        // The agent silently drops "channel"; the segmenter must fall back
        // to the deterministic splitter so no word is lost.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(json!({
                "phrases": ["Hello everyone", "welcome back to our"]
            }))))
            .mount(&server)
            .await;

        let segmenter = PhraseSegmenter::new(agent_for(&server));
        let content = "Hello everyone welcome back to our channel";
        let phrases = segmenter.segment(content).await;
        let joined = phrases.join(" ");
        assert!(joined.contains("channel"));
    }
}

// ============================================================================
// Image Search Tests
// ============================================================================

mod image_search_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_returns_first_qualifying_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "mountain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [
                    { "largeImageURL": "https://cdn/small.jpg", "imageWidth": 640, "imageHeight": 480 },
                    { "largeImageURL": "https://cdn/big.jpg", "imageWidth": 1920, "imageHeight": 1080 }
                ]
            })))
            .mount(&server)
            .await;

        let client = ImageSearchClient::new(server.uri(), Some("key".to_string()));
        let url = client.search("mountain", 1024, 576).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://cdn/big.jpg"));
    }

    #[tokio::test]
    async fn test_search_no_hits_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": [] })))
            .mount(&server)
            .await;

        let client = ImageSearchClient::new(server.uri(), Some("key".to_string()));
        let url = client.search("nothing", 1024, 576).await.unwrap();
        assert!(url.is_none());
    }
}

// ============================================================================
// Asset Fetcher Tests
// ============================================================================

mod fetcher_tests {
    use super::*;

    fn one_image_spec(url: String) -> VideoSpec {
        VideoSpec {
            title: "t".to_string(),
            description: "d".to_string(),
            segments: vec![Segment {
                id: "s1".to_string(),
                image: Some(MediaSource {
                    url,
                    local_path: None,
                }),
                video: None,
                voice_over: None,
                transition_in: None,
                transition_out: None,
                text_over: None,
            }],
            background_music: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_asset_to_temp_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let spec = one_image_spec(format!("{}/photo.jpg", server.uri()));
        let fetcher = Fetcher::new(4, Duration::from_secs(5));

        let assets = fetcher.fetch_all(&spec, dir.path()).await.unwrap();
        let record = assets.segments[0].image.as_ref().unwrap();
        assert!(record.local_path.exists());
        assert!(record.local_path.to_str().unwrap().ends_with(".jpg"));
        assert_eq!(std::fs::read(&record.local_path).unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_fetch_failure_names_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let spec = one_image_spec(format!("{}/missing.jpg", server.uri()));
        let fetcher = Fetcher::new(4, Duration::from_secs(5));

        let err = fetcher.fetch_all(&spec, dir.path()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("image"), "unexpected error: {}", message);
    }
}
