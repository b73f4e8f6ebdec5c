use crate::agent::AgentClient;
use crate::config::Config;
use crate::error::{Result, VideoForgeError};
use crate::spec::{FetchedAssets, MediaSource, Segment, VideoSpec};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sentinel query tried when every extracted keyword comes up empty.
const FALLBACK_QUERY: &str = "abstract background";

const KEYWORD_SYSTEM_PROMPT: &str = "You are an expert image search specialist. Extract the best \
English keywords to find suitable stock photos for the given content. Focus on visual, concrete \
terms rather than abstract concepts. Use short, specific keywords (1-2 words each) and make \
primary_keyword the most important term. Respond with a JSON object: \
{\"keywords\": [\"...\"], \"primary_keyword\": \"...\"}.";

#[derive(Debug, Deserialize)]
struct KeywordExtraction {
    keywords: Vec<String>,
    #[allow(dead_code)]
    primary_keyword: String,
}

/// AI-backed keyword extraction with a deterministic fallback: the raw
/// content as a single query (or "nature" when the content is empty).
pub struct KeywordExtractor {
    agent: AgentClient,
    max_keywords: usize,
}

impl KeywordExtractor {
    pub fn new(agent: AgentClient, max_keywords: usize) -> Self {
        Self {
            agent,
            max_keywords,
        }
    }

    pub async fn extract(&self, content: &str) -> Vec<String> {
        let fallback = || {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                vec!["nature".to_string()]
            } else {
                vec![trimmed.to_string()]
            }
        };

        if !self.agent.is_available() {
            return fallback();
        }

        let prompt = format!("Extract image search keywords for: {}", content);
        match self
            .agent
            .run_json::<KeywordExtraction>(KEYWORD_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(extraction) => {
                let keywords: Vec<String> = extraction
                    .keywords
                    .into_iter()
                    .filter(|k| !k.trim().is_empty())
                    .take(self.max_keywords)
                    .collect();
                if keywords.is_empty() {
                    fallback()
                } else {
                    debug!("extracted keywords: {:?}", keywords);
                    keywords
                }
            }
            Err(e) => {
                warn!("keyword extraction failed ({}), using raw content", e);
                fallback()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "largeImageURL")]
    large_image_url: String,
    #[serde(rename = "imageWidth")]
    image_width: u32,
    #[serde(rename = "imageHeight")]
    image_height: u32,
}

/// Pixabay-style image search returning the first URL whose image meets the
/// dimension minima.
pub struct ImageSearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ImageSearchClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        min_width: u32,
        min_height: u32,
    ) -> Result<Option<String>> {
        let Some(api_key) = self.api_key.as_ref() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", api_key.as_str()),
                ("q", query),
                ("image_type", "photo"),
                ("min_width", &min_width.to_string()),
                ("min_height", &min_height.to_string()),
                ("per_page", "10"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VideoForgeError::Api(format!(
                "image search error ({}): {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response.json().await?;
        let url = parsed
            .hits
            .into_iter()
            .find(|h| h.image_width >= min_width && h.image_height >= min_height)
            .map(|h| h.large_image_url);
        Ok(url)
    }
}

/// True when the image on disk meets the configured pixel minima. Unreadable
/// files count as unqualified.
pub fn is_image_qualified(path: &Path, min_width: u32, min_height: u32) -> bool {
    match image::image_dimensions(path) {
        Ok((w, h)) => w >= min_width && h >= min_height,
        Err(e) => {
            warn!("could not read image dimensions for {}: {}", path.display(), e);
            false
        }
    }
}

/// Qualifies each segment's image and substitutes unsuitable ones via
/// keyword extraction and image search. Segments with a video asset pass
/// through untouched.
pub struct ImageQualifier {
    extractor: KeywordExtractor,
    search: ImageSearchClient,
    http: reqwest::Client,
    min_width: u32,
    min_height: u32,
}

impl ImageQualifier {
    pub fn new(config: &Config, agent: AgentClient) -> Self {
        Self {
            extractor: KeywordExtractor::new(agent, config.max_keywords),
            search: ImageSearchClient::new(
                config.image_search_url.clone(),
                config.image_search_api_key.clone(),
            ),
            http: reqwest::Client::new(),
            min_width: config.min_image_width,
            min_height: config.min_image_height,
        }
    }

    async fn find_replacement(&self, content: &str) -> Result<Option<String>> {
        let keywords = self.extractor.extract(content).await;

        for keyword in &keywords {
            if let Some(url) = self
                .search
                .search(keyword, self.min_width, self.min_height)
                .await?
            {
                info!("found replacement image with keyword '{}'", keyword);
                return Ok(Some(url));
            }
        }

        let fallback = self
            .search
            .search(FALLBACK_QUERY, self.min_width, self.min_height)
            .await?;
        if fallback.is_some() {
            warn!("using '{}' fallback image", FALLBACK_QUERY);
        }
        Ok(fallback)
    }

    async fn download_replacement(&self, url: &str, temp_dir: &Path) -> Result<PathBuf> {
        let path_part = url.split(['?', '#']).next().unwrap_or(url);
        let ext = Path::new(path_part)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_else(|| ".jpg".to_string());
        let dest = temp_dir.join(format!("auto_image_{}{}", Uuid::new_v4().simple(), ext));

        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        tokio::fs::write(&dest, &bytes).await?;
        Ok(dest)
    }

    /// Merge downloaded asset paths into the segments and replace every
    /// under-resolution image. Returns the enriched segment list,
    /// index-aligned with the input.
    pub async fn enrich(
        &self,
        spec: &VideoSpec,
        assets: &FetchedAssets,
        temp_dir: &Path,
    ) -> Result<Vec<Segment>> {
        if spec.segments.len() != assets.segments.len() {
            return Err(VideoForgeError::Validation(format!(
                "segment count mismatch: {} segments vs {} asset records",
                spec.segments.len(),
                assets.segments.len()
            )));
        }

        let mut enriched = Vec::with_capacity(spec.segments.len());

        for (segment, seg_assets) in spec.segments.iter().zip(assets.segments.iter()) {
            let mut segment = segment.clone();

            if let (Some(video), Some(record)) = (&mut segment.video, &seg_assets.video) {
                video.local_path = Some(record.local_path.clone());
            }
            if let (Some(image), Some(record)) = (&mut segment.image, &seg_assets.image) {
                image.local_path = Some(record.local_path.clone());
            }
            if let (Some(vo), Some(record)) = (&mut segment.voice_over, &seg_assets.voice_over) {
                vo.local_path = Some(record.local_path.clone());
            }

            // A video asset supersedes the image; nothing to qualify.
            if seg_assets.video.is_some() {
                enriched.push(segment);
                continue;
            }

            let qualified = segment
                .image
                .as_ref()
                .and_then(|i| i.local_path.as_deref())
                .map(|p| is_image_qualified(p, self.min_width, self.min_height))
                .unwrap_or(false);

            if !qualified {
                let content = segment
                    .voice_over
                    .as_ref()
                    .map(|v| v.content.as_str())
                    .unwrap_or("");
                let url = self.find_replacement(content).await?.ok_or_else(|| {
                    VideoForgeError::processing(
                        "image_qualifier",
                        format!("no suitable image found for segment '{}'", segment.id),
                    )
                })?;
                let local_path = self.download_replacement(&url, temp_dir).await?;
                info!(
                    "replaced image for segment '{}' with {}",
                    segment.id, url
                );
                segment.image = Some(MediaSource {
                    url,
                    local_path: Some(local_path),
                });
            }

            enriched.push(segment);
        }

        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_image_is_unqualified() {
        assert!(!is_image_qualified(
            Path::new("/nonexistent/image.jpg"),
            1024,
            576
        ));
    }

    #[tokio::test]
    async fn test_keyword_fallback_without_agent() {
        let agent = AgentClient::new("https://api.example.com/v1".into(), None, "m".into());
        let extractor = KeywordExtractor::new(agent, 3);

        let keywords = extractor.extract("a mountain sunrise").await;
        assert_eq!(keywords, vec!["a mountain sunrise".to_string()]);

        let agent = AgentClient::new("https://api.example.com/v1".into(), None, "m".into());
        let extractor = KeywordExtractor::new(agent, 3);
        let keywords = extractor.extract("   ").await;
        assert_eq!(keywords, vec!["nature".to_string()]);
    }

    #[tokio::test]
    async fn test_search_without_key_returns_none() {
        let search = ImageSearchClient::new("https://pixabay.com/api/".into(), None);
        let result = search.search("mountain", 1024, 576).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_search_response_parsing() {
        let json = r#"{
            "hits": [
                { "largeImageURL": "https://cdn/a.jpg", "imageWidth": 640, "imageHeight": 480 },
                { "largeImageURL": "https://cdn/b.jpg", "imageWidth": 1920, "imageHeight": 1080 }
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let url = parsed
            .hits
            .into_iter()
            .find(|h| h.image_width >= 1024 && h.image_height >= 576)
            .map(|h| h.large_image_url);
        assert_eq!(url.as_deref(), Some("https://cdn/b.jpg"));
    }
}
