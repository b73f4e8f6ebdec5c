use crate::render::RenderedClip;
use crate::spec::{FetchedAssets, Segment, VideoSpec};
use std::collections::HashMap;
use std::path::PathBuf;

/// A value that can travel through the pipeline's keyed bag. Using a closed
/// enum keeps context passing typed: a stage that asks for segments can
/// never silently receive a path.
#[derive(Debug, Clone)]
pub enum ContextValue {
    Json(serde_json::Value),
    Spec(VideoSpec),
    Assets(FetchedAssets),
    Segments(Vec<Segment>),
    Clips(Vec<RenderedClip>),
    Path(PathBuf),
    Url(String),
}

impl ContextValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ContextValue::Json(_) => "json",
            ContextValue::Spec(_) => "spec",
            ContextValue::Assets(_) => "assets",
            ContextValue::Segments(_) => "segments",
            ContextValue::Clips(_) => "clips",
            ContextValue::Path(_) => "path",
            ContextValue::Url(_) => "url",
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ContextValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_spec(&self) -> Option<&VideoSpec> {
        match self {
            ContextValue::Spec(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_assets(&self) -> Option<&FetchedAssets> {
        match self {
            ContextValue::Assets(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_segments(&self) -> Option<&[Segment]> {
        match self {
            ContextValue::Segments(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_clips(&self) -> Option<&[RenderedClip]> {
        match self {
            ContextValue::Clips(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            ContextValue::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            ContextValue::Url(u) => Some(u),
            _ => None,
        }
    }
}

/// The keyed value bag threaded through the stages of one job, plus the
/// job's temp directory and identifier.
#[derive(Debug)]
pub struct PipelineContext {
    data: HashMap<String, ContextValue>,
    pub temp_dir: PathBuf,
    pub video_id: String,
    pub metadata: HashMap<String, String>,
}

impl PipelineContext {
    pub fn new(video_id: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            data: HashMap::new(),
            temp_dir: temp_dir.into(),
            video_id: video_id.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: ContextValue) {
        self.data.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Keys from `required` that are not present in the bag.
    pub fn missing_keys(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|k| !self.data.contains_key(**k))
            .map(|k| k.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_set_get() {
        let mut ctx = PipelineContext::new("job1", "/tmp/job1");
        assert!(ctx.get("spec").is_none());

        ctx.set("result", ContextValue::Url("local:///tmp/out.mp4".into()));
        assert_eq!(
            ctx.get("result").and_then(ContextValue::as_url),
            Some("local:///tmp/out.mp4")
        );
    }

    #[test]
    fn test_missing_keys() {
        let mut ctx = PipelineContext::new("job1", "/tmp/job1");
        ctx.set("a", ContextValue::Url("x".into()));

        let missing = ctx.missing_keys(&["a", "b", "c"]);
        assert_eq!(missing, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_typed_accessor_rejects_wrong_kind() {
        let value = ContextValue::Url("https://example.com".into());
        assert!(value.as_spec().is_none());
        assert_eq!(value.kind(), "url");
    }
}
