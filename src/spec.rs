use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A parsed video specification: an ordered list of segments plus an
/// optional global background-music bed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSpec {
    pub title: String,
    pub description: String,
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_music: Option<BackgroundMusic>,
}

/// One atomic unit of the output video: a visual source, an optional
/// narrated voice-over, transitions, and subtitle overlays computed by
/// the aligner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<MediaSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_over: Option<VoiceOver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_in: Option<Transition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_out: Option<Transition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_over: Option<Vec<TextOverlay>>,
}

impl Segment {
    /// Fade-in duration in seconds; `cut` and absent transitions contribute 0.
    pub fn fade_in_duration(&self) -> f64 {
        self.transition_in
            .as_ref()
            .map(Transition::effective_duration)
            .unwrap_or(0.0)
    }

    /// Fade-out duration in seconds; `cut` and absent transitions contribute 0.
    pub fn fade_out_duration(&self) -> f64 {
        self.transition_out
            .as_ref()
            .map(Transition::effective_duration)
            .unwrap_or(0.0)
    }
}

/// A remote visual source (image or video clip). `local_path` is filled by
/// the fetch stage; image sources may be replaced wholesale by the
/// qualifier stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceOver {
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub start_delay: f64,
    #[serde(default)]
    pub end_delay: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundMusic {
    pub url: String,
    #[serde(default)]
    pub start_delay: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    pub duration: f64,
}

impl Transition {
    /// Duration that actually pads the clip; a `cut` adds nothing.
    pub fn effective_duration(&self) -> f64 {
        match self.kind {
            TransitionKind::Cut => 0.0,
            _ => self.duration.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Fade,
    FadeBlack,
    FadeWhite,
    Cut,
    /// Anything else in the input; the renderer degrades it to a plain fade.
    #[serde(other)]
    Unsupported,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::Fade => write!(f, "fade"),
            TransitionKind::FadeBlack => write!(f, "fadeblack"),
            TransitionKind::FadeWhite => write!(f, "fadewhite"),
            TransitionKind::Cut => write!(f, "cut"),
            TransitionKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// One timed subtitle: `text` shown from `start_time` for `duration`
/// seconds, relative to the start of the spoken audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub is_fallback: bool,
}

impl TextOverlay {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// What a downloaded asset is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
    VoiceOver,
    BackgroundMusic,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Image => write!(f, "image"),
            AssetKind::Video => write!(f, "video"),
            AssetKind::VoiceOver => write!(f, "voice_over"),
            AssetKind::BackgroundMusic => write!(f, "background_music"),
        }
    }
}

/// A fetched asset: where it came from and where it lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub url: String,
    pub local_path: PathBuf,
    pub kind: AssetKind,
}

/// Per-segment download results, index-aligned with the spec's segments.
#[derive(Debug, Clone, Default)]
pub struct SegmentAssets {
    pub image: Option<AssetRecord>,
    pub video: Option<AssetRecord>,
    pub voice_over: Option<AssetRecord>,
}

/// Output of the fetch stage: one `SegmentAssets` per input segment plus
/// the optional global background-music record.
#[derive(Debug, Clone, Default)]
pub struct FetchedAssets {
    pub segments: Vec<SegmentAssets>,
    pub background_music: Option<AssetRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_spec() {
        let json = r#"{
            "title": "Demo",
            "description": "A demo video",
            "segments": [
                { "id": "s1", "image": { "url": "https://example.com/a.jpg" } }
            ]
        }"#;
        let spec: VideoSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.segments.len(), 1);
        assert_eq!(spec.segments[0].id, "s1");
        assert!(spec.background_music.is_none());
    }

    #[test]
    fn test_transition_kind_parsing() {
        let t: Transition =
            serde_json::from_str(r#"{ "type": "fadeblack", "duration": 0.5 }"#).unwrap();
        assert_eq!(t.kind, TransitionKind::FadeBlack);

        let t: Transition =
            serde_json::from_str(r#"{ "type": "wipe", "duration": 0.5 }"#).unwrap();
        assert_eq!(t.kind, TransitionKind::Unsupported);
    }

    #[test]
    fn test_cut_contributes_no_padding() {
        let t = Transition {
            kind: TransitionKind::Cut,
            duration: 2.0,
        };
        assert_eq!(t.effective_duration(), 0.0);
    }

    #[test]
    fn test_voice_over_delay_defaults() {
        let vo: VoiceOver = serde_json::from_str(
            r#"{ "url": "https://example.com/v.mp3", "content": "Hello world" }"#,
        )
        .unwrap();
        assert_eq!(vo.start_delay, 0.0);
        assert_eq!(vo.end_delay, 0.0);
    }

    #[test]
    fn test_segment_fade_durations() {
        let segment: Segment = serde_json::from_str(
            r#"{
                "id": "s1",
                "transition_in": { "type": "fade", "duration": 0.5 },
                "transition_out": { "type": "cut", "duration": 3.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(segment.fade_in_duration(), 0.5);
        assert_eq!(segment.fade_out_duration(), 0.0);
    }

    #[test]
    fn test_asset_kind_display() {
        assert_eq!(AssetKind::VoiceOver.to_string(), "voice_over");
        assert_eq!(AssetKind::BackgroundMusic.to_string(), "background_music");
    }
}
