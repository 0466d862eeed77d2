use serde::{Deserialize, Serialize};
use std::fmt;

/// What the user ends up receiving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Container extension for the downloaded artifact
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "m4a",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Audio => f.write_str("audio"),
        }
    }
}

/// One downloadable variant reported by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaFormat {
    pub media_kind: MediaKind,
    /// "720p" for video, "audio" for audio-only
    pub quality_label: String,
    pub format_id: String,
    pub height: Option<u32>,
    pub approx_size_bytes: Option<u64>,
}

/// Structured metadata for a link
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedMedia {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration_secs: Option<u64>,
    pub view_count: Option<u64>,
    pub thumbnail_url: Option<String>,
    /// In the order the resolver listed them
    pub formats: Vec<MediaFormat>,
}

impl ResolvedMedia {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Video")
    }
}

/// Which stream(s) a download should fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSelection {
    /// A specific variant picked from an offer
    Exact { format_id: String, kind: MediaKind },
    /// Best combined stream, used when no structured metadata is available
    BestEffort,
}

impl FormatSelection {
    pub fn media_kind(&self) -> MediaKind {
        match self {
            FormatSelection::Exact { kind, .. } => *kind,
            FormatSelection::BestEffort => MediaKind::Video,
        }
    }
}
