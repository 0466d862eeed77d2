use std::collections::HashSet;

use serde::Serialize;

use super::models::{MediaFormat, MediaKind, ResolvedMedia};
use crate::humanize::ByteSize;

/// A variant the user can pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Offer {
    pub media_kind: MediaKind,
    pub label: String,
    pub format_id: String,
    pub approx_size_bytes: Option<u64>,
}

impl Offer {
    fn from_format(format: &MediaFormat) -> Self {
        Self {
            media_kind: format.media_kind,
            label: format.quality_label.clone(),
            format_id: format.format_id.clone(),
            approx_size_bytes: format.approx_size_bytes,
        }
    }

    /// Button text, e.g. `🎥 720p (12.5 MB)` or `🎵 Audio`
    pub fn button_label(&self) -> String {
        let size = match self.approx_size_bytes {
            Some(bytes) if bytes > 0 => format!(" ({})", ByteSize(bytes).to_human_readable()),
            _ => String::new(),
        };

        match self.media_kind {
            MediaKind::Video => format!("🎥 {}{}", self.label, size),
            MediaKind::Audio => format!("🎵 Audio{}", size),
        }
    }
}

/// Choices presented for one link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Offers {
    /// Highest resolution first
    pub video: Vec<Offer>,
    pub audio: Option<Offer>,
}

impl Offers {
    /// Offers are only shown when at least one video variant survived
    pub fn has_video(&self) -> bool {
        !self.video.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Offer> {
        self.video.iter().chain(self.audio.iter())
    }

    pub fn len(&self) -> usize {
        self.video.len() + usize::from(self.audio.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pick the variants worth showing.
///
/// Video: one per distinct height (first listed wins), at least `min_height`,
/// sorted highest first and capped at `max_video`. Audio: the first audio-only
/// format, if any.
pub fn select_offers(media: &ResolvedMedia, max_video: usize, min_height: u32) -> Offers {
    let mut seen = HashSet::new();
    let mut video: Vec<(u32, Offer)> = media
        .formats
        .iter()
        .filter(|f| f.media_kind == MediaKind::Video)
        .filter_map(|f| f.height.filter(|h| *h >= min_height).map(|h| (h, f)))
        .filter(|(h, _)| seen.insert(*h))
        .map(|(h, f)| (h, Offer::from_format(f)))
        .collect();

    // heights are unique here
    video.sort_by(|a, b| b.0.cmp(&a.0));
    video.truncate(max_video);

    let audio = media
        .formats
        .iter()
        .find(|f| f.media_kind == MediaKind::Audio)
        .map(Offer::from_format);

    Offers {
        video: video.into_iter().map(|(_, offer)| offer).collect(),
        audio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, height: u32, size: Option<u64>) -> MediaFormat {
        MediaFormat {
            media_kind: MediaKind::Video,
            quality_label: format!("{height}p"),
            format_id: id.to_string(),
            height: Some(height),
            approx_size_bytes: size,
        }
    }

    fn audio(id: &str) -> MediaFormat {
        MediaFormat {
            media_kind: MediaKind::Audio,
            quality_label: "audio".to_string(),
            format_id: id.to_string(),
            height: None,
            approx_size_bytes: Some(3 * 1024 * 1024),
        }
    }

    fn media(formats: Vec<MediaFormat>) -> ResolvedMedia {
        ResolvedMedia {
            title: Some("clip".into()),
            formats,
            ..Default::default()
        }
    }

    #[test]
    fn test_dedupes_filters_sorts_and_caps() {
        let resolved = media(vec![
            video("160", 144, None),
            video("133", 240, None),
            video("134", 360, None),
            video("18", 360, None),
            audio("140"),
            video("136", 720, None),
            video("135", 480, None),
            video("137", 1080, None),
            audio("251"),
        ]);

        let offers = select_offers(&resolved, 4, 240);

        let ids: Vec<_> = offers.video.iter().map(|o| o.format_id.as_str()).collect();
        assert_eq!(ids, ["137", "136", "135", "134"]);
        assert_eq!(offers.audio.as_ref().unwrap().format_id, "140");
        assert_eq!(offers.len(), 5);
    }

    #[test]
    fn test_audio_only_has_no_video() {
        let offers = select_offers(&media(vec![audio("140"), video("160", 144, None)]), 4, 240);

        assert!(!offers.has_video());
        assert!(offers.audio.is_some());
    }

    #[test]
    fn test_empty_formats() {
        let offers = select_offers(&media(vec![]), 4, 240);
        assert!(offers.is_empty());
        assert_eq!(offers.iter().count(), 0);
    }

    #[test]
    fn test_button_labels() {
        let with_size = Offer::from_format(&video("22", 720, Some(13_107_200)));
        assert_eq!(with_size.button_label(), "🎥 720p (12.5 MB)");

        let no_size = Offer::from_format(&video("22", 720, Some(0)));
        assert_eq!(no_size.button_label(), "🎥 720p");

        let sound = Offer::from_format(&audio("140"));
        assert_eq!(sound.button_label(), "🎵 Audio (3 MB)");
    }
}
