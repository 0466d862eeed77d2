use serde::{Deserialize, Serialize};
use std::fmt;

/// Source platform, derived from the link's domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
    Facebook,
    Twitter,
    Other,
}

impl Platform {
    /// Substring match on the url; anything unrecognised is [`Platform::Other`]
    pub fn detect(url: &str) -> Self {
        let url = url.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| url.contains(n));

        if has(&["tiktok.com"]) {
            Platform::Tiktok
        } else if has(&["instagram.com"]) {
            Platform::Instagram
        } else if has(&["youtube.com", "youtu.be"]) {
            Platform::Youtube
        } else if has(&["facebook.com", "fb.watch"]) {
            Platform::Facebook
        } else if has(&["twitter.com", "x.com"]) {
            Platform::Twitter
        } else {
            Platform::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the link from a message: first whitespace-separated token.
/// TikTok share links also lose their tracking query string.
pub fn clean_url(raw: &str) -> String {
    let first = raw.split_whitespace().next().unwrap_or_default();

    if first.contains("tiktok.com") {
        return first.split('?').next().unwrap_or(first).to_string();
    }

    first.to_string()
}

/// Only http(s) links are worth resolving
pub fn looks_like_url(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with("http://") || text.starts_with("https://")
}
