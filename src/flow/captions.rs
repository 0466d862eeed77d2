use crate::humanize::ByteSize;
use crate::media::{MediaKind, Platform, ResolvedMedia};

const OFFER_TITLE_CHARS: usize = 100;
const CAPTION_TITLE_CHARS: usize = 200;

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `m:ss`
pub fn format_duration(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// `1234567` -> `1,234,567`
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// HTML header shown above the quality buttons
pub fn offer_text(media: &ResolvedMedia) -> String {
    let mut text = format!(
        "🎬 <b>{}</b>\n",
        escape_html(truncate_chars(media.display_title(), OFFER_TITLE_CHARS))
    );

    if let Some(uploader) = &media.uploader {
        text.push_str(&format!("👤 {}\n", escape_html(uploader)));
    }
    if let Some(duration) = media.duration_secs {
        text.push_str(&format!("⏱️ {}\n", format_duration(duration)));
    }
    if let Some(views) = media.view_count.filter(|v| *v > 0) {
        text.push_str(&format!("👁️ {} views\n", format_count(views)));
    }

    text.push_str("\n📺 Formats:\n");
    text
}

/// Caption for a file picked from offers
pub fn delivery_caption(
    kind: MediaKind,
    title: &str,
    uploader: Option<&str>,
    size: u64,
    bot_username: &str,
) -> String {
    let icon = match kind {
        MediaKind::Video => "🎥",
        MediaKind::Audio => "🎵",
    };

    let mut caption = format!("{icon} {}\n", truncate_chars(title, CAPTION_TITLE_CHARS));
    if let Some(uploader) = uploader.filter(|u| !u.is_empty()) {
        caption.push_str(&format!("👤 {uploader}\n"));
    }
    caption.push_str(&format!(
        "📦 {}\n\n📥 {bot_username}",
        ByteSize(size).to_human_readable()
    ));
    caption
}

/// Caption for a best-effort download
pub fn direct_caption(platform: Platform, size: u64, bot_username: &str) -> String {
    format!(
        "🎥 {}\n📦 {}\n\n📥 {bot_username}",
        platform.as_str().to_uppercase(),
        ByteSize(size).to_human_readable()
    )
}

/// Greeting for /start
pub fn welcome_text(first_name: &str, impersonation: bool, instagram_cookies: bool) -> String {
    let tiktok = if impersonation {
        "✅ TikTok (impersonate)"
    } else {
        "✅ TikTok"
    };
    let cookies = if instagram_cookies {
        "✅ Instagram cookies present"
    } else {
        "⚠️ Instagram cookies missing"
    };

    format!(
        "👋 Hello, <b>{}</b>!\n\n\
         🎬 Video downloader bot\n\n\
         {tiktok}\n✅ Instagram\n✅ YouTube\n✅ Facebook\n✅ Twitter\n\n\
         📤 Send a link!\n\n\
         📊 Status: {cookies}",
        escape_html(first_name)
    )
}

/// Shown while a best-effort download waits for a slot
pub fn queue_status(queued: usize, active: usize) -> String {
    if queued > 0 {
        format!("⏳ In queue: {queued}\n⚙️ Downloading: {active}")
    } else {
        "⏳ Downloading video...".to_string()
    }
}
