use thiserror::Error;

use crate::humanize::ByteSize;
use crate::media::{FailureKind, Platform, ResolverError};
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Metadata resolution failed after {attempts} attempts: {source}")]
    ResolutionFailed {
        attempts: u32,
        #[source]
        source: ResolverError,
    },

    #[error("Resolver offered no usable video format")]
    NoUsableFormat,

    #[error("Download failed ({kind:?}): {message}")]
    DownloadFailed {
        kind: FailureKind,
        platform: Platform,
        /// A cookie file was in use for this platform
        cookies_present: bool,
        message: String,
    },

    #[error("Output is {size} bytes, limit is {limit}")]
    OversizedOutput { size: u64, limit: u64 },

    #[error("Selection expired or unknown")]
    SelectionExpired,

    #[error("Queue saturated: {depth} waiting")]
    QueueSaturated { depth: usize },

    #[error("Request took longer than {0:?}")]
    TimedOut(std::time::Duration),

    #[error("Message is not a link")]
    InvalidUrl,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FlowError {
    /// Answered as a button alert rather than a chat message
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            FlowError::SelectionExpired | FlowError::QueueSaturated { .. }
        )
    }

    /// Expected outcomes that say nothing about system health
    pub fn is_user_side(&self) -> bool {
        matches!(
            self,
            FlowError::SelectionExpired | FlowError::QueueSaturated { .. } | FlowError::InvalidUrl
        )
    }

    /// Text shown to the user; raw errors only go to the log
    pub fn user_message(&self) -> String {
        match self {
            FlowError::ResolutionFailed { .. } | FlowError::NoUsableFormat => {
                "❌ Could not read this link. Try another one.".to_string()
            }
            FlowError::DownloadFailed {
                kind,
                platform,
                cookies_present,
                ..
            } => {
                let hint = match kind {
                    FailureKind::ImpersonationRequired => {
                        "🔧 TikTok now requires browser impersonation.\n\
                         Update yt-dlp and install curl-impersonate."
                            .to_string()
                    }
                    FailureKind::RateLimited => {
                        "⏱️ Too many requests.\nWait a minute or two and try again.".to_string()
                    }
                    FailureKind::Blocked => {
                        let advice = if *cookies_present {
                            "Refresh the cookies file, it has expired."
                        } else {
                            "A cookies file is required."
                        };
                        format!(
                            "🔒 {} blocked the request.\n\n{}",
                            platform.as_str().to_uppercase(),
                            advice
                        )
                    }
                    FailureKind::Unavailable => {
                        "🔒 The video is private or has been removed.".to_string()
                    }
                    FailureKind::Generic => "💡 Try another link or format.".to_string(),
                };
                format!("❌ Download failed.\n\n{hint}")
            }
            FlowError::OversizedOutput { size, limit } => format!(
                "❌ Too large: {} (max {})",
                ByteSize(*size).to_human_readable(),
                ByteSize(*limit).to_human_readable()
            ),
            FlowError::SelectionExpired => "❌ This choice has expired. Send the link again.".to_string(),
            FlowError::QueueSaturated { .. } => {
                "⏱️ Too many downloads queued. Try again later.".to_string()
            }
            FlowError::TimedOut(_) => {
                "⏱️ This took too long and was cancelled. Try again later.".to_string()
            }
            FlowError::InvalidUrl => {
                "❌ Send a valid link (starting with http:// or https://).".to_string()
            }
            FlowError::Transport(_) => "❌ Something went wrong. Try again later.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_failed(kind: FailureKind, cookies_present: bool) -> FlowError {
        FlowError::DownloadFailed {
            kind,
            platform: Platform::Instagram,
            cookies_present,
            message: "boom".into(),
        }
    }

    #[test]
    fn test_blocked_message_mentions_cookie_state() {
        let stale = download_failed(FailureKind::Blocked, true).user_message();
        assert!(stale.contains("INSTAGRAM blocked"));
        assert!(stale.contains("expired"));

        let missing = download_failed(FailureKind::Blocked, false).user_message();
        assert!(missing.contains("cookies file is required"));
    }

    #[test]
    fn test_categories_are_distinct() {
        let kinds = [
            FailureKind::ImpersonationRequired,
            FailureKind::RateLimited,
            FailureKind::Blocked,
            FailureKind::Unavailable,
            FailureKind::Generic,
        ];
        let mut messages: Vec<String> = kinds
            .into_iter()
            .map(|k| download_failed(k, false).user_message())
            .collect();
        messages.push(
            FlowError::OversizedOutput {
                size: 3 << 30,
                limit: 2 << 30,
            }
            .user_message(),
        );

        let unique: std::collections::HashSet<_> = messages.iter().collect();
        assert_eq!(unique.len(), messages.len());
    }

    #[test]
    fn test_oversized_message() {
        let msg = FlowError::OversizedOutput {
            size: 3 << 30,
            limit: 2 << 30,
        }
        .user_message();
        assert_eq!(msg, "❌ Too large: 3 GB (max 2 GB)");
    }

    #[test]
    fn test_alert_and_user_side_classification() {
        assert!(FlowError::SelectionExpired.is_alert());
        assert!(FlowError::QueueSaturated { depth: 6 }.is_alert());
        assert!(!FlowError::InvalidUrl.is_alert());
        assert!(FlowError::InvalidUrl.is_user_side());
        assert!(!FlowError::NoUsableFormat.is_user_side());

        let timed_out = FlowError::TimedOut(std::time::Duration::from_secs(600));
        assert!(!timed_out.is_alert());
        assert!(!timed_out.is_user_side());
        assert!(timed_out.user_message().contains("too long"));
    }
}
