use serde::Serialize;

/// Coarse cause of a failed resolve or download, read off the tool's message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Site demands browser impersonation the tool cannot provide
    ImpersonationRequired,
    RateLimited,
    /// Login wall or platform block; usually fixed by fresh cookies
    Blocked,
    /// Private, deleted or region locked
    Unavailable,
    Generic,
}

impl FailureKind {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("impersonat") {
            FailureKind::ImpersonationRequired
        } else if message.contains("429") || lower.contains("too many requests") {
            FailureKind::RateLimited
        } else if lower.contains("login required") || lower.contains("rate-limit") {
            FailureKind::Blocked
        } else if lower.contains("private") || lower.contains("not available") {
            FailureKind::Unavailable
        } else {
            FailureKind::Generic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        let cases = [
            (
                "ERROR: [TikTok] 123: Impersonate target \"chrome\" is not available",
                FailureKind::ImpersonationRequired,
            ),
            ("HTTP Error 429: Too Many Requests", FailureKind::RateLimited),
            (
                "ERROR: [Instagram] abc: Requested content is not available, rate-limit reached or login required",
                FailureKind::Blocked,
            ),
            ("ERROR: Private video. Sign in", FailureKind::Unavailable),
            ("ERROR: This video is not available", FailureKind::Unavailable),
            ("ERROR: Unsupported URL", FailureKind::Generic),
        ];

        for (message, expected) in cases {
            assert_eq!(FailureKind::classify(message), expected, "{message}");
        }
    }
}
