use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use super::platform::Platform;
use crate::config::ResolverConfig;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("yt-dlp is not usable at '{path}'; install it with `pip install -U yt-dlp`")]
    YtDlpUnavailable { path: String },
}

/// What the host can do, gathered once at startup
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolReport {
    pub ytdlp_version: String,
    /// `--impersonate` is supported
    pub impersonation: bool,
    /// A chrome impersonation target is installed
    pub chrome_targets: bool,
    pub ffmpeg: bool,
    /// Cookie files that exist on disk
    pub cookies: BTreeMap<Platform, PathBuf>,
}

impl ToolReport {
    pub fn has_cookies(&self, platform: Platform) -> bool {
        self.cookies.contains_key(&platform)
    }
}

/// Stdout of `program args`, or `None` if it cannot run or exits non-zero
async fn probe(program: &str, args: &[&str]) -> Option<String> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;

    let output = tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output())
        .await
        .ok()?
        .ok()?;

    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Keep only the configured cookie files that exist
pub async fn existing_cookies(
    configured: &BTreeMap<Platform, PathBuf>,
) -> BTreeMap<Platform, PathBuf> {
    let mut found = BTreeMap::new();

    for (platform, path) in configured {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(%platform, path = %path.display(), "Cookies found");
            found.insert(*platform, path.clone());
        } else {
            warn!(%platform, path = %path.display(), "Cookies missing");
        }
    }

    found
}

/// Check external tools. Only a missing yt-dlp is fatal.
pub async fn run_preflight(config: &ResolverConfig) -> Result<ToolReport, PreflightError> {
    let Some(version) = probe(&config.ytdlp_path, &["--version"]).await else {
        return Err(PreflightError::YtDlpUnavailable {
            path: config.ytdlp_path.clone(),
        });
    };
    let ytdlp_version = version.trim().to_string();
    info!(version = %ytdlp_version, "yt-dlp available");

    let impersonation = probe(&config.ytdlp_path, &["--help"])
        .await
        .is_some_and(|help| help.contains("--impersonate"));

    let chrome_targets = if impersonation {
        info!("TikTok impersonation supported");
        probe(&config.ytdlp_path, &["--list-impersonate-targets"])
            .await
            .is_some_and(|targets| {
                targets
                    .lines()
                    .any(|line| line.contains("chrome") && !line.contains("info"))
            })
    } else {
        warn!("TikTok impersonation unavailable; update yt-dlp and install curl-impersonate");
        false
    };

    let ffmpeg = probe(&config.ffmpeg_path, &["-version"]).await.is_some();
    if ffmpeg {
        info!("ffmpeg available");
    } else {
        warn!(path = %config.ffmpeg_path, "ffmpeg missing; merged video formats will fail");
    }

    let cookies = existing_cookies(&config.cookies).await;

    Ok(ToolReport {
        ytdlp_version,
        impersonation,
        chrome_targets,
        ffmpeg,
        cookies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_ytdlp_is_fatal() {
        let config = ResolverConfig {
            ytdlp_path: "/nonexistent/yt-dlp".into(),
            ..Default::default()
        };

        let err = run_preflight(&config).await.unwrap_err();
        assert!(matches!(err, PreflightError::YtDlpUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_existing_cookies_filters_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("www.instagram.com_cookies.txt");
        tokio::fs::write(&present, "# Netscape HTTP Cookie File\n")
            .await
            .unwrap();

        let configured = BTreeMap::from([
            (Platform::Instagram, present.clone()),
            (Platform::Tiktok, dir.path().join("missing.txt")),
        ]);

        let found = existing_cookies(&configured).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&Platform::Instagram), Some(&present));
    }

    #[test]
    fn test_report_cookie_lookup() {
        let report = ToolReport {
            cookies: BTreeMap::from([(Platform::Tiktok, PathBuf::from("t.txt"))]),
            ..Default::default()
        };
        assert!(report.has_cookies(Platform::Tiktok));
        assert!(!report.has_cookies(Platform::Instagram));
    }
}
