//! yt-dlp backed [`MediaResolver`]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::models::{FormatSelection, MediaFormat, MediaKind, ResolvedMedia};
use super::platform::Platform;
use super::resolver::{DownloadRequest, MediaResolver, ResolverError};

const INSTAGRAM_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X)";
const DIRECT_FORMAT: &str = "best[ext=mp4]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/best";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInfo {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    thumbnail: Option<String>,
    formats: Vec<RawFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFormat {
    format_id: String,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    // some extractors report floats here
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl RawFormat {
    fn into_media_format(self) -> Option<MediaFormat> {
        let approx_size_bytes = self
            .filesize
            .or(self.filesize_approx)
            .filter(|s| *s > 0.0)
            .map(|s| s as u64);

        // a missing codec field means that stream is absent
        let has_video = self.vcodec.as_deref().is_some_and(|c| c != "none");
        let has_audio = self.acodec.as_deref().is_some_and(|c| c != "none");

        if has_video {
            let height = self.height?;
            Some(MediaFormat {
                media_kind: MediaKind::Video,
                quality_label: format!("{height}p"),
                format_id: self.format_id,
                height: Some(height),
                approx_size_bytes,
            })
        } else if has_audio {
            Some(MediaFormat {
                media_kind: MediaKind::Audio,
                quality_label: "audio".to_string(),
                format_id: self.format_id,
                height: None,
                approx_size_bytes,
            })
        } else {
            None
        }
    }
}

/// Parse `--dump-single-json` output
pub fn parse_info(json: &[u8]) -> Result<ResolvedMedia, ResolverError> {
    let raw: RawInfo = serde_json::from_slice(json)?;

    Ok(ResolvedMedia {
        title: raw.title,
        uploader: raw.uploader.filter(|u| !u.is_empty()),
        duration_secs: raw.duration.filter(|d| *d > 0.0).map(|d| d as u64),
        view_count: raw.view_count,
        thumbnail_url: raw.thumbnail,
        formats: raw
            .formats
            .into_iter()
            .filter(|f| !f.format_id.is_empty())
            .filter_map(RawFormat::into_media_format)
            .collect(),
    })
}

pub struct YtDlpResolver {
    program: PathBuf,
    impersonation: bool,
    cookies: BTreeMap<Platform, PathBuf>,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            impersonation: false,
            cookies: BTreeMap::new(),
        }
    }

    /// Pass `--impersonate chrome` for TikTok
    pub fn with_impersonation(mut self, enabled: bool) -> Self {
        self.impersonation = enabled;
        self
    }

    /// Cookie files known to exist, per platform
    pub fn with_cookies(mut self, cookies: BTreeMap<Platform, PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    fn platform_args(&self, platform: Platform, args: &mut Vec<String>) {
        if let Some(path) = self.cookies.get(&platform) {
            args.push("--cookies".into());
            args.push(path.display().to_string());
        }

        match platform {
            Platform::Tiktok if self.impersonation => {
                args.push("--impersonate".into());
                args.push("chrome".into());
            }
            Platform::Instagram => {
                args.push("--user-agent".into());
                args.push(INSTAGRAM_USER_AGENT.into());
            }
            _ => {}
        }
    }

    pub fn info_args(&self, url: &str, platform: Platform) -> Vec<String> {
        let mut args: Vec<String> = [
            "--dump-single-json",
            "--no-warnings",
            "--no-check-certificates",
            "--skip-download",
            "--socket-timeout",
            "30",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        self.platform_args(platform, &mut args);
        args.push(url.to_string());
        args
    }

    pub fn download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let mut args = vec![
            "--output".to_string(),
            request.output.display().to_string(),
            "--no-check-certificates".to_string(),
            "--retries".to_string(),
            "3".to_string(),
        ];

        let (format, merge) = match &request.selection {
            FormatSelection::Exact {
                format_id,
                kind: MediaKind::Video,
            } => (format!("{format_id}+bestaudio/best"), true),
            FormatSelection::Exact {
                format_id,
                kind: MediaKind::Audio,
            } => (format_id.clone(), false),
            FormatSelection::BestEffort => (DIRECT_FORMAT.to_string(), true),
        };

        args.push("--format".into());
        args.push(format);
        if merge {
            args.push("--merge-output-format".into());
            args.push("mp4".into());
        }

        self.platform_args(request.platform, &mut args);
        args.push(request.url.clone());
        args
    }

    async fn run(&self, args: Vec<String>, timeout: Duration) -> Result<Output, ResolverError> {
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ResolverError::ToolMissing {
                tool: self.program.display().to_string(),
                source,
            })?;

        // dropping the future on timeout kills the child
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ResolverError::Timeout(timeout))??;

        if !output.status.success() {
            return Err(ResolverError::Execution {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(
        &self,
        url: &str,
        platform: Platform,
        timeout: Duration,
    ) -> Result<ResolvedMedia, ResolverError> {
        let output = self.run(self.info_args(url, platform), timeout).await?;
        let media = parse_info(&output.stdout)?;

        debug!(
            %platform,
            formats = media.formats.len(),
            title = media.display_title(),
            "Metadata resolved"
        );

        Ok(media)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        timeout: Duration,
    ) -> Result<PathBuf, ResolverError> {
        self.run(self.download_args(request), timeout).await?;

        match tokio::fs::metadata(&request.output).await {
            Ok(meta) if meta.len() > 0 => Ok(request.output.clone()),
            Ok(_) => Err(ResolverError::EmptyOutput(request.output.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ResolverError::EmptyOutput(request.output.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
