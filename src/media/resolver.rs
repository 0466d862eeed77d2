use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use thiserror::Error;

use super::failure::FailureKind;
use super::models::{FormatSelection, ResolvedMedia};
use super::platform::Platform;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("{tool} could not be started: {source}")]
    ToolMissing {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("exited with status {status:?}: {stderr}")]
    Execution { status: Option<i32>, stderr: String },

    #[error("could not parse metadata: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no output file at {0}")]
    EmptyOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolverError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ResolverError::Execution { stderr, .. } => FailureKind::classify(stderr),
            _ => FailureKind::Generic,
        }
    }
}

/// Everything needed to fetch one artifact to a caller-owned path
#[derive(Debug, Clone, Builder)]
pub struct DownloadRequest {
    #[builder(into)]
    pub url: String,
    pub platform: Platform,
    pub selection: FormatSelection,
    /// Written by the resolver, removed by the caller
    #[builder(into)]
    pub output: PathBuf,
}

/// Metadata lookup and download backend
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(
        &self,
        url: &str,
        platform: Platform,
        timeout: Duration,
    ) -> Result<ResolvedMedia, ResolverError>;

    /// Fetch to `request.output`; returns the path of a non-empty file
    async fn download(
        &self,
        request: &DownloadRequest,
        timeout: Duration,
    ) -> Result<PathBuf, ResolverError>;
}
