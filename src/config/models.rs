use crate::humanize::ByteSize;
use crate::media::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Chat bot connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    /// Bot API token (loaded from environment, never serialized)
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    /// Appended to every delivered caption
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_api_root")]
    pub api_root: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Upper bound for handling one inbound event end to end
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            username: default_username(),
            api_root: default_api_root(),
            poll_timeout_secs: default_poll_timeout_secs(),
            handler_timeout_secs: default_handler_timeout_secs(),
        }
    }
}

fn default_username() -> String {
    "@media_yuklaydibu_bot".to_string()
}

fn default_api_root() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_handler_timeout_secs() -> u64 {
    600
}

/// Download admission settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Selections are refused once the pending queue is deeper than this
    #[serde(default = "default_queue_reject_threshold")]
    pub queue_reject_threshold: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_reject_threshold: default_queue_reject_threshold(),
        }
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_queue_reject_threshold() -> usize {
    5
}

/// Selection cache bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl SelectionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_entries() -> usize {
    1000
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

/// yt-dlp invocation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_info_timeout_secs")]
    pub info_timeout_secs: u64,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_info_retries")]
    pub info_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_max_video_variants")]
    pub max_video_variants: usize,
    #[serde(default = "default_min_video_height")]
    pub min_video_height: u32,
    /// Cookie jar per platform, only used when the file exists at startup
    #[serde(default = "default_cookies")]
    pub cookies: BTreeMap<Platform, PathBuf>,
}

impl ResolverConfig {
    pub fn info_timeout(&self) -> Duration {
        Duration::from_secs(self.info_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            ffmpeg_path: default_ffmpeg_path(),
            info_timeout_secs: default_info_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            info_retries: default_info_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            temp_dir: default_temp_dir(),
            max_video_variants: default_max_video_variants(),
            min_video_height: default_min_video_height(),
            cookies: default_cookies(),
        }
    }
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_info_timeout_secs() -> u64 {
    45
}

fn default_download_timeout_secs() -> u64 {
    120
}

fn default_info_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_max_video_variants() -> usize {
    4
}

fn default_min_video_height() -> u32 {
    240
}

fn default_cookies() -> BTreeMap<Platform, PathBuf> {
    BTreeMap::from([
        (
            Platform::Instagram,
            PathBuf::from("./www.instagram.com_cookies.txt"),
        ),
        (Platform::Tiktok, PathBuf::from("./www.tiktok.com_cookies.txt")),
    ])
}

/// Outbound delivery limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize(2 * 1024 * 1024 * 1024) // 2 GB
}

/// Operator HTTP surface
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4000))
}

/// User directory persistence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/users")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:4000");
        assert_eq!(config.dispatcher.max_concurrent, 3);
        assert_eq!(config.dispatcher.queue_reject_threshold, 5);
        assert_eq!(config.selection.ttl(), Duration::from_secs(1800));
        assert_eq!(config.selection.max_entries, 1000);
        assert_eq!(config.delivery.max_upload_bytes.as_u64(), 2 * 1024 * 1024 * 1024);
        assert_eq!(config.resolver.info_retries, 2);
        assert!(config.resolver.cookies.contains_key(&Platform::Instagram));
        assert!(config.bot.token.is_none());
    }

    #[test]
    fn test_token_is_never_serialized() {
        let mut config = Config::default();
        config.bot.token = Some("secret".to_string());

        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("secret"));
    }
}
