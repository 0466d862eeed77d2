use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "MEDIAGRAB_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mediagrab.toml";
const ENV_PREFIX: &str = "MEDIAGRAB";
const ENV_SEPARATOR: &str = "__";
const TOKEN_ENV_VAR: &str = "BOT_TOKEN";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    if config.bot.token.is_none() {
        if let Ok(token) = env::var(TOKEN_ENV_VAR) {
            let token = token.trim().to_string();
            if !token.is_empty() {
                config.bot.token = Some(token);
            }
        }
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // MEDIAGRAB__DISPATCHER__MAX_CONCURRENT -> dispatcher.max_concurrent
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Platform;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.dispatcher.max_concurrent, 3);
        assert_eq!(config.selection.max_entries, 1000);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[bot]
username = "@test_bot"

[dispatcher]
max_concurrent = 5
queue_reject_threshold = 10

[selection]
ttl_secs = 600
max_entries = 50

[resolver]
ytdlp_path = "/usr/local/bin/yt-dlp"
temp_dir = "/var/tmp/mediagrab"

[resolver.cookies]
youtube = "/etc/mediagrab/youtube.txt"

[delivery]
max_upload_bytes = "50MB"

[server]
bind_addr = "127.0.0.1:9000"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.bot.username, "@test_bot");
        assert_eq!(config.dispatcher.max_concurrent, 5);
        assert_eq!(config.dispatcher.queue_reject_threshold, 10);
        assert_eq!(config.selection.ttl_secs, 600);
        assert_eq!(config.selection.max_entries, 50);
        assert_eq!(config.resolver.ytdlp_path, "/usr/local/bin/yt-dlp");
        assert_eq!(
            config.resolver.cookies[&Platform::Youtube],
            PathBuf::from("/etc/mediagrab/youtube.txt")
        );
        assert_eq!(config.delivery.max_upload_bytes.as_u64(), 50 * 1024 * 1024);
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        // untouched sections keep their defaults
        assert_eq!(config.resolver.info_retries, 2);
    }
}
