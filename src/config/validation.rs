use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("dispatcher.max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error("selection.max_entries must be at least 1")]
    ZeroCacheCapacity,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("resolver.max_video_variants must be between 1 and {max}, got {got}")]
    VariantCapOutOfRange { got: usize, max: usize },

    #[error("resolver.info_retries must be at most {max}, got {got}")]
    TooManyRetries { got: u32, max: u32 },

    #[error("resolver.ytdlp_path must not be empty")]
    EmptyToolPath,

    #[error("bot.api_root must be an http(s) url, got '{0}'")]
    InvalidApiRoot(String),
}

/// Inline keyboards beyond this many rows get cramped on phones
pub const MAX_VIDEO_VARIANTS: usize = 6;

pub const MAX_INFO_RETRIES: u32 = 10;

/// Validate configuration after loading
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.dispatcher.max_concurrent == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }

    if config.selection.max_entries == 0 {
        return Err(ValidationError::ZeroCacheCapacity);
    }

    let durations = [
        ("selection.ttl_secs", config.selection.ttl_secs),
        ("selection.sweep_interval_secs", config.selection.sweep_interval_secs),
        ("resolver.info_timeout_secs", config.resolver.info_timeout_secs),
        ("resolver.download_timeout_secs", config.resolver.download_timeout_secs),
        ("bot.handler_timeout_secs", config.bot.handler_timeout_secs),
    ];
    for (name, value) in durations {
        if value == 0 {
            return Err(ValidationError::ZeroDuration(name));
        }
    }

    let variants = config.resolver.max_video_variants;
    if !(1..=MAX_VIDEO_VARIANTS).contains(&variants) {
        return Err(ValidationError::VariantCapOutOfRange {
            got: variants,
            max: MAX_VIDEO_VARIANTS,
        });
    }

    let retries = config.resolver.info_retries;
    if retries > MAX_INFO_RETRIES {
        return Err(ValidationError::TooManyRetries {
            got: retries,
            max: MAX_INFO_RETRIES,
        });
    }

    if config.resolver.ytdlp_path.trim().is_empty() {
        return Err(ValidationError::EmptyToolPath);
    }

    let api_root = &config.bot.api_root;
    if !(api_root.starts_with("http://") || api_root.starts_with("https://")) {
        return Err(ValidationError::InvalidApiRoot(api_root.clone()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.dispatcher.max_concurrent = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroConcurrency)
        ));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = Config::default();
        config.selection.ttl_secs = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroDuration("selection.ttl_secs"))
        ));
    }

    #[test]
    fn test_variant_cap_bounds() {
        let mut config = Config::default();
        config.resolver.max_video_variants = 7;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::VariantCapOutOfRange { got: 7, .. })
        ));

        config.resolver.max_video_variants = 6;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_retry_count_is_bounded() {
        let mut config = Config::default();
        config.resolver.info_retries = 32;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::TooManyRetries { got: 32, .. })
        ));

        config.resolver.info_retries = MAX_INFO_RETRIES;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_api_root_must_be_http() {
        let mut config = Config::default();
        config.bot.api_root = "api.telegram.org".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidApiRoot(_))
        ));
    }
}
