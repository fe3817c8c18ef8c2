//! Configuration validation
//!
//! Validation runs after parsing and before anything is launched, so a
//! bad config fails fast with a message naming the offending field.

use crate::config::types::Config;
use crate::ConfigError;

/// Validates a parsed configuration
///
/// # Returns
///
/// * `Ok(())` - Configuration is usable
/// * `Err(ConfigError::Validation)` - A field is out of range or missing
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.collector.pool_size < 1 {
        return Err(ConfigError::Validation(
            "collector.pool-size must be at least 1".to_string(),
        ));
    }

    if config.collector.page_list.trim().is_empty() {
        return Err(ConfigError::Validation(
            "collector.page-list must not be empty".to_string(),
        ));
    }

    if config.collector.interval_minutes < 1 {
        return Err(ConfigError::Validation(
            "collector.interval-minutes must be at least 1".to_string(),
        ));
    }

    if config.browser.variants.is_empty() {
        return Err(ConfigError::Validation(
            "browser.variants must name at least one variant".to_string(),
        ));
    }

    if config.browser.page_timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "browser.page-timeout-seconds must be at least 1".to_string(),
        ));
    }

    if config.browser.settle_wait_seconds >= config.browser.page_timeout_seconds {
        return Err(ConfigError::Validation(format!(
            "browser.settle-wait-seconds ({}) must be below page-timeout-seconds ({})",
            config.browser.settle_wait_seconds, config.browser.page_timeout_seconds
        )));
    }

    if config.output.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output.database-path must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserVariant;
    use crate::config::types::{BrowserSettings, CollectorConfig, OutputConfig};

    fn valid_config() -> Config {
        Config {
            collector: CollectorConfig {
                pool_size: 4,
                page_list: "./pages.txt".to_string(),
                timeseries: false,
                interval_minutes: 1440,
            },
            browser: BrowserSettings {
                variants: vec![BrowserVariant::Chrome],
                settle_wait_seconds: 15,
                page_timeout_seconds: 60,
                dnt: false,
                chrome_binary: None,
                allow_insecure: false,
            },
            output: OutputConfig {
                database_path: "./webtrace.db".to_string(),
            },
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn rejects_zero_pool_size() {
        let mut config = valid_config();
        config.collector.pool_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_empty_page_list_path() {
        let mut config = valid_config();
        config.collector.page_list = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_empty_variant_list() {
        let mut config = valid_config();
        config.browser.variants.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_settle_wait_at_or_above_timeout() {
        let mut config = valid_config();
        config.browser.settle_wait_seconds = 60;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = valid_config();
        config.collector.interval_minutes = 0;
        assert!(validate(&config).is_err());
    }
}
