use std::{env, path::PathBuf, time::Duration};

use chrono_tz::Tz;
use url::Url;

use super::env::{
    AppConfig, ConfigError, DirectoryConfig, LoggingConfig, PortalConfig, SearchConfig,
    DEFAULT_SEARCH_URL,
};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let search = SearchConfig {
            app_key: env::var("BAITEN_APP_KEY").unwrap_or_default(),
            app_secret: env::var("BAITEN_APP_SECRET").unwrap_or_default(),
            url: env::var("BAITEN_SEARCH_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            timeout: parse_millis("SEARCH_TIMEOUT").unwrap_or(Duration::from_secs(15)),
            sort_field: env::var("SEARCH_SORT_FIELD").unwrap_or_else(|_| "ad_sort".to_string()),
            sort: env::var("SEARCH_SORT").unwrap_or_else(|_| "desc".to_string()),
            level: env::var("SEARCH_LEVEL").unwrap_or_else(|_| "TWO".to_string()),
            source: env::var("SEARCH_SOURCE")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(63),
        };

        validate_url("BAITEN_SEARCH_URL", &search.url)?;

        let defaults = PortalConfig::default();
        let portal = PortalConfig {
            roots: env::var("PORTAL_ROOTS")
                .map(|value| {
                    value
                        .split(';')
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect::<Vec<_>>()
                })
                .ok()
                .filter(|roots| !roots.is_empty())
                .unwrap_or(defaults.roots.clone()),
            headful: parse_bool("PORTAL_HEADFUL").unwrap_or(false),
            chrome_executable: env::var("CHROME_EXECUTABLE")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            navigation_timeout: parse_millis("PORTAL_NAV_TIMEOUT")
                .unwrap_or(defaults.navigation_timeout),
            form_deadline: parse_millis("PORTAL_FORM_DEADLINE").unwrap_or(defaults.form_deadline),
            result_timeout: parse_millis("PORTAL_RESULT_TIMEOUT")
                .unwrap_or(defaults.result_timeout),
            ..defaults
        };

        for root in &portal.roots {
            validate_url("PORTAL_ROOTS", root)?;
        }

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            session_filename: env::var("SESSION_FILENAME")
                .unwrap_or_else(|_| "state.json".to_string()),
            monitor_filename: env::var("MONITOR_FILENAME")
                .unwrap_or_else(|_| "fee_monitor_data.json".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let raw_tz = env::var("FEE_TIMEZONE").unwrap_or_else(|_| "Asia/Shanghai".to_string());
        let timezone: Tz = raw_tz.parse().map_err(|_| ConfigError::InvalidTimezone {
            key: "FEE_TIMEZONE",
            value: raw_tz.clone(),
        })?;

        Ok(Self {
            search,
            portal,
            directories,
            logging,
            timezone,
        })
    }
}

fn validate_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn parse_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("1") || v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_urls_pass_validation() {
        assert!(validate_url("PORTAL_ROOTS", "https://interactive.cponline.cnipa.gov.cn/od").is_ok());
        assert!(matches!(
            validate_url("PORTAL_ROOTS", "ftp://example.com"),
            Err(ConfigError::InvalidUrl { key: "PORTAL_ROOTS", .. })
        ));
        assert!(validate_url("BAITEN_SEARCH_URL", "not a url").is_err());
    }

    #[test]
    fn default_portal_roots_are_valid() {
        for root in PortalConfig::default().roots {
            assert!(validate_url("PORTAL_ROOTS", &root).is_ok(), "{root}");
        }
    }
}
