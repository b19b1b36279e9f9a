use std::{path::PathBuf, time::Duration};

use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub portal: PortalConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub timezone: Tz,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub app_key: String,
    pub app_secret: String,
    pub url: String,
    pub timeout: Duration,
    pub sort_field: String,
    pub sort: String,
    pub level: String,
    pub source: u32,
}

/// Timing and entry points for the fee-query portal.
///
/// Every wait the automaton performs is bounded by one of these values.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub roots: Vec<String>,
    pub headful: bool,
    pub chrome_executable: Option<PathBuf>,
    pub navigation_timeout: Duration,
    pub menu_probe: Duration,
    pub menu_settle: Duration,
    pub form_deadline: Duration,
    pub form_probe: Duration,
    pub form_poll_interval: Duration,
    pub result_timeout: Duration,
    pub no_data_timeout: Duration,
    pub extraction_retry_delay: Duration,
    pub login_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub session_filename: String,
    pub monitor_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

pub const DEFAULT_SEARCH_URL: &str = "http://open.baiten.cn/router/openService/search";

pub const DEFAULT_PORTAL_ROOTS: [&str; 3] = [
    "https://interactive.cponline.cnipa.gov.cn/od/public/index",
    "https://interactive.cponline.cnipa.gov.cn/od/public",
    "https://interactive.cponline.cnipa.gov.cn/od",
];

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            roots: DEFAULT_PORTAL_ROOTS.iter().map(|r| r.to_string()).collect(),
            headful: false,
            chrome_executable: None,
            navigation_timeout: Duration::from_secs(45),
            menu_probe: Duration::from_millis(1_200),
            menu_settle: Duration::from_millis(600),
            form_deadline: Duration::from_secs(20),
            form_probe: Duration::from_millis(250),
            form_poll_interval: Duration::from_millis(350),
            result_timeout: Duration::from_secs(20),
            no_data_timeout: Duration::from_secs(5),
            extraction_retry_delay: Duration::from_secs(2),
            login_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid time zone in {key}: {value}")]
    InvalidTimezone { key: &'static str, value: String },
    #[error("{key} must hold http(s) URLs, got {value}")]
    InvalidUrl { key: &'static str, value: String },
}
