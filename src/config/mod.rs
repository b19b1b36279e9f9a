pub mod env;
mod loader;

pub use env::{AppConfig, ConfigError, DirectoryConfig, LoggingConfig, PortalConfig, SearchConfig};
pub use loader::load_config;
