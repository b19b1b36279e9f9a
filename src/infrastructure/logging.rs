use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{config::AppConfig, infrastructure::directories::ResolvedPaths};

const LOG_FILE: &str = "fee-watch.log";

/// Crates whose chatter drowns out lookups at `debug`; capped unless RUST_LOG says otherwise.
const NOISY_TARGETS: [&str; 4] = ["chromiumoxide", "tungstenite", "hyper", "reqwest"];

static APPENDER_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// RUST_LOG wins outright; otherwise `level` (or `info` when it does not parse) with the
/// browser and HTTP stacks held at `warn`.
fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let base = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    NOISY_TARGETS.iter().fold(base, |filter, target| {
        match format!("{target}=warn").parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    })
}

/// Console layer on stderr (stdout carries command output) plus a daily file under the logs
/// directory. Calling it again is a no-op.
pub fn init_tracing(config: &AppConfig, paths: &ResolvedPaths) -> Result<()> {
    if APPENDER_GUARD.get().is_some() {
        return Ok(());
    }

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(&paths.logs_dir, LOG_FILE));
    if APPENDER_GUARD.set(guard).is_err() {
        return Ok(());
    }

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_ansi(io::stderr().is_terminal());
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(build_filter(&config.logging.level))
        .with(console)
        .with(file)
        .try_init()
        .context("installing the tracing subscriber")?;

    tracing::debug!(
        target: "app",
        logs = %paths.logs_dir.join(LOG_FILE).display(),
        "tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_keeps_browser_stack_quiet() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let rendered = build_filter("debug").to_string();
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("chromiumoxide=warn"));
        assert!(rendered.contains("hyper=warn"));
    }

    #[test]
    fn unparseable_level_falls_back_to_info() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let rendered = build_filter("very=loud=please").to_string();
        assert!(rendered.contains("info"));
    }
}
