use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use super::{selectors, LookupError, NavigationAutomaton};
use crate::{
    browser::{BrowserDriver, BrowserLauncher},
    config::PortalConfig,
    infrastructure::cancel::CancelListener,
    session::{SessionStore, SessionSummary},
};

const LOGIN_POLL: Duration = Duration::from_secs(1);

/// Opens a visible browser on the portal, waits for the user to finish signing in, then saves
/// the resulting cookies and origin storage to `store`.
pub async fn capture_login(
    launcher: &dyn BrowserLauncher,
    config: &PortalConfig,
    store: &SessionStore,
    cancel: &mut CancelListener,
) -> Result<SessionSummary, LookupError> {
    let driver = launcher
        .launch(None, true)
        .await
        .map_err(|source| LookupError::Driver {
            stage: "launch",
            source,
        })?;

    let outcome = tokio::select! {
        result = sign_in(driver.as_ref(), config) => result,
        _ = cancel.notified() => Err(LookupError::Cancelled),
    };
    let captured = match outcome {
        Ok(()) => driver
            .capture_session()
            .await
            .map_err(|source| LookupError::Driver {
                stage: "session capture",
                source,
            }),
        Err(err) => Err(err),
    };
    driver.close().await;

    let blob = captured?;
    store.save(&blob)?;
    let summary = blob.summary();
    info!(
        target: "session",
        cookies = summary.cookie_count,
        domains = summary.domains.len(),
        location = %store.location(),
        "login captured"
    );
    Ok(summary)
}

async fn sign_in(driver: &dyn BrowserDriver, config: &PortalConfig) -> Result<(), LookupError> {
    NavigationAutomaton::new(driver, config).open().await?;
    info!(target: "session", "complete the login in the browser window");

    let deadline = Instant::now() + config.login_timeout;
    loop {
        let body = driver.text_content().await.unwrap_or_default();
        if !body.contains(selectors::LOGIN_MARKER) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(LookupError::LoginTimeout {
                elapsed: config.login_timeout,
            });
        }
        tokio::time::sleep(LOGIN_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        browser::fake::{FakeLauncher, ScriptedBrowser},
        infrastructure::cancel::CancelSignal,
        session::SessionBlob,
    };

    fn config() -> PortalConfig {
        PortalConfig {
            roots: vec!["https://portal.test/od".into()],
            ..PortalConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn signed_in_page_is_captured_and_saved() {
        let blob = SessionBlob::parse(
            r#"{"cookies":[{"name":"SESSION","value":"x","domain":".cnipa.gov.cn"}],"origins":[]}"#,
        )
        .unwrap();
        let browser = ScriptedBrowser::new()
            .page("https://portal.test/od", Some("<html></html>"))
            .body("欢迎 退出", "")
            .captures(blob.clone());
        let launcher = FakeLauncher::new(browser.clone());
        let store = SessionStore::in_memory(None);
        let (_signal, mut cancel) = CancelSignal::new();

        let summary = capture_login(&launcher, &config(), &store, &mut cancel)
            .await
            .unwrap();
        assert_eq!(summary.cookie_count, 1);
        assert_eq!(store.load().unwrap(), blob);
        assert_eq!(launcher.launches(), vec![(false, true)]);
        assert!(browser.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn login_prompt_that_never_clears_times_out() {
        let browser = ScriptedBrowser::new()
            .page("https://portal.test/od", Some("<html></html>"))
            .body("请登录", "");
        let launcher = FakeLauncher::new(browser.clone());
        let store = SessionStore::in_memory(None);
        let (_signal, mut cancel) = CancelSignal::new();

        let err = capture_login(&launcher, &config(), &store, &mut cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::LoginTimeout { .. }));
        assert!(!store.exists());
        assert!(browser.closed());
    }
}
