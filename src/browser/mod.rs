//! The browser as an injected capability.
//!
//! The portal automaton only talks to [`BrowserDriver`]; the Chrome DevTools backend lives in
//! [`chrome`], and tests drive a scripted fake.

pub mod chrome;
#[cfg(test)]
pub mod fake;
mod locator;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use chrome::{ChromeBrowser, ChromeLauncher};
pub use locator::{ElementHandle, Locator, Scope};

use crate::session::SessionBlob;

/// Cell texts of one `<table>`, row by row.
pub type TableMatrix = Vec<Vec<String>>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("page script failed: {0}")]
    Script(String),
    #[error("element {0} is no longer attached")]
    Detached(u64),
    #[error("browser session is closed")]
    Closed,
}

/// One browser context serving one lookup.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigates the top-level page and returns the loaded document's markup.
    async fn open(&self, url: &str) -> Result<String, DriverError>;

    /// Searchable documents, main document first.
    async fn scopes(&self) -> Result<Vec<Scope>, DriverError>;

    /// First element in `scope` matching `locator` that becomes visible within `timeout`.
    async fn locate(
        &self,
        scope: Scope,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError>;

    /// Like [`locate`](Self::locate), restricted to the nearest form-like ancestor of `anchor`.
    async fn locate_near(
        &self,
        anchor: &ElementHandle,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError>;

    async fn focus(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Clears the field and types `value` into it.
    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Waits until something matching `locator` is visible in any scope.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool, DriverError>;

    /// Rendered text of the top-level page body.
    async fn text_content(&self) -> Result<String, DriverError>;

    /// Every table on the top-level page as cell-text matrices.
    async fn tables(&self) -> Result<Vec<TableMatrix>, DriverError>;

    /// Current cookies and origin storage, in session-blob form.
    async fn capture_session(&self) -> Result<SessionBlob, DriverError>;

    async fn close(&self);
}

/// Creates a fresh browser context per lookup.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(
        &self,
        session: Option<&SessionBlob>,
        headful: bool,
    ) -> Result<Box<dyn BrowserDriver>, DriverError>;
}
