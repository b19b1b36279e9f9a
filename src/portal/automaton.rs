use std::{fmt, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{selectors, LookupError};
use crate::{
    browser::{BrowserDriver, ElementHandle, Locator, Scope},
    config::PortalConfig,
    domain::FeeRecord,
    extraction::{DriverPage, ExtractionEngine, Tier},
    fallback::first_success,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    Unopened,
    Opened,
    MenuResolved,
    FormResolved,
    Submitted,
    ResultReady,
    Failed,
}

/// Menu level that could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavStage {
    PaymentMenu,
    FeeQueryMenu,
}

impl fmt::Display for NavStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavStage::PaymentMenu => f.write_str("payment service menu (缴费服务)"),
            NavStage::FeeQueryMenu => f.write_str("fee query menu (费用查询)"),
        }
    }
}

/// How the wait after submission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSignal {
    Table,
    NoData,
    /// Neither marker showed up in time; extraction still runs.
    Silent,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryForm {
    pub scope: Scope,
    pub input: ElementHandle,
    pub button: Option<ElementHandle>,
}

/// Drives one browser context from the portal entry page to an extracted result page.
///
/// Steps run strictly in order; the first unrecoverable step leaves the machine in
/// [`LookupState::Failed`].
pub struct NavigationAutomaton<'a> {
    driver: &'a dyn BrowserDriver,
    config: &'a PortalConfig,
    state: LookupState,
}

impl<'a> NavigationAutomaton<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, config: &'a PortalConfig) -> Self {
        Self {
            driver,
            config,
            state: LookupState::Unopened,
        }
    }

    pub fn state(&self) -> LookupState {
        self.state
    }

    pub async fn run(
        &mut self,
        query: &str,
        engine: &ExtractionEngine,
    ) -> Result<Vec<FeeRecord>, LookupError> {
        self.open().await?;
        self.check_session().await?;
        self.dismiss_notices().await;
        self.navigate().await?;
        let form = self.resolve_form().await?;
        self.submit(&form, query).await?;
        self.await_result().await;
        Ok(self.extract(engine).await)
    }

    fn fail(&mut self, err: LookupError) -> LookupError {
        warn!(target: "portal", state = ?self.state, error = %err, "lookup stage failed");
        self.state = LookupState::Failed;
        err
    }

    /// Unopened → Opened: first root whose document is HTML.
    pub async fn open(&mut self) -> Result<(), LookupError> {
        let mut attempts = Vec::new();
        for root in &self.config.roots {
            match self.driver.open(root).await {
                Ok(html) if html.to_ascii_lowercase().contains("<html") => {
                    info!(target: "portal", url = %root, "entry page opened");
                    self.state = LookupState::Opened;
                    return Ok(());
                }
                Ok(_) => {
                    debug!(target: "portal", url = %root, "entry returned a non-HTML document");
                    attempts.push(format!("{root}: not an HTML document"));
                }
                Err(err) => {
                    debug!(target: "portal", url = %root, error = %err, "entry failed to load");
                    attempts.push(format!("{root}: {err}"));
                }
            }
        }
        Err(self.fail(LookupError::EntryUnreachable { attempts }))
    }

    /// Runs once after the entry page loads.
    pub async fn check_session(&mut self) -> Result<(), LookupError> {
        let body = match self.driver.text_content().await {
            Ok(body) => body,
            Err(source) => {
                return Err(self.fail(LookupError::Driver {
                    stage: "session check",
                    source,
                }))
            }
        };
        if selectors::shows_login_prompt(&body) {
            return Err(self.fail(LookupError::SessionExpired));
        }
        Ok(())
    }

    /// Clicks away notice dialogs on the main document. Nothing here is fatal.
    pub async fn dismiss_notices(&mut self) {
        for locator in selectors::dismiss_controls() {
            if let Some(handle) = self
                .try_click(Scope::MAIN, &locator, self.config.form_probe)
                .await
            {
                debug!(target: "portal", control = %locator, id = handle.id, "dismissed notice");
            }
        }
    }

    /// Opened → MenuResolved.
    pub async fn navigate(&mut self) -> Result<(), LookupError> {
        let probe = self.config.menu_probe;
        if self
            .click_anywhere("payment menu", &selectors::payment_menu(), probe)
            .await
            .is_none()
        {
            return Err(self.fail(LookupError::NavigationTargetNotFound {
                stage: NavStage::PaymentMenu,
            }));
        }
        tokio::time::sleep(self.config.menu_settle).await;

        if self
            .click_anywhere("fee query menu", &selectors::fee_query_menu(), probe)
            .await
            .is_none()
        {
            return Err(self.fail(LookupError::NavigationTargetNotFound {
                stage: NavStage::FeeQueryMenu,
            }));
        }

        let tab_visible = self
            .driver
            .wait_for(&Locator::text(selectors::DUE_TAB_TEXT), probe)
            .await
            .unwrap_or(false);
        if tab_visible
            && self
                .click_anywhere("due-fee tab", &selectors::due_tab(), probe)
                .await
                .is_none()
        {
            debug!(target: "portal", "due-fee tab visible but not clickable; continuing");
        }

        self.state = LookupState::MenuResolved;
        Ok(())
    }

    /// MenuResolved → FormResolved: polls every scope for the query input until the deadline.
    pub async fn resolve_form(&mut self) -> Result<QueryForm, LookupError> {
        let deadline = Instant::now() + self.config.form_deadline;
        let mut cycle = 0u32;
        while Instant::now() < deadline {
            cycle += 1;
            let scopes = self.driver.scopes().await.unwrap_or_else(|err| {
                debug!(target: "portal", error = %err, "scope listing failed; using main document");
                vec![Scope::MAIN]
            });
            for scope in scopes {
                if let Some(form) = self.form_in(scope).await {
                    info!(
                        target: "portal",
                        scope = %scope,
                        cycle,
                        has_button = form.button.is_some(),
                        "query form located"
                    );
                    self.state = LookupState::FormResolved;
                    return Ok(form);
                }
            }
            tokio::time::sleep(self.config.form_poll_interval).await;
        }
        Err(self.fail(LookupError::FormTimeout {
            elapsed: self.config.form_deadline,
        }))
    }

    async fn form_in(&self, scope: Scope) -> Option<QueryForm> {
        let probe = self.config.form_probe;
        let inputs = selectors::query_inputs();
        let input = first_success(
            inputs.iter(),
            |locator| self.find(scope, *locator, probe),
            Option::is_some,
        )
        .await
        .into_winner()
        .and_then(|(_, hit)| hit)?;

        let near = self
            .driver
            .locate_near(&input, &selectors::nearby_query_button(), probe)
            .await
            .unwrap_or(None);
        let button = match near {
            Some(button) => Some(button),
            None => {
                let buttons = selectors::query_buttons();
                first_success(
                    buttons.iter(),
                    |locator| self.find(scope, *locator, probe),
                    Option::is_some,
                )
                .await
                .into_winner()
                .and_then(|(_, hit)| hit)
            }
        };
        Some(QueryForm {
            scope,
            input,
            button,
        })
    }

    /// FormResolved → Submitted. Only a failed fill is fatal; the keystroke and the click are
    /// both attempted and their errors dropped.
    pub async fn submit(&mut self, form: &QueryForm, query: &str) -> Result<(), LookupError> {
        if let Err(err) = self.driver.focus(&form.input).await {
            debug!(target: "portal", error = %err, "focusing query input failed");
        }
        if let Err(source) = self.driver.fill(&form.input, query).await {
            return Err(self.fail(LookupError::Driver {
                stage: "submit",
                source,
            }));
        }
        if let Err(err) = self.driver.press_enter(&form.input).await {
            debug!(target: "portal", error = %err, "enter keystroke failed");
        }
        if let Some(button) = &form.button {
            if let Err(err) = self.driver.click(button).await {
                debug!(target: "portal", error = %err, "query button click failed");
            }
        }
        info!(target: "portal", query, "query submitted");
        self.state = LookupState::Submitted;
        Ok(())
    }

    /// Submitted → ResultReady. Whichever marker shows first wins; running out of time on both
    /// is tolerated.
    pub async fn await_result(&mut self) -> ResultSignal {
        let table = selectors::result_marker();
        let no_data = selectors::no_data_marker();
        let signal = tokio::select! {
            biased;
            true = self.wait(&table, self.config.result_timeout) => ResultSignal::Table,
            true = self.wait(&no_data, self.config.no_data_timeout) => ResultSignal::NoData,
            else => ResultSignal::Silent,
        };
        debug!(target: "portal", signal = ?signal, "result wait finished");
        self.state = LookupState::ResultReady;
        signal
    }

    /// Extracts from the result page, once more after a short pause if nothing came back.
    pub async fn extract(&mut self, engine: &ExtractionEngine) -> Vec<FeeRecord> {
        let page = DriverPage(self.driver);
        let first = engine.extract(&page).await;
        if first.tier != Tier::Empty {
            return first.records;
        }
        tokio::time::sleep(self.config.extraction_retry_delay).await;
        let second = engine.extract(&page).await;
        debug!(target: "portal", tier = ?second.tier, count = second.records.len(), "retried extraction");
        second.records
    }

    async fn wait(&self, locator: &Locator, timeout: Duration) -> bool {
        self.driver
            .wait_for(locator, timeout)
            .await
            .unwrap_or_else(|err| {
                debug!(target: "portal", marker = %locator, error = %err, "marker wait failed");
                false
            })
    }

    async fn find(&self, scope: Scope, locator: &Locator, timeout: Duration) -> Option<ElementHandle> {
        match self.driver.locate(scope, locator, timeout).await {
            Ok(hit) => {
                debug!(target: "portal", scope = %scope, locator = %locator, hit = hit.is_some(), "probe");
                hit
            }
            Err(err) => {
                debug!(target: "portal", scope = %scope, locator = %locator, error = %err, "probe failed");
                None
            }
        }
    }

    async fn try_click(&self, scope: Scope, locator: &Locator, timeout: Duration) -> Option<ElementHandle> {
        let handle = self.find(scope, locator, timeout).await?;
        match self.driver.click(&handle).await {
            Ok(()) => Some(handle),
            Err(err) => {
                debug!(target: "portal", locator = %locator, error = %err, "click failed");
                None
            }
        }
    }

    async fn click_in(&self, scope: Scope, candidates: &[Locator], timeout: Duration) -> Option<ElementHandle> {
        first_success(
            candidates.iter(),
            |locator| self.try_click(scope, *locator, timeout),
            Option::is_some,
        )
        .await
        .into_winner()
        .and_then(|(_, hit)| hit)
    }

    /// Tries every candidate in the main document, then in each frame.
    async fn click_anywhere(
        &self,
        target: &str,
        candidates: &[Locator],
        timeout: Duration,
    ) -> Option<(Scope, ElementHandle)> {
        let scopes = self.driver.scopes().await.unwrap_or_else(|_| vec![Scope::MAIN]);
        let chain = first_success(
            scopes,
            |scope| self.click_in(*scope, candidates, timeout),
            Option::is_some,
        )
        .await;
        match chain.into_winner() {
            Some((scope, Some(handle))) => {
                info!(target: "portal", target_name = target, scope = %scope, "menu target clicked");
                Some((scope, handle))
            }
            _ => {
                debug!(target: "portal", target_name = target, "menu target not found in any scope");
                None
            }
        }
    }
}
