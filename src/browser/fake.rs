//! Scripted in-memory browser for exercising the portal automaton.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{
    BrowserDriver, BrowserLauncher, DriverError, ElementHandle, Locator, Scope, TableMatrix,
};
use crate::session::SessionBlob;

/// What happens when an element is clicked or receives Enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Submit,
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    id: u64,
    scope: Scope,
    matches: Vec<Locator>,
    appears_after: Duration,
    after_submit: bool,
    form: Option<u32>,
    on_click: Effect,
    on_enter: Effect,
}

impl FakeElement {
    pub fn new(scope: Scope, locator: Locator) -> Self {
        Self {
            id: 0,
            scope,
            matches: vec![locator],
            appears_after: Duration::ZERO,
            after_submit: false,
            form: None,
            on_click: Effect::None,
            on_enter: Effect::None,
        }
    }

    pub fn also(mut self, locator: Locator) -> Self {
        self.matches.push(locator);
        self
    }

    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn after_submit(mut self) -> Self {
        self.after_submit = true;
        self
    }

    pub fn in_form(mut self, form: u32) -> Self {
        self.form = Some(form);
        self
    }

    pub fn submits_on_click(mut self) -> Self {
        self.on_click = Effect::Submit;
        self
    }

    pub fn submits_on_enter(mut self) -> Self {
        self.on_enter = Effect::Submit;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    pages: HashMap<String, Option<String>>,
    frames: usize,
    elements: Vec<FakeElement>,
    body_before: String,
    body_after: String,
    tables_after: Vec<TableMatrix>,
    captured: Option<SessionBlob>,
    fail_fill: bool,
    fail_click: bool,
    submitted: bool,
    closed: bool,
    events: Vec<String>,
    text_reads: usize,
}

/// Cloneable handle: every clone shares the same script and event log.
#[derive(Clone)]
pub struct ScriptedBrowser {
    state: Arc<Mutex<State>>,
    started: Instant,
}

impl Default for ScriptedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            started: Instant::now(),
        }
    }

    /// `None` makes navigation to `url` fail.
    pub fn page(self, url: &str, html: Option<&str>) -> Self {
        self.state
            .lock()
            .pages
            .insert(url.to_string(), html.map(str::to_string));
        self
    }

    pub fn frames(self, count: usize) -> Self {
        self.state.lock().frames = count;
        self
    }

    pub fn element(self, mut element: FakeElement) -> Self {
        {
            let mut state = self.state.lock();
            element.id = state.elements.len() as u64 + 1;
            state.elements.push(element);
        }
        self
    }

    pub fn body(self, before: &str, after: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.body_before = before.to_string();
            state.body_after = after.to_string();
        }
        self
    }

    pub fn tables_after(self, tables: Vec<TableMatrix>) -> Self {
        self.state.lock().tables_after = tables;
        self
    }

    pub fn captures(self, blob: SessionBlob) -> Self {
        self.state.lock().captured = Some(blob);
        self
    }

    pub fn failing_fill(self) -> Self {
        self.state.lock().fail_fill = true;
        self
    }

    pub fn failing_click(self) -> Self {
        self.state.lock().fail_click = true;
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    pub fn submitted(&self) -> bool {
        self.state.lock().submitted
    }

    pub fn closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn text_reads(&self) -> usize {
        self.state.lock().text_reads
    }

    fn log(&self, event: String) {
        self.state.lock().events.push(event);
    }

    /// Earliest moment a matching element is visible, if it ever is under the current state.
    fn visible_at(&self, filter: impl Fn(&FakeElement) -> bool) -> Option<(Instant, FakeElement)> {
        let state = self.state.lock();
        state
            .elements
            .iter()
            .filter(|el| filter(el) && (!el.after_submit || state.submitted))
            .map(|el| (self.started + el.appears_after, el.clone()))
            .min_by_key(|(at, el)| (*at, el.id))
    }

    async fn wait_visible(
        &self,
        timeout: Duration,
        filter: impl Fn(&FakeElement) -> bool,
    ) -> Option<FakeElement> {
        let deadline = Instant::now() + timeout;
        match self.visible_at(filter) {
            Some((at, element)) if at <= deadline => {
                tokio::time::sleep_until(at).await;
                Some(element)
            }
            _ => {
                tokio::time::sleep_until(deadline).await;
                None
            }
        }
    }

    fn element_by_id(&self, id: u64) -> Result<FakeElement, DriverError> {
        self.state
            .lock()
            .elements
            .iter()
            .find(|el| el.id == id)
            .cloned()
            .ok_or(DriverError::Detached(id))
    }

    fn apply(&self, effect: Effect) {
        if effect == Effect::Submit {
            self.state.lock().submitted = true;
        }
    }
}

#[async_trait]
impl BrowserDriver for ScriptedBrowser {
    async fn open(&self, url: &str) -> Result<String, DriverError> {
        self.log(format!("open {url}"));
        let page = self.state.lock().pages.get(url).cloned();
        match page {
            Some(Some(html)) => Ok(html),
            _ => Err(DriverError::Navigation {
                url: url.to_string(),
                reason: "unreachable".into(),
            }),
        }
    }

    async fn scopes(&self) -> Result<Vec<Scope>, DriverError> {
        let frames = self.state.lock().frames;
        Ok((0..=frames).map(Scope).collect())
    }

    async fn locate(
        &self,
        scope: Scope,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let found = self
            .wait_visible(timeout, |el| el.scope == scope && el.matches.contains(locator))
            .await;
        Ok(found.map(|el| ElementHandle { scope, id: el.id }))
    }

    async fn locate_near(
        &self,
        anchor: &ElementHandle,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let Some(form) = self.element_by_id(anchor.id)?.form else {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        };
        let found = self
            .wait_visible(timeout, |el| {
                el.scope == anchor.scope && el.form == Some(form) && el.matches.contains(locator)
            })
            .await;
        Ok(found.map(|el| ElementHandle {
            scope: anchor.scope,
            id: el.id,
        }))
    }

    async fn focus(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.element_by_id(element.id)?;
        self.log(format!("focus #{}", element.id));
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.element_by_id(element.id)?;
        if self.state.lock().fail_fill {
            return Err(DriverError::Detached(element.id));
        }
        self.log(format!("fill #{} {value}", element.id));
        Ok(())
    }

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let target = self.element_by_id(element.id)?;
        self.log(format!("enter #{}", element.id));
        self.apply(target.on_enter);
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let target = self.element_by_id(element.id)?;
        if self.state.lock().fail_click {
            return Err(DriverError::Script("click intercepted".into()));
        }
        self.log(format!("click #{}", element.id));
        self.apply(target.on_click);
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool, DriverError> {
        Ok(self
            .wait_visible(timeout, |el| el.matches.contains(locator))
            .await
            .is_some())
    }

    async fn text_content(&self) -> Result<String, DriverError> {
        let mut state = self.state.lock();
        state.text_reads += 1;
        Ok(if state.submitted {
            state.body_after.clone()
        } else {
            state.body_before.clone()
        })
    }

    async fn tables(&self) -> Result<Vec<TableMatrix>, DriverError> {
        let state = self.state.lock();
        Ok(if state.submitted {
            state.tables_after.clone()
        } else {
            Vec::new()
        })
    }

    async fn capture_session(&self) -> Result<SessionBlob, DriverError> {
        self.state
            .lock()
            .captured
            .clone()
            .ok_or_else(|| DriverError::Script("nothing to capture".into()))
    }

    async fn close(&self) {
        self.log("close".into());
        self.state.lock().closed = true;
    }
}

/// Hands out clones of one scripted browser and remembers how it was launched.
pub struct FakeLauncher {
    browser: ScriptedBrowser,
    fail: bool,
    launches: Mutex<Vec<(bool, bool)>>,
}

impl FakeLauncher {
    pub fn new(browser: ScriptedBrowser) -> Self {
        Self {
            browser,
            fail: false,
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(ScriptedBrowser::new())
        }
    }

    /// `(had_session, headful)` per launch.
    pub fn launches(&self) -> Vec<(bool, bool)> {
        self.launches.lock().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(
        &self,
        session: Option<&SessionBlob>,
        headful: bool,
    ) -> Result<Box<dyn BrowserDriver>, DriverError> {
        self.launches.lock().push((session.is_some(), headful));
        if self.fail {
            return Err(DriverError::Launch("no browser available".into()));
        }
        Ok(Box::new(self.browser.clone()))
    }
}
