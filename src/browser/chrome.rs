//! Chrome DevTools backend for [`BrowserDriver`].
//!
//! Element lookup runs as page script over the top-level document and every same-origin frame,
//! tagging hits with a numeric handle attribute that later calls address.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chromiumoxide::{
    cdp::browser_protocol::network::CookieParam, Browser, BrowserConfig, Page,
};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use super::{
    BrowserDriver, BrowserLauncher, DriverError, ElementHandle, Locator, Scope, TableMatrix,
};
use crate::{config::PortalConfig, session::SessionBlob};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
const HANDLE_ATTR: &str = "data-fee-watch-handle";
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Shared page-side helpers. `__fw` is rebuilt per evaluation so navigation never leaves it stale.
const PRELUDE: &str = r#"
const __fw = (() => {
  const docs = () => {
    const out = [document];
    for (const f of document.querySelectorAll('iframe, frame')) {
      try { if (f.contentDocument) out.push(f.contentDocument); } catch (e) {}
    }
    return out;
  };
  const visible = (el) => {
    if (!el || !el.isConnected) return false;
    const view = el.ownerDocument.defaultView;
    const style = view ? view.getComputedStyle(el) : null;
    if (style && (style.visibility === 'hidden' || style.display === 'none')) return false;
    return el.getClientRects().length > 0;
  };
  const text = (el) => ((el.innerText !== undefined ? el.innerText : el.textContent) || '').trim();
  const smallest = (root, test) => {
    const hits = Array.from(root.querySelectorAll('body *')).filter((el) => test(text(el)));
    return hits.filter((el) => !hits.some((other) => other !== el && el.contains(other)));
  };
  const roleSelectors = {
    button: 'button, [role="button"], input[type="button"], input[type="submit"]',
    link: 'a, [role="link"]',
    tab: '[role="tab"]',
    textbox: 'input:not([type]), input[type="text"], textarea, [role="textbox"]',
  };
  const candidates = (root, loc) => {
    switch (loc.kind) {
      case 'text': return smallest(root, (t) => t.includes(loc.text));
      case 'text_pattern': { const re = new RegExp(loc.pattern); return smallest(root, (t) => re.test(t)); }
      case 'tag_with_text': return Array.from(root.querySelectorAll(loc.tag)).filter((el) => text(el).includes(loc.text));
      case 'css': return Array.from(root.querySelectorAll(loc.selector));
      case 'role': {
        const re = new RegExp(loc.name, 'i');
        const sel = roleSelectors[loc.role] || `[role="${loc.role}"]`;
        return Array.from(root.querySelectorAll(sel)).filter((el) =>
          re.test(text(el) || el.value || el.getAttribute('aria-label') || ''));
      }
      default: return [];
    }
  };
  const find = (id) => {
    for (const d of docs()) {
      const el = d.querySelector(`[HANDLE_ATTR="${id}"]`);
      if (el) return el;
    }
    return null;
  };
  const tag = (el, id) => { el.setAttribute('HANDLE_ATTR', String(id)); return id; };
  return { docs, visible, candidates, find, tag, text };
})();
"#;

fn script(body: &str) -> String {
    format!(
        "(() => {{ {} {} }})()",
        PRELUDE.replace("HANDLE_ATTR", HANDLE_ATTR),
        body
    )
}

pub struct ChromeLauncher {
    config: PortalConfig,
}

impl ChromeLauncher {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(
        &self,
        session: Option<&SessionBlob>,
        headful: bool,
    ) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let browser = ChromeBrowser::launch(&self.config, session, headful).await?;
        Ok(Box::new(browser))
    }
}

pub struct ChromeBrowser {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    next_handle: AtomicU64,
    navigation_timeout: Duration,
    origin_storage: Vec<Value>,
    seeded_origins: Mutex<Vec<String>>,
}

impl ChromeBrowser {
    pub async fn launch(
        config: &PortalConfig,
        session: Option<&SessionBlob>,
        headful: bool,
    ) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1366, 900)
            .request_timeout(config.navigation_timeout)
            .arg("--lang=zh-CN")
            .arg(format!("--user-agent={USER_AGENT}"));
        if headful {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path.clone());
        }
        let browser_config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| DriverError::Launch(err.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(target: "browser", error = %err, "devtools handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| DriverError::Launch(err.to_string()))?;

        let mut origin_storage = Vec::new();
        if let Some(session) = session {
            let cookies: Vec<CookieParam> = session
                .cookies()
                .iter()
                .filter_map(|raw| match serde_json::from_value::<CookieParam>(raw.clone()) {
                    Ok(cookie) => Some(cookie),
                    Err(err) => {
                        warn!(target: "browser", error = %err, "skipping unreadable cookie");
                        None
                    }
                })
                .collect();
            if !cookies.is_empty() {
                page.set_cookies(cookies)
                    .await
                    .map_err(|err| DriverError::Launch(format!("cookie seeding failed: {err}")))?;
            }
            origin_storage = session.origins().to_vec();
        }

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
            next_handle: AtomicU64::new(1),
            navigation_timeout: config.navigation_timeout,
            origin_storage,
            seeded_origins: Mutex::new(Vec::new()),
        })
    }

    async fn eval<T: DeserializeOwned>(&self, body: &str) -> Result<T, DriverError> {
        let result = self
            .page
            .evaluate(script(body))
            .await
            .map_err(|err| DriverError::Script(err.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|err| DriverError::Script(err.to_string()))
    }

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let nav_error = |reason: String| DriverError::Navigation {
            url: url.to_string(),
            reason,
        };
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(nav_error(err.to_string())),
            Err(_) => Err(nav_error(format!(
                "no load within {:?}",
                self.navigation_timeout
            ))),
        }
    }

    /// Writes saved local storage for the current origin, once per origin.
    /// Returns whether anything was written.
    async fn seed_origin_storage(&self) -> Result<bool, DriverError> {
        let origin: String = self.eval("return location.origin;").await?;
        if self.seeded_origins.lock().contains(&origin) {
            return Ok(false);
        }
        self.seeded_origins.lock().push(origin.clone());

        let Some(entry) = self
            .origin_storage
            .iter()
            .find(|entry| entry.get("origin").and_then(Value::as_str) == Some(origin.as_str()))
        else {
            return Ok(false);
        };
        let items = entry.get("localStorage").cloned().unwrap_or(json!([]));
        let written: bool = self
            .eval(&format!(
                "const items = {items}; \
                 for (const it of items) {{ try {{ localStorage.setItem(it.name, it.value); }} catch (e) {{}} }} \
                 return items.length > 0;"
            ))
            .await?;
        Ok(written)
    }

    /// Re-runs `body` until it reports a non-zero hit or `timeout` passes.
    /// Scripts answer `0` for a miss since a `null` result carries no value over the protocol.
    async fn probe(&self, body: String, timeout: Duration) -> Result<Option<u64>, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let hit: u64 = self.eval(&body).await?;
            if hit != 0 {
                return Ok(Some(hit));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    async fn on_element(&self, element: &ElementHandle, action: &str) -> Result<(), DriverError> {
        let attached: bool = self
            .eval(&format!(
                "const el = __fw.find({id}); if (!el) return false; {action} return true;",
                id = element.id
            ))
            .await?;
        if attached {
            Ok(())
        } else {
            Err(DriverError::Detached(element.id))
        }
    }
}

#[async_trait]
impl BrowserDriver for ChromeBrowser {
    async fn open(&self, url: &str) -> Result<String, DriverError> {
        self.navigate(url).await?;
        if self.seed_origin_storage().await? {
            // Page scripts read storage on load, so load again with it in place.
            self.navigate(url).await?;
        }
        self.page
            .content()
            .await
            .map_err(|err| DriverError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            })
    }

    async fn scopes(&self) -> Result<Vec<Scope>, DriverError> {
        let count: usize = self.eval("return __fw.docs().length;").await?;
        Ok((0..count.max(1)).map(Scope).collect())
    }

    async fn locate(
        &self,
        scope: Scope,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let id = self.allocate();
        let loc = serde_json::to_string(locator).map_err(|err| DriverError::Script(err.to_string()))?;
        let body = format!(
            "const d = __fw.docs()[{scope}]; if (!d) return 0; \
             const el = __fw.candidates(d, {loc}).find(__fw.visible); \
             return el ? __fw.tag(el, {id}) : 0;",
            scope = scope.0
        );
        let hit = self.probe(body, timeout).await?;
        Ok(hit.map(|id| ElementHandle { scope, id }))
    }

    async fn locate_near(
        &self,
        anchor: &ElementHandle,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let id = self.allocate();
        let loc = serde_json::to_string(locator).map_err(|err| DriverError::Script(err.to_string()))?;
        let body = format!(
            "const a = __fw.find({anchor}); if (!a) return 0; \
             const root = a.closest('form, [class*=\"form\"], [class*=\"search\"]'); if (!root) return 0; \
             const el = __fw.candidates(root, {loc}).find(__fw.visible); \
             return el ? __fw.tag(el, {id}) : 0;",
            anchor = anchor.id
        );
        let hit = self.probe(body, timeout).await?;
        Ok(hit.map(|id| ElementHandle {
            scope: anchor.scope,
            id,
        }))
    }

    async fn focus(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.on_element(element, "el.click(); el.focus();").await
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        let value = serde_json::to_string(value).map_err(|err| DriverError::Script(err.to_string()))?;
        // Go through the native setter so framework-bound inputs observe the change.
        let action = format!(
            "el.focus(); \
             const proto = Object.getPrototypeOf(el); \
             const desc = Object.getOwnPropertyDescriptor(proto, 'value'); \
             if (desc && desc.set) {{ desc.set.call(el, ''); desc.set.call(el, {value}); }} else {{ el.value = {value}; }} \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }}));"
        );
        self.on_element(element, &action).await
    }

    async fn press_enter(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let action = "for (const type of ['keydown', 'keypress', 'keyup']) { \
                        el.dispatchEvent(new KeyboardEvent(type, { key: 'Enter', code: 'Enter', keyCode: 13, which: 13, bubbles: true })); \
                      }";
        self.on_element(element, action).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.on_element(element, "el.click();").await
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool, DriverError> {
        let loc = serde_json::to_string(locator).map_err(|err| DriverError::Script(err.to_string()))?;
        let body = format!(
            "for (const d of __fw.docs()) {{ if (__fw.candidates(d, {loc}).some(__fw.visible)) return 1; }} \
             return 0;"
        );
        Ok(self.probe(body, timeout).await?.is_some())
    }

    async fn text_content(&self) -> Result<String, DriverError> {
        self.eval("return document.body ? __fw.text(document.body) : '';")
            .await
    }

    async fn tables(&self) -> Result<Vec<TableMatrix>, DriverError> {
        self.eval(
            "return Array.from(document.querySelectorAll('table')).map((t) => \
               Array.from(t.querySelectorAll('tr')).map((tr) => \
                 Array.from(tr.querySelectorAll('th, td')).map((td) => __fw.text(td))));",
        )
        .await
    }

    async fn capture_session(&self) -> Result<SessionBlob, DriverError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|err| DriverError::Script(err.to_string()))?
            .iter()
            .filter_map(|cookie| serde_json::to_value(cookie).ok())
            .collect();
        let origin: Value = self
            .eval(
                "const items = []; \
                 for (let i = 0; i < localStorage.length; i++) { \
                   const name = localStorage.key(i); items.push({ name, value: localStorage.getItem(name) }); \
                 } \
                 return { origin: location.origin, localStorage: items };",
            )
            .await?;
        Ok(SessionBlob::from_parts(cookies, vec![origin]))
    }

    async fn close(&self) {
        let browser = self.browser.lock().take();
        if let Some(mut browser) = browser {
            if let Err(err) = browser.close().await {
                debug!(target: "browser", error = %err, "browser close reported an error");
            }
            let _ = browser.wait().await;
        }
        self.handler.abort();
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
