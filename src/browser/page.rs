//! Pages, surfaces, and locators
//!
//! `Surface` is the seam between the wallet drivers and the real browser:
//! everything the approval machinery does to a page goes through it, so the
//! state machines can be exercised in tests against scripted fakes. `Page`
//! is the CDP-backed implementation.
//!
//! Wallet UIs vary wildly across versions and languages, so a control is
//! addressed by an ordered list of `Intent`s, synonymous locators for the
//! same logical button.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::cdp::{CdpClient, TargetInfo};
use crate::common::{Error, Result};

/// How to look for a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// Visible text of a clickable element
    Text,
    /// CSS selector
    Css,
    /// `data-testid` attribute value
    TestId,
}

/// One locator candidate for a logical control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub strategy: LocatorStrategy,
    pub value: String,
}

impl Intent {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::Text,
            value: value.into(),
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::Css,
            value: value.into(),
        }
    }

    pub fn test_id(value: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::TestId,
            value: value.into(),
        }
    }
}

/// A located control, with the checks the driver needs already evaluated
#[derive(Debug, Clone)]
pub struct ControlMatch {
    pub strategy: LocatorStrategy,
    /// Human-readable description of what matched, for diagnostics
    pub selector: String,
    pub visible: bool,
    pub enabled: bool,
    /// Center of the bounding box, for trusted input events
    pub x: f64,
    pub y: f64,
    /// JS expression that re-locates the element inside the page
    pub locate_js: String,
}

/// One drivable browser surface (primary page or wallet popup)
#[async_trait]
pub trait Surface: Send + Sync {
    /// Current URL; may be stale for a surface that just closed
    async fn url(&self) -> Result<String>;

    /// Whether the underlying target is gone
    async fn is_closed(&self) -> bool;

    /// Look for a control matching one intent
    async fn probe(&self, intent: &Intent) -> Result<Option<ControlMatch>>;

    /// Bring a located control into the viewport
    async fn scroll_into_view(&self, control: &ControlMatch) -> Result<()>;

    /// Click a located control; `force` bypasses overlay/occlusion checks
    async fn click(&self, control: &ControlMatch, force: bool) -> Result<()>;

    /// Type into a located control
    async fn fill(&self, control: &ControlMatch, text: &str) -> Result<()>;

    /// Capture a screenshot to the given path (best-effort diagnostics)
    async fn screenshot(&self, path: &Path) -> Result<()>;
}

/// Forward `Surface` through a shared handle so an `Arc<impl Surface>` can be
/// driven and stored as a `Box<dyn Surface>` without unwrapping it.
#[async_trait]
impl<T: Surface + ?Sized> Surface for std::sync::Arc<T> {
    async fn url(&self) -> Result<String> {
        (**self).url().await
    }

    async fn is_closed(&self) -> bool {
        (**self).is_closed().await
    }

    async fn probe(&self, intent: &Intent) -> Result<Option<ControlMatch>> {
        (**self).probe(intent).await
    }

    async fn scroll_into_view(&self, control: &ControlMatch) -> Result<()> {
        (**self).scroll_into_view(control).await
    }

    async fn click(&self, control: &ControlMatch, force: bool) -> Result<()> {
        (**self).click(control, force).await
    }

    async fn fill(&self, control: &ControlMatch, text: &str) -> Result<()> {
        (**self).fill(control, text).await
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        (**self).screenshot(path).await
    }
}

/// Where surfaces come from: the live browser in production, a scripted
/// fake in tests. Detection via this trait only borrows surfaces; creating
/// and destroying them is the browser's business.
#[async_trait]
pub trait SurfaceSource: Send + Sync {
    /// Announcements of newly created targets
    fn subscribe_created(&self) -> broadcast::Receiver<TargetInfo>;

    /// Targets currently open
    async fn open_surfaces(&self) -> Result<Vec<TargetInfo>>;

    /// Obtain a drivable handle for an announced target
    async fn adopt(&self, target: &TargetInfo) -> Result<Box<dyn Surface>>;
}

#[async_trait]
impl SurfaceSource for CdpClient {
    fn subscribe_created(&self) -> broadcast::Receiver<TargetInfo> {
        self.subscribe_targets()
    }

    async fn open_surfaces(&self) -> Result<Vec<TargetInfo>> {
        Ok(self
            .get_targets()
            .await?
            .into_iter()
            .filter(TargetInfo::is_page_like)
            .collect())
    }

    async fn adopt(&self, target: &TargetInfo) -> Result<Box<dyn Surface>> {
        let page = Page::attach(self.clone(), &target.target_id).await?;
        Ok(Box::new(page))
    }
}

/// A CDP-attached page target
pub struct Page {
    client: CdpClient,
    target_id: String,
    session_id: String,
}

impl Page {
    /// Attach to an existing target and enable the domains we drive
    pub async fn attach(client: CdpClient, target_id: &str) -> Result<Self> {
        let session_id = client.attach_to_target(target_id).await?;
        let page = Self {
            client,
            target_id: target_id.to_string(),
            session_id,
        };
        page.command("Page.enable", json!({})).await?;
        page.command("Runtime.enable", json!({})).await?;
        Ok(page)
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value> {
        self.client
            .send(Some(&self.session_id), method, params)
            .await
    }

    /// Navigate and wait (bounded) for the load event
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let mut events = self.client.subscribe_events();
        self.command("Page.navigate", json!({ "url": url })).await?;

        let session = self.session_id.clone();
        let load_wait = tokio::time::timeout(std::time::Duration::from_secs(10), async move {
            loop {
                match events.recv().await {
                    Ok(event)
                        if event.method == "Page.loadEventFired"
                            && event.session_id.as_deref() == Some(session.as_str()) =>
                    {
                        break;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if load_wait.await.is_err() {
            tracing::debug!(url, "load event not observed before deadline, continuing");
        }
        Ok(())
    }

    /// Evaluate an expression, returning its value by JSON
    pub async fn evaluate(&self, expression: &str, await_promise: bool) -> Result<Value> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": await_promise,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("unknown script exception");
            return Err(Error::ScriptFailed(text.to_string()));
        }

        Ok(result["result"]["value"].clone())
    }
}

#[async_trait]
impl Surface for Page {
    async fn url(&self) -> Result<String> {
        let targets = self.client.get_targets().await?;
        targets
            .into_iter()
            .find(|t| t.target_id == self.target_id)
            .map(|t| t.url)
            .ok_or_else(|| Error::TargetGone(self.target_id.clone()))
    }

    async fn is_closed(&self) -> bool {
        match self.client.get_targets().await {
            Ok(targets) => !targets.iter().any(|t| t.target_id == self.target_id),
            // A dead connection means the whole browser is gone
            Err(_) => true,
        }
    }

    async fn probe(&self, intent: &Intent) -> Result<Option<ControlMatch>> {
        let locate = locate_js(intent);
        let probe = format!(
            r#"(() => {{
                const el = {locate};
                if (!el) return {{ found: false }};
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                const visible = rect.width > 0 && rect.height > 0
                    && style.visibility !== 'hidden' && style.display !== 'none';
                const enabled = !el.disabled
                    && el.getAttribute('aria-disabled') !== 'true'
                    && style.pointerEvents !== 'none';
                return {{
                    found: true,
                    visible,
                    enabled,
                    x: rect.x + rect.width / 2,
                    y: rect.y + rect.height / 2,
                }};
            }})()"#
        );

        let value = self.evaluate(&probe, false).await?;
        if !value["found"].as_bool().unwrap_or(false) {
            return Ok(None);
        }

        Ok(Some(ControlMatch {
            strategy: intent.strategy,
            selector: intent.value.clone(),
            visible: value["visible"].as_bool().unwrap_or(false),
            enabled: value["enabled"].as_bool().unwrap_or(false),
            x: value["x"].as_f64().unwrap_or(0.0),
            y: value["y"].as_f64().unwrap_or(0.0),
            locate_js: locate,
        }))
    }

    async fn scroll_into_view(&self, control: &ControlMatch) -> Result<()> {
        let script = format!(
            "((el) => {{ if (el) el.scrollIntoView({{ block: 'center', inline: 'center' }}); }})({})",
            control.locate_js
        );
        self.evaluate(&script, false).await?;
        Ok(())
    }

    async fn click(&self, control: &ControlMatch, force: bool) -> Result<()> {
        if force {
            // Programmatic click: ignores whatever is painted on top
            let script = format!(
                "((el) => {{ if (!el) throw new Error('element vanished'); el.click(); }})({})",
                control.locate_js
            );
            self.evaluate(&script, false).await?;
            return Ok(());
        }

        // Re-read the box after scrolling, then dispatch trusted mouse events
        let rect_script = format!(
            r#"((el) => {{
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return {{ x: r.x + r.width / 2, y: r.y + r.height / 2 }};
            }})({})"#,
            control.locate_js
        );
        let center = self.evaluate(&rect_script, false).await?;
        if center.is_null() {
            return Err(Error::ScriptFailed("element vanished before click".to_string()));
        }
        let x = center["x"].as_f64().unwrap_or(control.x);
        let y = center["y"].as_f64().unwrap_or(control.y);

        for event_type in ["mousePressed", "mouseReleased"] {
            self.command(
                "Input.dispatchMouseEvent",
                json!({
                    "type": event_type,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "clickCount": 1,
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn fill(&self, control: &ControlMatch, text: &str) -> Result<()> {
        let script = format!(
            r#"((el, value) => {{
                if (!el) throw new Error('element vanished');
                el.focus();
                const setter = Object.getOwnPropertyDescriptor(
                    Object.getPrototypeOf(el), 'value');
                if (setter && setter.set) {{ setter.set.call(el, value); }}
                else {{ el.value = value; }}
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }})({}, {})"#,
            control.locate_js,
            js_string(text)
        );
        self.evaluate(&script, false).await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let result = self
            .command("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = result["data"]
            .as_str()
            .ok_or_else(|| Error::CdpProtocol("screenshot carried no data".to_string()))?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| Error::CdpProtocol(format!("bad screenshot payload: {}", e)))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// JS expression locating the element for one intent
fn locate_js(intent: &Intent) -> String {
    match intent.strategy {
        LocatorStrategy::Css => format!("document.querySelector({})", js_string(&intent.value)),
        LocatorStrategy::TestId => format!(
            "document.querySelector('[data-testid=' + JSON.stringify({}) + ']')",
            js_string(&intent.value)
        ),
        LocatorStrategy::Text => format!(
            r#"(() => {{
                const needle = {}.trim().toLowerCase();
                const candidates = document.querySelectorAll(
                    'button, [role="button"], a, input[type="submit"], input[type="button"]');
                for (const el of candidates) {{
                    const label = (el.innerText || el.value || '').trim().toLowerCase();
                    if (label === needle || (needle.length >= 4 && label.includes(needle))) {{
                        return el;
                    }}
                }}
                return null;
            }})()"#,
            js_string(&intent.value)
        ),
    }
}

/// Escape an arbitrary string as a JS string literal
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
