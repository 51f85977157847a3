//! Extension identity resolution
//!
//! The wallet's internal pages (popup, onboarding, key import) are addressed
//! as `chrome-extension://<id>/<page>`, so everything starts with finding the
//! installed extension's runtime id. Three strategies run in order, stopping
//! at the first hit; if all fail we fall back to the last id this tool was
//! known to work with — explicitly flagged unverified, never passed off as a
//! live detection.

use std::time::Duration;

use serde::Serialize;

use crate::browser::Page;
use crate::cdp::{CdpClient, TargetInfo};
use crate::common::config::Config;
use crate::common::Result;

/// MetaMask's stable Chrome Web Store id; the degraded-mode fallback
pub const LAST_KNOWN_EXTENSION_ID: &str = "nkbihfbeogaeaoehlefnkodbefgpgknn";

/// The extension scheme prefix
pub const EXTENSION_SCHEME: &str = "chrome-extension://";

/// A resolved (or assumed) extension identity
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionIdentity {
    pub id: String,
    /// False when the id came from the hard-coded fallback
    pub verified: bool,
}

impl ExtensionIdentity {
    /// `chrome-extension://<id>/` — every internal URL starts with this
    pub fn base_url(&self) -> String {
        format!("{}{}/", EXTENSION_SCHEME, self.id)
    }

    /// Build the URL of one internal page
    pub fn page_url(&self, page: ExtensionPage) -> String {
        format!("{}{}", self.base_url(), page.path())
    }

    /// Whether a surface URL belongs to this extension
    pub fn owns_url(&self, url: &str) -> bool {
        url.starts_with(&self.base_url())
    }
}

/// The closed set of internal pages the engine addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionPage {
    /// Confirmation popup
    Popup,
    /// Home / onboarding entry
    Home,
    /// Import-by-private-key route
    ImportKey,
}

impl ExtensionPage {
    pub fn path(self) -> &'static str {
        match self {
            Self::Popup => "popup.html",
            Self::Home => "home.html",
            Self::ImportKey => "home.html#new-account/import",
        }
    }
}

/// Extract an extension id from a `chrome-extension://` URL
pub fn parse_extension_id(url: &str) -> Option<String> {
    let rest = url.strip_prefix(EXTENSION_SCHEME)?;
    let id = rest.split('/').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Derive an identity from already-open targets, if any belongs to an extension
pub fn identity_from_targets(targets: &[TargetInfo]) -> Option<ExtensionIdentity> {
    targets
        .iter()
        .find_map(|t| parse_extension_id(&t.url))
        .map(|id| ExtensionIdentity { id, verified: true })
}

/// Resolve the installed extension's identity
///
/// Strategy order: (a) the background worker's registration, with a bounded
/// wait for it if it hasn't happened yet; (b) a scan of open surfaces for the
/// extension scheme; (c) scraping the browser's own extensions listing. The
/// fallback id is a degraded mode: the caller sees `verified == false` and a
/// WARN is logged.
pub async fn resolve_identity(client: &CdpClient, config: &Config) -> Result<ExtensionIdentity> {
    // (a) the worker may already be registered (always true on reattach);
    // otherwise give it a bounded window to come up
    let targets = client.get_targets().await?;
    let worker = targets
        .iter()
        .filter(|t| t.is_extension_worker())
        .find_map(|t| parse_extension_id(&t.url));
    if let Some(id) = worker {
        tracing::debug!(id = %id, "extension id from registered worker");
        return Ok(ExtensionIdentity { id, verified: true });
    }
    if let Some(identity) = wait_for_worker(
        client,
        Duration::from_millis(config.timeouts.extension_worker_wait_ms),
    )
    .await
    {
        tracing::debug!(id = %identity.id, "extension id from worker registration");
        return Ok(identity);
    }

    // (b) any open surface with the extension scheme (popup, options page)
    let targets = client.get_targets().await?;
    if let Some(identity) = identity_from_targets(&targets) {
        tracing::debug!(id = %identity.id, "extension id found among open surfaces");
        return Ok(identity);
    }

    // (c) scrape the extensions listing page
    match scrape_extensions_page(client).await {
        Ok(Some(identity)) => {
            tracing::debug!(id = %identity.id, "extension id scraped from listing");
            return Ok(identity);
        }
        Ok(None) => {}
        Err(e) => tracing::debug!("extensions listing scrape failed: {}", e),
    }

    let identity = fallback_identity(config);
    tracing::warn!(
        id = %identity.id,
        "extension id could not be detected; using last-known id (unverified)"
    );
    Ok(identity)
}

/// The degraded-mode identity: last-known id, explicitly unverified
fn fallback_identity(config: &Config) -> ExtensionIdentity {
    ExtensionIdentity {
        id: config
            .wallet
            .fallback_extension_id
            .clone()
            .unwrap_or_else(|| LAST_KNOWN_EXTENSION_ID.to_string()),
        verified: false,
    }
}

/// Bounded wait for a service-worker/background-page target to appear
async fn wait_for_worker(client: &CdpClient, wait: Duration) -> Option<ExtensionIdentity> {
    let mut created = client.subscribe_targets();
    let watch = async {
        loop {
            match created.recv().await {
                Ok(target) if target.is_extension_worker() => {
                    if let Some(id) = parse_extension_id(&target.url) {
                        return Some(ExtensionIdentity { id, verified: true });
                    }
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(wait, watch).await.ok().flatten()
}

/// Open chrome://extensions and read ids out of the rendered list
async fn scrape_extensions_page(client: &CdpClient) -> Result<Option<ExtensionIdentity>> {
    let target_id = client.create_target("chrome://extensions").await?;
    let page = Page::attach(client.clone(), &target_id).await?;

    // The listing is shadow DOM; extensions-item elements carry the id
    let script = r#"(() => {
        const manager = document.querySelector('extensions-manager');
        if (!manager || !manager.shadowRoot) return null;
        const list = manager.shadowRoot.querySelector('extensions-item-list');
        if (!list || !list.shadowRoot) return null;
        const items = list.shadowRoot.querySelectorAll('extensions-item');
        const ids = Array.from(items).map(el => el.id).filter(Boolean);
        return ids.length ? ids[0] : null;
    })()"#;

    let value = page.evaluate(script, false).await;
    let _ = client.close_target(&target_id).await;

    match value {
        Ok(serde_json::Value::String(id)) if !id.is_empty() => Ok(Some(ExtensionIdentity {
            id,
            verified: true,
        })),
        Ok(_) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(kind: &str, url: &str) -> TargetInfo {
        serde_json::from_value(json!({
            "targetId": "T",
            "type": kind,
            "url": url,
        }))
        .unwrap()
    }

    #[test]
    fn parses_ids_from_extension_urls() {
        assert_eq!(
            parse_extension_id("chrome-extension://abcdef/popup.html").as_deref(),
            Some("abcdef")
        );
        assert_eq!(
            parse_extension_id("chrome-extension://abcdef").as_deref(),
            Some("abcdef")
        );
        assert!(parse_extension_id("https://example.com").is_none());
        assert!(parse_extension_id("chrome-extension://").is_none());
    }

    #[test]
    fn derives_identity_from_open_targets() {
        let targets = vec![
            target("page", "https://app.example"),
            target("service_worker", "chrome-extension://walletid/background.js"),
        ];
        let identity = identity_from_targets(&targets).unwrap();
        assert_eq!(identity.id, "walletid");
        assert!(identity.verified);

        assert!(identity_from_targets(&[target("page", "https://x.example")]).is_none());
    }

    #[test]
    fn fallback_is_flagged_unverified() {
        let identity = fallback_identity(&Config::default());
        assert_eq!(identity.id, LAST_KNOWN_EXTENSION_ID);
        assert!(!identity.verified);

        let mut config = Config::default();
        config.wallet.fallback_extension_id = Some("customid".to_string());
        let identity = fallback_identity(&config);
        assert_eq!(identity.id, "customid");
        assert!(!identity.verified);
    }

    #[test]
    fn page_urls_are_templated() {
        let identity = ExtensionIdentity {
            id: "walletid".to_string(),
            verified: true,
        };
        assert_eq!(
            identity.page_url(ExtensionPage::Popup),
            "chrome-extension://walletid/popup.html"
        );
        assert!(identity.owns_url("chrome-extension://walletid/notification.html"));
        assert!(!identity.owns_url("chrome-extension://otherid/notification.html"));
        assert!(!identity.owns_url("https://walletid.example"));
    }
}
