//! Browser session lifecycle
//!
//! Exactly one Session is live per process. It either reattaches to a
//! browser left running by a previous invocation (found through the session
//! pointer sidecar) or launches a fresh one. The primary page reference is
//! mutated only through the explicit setter; popup surfaces are never made
//! primary behind the caller's back.

use crate::cdp::CdpClient;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};

use super::launcher::{self, SessionPointer};
use super::page::Page;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No browser yet
    Absent,
    /// Launch in progress
    Launching,
    /// Connected and usable
    Attached,
    /// Torn down
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Launching => write!(f, "launching"),
            Self::Attached => write!(f, "attached"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The live browser session
pub struct Session {
    client: CdpClient,
    state: SessionState,
    primary: Option<Page>,
    reattached: bool,
    pointer: SessionPointer,
}

impl Session {
    /// Get a live session: reattach if a prior one is reachable, else launch.
    /// Idempotent from the caller's point of view — there is never more than
    /// one browser behind the pointer sidecar.
    pub async fn ensure(config: &Config) -> Result<Self> {
        if let Some(session) = Self::try_attach(config).await? {
            tracing::info!(port = session.pointer.port, "reattached to existing browser");
            return Ok(session);
        }
        Self::launch_fresh(config).await
    }

    /// Reattach to a previously launched browser, if its endpoint answers.
    /// A stale pointer (endpoint dead) is removed and `None` returned.
    pub async fn try_attach(config: &Config) -> Result<Option<Self>> {
        let pointer_path = paths::session_pointer_path();
        let Some(pointer) = SessionPointer::load(&pointer_path) else {
            return Ok(None);
        };

        let Some(ws_url) = launcher::probe_endpoint(pointer.port).await else {
            tracing::debug!(port = pointer.port, "stale session pointer, removing");
            SessionPointer::remove(&pointer_path);
            return Ok(None);
        };

        let client = CdpClient::connect(&ws_url, request_timeout(config)).await?;
        let mut session = Self {
            client,
            state: SessionState::Attached,
            primary: None,
            reattached: true,
            pointer,
        };
        session.adopt_primary().await?;
        Ok(Some(session))
    }

    /// Launch a new browser process. Failure here is fatal and not retried.
    async fn launch_fresh(config: &Config) -> Result<Self> {
        let (ws_url, pointer) = launcher::launch(config).await?;
        let client = CdpClient::connect(&ws_url, request_timeout(config)).await?;
        let mut session = Self {
            client,
            state: SessionState::Attached,
            primary: None,
            reattached: false,
            pointer,
        };
        session.adopt_primary().await?;
        Ok(session)
    }

    /// Pick (or create) the primary page: the first ordinary page target,
    /// skipping extension and browser-internal surfaces.
    async fn adopt_primary(&mut self) -> Result<()> {
        let targets = self.client.get_targets().await?;
        let candidate = targets.iter().find(|t| {
            t.is_page_like()
                && !t.url.starts_with("chrome-extension://")
                && !t.url.starts_with("chrome://")
        });

        let target_id = match candidate {
            Some(target) => target.target_id.clone(),
            None => self.client.create_target("about:blank").await?,
        };

        let page = Page::attach(self.client.clone(), &target_id).await?;
        self.primary = Some(page);
        Ok(())
    }

    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether this session reattached rather than launched
    pub fn reattached(&self) -> bool {
        self.reattached
    }

    pub fn port(&self) -> u16 {
        self.pointer.port
    }

    /// The current primary page
    pub fn primary_page(&self) -> Result<&Page> {
        if self.state != SessionState::Attached {
            return Err(Error::SessionNotActive);
        }
        self.primary.as_ref().ok_or(Error::SessionNotActive)
    }

    /// Explicitly switch the primary page; nothing else ever switches it
    pub fn set_primary_page(&mut self, page: Page) {
        self.primary = Some(page);
    }

    /// Close the browser and clear all state. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Err(e) = self.client.close_browser().await {
            tracing::debug!("Browser.close failed during teardown: {}", e);
        }
        SessionPointer::remove(&paths::session_pointer_path());
        self.primary = None;
        self.state = SessionState::Closed;
    }
}

fn request_timeout(config: &Config) -> std::time::Duration {
    std::time::Duration::from_secs(config.timeouts.cdp_request_secs)
}
