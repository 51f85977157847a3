//! Popup race listener
//!
//! A wallet popup can open and auto-dismiss (previously trusted origin)
//! faster than a caller can react to the click that triggered it. The fix is
//! to arm the new-surface subscription *before* the trigger fires and keep
//! the resolved announcement around: a popup that is already closed by the
//! time anyone asks for it is still a valid answer.
//!
//! At most one armed subscription exists at a time; arming again cancels the
//! previous one so a single future popup can never resolve twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::browser::SurfaceSource;
use crate::cdp::TargetInfo;
use crate::common::Result;

/// URL fragments that mark a surface as a wallet confirmation popup
const POPUP_URL_MARKERS: &[&str] = &["notification", "popup", "confirm"];

/// Outcome of waiting for a popup
#[derive(Debug)]
pub enum PopupWait {
    /// A popup surface was detected (it may already be closed again)
    Found(TargetInfo),
    /// Nothing appeared; the page count helps judge whether the trigger fired
    TimedOut { open_pages: usize },
}

struct Pending {
    rx: oneshot::Receiver<TargetInfo>,
    task: JoinHandle<()>,
}

/// One-shot subscription for "a new browser surface opened"
pub struct PopupListener {
    source: Arc<dyn SurfaceSource>,
    pending: Option<Pending>,
}

impl PopupListener {
    pub fn new(source: Arc<dyn SurfaceSource>) -> Self {
        Self {
            source,
            pending: None,
        }
    }

    pub fn source(&self) -> &Arc<dyn SurfaceSource> {
        &self.source
    }

    /// Does a URL look like a wallet confirmation surface?
    pub fn is_popup_url(url: &str) -> bool {
        POPUP_URL_MARKERS.iter().any(|marker| url.contains(marker))
    }

    /// Arm a one-shot subscription without blocking. Any previously armed
    /// subscription is cancelled first.
    pub fn arm(&mut self) {
        self.disarm();

        let (tx, rx) = oneshot::channel();
        let mut created = self.source.subscribe_created();
        let task = tokio::spawn(async move {
            loop {
                match created.recv().await {
                    Ok(target) if target.is_page_like() => {
                        let _ = tx.send(target);
                        return;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        self.pending = Some(Pending { rx, task });
    }

    /// Cancel the armed subscription if still pending. Idempotent.
    pub fn disarm(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Return a detected popup, or wait for one.
    ///
    /// Resolution order: a previously armed subscription that has already
    /// fired; a popup-marker surface already open; then a race between the
    /// armed subscription (if any), a fresh subscription, and the timeout.
    /// Whatever loses the race is disarmed cleanly.
    pub async fn consume_pending_or_wait(&mut self, timeout: Duration) -> Result<PopupWait> {
        // A resolved pending wins even if its surface has since closed
        let polled = match &mut self.pending {
            Some(pending) => match pending.rx.try_recv() {
                Ok(target) => Some(Some(target)),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => Some(None),
            },
            None => None,
        };
        match polled {
            Some(Some(target)) => {
                self.disarm();
                return Ok(PopupWait::Found(target));
            }
            // Subscription died without resolving; fall through to the race
            Some(None) => self.disarm(),
            None => {}
        }

        // A popup may have opened before we were called and still be open
        let open = self.source.open_surfaces().await?;
        if let Some(existing) = open.iter().find(|t| Self::is_popup_url(&t.url)) {
            self.disarm();
            return Ok(PopupWait::Found(existing.clone()));
        }

        // Race: armed subscription (if any) vs fresh subscription vs timeout
        let mut fresh = self.source.subscribe_created();
        let fresh_wait = async {
            loop {
                match fresh.recv().await {
                    Ok(target) if target.is_page_like() => return Some(target),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        let winner = if let Some(mut pending) = self.pending.take() {
            let result = tokio::select! {
                armed = &mut pending.rx => armed.ok(),
                fresh_hit = fresh_wait => fresh_hit,
                _ = tokio::time::sleep(timeout) => None,
            };
            pending.task.abort();
            result
        } else {
            tokio::select! {
                fresh_hit = fresh_wait => fresh_hit,
                _ = tokio::time::sleep(timeout) => None,
            }
        };

        match winner {
            Some(target) => Ok(PopupWait::Found(target)),
            None => {
                let open_pages = self.source.open_surfaces().await.map(|s| s.len()).unwrap_or(0);
                Ok(PopupWait::TimedOut { open_pages })
            }
        }
    }
}

impl Drop for PopupListener {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_url_markers() {
        assert!(PopupListener::is_popup_url(
            "chrome-extension://abc/notification.html"
        ));
        assert!(PopupListener::is_popup_url(
            "chrome-extension://abc/popup.html#connect"
        ));
        assert!(PopupListener::is_popup_url("https://x.test/confirm?id=1"));
        assert!(!PopupListener::is_popup_url("https://app.example/swap"));
    }
}
