//! Approval flow controller
//!
//! A state machine over one popup's lifetime. Wallets chain an unpredictable
//! number of confirmation screens in the same surface (connect, then maybe a
//! network add, then a signature), so after the first approval the controller
//! keeps opportunistically clicking at a fixed poll interval until the
//! surface closes or the close-wait budget runs out. Popup closure at any
//! step is the success signal.
//!
//! Expected flakiness (no popup, unclickable button) comes back as a report,
//! never as an `Err`; only structural problems propagate.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::browser::{Intent, Surface, SurfaceSource};
use crate::common::Result;

use super::actions::{self, ActionOptions};
use super::extension::{ExtensionIdentity, EXTENSION_SCHEME};
use super::listener::{PopupListener, PopupWait};

/// States of one approval flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    AwaitingPopup,
    PopupOpened,
    FirstApprovalAttempted,
    AdditionalApprovalCheck,
    AwaitingClose,
    Closed,
    TimedOut,
}

/// Timing and diagnostics knobs for one `approve` invocation
#[derive(Debug, Clone)]
pub struct ApprovalOptions {
    /// Wait for the popup surface to appear
    pub popup_timeout: Duration,
    /// Settle interval before checking for a second confirmation screen
    pub settle: Duration,
    /// Poll interval while waiting for closure
    pub poll_interval: Duration,
    /// Total wait for closure after approvals
    pub close_wait: Duration,
    /// Where diagnostic screenshots go; `None` disables them
    pub screenshot_dir: Option<PathBuf>,
    /// Locators for the affirmative control
    pub intents: Vec<Intent>,
    /// Retry budget for the first click; follow-ups use a reduced budget
    pub action: ActionOptions,
}

impl Default for ApprovalOptions {
    fn default() -> Self {
        Self {
            popup_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            close_wait: Duration::from_secs(10),
            screenshot_dir: None,
            intents: actions::affirmative_intents(),
            action: ActionOptions::default(),
        }
    }
}

/// What one `approve` invocation reports back to the agent
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalReport {
    pub success: bool,
    pub approved: bool,
    pub popup_closed: bool,
    pub state: FlowState,
    /// Approval screens the controller attempted to drive
    pub steps_attempted: u32,
    pub clicks_succeeded: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_pages: Option<usize>,
}

impl ApprovalReport {
    fn new() -> Self {
        Self {
            success: false,
            approved: false,
            popup_closed: false,
            state: FlowState::AwaitingPopup,
            steps_attempted: 0,
            clicks_succeeded: 0,
            screenshots: Vec::new(),
            error: None,
            hint: None,
            url: None,
            open_pages: None,
        }
    }

    pub fn to_record(&self) -> serde_json::Value {
        json!(self)
    }
}

/// Drive one popup from detection to closure
///
/// `primary` is only used for the post-approval diagnostic screenshot.
pub async fn drive_approval(
    listener: &mut PopupListener,
    extension: &ExtensionIdentity,
    primary: Option<&dyn Surface>,
    opts: &ApprovalOptions,
) -> Result<ApprovalReport> {
    let mut report = ApprovalReport::new();

    // AwaitingPopup → PopupOpened | TimedOut
    let target = match listener.consume_pending_or_wait(opts.popup_timeout).await? {
        PopupWait::Found(target) => target,
        PopupWait::TimedOut { open_pages } => {
            report.state = FlowState::TimedOut;
            report.error = Some("No popup window detected within timeout".to_string());
            report.hint =
                Some("Ensure the trigger element was clicked before calling approve".to_string());
            report.open_pages = Some(open_pages);
            return Ok(report);
        }
    };
    report.state = FlowState::PopupOpened;
    report.url = Some(target.url.clone());
    tracing::info!(url = %target.url, "popup surface detected");

    // A popup that opened and already closed again (previously trusted
    // origin) is a completed approval
    let still_open = listener
        .source()
        .open_surfaces()
        .await?
        .iter()
        .any(|t| t.target_id == target.target_id);
    if !still_open {
        tracing::info!("popup already closed; treating as auto-approved");
        return Ok(finish_closed(report, primary, opts).await);
    }

    // The popup can close between the open check and the attach; that race
    // resolves the same way as an auto-dismissal
    let surface = match listener.source().adopt(&target).await {
        Ok(surface) => surface,
        Err(e) => {
            tracing::debug!("popup vanished before attach: {}", e);
            return Ok(finish_closed(report, primary, opts).await);
        }
    };
    let url = match surface.url().await {
        Ok(url) if !url.is_empty() => url,
        _ => target.url.clone(),
    };
    report.url = Some(url.clone());

    // PopupOpened → FirstApprovalAttempted requires an extension-owned URL.
    // An unrelated surface (a new tab the dapp opened, say) must not be
    // clicked through as if it were the wallet.
    if !url.starts_with(EXTENSION_SCHEME) {
        report.error = Some("Popup is not a Chrome extension".to_string());
        report.hint = Some("The detected surface belongs to the page, not the wallet".to_string());
        return Ok(report);
    }
    if extension.verified && !extension.owns_url(&url) {
        report.error = Some("Popup is not owned by the wallet extension".to_string());
        return Ok(report);
    }

    screenshot(&mut report, surface.as_ref(), opts, "popup-step-1").await;

    // FirstApprovalAttempted: full retry budget, full intent list
    report.state = FlowState::FirstApprovalAttempted;
    report.steps_attempted = 1;
    let first = actions::perform_action(surface.as_ref(), &opts.intents, &opts.action).await;
    if first.success && !first.surface_closed {
        report.clicks_succeeded += 1;
    }
    if first.surface_closed || surface.is_closed().await {
        return Ok(finish_closed(report, primary, opts).await);
    }

    // AdditionalApprovalCheck: give a chained screen (e.g. the signature
    // request after a connect) time to render in the same surface
    tokio::time::sleep(opts.settle).await;
    report.state = FlowState::AdditionalApprovalCheck;
    report.steps_attempted += 1;
    screenshot(&mut report, surface.as_ref(), opts, "popup-step-2").await;
    let second =
        actions::perform_action(surface.as_ref(), &opts.intents, &opts.action.reduced()).await;
    if second.success && !second.surface_closed {
        report.clicks_succeeded += 1;
    }
    if second.surface_closed || surface.is_closed().await {
        return Ok(finish_closed(report, primary, opts).await);
    }

    // AwaitingClose: poll for closure, opportunistically clicking so chains
    // of three or more screens complete without a hard-coded step count
    report.state = FlowState::AwaitingClose;
    let deadline = tokio::time::Instant::now() + opts.close_wait;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(opts.poll_interval).await;
        if surface.is_closed().await {
            return Ok(finish_closed(report, primary, opts).await);
        }
        report.steps_attempted += 1;
        let extra =
            actions::perform_action(surface.as_ref(), &opts.intents, &opts.action.reduced()).await;
        if extra.surface_closed {
            return Ok(finish_closed(report, primary, opts).await);
        }
        if extra.success {
            report.clicks_succeeded += 1;
        }
    }

    // The surface never closed. Clicks may still have landed; report what
    // happened and let the agent decide.
    tracing::warn!("popup did not close within the close-wait budget");
    report.success = true;
    report.approved = report.clicks_succeeded > 0;
    Ok(report)
}

/// Terminal success path: the surface closed, at whatever step
async fn finish_closed(
    mut report: ApprovalReport,
    primary: Option<&dyn Surface>,
    opts: &ApprovalOptions,
) -> ApprovalReport {
    report.state = FlowState::Closed;
    report.success = true;
    report.approved = true;
    report.popup_closed = true;

    if let Some(page) = primary {
        let mut shot = ApprovalReport::new();
        screenshot(&mut shot, page, opts, "primary-after-approval").await;
        report.screenshots.extend(shot.screenshots);
    }
    report
}

/// Best-effort diagnostic screenshot
async fn screenshot(
    report: &mut ApprovalReport,
    surface: &dyn Surface,
    opts: &ApprovalOptions,
    name: &str,
) {
    let Some(dir) = &opts.screenshot_dir else {
        return;
    };
    let path = dir.join(format!("{}.png", name));
    match surface.screenshot(&path).await {
        Ok(()) => report.screenshots.push(path),
        Err(e) => tracing::debug!("screenshot {} failed: {}", name, e),
    }
}
