//! Action driver
//!
//! Executes one logical UI action against a surface using an ordered list of
//! synonymous locators. Selection is strict first-match: the first intent
//! that is simultaneously present, visible, and enabled wins, even if a
//! later one would also match. Transient failures are absorbed by the retry
//! loop and only ever surface as a failed `ActionResult`; the driver never
//! turns a missing button into a hard error.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::browser::{ControlMatch, Intent, LocatorStrategy, Surface};

/// Retry and timing knobs for one driver call
#[derive(Debug, Clone)]
pub struct ActionOptions {
    pub retries: u32,
    pub backoff: Duration,
    pub click_timeout: Duration,
}

impl Default for ActionOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
            click_timeout: Duration::from_secs(2),
        }
    }
}

impl ActionOptions {
    /// A single-attempt budget for opportunistic follow-up clicks
    pub fn reduced(&self) -> Self {
        Self {
            retries: 1,
            ..self.clone()
        }
    }
}

/// Outcome of one driver call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    /// Which strategy found the control, when one did
    pub strategy: Option<LocatorStrategy>,
    /// The locator value that matched
    pub matched: Option<String>,
    /// Retry rounds consumed
    pub retries_used: u32,
    /// The surface closed before/while acting — implicit success
    pub surface_closed: bool,
    /// The direct click failed and the forced click carried it
    pub forced: bool,
}

impl ActionResult {
    fn not_found(retries_used: u32) -> Self {
        Self {
            success: false,
            strategy: None,
            matched: None,
            retries_used,
            surface_closed: false,
            forced: false,
        }
    }

    fn closed(retries_used: u32) -> Self {
        Self {
            success: true,
            strategy: None,
            matched: None,
            retries_used,
            surface_closed: true,
            forced: false,
        }
    }

    fn clicked(control: &ControlMatch, retries_used: u32, forced: bool) -> Self {
        Self {
            success: true,
            strategy: Some(control.strategy),
            matched: Some(control.selector.clone()),
            retries_used,
            surface_closed: false,
            forced,
        }
    }

    pub fn to_record(&self) -> serde_json::Value {
        json!(self)
    }
}

/// Does a probed control satisfy the driver's three checks?
pub fn satisfies(control: &ControlMatch) -> bool {
    control.visible && control.enabled
}

/// Pure first-match selection over pre-evaluated probes; the index returned
/// is the position in the caller-specified intent order.
pub fn first_satisfying(probes: &[Option<ControlMatch>]) -> Option<usize> {
    probes
        .iter()
        .position(|probe| probe.as_ref().map(satisfies).unwrap_or(false))
}

/// Drive one click action against a surface
pub async fn perform_action(
    surface: &dyn Surface,
    intents: &[Intent],
    opts: &ActionOptions,
) -> ActionResult {
    for attempt in 0..opts.retries {
        // A surface that closed under us means the action's effect already
        // happened (e.g. an auto-approved connect)
        if surface.is_closed().await {
            return ActionResult::closed(attempt);
        }

        if let Some(control) = find_first(surface, intents).await {
            let _ = surface.scroll_into_view(&control).await;

            let direct =
                tokio::time::timeout(opts.click_timeout, surface.click(&control, false)).await;
            match direct {
                Ok(Ok(())) => return ActionResult::clicked(&control, attempt, false),
                Ok(Err(e)) => tracing::debug!(selector = %control.selector, "direct click failed: {}", e),
                Err(_) => tracing::debug!(selector = %control.selector, "direct click timed out"),
            }

            // One forced click, bypassing overlay/occlusion checks
            if surface.click(&control, true).await.is_ok() {
                return ActionResult::clicked(&control, attempt, true);
            }
        }

        tokio::time::sleep(opts.backoff).await;
    }

    if surface.is_closed().await {
        return ActionResult::closed(opts.retries);
    }
    ActionResult::not_found(opts.retries)
}

/// Fill the first satisfying intent with text, same retry discipline
pub async fn perform_fill(
    surface: &dyn Surface,
    intents: &[Intent],
    text: &str,
    opts: &ActionOptions,
) -> ActionResult {
    for attempt in 0..opts.retries {
        if surface.is_closed().await {
            return ActionResult::closed(attempt);
        }

        if let Some(control) = find_first(surface, intents).await {
            let _ = surface.scroll_into_view(&control).await;
            if surface.fill(&control, text).await.is_ok() {
                return ActionResult::clicked(&control, attempt, false);
            }
        }

        tokio::time::sleep(opts.backoff).await;
    }
    ActionResult::not_found(opts.retries)
}

/// Probe intents in caller order, stopping at the first satisfying match
async fn find_first(surface: &dyn Surface, intents: &[Intent]) -> Option<ControlMatch> {
    for intent in intents {
        match surface.probe(intent).await {
            Ok(Some(control)) if satisfies(&control) => return Some(control),
            Ok(_) => continue,
            Err(e) => {
                // Probe errors are transient; the retry loop covers them
                tracing::debug!(value = %intent.value, "probe failed: {}", e);
                continue;
            }
        }
    }
    None
}

/// The affirmative intent list used to approve wallet confirmations.
/// Ordered: precise test ids first, then visible text across the languages
/// and wallet versions seen in the wild, then framework class names.
pub fn affirmative_intents() -> Vec<Intent> {
    vec![
        Intent::test_id("confirm-footer-button"),
        Intent::test_id("page-container-footer-next"),
        Intent::test_id("confirmation-submit-button"),
        Intent::text("Connect"),
        Intent::text("Next"),
        Intent::text("Confirm"),
        Intent::text("Approve"),
        Intent::text("Sign"),
        Intent::text("Allow"),
        Intent::text("连接"),
        Intent::text("确认"),
        Intent::text("签名"),
        Intent::text("允许"),
        Intent::text("下一步"),
        Intent::css("button.btn-primary"),
        Intent::css("button.button--primary"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(visible: bool, enabled: bool) -> ControlMatch {
        ControlMatch {
            strategy: LocatorStrategy::Text,
            selector: "Connect".to_string(),
            visible,
            enabled,
            x: 0.0,
            y: 0.0,
            locate_js: String::new(),
        }
    }

    #[test]
    fn first_satisfying_respects_order() {
        let probes = vec![
            None,
            Some(control(true, false)),
            Some(control(true, true)),
            Some(control(true, true)),
        ];
        assert_eq!(first_satisfying(&probes), Some(2));
    }

    #[test]
    fn nothing_satisfying_is_none() {
        let probes = vec![None, Some(control(false, true)), Some(control(true, false))];
        assert_eq!(first_satisfying(&probes), None);
    }

    #[test]
    fn affirmative_list_starts_precise() {
        let intents = affirmative_intents();
        assert_eq!(intents[0].strategy, LocatorStrategy::TestId);
        assert!(intents.iter().any(|i| i.value == "Connect"));
        assert!(intents.iter().any(|i| i.value == "确认"));
    }
}
