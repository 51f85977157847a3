//! Wallet onboarding: import an account and set the unlock password
//!
//! Drives the extension's own onboarding/import pages with the same
//! multi-locator action driver used for popups. Wallet versions shuffle
//! these screens around, so most steps are optional: a step whose control
//! never appears is skipped, and the run is judged by whether the required
//! steps landed.

use serde_json::{json, Value};

use crate::browser::{Intent, Page};
use crate::cdp::CdpClient;
use crate::common::secrets::Credentials;
use crate::common::{paths, Result};

use super::actions::{self, ActionOptions};
use super::extension::{ExtensionIdentity, ExtensionPage};

enum StepKind {
    Click,
    Fill(String),
}

struct Step {
    name: &'static str,
    intents: Vec<Intent>,
    kind: StepKind,
    required: bool,
}

/// Import the wallet from the credentials sidecar's secret
///
/// Reads `import_secret`, generates and persists `unlock_password` if absent,
/// and never logs either value.
pub async fn setup_wallet(
    client: &CdpClient,
    identity: &ExtensionIdentity,
    opts: &ActionOptions,
) -> Result<Value> {
    let credentials_path = paths::credentials_path();
    let mut credentials = Credentials::load(&credentials_path)?;
    let secret = credentials
        .require_import_secret(&credentials_path)?
        .to_string();
    let password = credentials.ensure_unlock_password(&credentials_path)?;

    let target_id = client
        .create_target(&identity.page_url(ExtensionPage::Home))
        .await?;
    let page = Page::attach(client.clone(), &target_id).await?;

    let steps = import_steps(&secret, &password);
    let mut results = Vec::new();
    let mut required_failed = 0u32;

    for step in &steps {
        let outcome = match &step.kind {
            StepKind::Click => actions::perform_action(&page, &step.intents, opts).await,
            StepKind::Fill(value) => {
                actions::perform_fill(&page, &step.intents, value, opts).await
            }
        };

        if !outcome.success && step.required {
            required_failed += 1;
        }
        tracing::info!(step = step.name, success = outcome.success, "onboarding step");
        results.push(json!({
            "step": step.name,
            "success": outcome.success,
            "required": step.required,
        }));

        // Screens animate between steps
        tokio::time::sleep(std::time::Duration::from_millis(750)).await;
    }

    Ok(json!({
        "success": required_failed == 0,
        "steps": results,
    }))
}

/// The import-by-secret step sequence, most-recent MetaMask layout first
fn import_steps(secret: &str, password: &str) -> Vec<Step> {
    vec![
        Step {
            name: "accept-terms",
            intents: vec![
                Intent::test_id("onboarding-terms-checkbox"),
                Intent::css("input#onboarding__terms-checkbox"),
            ],
            kind: StepKind::Click,
            required: false,
        },
        Step {
            name: "choose-import",
            intents: vec![
                Intent::test_id("onboarding-import-wallet"),
                Intent::text("Import an existing wallet"),
                Intent::text("Import wallet"),
            ],
            kind: StepKind::Click,
            required: true,
        },
        Step {
            name: "decline-metrics",
            intents: vec![
                Intent::test_id("metametrics-no-thanks"),
                Intent::text("No thanks"),
            ],
            kind: StepKind::Click,
            required: false,
        },
        Step {
            name: "enter-secret",
            intents: vec![
                Intent::test_id("import-srp__srp-word-0"),
                Intent::test_id("private-key-box"),
                Intent::css("input[type='password']"),
                Intent::css("textarea"),
            ],
            kind: StepKind::Fill(secret.to_string()),
            required: true,
        },
        Step {
            name: "confirm-secret",
            intents: vec![
                Intent::test_id("import-srp-confirm"),
                Intent::text("Confirm Secret Recovery Phrase"),
                Intent::text("Import"),
            ],
            kind: StepKind::Click,
            required: true,
        },
        Step {
            name: "set-password",
            intents: vec![
                Intent::test_id("create-password-new"),
                Intent::css("input#create-password"),
            ],
            kind: StepKind::Fill(password.to_string()),
            required: true,
        },
        Step {
            name: "confirm-password",
            intents: vec![
                Intent::test_id("create-password-confirm"),
                Intent::css("input#confirm-password"),
            ],
            kind: StepKind::Fill(password.to_string()),
            required: true,
        },
        Step {
            name: "accept-password-terms",
            intents: vec![Intent::test_id("create-password-terms")],
            kind: StepKind::Click,
            required: false,
        },
        Step {
            name: "finish-import",
            intents: vec![
                Intent::test_id("create-password-import"),
                Intent::text("Import my wallet"),
                Intent::text("Create"),
            ],
            kind: StepKind::Click,
            required: true,
        },
        Step {
            name: "dismiss-completion",
            intents: vec![
                Intent::test_id("onboarding-complete-done"),
                Intent::text("Got it"),
                Intent::text("Done"),
            ],
            kind: StepKind::Click,
            required: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_steps_cover_the_import_path() {
        let steps = import_steps("secret words", "password123");
        let required: Vec<_> = steps
            .iter()
            .filter(|s| s.required)
            .map(|s| s.name)
            .collect();
        assert_eq!(
            required,
            vec![
                "choose-import",
                "enter-secret",
                "confirm-secret",
                "set-password",
                "confirm-password",
                "finish-import"
            ]
        );
    }

    #[test]
    fn fill_steps_carry_the_right_values() {
        let steps = import_steps("the secret", "the password");
        let fills: Vec<_> = steps
            .iter()
            .filter_map(|s| match &s.kind {
                StepKind::Fill(v) => Some((s.name, v.as_str())),
                StepKind::Click => None,
            })
            .collect();
        assert_eq!(
            fills,
            vec![
                ("enter-secret", "the secret"),
                ("set-password", "the password"),
                ("confirm-password", "the password"),
            ]
        );
    }
}
