//! CLI command handling
//!
//! Dispatches commands against the browser session and shapes each outcome
//! into the single result record the invocation emits. Environmental
//! failures (popup timeouts, unresolved buttons) come back as
//! `success: false` records; only structural errors propagate as `Err` and
//! end the process non-zero.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::browser::{launcher, Intent, Session, Surface};
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::report;
use crate::wallet::{
    actions, approval, extension, network, onboarding, ApprovalOptions, PopupListener,
};

/// Dispatch a CLI command, returning the record to emit
pub async fn dispatch(command: Commands) -> Result<Value> {
    let mut config = Config::load()?;

    match command {
        Commands::Launch {
            visible,
            keep_open,
            port,
        } => {
            if visible {
                config.browser.headless = false;
            }
            if keep_open {
                config.browser.keep_open = true;
            }
            if let Some(port) = port {
                config.browser.debug_port = port;
            }

            report::info("starting browser session");
            let session = Session::ensure(&config).await?;
            let identity = extension::resolve_identity(session.client(), &config).await?;

            Ok(report::ok(json!({
                "reattached": session.reattached(),
                "port": session.port(),
                "state": session.state().to_string(),
                "extensionId": identity.id,
                "extensionVerified": identity.verified,
            })))
        }

        Commands::Navigate { url } => {
            if url.trim().is_empty() {
                return Err(Error::InvalidArgument("navigate needs a URL".to_string()));
            }
            let session = Session::ensure(&config).await?;
            session.primary_page()?.navigate(&url).await?;
            let record = report::ok(json!({ "url": url }));
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::Click {
            target,
            by_text,
            by_test_id,
        } => {
            let session = Session::ensure(&config).await?;
            let intent = intent_for(&target, by_text, by_test_id)?;
            let outcome = actions::perform_action(
                session.primary_page()?,
                &[intent],
                &action_options(&config),
            )
            .await;
            let record = json!({ "success": outcome.success, "action": outcome.to_record() });
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::Fill { target, value } => {
            let session = Session::ensure(&config).await?;
            let outcome = actions::perform_fill(
                session.primary_page()?,
                &[Intent::css(&target)],
                &value,
                &action_options(&config),
            )
            .await;
            let record = json!({ "success": outcome.success, "action": outcome.to_record() });
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::Approve {
            timeout_ms,
            trigger,
        } => {
            if timeout_ms == Some(0) {
                return Err(Error::InvalidArgument(
                    "timeout-ms must be greater than zero".to_string(),
                ));
            }

            let session = Session::ensure(&config).await?;
            let identity = extension::resolve_identity(session.client(), &config).await?;

            let mut listener =
                PopupListener::new(Arc::new(session.client().clone()));

            // Arm before the trigger fires; a popup that opens and closes
            // within milliseconds is still caught
            if let Some(selector) = &trigger {
                listener.arm();
                report::info("clicking trigger with popup listener armed");
                let clicked = actions::perform_action(
                    session.primary_page()?,
                    &[Intent::css(selector), Intent::text(selector)],
                    &action_options(&config),
                )
                .await;
                if !clicked.success {
                    tracing::warn!(selector = %selector, "trigger click did not land");
                }
            }

            let opts = approval_options(&config, timeout_ms)?;
            let report_out = approval::drive_approval(
                &mut listener,
                &identity,
                Some(session.primary_page()?),
                &opts,
            )
            .await?;

            let mut record = report_out.to_record();
            if !identity.verified {
                record["extensionVerified"] = json!(false);
            }
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::SetupWallet => {
            let session = Session::ensure(&config).await?;
            let identity = extension::resolve_identity(session.client(), &config).await?;
            report::info("driving wallet onboarding");
            let record = onboarding::setup_wallet(
                session.client(),
                &identity,
                &action_options(&config),
            )
            .await?;
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::SwitchNetwork { network: name } => {
            let session = Session::ensure(&config).await?;
            let settled = network::switch_network(session.primary_page()?, &name).await?;
            let record = provider_record(settled, json!({ "network": name }));
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::Address => {
            let session = Session::ensure(&config).await?;
            let settled = network::accounts(session.primary_page()?).await?;
            let record = provider_record(settled, json!({}));
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::Eval { expression } => {
            let session = Session::ensure(&config).await?;
            let record = match session.primary_page()?.evaluate(&expression, true).await {
                Ok(value) => report::ok(json!({ "value": value })),
                // A throwing expression is the agent's data, not our failure
                Err(Error::ScriptFailed(message)) => {
                    json!({ "success": false, "error": message })
                }
                Err(e) => return Err(e),
            };
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::Screenshot { path } => {
            let session = Session::ensure(&config).await?;
            let path = match path {
                Some(path) => path,
                None => paths::ensure_dir(paths::screenshots_dir())?.join("screenshot.png"),
            };
            session.primary_page()?.screenshot(&path).await?;
            let record = report::ok(json!({ "path": path }));
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::Pages => {
            let session = Session::ensure(&config).await?;
            let targets = session.client().get_targets().await?;
            let pages: Vec<Value> = targets
                .iter()
                .map(|t| {
                    json!({
                        "id": t.target_id,
                        "type": t.kind,
                        "url": t.url,
                        "attached": t.attached,
                    })
                })
                .collect();
            let record = report::ok(json!({ "count": pages.len(), "pages": pages }));
            release_if_ephemeral(session, &config).await;
            Ok(record)
        }

        Commands::Status => status(&config).await,

        Commands::Teardown => {
            match Session::try_attach(&config).await? {
                Some(mut session) => {
                    session.teardown().await;
                    Ok(report::ok(json!({ "closed": true })))
                }
                None => {
                    // Nothing reachable; clear any leftover pointer anyway
                    launcher::SessionPointer::remove(&paths::session_pointer_path());
                    Ok(report::ok(json!({ "closed": false })))
                }
            }
        }
    }
}

/// Status never launches a browser; it only observes
async fn status(config: &Config) -> Result<Value> {
    let pointer_path = paths::session_pointer_path();
    let Some(pointer) = launcher::SessionPointer::load(&pointer_path) else {
        return Ok(report::ok(json!({ "sessionActive": false })));
    };

    if launcher::probe_endpoint(pointer.port).await.is_none() {
        return Ok(report::ok(json!({
            "sessionActive": false,
            "stalePointer": true,
            "port": pointer.port,
        })));
    }

    match Session::try_attach(config).await? {
        Some(session) => {
            let targets = session.client().get_targets().await?;
            let identity = extension::identity_from_targets(&targets);
            let mut record = report::ok(json!({
                "sessionActive": true,
                "port": pointer.port,
                "createdAtMs": pointer.created_at_ms,
                "openPages": targets.iter().filter(|t| t.is_page_like()).count(),
            }));
            if let Some(identity) = identity {
                record["extensionId"] = json!(identity.id);
                record["extensionVerified"] = json!(identity.verified);
            }
            Ok(record)
        }
        None => Ok(report::ok(json!({ "sessionActive": false }))),
    }
}

/// Build the intent for an explicit click target
fn intent_for(target: &str, by_text: bool, by_test_id: bool) -> Result<Intent> {
    if by_text && by_test_id {
        return Err(Error::InvalidArgument(
            "--by-text and --by-test-id are mutually exclusive".to_string(),
        ));
    }
    Ok(if by_text {
        Intent::text(target)
    } else if by_test_id {
        Intent::test_id(target)
    } else {
        Intent::css(target)
    })
}

fn action_options(config: &Config) -> actions::ActionOptions {
    actions::ActionOptions {
        retries: config.timeouts.action_retries,
        backoff: Duration::from_millis(config.timeouts.action_backoff_ms),
        click_timeout: Duration::from_millis(config.timeouts.action_click_ms),
    }
}

fn approval_options(config: &Config, timeout_ms: Option<u64>) -> Result<ApprovalOptions> {
    let popup_wait = timeout_ms.unwrap_or(config.timeouts.popup_wait_ms);
    if popup_wait == 0 {
        return Err(Error::InvalidArgument(
            "popup wait must be greater than zero".to_string(),
        ));
    }

    let screenshot_dir: PathBuf = paths::ensure_dir(paths::screenshots_dir())?;
    Ok(ApprovalOptions {
        popup_timeout: Duration::from_millis(popup_wait),
        settle: Duration::from_millis(config.timeouts.settle_ms),
        poll_interval: Duration::from_millis(config.timeouts.close_poll_ms),
        close_wait: Duration::from_millis(config.timeouts.close_wait_ms),
        screenshot_dir: Some(screenshot_dir),
        intents: actions::affirmative_intents(),
        action: action_options(config),
    })
}

/// Shape a settled provider call into a record, verbatim
fn provider_record(settled: Value, extra: Value) -> Value {
    let ok = settled["ok"].as_bool().unwrap_or(false);
    let mut record = if ok {
        report::ok(json!({ "value": settled["value"] }))
    } else {
        json!({
            "success": false,
            "error": settled["error"].as_str().unwrap_or("provider call failed"),
        })
    };
    if let (Some(base), Some(more)) = (record.as_object_mut(), extra.as_object()) {
        for (key, value) in more {
            base.insert(key.clone(), value.clone());
        }
    }
    record
}

/// A session launched fresh just for this command is closed again unless the
/// configuration keeps it open. Reattached sessions are always left running.
async fn release_if_ephemeral(mut session: Session, config: &Config) {
    if !session.reattached() && !config.browser.keep_open {
        session.teardown().await;
    }
}
