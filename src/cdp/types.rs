//! DevTools protocol message types
//!
//! Only the envelopes and the Target-domain structures the engine actually
//! touches; everything else stays as raw `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer from the `/json/version` HTTP probe
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// Outgoing command envelope
#[derive(Debug, Serialize)]
pub struct CommandEnvelope {
    pub id: u64,
    pub method: String,
    pub params: Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Incoming message, either a response (has `id`) or an event (has `method`)
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub id: Option<u64>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub result: Value,
    pub error: Option<CdpErrorBody>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Error body of a failed command
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorBody {
    pub code: Option<i64>,
    pub message: String,
}

/// One browser target, as reported by the Target domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attached: bool,
}

impl TargetInfo {
    /// Page-like targets are the only ones that can carry a wallet popup
    pub fn is_page_like(&self) -> bool {
        matches!(self.kind.as_str(), "page" | "popup") && !self.url.starts_with("devtools://")
    }

    /// Background workers register under the extension's own scheme
    pub fn is_extension_worker(&self) -> bool {
        matches!(self.kind.as_str(), "service_worker" | "background_page")
            && self.url.starts_with("chrome-extension://")
    }
}

/// Body of `Target.getTargets`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetsResult {
    pub target_infos: Vec<TargetInfo>,
}

/// Body of `Target.attachToTarget`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachResult {
    pub session_id: String,
}

/// Body of `Target.createTarget`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResult {
    pub target_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_response_envelopes() {
        let event: IncomingMessage = serde_json::from_str(
            r#"{"method":"Target.targetCreated","params":{"targetInfo":{"targetId":"T1","type":"page","url":"about:blank"}}}"#,
        )
        .unwrap();
        assert_eq!(event.method.as_deref(), Some("Target.targetCreated"));
        assert!(event.id.is_none());

        let response: IncomingMessage =
            serde_json::from_str(r#"{"id":3,"result":{"sessionId":"S1"},"sessionId":"S0"}"#)
                .unwrap();
        assert_eq!(response.id, Some(3));
        assert_eq!(response.session_id.as_deref(), Some("S0"));
    }

    #[test]
    fn target_classification() {
        let page: TargetInfo = serde_json::from_str(
            r#"{"targetId":"T1","type":"page","url":"https://app.example"}"#,
        )
        .unwrap();
        assert!(page.is_page_like());
        assert!(!page.is_extension_worker());

        let worker: TargetInfo = serde_json::from_str(
            r#"{"targetId":"T2","type":"service_worker","url":"chrome-extension://abc/background.js"}"#,
        )
        .unwrap();
        assert!(worker.is_extension_worker());
        assert!(!worker.is_page_like());

        let devtools: TargetInfo = serde_json::from_str(
            r#"{"targetId":"T3","type":"page","url":"devtools://devtools/bundled/devtools_app.html"}"#,
        )
        .unwrap();
        assert!(!devtools.is_page_like());
    }
}
