//! Network catalog and provider-call helpers
//!
//! Thin request/response wrappers around the page's injected provider. One
//! call, settled value or error message verbatim, no retry — a rejected or
//! pending wallet confirmation is the agent's business, handled via
//! `approve`.

use serde_json::{json, Value};

use crate::browser::Page;
use crate::common::{Error, Result};

/// Human-readable network name → EIP-155 chain id (hex)
pub const NETWORKS: &[(&str, &str)] = &[
    ("mainnet", "0x1"),
    ("sepolia", "0xaa36a7"),
    ("polygon", "0x89"),
    ("bsc", "0x38"),
    ("arbitrum", "0xa4b1"),
    ("optimism", "0xa"),
    ("base", "0x2105"),
    ("localhost", "0x539"),
];

/// Look up a chain id by network name
pub fn chain_id(name: &str) -> Option<&'static str> {
    let name = name.to_ascii_lowercase();
    NETWORKS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, id)| *id)
}

fn known_networks() -> String {
    NETWORKS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// JS that issues one provider request and settles to `{ok, value|error}`
fn provider_request_js(method: &str, params: Value) -> String {
    format!(
        r#"(() => {{
            if (!window.ethereum) {{
                return Promise.resolve({{ ok: false, error: 'no injected provider' }});
            }}
            return window.ethereum
                .request({{ method: {method}, params: {params} }})
                .then((value) => ({{ ok: true, value: value === undefined ? null : value }}))
                .catch((e) => ({{ ok: false, error: String((e && e.message) || e) }}));
        }})()"#,
        method = serde_json::to_string(method).unwrap_or_default(),
        params = params,
    )
}

/// Ask the wallet to switch the page to a cataloged network
///
/// The wallet may answer with a confirmation popup (network add); that is
/// driven separately by `approve`.
pub async fn switch_network(page: &Page, name: &str) -> Result<Value> {
    let id = chain_id(name).ok_or_else(|| Error::UnknownNetwork {
        name: name.to_string(),
        known: known_networks(),
    })?;

    let script = provider_request_js(
        "wallet_switchEthereumChain",
        json!([{ "chainId": id }]),
    );
    page.evaluate(&script, true).await
}

/// Query the accounts the page is currently connected to
pub async fn accounts(page: &Page) -> Result<Value> {
    let script = provider_request_js("eth_accounts", json!([]));
    page.evaluate(&script, true).await
}

/// Query the chain the page currently sees
pub async fn current_chain(page: &Page) -> Result<Value> {
    let script = provider_request_js("eth_chainId", json!([]));
    page.evaluate(&script, true).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookups() {
        assert_eq!(chain_id("mainnet"), Some("0x1"));
        assert_eq!(chain_id("Polygon"), Some("0x89"));
        assert_eq!(chain_id("localhost"), Some("0x539"));
        assert_eq!(chain_id("dogenet"), None);
    }

    #[test]
    fn provider_js_embeds_method_and_params() {
        let js = provider_request_js("wallet_switchEthereumChain", json!([{ "chainId": "0x89" }]));
        assert!(js.contains("\"wallet_switchEthereumChain\""));
        assert!(js.contains("\"chainId\":\"0x89\""));
        assert!(js.contains("window.ethereum"));
    }
}
