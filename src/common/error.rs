//! Error types for the wallet-pilot CLI
//!
//! Only *structural* failures live here: a missing session, a dead browser
//! connection, malformed arguments. Expected flakiness (a popup that never
//! appears, a button that never becomes clickable) is carried in result
//! records instead, so the calling agent can react without parsing panics.
//! Error messages are designed to be clear and actionable for LLM agents.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet-pilot CLI
#[derive(Error, Debug)]
pub enum Error {
    // === Session Errors ===
    #[error("No active browser session. Use 'wallet-pilot launch' first")]
    SessionNotActive,

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Browser debugging endpoint did not come up within {0} seconds")]
    LaunchTimeout(u64),

    #[error("No Chromium-based browser found. Searched: {searched}")]
    BrowserNotFound { searched: String },

    #[error("Browser connection lost: {0}")]
    ConnectionLost(String),

    // === CDP Protocol Errors ===
    #[error("DevTools protocol error: {0}")]
    CdpProtocol(String),

    #[error("DevTools request '{method}' failed: {message}")]
    CdpRequestFailed { method: String, message: String },

    #[error("DevTools request '{0}' timed out after {1} seconds")]
    CdpTimeout(String, u64),

    // === Page Errors ===
    #[error("Script evaluation failed: {0}")]
    ScriptFailed(String),

    #[error("Target {0} is no longer open")]
    TargetGone(String),

    // === Argument Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown network '{name}'. Known networks: {known}")]
    UnknownNetwork { name: String, known: String },

    // === Secrets Errors ===
    #[error("Credentials file has no 'import_secret'. Add it to {0} before running setup-wallet")]
    ImportSecretMissing(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a CDP request failed error
    pub fn cdp_request_failed(method: &str, message: &str) -> Self {
        Self::CdpRequestFailed {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a browser-not-found error with search candidates
    pub fn browser_not_found<S: AsRef<str>>(candidates: &[S]) -> Self {
        Self::BrowserNotFound {
            searched: candidates
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// A short remediation hint for the calling agent, where one exists
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::SessionNotActive => {
                Some("Run 'wallet-pilot launch' to start or reattach a browser session")
            }
            Self::LaunchFailed(_) | Self::LaunchTimeout(_) => {
                Some("Check that the browser binary works and the debug port is free")
            }
            Self::BrowserNotFound { .. } => {
                Some("Install Chrome/Chromium or set [browser].binary in the config file")
            }
            Self::ConnectionLost(_) => {
                Some("The browser likely exited; run 'wallet-pilot launch' again")
            }
            Self::ImportSecretMissing(_) => {
                Some("Write the wallet's recovery secret under the 'import_secret' key")
            }
            _ => None,
        }
    }
}
