//! Configuration file handling
//!
//! All recognized options live in this one validated structure; there is no
//! free-form option bag. Unknown keys in the TOML file are rejected rather
//! than silently ignored.

use serde::Deserialize;
use std::path::PathBuf;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Wallet extension settings
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Browser launch and reattachment settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserConfig {
    /// Explicit browser binary; otherwise PATH is searched
    pub binary: Option<PathBuf>,

    /// Run without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Remote debugging port for fresh launches
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    /// Unpacked wallet extension to load on fresh launches
    pub extension_dir: Option<PathBuf>,

    /// Leave the browser running after the command finishes; reattachment
    /// between invocations depends on this
    #[serde(default = "default_keep_open")]
    pub keep_open: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: None,
            headless: default_headless(),
            debug_port: default_debug_port(),
            extension_dir: None,
            keep_open: default_keep_open(),
        }
    }
}

fn default_headless() -> bool {
    true
}
fn default_debug_port() -> u16 {
    9222
}
fn default_keep_open() -> bool {
    true
}

/// Which wallet extension is installed
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    #[default]
    Metamask,
}

/// Wallet extension settings
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct WalletConfig {
    /// Installed wallet flavor; fixes the set of recognized internal pages
    #[serde(default)]
    pub kind: WalletKind,

    /// Override for the last-known extension id used when live detection fails
    pub fallback_extension_id: Option<String>,
}

/// Timeout settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timeouts {
    /// How long `approve` waits for a popup surface to appear
    #[serde(default = "default_popup_wait")]
    pub popup_wait_ms: u64,

    /// Settle interval after the first approval click, before re-checking
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// Poll interval while waiting for the popup to close
    #[serde(default = "default_close_poll")]
    pub close_poll_ms: u64,

    /// Total wait for the popup to close after approvals
    #[serde(default = "default_close_wait")]
    pub close_wait_ms: u64,

    /// Bound on a single direct click attempt
    #[serde(default = "default_click")]
    pub action_click_ms: u64,

    /// Backoff between action-driver retries
    #[serde(default = "default_backoff")]
    pub action_backoff_ms: u64,

    /// Action-driver retry budget
    #[serde(default = "default_retries")]
    pub action_retries: u32,

    /// Timeout for individual DevTools requests
    #[serde(default = "default_cdp_request")]
    pub cdp_request_secs: u64,

    /// How long to wait for a freshly launched browser's debug endpoint
    #[serde(default = "default_launch_wait")]
    pub launch_wait_secs: u64,

    /// Bounded wait for the extension's background worker to register
    #[serde(default = "default_worker_wait")]
    pub extension_worker_wait_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            popup_wait_ms: default_popup_wait(),
            settle_ms: default_settle(),
            close_poll_ms: default_close_poll(),
            close_wait_ms: default_close_wait(),
            action_click_ms: default_click(),
            action_backoff_ms: default_backoff(),
            action_retries: default_retries(),
            cdp_request_secs: default_cdp_request(),
            launch_wait_secs: default_launch_wait(),
            extension_worker_wait_ms: default_worker_wait(),
        }
    }
}

fn default_popup_wait() -> u64 {
    30_000
}
fn default_settle() -> u64 {
    2_000
}
fn default_close_poll() -> u64 {
    500
}
fn default_close_wait() -> u64 {
    10_000
}
fn default_click() -> u64 {
    2_000
}
fn default_backoff() -> u64 {
    500
}
fn default_retries() -> u32 {
    3
}
fn default_cdp_request() -> u64 {
    30
}
fn default_launch_wait() -> u64 {
    20
}
fn default_worker_wait() -> u64 {
    3_000
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if the file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content =
                    std::fs::read_to_string(&path).map_err(|e| super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    })?;
                return toml::from_str(&content)
                    .map_err(|e| super::Error::ConfigParse(e.to_string()));
            }
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.browser.headless);
        assert_eq!(config.browser.debug_port, 9222);
        assert_eq!(config.timeouts.popup_wait_ms, 30_000);
        assert_eq!(config.timeouts.action_retries, 3);
        assert_eq!(config.wallet.kind, WalletKind::Metamask);
    }

    #[test]
    fn parses_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [browser]
            headless = false
            debug_port = 9333

            [timeouts]
            popup_wait_ms = 5000
            "#,
        )
        .unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.browser.debug_port, 9333);
        assert_eq!(config.timeouts.popup_wait_ms, 5000);
        // untouched sections keep their defaults
        assert_eq!(config.timeouts.close_wait_ms, 10_000);
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
            [browser]
            healdess = true
            "#,
        );
        assert!(result.is_err());
    }
}
