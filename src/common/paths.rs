//! Filesystem locations for configuration and per-session state
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/wallet-pilot/`, `~/.local/share/wallet-pilot/`
//! - macOS: `~/Library/Application Support/wallet-pilot/`
//! - Windows: `%APPDATA%\wallet-pilot\`
//!
//! Everything that must survive between invocations (browser profile, session
//! pointer, screenshots, logs) lives under the state directory. It can be
//! relocated wholesale with `WALLET_PILOT_STATE_DIR`, which the test suite
//! uses to keep runs hermetic.

use std::io;
use std::path::PathBuf;

const APP_NAME: &str = "wallet-pilot";

/// Root directory for mutable state (profile, pointer, screenshots, logs)
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WALLET_PILOT_STATE_DIR") {
        return PathBuf::from(dir);
    }

    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

/// Persistent browser profile; reattachment depends on this surviving teardown
pub fn profile_dir() -> PathBuf {
    state_dir().join("profile")
}

/// Sidecar record naming the live debugging endpoint
pub fn session_pointer_path() -> PathBuf {
    state_dir().join("session.json")
}

/// Where diagnostic screenshots land
pub fn screenshots_dir() -> PathBuf {
    state_dir().join("screenshots")
}

/// Log directory for the file layer
pub fn log_dir() -> PathBuf {
    state_dir().join("logs")
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    if std::env::var("WALLET_PILOT_STATE_DIR").is_ok() {
        return Some(state_dir().join("config"));
    }
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Credentials sidecar: import secret in, generated unlock password out.
/// Deliberately kept beside the config, away from per-session state.
pub fn credentials_path() -> PathBuf {
    config_dir()
        .map(|dir| dir.join("credentials.toml"))
        .unwrap_or_else(|| state_dir().join("credentials.toml"))
}

/// Ensure a directory exists, returning it for chaining
pub fn ensure_dir(dir: PathBuf) -> io::Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_dir_is_valid() {
        let dir = state_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn pointer_lives_under_state_dir() {
        assert!(session_pointer_path().starts_with(state_dir()));
    }
}
