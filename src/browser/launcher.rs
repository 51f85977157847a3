//! Browser process launch and reattachment
//!
//! A fresh launch spawns the browser detached with a remote-debugging port
//! and records a session pointer sidecar; the next invocation probes that
//! port's `/json/version` endpoint and reattaches instead of relaunching.
//! The persistent profile keeps the wallet's import/unlock state between
//! sessions; this module only opens it, it never owns it.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cdp::VersionInfo;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};

/// Binaries searched on PATH, in preference order
const BROWSER_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Interval between endpoint probes while the browser starts up
const LAUNCH_PROBE_INTERVAL: Duration = Duration::from_millis(300);

/// Sidecar record naming the live debugging endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPointer {
    pub port: u16,
    pub created_at_ms: u64,
}

impl SessionPointer {
    pub fn new(port: u16) -> Self {
        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { port, created_at_ms }
    }

    /// Read the sidecar; absent or unparseable both mean "no prior session"
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Write the sidecar atomically (temp file + rename)
    pub fn store(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::Internal("pointer path has no parent".to_string()))?;
        std::fs::create_dir_all(dir)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::write(tmp.path(), serde_json::to_string_pretty(self)?)?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Remove the sidecar if present
    pub fn remove(path: &Path) {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Probe a debugging endpoint, returning its WebSocket URL if it answers
pub async fn probe_endpoint(port: u16) -> Option<String> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .ok()?;

    let response = client.get(&url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let version: VersionInfo = response.json().await.ok()?;
    Some(version.web_socket_debugger_url)
}

/// Locate the browser binary: explicit config first, then PATH
pub fn find_browser(config: &Config) -> Result<PathBuf> {
    if let Some(binary) = &config.browser.binary {
        if binary.exists() {
            return Ok(binary.clone());
        }
        return Err(Error::LaunchFailed(format!(
            "configured browser binary not found: {}",
            binary.display()
        )));
    }

    for candidate in BROWSER_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            return Ok(path);
        }
    }

    Err(Error::browser_not_found(BROWSER_CANDIDATES))
}

/// Launch a fresh browser and wait for its debugging endpoint
///
/// The process is spawned detached so it outlives this invocation; the
/// returned WebSocket URL is ready to connect. Launch failure is fatal and
/// not retried — restarting a browser process automatically would only mask
/// environment problems.
pub async fn launch(config: &Config) -> Result<(String, SessionPointer)> {
    let binary = find_browser(config)?;
    let port = config.browser.debug_port;
    let profile = paths::ensure_dir(paths::profile_dir())?;

    let mut command = std::process::Command::new(&binary);
    command
        .arg(format!("--remote-debugging-port={}", port))
        .arg(format!("--user-data-dir={}", profile.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-timer-throttling");

    if config.browser.headless {
        // "new" headless supports extensions, unlike the legacy mode
        command.arg("--headless=new");
    }

    if let Some(extension_dir) = &config.browser.extension_dir {
        command
            .arg(format!(
                "--disable-extensions-except={}",
                extension_dir.display()
            ))
            .arg(format!("--load-extension={}", extension_dir.display()));
    }

    command
        .arg("about:blank")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    tracing::info!(binary = %binary.display(), port, "launching browser");
    command
        .spawn()
        .map_err(|e| Error::LaunchFailed(format!("{}: {}", binary.display(), e)))?;

    // Wait for the endpoint to come up
    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(config.timeouts.launch_wait_secs);
    loop {
        if let Some(ws_url) = probe_endpoint(port).await {
            let pointer = SessionPointer::new(port);
            pointer.store(&paths::session_pointer_path())?;
            return Ok((ws_url, pointer));
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::LaunchTimeout(config.timeouts.launch_wait_secs));
        }
        tokio::time::sleep(LAUNCH_PROBE_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let pointer = SessionPointer::new(9222);
        pointer.store(&path).unwrap();

        let loaded = SessionPointer::load(&path).unwrap();
        assert_eq!(loaded.port, 9222);
        assert_eq!(loaded.created_at_ms, pointer.created_at_ms);

        SessionPointer::remove(&path);
        assert!(SessionPointer::load(&path).is_none());
    }

    #[test]
    fn garbage_pointer_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(SessionPointer::load(&path).is_none());
    }
}
