//! Credentials sidecar
//!
//! The wallet's import secret and the generated unlock password live in a
//! small TOML file beside the config, outside the automation engine's own
//! state. The engine reads/writes exactly these two fields and never logs
//! their values; the `Debug` impl redacts them so a stray `{:?}` can't leak.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Error, Result};

/// The two recognized credential fields
#[derive(Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Recovery phrase or private key used to import the wallet
    pub import_secret: Option<String>,

    /// Unlock password; generated on first use and persisted for reattachment
    pub unlock_password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("import_secret", &self.import_secret.as_ref().map(|_| "<redacted>"))
            .field("unlock_password", &self.unlock_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Load the sidecar; a missing file yields empty credentials
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Replace the sidecar atomically (temp file + rename, whole file at once)
    pub fn store(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::Internal("credentials path has no parent".to_string()))?;
        std::fs::create_dir_all(dir)?;

        let body = toml::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("serialize credentials: {}", e)))?;

        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::write(tmp.path(), body)?;
        tmp.persist(path)
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// The import secret, or a structural error naming the file to fix
    pub fn require_import_secret(&self, path: &Path) -> Result<&str> {
        self.import_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::ImportSecretMissing(path.display().to_string()))
    }

    /// The unlock password, generating and recording one if absent
    pub fn ensure_unlock_password(&mut self, path: &Path) -> Result<String> {
        if let Some(password) = self.unlock_password.clone() {
            return Ok(password);
        }
        let password = format!("wp-{}", Uuid::new_v4().simple());
        self.unlock_password = Some(password.clone());
        self.store(path)?;
        Ok(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_password_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");

        let mut creds = Credentials {
            import_secret: Some("test test test junk".to_string()),
            unlock_password: None,
        };
        let generated = creds.ensure_unlock_password(&path).unwrap();
        assert!(generated.starts_with("wp-"));

        let reloaded = Credentials::load(&path).unwrap();
        assert_eq!(reloaded.unlock_password.as_deref(), Some(generated.as_str()));
        assert_eq!(
            reloaded.import_secret.as_deref(),
            Some("test test test junk")
        );

        // same password on subsequent calls
        let mut reloaded = reloaded;
        assert_eq!(reloaded.ensure_unlock_password(&path).unwrap(), generated);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let creds = Credentials::load(&path).unwrap();
        assert!(creds.import_secret.is_none());
        assert!(creds.require_import_secret(&path).is_err());
    }

    #[test]
    fn debug_never_prints_values() {
        let creds = Credentials {
            import_secret: Some("super secret phrase".to_string()),
            unlock_password: Some("hunter2".to_string()),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("super secret"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
