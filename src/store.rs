//! Local persistence for account credentials and the cached access token.
//!
//! A single JSON file holds the AppID, AppSecret and the last token with its
//! expiry. The secret fields never appear in `Debug` output, error messages
//! or log lines; on Unix the file is written with mode 0600.

use crate::error::{Result, WeChatError};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// The singleton credential record.
#[derive(Clone)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: SecretString,
    pub access_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: SecretString::from(app_secret.into()),
            access_token: None,
            token_expires_at: None,
        }
    }

    /// True while the stored token may still be presented to the platform.
    pub fn token_is_valid(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.token_expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at,
            _ => false,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_expires_at", &self.token_expires_at)
            .finish()
    }
}

/// On-disk shape. Kept separate so the in-memory type can wrap the secret.
#[derive(Serialize, Deserialize)]
struct PersistedCredentials {
    app_id: String,
    app_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_expires_at: Option<DateTime<Utc>>,
}

/// File-backed store. Writes are serialized behind an async mutex so
/// concurrent refreshes cannot interleave partial files.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the credential record.
    ///
    /// A missing file or empty AppID/AppSecret is `NotConfigured`: a setup
    /// condition the caller surfaces to the operator, not a crash.
    pub async fn load(&self) -> Result<Credentials> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(WeChatError::NotConfigured);
            }
            Err(err) => return Err(err.into()),
        };

        let persisted: PersistedCredentials =
            serde_json::from_slice(&raw).map_err(|_| WeChatError::NotConfigured)?;

        if persisted.app_id.trim().is_empty() || persisted.app_secret.trim().is_empty() {
            return Err(WeChatError::NotConfigured);
        }

        debug!(path = %self.path.display(), "loaded credentials");
        Ok(Credentials {
            app_id: persisted.app_id,
            app_secret: SecretString::from(persisted.app_secret),
            access_token: persisted.access_token,
            token_expires_at: persisted.token_expires_at,
        })
    }

    /// Persists the record, overwriting any previous content.
    pub async fn save(&self, credentials: &Credentials) -> Result<()> {
        let persisted = PersistedCredentials {
            app_id: credentials.app_id.clone(),
            app_secret: credentials.app_secret.expose_secret().to_string(),
            access_token: credentials.access_token.clone(),
            token_expires_at: credentials.token_expires_at,
        };
        let body = serde_json::to_vec_pretty(&persisted)?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // The file holds the AppSecret: it must never exist with looser
        // permissions, so the mode is set at creation, not after the write.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            use tokio::io::AsyncWriteExt;

            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .await?;
            file.write_all(&body).await?;
            file.flush().await?;
            // An existing file keeps its old mode through OpenOptions;
            // tighten it as well.
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        #[cfg(not(unix))]
        tokio::fs::write(&self.path, body).await?;

        debug!(path = %self.path.display(), "saved credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("config.json"))
    }

    #[tokio::test]
    async fn test_load_missing_file_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(matches!(
            store.load().await,
            Err(WeChatError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut credentials =
            Credentials::new("wx1234567890123456", "12345678901234567890123456789012");
        credentials.access_token = Some("TOKEN_A".to_string());
        credentials.token_expires_at = Some(Utc::now() + Duration::hours(2));

        store.save(&credentials).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.app_id, "wx1234567890123456");
        assert_eq!(
            loaded.app_secret.expose_secret(),
            "12345678901234567890123456789012"
        );
        assert_eq!(loaded.access_token.as_deref(), Some("TOKEN_A"));
        assert!(loaded.token_is_valid(Utc::now()));
    }

    #[tokio::test]
    async fn test_empty_fields_are_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let credentials = Credentials::new("", "");
        store.save(&credentials).await.unwrap();

        assert!(matches!(
            store.load().await,
            Err(WeChatError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_garbage_file_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), b"not json").await.unwrap();

        assert!(matches!(
            store.load().await,
            Err(WeChatError::NotConfigured)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions_are_restrictive() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let credentials =
            Credentials::new("wx1234567890123456", "12345678901234567890123456789012");
        store.save(&credentials).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_tightens_existing_loose_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        // A pre-existing world-readable file must not stay that way.
        std::fs::write(store.path(), b"{}").unwrap();
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        let credentials =
            Credentials::new("wx1234567890123456", "12345678901234567890123456789012");
        store.save(&credentials).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut credentials =
            Credentials::new("wx1234567890123456", "12345678901234567890123456789012");
        credentials.access_token = Some("TOKEN_A".to_string());

        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("wx1234567890123456"));
        assert!(!rendered.contains("12345678901234567890123456789012"));
        assert!(!rendered.contains("TOKEN_A"));
    }

    #[test]
    fn test_token_validity_window() {
        let mut credentials =
            Credentials::new("wx1234567890123456", "12345678901234567890123456789012");
        let now = Utc::now();

        assert!(!credentials.token_is_valid(now));

        credentials.access_token = Some("TOKEN_A".to_string());
        credentials.token_expires_at = Some(now + Duration::hours(1));
        assert!(credentials.token_is_valid(now));

        credentials.token_expires_at = Some(now - Duration::seconds(1));
        assert!(!credentials.token_is_valid(now));
    }
}
