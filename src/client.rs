//! Main WeChat client implementation.
//!
//! `WeChatClient` wires the credential store, token manager, media uploader
//! and publisher together. It is the single entry point the local web layer
//! calls: `publish` takes a generated draft and returns the attempt's
//! [`PublishResult`].

use crate::auth::{TokenInfo, TokenManager};
use crate::content::{ContentDraft, PublishOptions};
use crate::error::{Result, WeChatError};
use crate::http::WeChatHttpClient;
use crate::media::{MediaReference, MediaUploader};
use crate::publisher::{PublishResult, Publisher};
use crate::store::CredentialStore;
use crate::utils;
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Client for one Official Account.
#[derive(Debug)]
pub struct WeChatClient {
    token_manager: Arc<TokenManager>,
    media_uploader: Arc<MediaUploader>,
    publisher: Publisher,
}

impl WeChatClient {
    /// Creates a client from an AppID/AppSecret pair.
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Result<Self> {
        Self::build(
            app_id.into(),
            SecretString::from(app_secret.into()),
            None,
            None,
        )
    }

    /// Creates a client from persisted credentials, seeding the token cache
    /// with a still-valid stored token.
    ///
    /// Surfaces `NotConfigured` when the store holds no usable record; the
    /// caller shows a setup form for that, it is not a crash.
    pub async fn from_store(store: CredentialStore) -> Result<Self> {
        let credentials = store.load().await?;
        let client = Self::build(
            credentials.app_id.clone(),
            credentials.app_secret.clone(),
            Some(Arc::new(store)),
            None,
        )?;
        client
            .token_manager
            .seed_from_credentials(&credentials)
            .await;
        Ok(client)
    }

    /// Same as [`WeChatClient::new`] but against a custom API host. Used by
    /// tests to target a local mock server.
    pub fn with_base_url(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Self::build(
            app_id.into(),
            SecretString::from(app_secret.into()),
            None,
            Some(base_url.into()),
        )
    }

    fn build(
        app_id: String,
        app_secret: SecretString,
        store: Option<Arc<CredentialStore>>,
        base_url: Option<String>,
    ) -> Result<Self> {
        utils::validate_app_credentials(&app_id, app_secret.expose_secret())
            .map_err(WeChatError::config_error)?;

        let http_client = Arc::new(match base_url {
            Some(url) => WeChatHttpClient::with_base_url(url)?,
            None => WeChatHttpClient::new()?,
        });

        let mut token_manager = TokenManager::new(app_id, app_secret, Arc::clone(&http_client));
        if let Some(store) = store {
            token_manager = token_manager.with_store(store);
        }
        let token_manager = Arc::new(token_manager);

        let media_uploader = Arc::new(MediaUploader::new(
            Arc::clone(&http_client),
            Arc::clone(&token_manager),
        ));
        let publisher = Publisher::new(
            http_client,
            Arc::clone(&token_manager),
            Arc::clone(&media_uploader),
        );

        Ok(Self {
            token_manager,
            media_uploader,
            publisher,
        })
    }

    /// Runs one publish attempt for a generated draft.
    pub async fn publish(&self, draft: &ContentDraft) -> PublishResult {
        self.publish_with_options(draft, &PublishOptions::new())
            .await
    }

    /// Runs one publish attempt with explicit options.
    pub async fn publish_with_options(
        &self,
        draft: &ContentDraft,
        options: &PublishOptions,
    ) -> PublishResult {
        info!(title = %draft.title, auto_publish = options.auto_publish, "starting publish attempt");
        self.publisher.publish(draft, options).await
    }

    /// Uploads a single image as permanent material.
    pub async fn upload_image(&self, path: &Path) -> Result<MediaReference> {
        self.media_uploader.upload(path).await
    }

    /// Forces a token refresh.
    pub async fn refresh_token(&self) -> Result<String> {
        self.token_manager.force_refresh().await
    }

    /// Cached token lifetime, for diagnostics.
    pub async fn token_info(&self) -> Option<TokenInfo> {
        self.token_manager.get_token_info().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_with_invalid_credentials() {
        assert!(WeChatClient::new("invalid", "12345678901234567890123456789012").is_err());
        assert!(WeChatClient::new("wx1234567890123456", "short").is_err());
        assert!(WeChatClient::new("", "").is_err());
    }

    #[test]
    fn test_client_creation_with_valid_credentials() {
        let result = WeChatClient::new("wx1234567890123456", "12345678901234567890123456789012");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_from_store_without_config_is_setup_condition() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("config.json"));
        let err = WeChatClient::from_store(store).await.unwrap_err();
        assert!(matches!(err, WeChatError::NotConfigured));
    }
}
