//! Cover image upload as permanent material.
//!
//! Articles reference binary assets by `media_id`, so the asset must be
//! uploaded before the payload can be assembled. One remote call per asset;
//! a token-expired response gets a forced refresh and exactly one retry.

use crate::auth::TokenManager;
use crate::error::{Result, WeChatError};
use crate::http::{WeChatHttpClient, WeChatResponse};
use crate::utils;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Permanent image material is capped at 10 MB by the platform.
const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

const ADD_MATERIAL_PATH: &str = "/cgi-bin/material/add_material?type=image";

/// Platform handle for an uploaded asset, valid for at least the duration of
/// one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub media_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MaterialResponse {
    media_id: String,
    #[serde(default)]
    url: Option<String>,
}

/// Uploads binary assets and resolves them to [`MediaReference`]s.
#[derive(Debug)]
pub struct MediaUploader {
    http_client: Arc<WeChatHttpClient>,
    token_manager: Arc<TokenManager>,
}

impl MediaUploader {
    pub fn new(http_client: Arc<WeChatHttpClient>, token_manager: Arc<TokenManager>) -> Self {
        Self {
            http_client,
            token_manager,
        }
    }

    /// Uploads a local image as permanent material.
    ///
    /// Local precondition failures (missing file, wrong extension, oversize)
    /// are caught before any network call. Remote rejections map to
    /// `AssetRejected` and are not retried; a token-expired response is
    /// retried once after a forced refresh.
    pub async fn upload(&self, path: &Path) -> Result<MediaReference> {
        if !utils::file_exists(path).await {
            return Err(WeChatError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        if !utils::is_image_file(path) {
            return Err(WeChatError::config_error(
                "cover file is not a supported image format",
            ));
        }

        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > MAX_IMAGE_BYTES {
            return Err(WeChatError::config_error(format!(
                "cover file exceeds the {} MB material limit",
                MAX_IMAGE_BYTES / (1024 * 1024)
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("cover.jpg")
            .to_string();
        let mime_type = utils::image_mime_type(path);

        debug!(path = %path.display(), size = bytes.len(), "uploading cover material");

        let token = self.token_manager.get_access_token().await?;
        match self
            .upload_once(&token, bytes.clone(), file_name.clone(), mime_type)
            .await
        {
            Err(err) if err.is_token_expired() => {
                debug!("material upload hit expired token, refreshing once");
                let token = self.token_manager.force_refresh().await?;
                match self.upload_once(&token, bytes, file_name, mime_type).await {
                    Err(err) if err.is_token_expired() => {
                        Err(WeChatError::TokenExpiredRetryExhausted)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn upload_once(
        &self,
        token: &str,
        bytes: Vec<u8>,
        file_name: String,
        mime_type: &'static str,
    ) -> Result<MediaReference> {
        let response = self
            .http_client
            .post_media_with_token(ADD_MATERIAL_PATH, token, bytes, file_name, mime_type)
            .await?;

        let envelope: WeChatResponse<MaterialResponse> = response.json().await?;
        let material = envelope.into_result().map_err(|err| match err {
            // Anything the platform reports against the asset itself is
            // terminal for this attempt.
            WeChatError::RemoteRejected { code, message } => {
                WeChatError::AssetRejected { code, message }
            }
            other => other,
        })?;

        info!(media_id = %material.media_id, "cover material uploaded");
        Ok(MediaReference {
            media_id: material.media_id,
            url: material.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn uploader_for(server: &MockServer) -> MediaUploader {
        let http = Arc::new(WeChatHttpClient::with_base_url(server.uri()).unwrap());
        let tokens = Arc::new(TokenManager::new(
            "wx1234567890123456",
            SecretString::from("12345678901234567890123456789012"),
            Arc::clone(&http),
        ));
        MediaUploader::new(http, tokens)
    }

    async fn mount_token(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/cgi-bin/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token, "expires_in": 7200
            })))
            .mount(server)
            .await;
    }

    fn temp_image(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"\x89PNG fake image bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_success() {
        let server = MockServer::start().await;
        mount_token(&server, "TOKEN_A").await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/material/add_material"))
            .and(query_param("type", "image"))
            .and(query_param("access_token", "TOKEN_A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "media_id": "MEDIA_1", "url": "https://mmbiz.example/1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = temp_image(&dir, "cover.png");

        let reference = uploader_for(&server).upload(&image).await.unwrap();
        assert_eq!(reference.media_id, "MEDIA_1");
        assert_eq!(reference.url.as_deref(), Some("https://mmbiz.example/1"));
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_network() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would 404 and fail differently.
        let err = uploader_for(&server)
            .upload(Path::new("/no/such/cover.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeChatError::FileNotFound { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_extension_fails_before_network() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let not_image = dir.path().join("cover.pdf");
        std::fs::write(&not_image, b"%PDF-").unwrap();

        let err = uploader_for(&server).upload(&not_image).await.unwrap_err();
        assert!(matches!(err, WeChatError::Config { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_rejection_becomes_asset_rejected() {
        let server = MockServer::start().await;
        mount_token(&server, "TOKEN_A").await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/material/add_material"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 40005, "errmsg": "invalid file type"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = temp_image(&dir, "cover.jpg");

        let err = uploader_for(&server).upload(&image).await.unwrap_err();
        match err {
            WeChatError::AssetRejected { code, .. } => assert_eq!(code, 40005),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_retried_once() {
        let server = MockServer::start().await;
        mount_token(&server, "TOKEN_A").await;

        // First upload attempt: token expired. Second: success.
        Mock::given(method("POST"))
            .and(path("/cgi-bin/material/add_material"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 42001, "errmsg": "access_token expired"
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/material/add_material"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "media_id": "MEDIA_2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = temp_image(&dir, "cover.jpg");

        let reference = uploader_for(&server).upload(&image).await.unwrap();
        assert_eq!(reference.media_id, "MEDIA_2");

        // One initial token fetch plus one forced refresh.
        let token_calls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|req| req.url.path() == "/cgi-bin/token")
            .count();
        assert_eq!(token_calls, 2);
    }

    #[tokio::test]
    async fn test_second_expiry_exhausts_retry() {
        let server = MockServer::start().await;
        mount_token(&server, "TOKEN_A").await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/material/add_material"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 42001, "errmsg": "access_token expired"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = temp_image(&dir, "cover.jpg");

        let err = uploader_for(&server).upload(&image).await.unwrap_err();
        assert!(matches!(err, WeChatError::TokenExpiredRetryExhausted));
    }
}
