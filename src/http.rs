//! HTTP transport for the WeChat API.
//!
//! One shared `reqwest` client, per-call deadlines, bounded-backoff retries
//! for the transient class, and the `errcode`/`errmsg` response envelope
//! every endpoint wraps its payload in.

use crate::error::{Result, WeChatError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Production API host. Tests point the client at a local mock server instead.
pub const DEFAULT_BASE_URL: &str = "https://api.weixin.qq.com";

/// Deadline for token-endpoint calls.
pub const TOKEN_TIMEOUT_SECS: u64 = 10;
/// Deadline for draft/publish submissions.
pub const PUBLISH_TIMEOUT_SECS: u64 = 30;
/// Deadline for media uploads (payloads are larger).
pub const UPLOAD_TIMEOUT_SECS: u64 = 60;

/// Total attempts for a transient failure, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// HTTP client shared by every pipeline component.
#[derive(Debug)]
pub struct WeChatHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl WeChatHttpClient {
    /// Creates a client against the production API host.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom host. Used by tests to target a
    /// local mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET with query string already encoded into `path_and_query`.
    pub async fn get(&self, path_and_query: &str, timeout_secs: u64) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path_and_query);
        self.send_with_retry(|| self.client.get(&url), timeout_secs)
            .await
    }

    /// POST a JSON body to `path`, authenticating with `access_token`.
    pub async fn post_json_with_token<B: Serialize + ?Sized>(
        &self,
        path: &str,
        access_token: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}?access_token={}", self.base_url, path, access_token);
        let payload = serde_json::to_vec(body)?;
        self.send_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .body(payload.clone())
            },
            PUBLISH_TIMEOUT_SECS,
        )
        .await
    }

    /// POST binary media as multipart form data.
    ///
    /// The form is rebuilt per attempt because `reqwest::multipart::Form`
    /// cannot be cloned once consumed.
    pub async fn post_media_with_token(
        &self,
        path_and_query: &str,
        access_token: &str,
        bytes: Vec<u8>,
        file_name: String,
        mime_type: &'static str,
    ) -> Result<reqwest::Response> {
        let url = format!(
            "{}{}&access_token={}",
            self.base_url, path_and_query, access_token
        );
        self.send_with_retry(
            || {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime_type)
                    .expect("static mime type is always valid");
                let form = reqwest::multipart::Form::new().part("media", part);
                self.client.post(&url).multipart(form)
            },
            UPLOAD_TIMEOUT_SECS,
        )
        .await
    }

    /// Sends a request with bounded exponential backoff (1s, 2s) for the
    /// transient class. Fatal errors and exhausted budgets surface unchanged.
    async fn send_with_retry<F>(&self, mut build: F, timeout_secs: u64) -> Result<reqwest::Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.send_once(build(), timeout_secs).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = 1u64 << (attempt - 1);
                    debug!(
                        error = %err,
                        attempt,
                        delay_secs = delay,
                        "transient failure, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(error = %err, attempts = attempt, "retry budget exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(
        &self,
        request: reqwest::RequestBuilder,
        timeout_secs: u64,
    ) -> Result<reqwest::Response> {
        let response = tokio::time::timeout(Duration::from_secs(timeout_secs), request.send())
            .await
            .map_err(|_| WeChatError::Timeout {
                seconds: timeout_secs,
            })??;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status.is_server_error() {
            Err(WeChatError::Network {
                message: format!("server error: HTTP {}", status.as_u16()),
            })
        } else {
            Err(WeChatError::UnexpectedResponse {
                message: format!("HTTP {}", status.as_u16()),
            })
        }
    }
}

/// The envelope every WeChat endpoint responds with: a zero `errcode` plus
/// the payload fields on success, or a non-zero `errcode` and `errmsg`.
#[derive(Debug, Deserialize)]
pub struct WeChatResponse<T> {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: DeserializeOwned> WeChatResponse<T> {
    /// Unwraps the payload, classifying non-zero errcodes.
    pub fn into_result(self) -> Result<T> {
        if self.errcode != 0 {
            return Err(WeChatError::from_remote(self.errcode, self.errmsg));
        }
        self.data.ok_or_else(|| WeChatError::UnexpectedResponse {
            message: "success response missing expected fields".to_string(),
        })
    }
}
