//! Access token management with automatic refresh.
//!
//! The platform issues short-lived tokens (typically 7200s). `TokenManager`
//! caches the current token, refreshes it ahead of expiry, and serializes
//! refreshes so concurrent callers share one in-flight remote call instead
//! of racing the token endpoint.

use crate::error::{Result, WeChatError};
use crate::http::{WeChatHttpClient, WeChatResponse, TOKEN_TIMEOUT_SECS};
use crate::store::{CredentialStore, Credentials};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tokens are treated as expired this many seconds early, so a token that is
/// valid at check time cannot expire mid-request.
const EXPIRY_SAFETY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Snapshot of the cached token for diagnostics. The token value itself is
/// deliberately not included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS)
    }
}

struct CachedToken {
    token: String,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Obtains and refreshes the access token. Shared via `Arc` by every
/// component that makes authenticated calls.
pub struct TokenManager {
    app_id: String,
    app_secret: SecretString,
    http_client: Arc<WeChatHttpClient>,
    store: Option<Arc<CredentialStore>>,
    // Held across the refresh await: this is the single-flight guard.
    state: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: SecretString,
        http_client: Arc<WeChatHttpClient>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret,
            http_client,
            store: None,
            state: Mutex::new(None),
        }
    }

    /// Attaches a store; refreshed tokens are persisted through it.
    pub fn with_store(mut self, store: Arc<CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Seeds the cache from a loaded credential record. A seed that is
    /// already expired is ignored; the next `get_access_token` will refresh.
    pub async fn seed_from_credentials(&self, credentials: &Credentials) {
        if let (Some(token), Some(expires_at)) =
            (&credentials.access_token, credentials.token_expires_at)
        {
            if Utc::now() < expires_at {
                let mut state = self.state.lock().await;
                *state = Some(CachedToken {
                    token: token.clone(),
                    acquired_at: Utc::now(),
                    expires_at,
                });
                debug!("seeded access token from persisted credentials");
            }
        }
    }

    /// Returns a currently-valid token, refreshing if the cached one is
    /// absent or within the safety margin of its expiry.
    pub async fn get_access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            let margin = Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS);
            if Utc::now() < cached.expires_at - margin {
                return Ok(cached.token.clone());
            }
            debug!("cached access token inside expiry margin, refreshing");
        }
        self.refresh_locked(&mut state).await
    }

    /// Unconditionally fetches a fresh token from the platform.
    pub async fn force_refresh(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// Diagnostic snapshot of the cached token's lifetime.
    pub async fn get_token_info(&self) -> Option<TokenInfo> {
        let state = self.state.lock().await;
        state.as_ref().map(|cached| TokenInfo {
            acquired_at: cached.acquired_at,
            expires_at: cached.expires_at,
        })
    }

    async fn refresh_locked(&self, state: &mut Option<CachedToken>) -> Result<String> {
        debug!(app_id = %self.app_id, "requesting access token");
        let path = format!(
            "/cgi-bin/token?grant_type=client_credential&appid={}&secret={}",
            self.app_id,
            self.app_secret.expose_secret()
        );

        let response = self.http_client.get(&path, TOKEN_TIMEOUT_SECS).await?;
        let envelope: WeChatResponse<TokenResponse> = response.json().await?;
        let payload = envelope.into_result().map_err(|err| match err {
            // The token endpoint has no token to expire; a stale-credential
            // code here still means the pair is unusable.
            WeChatError::TokenExpired { code } => WeChatError::InvalidCredentials {
                message: format!("token endpoint rejected credentials (errcode {code})"),
            },
            other => other,
        })?;

        let acquired_at = Utc::now();
        let expires_at = acquired_at + Duration::seconds(payload.expires_in as i64);
        info!(expires_in = payload.expires_in, "access token refreshed");

        *state = Some(CachedToken {
            token: payload.access_token.clone(),
            acquired_at,
            expires_at,
        });

        if let Some(store) = &self.store {
            let mut credentials = Credentials::new(self.app_id.clone(), String::new());
            credentials.app_secret = self.app_secret.clone();
            credentials.access_token = Some(payload.access_token.clone());
            credentials.token_expires_at = Some(expires_at);
            if let Err(err) = store.save(&credentials).await {
                // The in-memory token is still valid; losing persistence only
                // costs a refresh on the next startup.
                warn!(error = %err, "failed to persist refreshed token");
            }
        }

        Ok(payload.access_token)
    }
}
