//! Error types for the publish pipeline.
//!
//! Every remote failure is classified into exactly one variant so that the
//! retry-or-fail decision is made once, in the component that owns the call,
//! instead of being scattered across call sites.

use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WeChatError>;

/// Errcodes WeChat returns when the access token is stale or invalid.
///
/// 40001: invalid credential (token revoked or wrong), 40014: illegal
/// access_token, 42001: access_token expired.
const TOKEN_EXPIRED_CODES: &[i64] = &[40001, 40014, 42001];

/// Errcodes that mean the AppID/AppSecret pair itself is wrong.
///
/// 40013: invalid appid, 40125: invalid appsecret, 41004: appsecret missing.
const INVALID_CREDENTIAL_CODES: &[i64] = &[40013, 40125, 41004];

/// Classified pipeline error.
#[derive(Debug, Error)]
pub enum WeChatError {
    /// AppID/AppSecret have not been configured yet. Setup required, not a crash.
    #[error("credentials are not configured; set AppID and AppSecret first")]
    NotConfigured,

    /// The platform rejected the AppID/AppSecret pair. Retrying cannot help;
    /// the operator must reconfigure.
    #[error("app credentials rejected by the platform: {message}")]
    InvalidCredentials { message: String },

    /// The draft failed local validation. Caught before any network call.
    #[error("invalid draft: {reason}")]
    InvalidDraft { reason: String },

    /// The platform refused an uploaded asset (format, size, ...). Not retried.
    #[error("asset rejected by the platform (errcode {code}): {message}")]
    AssetRejected { code: i64, message: String },

    /// The access token used for a call was expired or invalid. Internal
    /// signal: the owning component refreshes and retries exactly once.
    #[error("access token expired or invalid (errcode {code})")]
    TokenExpired { code: i64 },

    /// A forced refresh was already spent on this attempt and the platform
    /// still reported an expired token.
    #[error("token expired again after a forced refresh; giving up")]
    TokenExpiredRetryExhausted,

    /// A remote call exceeded its deadline, including backoff retries.
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Transport-level failure (DNS, connect, broken stream).
    #[error("network error: {message}")]
    Network { message: String },

    /// Any other platform errcode: quota, moderation, malformed payload.
    /// The raw code is preserved for operator diagnosis.
    #[error("rejected by the platform (errcode {code}): {message}")]
    RemoteRejected { code: i64, message: String },

    /// A referenced local file does not exist.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Local configuration problem (bad credential format, bad file type).
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A 2xx response that does not match the documented shape.
    #[error("unexpected platform response: {message}")]
    UnexpectedResponse { message: String },

    /// Local I/O failure while reading assets or the credential file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse severity used to decide whether a retry can ever succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Retrying with backoff may succeed.
    Retryable,
    /// Retrying the same input cannot change the outcome.
    Fatal,
}

impl WeChatError {
    /// Creates a configuration error from any displayable message.
    pub fn config_error(message: impl Into<String>) -> Self {
        WeChatError::Config {
            message: message.into(),
        }
    }

    /// Classifies a non-zero platform errcode.
    ///
    /// Only two classes change control flow: token-expired (drives the single
    /// refresh-and-retry cycle) and invalid-credentials (terminal). Everything
    /// else stays `RemoteRejected` carrying the raw code; the published error
    /// code table is too large to map exhaustively and guessing would hide
    /// the real reason from the operator.
    pub fn from_remote(code: i64, message: impl Into<String>) -> Self {
        if TOKEN_EXPIRED_CODES.contains(&code) {
            WeChatError::TokenExpired { code }
        } else if INVALID_CREDENTIAL_CODES.contains(&code) {
            WeChatError::InvalidCredentials {
                message: format!("errcode {}: {}", code, message.into()),
            }
        } else {
            WeChatError::RemoteRejected {
                code,
                message: message.into(),
            }
        }
    }

    /// The platform errcode behind this error, when there is one.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            WeChatError::AssetRejected { code, .. }
            | WeChatError::TokenExpired { code }
            | WeChatError::RemoteRejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WeChatError::Timeout { .. } | WeChatError::Network { .. } => ErrorSeverity::Retryable,
            _ => ErrorSeverity::Fatal,
        }
    }

    /// True for the transient class that bounded backoff applies to.
    pub fn is_retryable(&self) -> bool {
        self.severity() == ErrorSeverity::Retryable
    }

    /// True when the error means the access token must be refreshed.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, WeChatError::TokenExpired { .. })
    }
}

impl From<reqwest::Error> for WeChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WeChatError::Timeout { seconds: 0 }
        } else {
            WeChatError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for WeChatError {
    fn from(err: serde_json::Error) -> Self {
        WeChatError::UnexpectedResponse {
            message: err.to_string(),
        }
    }
}
