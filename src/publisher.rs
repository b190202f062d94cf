//! The publish state machine.
//!
//! One attempt walks `Idle → TokenAcquired → PayloadAssembled → Submitted`
//! and terminates in `Succeeded` or `Failed`. Retry decisions are made here,
//! centrally: the only automatic remote retry is a single forced-refresh
//! cycle when the submit call reports an expired token. Every attempt yields
//! exactly one [`PublishResult`]; the caller starts a fresh attempt if it
//! wants another try.

use crate::auth::TokenManager;
use crate::content::{self, ArticlePayload, ContentDraft, PublishOptions};
use crate::error::{Result, WeChatError};
use crate::http::{WeChatHttpClient, WeChatResponse};
use crate::media::{MediaReference, MediaUploader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DRAFT_ADD_PATH: &str = "/cgi-bin/draft/add";
const FREEPUBLISH_SUBMIT_PATH: &str = "/cgi-bin/freepublish/submit";

/// States of one publish attempt. Terminal states are `Succeeded` and
/// `Failed`; the machine never restarts itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Idle,
    TokenAcquired,
    PayloadAssembled,
    Submitted,
    Succeeded,
    Failed,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishState::Idle => "idle",
            PublishState::TokenAcquired => "token_acquired",
            PublishState::PayloadAssembled => "payload_assembled",
            PublishState::Submitted => "submitted",
            PublishState::Succeeded => "succeeded",
            PublishState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Succeeded,
    Failed,
}

/// The one record every attempt produces.
#[derive(Debug)]
pub struct PublishResult {
    pub outcome: PublishOutcome,
    /// Draft media_id returned by the platform on success.
    pub remote_article_id: Option<String>,
    /// Set when auto-publish was requested and accepted.
    pub publish_id: Option<String>,
    /// Classified failure, also set when the draft succeeded but a requested
    /// auto-publish step did not.
    pub error: Option<WeChatError>,
    /// Raw platform errcode for operator diagnosis.
    pub raw_remote_code: Option<i64>,
}

impl PublishResult {
    fn success(remote_article_id: String) -> Self {
        Self {
            outcome: PublishOutcome::Succeeded,
            remote_article_id: Some(remote_article_id),
            publish_id: None,
            error: None,
            raw_remote_code: None,
        }
    }

    fn failure(error: WeChatError) -> Self {
        Self {
            outcome: PublishOutcome::Failed,
            remote_article_id: None,
            publish_id: None,
            raw_remote_code: error.remote_code(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == PublishOutcome::Succeeded
    }
}

#[derive(Debug, Serialize)]
struct DraftRequest<'a> {
    articles: Vec<&'a ArticlePayload>,
}

#[derive(Debug, Deserialize)]
struct DraftAdded {
    media_id: String,
}

#[derive(Debug, Serialize)]
struct FreePublishRequest<'a> {
    media_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreePublishSubmitted {
    publish_id: u64,
}

/// Drives one draft through the pipeline.
#[derive(Debug)]
pub struct Publisher {
    http_client: Arc<WeChatHttpClient>,
    token_manager: Arc<TokenManager>,
    media_uploader: Arc<MediaUploader>,
}

impl Publisher {
    pub fn new(
        http_client: Arc<WeChatHttpClient>,
        token_manager: Arc<TokenManager>,
        media_uploader: Arc<MediaUploader>,
    ) -> Self {
        Self {
            http_client,
            token_manager,
            media_uploader,
        }
    }

    /// Publishes one draft. Never panics and never loses a failure: the
    /// attempt's outcome, remote id and classified error all land in the
    /// returned [`PublishResult`].
    ///
    /// Dropping the returned future before the submit request is issued has
    /// no remote side effect; once the submit call is in flight the future
    /// must be polled to completion to learn the outcome.
    pub async fn publish(&self, draft: &ContentDraft, options: &PublishOptions) -> PublishResult {
        match self.run(draft, options).await {
            Ok(result) => result,
            Err(error) => {
                warn!(error = %error, "publish attempt failed");
                debug!(to = %PublishState::Failed, "publish state transition");
                PublishResult::failure(error)
            }
        }
    }

    async fn run(&self, draft: &ContentDraft, options: &PublishOptions) -> Result<PublishResult> {
        let mut state = PublishState::Idle;

        // Unusable input must not cost a token refresh or an upload.
        draft.validate()?;

        let mut token = self.token_manager.get_access_token().await?;
        state = self.advance(state, PublishState::TokenAcquired);

        let cover: Option<MediaReference> = match &draft.cover_asset {
            Some(path) => {
                let reference = self.media_uploader.upload(path).await?;
                // The upload may have force-refreshed the token; the submit
                // below must never use a stale snapshot.
                token = self.token_manager.get_access_token().await?;
                Some(reference)
            }
            None => None,
        };

        let payload = content::assemble(draft, cover.as_ref(), options)?;
        state = self.advance(state, PublishState::PayloadAssembled);

        state = self.advance(state, PublishState::Submitted);
        let media_id = match self.submit_draft(&token, &payload).await {
            Err(err) if err.is_token_expired() => {
                debug!("draft submit hit expired token, one refresh-and-resubmit cycle");
                token = self.token_manager.force_refresh().await?;
                match self.submit_draft(&token, &payload).await {
                    Err(err) if err.is_token_expired() => {
                        return Err(WeChatError::TokenExpiredRetryExhausted);
                    }
                    other => other?,
                }
            }
            other => other?,
        };
        info!(media_id = %media_id, "draft created");

        let mut result = PublishResult::success(media_id.clone());
        if options.auto_publish {
            match self.submit_freepublish(&token, &media_id).await {
                Ok(publish_id) => {
                    info!(publish_id = %publish_id, "draft submitted for publication");
                    result.publish_id = Some(publish_id);
                }
                Err(error) => {
                    // The draft exists remotely; its id must not be lost.
                    warn!(error = %error, media_id = %media_id, "auto-publish failed after draft creation");
                    result.raw_remote_code = error.remote_code();
                    result.error = Some(error);
                }
            }
        }

        let _ = self.advance(state, PublishState::Succeeded);
        Ok(result)
    }

    fn advance(&self, from: PublishState, to: PublishState) -> PublishState {
        debug!(from = %from, to = %to, "publish state transition");
        to
    }

    async fn submit_draft(&self, token: &str, payload: &ArticlePayload) -> Result<String> {
        let request = DraftRequest {
            articles: vec![payload],
        };
        let response = self
            .http_client
            .post_json_with_token(DRAFT_ADD_PATH, token, &request)
            .await?;
        let envelope: WeChatResponse<DraftAdded> = response.json().await?;
        Ok(envelope.into_result()?.media_id)
    }

    async fn submit_freepublish(&self, token: &str, media_id: &str) -> Result<String> {
        let request = FreePublishRequest { media_id };
        let response = self
            .http_client
            .post_json_with_token(FREEPUBLISH_SUBMIT_PATH, token, &request)
            .await?;
        let envelope: WeChatResponse<FreePublishSubmitted> = response.json().await?;
        Ok(envelope.into_result()?.publish_id.to_string())
    }
}
