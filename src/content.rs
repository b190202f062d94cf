//! Draft validation and article payload assembly.
//!
//! This is the pure step of the pipeline: it turns a generated
//! [`ContentDraft`] into the exact JSON shape the `draft/add` endpoint
//! accepts, rendering the markdown body to HTML on the way. Validation runs
//! here so an unusable draft never costs a token refresh or an upload.

use crate::error::{Result, WeChatError};
use crate::media::MediaReference;
use pulldown_cmark::{html, Options, Parser};
use serde::Serialize;
use std::path::PathBuf;

/// Generated content entering the pipeline. Immutable once created; the
/// content-generation step that produces it is outside this crate.
#[derive(Debug, Clone)]
pub struct ContentDraft {
    /// Article title. Must be non-empty.
    pub title: String,
    /// Article body as markdown. Must be non-empty.
    pub body: String,
    /// Optional byline.
    pub author: Option<String>,
    /// Optional summary shown in the feed; defaults to the title.
    pub digest: Option<String>,
    /// Optional local cover image, uploaded before assembly.
    pub cover_asset: Option<PathBuf>,
}

impl ContentDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            author: None,
            digest: None,
            cover_asset: None,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn cover_asset(mut self, path: impl Into<PathBuf>) -> Self {
        self.cover_asset = Some(path.into());
        self
    }

    /// Rejects drafts the platform would refuse anyway. Called before any
    /// network step.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(WeChatError::InvalidDraft {
                reason: "title is empty".to_string(),
            });
        }
        if self.body.trim().is_empty() {
            return Err(WeChatError::InvalidDraft {
                reason: "body is empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-attempt knobs that shape the article payload and the submit step.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Submit the created draft through `freepublish/submit` as well.
    pub auto_publish: bool,
    /// Whether readers may comment.
    pub enable_comments: bool,
    /// Whether only followers may comment.
    pub fans_only_comments: bool,
    /// "Read the original" link target.
    pub source_url: Option<String>,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_publish(mut self, auto_publish: bool) -> Self {
        self.auto_publish = auto_publish;
        self
    }

    pub fn comments(mut self, enable: bool, fans_only: bool) -> Self {
        self.enable_comments = enable;
        self.fans_only_comments = fans_only;
        self
    }

    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// The article object inside a `draft/add` request body.
#[derive(Debug, Clone, Serialize)]
pub struct ArticlePayload {
    pub title: String,
    pub author: String,
    pub digest: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_media_id: Option<String>,
    pub need_open_comment: u8,
    pub only_fans_can_comment: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_source_url: Option<String>,
}

/// Builds the article payload from a validated draft.
///
/// Pure transformation: no I/O, no network. The cover reference must have
/// been obtained already when the draft carries a cover asset.
pub fn assemble(
    draft: &ContentDraft,
    cover: Option<&MediaReference>,
    options: &PublishOptions,
) -> Result<ArticlePayload> {
    draft.validate()?;

    Ok(ArticlePayload {
        title: draft.title.clone(),
        author: draft.author.clone().unwrap_or_default(),
        digest: draft.digest.clone().unwrap_or_else(|| draft.title.clone()),
        content: render_markdown(&draft.body),
        thumb_media_id: cover.map(|media| media.media_id.clone()),
        need_open_comment: options.enable_comments.into(),
        only_fans_can_comment: options.fans_only_comments.into(),
        content_source_url: options.source_url.clone(),
    })
}

/// Renders a markdown body to the HTML the draft endpoint expects.
fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_title_rejected() {
        let draft = ContentDraft::new("", "body");
        let err = assemble(&draft, None, &PublishOptions::new()).unwrap_err();
        assert!(matches!(err, WeChatError::InvalidDraft { .. }));

        // Whitespace-only counts as empty too.
        let draft = ContentDraft::new("   ", "body");
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_empty_body_rejected() {
        let draft = ContentDraft::new("title", "");
        assert!(matches!(
            assemble(&draft, None, &PublishOptions::new()),
            Err(WeChatError::InvalidDraft { .. })
        ));
    }

    #[test]
    fn test_assemble_without_cover() {
        let draft = ContentDraft::new("Hello", "World");
        let payload = assemble(&draft, None, &PublishOptions::new()).unwrap();

        assert_eq!(payload.title, "Hello");
        assert_eq!(payload.author, "");
        assert_eq!(payload.digest, "Hello");
        assert!(payload.content.contains("World"));
        assert_eq!(payload.thumb_media_id, None);
    }

    #[test]
    fn test_assemble_with_cover_and_options() {
        let draft = ContentDraft::new("Hello", "World")
            .author("Ada")
            .digest("A greeting");
        let cover = MediaReference {
            media_id: "MEDIA_1".to_string(),
            url: Some("https://mmbiz.example/cover".to_string()),
        };
        let options = PublishOptions::new()
            .comments(true, false)
            .source_url("https://example.com/post");

        let payload = assemble(&draft, Some(&cover), &options).unwrap();
        assert_eq!(payload.author, "Ada");
        assert_eq!(payload.digest, "A greeting");
        assert_eq!(payload.thumb_media_id.as_deref(), Some("MEDIA_1"));
        assert_eq!(payload.need_open_comment, 1);
        assert_eq!(payload.only_fans_can_comment, 0);
        assert_eq!(
            payload.content_source_url.as_deref(),
            Some("https://example.com/post")
        );
    }

    #[test]
    fn test_markdown_rendered_to_html() {
        let draft = ContentDraft::new("T", "# Heading\n\nSome **bold** text.");
        let payload = assemble(&draft, None, &PublishOptions::new()).unwrap();
        assert!(payload.content.contains("<h1>Heading</h1>"));
        assert!(payload.content.contains("<strong>bold</strong>"));
    }

    #[test]
    fn test_payload_serializes_to_draft_schema() {
        let draft = ContentDraft::new("Hello", "World");
        let payload = assemble(&draft, None, &PublishOptions::new()).unwrap();
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["title"], "Hello");
        assert_eq!(json["need_open_comment"], 0);
        // Optional fields are omitted, not null.
        assert!(json.get("thumb_media_id").is_none());
        assert!(json.get("content_source_url").is_none());
    }
}
