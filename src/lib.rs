//! # WeChat Official Account publish pipeline
//!
//! A small library that takes generated article content and publishes it to
//! one WeChat Official Account: it acquires and refreshes the access token,
//! uploads the cover asset, assembles the platform's draft payload and
//! submits it, classifying every failure the remote API can report.
//!
//! ## Architecture
//!
//! - [`WeChatClient`] - facade wiring the pipeline together
//! - [`auth`] - access token management with single-flight refresh
//! - [`store`] - file-backed credential persistence
//! - [`content`] - draft validation and article payload assembly
//! - [`media`] - cover image upload as permanent material
//! - [`publisher`] - the publish state machine and retry policy
//! - [`error`] - classified error taxonomy
//!
//! The web layer in front of this crate and the content-generation step that
//! produces drafts are external collaborators: the crate's surface is
//! "publish this draft, tell me exactly what happened".
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wechat_publisher::{ContentDraft, PublishOptions, Result, WeChatClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = WeChatClient::new("your_app_id", "your_app_secret")?;
//!
//!     let draft = ContentDraft::new("Title", "Body in **markdown**")
//!         .author("Author")
//!         .cover_asset("./cover.jpg");
//!
//!     let options = PublishOptions::new().auto_publish(true);
//!     let result = client.publish_with_options(&draft, &options).await;
//!
//!     match result.remote_article_id {
//!         Some(id) => println!("draft created: {id}"),
//!         None => eprintln!("failed: {:?}", result.error),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every publish attempt returns exactly one [`publisher::PublishResult`];
//! fatal classes ([`WeChatError::InvalidCredentials`],
//! [`WeChatError::InvalidDraft`], [`WeChatError::AssetRejected`],
//! [`WeChatError::RemoteRejected`]) are never retried automatically, while
//! transient network failures retry with bounded backoff inside the
//! component that owns the call. A token-expired response on submit gets
//! exactly one forced-refresh-and-resubmit cycle.

pub mod auth;
pub mod client;
pub mod content;
pub mod error;
pub mod http;
pub mod media;
pub mod publisher;
pub mod store;
pub mod utils;

// Re-export main types for convenience
pub use client::WeChatClient;
pub use content::{ArticlePayload, ContentDraft, PublishOptions};
pub use error::{ErrorSeverity, Result, WeChatError};
pub use media::MediaReference;
pub use publisher::{PublishOutcome, PublishResult, PublishState};
pub use store::{CredentialStore, Credentials};
