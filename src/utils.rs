//! Small validation helpers shared across the pipeline.

use std::path::Path;

/// Extensions the platform accepts for permanent image material.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

/// Validates the AppID/AppSecret format before any remote call is made.
///
/// AppIDs are `wx` followed by 16 alphanumeric characters (hex in practice,
/// but the check stays the looser one); secrets are 32 characters. Catching
/// a malformed pair here saves a guaranteed-to-fail token request.
pub fn validate_app_credentials(app_id: &str, app_secret: &str) -> Result<(), String> {
    if app_id.len() != 18 || !app_id.starts_with("wx") {
        return Err("AppID must be 'wx' followed by 16 characters".to_string());
    }
    if !app_id[2..].chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("AppID contains invalid characters".to_string());
    }
    if app_secret.len() != 32 {
        return Err("AppSecret must be 32 characters".to_string());
    }
    Ok(())
}

/// Checks whether a path has a supported image extension.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// MIME type for an image path, defaulting to JPEG.
pub fn image_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Async existence check.
pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
