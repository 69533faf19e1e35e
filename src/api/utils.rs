//! API utility functions
//!
//! Pure, stateless helper functions for HTTP request processing, extracted
//! from services.rs to enable unit testing and reuse.

use crate::api::error::ApiError;

/// Parses and validates Content-Type header for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json; charset=utf-8`
///
/// Rejects:
/// - `application/jsonp`
/// - `text/json`
/// - Malformed media types
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Validates that body size does not exceed the maximum allowed size
pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(())
}

/// Split free-form pasted text into http(s) URLs, preserving order.
/// Anything that is not an http(s) token is dropped.
pub fn extract_urls(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|token| token.starts_with("http://") || token.starts_with("https://"))
        .map(str::to_string)
        .collect()
}

/// Parse the client's bitrate string, falling back to the configured
/// default when absent.
pub fn parse_quality(raw: Option<&str>, default_kbps: u32) -> Result<u32, ApiError> {
    let Some(raw) = raw else {
        return Ok(default_kbps);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(default_kbps);
    }
    let kbps: u32 = trimmed
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("invalid quality_kbps: {raw}")))?;
    if kbps == 0 {
        return Err(ApiError::InvalidPayload(
            "quality_kbps must be non-zero".to_string(),
        ));
    }
    Ok(kbps)
}
