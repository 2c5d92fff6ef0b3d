//! Validation for newly published videos.

use crate::domain::entities::NewVideo;
use crate::domain::error::DomainError;

/// Column width of the text fields in the `videos` table.
pub const MAX_TEXT_LEN: usize = 255;

/// Trim and validate user-supplied fields for a new video.
pub fn validate_new_video(
    author_id: i64,
    title: &str,
    description: Option<&str>,
    play_url: &str,
    cover_url: &str,
) -> Result<NewVideo, DomainError> {
    let title = required("title", title)?;
    let play_url = required("play_url", play_url)?;
    let cover_url = required("cover_url", cover_url)?;
    let description = match description.map(str::trim) {
        Some(value) if !value.is_empty() => Some(bounded("description", value)?),
        _ => None,
    };

    Ok(NewVideo {
        author_id,
        title,
        description,
        play_url,
        cover_url,
    })
}

fn required(field: &'static str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::missing(field));
    }
    bounded(field, trimmed)
}

fn bounded(field: &'static str, value: &str) -> Result<String, DomainError> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(DomainError::too_long(field, MAX_TEXT_LEN));
    }
    Ok(value.to_string())
}
