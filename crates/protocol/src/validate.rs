//! Pure validation of identities and attachments.

use thiserror::Error;

use crate::message::ImageData;

/// Maximum encoded attachment size.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Maximum attachment file name length.
pub const MAX_FILENAME_LEN: usize = 255;

/// Display name length bounds, inclusive.
pub const USERNAME_MIN_LEN: usize = 2;
pub const USERNAME_MAX_LEN: usize = 20;

/// MIME types an attachment may declare.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/svg+xml",
];

const DATA_URL_PREFIX: &str = "data:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("username must be between 2 and 20 characters")]
    UsernameLength,

    #[error("username may only contain letters, digits, hyphens and underscores")]
    UsernameCharset,

    #[error("image exceeds the 5 MiB size limit")]
    ImageTooLarge,

    #[error("image type '{media_type}' is not allowed")]
    ImageTypeNotAllowed { media_type: String },

    #[error("image payload is not a data URL")]
    ImageNotDataUrl,

    #[error("image file name must be between 1 and 255 characters")]
    ImageFileName,
}

/// Check whether a proposed display name is syntactically acceptable.
///
/// Case-sensitive, no normalization; trimming is the caller's concern.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.len() < USERNAME_MIN_LEN || username.len() > USERNAME_MAX_LEN {
        return Err(ValidationError::UsernameLength);
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::UsernameCharset);
    }

    Ok(())
}

/// Check size, type, payload marker and file name of an attachment.
///
/// Any failing rule rejects the attachment as a whole.
pub fn validate_image(image: &ImageData) -> Result<(), ValidationError> {
    if image.size > MAX_IMAGE_BYTES {
        return Err(ValidationError::ImageTooLarge);
    }

    if !ALLOWED_IMAGE_TYPES.contains(&image.media_type.as_str()) {
        return Err(ValidationError::ImageTypeNotAllowed {
            media_type: image.media_type.clone(),
        });
    }

    if !image.data.starts_with(DATA_URL_PREFIX) {
        return Err(ValidationError::ImageNotDataUrl);
    }

    if image.name.is_empty() || image.name.len() > MAX_FILENAME_LEN {
        return Err(ValidationError::ImageFileName);
    }

    Ok(())
}
