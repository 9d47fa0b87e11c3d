//! Key layout shared by all backends.

use crate::{StorageError, StorageResult};

const IDENTITY_MEDIA_PREFIX: &str = "identity-verifications";

/// Reject keys that are empty, absolute, or climb out of the bucket root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!("{:?} is not a relative key", key)));
    }
    if key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(StorageError::InvalidKey(format!("{:?} contains a dot segment", key)));
    }
    Ok(())
}

/// Key for an archived KYC image: `identity-verifications/{session_id}/{context}.{ext}`.
///
/// The session id comes from an external callback, so anything that could
/// escape the session directory is refused.
pub fn identity_media_key(session_id: &str, context: &str, extension: &str) -> StorageResult<String> {
    for (label, part) in [("session id", session_id), ("context", context), ("extension", extension)] {
        let valid = !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey(format!(
                "invalid {} for media key: {:?}",
                label, part
            )));
        }
    }

    Ok(format!(
        "{}/{}/{}.{}",
        IDENTITY_MEDIA_PREFIX, session_id, context, extension
    ))
}

/// File extension for an archived image content type.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
        .as_str()
    {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_media_key_layout() {
        let key = identity_media_key("0b3c-41aa", "document-front", "jpg").unwrap();
        assert_eq!(key, "identity-verifications/0b3c-41aa/document-front.jpg");
    }

    #[test]
    fn test_identity_media_key_rejects_traversal() {
        assert!(identity_media_key("../other", "face", "jpg").is_err());
        assert!(identity_media_key("abc/def", "face", "jpg").is_err());
        assert!(identity_media_key("", "face", "jpg").is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("insurance/abc/policy.pdf").is_ok());
        assert!(validate_key("insurance/policy..v2.pdf").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("insurance/../../etc/passwd").is_err());
        assert!(validate_key("insurance\\..\\x").is_err());
    }

    #[test]
    fn test_extension_for_content_type() {
        assert_eq!(extension_for_content_type("image/png"), "png");
        assert_eq!(extension_for_content_type("image/jpeg; charset=binary"), "jpg");
        assert_eq!(extension_for_content_type("application/octet-stream"), "jpg");
    }
}
