//! Validation of caller input to evaluation calls.
use crate::Key;

/// Maximum length of a matching or bucketing key, in characters.
pub const MAX_KEY_LENGTH: usize = 250;

/// Invalid input to an evaluation call. Evaluation returns `control` instead of failing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InputError {
    /// Matching or bucketing key is empty.
    #[error("{0} key must be a non-empty string")]
    EmptyKey(&'static str),
    /// Matching or bucketing key is longer than [`MAX_KEY_LENGTH`].
    #[error("{0} key too long, must be {MAX_KEY_LENGTH} characters or less")]
    KeyTooLong(&'static str),
    /// Feature name is empty or whitespace.
    #[error("feature name must be a non-empty string")]
    EmptyFeatureName,
}

/// Check matching and bucketing keys.
pub fn validate_key(key: &Key) -> Result<(), InputError> {
    check_key("matching", &key.matching_key)?;
    if let Some(bucketing_key) = &key.bucketing_key {
        check_key("bucketing", bucketing_key)?;
    }
    Ok(())
}

fn check_key(kind: &'static str, key: &str) -> Result<(), InputError> {
    if key.is_empty() {
        return Err(InputError::EmptyKey(kind));
    }
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(InputError::KeyTooLong(kind));
    }
    Ok(())
}

/// Check a feature name, returning it without surrounding whitespace.
pub fn validate_feature_name(name: &str) -> Result<&str, InputError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(InputError::EmptyFeatureName);
    }
    if trimmed.len() != name.len() {
        log::warn!(target: "splitio",
                   feature = name;
                   "feature name has extra whitespace, trimming");
    }
    Ok(trimmed)
}
