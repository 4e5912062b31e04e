use serde::{Deserialize, Serialize};

/// The key a treatment is computed for.
///
/// `matching_key` is what matchers (whitelists, segments, attribute-less matchers) look at.
/// `bucketing_key` feeds the consistent hash; it defaults to `matching_key` when not provided.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// Key matched against whitelists, segments and key-based matchers.
    pub matching_key: String,
    /// Optional key used for hashing.
    pub bucketing_key: Option<String>,
}

impl Key {
    /// Create a key with separate matching and bucketing keys.
    pub fn new(matching_key: impl Into<String>, bucketing_key: impl Into<String>) -> Key {
        Key {
            matching_key: matching_key.into(),
            bucketing_key: Some(bucketing_key.into()),
        }
    }

    /// Key used for bucketing: the explicit bucketing key or the matching key.
    pub fn bucketing_key(&self) -> &str {
        self.bucketing_key.as_deref().unwrap_or(&self.matching_key)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Key {
        Key {
            matching_key: value.to_owned(),
            bucketing_key: None,
        }
    }
}

impl From<String> for Key {
    fn from(value: String) -> Key {
        Key {
            matching_key: value,
            bucketing_key: None,
        }
    }
}
