use super::MatcherType;

/// Reasons a split definition cannot be turned into an evaluable [`Split`](super::Split).
///
/// Any of these excludes the whole split from the cache; a split is never applied partially.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// The entry does not match the split wire format (missing fields, unknown matcher type or
    /// status, etc.).
    #[error("malformed split definition")]
    Malformed,

    /// Matcher group uses a combiner other than `AND`.
    #[error("unknown combiner {0:?}")]
    UnknownCombiner(String),

    /// Matcher is missing the data block required by its type.
    #[error("{0:?} matcher is missing its data")]
    MissingMatcherData(MatcherType),

    /// `MATCHES_STRING` matcher carries an invalid regular expression.
    #[error("invalid regex {pattern:?}: {message}")]
    InvalidRegex {
        /// The pattern as received.
        pattern: String,
        /// Error reported by the regex compiler.
        message: String,
    },

    /// Semver matcher carries a value that is not a semantic version.
    #[error("invalid semantic version {0:?}")]
    InvalidSemver(String),

    /// Segment referenced by an `IN_SEGMENT` matcher could not be obtained.
    #[error("segment {0:?} is not available")]
    SegmentUnavailable(String),
}
