use std::sync::Arc;

/// Represents a result type for operations in the Split SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// SDK-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Split SDK.
///
/// None of these ever reach a treatment evaluation call: evaluation degrades to the `control`
/// treatment instead. They are returned from synchronization and lifecycle calls.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Invalid `sdk_url` configuration.
    #[error("invalid sdk_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The request was unauthorized, possibly due to an invalid API key.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// The server answered with a body that is not a valid split changes payload.
    #[error("invalid split changes response")]
    InvalidResponse(#[source] Arc<serde_json::Error>),

    /// The synchronizer did not complete its first cycle within the requested timeout. The
    /// background synchronizer keeps running.
    #[error("SDK was not ready within the requested timeout")]
    ReadinessTimeout,

    /// Indicates that the synchronizer thread panicked. This should normally never happen.
    #[error("synchronizer thread panicked")]
    SynchronizerPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::InvalidResponse(Arc::new(value))
    }
}
