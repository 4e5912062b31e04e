//! Fetching split changes from the server.
use reqwest::{StatusCode, Url};

use crate::{splits::SplitChanges, Error, Result};

/// Default base URL of the SDK API.
pub const DEFAULT_SDK_URL: &str = "https://sdk.split.io/api";

const SPLIT_CHANGES_ENDPOINT: &str = "/splitChanges";

/// Source of split changes.
///
/// Implemented for closures, which is convenient for tests and for wiring custom transports:
/// ```
/// # use splitio::{fetcher::SplitChangeFetcher, splits::SplitChanges, Result};
/// let fetcher = |since: i64| -> Result<SplitChanges> {
///     Ok(SplitChanges { since, till: since, splits: Vec::new() })
/// };
/// # fn check(_: impl SplitChangeFetcher) {}
/// # check(fetcher);
/// ```
pub trait SplitChangeFetcher: Send {
    /// Fetch all changes newer than `since`. A response with `till <= since` means there are no
    /// further changes.
    fn fetch(&mut self, since: i64) -> Result<SplitChanges>;
}

impl<F: FnMut(i64) -> Result<SplitChanges> + Send> SplitChangeFetcher for F {
    fn fetch(&mut self, since: i64) -> Result<SplitChanges> {
        self(since)
    }
}

/// Configuration of [`HttpSplitChangeFetcher`].
#[derive(Debug, Clone)]
pub struct HttpSplitChangeFetcherConfig {
    /// Base URL, e.g. [`DEFAULT_SDK_URL`].
    pub sdk_url: String,
    /// SDK API key, sent as a bearer token.
    pub api_key: String,
    /// Sent in the `SplitSDKVersion` header.
    pub sdk_version: String,
}

/// Fetches split changes from the `splitChanges` endpoint.
pub struct HttpSplitChangeFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    config: HttpSplitChangeFetcherConfig,
    /// If we receive a 401 Unauthorized or 403 Forbidden during a request, the API key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: bool,
}

impl HttpSplitChangeFetcher {
    /// Create a new fetcher.
    pub fn new(config: HttpSplitChangeFetcherConfig) -> HttpSplitChangeFetcher {
        HttpSplitChangeFetcher {
            client: reqwest::blocking::Client::new(),
            config,
            unauthorized: false,
        }
    }

    fn url(&self, since: i64) -> Result<Url> {
        Url::parse_with_params(
            &format!(
                "{}{}",
                self.config.sdk_url.trim_end_matches('/'),
                SPLIT_CHANGES_ENDPOINT
            ),
            &[("since", since.to_string())],
        )
        .map_err(Error::InvalidBaseUrl)
    }
}

impl SplitChangeFetcher for HttpSplitChangeFetcher {
    fn fetch(&mut self, since: i64) -> Result<SplitChanges> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let url = self.url(since)?;

        log::debug!(target: "splitio", since; "fetching split changes");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .header("SplitSDKVersion", &self.config.sdk_version)
            .send()?;

        let response = response.error_for_status().map_err(|err| {
            if matches!(
                err.status(),
                Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            ) {
                log::warn!(target: "splitio", "client is not authorized. Check your API key");
                self.unauthorized = true;
                Error::Unauthorized
            } else {
                log::warn!(target: "splitio", "received non-200 response while fetching split changes: {err:?}");
                Error::from(err)
            }
        })?;

        let body = response.bytes()?;
        let changes: SplitChanges = serde_json::from_slice(&body)?;

        log::debug!(target: "splitio",
                    since = changes.since,
                    till = changes.till;
                    "successfully fetched split changes");

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpSplitChangeFetcher, HttpSplitChangeFetcherConfig, DEFAULT_SDK_URL};
    use crate::Error;

    fn fetcher(sdk_url: &str) -> HttpSplitChangeFetcher {
        HttpSplitChangeFetcher::new(HttpSplitChangeFetcherConfig {
            sdk_url: sdk_url.to_owned(),
            api_key: "api-key".to_owned(),
            sdk_version: "rust-test".to_owned(),
        })
    }

    #[test]
    fn builds_split_changes_url() {
        let url = fetcher(DEFAULT_SDK_URL).url(-1).unwrap();
        assert_eq!(url.as_str(), "https://sdk.split.io/api/splitChanges?since=-1");

        let url = fetcher("http://localhost:8080/api/").url(42).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/splitChanges?since=42");
    }

    #[test]
    fn invalid_sdk_url() {
        let err = fetcher("not a url").url(1).unwrap_err();
        assert!(matches!(err, Error::InvalidBaseUrl(_)), "{err:?}");
    }

    #[test]
    fn unauthorized_is_cached() {
        let mut f = fetcher("not a url");
        f.unauthorized = true;
        assert!(matches!(
            super::SplitChangeFetcher::fetch(&mut f, -1),
            Err(Error::Unauthorized)
        ));
    }
}
