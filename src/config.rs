use std::sync::Arc;

use crate::{
    fetcher::{SplitChangeFetcher, DEFAULT_SDK_URL},
    impressions::NoopImpressionListener,
    segments::SegmentProvider,
    storage::SplitStorage,
    synchronizer::SplitSynchronizerConfig,
    Client, ImpressionListener,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use splitio::{ClientConfig, Impression};
/// let client = ClientConfig::from_api_key("api-key")
///     .impression_listener(|impression: Impression| {
///         println!("{:?}", impression);
///     })
///     .to_client();
/// ```
pub struct ClientConfig<'a> {
    pub(crate) api_key: String,
    pub(crate) sdk_url: String,
    pub(crate) synchronizer: SplitSynchronizerConfig,
    pub(crate) impression_listener: Box<dyn ImpressionListener + Send + Sync + 'a>,
    pub(crate) labels_enabled: bool,
    pub(crate) fetcher: Option<Box<dyn SplitChangeFetcher>>,
    pub(crate) storage: Option<Arc<dyn SplitStorage>>,
    pub(crate) segments: Option<Arc<dyn SegmentProvider>>,
}

impl<'a> ClientConfig<'a> {
    /// Default base URL for API calls.
    pub const DEFAULT_SDK_URL: &'static str = DEFAULT_SDK_URL;

    /// Create a default configuration using the specified API key.
    ///
    /// ```
    /// # use splitio::ClientConfig;
    /// ClientConfig::from_api_key("api-key");
    /// ```
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        ClientConfig {
            api_key: api_key.into(),
            sdk_url: ClientConfig::DEFAULT_SDK_URL.to_owned(),
            synchronizer: SplitSynchronizerConfig::default(),
            impression_listener: Box::new(NoopImpressionListener),
            labels_enabled: true,
            fetcher: None,
            storage: None,
            segments: None,
        }
    }

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn sdk_url(mut self, sdk_url: impl Into<String>) -> Self {
        self.sdk_url = sdk_url.into();
        self
    }

    /// Configure the background synchronizer.
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use splitio::{ClientConfig, synchronizer::SplitSynchronizerConfig};
    /// let config = ClientConfig::from_api_key("api-key").synchronizer_config(
    ///     SplitSynchronizerConfig::new().with_interval(Duration::from_secs(60)),
    /// );
    /// ```
    pub fn synchronizer_config(mut self, config: SplitSynchronizerConfig) -> Self {
        self.synchronizer = config;
        self
    }

    /// Set impression listener to store served treatments to your data warehouse.
    pub fn impression_listener(
        mut self,
        impression_listener: impl ImpressionListener + Send + Sync + 'a,
    ) -> Self {
        self.impression_listener = Box::new(impression_listener);
        self
    }

    /// Include labels in impressions. Defaults to `true`.
    pub fn labels_enabled(mut self, labels_enabled: bool) -> Self {
        self.labels_enabled = labels_enabled;
        self
    }

    /// Fetch split changes with `fetcher` instead of the HTTP API.
    pub fn split_change_fetcher(mut self, fetcher: impl SplitChangeFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Store splits in `storage` instead of a new in-memory storage.
    pub fn split_storage(mut self, storage: Arc<dyn SplitStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Resolve segments with `segments` instead of a new in-memory registry.
    pub fn segment_provider(mut self, segments: Arc<dyn SegmentProvider>) -> Self {
        self.segments = Some(segments);
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use splitio::{ClientConfig, Client};
    /// let client: Client = ClientConfig::from_api_key("api-key").to_client();
    /// ```
    pub fn to_client(self) -> Client<'a> {
        Client::new(self)
    }
}
