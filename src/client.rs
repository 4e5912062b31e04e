use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[cfg(doc)]
use crate::Error;
use crate::{
    evaluator::{self, Evaluation, Label},
    fetcher::{HttpSplitChangeFetcher, HttpSplitChangeFetcherConfig},
    impressions::{self, Impression},
    manager::SplitManager,
    segments::InMemorySegmentStorage,
    storage::{InMemorySplitStorage, SplitStorage},
    synchronizer::SplitSynchronizer,
    validation::{validate_feature_name, validate_key},
    Attributes, ClientConfig, ImpressionListener, Key, Result,
};

/// Treatment together with its JSON configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentWithConfig {
    /// The treatment.
    pub treatment: String,
    /// JSON configuration attached to the treatment, if any.
    pub config: Option<String>,
}

/// A client for Split API.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Synchronization
///
/// Before evaluating treatments, start the synchronizer by calling [`Client::start()`]. Until the
/// first synchronization succeeds, every treatment is `control` with label `"not ready"`. Use
/// [`Client::block_until_ready()`] to wait for it.
///
/// # Examples
/// ```no_run
/// # use std::time::Duration;
/// # use splitio::{Client, ClientConfig};
/// let client = Client::new(ClientConfig::from_api_key("api-key"));
/// client.start().unwrap();
/// client.block_until_ready(Duration::from_secs(10)).unwrap();
/// let treatment = client.get_treatment(&"user-id".into(), "checkout", None);
/// ```
pub struct Client<'a> {
    storage: Arc<dyn SplitStorage>,
    synchronizer: SplitSynchronizer,
    impression_listener: Box<dyn ImpressionListener + Send + Sync + 'a>,
    labels_enabled: bool,
    destroyed: AtomicBool,
}

impl<'a> Client<'a> {
    /// Create a new `Client` using the specified configuration.
    ///
    /// ```
    /// # use splitio::{ClientConfig, Client};
    /// let client = Client::new(ClientConfig::from_api_key("api-key"));
    /// ```
    pub fn new(config: ClientConfig<'a>) -> Self {
        let storage = config
            .storage
            .unwrap_or_else(|| Arc::new(InMemorySplitStorage::new()));
        let segments = config
            .segments
            .unwrap_or_else(|| Arc::new(InMemorySegmentStorage::new()));
        let fetcher = config.fetcher.unwrap_or_else(|| {
            Box::new(HttpSplitChangeFetcher::new(HttpSplitChangeFetcherConfig {
                sdk_url: config.sdk_url,
                api_key: config.api_key,
                sdk_version: format!("rust-{}", env!("CARGO_PKG_VERSION")),
            }))
        });

        Client {
            synchronizer: SplitSynchronizer::new(
                fetcher,
                Arc::clone(&storage),
                segments,
                config.synchronizer,
            ),
            storage,
            impression_listener: config.impression_listener,
            labels_enabled: config.labels_enabled,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Start synchronizing splits in the background. Does nothing if already started.
    ///
    /// # Errors
    ///
    /// - IO Error if the synchronizer thread failed to start.
    pub fn start(&self) -> Result<()> {
        self.synchronizer.start(false)
    }

    /// Block until the first synchronization succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadinessTimeout`] if `timeout` elapsed. Synchronization continues in the
    ///   background.
    /// - [`Error::Unauthorized`] or another error that stopped the synchronizer.
    pub fn block_until_ready(&self, timeout: Duration) -> Result<()> {
        self.synchronizer.block_until_ready(timeout)
    }

    /// Returns `true` once splits have been synchronized.
    pub fn is_ready(&self) -> bool {
        self.synchronizer.is_ready() || self.storage.change_number() >= 0
    }

    /// Get the treatment of `feature` for `key`.
    ///
    /// Never fails: returns `control` if the treatment cannot be determined (see
    /// [`Client::evaluate()`] for the reason).
    ///
    /// # Examples
    ///
    /// ```
    /// # fn test(client: &splitio::Client) {
    /// let treatment = client.get_treatment(
    ///     &"user-id".into(),
    ///     "checkout",
    ///     Some(&[("plan".to_owned(), "gold".into())].into_iter().collect()),
    /// );
    /// if treatment == "on" {
    ///     // new checkout
    /// }
    /// # }
    /// ```
    pub fn get_treatment(
        &self,
        key: &Key,
        feature: &str,
        attributes: Option<&Attributes>,
    ) -> String {
        self.evaluate(key, feature, attributes).treatment
    }

    /// Get the treatment of `feature` for `key` together with the treatment's configuration.
    pub fn get_treatment_with_config(
        &self,
        key: &Key,
        feature: &str,
        attributes: Option<&Attributes>,
    ) -> TreatmentWithConfig {
        let evaluation = self.evaluate(key, feature, attributes);
        TreatmentWithConfig {
            treatment: evaluation.treatment,
            config: evaluation.config,
        }
    }

    /// Get treatments of several features for `key`, keyed by (trimmed) feature name. Invalid
    /// feature names are skipped.
    pub fn get_treatments(
        &self,
        key: &Key,
        features: &[&str],
        attributes: Option<&Attributes>,
    ) -> HashMap<String, String> {
        features
            .iter()
            .filter_map(|feature| {
                let name = validate_feature_name(feature)
                    .map_err(|err| {
                        log::warn!(target: "splitio", "get_treatments: {err}");
                    })
                    .ok()?;
                Some((name.to_owned(), self.evaluate(key, name, attributes).treatment))
            })
            .collect()
    }

    /// Evaluate `feature` for `key`, with the label explaining the treatment.
    ///
    /// Invalid input, a destroyed client, or an internal error yield `control` with label
    /// `"exception"`. An unknown feature yields `control` with label `"definition not found"`.
    /// Before the first synchronization, every feature yields `control` with label
    /// `"not ready"`.
    ///
    /// An impression is delivered to the impression listener for every evaluation of a valid
    /// input against a known feature.
    pub fn evaluate(
        &self,
        key: &Key,
        feature: &str,
        attributes: Option<&Attributes>,
    ) -> Evaluation {
        if self.destroyed.load(Ordering::SeqCst) {
            log::warn!(target: "splitio", feature; "client has been destroyed, returning control");
            return Evaluation::control(Label::Exception);
        }

        if let Err(err) = validate_key(key) {
            log::warn!(target: "splitio", feature; "invalid key: {err}");
            return Evaluation::control(Label::Exception);
        }

        let feature = match validate_feature_name(feature) {
            Ok(feature) => feature,
            Err(err) => {
                log::warn!(target: "splitio", "invalid feature name: {err}");
                return Evaluation::control(Label::Exception);
            }
        };

        let evaluation = if !self.is_ready() {
            log::warn!(target: "splitio",
                       feature;
                       "evaluating a split before splits have been synchronized");
            Evaluation::control(Label::NotReady)
        } else {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                evaluator::evaluate(self.storage.as_ref(), key, feature, attributes)
            }))
            .unwrap_or_else(|_| {
                log::error!(target: "splitio",
                            feature,
                            matching_key = key.matching_key.as_str();
                            "internal error while evaluating a split");
                Evaluation::control(Label::Exception)
            })
        };

        if evaluation.label != Label::DefinitionNotFound.as_str() {
            self.record_impression(key, feature, &evaluation);
        }

        evaluation
    }

    /// Manager inspecting the splits known to this client.
    pub fn manager(&self) -> SplitManager {
        SplitManager::new(Arc::clone(&self.storage))
    }

    /// Stop synchronization and block waiting for the synchronizer to exit. Afterwards, every
    /// evaluation returns `control` with label `"exception"`.
    ///
    /// # Errors
    ///
    /// - [`Error::SynchronizerPanicked`] if the synchronizer thread has panicked.
    pub fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::debug!(target: "splitio", "destroying client");
        self.synchronizer.shutdown()
    }

    fn record_impression(&self, key: &Key, feature: &str, evaluation: &Evaluation) {
        let impression = Impression {
            feature: feature.to_owned(),
            matching_key: key.matching_key.clone(),
            bucketing_key: key.bucketing_key.clone(),
            treatment: evaluation.treatment.clone(),
            label: self.labels_enabled.then(|| evaluation.label.clone()),
            change_number: evaluation.change_number,
            time: chrono::Utc::now().timestamp_millis(),
        };
        impressions::deliver(self.impression_listener.as_ref(), impression);
    }
}
