use serde::{Deserialize, Serialize};

/// Record of a treatment served to a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impression {
    /// Name of the evaluated split.
    pub feature: String,
    /// Key the treatment was served to.
    pub matching_key: String,
    /// Bucketing key, if it differs from the matching key.
    pub bucketing_key: Option<String>,
    /// Served treatment.
    pub treatment: String,
    /// Why the treatment was served. `None` if labels are disabled in
    /// [`ClientConfig`](crate::ClientConfig).
    pub label: Option<String>,
    /// Change number of the split, or -1 if it was not found.
    pub change_number: i64,
    /// Evaluation time in milliseconds since epoch.
    pub time: i64,
}

/// A trait for receiving impressions. Implementations should forward impressions to storage or
/// analytics.
pub trait ImpressionListener {
    /// Receive an impression.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use splitio::{ImpressionListener, Impression};
    /// struct MyImpressionListener;
    ///
    /// impl ImpressionListener for MyImpressionListener {
    ///     fn log_impression(&self, impression: Impression) {
    ///         // Implement impression handling here
    ///     }
    /// }
    /// ```
    ///
    /// # Notes
    ///
    /// This method is called before the treatment is returned to the caller, so it should not
    /// block. Panics are caught and logged; they never affect the returned treatment.
    fn log_impression(&self, impression: Impression);
}

pub(crate) struct NoopImpressionListener;
impl ImpressionListener for NoopImpressionListener {
    fn log_impression(&self, _impression: Impression) {}
}

impl<T: Fn(Impression)> ImpressionListener for T {
    fn log_impression(&self, impression: Impression) {
        self(impression);
    }
}

/// Hand `impression` to `listener`, containing any panic.
pub(crate) fn deliver(listener: &(dyn ImpressionListener + Send + Sync), impression: Impression) {
    let feature = impression.feature.clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        listener.log_impression(impression)
    }));
    if result.is_err() {
        log::warn!(target: "splitio",
                   feature = feature.as_str();
                   "impression listener panicked");
    }
}
