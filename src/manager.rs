//! Read-only views of the splits currently in storage.
use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{splits::Split, storage::SplitStorage};

/// Summary of a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct SplitView {
    pub name: String,
    pub traffic_type: Option<String>,
    pub killed: bool,
    /// Treatments the split can serve (excluding its default treatment unless a condition
    /// serves it too).
    pub treatments: Vec<String>,
    pub change_number: i64,
    /// Treatment to JSON configuration string.
    pub configs: HashMap<String, String>,
    pub default_treatment: String,
}

impl From<&Split> for SplitView {
    fn from(split: &Split) -> SplitView {
        SplitView {
            name: split.name.clone(),
            traffic_type: split.traffic_type.clone(),
            killed: split.killed,
            treatments: split.treatments(),
            change_number: split.change_number,
            configs: split.configurations.clone(),
            default_treatment: split.default_treatment.clone(),
        }
    }
}

/// Inspects the splits known to a [`Client`](crate::Client).
#[derive(Clone)]
pub struct SplitManager {
    storage: Arc<dyn SplitStorage>,
}

impl SplitManager {
    /// Create a manager over `storage`.
    pub fn new(storage: Arc<dyn SplitStorage>) -> SplitManager {
        SplitManager { storage }
    }

    /// Names of all splits, sorted.
    pub fn split_names(&self) -> Vec<String> {
        let mut names = self.storage.split_names();
        names.sort();
        names
    }

    /// Views of all splits, sorted by name.
    pub fn splits(&self) -> Vec<SplitView> {
        let mut views: Vec<SplitView> = self
            .storage
            .splits()
            .iter()
            .map(|split| SplitView::from(split.as_ref()))
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    /// View of split `name`.
    pub fn split(&self, name: &str) -> Option<SplitView> {
        self.storage
            .get(name)
            .map(|split| SplitView::from(split.as_ref()))
    }
}
