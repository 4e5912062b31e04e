//! Treatment evaluation.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    splits::{ConditionType, Split},
    splitter::{self, get_bucket, CONTROL},
    storage::SplitStorage,
    Attributes, Key,
};

/// Dependency matchers deeper than this evaluate to no match.
const MAX_DEPENDENCY_DEPTH: usize = 10;

/// Labels explaining why a treatment was returned, other than the label of the matching
/// condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    /// The split is killed; the default treatment is returned.
    #[serde(rename = "killed")]
    Killed,
    /// The key is outside the split's traffic allocation.
    #[serde(rename = "not in split")]
    NotInSplit,
    /// No condition matched.
    #[serde(rename = "default rule")]
    DefaultRule,
    /// The split is unknown.
    #[serde(rename = "definition not found")]
    DefinitionNotFound,
    /// Evaluation could not be performed (invalid input, client destroyed, internal error).
    #[serde(rename = "exception")]
    Exception,
    /// The client has not synchronized yet.
    #[serde(rename = "not ready")]
    NotReady,
}

impl Label {
    /// Wire representation of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Killed => "killed",
            Label::NotInSplit => "not in split",
            Label::DefaultRule => "default rule",
            Label::DefinitionNotFound => "definition not found",
            Label::Exception => "exception",
            Label::NotReady => "not ready",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating a split for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// The treatment.
    pub treatment: String,
    /// Why `treatment` was returned: either a [`Label`] or the label of the matching condition.
    pub label: String,
    /// Change number of the split, or -1 if it was not found.
    pub change_number: i64,
    /// JSON configuration attached to the treatment.
    pub config: Option<String>,
}

impl Evaluation {
    /// [`CONTROL`] treatment with `label`.
    pub fn control(label: Label) -> Evaluation {
        Evaluation {
            treatment: CONTROL.to_owned(),
            label: label.as_str().to_owned(),
            change_number: -1,
            config: None,
        }
    }

    fn for_split(split: &Split, treatment: &str, label: &str) -> Evaluation {
        Evaluation {
            treatment: treatment.to_owned(),
            label: label.to_owned(),
            change_number: split.change_number,
            config: split.config(treatment).map(str::to_owned),
        }
    }
}

/// Evaluate `feature` for `key`.
///
/// Never fails: an unknown split evaluates to [`CONTROL`] with
/// [`Label::DefinitionNotFound`].
pub fn evaluate(
    storage: &dyn SplitStorage,
    key: &Key,
    feature: &str,
    attributes: Option<&Attributes>,
) -> Evaluation {
    EvaluationContext::new(storage).evaluate(key, feature, attributes)
}

/// Evaluation state shared with dependency matchers.
pub(crate) struct EvaluationContext<'a> {
    storage: &'a dyn SplitStorage,
    depth: usize,
}

impl<'a> EvaluationContext<'a> {
    pub(crate) fn new(storage: &'a dyn SplitStorage) -> EvaluationContext<'a> {
        EvaluationContext { storage, depth: 0 }
    }

    fn evaluate(&self, key: &Key, feature: &str, attributes: Option<&Attributes>) -> Evaluation {
        let Some(split) = self.storage.get(feature) else {
            log::warn!(target: "splitio",
                       feature,
                       matching_key = key.matching_key.as_str();
                       "split definition not found");
            return Evaluation::control(Label::DefinitionNotFound);
        };

        let evaluation = self.evaluate_split(&split, key, attributes);

        log::trace!(target: "splitio",
                    feature,
                    matching_key = key.matching_key.as_str(),
                    evaluation:serde = evaluation;
                    "evaluated a split");

        evaluation
    }

    /// Evaluate a split a dependency matcher refers to. Returns `None` when the dependency chain
    /// is too deep.
    pub(crate) fn evaluate_dependency(
        &self,
        feature: &str,
        key: &Key,
        attributes: Option<&Attributes>,
    ) -> Option<String> {
        if self.depth >= MAX_DEPENDENCY_DEPTH {
            log::warn!(target: "splitio",
                       feature,
                       depth = self.depth;
                       "split dependency chain is too deep, treating dependency as not matching");
            return None;
        }

        let nested = EvaluationContext {
            storage: self.storage,
            depth: self.depth + 1,
        };
        Some(nested.evaluate(key, feature, attributes).treatment)
    }

    fn evaluate_split(
        &self,
        split: &Split,
        key: &Key,
        attributes: Option<&Attributes>,
    ) -> Evaluation {
        if split.killed {
            return Evaluation::for_split(split, &split.default_treatment, Label::Killed.as_str());
        }

        let bucketing_key = key.bucketing_key();
        let mut rollout_entered = false;

        for condition in &split.conditions {
            if !rollout_entered && condition.condition_type == ConditionType::Rollout {
                if split.traffic_allocation < 100 {
                    let bucket =
                        get_bucket(split.algo.hash(bucketing_key, split.traffic_allocation_seed));
                    if bucket > split.traffic_allocation {
                        return Evaluation::for_split(
                            split,
                            &split.default_treatment,
                            Label::NotInSplit.as_str(),
                        );
                    }
                }
                rollout_entered = true;
            }

            if condition.matcher.matches(self, key, attributes) {
                let treatment = splitter::get_treatment(
                    bucketing_key,
                    split.seed,
                    &condition.partitions,
                    split.algo,
                );
                return Evaluation::for_split(
                    split,
                    treatment,
                    condition.label.as_deref().unwrap_or_default(),
                );
            }
        }

        Evaluation::for_split(split, &split.default_treatment, Label::DefaultRule.as_str())
    }
}
