//! Wire format of the `splitChanges` endpoint.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Response of the `splitChanges` endpoint: every split that changed in `(since, till]`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SplitChanges {
    /// Change number the delta was computed from.
    pub since: i64,
    /// Change number of the newest change included in the delta.
    pub till: i64,
    /// Changed splits.
    ///
    /// Each entry is wrapped in `TryParse` so that a split the SDK cannot parse (e.g., a new
    /// matcher type) does not prevent applying the rest of the delta.
    #[serde(default)]
    pub splits: Vec<TryParse<SplitWire>>,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Result<T, serde_json::Value> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Ok(v),
            TryParse::ParseFailed(v) => Err(v),
        }
    }
}

impl TryParse<SplitWire> {
    /// Name of the split, if it could be recovered even from an unparseable entry.
    pub fn name(&self) -> Option<&str> {
        match self {
            TryParse::Parsed(split) => Some(&split.name),
            TryParse::ParseFailed(value) => value.get("name")?.as_str(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum Status {
    Active,
    Archived,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct SplitWire {
    pub name: String,
    #[serde(default)]
    pub traffic_type_name: Option<String>,
    pub seed: i32,
    pub status: Status,
    #[serde(default)]
    pub killed: bool,
    pub default_treatment: String,
    #[serde(default)]
    pub change_number: i64,
    #[serde(default)]
    pub algo: Option<i64>,
    #[serde(default)]
    pub traffic_allocation: Option<u8>,
    #[serde(default)]
    pub traffic_allocation_seed: Option<i32>,
    #[serde(default)]
    pub conditions: Vec<ConditionWire>,
    /// Treatment to JSON configuration string.
    #[serde(default)]
    pub configurations: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum ConditionType {
    /// Conditions without a type predate traffic allocation and are never gated by it.
    #[default]
    Whitelist,
    Rollout,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ConditionWire {
    #[serde(default)]
    pub condition_type: ConditionType,
    pub matcher_group: MatcherGroupWire,
    #[serde(default)]
    pub partitions: Vec<PartitionWire>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MatcherGroupWire {
    /// Only `AND` is known. Kept as a string so an unknown combiner is reported as a compile
    /// error for this split.
    pub combiner: String,
    #[serde(default)]
    pub matchers: Option<Vec<MatcherWire>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct PartitionWire {
    pub treatment: String,
    pub size: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MatcherWire {
    #[serde(default)]
    pub key_selector: Option<KeySelectorWire>,
    pub matcher_type: MatcherType,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub user_defined_segment_matcher_data: Option<SegmentMatcherData>,
    #[serde(default)]
    pub whitelist_matcher_data: Option<WhitelistMatcherData>,
    #[serde(default)]
    pub unary_numeric_matcher_data: Option<UnaryNumericMatcherData>,
    #[serde(default)]
    pub between_matcher_data: Option<BetweenMatcherData>,
    #[serde(default)]
    pub boolean_matcher_data: Option<bool>,
    #[serde(default)]
    pub dependency_matcher_data: Option<DependencyMatcherData>,
    #[serde(default)]
    pub string_matcher_data: Option<String>,
    #[serde(default)]
    pub between_string_matcher_data: Option<BetweenStringMatcherData>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct KeySelectorWire {
    #[serde(default)]
    pub traffic_type: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
}

/// Every matcher type the SDK understands. An unknown type fails parsing of the whole split.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum MatcherType {
    AllKeys,
    InSegment,
    Whitelist,
    EqualTo,
    GreaterThanOrEqualTo,
    LessThanOrEqualTo,
    Between,
    EqualToSet,
    PartOfSet,
    ContainsAllOfSet,
    ContainsAnyOfSet,
    StartsWith,
    EndsWith,
    ContainsString,
    MatchesString,
    EqualToBoolean,
    InSplitTreatment,
    EqualToSemver,
    GreaterThanOrEqualToSemver,
    LessThanOrEqualToSemver,
    BetweenSemver,
    InListSemver,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct SegmentMatcherData {
    pub segment_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct WhitelistMatcherData {
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// Data type of numeric matchers.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// Plain integers.
    #[default]
    Number,
    /// Timestamps. Matcher values are milliseconds since epoch, attribute values are seconds.
    Datetime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct UnaryNumericMatcherData {
    #[serde(default)]
    pub data_type: Option<DataType>,
    pub value: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BetweenMatcherData {
    #[serde(default)]
    pub data_type: Option<DataType>,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct DependencyMatcherData {
    pub split: String,
    #[serde(default)]
    pub treatments: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BetweenStringMatcherData {
    pub start: String,
    pub end: String,
}
