use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use semver::{BuildMetadata, Version};

use crate::{
    evaluator::EvaluationContext, segments::Segment, segments::SegmentProvider, AttributeValue,
    Attributes, Key,
};

use super::{
    transform::{Transform, Truncation},
    DataType, MatcherGroupWire, MatcherType, MatcherWire, ParseError,
};

/// Value a matcher is applied to: either the matching key or an attribute value.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MatchValue<'a> {
    Key(&'a str),
    Attribute(&'a AttributeValue),
}

impl<'a> From<&'a AttributeValue> for MatchValue<'a> {
    fn from(value: &'a AttributeValue) -> MatchValue<'a> {
        MatchValue::Attribute(value)
    }
}

impl<'a> MatchValue<'a> {
    fn as_str(&self) -> Option<&'a str> {
        match self {
            MatchValue::Key(key) => Some(key),
            MatchValue::Attribute(value) => value.as_str(),
        }
    }

    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            MatchValue::Key(s) => s.parse().ok(),
            MatchValue::Attribute(AttributeValue::String(s)) => s.parse().ok(),
            MatchValue::Attribute(AttributeValue::Integer(i)) => Some(*i),
            MatchValue::Attribute(AttributeValue::Number(n)) if n.is_finite() => {
                Some(n.trunc() as i64)
            }
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            MatchValue::Attribute(AttributeValue::Boolean(b)) => Some(*b),
            _ => {
                let s = self.as_str()?;
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }

    fn as_set(&self) -> Option<HashSet<&'a str>> {
        match self {
            MatchValue::Attribute(AttributeValue::List(values)) => {
                Some(values.iter().map(String::as_str).collect())
            }
            _ => None,
        }
    }

    fn as_semver(&self) -> Option<Version> {
        parse_semver(self.as_str()?)
    }
}

/// Logical combiner of a matcher group. Only `AND` exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combiner {
    /// All matchers must match.
    And,
}

/// A matcher group: all matchers combined with [`Combiner`].
#[derive(Debug)]
pub struct CombiningMatcher {
    pub(crate) combiner: Combiner,
    pub(crate) matchers: Vec<AttributeMatcher>,
}

impl CombiningMatcher {
    pub(crate) fn compile(
        wire: MatcherGroupWire,
        segments: &dyn SegmentProvider,
        block_until_ready: bool,
    ) -> Result<CombiningMatcher, ParseError> {
        let combiner = match wire.combiner.as_str() {
            "AND" => Combiner::And,
            other => return Err(ParseError::UnknownCombiner(other.to_owned())),
        };
        let matchers = wire
            .matchers
            .unwrap_or_default()
            .into_iter()
            .map(|matcher| AttributeMatcher::compile(matcher, segments, block_until_ready))
            .collect::<Result<_, _>>()?;
        Ok(CombiningMatcher { combiner, matchers })
    }

    /// Returns `false` for an empty group. Matchers are evaluated in order and evaluation stops
    /// at the first non-match, so dependencies further down are not evaluated needlessly.
    pub(crate) fn matches(
        &self,
        ctx: &EvaluationContext,
        key: &Key,
        attributes: Option<&Attributes>,
    ) -> bool {
        if self.matchers.is_empty() {
            return false;
        }
        match self.combiner {
            Combiner::And => self
                .matchers
                .iter()
                .all(|matcher| matcher.matches(ctx, key, attributes)),
        }
    }
}

/// A concrete matcher bound to the value it looks at.
#[derive(Debug)]
pub struct AttributeMatcher {
    /// Attribute to match. `None` means the matching key.
    pub(crate) attribute: Option<String>,
    pub(crate) negate: bool,
    pub(crate) matcher: Matcher,
}

impl AttributeMatcher {
    fn compile(
        wire: MatcherWire,
        segments: &dyn SegmentProvider,
        block_until_ready: bool,
    ) -> Result<AttributeMatcher, ParseError> {
        let attribute = wire
            .key_selector
            .as_ref()
            .and_then(|selector| selector.attribute.clone());
        let negate = wire.negate;
        let matcher = Matcher::compile(wire, segments, block_until_ready)?;
        Ok(AttributeMatcher {
            attribute,
            negate,
            matcher,
        })
    }

    fn matches(&self, ctx: &EvaluationContext, key: &Key, attributes: Option<&Attributes>) -> bool {
        let value = match &self.attribute {
            None => MatchValue::Key(&key.matching_key),
            Some(name) => match attributes.and_then(|attributes| attributes.get(name)) {
                Some(value) if !value.is_null() => MatchValue::Attribute(value),
                // A missing attribute never matches, negated or not.
                _ => return false,
            },
        };
        self.matcher.matches(&value, ctx, key, attributes) != self.negate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Equal,
    GreaterOrEqual,
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StringOp {
    StartsWith,
    EndsWith,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetOp {
    EqualTo,
    PartOf,
    ContainsAll,
    ContainsAny,
}

/// Closed set of matchers, resolved from the wire format when a split is parsed.
#[derive(Debug)]
pub(crate) enum Matcher {
    AllKeys,
    InSegment(Arc<Segment>),
    Whitelist(HashSet<String>),
    Compare {
        op: CompareOp,
        value: i64,
        transform: Transform,
    },
    Between {
        start: i64,
        end: i64,
        transform: Transform,
    },
    String {
        op: StringOp,
        values: Vec<String>,
    },
    Set {
        op: SetOp,
        values: HashSet<String>,
    },
    Regex(Regex),
    Boolean(bool),
    Dependency {
        split: String,
        treatments: Vec<String>,
    },
    Semver {
        op: CompareOp,
        version: Version,
    },
    BetweenSemver {
        start: Version,
        end: Version,
    },
    InListSemver(Vec<Version>),
}

impl Matcher {
    fn compile(
        wire: MatcherWire,
        segments: &dyn SegmentProvider,
        block_until_ready: bool,
    ) -> Result<Matcher, ParseError> {
        let ty = wire.matcher_type;
        let missing = || ParseError::MissingMatcherData(ty);

        let matcher = match ty {
            MatcherType::AllKeys => Matcher::AllKeys,

            MatcherType::InSegment => {
                let name = wire
                    .user_defined_segment_matcher_data
                    .ok_or_else(missing)?
                    .segment_name;
                let segment = segments.fetch(&name, block_until_ready).map_err(|err| {
                    log::warn!(target: "splitio",
                               segment_name = name.as_str();
                               "failed to fetch segment: {err}");
                    ParseError::SegmentUnavailable(name.clone())
                })?;
                Matcher::InSegment(segment)
            }

            MatcherType::Whitelist => Matcher::Whitelist(
                wire.whitelist_matcher_data
                    .ok_or_else(missing)?
                    .whitelist
                    .into_iter()
                    .collect(),
            ),

            MatcherType::EqualTo
            | MatcherType::GreaterThanOrEqualTo
            | MatcherType::LessThanOrEqualTo => {
                let data = wire.unary_numeric_matcher_data.ok_or_else(missing)?;
                let (op, truncation) = match ty {
                    MatcherType::EqualTo => (CompareOp::Equal, Truncation::Day),
                    MatcherType::GreaterThanOrEqualTo => {
                        (CompareOp::GreaterOrEqual, Truncation::Minute)
                    }
                    _ => (CompareOp::LessOrEqual, Truncation::Minute),
                };
                let transform = Transform::new(data.data_type.unwrap_or_default(), truncation);
                Matcher::Compare {
                    op,
                    value: transform.server_value(data.value).ok_or_else(missing)?,
                    transform,
                }
            }

            MatcherType::Between => {
                let data = wire.between_matcher_data.ok_or_else(missing)?;
                let transform =
                    Transform::new(data.data_type.unwrap_or(DataType::Number), Truncation::Minute);
                Matcher::Between {
                    start: transform.server_value(data.start).ok_or_else(missing)?,
                    end: transform.server_value(data.end).ok_or_else(missing)?,
                    transform,
                }
            }

            MatcherType::StartsWith | MatcherType::EndsWith | MatcherType::ContainsString => {
                let op = match ty {
                    MatcherType::StartsWith => StringOp::StartsWith,
                    MatcherType::EndsWith => StringOp::EndsWith,
                    _ => StringOp::Contains,
                };
                Matcher::String {
                    op,
                    values: wire.whitelist_matcher_data.ok_or_else(missing)?.whitelist,
                }
            }

            MatcherType::EqualToSet
            | MatcherType::PartOfSet
            | MatcherType::ContainsAllOfSet
            | MatcherType::ContainsAnyOfSet => {
                let op = match ty {
                    MatcherType::EqualToSet => SetOp::EqualTo,
                    MatcherType::PartOfSet => SetOp::PartOf,
                    MatcherType::ContainsAllOfSet => SetOp::ContainsAll,
                    _ => SetOp::ContainsAny,
                };
                Matcher::Set {
                    op,
                    values: wire
                        .whitelist_matcher_data
                        .ok_or_else(missing)?
                        .whitelist
                        .into_iter()
                        .collect(),
                }
            }

            MatcherType::MatchesString => {
                let pattern = wire.string_matcher_data.ok_or_else(missing)?;
                let regex = Regex::new(&pattern).map_err(|err| ParseError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })?;
                Matcher::Regex(regex)
            }

            MatcherType::EqualToBoolean => {
                Matcher::Boolean(wire.boolean_matcher_data.ok_or_else(missing)?)
            }

            MatcherType::InSplitTreatment => {
                let data = wire.dependency_matcher_data.ok_or_else(missing)?;
                Matcher::Dependency {
                    split: data.split,
                    treatments: data.treatments,
                }
            }

            MatcherType::EqualToSemver
            | MatcherType::GreaterThanOrEqualToSemver
            | MatcherType::LessThanOrEqualToSemver => {
                let op = match ty {
                    MatcherType::EqualToSemver => CompareOp::Equal,
                    MatcherType::GreaterThanOrEqualToSemver => CompareOp::GreaterOrEqual,
                    _ => CompareOp::LessOrEqual,
                };
                let raw = wire.string_matcher_data.ok_or_else(missing)?;
                Matcher::Semver {
                    op,
                    version: parse_semver(&raw).ok_or(ParseError::InvalidSemver(raw))?,
                }
            }

            MatcherType::BetweenSemver => {
                let data = wire.between_string_matcher_data.ok_or_else(missing)?;
                Matcher::BetweenSemver {
                    start: parse_semver(&data.start).ok_or(ParseError::InvalidSemver(data.start))?,
                    end: parse_semver(&data.end).ok_or(ParseError::InvalidSemver(data.end))?,
                }
            }

            MatcherType::InListSemver => Matcher::InListSemver(
                wire.whitelist_matcher_data
                    .ok_or_else(missing)?
                    .whitelist
                    .into_iter()
                    .map(|raw| parse_semver(&raw).ok_or(ParseError::InvalidSemver(raw)))
                    .collect::<Result<_, _>>()?,
            ),
        };

        Ok(matcher)
    }

    /// Apply the matcher. Returns `false` if the value cannot be coerced to what the matcher
    /// expects.
    pub(crate) fn matches(
        &self,
        value: &MatchValue,
        ctx: &EvaluationContext,
        key: &Key,
        attributes: Option<&Attributes>,
    ) -> bool {
        self.try_match(value, ctx, key, attributes).unwrap_or(false)
    }

    fn try_match(
        &self,
        value: &MatchValue,
        ctx: &EvaluationContext,
        key: &Key,
        attributes: Option<&Attributes>,
    ) -> Option<bool> {
        Some(match self {
            Matcher::AllKeys => true,

            Matcher::InSegment(segment) => segment.contains(value.as_str()?),

            Matcher::Whitelist(whitelist) => whitelist.contains(value.as_str()?),

            Matcher::Compare {
                op,
                value: expected,
                transform,
            } => {
                let actual = transform.input(value)?;
                match op {
                    CompareOp::Equal => actual == *expected,
                    CompareOp::GreaterOrEqual => actual >= *expected,
                    CompareOp::LessOrEqual => actual <= *expected,
                }
            }

            Matcher::Between {
                start,
                end,
                transform,
            } => {
                let actual = transform.input(value)?;
                *start <= actual && actual <= *end
            }

            Matcher::String { op, values } => {
                let s = value.as_str()?;
                values.iter().any(|v| match op {
                    StringOp::StartsWith => s.starts_with(v.as_str()),
                    StringOp::EndsWith => s.ends_with(v.as_str()),
                    StringOp::Contains => s.contains(v.as_str()),
                })
            }

            Matcher::Set { op, values } => {
                let input = value.as_set()?;
                match op {
                    SetOp::EqualTo => {
                        input.len() == values.len()
                            && input.iter().all(|v| values.contains(*v))
                    }
                    SetOp::PartOf => !input.is_empty() && input.iter().all(|v| values.contains(*v)),
                    SetOp::ContainsAll => {
                        !values.is_empty() && values.iter().all(|v| input.contains(v.as_str()))
                    }
                    SetOp::ContainsAny => values.iter().any(|v| input.contains(v.as_str())),
                }
            }

            Matcher::Regex(regex) => regex.is_match(value.as_str()?),

            Matcher::Boolean(expected) => value.as_bool()? == *expected,

            Matcher::Dependency { split, treatments } => {
                let treatment = ctx.evaluate_dependency(split, key, attributes)?;
                treatments.iter().any(|t| *t == treatment)
            }

            Matcher::Semver { op, version } => {
                let actual = value.as_semver()?;
                match op {
                    CompareOp::Equal => actual == *version,
                    CompareOp::GreaterOrEqual => actual >= *version,
                    CompareOp::LessOrEqual => actual <= *version,
                }
            }

            Matcher::BetweenSemver { start, end } => {
                let actual = value.as_semver()?;
                *start <= actual && actual <= *end
            }

            Matcher::InListSemver(versions) => {
                let actual = value.as_semver()?;
                versions.contains(&actual)
            }
        })
    }
}

/// Parse a semantic version, ignoring build metadata (it does not take part in comparisons).
fn parse_semver(s: &str) -> Option<Version> {
    let mut version = Version::parse(s.trim()).ok()?;
    version.build = BuildMetadata::EMPTY;
    Some(version)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use super::{CombiningMatcher, Matcher, MatchValue};
    use crate::{
        evaluator::EvaluationContext,
        segments::{InMemorySegmentStorage, SegmentProvider},
        splits::{MatcherGroupWire, ParseError, Split},
        storage::{InMemorySplitStorage, SplitStorage},
        AttributeValue, Attributes, Key,
    };

    fn compile(matchers: serde_json::Value) -> Result<CombiningMatcher, ParseError> {
        compile_with(matchers, &InMemorySegmentStorage::new())
    }

    fn compile_with(
        matchers: serde_json::Value,
        segments: &dyn SegmentProvider,
    ) -> Result<CombiningMatcher, ParseError> {
        let wire: MatcherGroupWire =
            serde_json::from_value(serde_json::json!({"combiner": "AND", "matchers": matchers}))
                .unwrap();
        CombiningMatcher::compile(wire, segments, false)
    }

    fn eval(matcher: &CombiningMatcher, key: &str, attributes: &Attributes) -> bool {
        let storage = InMemorySplitStorage::new();
        let ctx = EvaluationContext::new(&storage);
        matcher.matches(&ctx, &Key::from(key), Some(attributes))
    }

    fn single(value: &AttributeValue, matcher: serde_json::Value) -> bool {
        let mut matcher = matcher;
        matcher["keySelector"] = serde_json::json!({"trafficType": "user", "attribute": "attr"});
        let m = compile(serde_json::json!([matcher])).unwrap();
        eval(&m, "key", &HashMap::from([("attr".to_owned(), value.clone())]))
    }

    fn s(v: &str) -> AttributeValue {
        v.into()
    }

    fn list(v: &[&str]) -> AttributeValue {
        AttributeValue::List(v.iter().map(|s| (*s).to_owned()).collect())
    }

    #[test]
    fn empty_group_never_matches() {
        let m = compile(serde_json::json!([])).unwrap();
        assert!(!eval(&m, "key", &HashMap::new()));

        let wire: MatcherGroupWire =
            serde_json::from_value(serde_json::json!({"combiner": "AND", "matchers": null}))
                .unwrap();
        let m = CombiningMatcher::compile(wire, &InMemorySegmentStorage::new(), false).unwrap();
        assert!(!eval(&m, "key", &HashMap::new()));
    }

    #[test]
    fn unknown_combiner_fails_compilation() {
        let wire: MatcherGroupWire =
            serde_json::from_value(serde_json::json!({"combiner": "OR", "matchers": []})).unwrap();
        assert_eq!(
            CombiningMatcher::compile(wire, &InMemorySegmentStorage::new(), false).unwrap_err(),
            ParseError::UnknownCombiner("OR".to_owned())
        );
    }

    #[test]
    fn missing_data_fails_compilation() {
        let err = compile(serde_json::json!([{"matcherType": "WHITELIST", "negate": false}]))
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingMatcherData(_)), "{err:?}");
    }

    #[test]
    fn invalid_regex_fails_compilation() {
        let err = compile(serde_json::json!([
            {"matcherType": "MATCHES_STRING", "stringMatcherData": "***bad regex"}
        ]))
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidRegex { .. }), "{err:?}");
    }

    #[test]
    fn all_keys_and_negation() {
        let m = compile(serde_json::json!([{"matcherType": "ALL_KEYS", "negate": false}])).unwrap();
        assert!(eval(&m, "anyone", &HashMap::new()));

        let m = compile(serde_json::json!([{"matcherType": "ALL_KEYS", "negate": true}])).unwrap();
        assert!(!eval(&m, "anyone", &HashMap::new()));
    }

    #[test]
    fn missing_attribute_does_not_match_even_if_negated() {
        let m = compile(serde_json::json!([{
            "keySelector": {"trafficType": "user", "attribute": "plan"},
            "matcherType": "WHITELIST",
            "negate": true,
            "whitelistMatcherData": {"whitelist": ["gold"]}
        }]))
        .unwrap();

        assert!(!eval(&m, "key", &HashMap::new()));
        assert!(!eval(
            &m,
            "key",
            &HashMap::from([("plan".to_owned(), AttributeValue::Null)])
        ));
        assert!(eval(&m, "key", &HashMap::from([("plan".to_owned(), s("silver"))])));

        let storage = crate::storage::InMemorySplitStorage::new();
        let ctx = EvaluationContext::new(&storage);
        assert!(!m.matches(&ctx, &Key::from("key"), None));
    }

    #[test]
    fn whitelist_matches_key() {
        let m = compile(serde_json::json!([{
            "matcherType": "WHITELIST",
            "whitelistMatcherData": {"whitelist": ["alice", "bob"]}
        }]))
        .unwrap();
        assert!(eval(&m, "alice", &HashMap::new()));
        assert!(!eval(&m, "charlie", &HashMap::new()));
    }

    /// Counts split lookups made by dependency matchers.
    #[derive(Default)]
    struct CountingStorage {
        inner: InMemorySplitStorage,
        lookups: AtomicUsize,
    }

    impl SplitStorage for CountingStorage {
        fn get(&self, name: &str) -> Option<Arc<Split>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.get(name)
        }
        fn put(&self, split: Split) {
            self.inner.put(split)
        }
        fn remove(&self, name: &str) -> bool {
            self.inner.remove(name)
        }
        fn change_number(&self) -> i64 {
            self.inner.change_number()
        }
        fn set_change_number(&self, change_number: i64) {
            self.inner.set_change_number(change_number)
        }
        fn splits(&self) -> Vec<Arc<Split>> {
            self.inner.splits()
        }
        fn split_names(&self) -> Vec<String> {
            self.inner.split_names()
        }
    }

    #[test]
    fn and_short_circuits_in_order() {
        let m = compile(serde_json::json!([
            {"matcherType": "WHITELIST", "whitelistMatcherData": {"whitelist": ["alice"]}},
            {
                "matcherType": "IN_SPLIT_TREATMENT",
                "dependencyMatcherData": {"split": "missing", "treatments": ["control"]}
            }
        ]))
        .unwrap();
        let storage = CountingStorage::default();
        let ctx = EvaluationContext::new(&storage);

        assert!(!m.matches(&ctx, &Key::from("bob"), None));
        assert_eq!(storage.lookups.load(Ordering::SeqCst), 0);

        // Once the whitelist passes, the dependency is evaluated: the missing split yields
        // control, which is in its treatment list.
        assert!(m.matches(&ctx, &Key::from("alice"), None));
        assert_eq!(storage.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn numeric_matchers() {
        let eq = serde_json::json!({"matcherType": "EQUAL_TO", "unaryNumericMatcherData": {"dataType": "NUMBER", "value": 10}});
        assert!(single(&10.into(), eq.clone()));
        assert!(single(&s("10"), eq.clone()));
        assert!(single(&AttributeValue::Number(10.4), eq.clone()));
        assert!(!single(&11.into(), eq.clone()));
        assert!(!single(&s("ten"), eq.clone()));
        assert!(!single(&true.into(), eq));

        let gte = serde_json::json!({"matcherType": "GREATER_THAN_OR_EQUAL_TO", "unaryNumericMatcherData": {"dataType": "NUMBER", "value": 10}});
        assert!(single(&10.into(), gte.clone()));
        assert!(single(&11.into(), gte.clone()));
        assert!(!single(&9.into(), gte));

        let lte = serde_json::json!({"matcherType": "LESS_THAN_OR_EQUAL_TO", "unaryNumericMatcherData": {"dataType": "NUMBER", "value": 10}});
        assert!(single(&10.into(), lte.clone()));
        assert!(!single(&11.into(), lte));

        let between = serde_json::json!({"matcherType": "BETWEEN", "betweenMatcherData": {"dataType": "NUMBER", "start": 5, "end": 10}});
        assert!(single(&5.into(), between.clone()));
        assert!(single(&10.into(), between.clone()));
        assert!(!single(&4.into(), between.clone()));
        assert!(!single(&11.into(), between));
    }

    #[test]
    fn datetime_matchers() {
        // 2024-03-05T17:31:12Z in milliseconds on the wire, seconds in attributes.
        let eq = serde_json::json!({"matcherType": "EQUAL_TO", "unaryNumericMatcherData": {"dataType": "DATETIME", "value": 1_709_659_872_000_i64}});
        assert!(single(&1_709_596_800_i64.into(), eq.clone()), "same day, midnight");
        assert!(single(&1_709_679_599_i64.into(), eq.clone()), "same day, 22:59:59");
        assert!(!single(&1_709_683_200_i64.into(), eq), "next day");

        let gte = serde_json::json!({"matcherType": "GREATER_THAN_OR_EQUAL_TO", "unaryNumericMatcherData": {"dataType": "DATETIME", "value": 1_709_659_872_000_i64}});
        assert!(single(&1_709_659_860_i64.into(), gte.clone()), "same minute");
        assert!(!single(&1_709_659_859_i64.into(), gte));

        let between = serde_json::json!({"matcherType": "BETWEEN", "betweenMatcherData": {"dataType": "DATETIME", "start": 1_709_659_800_000_i64, "end": 1_709_659_920_000_i64}});
        assert!(single(&1_709_659_900_i64.into(), between.clone()));
        assert!(single(&1_709_659_979_i64.into(), between.clone()), "end minute");
        assert!(!single(&1_709_659_980_i64.into(), between));
    }

    #[test]
    fn string_matchers() {
        let starts = serde_json::json!({"matcherType": "STARTS_WITH", "whitelistMatcherData": {"whitelist": ["abc", "xyz"]}});
        assert!(single(&s("abcdef"), starts.clone()));
        assert!(single(&s("xyz"), starts.clone()));
        assert!(!single(&s("ABCdef"), starts.clone()), "case sensitive");
        assert!(!single(&10.into(), starts));

        let ends = serde_json::json!({"matcherType": "ENDS_WITH", "whitelistMatcherData": {"whitelist": ["@split.io"]}});
        assert!(single(&s("jane@split.io"), ends.clone()));
        assert!(!single(&s("jane@split.com"), ends));

        let contains = serde_json::json!({"matcherType": "CONTAINS_STRING", "whitelistMatcherData": {"whitelist": ["oo"]}});
        assert!(single(&s("food"), contains.clone()));
        assert!(!single(&s("fod"), contains));

        let regex = serde_json::json!({"matcherType": "MATCHES_STRING", "stringMatcherData": "^[a-z]+@split\\.io$"});
        assert!(single(&s("jane@split.io"), regex.clone()));
        assert!(!single(&s("Jane@split.io"), regex));
    }

    #[test]
    fn set_matchers() {
        let data = serde_json::json!({"whitelist": ["a", "b", "c"]});
        let matcher = |ty: &str| serde_json::json!({"matcherType": ty, "whitelistMatcherData": data});

        assert!(single(&list(&["c", "b", "a"]), matcher("EQUAL_TO_SET")));
        assert!(!single(&list(&["a", "b"]), matcher("EQUAL_TO_SET")));

        assert!(single(&list(&["a", "b"]), matcher("PART_OF_SET")));
        assert!(!single(&list(&["a", "d"]), matcher("PART_OF_SET")));
        assert!(!single(&list(&[]), matcher("PART_OF_SET")));

        assert!(single(&list(&["a", "b", "c", "d"]), matcher("CONTAINS_ALL_OF_SET")));
        assert!(!single(&list(&["a", "b"]), matcher("CONTAINS_ALL_OF_SET")));

        assert!(single(&list(&["z", "c"]), matcher("CONTAINS_ANY_OF_SET")));
        assert!(!single(&list(&["z"]), matcher("CONTAINS_ANY_OF_SET")));

        assert!(!single(&s("a"), matcher("CONTAINS_ANY_OF_SET")), "plain strings are not sets");
    }

    #[test]
    fn contains_all_with_empty_whitelist_never_matches() {
        let m = serde_json::json!({"matcherType": "CONTAINS_ALL_OF_SET", "whitelistMatcherData": {"whitelist": []}});
        assert!(!single(&list(&["a"]), m));
    }

    #[test]
    fn boolean_matcher() {
        let m = serde_json::json!({"matcherType": "EQUAL_TO_BOOLEAN", "booleanMatcherData": true});
        assert!(single(&true.into(), m.clone()));
        assert!(single(&s("TRUE"), m.clone()));
        assert!(!single(&false.into(), m.clone()));
        assert!(!single(&s("yes"), m.clone()));
        assert!(!single(&1.into(), m));
    }

    #[test]
    fn semver_matchers() {
        let eq = serde_json::json!({"matcherType": "EQUAL_TO_SEMVER", "stringMatcherData": "2.1.0"});
        assert!(single(&s("2.1.0"), eq.clone()));
        assert!(single(&s("2.1.0+build.7"), eq.clone()), "build metadata is ignored");
        assert!(!single(&s("2.1.0-rc.1"), eq.clone()));
        assert!(!single(&s("2.1"), eq));

        let gte = serde_json::json!({"matcherType": "GREATER_THAN_OR_EQUAL_TO_SEMVER", "stringMatcherData": "1.2.0"});
        assert!(single(&s("1.10.0"), gte.clone()));
        assert!(!single(&s("1.2.0-alpha"), gte));

        let between = serde_json::json!({"matcherType": "BETWEEN_SEMVER", "betweenStringMatcherData": {"start": "1.0.0", "end": "2.0.0"}});
        assert!(single(&s("1.5.3"), between.clone()));
        assert!(!single(&s("2.0.1"), between));

        let in_list = serde_json::json!({"matcherType": "IN_LIST_SEMVER", "whitelistMatcherData": {"whitelist": ["1.0.0", "3.1.4"]}});
        assert!(single(&s("3.1.4"), in_list.clone()));
        assert!(!single(&s("3.1.5"), in_list));
    }

    #[test]
    fn invalid_semver_fails_compilation() {
        let err = compile(serde_json::json!([
            {"matcherType": "EQUAL_TO_SEMVER", "stringMatcherData": "not-a-version"}
        ]))
        .unwrap_err();
        assert_eq!(err, ParseError::InvalidSemver("not-a-version".to_owned()));
    }

    #[test]
    fn segment_matcher_uses_shared_segment() {
        let segments = InMemorySegmentStorage::new();
        let m = compile_with(
            serde_json::json!([{
                "matcherType": "IN_SEGMENT",
                "userDefinedSegmentMatcherData": {"segmentName": "employees"}
            }]),
            &segments,
        )
        .unwrap();

        assert!(!eval(&m, "alice", &HashMap::new()));

        let segment = segments.fetch("employees", false).unwrap();
        segment.apply_changes(&["alice".to_owned()], &[], 10);
        assert!(eval(&m, "alice", &HashMap::new()));
        assert!(!eval(&m, "bob", &HashMap::new()));
    }

    #[test]
    fn key_input_coercions() {
        let storage = crate::storage::InMemorySplitStorage::new();
        let ctx = EvaluationContext::new(&storage);
        let key = Key::from("42");
        let m = Matcher::Boolean(true);
        assert!(!m.matches(&MatchValue::Key("42"), &ctx, &key, None));
        assert_eq!(MatchValue::Key("42").as_i64(), Some(42));
    }
}
