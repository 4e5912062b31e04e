use std::collections::HashMap;

use crate::{hash::HashAlgorithm, segments::SegmentProvider};

use super::{
    CombiningMatcher, ConditionType, ConditionWire, ParseError, PartitionWire, SplitWire, Status,
    TryParse,
};

/// A split definition compiled into its evaluable form.
#[derive(Debug)]
#[allow(missing_docs)]
pub struct Split {
    /// Unique name of the split (the feature name).
    pub name: String,
    pub traffic_type: Option<String>,
    pub seed: i32,
    pub status: Status,
    pub killed: bool,
    pub default_treatment: String,
    pub change_number: i64,
    pub conditions: Vec<Condition>,
    /// Percentage of traffic (0-100) rollout conditions apply to.
    pub traffic_allocation: u8,
    pub traffic_allocation_seed: i32,
    pub algo: HashAlgorithm,
    /// Treatment to JSON configuration string.
    pub configurations: HashMap<String, String>,
}

#[derive(Debug)]
#[allow(missing_docs)]
pub struct Condition {
    pub condition_type: ConditionType,
    pub(crate) matcher: CombiningMatcher,
    pub partitions: Vec<Partition>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Partition {
    pub treatment: String,
    pub size: u8,
}

impl Split {
    /// Compile a raw `splitChanges` entry. Fails if the entry did not match the wire format or
    /// any part of it cannot be compiled; there is no partially-compiled split.
    pub fn parse(
        entry: TryParse<SplitWire>,
        segments: &dyn SegmentProvider,
        block_until_ready: bool,
    ) -> Result<Split, ParseError> {
        let wire = Result::from(entry).map_err(|_| ParseError::Malformed)?;
        Split::compile(wire, segments, block_until_ready)
    }

    pub(crate) fn compile(
        wire: SplitWire,
        segments: &dyn SegmentProvider,
        block_until_ready: bool,
    ) -> Result<Split, ParseError> {
        let conditions = wire
            .conditions
            .into_iter()
            .map(|condition| compile_condition(condition, segments, block_until_ready))
            .collect::<Result<_, _>>()?;

        Ok(Split {
            name: wire.name,
            traffic_type: wire.traffic_type_name,
            seed: wire.seed,
            status: wire.status,
            killed: wire.killed,
            default_treatment: wire.default_treatment,
            change_number: wire.change_number,
            conditions,
            traffic_allocation: wire.traffic_allocation.unwrap_or(100).min(100),
            traffic_allocation_seed: wire.traffic_allocation_seed.unwrap_or(0),
            algo: HashAlgorithm::from_wire(wire.algo),
            configurations: wire.configurations.unwrap_or_default(),
        })
    }

    /// Distinct treatments across all conditions, in order of first appearance.
    pub fn treatments(&self) -> Vec<String> {
        let mut treatments: Vec<String> = Vec::new();
        for partition in self.conditions.iter().flat_map(|c| c.partitions.iter()) {
            if !treatments.contains(&partition.treatment) {
                treatments.push(partition.treatment.clone());
            }
        }
        treatments
    }

    /// JSON configuration attached to `treatment`, if any.
    pub fn config(&self, treatment: &str) -> Option<&str> {
        self.configurations.get(treatment).map(String::as_str)
    }
}

fn compile_condition(
    condition: ConditionWire,
    segments: &dyn SegmentProvider,
    block_until_ready: bool,
) -> Result<Condition, ParseError> {
    Ok(Condition {
        condition_type: condition.condition_type,
        matcher: CombiningMatcher::compile(condition.matcher_group, segments, block_until_ready)?,
        partitions: condition.partitions.into_iter().map(Partition::from).collect(),
        label: condition.label,
    })
}

impl From<PartitionWire> for Partition {
    fn from(value: PartitionWire) -> Partition {
        Partition {
            treatment: value.treatment,
            size: value.size,
        }
    }
}
