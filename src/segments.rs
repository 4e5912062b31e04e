//! Segments: named sets of keys referenced by `IN_SEGMENT` matchers.
//!
//! A [`Segment`] is shared between the segment storage and every compiled matcher that references
//! it, so updates to segment membership are visible to evaluation without recompiling splits.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use crate::Result;

/// A named set of keys.
#[derive(Debug)]
pub struct Segment {
    name: String,
    state: RwLock<SegmentState>,
}

#[derive(Debug)]
struct SegmentState {
    keys: HashSet<String>,
    change_number: i64,
}

impl Segment {
    /// Create an empty segment that has not been synchronized yet.
    pub fn new(name: impl Into<String>) -> Segment {
        Segment {
            name: name.into(),
            state: RwLock::new(SegmentState {
                keys: HashSet::new(),
                change_number: -1,
            }),
        }
    }

    /// Name of the segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if `key` is a member of the segment.
    pub fn contains(&self, key: &str) -> bool {
        self.read().keys.contains(key)
    }

    /// Change number of the last applied diff, or -1.
    pub fn change_number(&self) -> i64 {
        self.read().change_number
    }

    /// Apply a membership diff. `added` and `removed` are applied together with the new change
    /// number. A diff whose `till` is not newer than the current change number is ignored and
    /// `false` is returned.
    pub fn apply_changes(&self, added: &[String], removed: &[String], till: i64) -> bool {
        let mut state = self
            .state
            .write()
            .expect("thread holding segment lock should not panic");

        if till <= state.change_number {
            log::debug!(target: "splitio",
                        segment_name = self.name.as_str(),
                        till;
                        "ignoring segment changes that are not newer than current state");
            return false;
        }

        for key in removed {
            state.keys.remove(key);
        }
        state.keys.extend(added.iter().cloned());
        state.change_number = till;
        true
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SegmentState> {
        self.state
            .read()
            .expect("thread holding segment lock should not panic")
    }
}

/// Source of segments for split compilation.
pub trait SegmentProvider: Send + Sync {
    /// Get a handle to segment `name`.
    ///
    /// If `block_until_ready` is true, implementations backed by a remote source should wait for
    /// the segment to be fetched before returning.
    fn fetch(&self, name: &str, block_until_ready: bool) -> Result<Arc<Segment>>;
}

/// In-memory segment registry. Unknown segments are created empty on first use, so a split
/// referencing a segment that was never synchronized simply doesn't match.
#[derive(Debug, Default)]
pub struct InMemorySegmentStorage {
    segments: RwLock<HashMap<String, Arc<Segment>>>,
}

impl InMemorySegmentStorage {
    /// Create an empty registry.
    pub fn new() -> InMemorySegmentStorage {
        InMemorySegmentStorage::default()
    }

    /// Get segment `name` if it has been registered.
    pub fn get(&self, name: &str) -> Option<Arc<Segment>> {
        self.segments
            .read()
            .expect("thread holding segments lock should not panic")
            .get(name)
            .cloned()
    }

    /// Names of all registered segments.
    pub fn segment_names(&self) -> Vec<String> {
        self.segments
            .read()
            .expect("thread holding segments lock should not panic")
            .keys()
            .cloned()
            .collect()
    }
}

impl SegmentProvider for InMemorySegmentStorage {
    fn fetch(&self, name: &str, _block_until_ready: bool) -> Result<Arc<Segment>> {
        if let Some(segment) = self.get(name) {
            return Ok(segment);
        }

        let mut segments = self
            .segments
            .write()
            .expect("thread holding segments lock should not panic");
        let segment = segments
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Segment::new(name)));
        Ok(segment.clone())
    }
}
