//! Split storage. [`SplitStorage`] abstracts over where compiled splits live; the default
//! [`InMemorySplitStorage`] provides concurrent access for readers (e.g., evaluation) and the
//! writer (the synchronizer).
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::splits::Split;

/// A batch of split changes with the change number they bring the storage to.
///
/// Holds at most one change per split name; a later change to the same split replaces the earlier
/// one.
#[derive(Debug)]
pub struct SplitUpdate {
    /// `Some` stores the split, `None` removes it.
    changes: HashMap<String, Option<Split>>,
    /// New change number of the storage.
    pub change_number: i64,
}

impl SplitUpdate {
    /// Create an empty update bringing storage to `change_number`.
    pub fn new(change_number: i64) -> SplitUpdate {
        SplitUpdate {
            changes: HashMap::new(),
            change_number,
        }
    }

    /// Schedule `split` to be stored.
    pub fn put(&mut self, split: Split) {
        self.changes.insert(split.name.clone(), Some(split));
    }

    /// Schedule split `name` to be removed.
    pub fn remove(&mut self, name: String) {
        self.changes.insert(name, None);
    }

    /// Number of splits to store.
    pub fn puts(&self) -> usize {
        self.changes.values().filter(|change| change.is_some()).count()
    }

    /// Number of splits to remove.
    pub fn removes(&self) -> usize {
        self.changes.values().filter(|change| change.is_none()).count()
    }

    /// Consume the update, yielding each split name with its change.
    pub fn into_changes(self) -> impl Iterator<Item = (String, Option<Split>)> {
        self.changes.into_iter()
    }
}

/// Storage of compiled splits and the change number they are current as of.
pub trait SplitStorage: Send + Sync {
    /// Get split `name`.
    fn get(&self, name: &str) -> Option<Arc<Split>>;

    /// Insert or replace a split.
    fn put(&self, split: Split);

    /// Remove split `name`. Returns `true` if it was present.
    fn remove(&self, name: &str) -> bool;

    /// Change number the storage is synchronized to, or -1 before the first synchronization.
    fn change_number(&self) -> i64;

    /// Set the change number the storage is synchronized to.
    fn set_change_number(&self, change_number: i64);

    /// All stored splits.
    fn splits(&self) -> Vec<Arc<Split>>;

    /// Names of all stored splits.
    fn split_names(&self) -> Vec<String>;

    /// Apply a batch of changes.
    ///
    /// The default implementation applies changes one by one and sets the change number last, so
    /// a concurrent reader may observe part of the batch. Implementations that can do better
    /// should apply the whole update atomically.
    fn apply(&self, update: SplitUpdate) {
        let change_number = update.change_number;
        for (name, change) in update.into_changes() {
            match change {
                Some(split) => self.put(split),
                None => {
                    self.remove(&name);
                }
            }
        }
        self.set_change_number(change_number);
    }
}

#[derive(Debug, Clone)]
struct SplitCache {
    splits: HashMap<String, Arc<Split>>,
    change_number: i64,
}

impl Default for SplitCache {
    fn default() -> SplitCache {
        SplitCache {
            splits: HashMap::new(),
            change_number: -1,
        }
    }
}

/// `InMemorySplitStorage` provides thread-safe (`Sync`) storage of splits.
///
/// Readers take a snapshot of the cache; writers build the next snapshot and swap it in, so an
/// [`apply`](SplitStorage::apply) is observed either entirely or not at all. The change number
/// never goes backwards.
#[derive(Debug, Default)]
pub struct InMemorySplitStorage {
    cache: RwLock<Arc<SplitCache>>,
}

impl InMemorySplitStorage {
    /// Create a new empty storage.
    pub fn new() -> InMemorySplitStorage {
        InMemorySplitStorage::default()
    }

    fn snapshot(&self) -> Arc<SplitCache> {
        // self.cache.read() returns Err() only if the lock is poisoned (writer panicked while
        // holding the lock), which should never happen.
        self.cache
            .read()
            .expect("thread holding split cache lock should not panic")
            .clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut SplitCache) -> R) -> R {
        let mut slot = self
            .cache
            .write()
            .expect("thread holding split cache lock should not panic");
        // Copies the cache only if a reader still holds the current snapshot.
        f(Arc::make_mut(&mut *slot))
    }
}

impl SplitCache {
    fn advance(&mut self, change_number: i64) {
        if change_number > self.change_number {
            self.change_number = change_number;
        }
    }
}

impl SplitStorage for InMemorySplitStorage {
    fn get(&self, name: &str) -> Option<Arc<Split>> {
        self.snapshot().splits.get(name).cloned()
    }

    fn put(&self, split: Split) {
        self.update(|cache| {
            cache.splits.insert(split.name.clone(), Arc::new(split));
        })
    }

    fn remove(&self, name: &str) -> bool {
        self.update(|cache| cache.splits.remove(name).is_some())
    }

    fn change_number(&self) -> i64 {
        self.snapshot().change_number
    }

    fn set_change_number(&self, change_number: i64) {
        self.update(|cache| cache.advance(change_number))
    }

    fn splits(&self) -> Vec<Arc<Split>> {
        self.snapshot().splits.values().cloned().collect()
    }

    fn split_names(&self) -> Vec<String> {
        self.snapshot().splits.keys().cloned().collect()
    }

    fn apply(&self, update: SplitUpdate) {
        self.update(|cache| {
            let change_number = update.change_number;
            for (name, change) in update.into_changes() {
                match change {
                    Some(split) => {
                        cache.splits.insert(name, Arc::new(split));
                    }
                    None => {
                        cache.splits.remove(&name);
                    }
                }
            }
            cache.advance(change_number);
        })
    }
}
