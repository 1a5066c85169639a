use std::borrow::Borrow;
use std::fmt;
use std::hash::BuildHasher;
use std::hash::Hash;
use std::ops::Deref;
use std::ops::Index;

use itertools::Itertools;
use log::debug;
use log::warn;
use rustc_hash::FxBuildHasher;

use atlas_utilities::GenerationCounter;
use atlas_utilities::GenerationalIndex;

use crate::PageVec;

/// A type-safe index for use with [IndexedSet] and [crate::IndexedTable]. Uses
/// generational indices in debug builds to assert correct usage of indices.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetIndex(GenerationalIndex);

impl Deref for SetIndex {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for SetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetIndex({:?})", self.0)
    }
}

impl fmt::Display for SetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marks a bucket that has never been used since the last rehash.
const EMPTY: usize = usize::MAX;

/// Marks a bucket whose key has been removed, probing continues past it.
const DELETED: usize = usize::MAX - 1;

/// The smallest table size, of the form `2^k - 1`.
const MIN_TABLE_SIZE: usize = 7;

/// The initial table size used by [IndexedSet::new].
pub const DEFAULT_INITIAL_SIZE: usize = 127;

/// The maximum load percentage used by [IndexedSet::new].
pub const DEFAULT_MAX_LOAD: usize = 75;

/// A set that assigns a unique, small index to every key.
///
/// # Details
///
/// The hash table uses open addressing with linear probing (step one). Its size
/// is always of the form `2^k - 1`, so the size doubles as the bit mask that
/// reduces a hash to a bucket, and the bucket array has `size + 1` entries.
/// Buckets store indices into a paged array of keys. Removing a key leaves a
/// [DELETED] tombstone in its bucket, and its index is pushed on a stack so that
/// the next new key reuses it.
///
/// The table is rehashed as soon as the number of used buckets (live keys and
/// tombstones) reaches the maximum load percentage of the table size. When at
/// least half of the used buckets are tombstones the table is rehashed at the
/// same size, otherwise it grows to the next `2^k - 1`. If the table cannot
/// grow, the maximum load is raised to 100% and a warning is logged.
pub struct IndexedSet<K, S = FxBuildHasher> {
    /// The open addressing table, contains key indices, [EMPTY] or [DELETED].
    buckets: Vec<usize>,
    /// The keys by index, removed keys are `None`.
    keys: PageVec<Option<K>>,
    /// Stack of indices that have been removed.
    free: Vec<usize>,
    /// The number of buckets that are not [EMPTY].
    nr_entries: usize,
    /// The number of [DELETED] buckets.
    nr_deletions: usize,
    /// Maximum load percentage of the table.
    max_load: usize,
    /// Upper bound on the table size, only lowered by tests to simulate failing growth.
    size_limit: usize,
    generation_counter: GenerationCounter,
    hasher: S,
}

/// The result of probing for a key.
enum Probe {
    /// The key was found in the given bucket and has the given index.
    Occupied(usize, usize),
    /// The key is absent, the given bucket is where it should be inserted.
    Vacant(usize),
}

impl<K> IndexedSet<K, FxBuildHasher> {
    /// Creates an empty set with the default initial size and maximum load.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_SIZE, DEFAULT_MAX_LOAD)
    }

    /// Creates an empty set whose table holds at least `initial_size` buckets,
    /// rounded up to the next `2^k - 1`, with the given maximum load percentage.
    pub fn with_capacity(initial_size: usize, max_load_pct: usize) -> Self {
        Self::with_capacity_and_hasher(initial_size, max_load_pct, FxBuildHasher)
    }
}

impl<K, S> IndexedSet<K, S> {
    pub fn with_capacity_and_hasher(initial_size: usize, max_load_pct: usize, hasher: S) -> Self {
        assert!(
            (1..=100).contains(&max_load_pct),
            "The maximum load must be a percentage between 1 and 100, got {max_load_pct}"
        );

        IndexedSet {
            buckets: vec![EMPTY; round_table_size(initial_size) + 1],
            keys: PageVec::new(),
            free: Vec::new(),
            nr_entries: 0,
            nr_deletions: 0,
            max_load: max_load_pct,
            size_limit: usize::MAX,
            generation_counter: GenerationCounter::new(),
            hasher,
        }
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len() - self.free.len()
    }

    /// Returns true iff the set has no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the size of the hash table, always of the form `2^k - 1`.
    pub fn table_size(&self) -> usize {
        self.buckets.len() - 1
    }

    /// Returns the current maximum load percentage.
    pub fn max_load(&self) -> usize {
        self.max_load
    }

    /// Returns the number of tombstones in the hash table.
    pub fn nr_deletions(&self) -> usize {
        self.nr_deletions
    }

    /// Returns one more than the largest index handed out since the last reset.
    pub fn index_bound(&self) -> usize {
        self.keys.len()
    }

    /// Returns the key at the given index, or None when it has been removed.
    pub fn get(&self, index: SetIndex) -> Option<&K> {
        let index = self.generation_counter.get_index(index.0);
        self.keys.get(index).and_then(Option::as_ref)
    }

    /// Returns the key at the given index.
    ///
    /// The index must refer to a key that is in the set.
    pub fn get_by_index(&self, index: SetIndex) -> &K {
        match self.get(index) {
            Some(key) => key,
            None => panic!("Index {index} does not refer to a key in the indexed set"),
        }
    }

    /// Returns an iterator over the indices and keys in the set, ordered by index.
    pub fn iter(&self) -> impl Iterator<Item = (SetIndex, &K)> {
        self.keys.iter().enumerate().filter_map(|(index, key)| {
            key.as_ref()
                .map(|key| (SetIndex(self.generation_counter.recall_index(index)), key))
        })
    }

    /// Returns an iterator over the keys in the set, ordered by index.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.keys.iter().flatten()
    }

    /// Removes all keys, but keeps the allocated storage. Indices handed out before are invalidated.
    pub fn reset(&mut self) {
        self.buckets.fill(EMPTY);
        self.keys.clear();
        self.free.clear();
        self.nr_entries = 0;
        self.nr_deletions = 0;
    }

    /// Checks the generation of the index and returns its position.
    pub(crate) fn position(&self, index: SetIndex) -> usize {
        self.generation_counter.get_index(index.0)
    }

    /// Limits the size to which the table can grow.
    #[cfg(test)]
    pub(crate) fn limit_table_size(&mut self, limit: usize) {
        self.size_limit = limit;
    }
}

impl<K: Clone, S> IndexedSet<K, S> {
    /// Returns a vector containing all keys of this set, ordered by index.
    pub fn to_vec(&self) -> Vec<K> {
        self.keys().cloned().collect()
    }
}

impl<K: Hash + Eq, S: BuildHasher> IndexedSet<K, S> {
    /// Inserts the given key.
    ///
    /// Returns the index of the key, and whether the key was newly inserted.
    pub fn put(&mut self, key: K) -> (SetIndex, bool) {
        match self.probe(&key) {
            Probe::Occupied(_, index) => (SetIndex(self.generation_counter.recall_index(index)), false),
            Probe::Vacant(bucket) => {
                if self.buckets[bucket] == DELETED {
                    self.nr_deletions -= 1;
                } else {
                    self.nr_entries += 1;
                }

                let index = match self.free.pop() {
                    Some(index) => {
                        self.keys[index] = Some(key);
                        index
                    }
                    None => self.keys.push(Some(key)),
                };

                self.buckets[bucket] = index;
                let result = SetIndex(self.generation_counter.create_index(index));

                self.check_resize();
                (result, true)
            }
        }
    }

    /// Returns the index of the given key, or None if it is not in the set.
    pub fn get_index<Q>(&self, key: &Q) -> Option<SetIndex>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.probe(key) {
            Probe::Occupied(_, index) => Some(SetIndex(self.generation_counter.recall_index(index))),
            Probe::Vacant(_) => None,
        }
    }

    /// Returns true iff the set contains the given key.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_index(key).is_some()
    }

    /// Removes the given key, returns true iff it was in the set.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.probe(key) {
            Probe::Occupied(bucket, index) => {
                self.buckets[bucket] = DELETED;
                self.nr_deletions += 1;
                self.keys[index] = None;
                self.free.push(index);
                true
            }
            Probe::Vacant(_) => false,
        }
    }

    /// Looks up the key. There is always at least one [EMPTY] bucket, so probing terminates.
    fn probe<Q>(&self, key: &Q) -> Probe
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mask = self.table_size();
        let mut bucket = (self.hasher.hash_one(key) as usize) & mask;
        let mut first_deleted = None;

        loop {
            match self.buckets[bucket] {
                EMPTY => return Probe::Vacant(first_deleted.unwrap_or(bucket)),
                DELETED => {
                    if first_deleted.is_none() {
                        first_deleted = Some(bucket);
                    }
                }
                index => {
                    if let Some(existing) = &self.keys[index] {
                        if existing.borrow() == key {
                            return Probe::Occupied(bucket, index);
                        }
                    }
                }
            }

            bucket = (bucket + 1) & mask;
        }
    }

    /// Rehashes the table while the used buckets exceed the maximum load.
    fn check_resize(&mut self) {
        while self.nr_entries * 100 >= self.max_load * self.table_size() {
            let new_size = if self.nr_deletions * 2 >= self.nr_entries {
                self.table_size()
            } else {
                self.table_size() * 2 + 1
            };

            if !self.rehash(new_size) {
                if self.max_load < 100 {
                    warn!(
                        "Could not resize the indexed set table to {new_size} buckets, continuing with reduced performance"
                    );
                    self.max_load = 100;
                } else {
                    panic!(
                        "The indexed set table is full at {} buckets and cannot be resized",
                        self.table_size()
                    );
                }
            }
        }
    }

    /// Inserts all keys into a new table of the given size. Returns false if the table could not be allocated.
    fn rehash(&mut self, new_size: usize) -> bool {
        if new_size > self.size_limit {
            return false;
        }

        let mut buckets = Vec::new();
        if buckets.try_reserve_exact(new_size + 1).is_err() {
            return false;
        }
        buckets.resize(new_size + 1, EMPTY);

        for (index, key) in self.keys.iter().enumerate() {
            if let Some(key) = key {
                let mut bucket = (self.hasher.hash_one(key) as usize) & new_size;
                while buckets[bucket] != EMPTY {
                    bucket = (bucket + 1) & new_size;
                }
                buckets[bucket] = index;
            }
        }

        debug!(
            "Rehashed indexed set from {} to {} buckets, removed {} tombstones",
            self.table_size(),
            new_size,
            self.nr_deletions
        );

        self.buckets = buckets;
        self.nr_entries = self.len();
        self.nr_deletions = 0;
        true
    }
}

/// Returns the smallest `2^k - 1` that is at least `size`.
fn round_table_size(size: usize) -> usize {
    let mut table_size = MIN_TABLE_SIZE;
    while table_size < size {
        table_size = table_size * 2 + 1;
    }
    table_size
}

impl<K> Default for IndexedSet<K, FxBuildHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, S> fmt::Debug for IndexedSet<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.iter().map(|(index, key)| format!("{index}: {key:?}")).format(", ")
        )
    }
}

impl<K, S> Index<SetIndex> for IndexedSet<K, S> {
    type Output = K;

    fn index(&self, index: SetIndex) -> &Self::Output {
        self.get_by_index(index)
    }
}
