use std::borrow::Borrow;
use std::fmt;
use std::hash::BuildHasher;
use std::hash::Hash;

use itertools::Itertools;
use rustc_hash::FxBuildHasher;

use crate::IndexedSet;
use crate::PageVec;
use crate::SetIndex;

/// A map from keys to values where every key is assigned a small index, as in
/// [IndexedSet]. The values are stored in pages parallel to the keys.
pub struct IndexedTable<K, V, S = FxBuildHasher> {
    keys: IndexedSet<K, S>,
    values: PageVec<Option<V>>,
}

impl<K, V> IndexedTable<K, V, FxBuildHasher> {
    pub fn new() -> Self {
        IndexedTable {
            keys: IndexedSet::new(),
            values: PageVec::new(),
        }
    }

    /// See [IndexedSet::with_capacity].
    pub fn with_capacity(initial_size: usize, max_load_pct: usize) -> Self {
        IndexedTable {
            keys: IndexedSet::with_capacity(initial_size, max_load_pct),
            values: PageVec::new(),
        }
    }
}

impl<K, V, S> IndexedTable<K, V, S> {
    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true iff the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the size of the underlying hash table.
    pub fn table_size(&self) -> usize {
        self.keys.table_size()
    }

    /// Returns the current maximum load percentage.
    pub fn max_load(&self) -> usize {
        self.keys.max_load()
    }

    /// Returns the key at the given index.
    pub fn get_key(&self, index: SetIndex) -> &K {
        self.keys.get_by_index(index)
    }

    /// Returns the value at the given index.
    ///
    /// The index must refer to an entry in the table.
    pub fn get_value(&self, index: SetIndex) -> &V {
        match self.values.get(self.keys.position(index)).and_then(Option::as_ref) {
            Some(value) => value,
            None => panic!("Index {index} does not refer to an entry in the table"),
        }
    }

    /// Returns an iterator over the entries, ordered by index.
    pub fn iter(&self) -> impl Iterator<Item = (SetIndex, &K, &V)> {
        self.keys.iter().filter_map(|(index, key)| {
            self.values
                .get(*index)
                .and_then(Option::as_ref)
                .map(|value| (index, key, value))
        })
    }

    /// Returns an iterator over the keys, ordered by index.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.keys.keys()
    }

    /// Returns an iterator over the values, ordered by the index of their keys.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.values.iter().flatten()
    }

    /// Removes all entries, but keeps the allocated storage.
    pub fn reset(&mut self) {
        self.keys.reset();
        self.values.clear();
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> IndexedTable<K, V, S> {
    /// Associates the value with the key, replacing the previous value if the key was already present.
    ///
    /// Returns the index of the key and whether the key was newly inserted.
    pub fn put(&mut self, key: K, value: V) -> (SetIndex, bool) {
        let (index, inserted) = self.keys.put(key);

        while self.values.len() <= *index {
            self.values.push(None);
        }
        self.values[*index] = Some(value);

        (index, inserted)
    }

    /// Returns the value associated with the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.keys
            .get_index(key)
            .and_then(|index| self.values.get(*index))
            .and_then(Option::as_ref)
    }

    /// Returns the index of the given key.
    pub fn get_index<Q>(&self, key: &Q) -> Option<SetIndex>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.keys.get_index(key)
    }

    /// Removes the entry of the given key and returns its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.keys.get_index(key)?;
        self.keys.remove(key);
        self.values.get_mut(*index).and_then(Option::take)
    }
}

impl<K, V> Default for IndexedTable<K, V, FxBuildHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for IndexedTable<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.iter()
                .map(|(_, key, value)| format!("{key:?} -> {value:?}"))
                .format(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::Rng;

    use atlas_utilities::random_test;

    use super::*;

    #[test]
    fn test_indexed_table_update() {
        let mut table = IndexedTable::with_capacity(63, 50);

        let (index, inserted) = table.put("x", 1);
        assert!(inserted);

        let (same, inserted) = table.put("x", 2);
        assert!(!inserted);
        assert_eq!(index, same);
        assert_eq!(table.get("x"), Some(&2));
        assert_eq!(*table.get_value(index), 2);
        assert_eq!(*table.get_key(index), "x");

        assert_eq!(table.remove("x"), Some(2));
        assert_eq!(table.get("x"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_random_indexed_table() {
        random_test(100, |rng| {
            let mut table = IndexedTable::<u64, u64>::with_capacity(15, 75);
            let mut expected = HashMap::new();

            for _ in 0..1000 {
                let key = rng.random_range(0..200);
                if rng.random_bool(0.7) {
                    let value = rng.random::<u64>();
                    table.put(key, value);
                    expected.insert(key, value);
                } else {
                    assert_eq!(table.remove(&key), expected.remove(&key));
                }
            }

            assert_eq!(table.len(), expected.len());
            for (key, value) in &expected {
                assert_eq!(table.get(key), Some(value));
            }

            for (index, key, value) in table.iter() {
                assert_eq!(table.get_index(key), Some(index));
                assert_eq!(expected[key], *value);
            }

            assert_eq!(table.keys().count(), table.values().count());

            table.reset();
            assert!(table.is_empty());
            assert_eq!(table.values().count(), 0);
        });
    }
}
