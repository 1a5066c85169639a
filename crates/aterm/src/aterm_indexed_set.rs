#![forbid(unsafe_code)]

use std::fmt;

use atlas_collections::IndexedSet;
use atlas_collections::IndexedTable;
use atlas_collections::SetIndex;

use crate::ATermRef;
use crate::Protected;
use crate::Term;
use crate::storage::TermId;
use crate::storage::TermPool;

/// An [IndexedSet] of terms that protects its terms from garbage collection.
///
/// Every term gets a small index that stays the same until it is removed.
pub struct ATermIndexedSet {
    set: Protected<IndexedSet<TermId>>,
}

impl ATermIndexedSet {
    pub fn new(pool: &TermPool) -> ATermIndexedSet {
        ATermIndexedSet {
            set: Protected::new(pool, IndexedSet::new()),
        }
    }

    /// Creates a set whose table holds at least `initial_size` buckets, and grows when `max_load_pct` percent is used.
    pub fn with_capacity(pool: &TermPool, initial_size: usize, max_load_pct: usize) -> ATermIndexedSet {
        ATermIndexedSet {
            set: Protected::new(pool, IndexedSet::with_capacity(initial_size, max_load_pct)),
        }
    }

    /// Inserts the term, returns its index and whether it was not yet present.
    pub fn put<'a, 'b>(&mut self, term: &'b impl Term<'a, 'b>) -> (SetIndex, bool) {
        let mut write = self.set.write();
        let id = write.protect(term);
        write.put(id)
    }

    /// Returns the index of the term.
    pub fn get_index<'a, 'b>(&self, term: &'b impl Term<'a, 'b>) -> Option<SetIndex> {
        self.set.read().get_index(&term.id())
    }

    /// Returns true iff the term is in the set.
    pub fn contains<'a, 'b>(&self, term: &'b impl Term<'a, 'b>) -> bool {
        self.get_index(term).is_some()
    }

    /// Returns the term at the given index, or None when it has been removed.
    pub fn get(&self, index: SetIndex) -> Option<ATermRef<'_>> {
        let read = self.set.read();
        read.get(index).map(|id| read.term(*id))
    }

    /// Returns the term at the given index, which must be in the set.
    pub fn get_by_index(&self, index: SetIndex) -> ATermRef<'_> {
        let read = self.set.read();
        read.term(*read.get_by_index(index))
    }

    /// Removes the term, returns true iff it was present.
    pub fn remove<'a, 'b>(&mut self, term: &'b impl Term<'a, 'b>) -> bool {
        self.set.write().remove(&term.id())
    }

    /// Removes all terms, but keeps the allocated storage.
    pub fn reset(&mut self) {
        self.set.write().reset();
    }

    pub fn len(&self) -> usize {
        self.set.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of buckets of the hash table.
    pub fn table_size(&self) -> usize {
        self.set.read().table_size()
    }

    /// Returns an iterator over the indices and terms in the set, ordered by index.
    pub fn iter(&self) -> impl Iterator<Item = (SetIndex, ATermRef<'_>)> {
        let pool = self.set.pool();
        let entries: Vec<(SetIndex, ATermRef<'_>)> = self
            .set
            .read()
            .iter()
            .map(|(index, id)| (index, ATermRef::new(pool, *id)))
            .collect();
        entries.into_iter()
    }

    /// Returns an iterator over the terms in the set, ordered by index.
    pub fn keys(&self) -> impl Iterator<Item = ATermRef<'_>> {
        self.iter().map(|(_, term)| term)
    }
}

impl fmt::Debug for ATermIndexedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// An [IndexedTable] from terms to terms that protects both from garbage collection.
pub struct ATermTable {
    table: Protected<IndexedTable<TermId, TermId>>,
}

impl ATermTable {
    pub fn new(pool: &TermPool) -> ATermTable {
        ATermTable {
            table: Protected::new(pool, IndexedTable::new()),
        }
    }

    /// Creates a table whose hash table holds at least `initial_size` buckets, and grows when `max_load_pct` percent is used.
    pub fn with_capacity(pool: &TermPool, initial_size: usize, max_load_pct: usize) -> ATermTable {
        ATermTable {
            table: Protected::new(pool, IndexedTable::with_capacity(initial_size, max_load_pct)),
        }
    }

    /// Associates the value with the key, replacing the previous value of the key.
    ///
    /// Returns the index of the key and whether the key was not yet present.
    pub fn put<'a, 'b, 'c, 'd>(
        &mut self,
        key: &'b impl Term<'a, 'b>,
        value: &'d impl Term<'c, 'd>,
    ) -> (SetIndex, bool) {
        let mut write = self.table.write();
        let key = write.protect(key);
        let value = write.protect(value);
        write.put(key, value)
    }

    /// Returns the value associated with the key.
    pub fn get<'a, 'b>(&self, key: &'b impl Term<'a, 'b>) -> Option<ATermRef<'_>> {
        let read = self.table.read();
        read.get(&key.id()).map(|value| read.term(*value))
    }

    /// Returns the index of the key.
    pub fn get_index<'a, 'b>(&self, key: &'b impl Term<'a, 'b>) -> Option<SetIndex> {
        self.table.read().get_index(&key.id())
    }

    /// Returns the key at the given index, which must be in the table.
    pub fn get_key(&self, index: SetIndex) -> ATermRef<'_> {
        let read = self.table.read();
        read.term(*read.get_key(index))
    }

    /// Returns the value at the given index, which must be in the table.
    pub fn get_value(&self, index: SetIndex) -> ATermRef<'_> {
        let read = self.table.read();
        read.term(*read.get_value(index))
    }

    /// Removes the key and its value, returns true iff the key was present.
    pub fn remove<'a, 'b>(&mut self, key: &'b impl Term<'a, 'b>) -> bool {
        self.table.write().remove(&key.id()).is_some()
    }

    /// Removes all entries, but keeps the allocated storage.
    pub fn reset(&mut self) {
        self.table.write().reset();
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the keys in the table, ordered by index.
    pub fn keys(&self) -> impl Iterator<Item = ATermRef<'_>> {
        let pool = self.table.pool();
        let keys: Vec<ATermRef<'_>> = self.table.read().keys().map(|key| ATermRef::new(pool, *key)).collect();
        keys.into_iter()
    }

    /// Returns an iterator over the values in the table, ordered by the index of their key.
    pub fn values(&self) -> impl Iterator<Item = ATermRef<'_>> {
        let pool = self.table.pool();
        let values: Vec<ATermRef<'_>> = self.table.read().values().map(|value| ATermRef::new(pool, *value)).collect();
        values.into_iter()
    }
}

impl fmt::Debug for ATermTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = self.table.pool();
        let read = self.table.read();
        f.debug_map()
            .entries(
                read.iter()
                    .map(|(_, key, value)| (ATermRef::new(pool, *key), ATermRef::new(pool, *value))),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use atlas_utilities::random_test;
    use atlas_utilities::test_logger;
    use rand::Rng;

    use crate::ATerm;

    use super::*;

    #[test]
    fn test_scenario_index_reuse() {
        test_logger();
        let pool = TermPool::new();

        let mut set = ATermIndexedSet::with_capacity(&pool, 127, 75);
        assert_eq!(set.table_size(), 127);

        let terms: Vec<ATerm> = (0..100).map(|value| pool.create_int(value)).collect();
        for (expected, term) in terms.iter().enumerate() {
            let (index, inserted) = set.put(term);
            assert!(inserted);
            assert_eq!(*index, expected);
        }

        assert!(set.remove(&terms[50]));
        assert!(!set.contains(&terms[50]));

        let (index, inserted) = set.put(&pool.create_int(1000));
        assert!(inserted);
        assert_eq!(*index, 50);
    }

    #[test]
    fn test_set_protects_terms() {
        let pool = TermPool::new();
        let f = pool.create_symbol("f", 1);

        let mut set = ATermIndexedSet::new(&pool);
        for value in 0..100 {
            set.put(&pool.create_term(&f, &[pool.create_int(value)]));
        }

        pool.collect_garbage();
        assert_eq!(pool.len(), 200);

        for (index, term) in set.iter() {
            assert_eq!(set.get_index(&term), Some(index));
            assert_eq!(term.arguments().len(), 1);
        }

        assert_eq!(set.keys().count(), 100);

        set.reset();
        assert!(set.is_empty());
        pool.collect_garbage();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_random_set_operations() {
        random_test(100, |rng| {
            let pool = TermPool::new();
            let mut set = ATermIndexedSet::with_capacity(&pool, 7, 75);
            let mut removed = Vec::new();

            for _ in 0..200 {
                let term = pool.create_int(rng.random_range(0..50));
                if rng.random_bool(0.3) {
                    if set.remove(&term) {
                        removed.push(term);
                    }
                } else {
                    set.put(&term);
                    removed.retain(|other| *other != term);
                }

                for (index, term) in set.iter() {
                    assert_eq!(set.get_index(&term), Some(index));
                    assert_eq!(set.get_by_index(index), term);
                }

                for term in &removed {
                    assert_eq!(set.get_index(term), None);
                }
            }
        });
    }

    #[test]
    fn test_table_put_updates() {
        let pool = TermPool::new();
        let mut table = ATermTable::new(&pool);

        let key = pool.create_int(1);
        let (index, inserted) = table.put(&key, &pool.create_int(10));
        assert!(inserted);

        let (same, inserted) = table.put(&key, &pool.create_int(20));
        assert!(!inserted);
        assert_eq!(index, same);
        assert_eq!(table.get(&key).map(|value| value.to_string()), Some("20".to_string()));
        assert_eq!(table.get_key(index), key);
        assert_eq!(table.get_value(index).to_string(), "20");

        pool.collect_garbage();
        assert_eq!(pool.len(), 2, "The replaced value is no longer protected");

        assert!(table.remove(&key));
        assert!(table.get(&key).is_none());
        assert!(table.is_empty());
    }
}
