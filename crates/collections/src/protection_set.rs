use std::fmt;
use std::ops::Deref;
use std::ops::Index;

use atlas_utilities::GenerationCounter;
use atlas_utilities::GenerationalIndex;

/// A type-safe index for the [ProtectionSet] to prevent accidental use of wrong indices.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ProtectionIndex(GenerationalIndex);

impl Deref for ProtectionIndex {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ProtectionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtectionIndex({:?})", self.0)
    }
}

impl fmt::Display for ProtectionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A collection of roots that must survive garbage collection. Every protected
/// object gets an index that is used to unprotect it again; the slots of
/// unprotected objects are kept on a free list and reused.
///
/// Unlike [crate::IndexedSet] the same object can be protected several times,
/// and objects cannot be looked up by value.
#[derive(Debug, Default)]
pub struct ProtectionSet<T> {
    roots: Vec<Entry<T>>,
    /// The first free slot, the free slots form a linked list.
    free: Option<usize>,
    number_of_insertions: u64,
    size: usize,
    maximum_size: usize,
    generation_counter: GenerationCounter,
}

#[derive(Debug)]
enum Entry<T> {
    Filled(T),
    Free(Option<usize>),
}

impl<T> ProtectionSet<T> {
    pub fn new() -> Self {
        ProtectionSet {
            roots: Vec::new(),
            free: None,
            number_of_insertions: 0,
            size: 0,
            maximum_size: 0,
            generation_counter: GenerationCounter::new(),
        }
    }

    /// Returns the number of protections since creation.
    pub fn number_of_insertions(&self) -> u64 {
        self.number_of_insertions
    }

    /// Returns the largest number of roots that were protected at the same time.
    pub fn maximum_size(&self) -> usize {
        self.maximum_size
    }

    /// Returns the number of roots.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true iff there are no roots.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns an iterator over all roots and their indices.
    pub fn iter(&self) -> impl Iterator<Item = (ProtectionIndex, &T)> {
        self.roots.iter().enumerate().filter_map(|(index, entry)| match entry {
            Entry::Filled(object) => Some((ProtectionIndex(self.generation_counter.recall_index(index)), object)),
            Entry::Free(_) => None,
        })
    }

    /// Returns true iff the given index refers to a root.
    pub fn contains_root(&self, index: ProtectionIndex) -> bool {
        matches!(self.roots.get(*index), Some(Entry::Filled(_)))
    }

    /// Adds the given object and returns the index under which it is protected.
    pub fn protect(&mut self, object: T) -> ProtectionIndex {
        self.number_of_insertions += 1;
        self.size += 1;
        self.maximum_size = self.maximum_size.max(self.size);

        let index = match self.free {
            Some(first) => {
                match self.roots[first] {
                    Entry::Free(next) => self.free = next,
                    Entry::Filled(_) => panic!("The free list points to a filled entry"),
                }

                self.roots[first] = Entry::Filled(object);
                first
            }
            None => {
                self.roots.push(Entry::Filled(object));
                self.roots.len() - 1
            }
        };

        ProtectionIndex(self.generation_counter.create_index(index))
    }

    /// Removes the object protected under the given index and returns it.
    pub fn unprotect(&mut self, index: ProtectionIndex) -> T {
        let index = self.generation_counter.get_index(index.0);

        let entry = std::mem::replace(&mut self.roots[index], Entry::Free(self.free));
        match entry {
            Entry::Filled(object) => {
                self.free = Some(index);
                self.size -= 1;
                object
            }
            Entry::Free(_) => panic!("Index {index} was already unprotected"),
        }
    }

    /// Replaces the object protected under the given index.
    pub fn replace(&mut self, index: ProtectionIndex, object: T) {
        let index = self.generation_counter.get_index(index.0);

        debug_assert!(
            matches!(self.roots[index], Entry::Filled(_)),
            "Index {index} does not point to a filled entry"
        );

        self.roots[index] = Entry::Filled(object);
    }
}

impl<T> Index<ProtectionIndex> for ProtectionSet<T> {
    type Output = T;

    fn index(&self, index: ProtectionIndex) -> &Self::Output {
        match &self.roots[self.generation_counter.get_index(index.0)] {
            Entry::Filled(value) => value,
            Entry::Free(_) => panic!("Attempting to index free spot {index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use atlas_utilities::random_test;
    use atlas_utilities::test_logger;

    use super::*;

    #[test]
    fn test_random_protection_set() {
        random_test(100, |rng| {
            let mut protection_set = ProtectionSet::<usize>::new();

            let mut indices: Vec<(ProtectionIndex, usize)> = Vec::new();
            for _ in 0..5000 {
                let value = rng.random_range(0..1000);
                indices.push((protection_set.protect(value), value));
            }

            // Unprotect a random half of the roots.
            for _ in 0..2500 {
                let (index, value) = indices.swap_remove(rng.random_range(0..indices.len()));
                assert_eq!(protection_set.unprotect(index), value);
            }

            // Protect more to reuse the free list.
            for _ in 0..1000 {
                let value = rng.random_range(0..1000);
                indices.push((protection_set.protect(value), value));
            }

            for (index, value) in &indices {
                assert!(protection_set.contains_root(*index));
                assert_eq!(protection_set[*index], *value);
            }

            assert_eq!(protection_set.len(), 3500);
            assert_eq!(protection_set.iter().count(), 3500);
            assert_eq!(protection_set.number_of_insertions(), 6000);
            assert_eq!(protection_set.maximum_size(), 5000);
        });
    }

    #[test]
    fn test_protection_set_reuses_slots() {
        test_logger();

        let mut set = ProtectionSet::<String>::new();

        let first = set.protect(String::from("first"));
        let second = set.protect(String::from("second"));
        assert_eq!(set[first], "first");
        assert_eq!(set[second], "second");

        assert_eq!(set.unprotect(first), "first");
        assert!(!set.contains_root(first));
        assert!(set.contains_root(second));

        let third = set.protect(String::from("third"));
        assert_eq!(*third, *first, "The freed slot is reused");
        assert_eq!(set[third], "third");

        set.replace(third, String::from("fourth"));
        assert_eq!(set[third], "fourth");
        assert!(!set.is_empty());
    }
}
