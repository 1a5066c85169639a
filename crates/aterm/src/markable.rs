#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::hash::BuildHasher;

use atlas_collections::IndexedSet;
use atlas_collections::IndexedTable;

use crate::storage::Marker;
use crate::storage::TermId;

/// This trait should be used on all objects and containers related to storing unprotected terms.
///
/// The implementation should mark all contained terms that must be kept alive using the provided `Marker`.
pub trait Markable {
    /// Marks all the terms to prevent them from being garbage collected.
    fn mark(&self, marker: &mut Marker);

    /// Should return true iff the given term is contained in the object. Used for runtime checks.
    fn contains_term(&self, term: TermId) -> bool;

    /// Returns the number of terms in the instance.
    fn len(&self) -> usize;

    /// Returns true iff the container is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Markable for TermId {
    fn mark(&self, marker: &mut Marker) {
        marker.mark(*self);
    }

    fn contains_term(&self, term: TermId) -> bool {
        *self == term
    }

    fn len(&self) -> usize {
        1
    }
}

impl<T: Markable> Markable for Vec<T> {
    fn mark(&self, marker: &mut Marker) {
        for value in self {
            value.mark(marker);
        }
    }

    fn contains_term(&self, term: TermId) -> bool {
        self.iter().any(|v| v.contains_term(term))
    }

    fn len(&self) -> usize {
        self.len()
    }
}

impl<T: Markable> Markable for VecDeque<T> {
    fn mark(&self, marker: &mut Marker) {
        for value in self {
            value.mark(marker);
        }
    }

    fn contains_term(&self, term: TermId) -> bool {
        self.iter().any(|v| v.contains_term(term))
    }

    fn len(&self) -> usize {
        self.len()
    }
}

/// Containers are registered as shared [RefCell]s. Marking only happens
/// while no write guard is open, but the queries can be made at any time.
impl<T: Markable> Markable for RefCell<T> {
    fn mark(&self, marker: &mut Marker) {
        self.borrow().mark(marker);
    }

    fn contains_term(&self, term: TermId) -> bool {
        self.try_borrow().is_ok_and(|container| container.contains_term(term))
    }

    fn len(&self) -> usize {
        self.try_borrow().map_or(0, |container| container.len())
    }
}

impl<T: Markable, S: BuildHasher> Markable for IndexedSet<T, S> {
    fn mark(&self, marker: &mut Marker) {
        for (_, value) in self.iter() {
            value.mark(marker);
        }
    }

    fn contains_term(&self, term: TermId) -> bool {
        self.iter().any(|(_, v)| v.contains_term(term))
    }

    fn len(&self) -> usize {
        self.len()
    }
}

impl<K: Markable, V: Markable, S: BuildHasher> Markable for IndexedTable<K, V, S> {
    fn mark(&self, marker: &mut Marker) {
        for (_, key, value) in self.iter() {
            key.mark(marker);
            value.mark(marker);
        }
    }

    fn contains_term(&self, term: TermId) -> bool {
        self.iter()
            .any(|(_, key, value)| key.contains_term(term) || value.contains_term(term))
    }

    fn len(&self) -> usize {
        self.len()
    }
}

impl<T: Markable> Markable for Option<T> {
    fn mark(&self, marker: &mut Marker) {
        if let Some(value) = self {
            value.mark(marker);
        }
    }

    fn contains_term(&self, term: TermId) -> bool {
        if let Some(value) = self {
            value.contains_term(term)
        } else {
            false
        }
    }

    fn len(&self) -> usize {
        if let Some(value) = self { value.len() } else { 0 }
    }
}

// In Rust Its not yet possible to implement it for any tuples, so we implement it for some common sizes.
impl<T1: Markable, T2: Markable> Markable for (T1, T2) {
    fn mark(&self, marker: &mut Marker) {
        self.0.mark(marker);
        self.1.mark(marker);
    }

    fn contains_term(&self, term: TermId) -> bool {
        self.0.contains_term(term) || self.1.contains_term(term)
    }

    fn len(&self) -> usize {
        self.0.len() + self.1.len()
    }
}

impl Markable for bool {
    fn mark(&self, _marker: &mut Marker) {
        // Nothing to mark
    }

    fn contains_term(&self, _term: TermId) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }
}

impl Markable for usize {
    fn mark(&self, _marker: &mut Marker) {
        // Nothing to mark
    }

    fn contains_term(&self, _term: TermId) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }
}
