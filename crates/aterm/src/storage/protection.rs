#![forbid(unsafe_code)]

use std::fmt;
use std::rc::Rc;

use atlas_collections::ProtectionIndex;
use atlas_collections::ProtectionSet;
use atlas_utilities::LargeFormatter;
use atlas_utilities::debug_trace;

use crate::Markable;
use crate::storage::Marker;
use crate::storage::TermId;

/// The roots of the garbage collector: individually protected terms and
/// protected containers.
pub(crate) struct Protection {
    terms: ProtectionSet<TermId>,
    containers: ProtectionSet<Rc<dyn Markable>>,

    /// The number of open container write guards, garbage collection is
    /// postponed while this is non-zero.
    blockers: usize,
}

impl Protection {
    pub fn new() -> Protection {
        Protection {
            terms: ProtectionSet::new(),
            containers: ProtectionSet::new(),
            blockers: 0,
        }
    }

    pub fn protect(&mut self, term: TermId) -> ProtectionIndex {
        let root = self.terms.protect(term);
        debug_trace!("Protected term {term} as root {root}");
        root
    }

    pub fn unprotect(&mut self, root: ProtectionIndex) -> TermId {
        let term = self.terms.unprotect(root);
        debug_trace!("Unprotected term {term} with root {root}");
        term
    }

    /// Changes the term that is protected by the given root.
    pub fn replace(&mut self, root: ProtectionIndex, term: TermId) {
        self.terms.replace(root, term);
    }

    pub fn protect_container(&mut self, container: Rc<dyn Markable>) -> ProtectionIndex {
        let root = self.containers.protect(container);
        debug_trace!("Protected container as root {root}");
        root
    }

    /// Removes the container from the roots, it must be dropped after the protection is released.
    pub fn unprotect_container(&mut self, root: ProtectionIndex) -> Rc<dyn Markable> {
        debug_trace!("Unprotected container with root {root}");
        self.containers.unprotect(root)
    }

    pub fn block(&mut self) {
        self.blockers += 1;
    }

    pub fn unblock(&mut self) {
        debug_assert!(self.blockers > 0, "Garbage collection was not blocked");
        self.blockers -= 1;
    }

    /// Returns true iff garbage collection must be postponed.
    pub fn is_blocked(&self) -> bool {
        self.blockers > 0
    }

    pub fn blockers(&self) -> usize {
        self.blockers
    }

    /// Marks all terms that are reachable from the roots.
    pub fn mark(&self, marker: &mut Marker) {
        for (_root, term) in self.terms.iter() {
            debug_trace!("Marking root {_root} term {term}");
            marker.mark(*term);
        }

        for (_root, container) in self.containers.iter() {
            debug_trace!("Marking root {_root} container of {} terms", container.len());
            container.mark(marker);
        }
    }

    /// Returns true iff the term is protected by a root or a container.
    pub fn is_protected(&self, term: TermId) -> bool {
        self.terms.iter().any(|(_, root)| *root == term)
            || self.containers.iter().any(|(_, container)| container.contains_term(term))
    }

    pub fn metrics(&self, protected_symbols: usize) -> ProtectionMetrics {
        ProtectionMetrics {
            roots: self.terms.len(),
            maximum_roots: self.terms.maximum_size(),
            root_insertions: self.terms.number_of_insertions(),
            containers: self.containers.len(),
            maximum_containers: self.containers.maximum_size(),
            container_insertions: self.containers.number_of_insertions(),
            protected_symbols,
        }
    }
}

/// A snapshot of the protection sets of a [crate::TermPool], can be formatted and written to output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectionMetrics {
    pub roots: usize,
    pub maximum_roots: usize,
    pub root_insertions: u64,
    pub containers: usize,
    pub maximum_containers: usize,
    pub container_insertions: u64,
    pub protected_symbols: usize,
}

impl fmt::Display for ProtectionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Protection set has {} roots, max {} and {} insertions",
            LargeFormatter(self.roots),
            LargeFormatter(self.maximum_roots),
            LargeFormatter(self.root_insertions)
        )?;

        writeln!(
            f,
            "Containers: {} roots, max {} and {} insertions",
            LargeFormatter(self.containers),
            LargeFormatter(self.maximum_containers),
            LargeFormatter(self.container_insertions),
        )?;

        write!(f, "Symbols: {} protected", LargeFormatter(self.protected_symbols))
    }
}
