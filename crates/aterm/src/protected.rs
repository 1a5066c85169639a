#![forbid(unsafe_code)]

use std::cell::Ref;
use std::cell::RefCell;
use std::cell::RefMut;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Deref;
use std::ops::DerefMut;
use std::rc::Rc;

use atlas_collections::ProtectionIndex;

use crate::ATermRef;
use crate::Markable;
use crate::Term;
use crate::storage::TermId;
use crate::storage::TermPool;

/// A container of objects, typically either term identifiers or objects
/// containing them, that are of trait Markable. The terms in the container
/// are protected during garbage collection by being in the container itself.
///
/// Terms are inserted through a [ProtectedWriteGuard], which postpones
/// garbage collection while it is open.
pub struct Protected<C: Markable + 'static> {
    pool: TermPool,
    container: Rc<RefCell<C>>,
    root: ProtectionIndex,
}

impl<C: Markable + 'static> Protected<C> {
    /// Creates a new Protected container from a given container.
    pub fn new(pool: &TermPool, container: C) -> Protected<C> {
        let shared = Rc::new(RefCell::new(container));
        let root = pool.protect_container(shared.clone());

        Protected {
            pool: pool.clone(),
            container: shared,
            root,
        }
    }

    /// Provides mutable access to the underlying container.
    pub fn write(&mut self) -> ProtectedWriteGuard<'_, C> {
        ProtectedWriteGuard::new(&self.pool, self.container.borrow_mut())
    }

    /// Provides immutable access to the underlying container.
    pub fn read(&self) -> ProtectedReadGuard<'_, C> {
        ProtectedReadGuard {
            pool: &self.pool,
            reference: self.container.borrow(),
        }
    }

    /// Returns the pool in which the terms of the container are stored.
    pub fn pool(&self) -> &TermPool {
        &self.pool
    }
}

impl<C: Clone + Markable + 'static> Clone for Protected<C> {
    fn clone(&self) -> Self {
        Protected::new(&self.pool, self.container.borrow().clone())
    }
}

impl<C: Hash + Markable> Hash for Protected<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.container.borrow().hash(state)
    }
}

impl<C: PartialEq + Markable> PartialEq for Protected<C> {
    fn eq(&self, other: &Self) -> bool {
        self.container.borrow().eq(&other.container.borrow())
    }
}

impl<C: Eq + Markable> Eq for Protected<C> {}

impl<C: Debug + Markable> Debug for Protected<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c: &C = &self.container.borrow();
        write!(f, "{c:?}")
    }
}

impl<C: Markable + 'static> Drop for Protected<C> {
    fn drop(&mut self) {
        self.pool.drop_container(self.root);
    }
}

/// Mutable access to a [Protected] container.
pub struct ProtectedWriteGuard<'a, C: Markable> {
    pool: &'a TermPool,
    reference: RefMut<'a, C>,

    /// Terms that have been protected during the lifetime of this guard.
    #[cfg(debug_assertions)]
    protected: RefCell<Vec<TermId>>,
}

impl<'a, C: Markable> ProtectedWriteGuard<'a, C> {
    fn new(pool: &'a TermPool, reference: RefMut<'a, C>) -> Self {
        pool.block_garbage_collection();

        ProtectedWriteGuard {
            pool,
            reference,
            #[cfg(debug_assertions)]
            protected: RefCell::new(Vec::new()),
        }
    }

    /// Yields the identifier of a term to insert into the container.
    ///
    /// The resulting term MUST be inserted into the container before the
    /// guard is dropped, otherwise it is not protected afterwards. This is
    /// checked in debug mode.
    pub fn protect<'b, 'c>(&self, term: &'c impl Term<'b, 'c>) -> TermId {
        debug_assert!(self.pool.ptr_eq(term.pool()), "Terms of different pools are mixed");

        #[cfg(debug_assertions)]
        self.protected.borrow_mut().push(term.id());

        term.id()
    }

    /// Returns the term with the given identifier, which must be in the container.
    pub fn term(&self, id: TermId) -> ATermRef<'_> {
        debug_assert!(self.reference.contains_term(id), "Term {id} is not in the container");
        ATermRef::new(self.pool, id)
    }
}

impl<C: Markable> Drop for ProtectedWriteGuard<'_, C> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        for term in self.protected.borrow().iter() {
            debug_assert!(
                self.reference.contains_term(*term),
                "Term {term} was protected but not actually inserted"
            );
        }

        self.pool.unblock_garbage_collection();
    }
}

impl<C: Markable> Deref for ProtectedWriteGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.reference
    }
}

impl<C: Markable> DerefMut for ProtectedWriteGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reference
    }
}

/// Immutable access to a [Protected] container.
pub struct ProtectedReadGuard<'a, C> {
    pool: &'a TermPool,
    reference: Ref<'a, C>,
}

impl<'a, C: Markable> ProtectedReadGuard<'a, C> {
    /// Returns the term with the given identifier, which must be in the container.
    pub fn term(&self, id: TermId) -> ATermRef<'a> {
        debug_assert!(self.reference.contains_term(id), "Term {id} is not in the container");
        ATermRef::new(self.pool, id)
    }
}

impl<C> Deref for ProtectedReadGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.reference
    }
}

#[cfg(test)]
mod tests {
    use atlas_utilities::test_logger;

    use super::*;

    #[test]
    fn test_protected_container() {
        test_logger();
        let pool = TermPool::new();

        let f = pool.create_symbol("f", 1);
        let mut container = Protected::new(&pool, Vec::<TermId>::new());

        for value in 0..1000 {
            let term = pool.create_term(&f, &[pool.create_int(value)]);

            let mut write = container.write();
            let id = write.protect(&term);
            write.push(id);
        }

        pool.collect_garbage();
        assert_eq!(pool.len(), 2000);

        let read = container.read();
        let first = read.term(read[0]);
        assert_eq!(first.to_string(), "f(0)");
        assert!(pool.is_protected(first.id()));
        drop(read);

        container.write().truncate(10);
        pool.collect_garbage();
        assert_eq!(pool.len(), 20);

        drop(container);
        pool.collect_garbage();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_write_guard_blocks_collection() {
        let pool = TermPool::new();
        let mut container = Protected::new(&pool, Vec::<TermId>::new());

        let mut write = container.write();
        let id = write.protect(&pool.create_int(42));

        // The term is only referenced by its identifier here.
        pool.collect_garbage();
        write.push(id);
        assert_eq!(write.term(id).to_string(), "42");
        drop(write);

        pool.collect_garbage();
        assert!(pool.is_valid_term(id));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "was protected but not actually inserted")]
    fn test_protected_but_not_inserted() {
        let pool = TermPool::new();
        let mut container = Protected::new(&pool, Vec::<TermId>::new());

        let term = pool.create_int(1);
        let write = container.write();
        write.protect(&term);
    }
}
