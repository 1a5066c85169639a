#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::rc::Rc;

use delegate::delegate;

use crate::Markable;
use crate::storage::Marker;
use crate::storage::SymbolId;
use crate::storage::TermId;
use crate::storage::TermPool;

/// The public interface for a function symbol. Can be used to write generic
/// functions that accept both [Symbol] and [SymbolRef].
///
/// See [crate::Term] for more information on how to use this trait with two lifetimes.
pub trait Symb<'a, 'b> {
    /// Obtain the symbol's name.
    fn name(&self) -> Rc<str>;

    /// Obtain the symbol's arity.
    fn arity(&self) -> usize;

    /// Returns true iff the name is quoted when printed.
    fn is_quoted(&self) -> bool;

    /// Create a copy of the symbol reference.
    fn copy(&'b self) -> SymbolRef<'a>;

    /// Returns the identifier of the symbol in the symbol table of its pool.
    fn id(&self) -> SymbolId;
}

/// A reference to a function symbol, which is kept alive by the [Symbol] or
/// term it was obtained from.
#[derive(Clone, Copy)]
pub struct SymbolRef<'a> {
    pool: &'a TermPool,
    id: SymbolId,
}

impl<'a> SymbolRef<'a> {
    pub(crate) fn new(pool: &'a TermPool, id: SymbolId) -> SymbolRef<'a> {
        SymbolRef { pool, id }
    }

    /// Protects the symbol from garbage collection, yielding a `Symbol`.
    pub fn protect(&self) -> Symbol {
        self.pool.protect_symbol(self.id)
    }

    /// Returns the pool that owns the symbol.
    pub fn pool(&self) -> &'a TermPool {
        self.pool
    }
}

impl<'a> Symb<'a, '_> for SymbolRef<'a> {
    fn name(&self) -> Rc<str> {
        self.pool.storage().symbols.name(self.id)
    }

    fn arity(&self) -> usize {
        self.pool.storage().symbols.arity(self.id)
    }

    fn is_quoted(&self) -> bool {
        self.pool.storage().symbols.is_quoted(self.id)
    }

    fn copy(&self) -> SymbolRef<'a> {
        *self
    }

    fn id(&self) -> SymbolId {
        self.id
    }
}

impl PartialEq for SymbolRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        debug_assert!(self.pool.ptr_eq(other.pool), "Symbols of different pools are compared");
        self.id == other.id
    }
}

impl Eq for SymbolRef<'_> {}

impl Hash for SymbolRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialOrd for SymbolRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders symbols by their identifier, which is not related to their name.
impl Ord for SymbolRef<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for SymbolRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        if self.is_quoted() {
            write!(f, "{:?}", &*name)
        } else {
            write!(f, "{name}")
        }
    }
}

impl fmt::Debug for SymbolRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}/{}", self.arity())
    }
}

/// A protected function symbol, with the same interface as [SymbolRef].
///
/// The symbol is kept in the symbol table as long as a handle to it exists,
/// or a term uses it as head symbol.
pub struct Symbol {
    pool: TermPool,
    id: SymbolId,
}

impl Symbol {
    /// Takes over a protection of the symbol that was already counted.
    pub(crate) fn from_id(pool: TermPool, id: SymbolId) -> Symbol {
        Symbol { pool, id }
    }

    /// Create a copy of the symbol reference.
    pub fn copy(&self) -> SymbolRef<'_> {
        SymbolRef::new(&self.pool, self.id)
    }

    /// Returns the pool that owns the symbol.
    pub fn pool(&self) -> &TermPool {
        &self.pool
    }
}

impl<'a, 'b> Symb<'a, 'b> for Symbol
where
    'b: 'a,
{
    delegate! {
        to self.copy() {
            fn name(&self) -> Rc<str>;
            fn arity(&self) -> usize;
            fn is_quoted(&self) -> bool;
            fn copy(&'b self) -> SymbolRef<'a>;
            fn id(&self) -> SymbolId;
        }
    }
}

impl Markable for Symbol {
    fn mark(&self, _marker: &mut Marker) {
        // Symbols are protected by their handle.
    }

    fn contains_term(&self, _term: TermId) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }
}

impl Drop for Symbol {
    fn drop(&mut self) {
        self.pool.unprotect_symbol(self.id);
    }
}

impl From<&SymbolRef<'_>> for Symbol {
    fn from(value: &SymbolRef) -> Self {
        value.protect()
    }
}

impl Clone for Symbol {
    fn clone(&self) -> Self {
        self.pool.protect_symbol(self.id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.copy())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.copy())
    }
}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.copy().eq(&other.copy())
    }
}

impl PartialEq<SymbolRef<'_>> for Symbol {
    fn eq(&self, other: &SymbolRef<'_>) -> bool {
        self.copy().eq(other)
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Eq for Symbol {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_handles() {
        let pool = TermPool::new();

        let f = pool.create_symbol("f", 2);
        let quoted = pool.create_quoted_symbol("a b", 0);
        assert_eq!(&*f.name(), "f");
        assert_eq!(f.arity(), 2);
        assert!(!f.is_quoted());
        assert!(quoted.is_quoted());
        assert_eq!(format!("{quoted}"), "\"a b\"");
        assert_eq!(format!("{f:?}"), "f/2");

        let g = f.copy().protect();
        assert_eq!(f, g);
        assert_eq!(pool.protection_count(&f), 2);

        let cloned = g.clone();
        drop(g);
        assert_eq!(pool.protection_count(&cloned), 2);
    }

    #[test]
    fn test_symbol_identity() {
        let pool = TermPool::new();

        let f = pool.create_symbol("f", 1);
        assert_ne!(f, pool.create_symbol("f", 2));
        assert_ne!(f, pool.create_quoted_symbol("f", 1));
        assert_eq!(f, pool.create_symbol("f", 1).copy());
    }
}
