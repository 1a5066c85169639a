#![forbid(unsafe_code)]

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use hashbrown::Equivalent;
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use atlas_utilities::debug_trace;

/// The small integer that identifies a function symbol in the [SymbolTable].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    pub(crate) const fn new(value: u32) -> SymbolId {
        SymbolId(value)
    }

    /// Returns the raw value of the identifier.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Returns the identifier as an index into the table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The head symbol of integer terms.
pub const INT_SYMBOL: SymbolId = SymbolId::new(0);
/// The head symbol of real terms.
pub const REAL_SYMBOL: SymbolId = SymbolId::new(1);
/// The head symbol of a non-empty list, with the head and tail as arguments.
pub const LIST_SYMBOL: SymbolId = SymbolId::new(2);
/// The head symbol of the empty list.
pub const EMPTY_LIST_SYMBOL: SymbolId = SymbolId::new(3);
/// The head symbol of placeholders, with the type term as argument.
pub const PLACEHOLDER_SYMBOL: SymbolId = SymbolId::new(4);
/// The head symbol of blobs.
pub const BLOB_SYMBOL: SymbolId = SymbolId::new(5);

/// The symbols that exist for the lifetime of a table, in the order of their identifiers.
const BUILTIN_SYMBOLS: [(&str, usize); 6] = [
    ("<int>", 0),
    ("<real>", 0),
    ("<list_constructor>", 2),
    ("<empty_list>", 0),
    ("<placeholder>", 1),
    ("<blob>", 0),
];

/// The information stored for every function symbol.
#[derive(Debug)]
struct SymbolEntry {
    name: Rc<str>,
    arity: usize,
    quoted: bool,
    /// The number of protections, for example [crate::Symbol] handles.
    protection_count: usize,
    /// The number of terms in the storage with this head symbol.
    term_count: usize,
}

#[derive(Hash, PartialEq, Eq)]
struct SymbolKey {
    name: Rc<str>,
    arity: usize,
    quoted: bool,
}

/// Used to look up a symbol without allocating its name.
#[derive(Hash)]
struct SymbolKeyRef<'a> {
    name: &'a str,
    arity: usize,
    quoted: bool,
}

impl Equivalent<SymbolKey> for SymbolKeyRef<'_> {
    fn equivalent(&self, key: &SymbolKey) -> bool {
        *key.name == *self.name && key.arity == self.arity && key.quoted == self.quoted
    }
}

/// Interns function symbols, given by a name, arity and quoted flag, to small
/// identifiers.
///
/// The builtin symbols are not interned, so a symbol created with the name
/// and arity of a builtin one gets an identifier of its own.
///
/// Every entry counts its protections and the terms that use it as head
/// symbol. An entry is released as soon as both counts drop to zero, after
/// which its identifier is reused by the next new symbol.
pub(crate) struct SymbolTable {
    entries: Vec<Option<SymbolEntry>>,
    free: Vec<SymbolId>,
    lookup: HashMap<SymbolKey, SymbolId, FxBuildHasher>,
}

impl SymbolTable {
    /// Creates a table that contains the permanently protected builtin symbols.
    pub fn new() -> SymbolTable {
        let entries = BUILTIN_SYMBOLS
            .iter()
            .map(|(name, arity)| {
                Some(SymbolEntry {
                    name: Rc::from(*name),
                    arity: *arity,
                    quoted: false,
                    protection_count: 1,
                    term_count: 0,
                })
            })
            .collect();

        SymbolTable {
            entries,
            free: Vec::new(),
            lookup: HashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Returns the number of symbols in the table.
    pub fn len(&self) -> usize {
        BUILTIN_SYMBOLS.len() + self.lookup.len()
    }

    /// Returns true iff the table only contains the builtin symbols.
    pub fn is_empty(&self) -> bool {
        self.len() == BUILTIN_SYMBOLS.len()
    }

    /// Returns the identifier of the given symbol, creating it when it does not exist yet.
    ///
    /// A new symbol has no protections and no terms, so it must be protected
    /// before anything else happens to the table.
    pub fn create(&mut self, name: &str, arity: usize, quoted: bool) -> SymbolId {
        let key = SymbolKeyRef { name, arity, quoted };
        if let Some(id) = self.lookup.get(&key) {
            return *id;
        }

        let name: Rc<str> = Rc::from(name);
        let entry = SymbolEntry {
            name: name.clone(),
            arity,
            quoted,
            protection_count: 0,
            term_count: 0,
        };

        let id = match self.free.pop() {
            Some(id) => {
                self.entries[id.index()] = Some(entry);
                id
            }
            None => {
                let id = SymbolId::new(self.entries.len() as u32);
                self.entries.push(Some(entry));
                id
            }
        };

        debug_trace!("Created symbol {name}/{arity} with id {id}");
        self.lookup.insert(SymbolKey { name, arity, quoted }, id);
        id
    }

    /// Returns true iff the identifier refers to a symbol in the table.
    pub fn is_valid(&self, id: SymbolId) -> bool {
        matches!(self.entries.get(id.index()), Some(Some(_)))
    }

    pub fn name(&self, id: SymbolId) -> Rc<str> {
        self.entry(id).name.clone()
    }

    pub fn arity(&self, id: SymbolId) -> usize {
        self.entry(id).arity
    }

    pub fn is_quoted(&self, id: SymbolId) -> bool {
        self.entry(id).quoted
    }

    pub fn protection_count(&self, id: SymbolId) -> usize {
        self.entry(id).protection_count
    }

    pub fn term_count(&self, id: SymbolId) -> usize {
        self.entry(id).term_count
    }

    /// Returns the number of symbols that are protected.
    pub fn number_of_protected(&self) -> usize {
        self.entries
            .iter()
            .flatten()
            .filter(|entry| entry.protection_count > 0)
            .count()
    }

    pub fn protect(&mut self, id: SymbolId) {
        self.entry_mut(id).protection_count += 1;
    }

    /// Removes a protection, and returns true iff the symbol was released.
    pub fn unprotect(&mut self, id: SymbolId) -> bool {
        let entry = self.entry_mut(id);
        debug_assert!(entry.protection_count > 0, "Symbol {} is not protected", entry.name);
        entry.protection_count -= 1;

        self.release_unused(id)
    }

    /// Registers a new term with the given head symbol.
    pub fn add_term(&mut self, id: SymbolId) {
        self.entry_mut(id).term_count += 1;
    }

    /// Unregisters a term with the given head symbol, and returns true iff the symbol was released.
    pub fn remove_term(&mut self, id: SymbolId) -> bool {
        let entry = self.entry_mut(id);
        debug_assert!(entry.term_count > 0, "Symbol {} is not used by any term", entry.name);
        entry.term_count -= 1;

        self.release_unused(id)
    }

    /// Removes all symbols except the builtin ones.
    pub fn clear(&mut self) {
        for index in BUILTIN_SYMBOLS.len()..self.entries.len() {
            if let Some(entry) = self.entries[index].take() {
                self.lookup.remove(&SymbolKeyRef {
                    name: &entry.name,
                    arity: entry.arity,
                    quoted: entry.quoted,
                });
            }
        }

        self.entries.truncate(BUILTIN_SYMBOLS.len());
        self.free.clear();

        for entry in self.entries.iter_mut().flatten() {
            entry.term_count = 0;
        }
    }

    fn release_unused(&mut self, id: SymbolId) -> bool {
        let entry = self.entry(id);
        if id.index() < BUILTIN_SYMBOLS.len() || entry.protection_count > 0 || entry.term_count > 0 {
            return false;
        }

        if let Some(entry) = self.entries[id.index()].take() {
            debug_trace!("Released symbol {}/{} with id {id}", entry.name, entry.arity);
            self.lookup.remove(&SymbolKeyRef {
                name: &entry.name,
                arity: entry.arity,
                quoted: entry.quoted,
            });
            self.free.push(id);
        }

        true
    }

    fn entry(&self, id: SymbolId) -> &SymbolEntry {
        match self.entries.get(id.index()) {
            Some(Some(entry)) => entry,
            _ => panic!("Symbol {id} does not exist"),
        }
    }

    fn entry_mut(&mut self, id: SymbolId) -> &mut SymbolEntry {
        match self.entries.get_mut(id.index()) {
            Some(Some(entry)) => entry,
            _ => panic!("Symbol {id} does not exist"),
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_interning() {
        let mut table = SymbolTable::new();
        assert!(table.is_empty());

        let f = table.create("f", 2, false);
        table.protect(f);
        let g = table.create("f", 2, false);
        table.protect(g);

        assert_eq!(f, g);
        assert_eq!(table.protection_count(f), 2);
        assert_eq!(&*table.name(f), "f");
        assert_eq!(table.arity(f), 2);
        assert!(!table.is_quoted(f));

        // A different arity or quotation is a different symbol.
        assert_ne!(table.create("f", 1, false), f);
        assert_ne!(table.create("f", 2, true), f);
    }

    #[test]
    fn test_symbol_release_and_reuse() {
        let mut table = SymbolTable::new();

        let f = table.create("f", 1, false);
        table.protect(f);
        table.add_term(f);

        assert!(!table.unprotect(f), "The symbol is still used by a term");
        assert!(table.is_valid(f));
        assert!(table.remove_term(f), "Both counts are zero");
        assert!(!table.is_valid(f));

        let g = table.create("g", 0, false);
        assert_eq!(f, g, "The identifier of f is reused");
        assert_eq!(&*table.name(g), "g");
    }

    #[test]
    fn test_builtin_symbols() {
        let mut table = SymbolTable::new();
        assert_eq!(&*table.name(INT_SYMBOL), "<int>");
        assert_eq!(table.arity(LIST_SYMBOL), 2);
        assert_eq!(table.arity(PLACEHOLDER_SYMBOL), 1);

        let blob = table.create("<blob>", 0, false);
        table.protect(blob);
        assert_ne!(blob, BLOB_SYMBOL, "A user symbol never aliases a builtin one");
        assert_eq!(&*table.name(blob), "<blob>");
        assert_eq!(table.create("<blob>", 0, false), blob);
        assert_eq!(table.len(), 7);

        table.add_term(REAL_SYMBOL);
        assert!(!table.remove_term(REAL_SYMBOL), "Builtin symbols are never released");

        let f = table.create("f", 0, false);
        table.protect(f);
        table.clear();
        assert!(!table.is_valid(f));
        assert!(table.is_valid(EMPTY_LIST_SYMBOL));
        assert_eq!(table.len(), 6);
    }

    #[test]
    #[should_panic]
    fn test_released_symbol_query() {
        let mut table = SymbolTable::new();
        let f = table.create("f", 0, false);
        table.protect(f);
        table.unprotect(f);

        table.name(f);
    }
}
