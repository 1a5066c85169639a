#![forbid(unsafe_code)]

use std::cell::Ref;
use std::cell::RefCell;
use std::cell::RefMut;
use std::fmt;
use std::rc::Rc;

use log::debug;
use log::warn;

use atlas_collections::ProtectionIndex;

use crate::ATerm;
use crate::Markable;
use crate::Symb;
use crate::Symbol;
use crate::Term;
use crate::storage::Collection;
use crate::storage::Protection;
use crate::storage::ProtectionMetrics;
use crate::storage::Storage;
use crate::storage::StorageError;
use crate::storage::SymbolId;
use crate::storage::TermId;
use crate::storage::TermPoolConfig;
use crate::storage::TermPoolMetrics;
use crate::storage::fatal;

/// The context that owns all terms and symbols.
///
/// A pool is a cheaply clonable handle, every clone refers to the same
/// storage. Terms of different pools must never be mixed. All handles
/// ([ATerm], [Symbol], [crate::Protected]) keep their pool alive.
#[derive(Clone)]
pub struct TermPool {
    shared: Rc<SharedPool>,
}

struct SharedPool {
    storage: RefCell<Storage>,
    protection: RefCell<Protection>,
}

impl TermPool {
    /// Creates a pool with the default configuration.
    pub fn new() -> TermPool {
        TermPool::with_config(TermPoolConfig::default())
    }

    /// Creates a pool with the configuration read from the environment, see [TermPoolConfig::from_env].
    pub fn from_env() -> Result<TermPool, StorageError> {
        Ok(TermPool::with_config(TermPoolConfig::from_env()?))
    }

    /// Creates a pool with the given configuration, see [TermPoolConfig::validated].
    pub fn with_config(config: TermPoolConfig) -> TermPool {
        let config = config.validated();
        let storage = match Storage::new(&config) {
            Ok(storage) => storage,
            Err(error) => fatal("creating the term pool", error),
        };

        debug!("Created a term pool with {config:?}");
        TermPool {
            shared: Rc::new(SharedPool {
                storage: RefCell::new(storage),
                protection: RefCell::new(Protection::new()),
            }),
        }
    }

    /// Creates an unquoted function symbol.
    pub fn create_symbol(&self, name: &str, arity: usize) -> Symbol {
        self.make_symbol(name, arity, false)
    }

    /// Creates a function symbol whose name is quoted when printed.
    pub fn create_quoted_symbol(&self, name: &str, arity: usize) -> Symbol {
        self.make_symbol(name, arity, true)
    }

    /// Returns the symbol with the given name, arity and quotation, creating it when it does not exist yet.
    pub fn make_symbol(&self, name: &str, arity: usize, quoted: bool) -> Symbol {
        let id = {
            let mut storage = self.storage_mut();
            let id = storage.symbols.create(name, arity, quoted);
            storage.symbols.protect(id);
            id
        };

        Symbol::from_id(self.clone(), id)
    }

    /// Returns the number of protections of the given symbol.
    pub fn protection_count<'a, 'b>(&self, symbol: &'b impl Symb<'a, 'b>) -> usize {
        self.storage().symbols.protection_count(symbol.id())
    }

    /// Returns the number of symbols, including the builtin ones.
    pub fn number_of_symbols(&self) -> usize {
        self.storage().symbols.len()
    }

    pub fn create_int(&self, value: i64) -> ATerm {
        let term = self.allocate(|storage, protection| storage.create_int(value, protection));
        self.protect(term)
    }

    pub fn create_real(&self, value: f64) -> ATerm {
        let term = self.allocate(|storage, protection| storage.create_real(value, protection));
        self.protect(term)
    }

    /// Creates the application of the given symbol to the arguments.
    ///
    /// The number of arguments must be the arity of the symbol.
    pub fn create_term<'a, 'b, 'c, 'd>(&self, symbol: &'b impl Symb<'a, 'b>, arguments: &[impl Term<'c, 'd>]) -> ATerm {
        let arguments: Vec<TermId> = arguments.iter().map(|argument| argument.id()).collect();
        let term = self.allocate(|storage, protection| storage.create_appl(symbol.id(), &arguments, protection));
        self.protect(term)
    }

    /// Creates the application of the given symbol to the arguments yielded by the iterator.
    pub fn create_term_iter<'a, 'b, 'c, 'd, I, T>(&self, symbol: &'b impl Symb<'a, 'b>, iter: I) -> ATerm
    where
        I: IntoIterator<Item = T>,
        T: Term<'c, 'd>,
    {
        // The items are kept until the term is created, since they can be the only protection of the arguments.
        let items: Vec<T> = iter.into_iter().collect();
        self.create_term(symbol, &items)
    }

    /// Creates a term without arguments.
    pub fn create_constant<'a, 'b>(&self, symbol: &'b impl Symb<'a, 'b>) -> ATerm {
        let term = self.allocate(|storage, protection| storage.create_appl(symbol.id(), &[], protection));
        self.protect(term)
    }

    pub fn empty_list(&self) -> ATerm {
        let term = self.allocate(|storage, protection| storage.empty_list(protection));
        self.protect(term)
    }

    /// Prepends the head to the list.
    pub fn create_cons<'a, 'b, 'c, 'd>(&self, head: &'b impl Term<'a, 'b>, tail: &'d impl Term<'c, 'd>) -> ATerm {
        let (head, tail) = (head.id(), tail.id());
        let term = self.allocate(|storage, protection| storage.create_cons(head, tail, protection));
        self.protect(term)
    }

    /// Creates the list of the terms yielded by the iterator, in the same order.
    pub fn create_list<'a, 'b, I, T>(&self, iter: I) -> ATerm
    where
        I: IntoIterator<Item = T>,
        T: Term<'a, 'b>,
    {
        let items: Vec<T> = iter.into_iter().collect();
        let elements: Vec<TermId> = items.iter().map(|item| item.id()).collect();
        self.create_list_of(&elements)
    }

    /// Creates the list of the given elements, which must be reachable from a root.
    fn create_list_of(&self, elements: &[TermId]) -> ATerm {
        let mut list = self.empty_list();
        for &head in elements.iter().rev() {
            let tail = list.id();
            let term = self.allocate(|storage, protection| storage.create_cons(head, tail, protection));
            list = self.protect(term);
        }

        list
    }

    /// Creates a placeholder for terms of the given type.
    pub fn create_placeholder<'a, 'b>(&self, type_term: &'b impl Term<'a, 'b>) -> ATerm {
        let type_term = type_term.id();
        let term = self.allocate(|storage, protection| storage.create_placeholder(type_term, protection));
        self.protect(term)
    }

    /// Creates a term holding the given bytes.
    pub fn create_blob(&self, bytes: &[u8]) -> ATerm {
        let term = self.allocate(|storage, protection| storage.create_blob(bytes, protection));
        self.protect(term)
    }

    /// Returns the term with the given list of `[label, value]` pairs as its
    /// annotations, replacing the annotations it already has.
    pub fn set_annotations<'a, 'b, 'c, 'd>(
        &self,
        term: &'b impl Term<'a, 'b>,
        annotations: &'d impl Term<'c, 'd>,
    ) -> ATerm {
        let (term, annotations) = (term.id(), annotations.id());
        let result = self.allocate(|storage, protection| storage.set_annotations(term, annotations, protection));
        self.protect(result)
    }

    /// Returns the term without any annotations.
    pub fn remove_annotations<'a, 'b>(&self, term: &'b impl Term<'a, 'b>) -> ATerm {
        let term = term.id();
        let result = self.allocate(|storage, protection| storage.remove_annotations(term, protection));
        self.protect(result)
    }

    /// Returns the term with the annotation of the label set to the value.
    ///
    /// An existing annotation with the same label is replaced in place,
    /// otherwise the new annotation comes first.
    pub fn set_annotation<'a, 'b, 'c, 'd, 'e, 'f>(
        &self,
        term: &'b impl Term<'a, 'b>,
        label: &'d impl Term<'c, 'd>,
        value: &'f impl Term<'e, 'f>,
    ) -> ATerm {
        let pair = self.create_list([label.copy(), value.copy()]);

        let (mut pairs, position) = {
            let storage = self.storage();
            let pairs = storage.annotation_pairs(term.id());
            let position = pairs.iter().position(|existing| {
                storage
                    .label_and_value(*existing)
                    .is_some_and(|(existing, _)| existing == label.id())
            });
            (pairs, position)
        };

        match position {
            Some(index) if pairs[index] == pair.id() => return term.protect(),
            Some(index) => pairs[index] = pair.id(),
            None => pairs.insert(0, pair.id()),
        }

        let annotations = self.create_list_of(&pairs);
        self.set_annotations(term, &annotations)
    }

    /// Returns the term without the annotation of the label. The annotations
    /// are removed entirely when no other label remains.
    pub fn remove_annotation<'a, 'b, 'c, 'd>(&self, term: &'b impl Term<'a, 'b>, label: &'d impl Term<'c, 'd>) -> ATerm {
        let (pairs, remaining) = {
            let storage = self.storage();
            let pairs = storage.annotation_pairs(term.id());
            let remaining: Vec<TermId> = pairs
                .iter()
                .copied()
                .filter(|pair| {
                    storage
                        .label_and_value(*pair)
                        .is_none_or(|(existing, _)| existing != label.id())
                })
                .collect();
            (pairs, remaining)
        };

        if remaining.len() == pairs.len() {
            term.protect()
        } else if remaining.is_empty() {
            self.remove_annotations(term)
        } else {
            let annotations = self.create_list_of(&remaining);
            self.set_annotations(term, &annotations)
        }
    }

    /// Returns the application with the argument at the given index replaced,
    /// keeping the annotations of the application.
    ///
    /// Panics when the term is not an application or the index is out of bounds.
    pub fn set_argument<'a, 'b, 'c, 'd>(
        &self,
        term: &'b impl Term<'a, 'b>,
        argument: &'d impl Term<'c, 'd>,
        index: usize,
    ) -> ATerm {
        let (term, argument) = (term.id(), argument.id());
        let result = self.allocate(|storage, protection| storage.set_argument(term, index, argument, protection));
        self.protect(result)
    }

    /// Returns the depth of the term, where a term without subterms has depth
    /// one and the elements of a list are one level below the list.
    /// Annotations count as a subterm.
    pub fn depth<'a, 'b>(&self, term: &'b impl Term<'a, 'b>) -> usize {
        self.storage().depth(term.id())
    }

    /// Registers a function that is called with the identifier of every
    /// freed term with the given head symbol. The symbol is protected for
    /// the lifetime of the pool.
    ///
    /// The hook runs during garbage collection, so it must not access the pool.
    pub fn register_deletion_hook<'a, 'b>(&self, symbol: &'b impl Symb<'a, 'b>, hook: impl Fn(TermId) + 'static) {
        self.storage_mut().register_deletion_hook(symbol.id(), Box::new(hook));
    }

    /// Runs a major garbage collection, unless a container write guard is open.
    pub fn collect_garbage(&self) {
        let protection = self.shared.protection.borrow();
        if protection.is_blocked() {
            warn!(
                "Garbage collection is postponed by {} open container write guard(s)",
                protection.blockers()
            );
            return;
        }

        self.storage_mut().collect(Collection::Major, &protection);
    }

    /// Enables or disables garbage collection during term construction.
    pub fn set_automatic_garbage_collection(&self, enabled: bool) {
        self.storage_mut().gc.automatic = enabled;
    }

    /// Returns the number of terms in the pool.
    pub fn len(&self) -> usize {
        self.storage().len()
    }

    /// Returns true iff the pool contains no terms.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true iff the identifier refers to a live term of this pool.
    pub fn is_valid_term(&self, term: TermId) -> bool {
        self.storage().blocks.is_valid_term(term)
    }

    /// Returns the index of the block that holds the term, if that block is in use.
    pub fn address_to_block(&self, term: TermId) -> Option<usize> {
        self.storage().blocks.address_to_block(term)
    }

    /// Returns true iff the term is protected by an [ATerm] or a [crate::Protected] container.
    pub fn is_protected(&self, term: TermId) -> bool {
        self.shared.protection.borrow().is_protected(term)
    }

    /// Returns the metrics of the term pool, can be formatted and written to output.
    pub fn metrics(&self) -> TermPoolMetrics {
        self.storage().metrics()
    }

    /// Returns the metrics of the protection sets, can be formatted and written to output.
    pub fn protection_metrics(&self) -> ProtectionMetrics {
        let protected_symbols = self.storage().symbols.number_of_protected();
        self.shared.protection.borrow().metrics(protected_symbols)
    }

    /// Returns true iff both handles refer to the same pool.
    pub fn ptr_eq(&self, other: &TermPool) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Logs the final metrics and releases all terms and symbols when this is the last handle to the pool.
    pub fn shutdown(self) {
        debug!("Shutting down the term pool\n{}", self.metrics());

        match Rc::try_unwrap(self.shared) {
            Ok(shared) => {
                shared.storage.into_inner().clear();
            }
            Err(_) => {
                warn!("The term pool is still used by other handles, its storage is released when the last one is dropped");
            }
        }
    }

    pub(crate) fn storage(&self) -> Ref<'_, Storage> {
        self.shared.storage.borrow()
    }

    fn storage_mut(&self) -> RefMut<'_, Storage> {
        self.shared.storage.borrow_mut()
    }

    /// Runs an operation that may allocate, and therefore collect garbage.
    fn allocate<R>(&self, operation: impl FnOnce(&mut Storage, &Protection) -> R) -> R {
        let protection = self.shared.protection.borrow();
        let mut storage = self.storage_mut();
        operation(&mut storage, &protection)
    }

    /// Protects the term, returning the handle that keeps it alive.
    pub(crate) fn protect(&self, term: TermId) -> ATerm {
        let root = self.shared.protection.borrow_mut().protect(term);
        ATerm::from_root(self.clone(), term, root)
    }

    pub(crate) fn unprotect(&self, root: ProtectionIndex) {
        self.shared.protection.borrow_mut().unprotect(root);
    }

    /// Changes the term that is protected by the root.
    pub(crate) fn replace(&self, root: ProtectionIndex, term: TermId) {
        self.shared.protection.borrow_mut().replace(root, term);
    }

    pub(crate) fn protect_symbol(&self, symbol: SymbolId) -> Symbol {
        self.storage_mut().symbols.protect(symbol);
        Symbol::from_id(self.clone(), symbol)
    }

    pub(crate) fn unprotect_symbol(&self, symbol: SymbolId) {
        self.storage_mut().symbols.unprotect(symbol);
    }

    pub(crate) fn protect_container(&self, container: Rc<dyn Markable>) -> ProtectionIndex {
        self.shared.protection.borrow_mut().protect_container(container)
    }

    pub(crate) fn drop_container(&self, root: ProtectionIndex) {
        // Dropping the container can unprotect terms, so the borrow must end first.
        let container = self.shared.protection.borrow_mut().unprotect_container(root);
        drop(container);
    }

    /// Postpones garbage collection until the matching [Self::unblock_garbage_collection].
    pub(crate) fn block_garbage_collection(&self) {
        self.shared.protection.borrow_mut().block();
    }

    pub(crate) fn unblock_garbage_collection(&self) {
        self.shared.protection.borrow_mut().unblock();
    }
}

impl Default for TermPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TermPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TermPool({} terms)", self.len())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use atlas_utilities::test_logger;

    use crate::TermType;

    use super::*;

    #[test]
    fn test_scenario_shared_construction() {
        test_logger();
        let pool = TermPool::new();

        let f = pool.make_symbol("f", 2, false);
        let i1 = pool.create_int(3);
        let i2 = pool.create_int(4);

        let t1 = pool.create_term(&f, &[i1.copy(), i2.copy()]);
        let t2 = pool.create_term(&f, &[i1.copy(), i2.copy()]);
        assert_eq!(t1, t2);
        assert_eq!(t1.id(), t2.id());
        assert_eq!(t1.arg(0), i1.copy());
        assert_eq!(t1.arg(1), i2.copy());
    }

    #[test]
    fn test_builtin_names_are_user_symbols() {
        let pool = TermPool::new();

        let int = pool.make_symbol("<int>", 0, false);
        let constant = pool.create_constant(&int);
        let zero = pool.create_int(0);

        assert_eq!(constant.term_type(), TermType::Appl);
        assert_ne!(constant.get_head_symbol(), zero.get_head_symbol());
        assert_eq!(&*constant.get_head_symbol().name(), &*zero.get_head_symbol().name());
        assert_eq!(constant.to_string(), "<int>");
        assert_eq!(zero.to_string(), "0");
    }

    #[test]
    fn test_annotation_dictionary() {
        test_logger();
        let pool = TermPool::new();

        let a = pool.create_constant(&pool.create_symbol("a", 0));
        let color = pool.create_constant(&pool.create_symbol("color", 0));
        let size = pool.create_constant(&pool.create_symbol("size", 0));
        let red = pool.create_constant(&pool.create_symbol("red", 0));
        let blue = pool.create_constant(&pool.create_symbol("blue", 0));

        assert!(a.annotations().is_none());
        assert!(a.get_annotation(&color).is_none());

        let colored = pool.set_annotation(&a, &color, &red);
        assert_eq!(colored.get_annotation(&color), Some(red.copy()));
        assert!(colored.get_annotation(&size).is_none());
        assert_eq!(pool.set_annotation(&colored, &color, &red), colored, "Setting the same value is a no-op");

        let sized = pool.set_annotation(&colored, &size, &pool.create_int(3));
        let recolored = pool.set_annotation(&sized, &color, &blue);
        assert_eq!(recolored.get_annotation(&color), Some(blue.copy()));
        assert_eq!(recolored.to_string(), "a{[size,3],[color,blue]}", "The replaced label keeps its position");

        assert_eq!(pool.remove_annotation(&recolored, &red), recolored, "Removing an absent label is a no-op");
        let uncolored = pool.remove_annotation(&recolored, &color);
        assert_eq!(uncolored.to_string(), "a{[size,3]}");
        assert_eq!(pool.remove_annotation(&uncolored, &size), a, "No annotations remain");
        assert_eq!(pool.remove_annotations(&recolored), a);

        // Annotated terms are maximally shared as well.
        assert_eq!(pool.set_annotation(&a, &color, &red), colored);
    }

    #[test]
    fn test_annotations_are_reachable() {
        let pool = TermPool::new();

        let label = pool.create_int(1);
        let term = pool.set_annotation(&pool.create_int(2), &label, &pool.create_real(0.5));
        drop(label);

        pool.collect_garbage();
        assert_eq!(term.to_string(), "2{[1,0.5]}");
        // The label 1, the real, four lists from [] up to [[1,0.5]] and the annotated 2. The plain 2 is garbage.
        assert_eq!(pool.len(), 7);

        drop(term);
        pool.collect_garbage();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_set_argument() {
        let pool = TermPool::new();

        let f = pool.create_symbol("f", 2);
        let label = pool.create_constant(&pool.create_symbol("label", 0));
        let one = pool.create_int(1);
        let two = pool.create_int(2);

        let term = pool.create_term(&f, &[one.copy(), one.copy()]);
        assert_eq!(pool.set_argument(&term, &two, 1), pool.create_term(&f, &[one.copy(), two.copy()]));
        assert_eq!(term.set_argument(&one, 0), term);

        let annotated = term.set_annotation(&label, &two);
        let replaced = annotated.set_argument(&two, 0);
        assert_eq!(replaced.to_string(), "f(2,1){[label,2]}");
        assert_eq!(replaced.get_annotation(&label), Some(two.copy()));
    }

    #[test]
    #[should_panic(expected = "Only arguments of applications can be replaced")]
    fn test_set_argument_of_list() {
        let pool = TermPool::new();
        let list = pool.create_list([pool.create_int(1)]);
        pool.set_argument(&list, &pool.create_int(2), 0);
    }

    #[test]
    fn test_depth() {
        let pool = TermPool::new();

        let f = pool.create_symbol("f", 2);
        let a = pool.create_constant(&pool.create_symbol("a", 0));
        assert_eq!(a.depth(), 1);
        assert_eq!(pool.create_blob(b"depth").depth(), 1);

        let term = pool.create_term(&f, &[a.copy(), pool.create_list([a.copy(), a.copy()]).copy()]);
        assert_eq!(pool.depth(&term), 3);
        assert_eq!(pool.create_placeholder(&term).depth(), 4);

        let annotated = pool.set_annotation(&a, &a, &term);
        // The annotations [[a,f(..)]] are two levels above the term.
        assert_eq!(annotated.depth(), 6);
    }

    #[test]
    fn test_symbol_protection_count() {
        let pool = TermPool::new();

        let first = pool.make_symbol("g", 1, true);
        let second = pool.make_symbol("g", 1, true);
        assert_eq!(first.id(), second.id());
        assert_eq!(pool.protection_count(&first), 2);

        drop(second);
        assert_eq!(pool.protection_count(&first), 1);
    }

    #[test]
    fn test_collect_unreachable_terms() {
        test_logger();
        let pool = TermPool::new();

        let f = pool.create_symbol("f", 1);
        let kept = pool.create_term(&f, &[pool.create_int(1)]);
        let dropped = pool.create_term(&f, &[pool.create_int(2)]).id();
        assert_eq!(pool.len(), 4);

        pool.collect_garbage();
        assert_eq!(pool.len(), 2);
        assert!(pool.is_valid_term(kept.id()));
        assert!(pool.is_valid_term(kept.arg(0).id()));
        assert!(!pool.is_valid_term(dropped));
    }

    #[test]
    fn test_deletion_hook() {
        let pool = TermPool::new();
        let freed = Rc::new(Cell::new(0));

        let f = pool.create_symbol("f", 1);
        let counter = freed.clone();
        pool.register_deletion_hook(&f, move |_| counter.set(counter.get() + 1));

        let a = pool.create_int(5);
        let term = pool.create_term(&f, &[a.copy()]);
        pool.collect_garbage();
        assert_eq!(freed.get(), 0);

        drop(term);
        pool.collect_garbage();
        assert_eq!(freed.get(), 1);
        assert!(pool.is_valid_term(a.id()), "Only the application is freed");
    }

    #[test]
    fn test_symbol_released_after_last_term() {
        let pool = TermPool::new();
        let symbols = pool.number_of_symbols();

        let term = {
            let h = pool.create_symbol("h", 0);
            pool.create_constant(&h)
        };
        assert_eq!(pool.number_of_symbols(), symbols + 1, "The term keeps the symbol alive");
        assert_eq!(&*term.get_head_symbol().name(), "h");

        drop(term);
        pool.collect_garbage();
        assert_eq!(pool.number_of_symbols(), symbols);
    }

    #[test]
    fn test_memory_grows_beyond_one_block() {
        let pool = TermPool::new();

        let mut terms = Vec::new();
        for value in 0..(crate::storage::BLOCK_SIZE as i64) {
            terms.push(pool.create_int(value));
        }

        let first = pool.address_to_block(terms[0].id());
        let last = pool.address_to_block(terms[terms.len() - 1].id());
        assert!(first.is_some());
        assert_ne!(first, last, "Integers of three words cannot share a single block");
        assert!(terms.iter().all(|term| term.term_type() == TermType::Int));
    }

    #[test]
    #[should_panic(expected = "out of memory")]
    fn test_memory_limit_is_fatal() {
        let pool = TermPool::with_config(TermPoolConfig {
            memory_limit: Some(4 * crate::storage::BLOCK_SIZE * size_of::<crate::storage::Word>()),
            ..TermPoolConfig::default()
        });

        // Every term stays protected, so collecting cannot make room.
        let mut terms = Vec::new();
        for value in 0.. {
            terms.push(pool.create_int(value));
        }
    }

    #[test]
    fn test_low_memory_collects() {
        let pool = TermPool::with_config(TermPoolConfig {
            low_memory: true,
            ..TermPoolConfig::default()
        });

        let f = pool.create_symbol("f", 2);
        let mut term = pool.create_int(0);
        for value in 0..100_000 {
            let argument = pool.create_int(value);
            let next = pool.create_term(&f, &[term.copy(), argument.copy()]);
            // Only the spine of the last ten applications stays reachable through a root.
            if value % 10 == 0 {
                term = pool.create_int(value);
            } else {
                term = next;
            }
        }

        let metrics = pool.metrics();
        assert!(metrics.minor_collections + metrics.major_collections > 0);
        assert!(metrics.blocks < 40, "{metrics}");
    }

    #[test]
    fn test_shutdown() {
        let pool = TermPool::new();
        let term = pool.create_int(1);
        let id = term.id();
        drop(term);

        let other = pool.clone();
        pool.shutdown();
        assert!(other.is_valid_term(id), "The storage is kept while another handle exists");
        other.shutdown();
    }
}
