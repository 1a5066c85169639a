#![forbid(unsafe_code)]

use std::rc::Rc;

use log::warn;
use rustc_hash::FxHashMap;

use atlas_utilities::debug_trace;

use crate::storage::BLOB_SYMBOL;
use crate::storage::BLOCK_SIZE;
use crate::storage::BlockAllocator;
use crate::storage::Collection;
use crate::storage::EMPTY_LIST_SYMBOL;
use crate::storage::GcParameters;
use crate::storage::GcState;
use crate::storage::HEADER_WORDS;
use crate::storage::HashTable;
use crate::storage::Header;
use crate::storage::INT_SYMBOL;
use crate::storage::LARGE_CELL_SIZE;
use crate::storage::LIST_SYMBOL;
use crate::storage::MAX_CACHED_LENGTH;
use crate::storage::MAX_INLINE_ARITY;
use crate::storage::PLACEHOLDER_SYMBOL;
use crate::storage::Policy;
use crate::storage::Protection;
use crate::storage::REAL_SYMBOL;
use crate::storage::StorageError;
use crate::storage::SymbolId;
use crate::storage::SymbolTable;
use crate::storage::TermId;
use crate::storage::TermPoolConfig;
use crate::storage::TermType;
use crate::storage::Word;
use crate::storage::fatal;
use crate::storage::hash_shape;

/// A function that is called with every freed term that has a given head symbol.
pub(crate) type DeletionHook = Box<dyn Fn(TermId)>;

/// The maximally shared term storage, which consists of the blocks holding
/// the cells, the hash-cons table that indexes them and the symbol table.
///
/// Every operation that may allocate receives the [Protection] of the pool,
/// since allocation can trigger a garbage collection that marks from its roots.
pub(crate) struct Storage {
    pub(crate) blocks: BlockAllocator,
    pub(crate) table: HashTable,
    pub(crate) symbols: SymbolTable,
    pub(crate) gc: GcState,

    /// Called whenever a term with the given head symbol is freed.
    hooks: FxHashMap<SymbolId, Vec<DeletionHook>>,

    /// Reused to build the payload of new terms.
    scratch: Vec<Word>,
}

impl Storage {
    pub fn new(config: &TermPoolConfig) -> Result<Storage, StorageError> {
        let parameters = GcParameters::new(config.low_memory);

        Ok(Storage {
            blocks: BlockAllocator::new(parameters.max_freeblocklist_size, config.memory_limit),
            table: HashTable::new(config.initial_table_class, config.max_load)?,
            symbols: SymbolTable::new(),
            gc: GcState::new(parameters, config.automatic_garbage_collection),
            hooks: FxHashMap::default(),
            scratch: Vec::new(),
        })
    }

    /// Returns the number of terms in the storage.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn create_appl(&mut self, symbol: SymbolId, arguments: &[TermId], protection: &Protection) -> TermId {
        debug_assert_eq!(
            arguments.len(),
            self.symbols.arity(symbol),
            "The number of arguments does not match the arity of {}",
            self.symbols.name(symbol)
        );

        let header = Header::new(TermType::Appl, symbol, arguments.len());

        let mut payload = std::mem::take(&mut self.scratch);
        payload.clear();
        if arguments.len() > MAX_INLINE_ARITY {
            payload.push(arguments.len() as Word);
        }
        payload.extend(arguments.iter().map(|argument| argument.to_word()));

        let term = self.find_or_create(header, &payload, protection);
        self.scratch = payload;
        term
    }

    pub fn create_int(&mut self, value: i64, protection: &Protection) -> TermId {
        let header = Header::new(TermType::Int, INT_SYMBOL, 0);
        self.find_or_create(header, &[value as Word], protection)
    }

    pub fn create_real(&mut self, value: f64, protection: &Protection) -> TermId {
        let header = Header::new(TermType::Real, REAL_SYMBOL, 0);
        self.find_or_create(header, &[value.to_bits()], protection)
    }

    pub fn empty_list(&mut self, protection: &Protection) -> TermId {
        let header = Header::new(TermType::List, EMPTY_LIST_SYMBOL, 0);
        self.find_or_create(header, &[], protection)
    }

    pub fn create_cons(&mut self, head: TermId, tail: TermId, protection: &Protection) -> TermId {
        let tail_header = self.blocks.header(tail);
        debug_assert_eq!(tail_header.term_type(), TermType::List, "The tail of a list must be a list");

        // A saturated length stays saturated.
        let length = (tail_header.list_length() + 1).min(MAX_CACHED_LENGTH);
        let header = Header::new(TermType::List, LIST_SYMBOL, 2).with_list_length(length);
        self.find_or_create(header, &[head.to_word(), tail.to_word()], protection)
    }

    pub fn create_placeholder(&mut self, type_term: TermId, protection: &Protection) -> TermId {
        let header = Header::new(TermType::Placeholder, PLACEHOLDER_SYMBOL, 1);
        self.find_or_create(header, &[type_term.to_word()], protection)
    }

    pub fn create_blob(&mut self, bytes: &[u8], protection: &Protection) -> TermId {
        let header = Header::new(TermType::Blob, BLOB_SYMBOL, 0);

        let mut payload = std::mem::take(&mut self.scratch);
        payload.clear();
        payload.push(bytes.len() as Word);
        payload.extend(bytes.chunks(size_of::<Word>()).map(|chunk| {
            let mut word = [0u8; size_of::<Word>()];
            word[..chunk.len()].copy_from_slice(chunk);
            Word::from_le_bytes(word)
        }));

        let term = self.find_or_create(header, &payload, protection);
        self.scratch = payload;
        term
    }

    /// Returns the term with the given annotations, replacing the ones it already has.
    ///
    /// The annotations are a list of `[label, value]` pairs.
    pub fn set_annotations(&mut self, term: TermId, annotations: TermId, protection: &Protection) -> TermId {
        debug_assert_eq!(self.term_type(annotations), TermType::List, "Annotations must be a list");

        let header = Header::from_word(self.blocks.header(term).shape()).with_annotation(true);

        let mut payload = std::mem::take(&mut self.scratch);
        payload.clear();
        payload.extend_from_slice(self.unannotated_payload(term));
        payload.push(annotations.to_word());

        let result = self.find_or_create(header, &payload, protection);
        self.scratch = payload;
        result
    }

    /// Returns the term without its annotations.
    pub fn remove_annotations(&mut self, term: TermId, protection: &Protection) -> TermId {
        let header = self.blocks.header(term);
        if !header.is_annotated() {
            return term;
        }

        let mut payload = std::mem::take(&mut self.scratch);
        payload.clear();
        payload.extend_from_slice(self.unannotated_payload(term));

        let result = self.find_or_create(Header::from_word(header.shape()).with_annotation(false), &payload, protection);
        self.scratch = payload;
        result
    }

    /// Returns the application with the argument at the given index replaced, keeping its annotations.
    pub fn set_argument(&mut self, term: TermId, index: usize, argument: TermId, protection: &Protection) -> TermId {
        let header = self.blocks.header(term);
        assert_eq!(header.term_type(), TermType::Appl, "Only arguments of applications can be replaced");
        assert!(index < self.arity(term), "Index {index} is out of bounds for term {term}");

        let mut payload = std::mem::take(&mut self.scratch);
        payload.clear();
        payload.extend_from_slice(self.blocks.payload(term));
        payload[header.arguments_offset() - HEADER_WORDS + index] = argument.to_word();

        let result = self.find_or_create(Header::from_word(header.shape()), &payload, protection);
        self.scratch = payload;
        result
    }

    /// Returns the existing term with the given header and payload, or creates it.
    fn find_or_create(&mut self, header: Header, payload: &[Word], protection: &Protection) -> TermId {
        let hash = hash_shape(header, payload);
        if let Some(term) = self.table.find(&self.blocks, hash, header, payload) {
            return term;
        }

        let term = self.allocate(HEADER_WORDS + payload.len(), protection);
        self.blocks.write_cell(term, header, payload);
        self.symbols.add_term(header.symbol());
        self.table.insert(&mut self.blocks, hash, term);
        debug_trace!("Created term {term} with {header:?}");

        if self.table.needs_resize() {
            self.table.resize(&mut self.blocks);
        }

        term
    }

    /// Returns a cell of the given number of words, which may collect garbage first.
    fn allocate(&mut self, size: usize, protection: &Protection) -> TermId {
        if size > LARGE_CELL_SIZE {
            return self.allocate_large(size, protection);
        }

        if let Some(cell) = self.blocks.try_allocate(size) {
            return cell;
        }

        if let Policy::Collect(collection) = self.allocation_policy(size) {
            if self.can_collect(protection) {
                self.collect(collection, protection);

                if let Some(cell) = self.blocks.try_allocate(size) {
                    return cell;
                }
            }
        }

        self.new_block(size, protection)
    }

    /// Adds a block to the size class, collecting garbage first when the memory limit would be exceeded.
    fn new_block(&mut self, size: usize, protection: &Protection) -> TermId {
        if self.blocks.exceeds_limit(BLOCK_SIZE) && self.can_collect(protection) {
            self.collect(Collection::Major, protection);

            if let Some(cell) = self.blocks.try_allocate(size) {
                return cell;
            }
        }

        match self.blocks.allocate_block(size) {
            Ok(cell) => cell,
            Err(error) => fatal("allocating a block", error),
        }
    }

    fn allocate_large(&mut self, size: usize, protection: &Protection) -> TermId {
        self.gc.large_blocks_since_last_gc += 1;

        if (self.blocks.exceeds_limit(size)
            || self.gc.large_blocks_since_last_gc > self.gc.parameters.min_number_of_blocks)
            && self.can_collect(protection)
        {
            self.collect(Collection::Major, protection);
        }

        match self.blocks.allocate_large(size) {
            Ok(cell) => cell,
            Err(error) => fatal("allocating a large term", error),
        }
    }

    /// Returns true iff a garbage collection can run now.
    fn can_collect(&self, protection: &Protection) -> bool {
        if !self.gc.automatic {
            return false;
        }

        if protection.is_blocked() {
            warn!(
                "Garbage collection is postponed by {} open container write guard(s)",
                protection.blockers()
            );
            return false;
        }

        true
    }

    /// Unlinks the term from the hash-cons table, runs the deletion hooks and
    /// releases its head symbol. The cell itself is reclaimed by the caller.
    pub(crate) fn free_term(&mut self, term: TermId) {
        let symbol = self.blocks.header(term).symbol();

        if !self.table.remove(&mut self.blocks, term) {
            panic!("Term {term} is not in the hash-cons table");
        }

        if let Some(hooks) = self.hooks.get(&symbol) {
            for hook in hooks {
                debug_trace!("Calling deletion hook for term {term}");
                hook(term);
            }
        }

        self.symbols.remove_term(symbol);
        debug_trace!("Freed term {term}");
    }

    /// Registers a function that is called with every freed term with the given head symbol.
    ///
    /// The symbol stays protected for the lifetime of the storage.
    pub fn register_deletion_hook(&mut self, symbol: SymbolId, hook: DeletionHook) {
        self.symbols.protect(symbol);
        self.hooks.entry(symbol).or_default().push(hook);
    }

    pub fn header(&self, term: TermId) -> Header {
        self.blocks.header(term)
    }

    pub fn term_type(&self, term: TermId) -> TermType {
        self.blocks.header(term).term_type()
    }

    pub fn symbol(&self, term: TermId) -> SymbolId {
        self.blocks.header(term).symbol()
    }

    pub fn arity(&self, term: TermId) -> usize {
        self.blocks.arity(term)
    }

    /// Returns the argument at the given index.
    pub fn argument(&self, term: TermId, index: usize) -> TermId {
        debug_assert!(
            index < self.arity(term),
            "Index {index} is out of bounds for term {term}"
        );

        let offset = self.blocks.header(term).arguments_offset();
        match TermId::from_word(self.blocks.word(term, offset + index)) {
            Some(argument) => argument,
            None => panic!("Argument {index} of term {term} is not a term"),
        }
    }

    pub fn name(&self, symbol: SymbolId) -> Rc<str> {
        self.symbols.name(symbol)
    }

    pub fn int_value(&self, term: TermId) -> i64 {
        debug_assert_eq!(self.term_type(term), TermType::Int);
        self.blocks.word(term, HEADER_WORDS) as i64
    }

    pub fn real_value(&self, term: TermId) -> f64 {
        debug_assert_eq!(self.term_type(term), TermType::Real);
        f64::from_bits(self.blocks.word(term, HEADER_WORDS))
    }

    pub fn blob_length(&self, term: TermId) -> usize {
        debug_assert_eq!(self.term_type(term), TermType::Blob);
        self.blocks.word(term, HEADER_WORDS) as usize
    }

    pub fn blob_bytes(&self, term: TermId) -> Vec<u8> {
        let length = self.blob_length(term);
        let mut bytes: Vec<u8> = self.unannotated_payload(term)[1..]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect();
        bytes.truncate(length);
        bytes
    }

    /// Returns the annotations of the term, a list of `[label, value]` pairs.
    pub fn annotations(&self, term: TermId) -> Option<TermId> {
        self.blocks.annotations(term)
    }

    /// Returns the payload of the term without the annotations word.
    fn unannotated_payload(&self, term: TermId) -> &[Word] {
        let payload = self.blocks.payload(term);
        if self.blocks.header(term).is_annotated() {
            &payload[..payload.len() - 1]
        } else {
            payload
        }
    }

    /// Returns the depth of the term, where a term without subterms has depth one.
    ///
    /// The elements of a list are at depth one below the list, and the
    /// annotations of a term count as one of its subterms. Shared subterms
    /// are only visited once.
    pub fn depth(&self, term: TermId) -> usize {
        let mut depths: FxHashMap<TermId, usize> = FxHashMap::default();
        let mut stack = vec![(term, false)];

        while let Some((current, expanded)) = stack.pop() {
            if depths.contains_key(&current) {
                continue;
            }

            let subterms = self.direct_subterms(current);
            if expanded {
                let deepest = subterms.iter().filter_map(|subterm| depths.get(subterm)).max().copied().unwrap_or(0);
                let annotations = self
                    .annotations(current)
                    .and_then(|annotations| depths.get(&annotations).copied())
                    .unwrap_or(0);

                let depth = match self.term_type(current) {
                    TermType::Appl | TermType::List | TermType::Placeholder => 1 + deepest.max(annotations),
                    _ => annotations.max(1),
                };
                depths.insert(current, depth);
            } else {
                stack.push((current, true));
                stack.extend(
                    subterms
                        .into_iter()
                        .chain(self.annotations(current))
                        .map(|subterm| (subterm, false)),
                );
            }
        }

        depths.get(&term).copied().unwrap_or(1)
    }

    /// Returns the arguments of an application or placeholder, or the elements of a list.
    fn direct_subterms(&self, term: TermId) -> Vec<TermId> {
        if self.term_type(term) == TermType::List {
            self.list_elements(term)
        } else {
            (0..self.arity(term)).map(|index| self.argument(term, index)).collect()
        }
    }

    pub fn list_elements(&self, list: TermId) -> Vec<TermId> {
        let mut elements = Vec::new();
        let mut current = list;
        while self.arity(current) == 2 {
            elements.push(self.argument(current, 0));
            current = self.argument(current, 1);
        }
        elements
    }

    /// Returns the `[label, value]` pairs of the annotations of the term.
    pub fn annotation_pairs(&self, term: TermId) -> Vec<TermId> {
        match self.annotations(term) {
            Some(annotations) => self.list_elements(annotations),
            None => Vec::new(),
        }
    }

    /// Returns the label and value of an annotation pair, None when it is not a list of two elements.
    pub fn label_and_value(&self, pair: TermId) -> Option<(TermId, TermId)> {
        if self.term_type(pair) != TermType::List || self.list_length(pair) != 2 {
            return None;
        }

        let tail = self.argument(pair, 1);
        Some((self.argument(pair, 0), self.argument(tail, 0)))
    }

    /// Returns the value of the annotation with the given label.
    pub fn annotation(&self, term: TermId, label: TermId) -> Option<TermId> {
        self.annotation_pairs(term)
            .into_iter()
            .filter_map(|pair| self.label_and_value(pair))
            .find(|(candidate, _)| *candidate == label)
            .map(|(_, value)| value)
    }

    /// Returns the number of elements of a list, walking it when the cached length is saturated.
    pub fn list_length(&self, term: TermId) -> usize {
        let cached = self.blocks.header(term).list_length();
        if cached < MAX_CACHED_LENGTH {
            return cached;
        }

        let mut length = 0;
        let mut current = term;
        while self.arity(current) == 2 {
            length += 1;
            current = self.argument(current, 1);
        }

        length
    }

    /// Removes all terms and non-builtin symbols.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.table.clear();
        self.symbols.clear();
        self.hooks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maximal_sharing() {
        let protection = Protection::new();
        let mut storage = Storage::new(&TermPoolConfig::default()).unwrap();

        let f = storage.symbols.create("f", 2, false);
        storage.symbols.protect(f);

        let a = storage.create_int(1, &protection);
        let b = storage.create_real(2.5, &protection);
        let t1 = storage.create_appl(f, &[a, b], &protection);
        let t2 = storage.create_appl(f, &[a, b], &protection);
        let t3 = storage.create_appl(f, &[b, a], &protection);

        assert_eq!(t1, t2);
        assert_ne!(t1, t3);
        assert_eq!(storage.len(), 4);
        assert_eq!(storage.symbols.term_count(f), 2);
        assert_eq!(storage.argument(t1, 1), b);
        assert_eq!(storage.real_value(b), 2.5);
    }

    #[test]
    fn test_large_arity() {
        let protection = Protection::new();
        let mut storage = Storage::new(&TermPoolConfig::default()).unwrap();

        let f = storage.symbols.create("f", 20, false);
        storage.symbols.protect(f);

        let arguments: Vec<TermId> = (0..20).map(|value| storage.create_int(value, &protection)).collect();
        let term = storage.create_appl(f, &arguments, &protection);

        assert_eq!(storage.arity(term), 20);
        assert_eq!(storage.argument(term, 19), arguments[19]);
        assert_eq!(storage.create_appl(f, &arguments, &protection), term);
    }

    #[test]
    fn test_lists_and_blobs() {
        let protection = Protection::new();
        let mut storage = Storage::new(&TermPoolConfig::default()).unwrap();

        let empty = storage.empty_list(&protection);
        let one = storage.create_int(1, &protection);
        let list = storage.create_cons(one, empty, &protection);
        let list = storage.create_cons(one, list, &protection);

        assert_eq!(storage.list_length(empty), 0);
        assert_eq!(storage.list_length(list), 2);
        assert_eq!(storage.symbol(list), LIST_SYMBOL);

        let blob = storage.create_blob(b"hello world", &protection);
        assert_eq!(storage.blob_length(blob), 11);
        assert_eq!(storage.blob_bytes(blob), b"hello world");
        assert_eq!(storage.create_blob(b"hello world", &protection), blob);
        assert_ne!(storage.create_blob(b"hello world\0", &protection), blob);
    }

    #[test]
    fn test_annotated_terms_are_shared() {
        let protection = Protection::new();
        let mut storage = Storage::new(&TermPoolConfig::default()).unwrap();

        let empty = storage.empty_list(&protection);
        let label = storage.create_int(1, &protection);
        let value = storage.create_int(2, &protection);
        let pair = storage.create_cons(value, empty, &protection);
        let pair = storage.create_cons(label, pair, &protection);
        let annotations = storage.create_cons(pair, empty, &protection);

        let blob = storage.create_blob(b"annotated", &protection);
        let annotated = storage.set_annotations(blob, annotations, &protection);
        assert_ne!(annotated, blob);
        assert_eq!(storage.set_annotations(blob, annotations, &protection), annotated);
        assert_eq!(storage.annotations(annotated), Some(annotations));
        assert_eq!(storage.annotations(blob), None);
        assert_eq!(storage.blob_bytes(annotated), b"annotated");

        // Replacing the annotations does not nest them.
        let other = storage.set_annotations(annotated, empty, &protection);
        assert_eq!(storage.annotations(other), Some(empty));
        assert_eq!(storage.remove_annotations(other, &protection), blob);
        assert_eq!(storage.remove_annotations(blob, &protection), blob);
    }

    #[test]
    fn test_set_argument_keeps_annotations() {
        let protection = Protection::new();
        let mut storage = Storage::new(&TermPoolConfig::default()).unwrap();

        let f = storage.symbols.create("f", 9, false);
        storage.symbols.protect(f);

        let arguments: Vec<TermId> = (0..9).map(|value| storage.create_int(value, &protection)).collect();
        let term = storage.create_appl(f, &arguments, &protection);
        let empty = storage.empty_list(&protection);
        let annotated = storage.set_annotations(term, empty, &protection);

        let replaced = storage.set_argument(annotated, 8, arguments[0], &protection);
        assert_eq!(storage.argument(replaced, 8), arguments[0]);
        assert_eq!(storage.annotations(replaced), Some(empty));

        let mut expected = arguments.clone();
        expected[8] = arguments[0];
        let plain = storage.create_appl(f, &expected, &protection);
        assert_eq!(storage.remove_annotations(replaced, &protection), plain);
        assert_eq!(storage.set_argument(plain, 8, arguments[8], &protection), term);
    }

    #[test]
    fn test_depth() {
        let protection = Protection::new();
        let mut storage = Storage::new(&TermPoolConfig {
            automatic_garbage_collection: false,
            ..TermPoolConfig::default()
        })
        .unwrap();

        let f = storage.symbols.create("f", 2, false);
        storage.symbols.protect(f);
        let a = storage.symbols.create("a", 0, false);
        storage.symbols.protect(a);

        let constant = storage.create_appl(a, &[], &protection);
        let one = storage.create_int(1, &protection);
        let empty = storage.empty_list(&protection);
        assert_eq!(storage.depth(constant), 1);
        assert_eq!(storage.depth(one), 1);
        assert_eq!(storage.depth(empty), 1);

        // The list [1,1,1] has depth two, however long it is.
        let mut list = empty;
        for _ in 0..3 {
            list = storage.create_cons(one, list, &protection);
        }
        assert_eq!(storage.depth(list), 2);

        let term = storage.create_appl(f, &[list, constant], &protection);
        assert_eq!(storage.depth(term), 3);

        let placeholder = storage.create_placeholder(term, &protection);
        assert_eq!(storage.depth(placeholder), 4);

        // The annotation list [[1,1,1]] is deeper than the integer.
        let annotations = storage.create_cons(list, empty, &protection);
        let annotated = storage.set_annotations(one, annotations, &protection);
        assert_eq!(storage.depth(annotated), 3);

        // A shared chain, whose tree unfolding is exponential in its depth.
        let mut shared = constant;
        for _ in 0..100_000 {
            shared = storage.create_appl(f, &[shared, shared], &protection);
        }
        assert_eq!(storage.depth(shared), 100_001);
    }
}
