//! The layout of a term cell.
//!
//! Every cell starts with a header word followed by the `next` word, which
//! links the cell into a chain of the hash-cons table while the term is alive
//! and into the free list of its size class otherwise. The remaining words
//! depend on the type of the term:
//!
//! | type        | words                                          |
//! |-------------|------------------------------------------------|
//! | application | `header, next, [arity], arg_0 .. arg_n`        |
//! | integer     | `header, next, value`                          |
//! | real        | `header, next, bits`                           |
//! | list        | `header, next` or `header, next, head, tail`   |
//! | placeholder | `header, next, type`                           |
//! | blob        | `header, next, length, bytes ..`               |
//!
//! The arity word is only present when the arity does not fit in the header.
//! An annotated term has one more word at the end of its cell, which holds
//! the list of its annotations.

#![forbid(unsafe_code)]

use std::fmt;
use std::num::NonZeroU32;

use crate::storage::SymbolId;

/// A single machine word of the term storage.
pub type Word = u64;

/// The logarithm of the number of words in a block.
pub const BLOCK_SHIFT: usize = 13;

/// The number of words in a block.
pub const BLOCK_SIZE: usize = 1 << BLOCK_SHIFT;

/// The largest arity that is stored in the header itself.
pub const MAX_INLINE_ARITY: usize = 7;

/// The list length cache saturates at this value, longer lists are walked.
pub const MAX_CACHED_LENGTH: usize = 0xFFFF;

/// The number of words before the payload of any cell.
pub const HEADER_WORDS: usize = 2;

const MARK_BIT: Word = 1;
const OLD_BIT: Word = 1 << 1;
const TYPE_SHIFT: u32 = 2;
const TYPE_MASK: Word = 0b111 << TYPE_SHIFT;
const ARITY_SHIFT: u32 = 5;
const ARITY_MASK: Word = 0b111 << ARITY_SHIFT;
const LARGE_ARITY_BIT: Word = 1 << 8;
const ANNOTATED_BIT: Word = 1 << 9;
const LENGTH_SHIFT: u32 = 16;
const LENGTH_MASK: Word = 0xFFFF << LENGTH_SHIFT;
const SYMBOL_SHIFT: u32 = 32;

/// The type of a cell. The order of the variants is the order in which terms
/// of different types are compared.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TermType {
    Free,
    Appl,
    Int,
    Real,
    List,
    Placeholder,
    Blob,
}

impl TermType {
    fn from_bits(bits: Word) -> TermType {
        match bits {
            1 => TermType::Appl,
            2 => TermType::Int,
            3 => TermType::Real,
            4 => TermType::List,
            5 => TermType::Placeholder,
            6 => TermType::Blob,
            _ => TermType::Free,
        }
    }

    fn to_bits(self) -> Word {
        match self {
            TermType::Free => 0,
            TermType::Appl => 1,
            TermType::Int => 2,
            TermType::Real => 3,
            TermType::List => 4,
            TermType::Placeholder => 5,
            TermType::Blob => 6,
        }
    }
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TermType::Free => "free",
            TermType::Appl => "application",
            TermType::Int => "integer",
            TermType::Real => "real",
            TermType::List => "list",
            TermType::Placeholder => "placeholder",
            TermType::Blob => "blob",
        };

        write!(f, "{name}")
    }
}

/// Identifies a term by the block and the word offset of its cell.
///
/// The identifier of a term does not change while the term is alive, and
/// because of maximal sharing two terms are equal iff their identifiers are.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(NonZeroU32);

/// The number of blocks that can be addressed by a [TermId].
pub const MAX_BLOCKS: usize = (1 << (32 - BLOCK_SHIFT)) - 1;

impl TermId {
    /// Creates the identifier of the cell at the given offset of a block.
    pub(crate) fn new(block: usize, offset: usize) -> TermId {
        debug_assert!(block < MAX_BLOCKS, "Block {block} cannot be addressed");
        debug_assert!(offset < BLOCK_SIZE, "Offset {offset} is outside of a block");

        let value = ((block << BLOCK_SHIFT) | offset) as u32 + 1;
        TermId(NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN))
    }

    /// Decodes an identifier that was stored in a word of a cell.
    pub(crate) fn from_word(word: Word) -> Option<TermId> {
        u32::try_from(word).ok().and_then(NonZeroU32::new).map(TermId)
    }

    /// Encodes the identifier into a word, zero is never a valid identifier.
    pub(crate) fn to_word(self) -> Word {
        self.0.get() as Word
    }

    /// Returns the index of the block that holds the cell.
    pub fn block(self) -> usize {
        (self.0.get() - 1) as usize >> BLOCK_SHIFT
    }

    /// Returns the word offset of the cell in its block.
    pub fn offset(self) -> usize {
        (self.0.get() - 1) as usize & (BLOCK_SIZE - 1)
    }

    /// Returns the raw value of the identifier.
    pub fn value(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TermId({}:{})", self.block(), self.offset())
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block(), self.offset())
    }
}

/// The header word of a cell.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct Header(Word);

impl Header {
    /// The header of a cell on a free list.
    pub const FREE: Header = Header(0);

    /// Creates a young, unmarked header for a term with the given type, head symbol and arity.
    pub fn new(term_type: TermType, symbol: SymbolId, arity: usize) -> Header {
        let arity_bits = if arity <= MAX_INLINE_ARITY {
            (arity as Word) << ARITY_SHIFT
        } else {
            LARGE_ARITY_BIT
        };

        Header((term_type.to_bits() << TYPE_SHIFT) | arity_bits | ((symbol.value() as Word) << SYMBOL_SHIFT))
    }

    /// Returns the header with the given list length cached in it.
    pub fn with_list_length(self, length: usize) -> Header {
        let length = length.min(MAX_CACHED_LENGTH) as Word;
        Header((self.0 & !LENGTH_MASK) | (length << LENGTH_SHIFT))
    }

    pub fn from_word(word: Word) -> Header {
        Header(word)
    }

    pub fn to_word(self) -> Word {
        self.0
    }

    pub fn term_type(self) -> TermType {
        TermType::from_bits((self.0 & TYPE_MASK) >> TYPE_SHIFT)
    }

    pub fn is_free(self) -> bool {
        self.term_type() == TermType::Free
    }

    /// Returns the head symbol of the term.
    pub fn symbol(self) -> SymbolId {
        SymbolId::new((self.0 >> SYMBOL_SHIFT) as u32)
    }

    pub fn is_marked(self) -> bool {
        self.0 & MARK_BIT != 0
    }

    pub fn marked(self) -> Header {
        Header(self.0 | MARK_BIT)
    }

    pub fn unmarked(self) -> Header {
        Header(self.0 & !MARK_BIT)
    }

    /// Returns true iff the term survived a garbage collection.
    pub fn is_old(self) -> bool {
        self.0 & OLD_BIT != 0
    }

    pub fn aged(self) -> Header {
        Header(self.0 | OLD_BIT)
    }

    /// Returns true iff the arity is stored in the word after `next`.
    pub fn has_large_arity(self) -> bool {
        self.0 & LARGE_ARITY_BIT != 0
    }

    /// Returns true iff the last word of the cell holds the annotations.
    pub fn is_annotated(self) -> bool {
        self.0 & ANNOTATED_BIT != 0
    }

    pub fn with_annotation(self, annotated: bool) -> Header {
        if annotated {
            Header(self.0 | ANNOTATED_BIT)
        } else {
            Header(self.0 & !ANNOTATED_BIT)
        }
    }

    /// Returns the arity stored in the header, only meaningful without a large arity.
    pub fn inline_arity(self) -> usize {
        ((self.0 & ARITY_MASK) >> ARITY_SHIFT) as usize
    }

    /// Returns the cached list length, [MAX_CACHED_LENGTH] means that it must be recomputed.
    pub fn list_length(self) -> usize {
        ((self.0 & LENGTH_MASK) >> LENGTH_SHIFT) as usize
    }

    /// Returns the header without the bits that are used by the garbage
    /// collector, which is the part that defines the shape of the term.
    pub fn shape(self) -> Word {
        self.0 & !(MARK_BIT | OLD_BIT)
    }

    /// Returns the word offset of the first argument.
    pub fn arguments_offset(self) -> usize {
        if self.has_large_arity() {
            HEADER_WORDS + 1
        } else {
            HEADER_WORDS
        }
    }

    /// Returns the number of words of the cell, given the value of its third word.
    pub fn cell_size(self, word2: Word) -> usize {
        let size = match self.term_type() {
            TermType::Free => HEADER_WORDS,
            TermType::Appl => {
                if self.has_large_arity() {
                    appl_size(word2 as usize)
                } else {
                    appl_size(self.inline_arity())
                }
            }
            TermType::Int | TermType::Real | TermType::Placeholder => HEADER_WORDS + 1,
            TermType::List => HEADER_WORDS + self.inline_arity(),
            TermType::Blob => blob_size(word2 as usize),
        };

        if self.is_annotated() { size + 1 } else { size }
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Header {{ type: {}, symbol: {}, arity: {}{}, annotated: {}, marked: {}, old: {} }}",
            self.term_type(),
            self.symbol(),
            self.inline_arity(),
            if self.has_large_arity() { " (large)" } else { "" },
            self.is_annotated(),
            self.is_marked(),
            self.is_old()
        )
    }
}

/// The number of words of an application with the given arity.
pub(crate) fn appl_size(arity: usize) -> usize {
    if arity <= MAX_INLINE_ARITY {
        HEADER_WORDS + arity
    } else {
        HEADER_WORDS + 1 + arity
    }
}

/// The number of words of a blob with the given number of bytes.
pub(crate) fn blob_size(length: usize) -> usize {
    HEADER_WORDS + 1 + length.div_ceil(size_of::<Word>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_id_encoding() {
        let id = TermId::new(3, 42);
        assert_eq!(id.block(), 3);
        assert_eq!(id.offset(), 42);
        assert_eq!(TermId::from_word(id.to_word()), Some(id));
        assert_eq!(TermId::from_word(0), None);

        let last = TermId::new(MAX_BLOCKS - 1, BLOCK_SIZE - 1);
        assert_eq!(last.block(), MAX_BLOCKS - 1);
        assert_eq!(last.offset(), BLOCK_SIZE - 1);
    }

    #[test]
    fn test_header_fields() {
        let symbol = SymbolId::new(1234);
        let header = Header::new(TermType::Appl, symbol, 3);

        assert_eq!(header.term_type(), TermType::Appl);
        assert_eq!(header.symbol(), symbol);
        assert_eq!(header.inline_arity(), 3);
        assert!(!header.has_large_arity());
        assert_eq!(header.cell_size(0), 5);

        let marked = header.marked().aged();
        assert!(marked.is_marked());
        assert!(marked.is_old());
        assert_eq!(marked.shape(), header.shape());
        assert_eq!(marked.unmarked().shape(), header.shape());
        assert!(!marked.unmarked().is_marked());
    }

    #[test]
    fn test_header_large_arity() {
        let header = Header::new(TermType::Appl, SymbolId::new(7), 100);
        assert!(header.has_large_arity());
        assert_eq!(header.arguments_offset(), 3);
        assert_eq!(header.cell_size(100), 103);
    }

    #[test]
    fn test_cell_sizes() {
        let symbol = SymbolId::new(0);
        assert_eq!(Header::new(TermType::Int, symbol, 0).cell_size(42), 3);
        assert_eq!(Header::new(TermType::Real, symbol, 0).cell_size(42), 3);
        assert_eq!(Header::new(TermType::List, symbol, 2).cell_size(0), 4);
        assert_eq!(Header::new(TermType::List, symbol, 0).cell_size(0), 2);
        assert_eq!(Header::new(TermType::Placeholder, symbol, 1).cell_size(0), 3);
        assert_eq!(Header::new(TermType::Blob, symbol, 0).cell_size(9), 5);
        assert_eq!(Header::FREE.term_type(), TermType::Free);
    }

    #[test]
    fn test_annotated_header() {
        let header = Header::new(TermType::Appl, SymbolId::new(9), 2);
        let annotated = header.with_annotation(true);

        assert!(annotated.is_annotated());
        assert_ne!(annotated.shape(), header.shape());
        assert_eq!(annotated.cell_size(0), header.cell_size(0) + 1);
        assert_eq!(Header::new(TermType::Blob, SymbolId::new(5), 0).with_annotation(true).cell_size(9), 6);
        assert_eq!(annotated.with_annotation(false), header);
        assert_eq!(annotated.marked().aged().shape(), annotated.shape());
    }

    #[test]
    fn test_list_length_saturates() {
        let header = Header::new(TermType::List, SymbolId::new(2), 2);
        assert_eq!(header.with_list_length(12).list_length(), 12);
        assert_eq!(header.with_list_length(1 << 20).list_length(), MAX_CACHED_LENGTH);
        assert_eq!(header.with_list_length(5).with_list_length(7).list_length(), 7);
    }
}
