#![forbid(unsafe_code)]

use log::debug;

use atlas_utilities::debug_trace;

use crate::storage::BLOCK_SIZE;
use crate::storage::HEADER_WORDS;
use crate::storage::Header;
use crate::storage::MAX_BLOCKS;
use crate::storage::StorageError;
use crate::storage::TermId;
use crate::storage::TermType;
use crate::storage::Word;

/// Cells with more words than this get a block of their own.
pub const LARGE_CELL_SIZE: usize = BLOCK_SIZE / 2;

/// A contiguous region of words that holds the cells of a single size class.
struct Block {
    words: Box<[Word]>,

    /// The number of words of every cell, zero while the block is unused.
    cell_size: usize,

    /// The offset after the last cell that has been handed out.
    top: usize,

    /// The free cells of a frozen block are not put on the free list.
    frozen: bool,
}

impl Block {
    /// The offset after the last cell that fits in the block.
    fn end(&self) -> usize {
        if self.cell_size == 0 {
            0
        } else {
            self.words.len() - self.words.len() % self.cell_size
        }
    }
}

/// The blocks and free cells of all cells with the same number of words.
#[derive(Debug, Default)]
pub(crate) struct SizeClass {
    /// The young blocks, the last one is filled by the bump pointer.
    pub young: Vec<usize>,

    /// Blocks that contain mostly old cells, which are skipped by minor collections.
    pub old: Vec<usize>,

    /// The first free cell, linked through the `next` word.
    pub free_list: Option<TermId>,

    pub reclaimed_cells_during_last_gc: usize,
    pub live_blocks_before_last_gc: usize,
}

impl SizeClass {
    pub fn number_of_blocks(&self) -> usize {
        self.young.len() + self.old.len()
    }
}

/// Hands out cells of a requested number of words from blocks of [BLOCK_SIZE]
/// words, with a separate list of blocks and free list per size.
///
/// Blocks are registered by index, so the block of a [TermId] is found by a
/// shift. Empty blocks are kept in a pool for reuse by any size class, up to a
/// maximum number.
pub(crate) struct BlockAllocator {
    blocks: Vec<Option<Block>>,

    /// Indices in `blocks` that are not in use.
    unused_indices: Vec<usize>,

    /// Empty blocks that can be given to any size class.
    free_blocks: Vec<usize>,
    max_free_blocks: usize,

    /// Indexed by the number of words of the cells.
    classes: Vec<SizeClass>,

    /// Blocks that hold a single large cell.
    large: Vec<usize>,

    memory_limit: Option<usize>,
    allocated_words: usize,
}

impl BlockAllocator {
    pub fn new(max_free_blocks: usize, memory_limit: Option<usize>) -> BlockAllocator {
        BlockAllocator {
            blocks: Vec::new(),
            unused_indices: Vec::new(),
            free_blocks: Vec::new(),
            max_free_blocks,
            classes: Vec::new(),
            large: Vec::new(),
            memory_limit,
            allocated_words: 0,
        }
    }

    /// Takes a cell from the bump pointer or the free list of the size class.
    pub fn try_allocate(&mut self, size: usize) -> Option<TermId> {
        let class = self.classes.get_mut(size)?;

        if let Some(&current) = class.young.last() {
            if let Some(Some(block)) = self.blocks.get_mut(current) {
                if block.top + size <= block.end() {
                    let offset = block.top;
                    block.top += size;
                    return Some(TermId::new(current, offset));
                }
            }
        }

        let cell = class.free_list?;
        let next = match &self.blocks[cell.block()] {
            Some(block) => block.words[cell.offset() + 1],
            None => 0,
        };
        class.free_list = TermId::from_word(next);
        Some(cell)
    }

    /// Adds a block to the size class and returns its first cell.
    pub fn allocate_block(&mut self, size: usize) -> Result<TermId, StorageError> {
        debug_assert!((HEADER_WORDS..=LARGE_CELL_SIZE).contains(&size));

        let index = match self.free_blocks.pop() {
            Some(index) => index,
            None => self.new_block(BLOCK_SIZE)?,
        };

        let block = self.block_mut(index);
        block.cell_size = size;
        block.top = size;
        block.frozen = false;

        let class = self.class_mut(size);
        class.young.push(index);
        debug_trace!("Allocated block {index} for cells of {size} words");

        Ok(TermId::new(index, 0))
    }

    /// Allocates a block that holds a single cell of the given size.
    pub fn allocate_large(&mut self, size: usize) -> Result<TermId, StorageError> {
        let index = self.new_block(size)?;

        let block = self.block_mut(index);
        block.cell_size = size;
        block.top = size;
        block.frozen = false;

        self.large.push(index);
        debug!("Allocated a block for a single cell of {size} words");

        Ok(TermId::new(index, 0))
    }

    /// Returns true iff allocating a new block of the given number of words would exceed the memory limit.
    pub fn exceeds_limit(&self, words: usize) -> bool {
        if words == BLOCK_SIZE && !self.free_blocks.is_empty() {
            return false;
        }

        match self.memory_limit {
            Some(limit) => (self.allocated_words + words) * size_of::<Word>() > limit,
            None => false,
        }
    }

    /// Releases a block without live cells that was removed from its size class.
    pub fn release_block(&mut self, index: usize) {
        let reusable = self.block(index).words.len() == BLOCK_SIZE;

        if reusable && self.free_blocks.len() < self.max_free_blocks {
            let block = self.block_mut(index);
            block.cell_size = 0;
            block.top = 0;
            block.frozen = false;
            self.free_blocks.push(index);
            debug_trace!("Block {index} is empty and is kept for reuse");
        } else if let Some(block) = self.blocks[index].take() {
            self.allocated_words -= block.words.len();
            self.unused_indices.push(index);
            debug_trace!("Block {index} is empty and is released");
        }
    }

    /// Puts a cell on the free list of its size class.
    pub fn push_free(&mut self, size: usize, cell: TermId) {
        let next = self.class_mut(size).free_list;
        self.set_header(cell, Header::FREE);
        self.set_next(cell, next);
        self.class_mut(size).free_list = Some(cell);
    }

    /// Returns the index of the block that holds the given term, if that block is in use.
    pub fn address_to_block(&self, term: TermId) -> Option<usize> {
        match self.blocks.get(term.block()) {
            Some(Some(block)) if block.cell_size > 0 => Some(term.block()),
            _ => None,
        }
    }

    /// Returns true iff the identifier refers to the first word of a live cell.
    pub fn is_valid_term(&self, term: TermId) -> bool {
        match self.blocks.get(term.block()) {
            Some(Some(block)) => {
                block.cell_size > 0
                    && term.offset() % block.cell_size == 0
                    && term.offset() < block.top
                    && !Header::from_word(block.words[term.offset()]).is_free()
            }
            _ => false,
        }
    }

    pub fn header(&self, cell: TermId) -> Header {
        Header::from_word(self.word(cell, 0))
    }

    pub fn set_header(&mut self, cell: TermId, header: Header) {
        self.set_word(cell, 0, header.to_word());
    }

    pub fn next(&self, cell: TermId) -> Option<TermId> {
        TermId::from_word(self.word(cell, 1))
    }

    pub fn set_next(&mut self, cell: TermId, next: Option<TermId>) {
        self.set_word(cell, 1, next.map_or(0, TermId::to_word));
    }

    pub fn word(&self, cell: TermId, index: usize) -> Word {
        self.block(cell.block()).words[cell.offset() + index]
    }

    pub fn set_word(&mut self, cell: TermId, index: usize, word: Word) {
        self.block_mut(cell.block()).words[cell.offset() + index] = word;
    }

    /// Returns the words of the cell after the header and `next` words.
    pub fn payload(&self, cell: TermId) -> &[Word] {
        let block = self.block(cell.block());
        &block.words[cell.offset() + HEADER_WORDS..cell.offset() + block.cell_size]
    }

    /// Returns the annotations stored in the last word of an annotated cell.
    pub fn annotations(&self, cell: TermId) -> Option<TermId> {
        if self.header(cell).is_annotated() {
            self.payload(cell).last().copied().and_then(TermId::from_word)
        } else {
            None
        }
    }

    /// Fills a freshly allocated cell.
    pub fn write_cell(&mut self, cell: TermId, header: Header, payload: &[Word]) {
        let block = self.block_mut(cell.block());
        debug_assert_eq!(block.cell_size, HEADER_WORDS + payload.len(), "The cell has the wrong size");

        let start = cell.offset();
        block.words[start] = header.to_word();
        block.words[start + 1] = 0;
        block.words[start + HEADER_WORDS..start + HEADER_WORDS + payload.len()].copy_from_slice(payload);
    }

    /// Returns the number of arguments of the term in the cell.
    pub fn arity(&self, cell: TermId) -> usize {
        let header = self.header(cell);
        match header.term_type() {
            TermType::Appl => {
                if header.has_large_arity() {
                    self.word(cell, HEADER_WORDS) as usize
                } else {
                    header.inline_arity()
                }
            }
            TermType::List | TermType::Placeholder => header.inline_arity(),
            TermType::Free | TermType::Int | TermType::Real | TermType::Blob => 0,
        }
    }

    /// Returns the number of words of the cell.
    pub fn cell_size(&self, cell: TermId) -> usize {
        self.block(cell.block()).cell_size
    }

    /// Returns the offsets of the cells that have been handed out in the block.
    pub fn cell_offsets(&self, index: usize) -> impl Iterator<Item = usize> + use<> {
        let block = self.block(index);
        (0..block.top).step_by(block.cell_size.max(1))
    }

    /// Returns the number of cells that fit in the block.
    pub fn capacity(&self, index: usize) -> usize {
        let block = self.block(index);
        block.end() / block.cell_size.max(1)
    }

    /// Returns true iff all cells of the block have been handed out.
    pub fn is_full(&self, index: usize) -> bool {
        let block = self.block(index);
        block.top == block.end()
    }

    pub fn is_frozen(&self, index: usize) -> bool {
        self.block(index).frozen
    }

    pub fn set_frozen(&mut self, index: usize, frozen: bool) {
        self.block_mut(index).frozen = frozen;
    }

    pub fn class(&self, size: usize) -> Option<&SizeClass> {
        self.classes.get(size)
    }

    pub fn class_mut(&mut self, size: usize) -> &mut SizeClass {
        if self.classes.len() <= size {
            self.classes.resize_with(size + 1, SizeClass::default);
        }

        &mut self.classes[size]
    }

    /// Returns the sizes of the classes that own at least one block.
    pub fn sizes(&self) -> Vec<usize> {
        self.classes
            .iter()
            .enumerate()
            .filter(|(_, class)| class.number_of_blocks() > 0)
            .map(|(size, _)| size)
            .collect()
    }

    /// Takes the list of blocks holding large cells, which must be given back by [Self::set_large_blocks].
    pub fn take_large_blocks(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.large)
    }

    pub fn set_large_blocks(&mut self, blocks: Vec<usize>) {
        self.large = blocks;
    }

    pub fn number_of_large_blocks(&self) -> usize {
        self.large.len()
    }

    /// Returns the number of blocks that hold cells.
    pub fn number_of_blocks(&self) -> usize {
        self.blocks.iter().flatten().filter(|block| block.cell_size > 0).count()
    }

    /// Returns the number of empty blocks kept for reuse.
    pub fn number_of_free_blocks(&self) -> usize {
        self.free_blocks.len()
    }

    /// Returns the number of bytes of all blocks, including the empty ones.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_words * size_of::<Word>()
    }

    /// Releases all blocks.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.unused_indices.clear();
        self.free_blocks.clear();
        self.classes.clear();
        self.large.clear();
        self.allocated_words = 0;
    }

    fn new_block(&mut self, words: usize) -> Result<usize, StorageError> {
        if let Some(limit) = self.memory_limit {
            let requested = (self.allocated_words + words) * size_of::<Word>();
            if requested > limit {
                return Err(StorageError::MemoryLimit { requested, limit });
            }
        }

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(words)
            .map_err(|source| StorageError::OutOfMemory { words, source })?;
        storage.resize(words, 0);

        let block = Block {
            words: storage.into_boxed_slice(),
            cell_size: 0,
            top: 0,
            frozen: false,
        };

        let index = match self.unused_indices.pop() {
            Some(index) => {
                self.blocks[index] = Some(block);
                index
            }
            None => {
                if self.blocks.len() >= MAX_BLOCKS {
                    return Err(StorageError::TooManyBlocks(self.blocks.len()));
                }

                self.blocks.push(Some(block));
                self.blocks.len() - 1
            }
        };

        self.allocated_words += words;
        Ok(index)
    }

    fn block(&self, index: usize) -> &Block {
        match self.blocks.get(index) {
            Some(Some(block)) => block,
            _ => panic!("Block {index} does not exist"),
        }
    }

    fn block_mut(&mut self, index: usize) -> &mut Block {
        match self.blocks.get_mut(index) {
            Some(Some(block)) => block,
            _ => panic!("Block {index} does not exist"),
        }
    }
}
