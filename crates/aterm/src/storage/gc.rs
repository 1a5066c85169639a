//! The generational mark-and-sweep garbage collector of the term storage.
//!
//! Cells that survive a collection become old. A minor collection only
//! marks and sweeps young cells, which is sound because an old term can only
//! refer to terms that are at least as old. A block whose live cells are
//! mostly old is promoted to the old list, which minor collections skip. A
//! major collection visits every block, demotes old blocks that became
//! sparse and releases blocks without live cells.

#![forbid(unsafe_code)]

use std::fmt;
use std::time::Instant;

use log::debug;

use atlas_utilities::BytesFormatter;
use atlas_utilities::LargeFormatter;

use crate::storage::BLOCK_SIZE;
use crate::storage::BlockAllocator;
use crate::storage::Header;
use crate::storage::Protection;
use crate::storage::Storage;
use crate::storage::TermId;

/// The percentage of old cells above which a block is considered old.
pub(crate) const TO_OLD_RATIO: usize = 65;

/// The kind of a garbage collection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Collection {
    /// Only young cells are collected.
    Minor,
    /// All cells are collected.
    Major,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Minor => write!(f, "minor"),
            Collection::Major => write!(f, "major"),
        }
    }
}

/// The decision taken when a size class has no free cell left.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Policy {
    /// Add a block to the size class.
    Block,
    /// Collect garbage, and add a block when that did not free a cell.
    Collect(Collection),
}

/// The thresholds of the allocation policy, all ratios are percentages.
#[derive(Clone, Debug)]
pub(crate) struct GcParameters {
    /// Size classes with at most this many blocks always grow.
    pub min_number_of_blocks: usize,
    /// The number of empty blocks that is kept for reuse.
    pub max_freeblocklist_size: usize,
    pub min_nb_minor_since_last_major: usize,
    pub good_gc_ratio: usize,
    pub small_allocation_rate_ratio: usize,
    pub old_increase_rate_ratio: usize,
}

impl GcParameters {
    pub fn new(low_memory: bool) -> GcParameters {
        if low_memory {
            GcParameters {
                min_number_of_blocks: 2,
                max_freeblocklist_size: 30,
                min_nb_minor_since_last_major: 2,
                good_gc_ratio: 50,
                small_allocation_rate_ratio: 25,
                old_increase_rate_ratio: 50,
            }
        } else {
            GcParameters {
                min_number_of_blocks: 64,
                max_freeblocklist_size: 100,
                min_nb_minor_since_last_major: 10,
                good_gc_ratio: 50,
                small_allocation_rate_ratio: 75,
                old_increase_rate_ratio: 50,
            }
        }
    }
}

/// The state of the garbage collector that is kept between collections.
pub(crate) struct GcState {
    pub parameters: GcParameters,
    pub automatic: bool,
    pub large_blocks_since_last_gc: usize,

    pub minor_collections: usize,
    pub major_collections: usize,
    minor_since_last_major: usize,

    /// Words of old cells, used to estimate how fast the old generation grows.
    old_words_in_young_blocks_after_last_major: usize,
    old_words_in_old_blocks_after_last_major: usize,
    old_words_in_young_blocks_since_last_major: usize,

    /// Reused by the marking phase.
    stack: Vec<TermId>,
}

impl GcState {
    pub fn new(parameters: GcParameters, automatic: bool) -> GcState {
        GcState {
            parameters,
            automatic,
            large_blocks_since_last_gc: 0,
            minor_collections: 0,
            major_collections: 0,
            minor_since_last_major: 0,
            old_words_in_young_blocks_after_last_major: 0,
            old_words_in_old_blocks_after_last_major: 0,
            old_words_in_young_blocks_since_last_major: 0,
            stack: Vec::new(),
        }
    }
}

/// Helper struct to pass private data required to mark terms recursively.
pub struct Marker<'a> {
    blocks: &'a mut BlockAllocator,
    stack: &'a mut Vec<TermId>,

    /// Old cells are not marked, nor their arguments visited.
    young_only: bool,
}

impl Marker<'_> {
    /// Marks the given term and all its subterms as reachable.
    pub fn mark(&mut self, term: TermId) {
        if !self.try_mark(term) {
            return;
        }

        self.stack.push(term);
        while let Some(term) = self.stack.pop() {
            let offset = self.blocks.header(term).arguments_offset();

            for index in 0..self.blocks.arity(term) {
                if let Some(argument) = TermId::from_word(self.blocks.word(term, offset + index)) {
                    // Mark before pushing since the argument can be shared.
                    if self.try_mark(argument) {
                        self.stack.push(argument);
                    }
                }
            }

            if let Some(annotations) = self.blocks.annotations(term) {
                if self.try_mark(annotations) {
                    self.stack.push(annotations);
                }
            }
        }
    }

    /// Sets the mark bit, returns false when the cell must not be visited.
    fn try_mark(&mut self, term: TermId) -> bool {
        let header = self.blocks.header(term);
        debug_assert!(!header.is_free(), "Marking the freed term {term}");

        if header.is_marked() || (self.young_only && header.is_old()) {
            return false;
        }

        self.blocks.set_header(term, header.marked());
        true
    }
}

impl Storage {
    /// Chooses between a new block and a collection for a size class without free cells.
    pub(crate) fn allocation_policy(&self, size: usize) -> Policy {
        let Some(class) = self.blocks.class(size) else {
            return Policy::Block;
        };
        let parameters = &self.gc.parameters;

        let blocks = class.number_of_blocks();
        if blocks <= parameters.min_number_of_blocks {
            return Policy::Block;
        }

        let live_before = class.live_blocks_before_last_gc;
        let reclaimed_ratio = 100 * class.reclaimed_cells_during_last_gc * size / (1 + live_before * BLOCK_SIZE);
        if reclaimed_ratio > parameters.good_gc_ratio {
            // The last collection was worth it, so collect again.
            let collection = if self.gc.minor_since_last_major < parameters.min_nb_minor_since_last_major {
                Collection::Minor
            } else {
                Collection::Major
            };
            return Policy::Collect(collection);
        }

        let allocation_rate = 100 * blocks.saturating_sub(live_before) / (1 + live_before);
        if allocation_rate < parameters.small_allocation_rate_ratio {
            return Policy::Block;
        }

        let old_increase = 100
            * self
                .gc
                .old_words_in_young_blocks_since_last_major
                .saturating_sub(self.gc.old_words_in_young_blocks_after_last_major)
            / (1 + self.gc.old_words_in_young_blocks_after_last_major + self.gc.old_words_in_old_blocks_after_last_major);
        if old_increase < parameters.old_increase_rate_ratio {
            Policy::Collect(Collection::Minor)
        } else {
            Policy::Collect(Collection::Major)
        }
    }

    /// Removes all terms that are not reachable from the roots of the given protection.
    pub(crate) fn collect(&mut self, collection: Collection, protection: &Protection) {
        let mark_time = Instant::now();

        for size in self.blocks.sizes() {
            let class = self.blocks.class_mut(size);
            class.live_blocks_before_last_gc = class.number_of_blocks();
            class.reclaimed_cells_during_last_gc = 0;
        }

        let num_of_terms = self.len();
        let num_of_symbols = self.symbols.len();

        let mut stack = std::mem::take(&mut self.gc.stack);
        {
            let mut marker = Marker {
                blocks: &mut self.blocks,
                stack: &mut stack,
                young_only: collection == Collection::Minor,
            };

            protection.mark(&mut marker);
        }
        self.gc.stack = stack;

        let mark_time_elapsed = mark_time.elapsed();
        let collect_time = Instant::now();

        match collection {
            Collection::Minor => self.sweep_minor(),
            Collection::Major => self.sweep_major(),
        }
        self.gc.large_blocks_since_last_gc = 0;

        debug!(
            "Garbage collection ({collection}): marking took {}ms, collection took {}ms, {} terms and {} symbols removed",
            mark_time_elapsed.as_millis(),
            collect_time.elapsed().as_millis(),
            num_of_terms - self.len(),
            num_of_symbols - self.symbols.len()
        );

        debug!("{}", self.metrics());

        #[cfg(feature = "atlas_debug")]
        self.check_consistency();
    }

    fn sweep_major(&mut self) {
        let mut old_words_in_young_blocks = 0;
        let mut old_words_in_old_blocks = 0;

        for size in self.blocks.sizes() {
            self.blocks.class_mut(size).free_list = None;
            let mut reclaimed = 0;

            // The old blocks first, their free cells are only reused when the block is demoted.
            let old_blocks = std::mem::take(&mut self.blocks.class_mut(size).old);
            let mut kept_old = Vec::with_capacity(old_blocks.len());
            let mut demoted = Vec::new();

            for block in old_blocks {
                let mut alive = 0;
                for offset in self.blocks.cell_offsets(block) {
                    let cell = TermId::new(block, offset);
                    let header = self.blocks.header(cell);

                    if header.is_marked() {
                        self.blocks.set_header(cell, header.unmarked());
                        alive += 1;
                    } else if !header.is_free() {
                        self.free_term(cell);
                        self.blocks.set_header(cell, Header::FREE);
                        self.blocks.set_next(cell, None);
                        reclaimed += 1;
                    }
                }

                if alive == 0 {
                    self.blocks.release_block(block);
                } else if 100 * alive / self.blocks.capacity(block) < TO_OLD_RATIO {
                    demoted.push(block);
                    old_words_in_young_blocks += alive * size;
                } else {
                    kept_old.push(block);
                    old_words_in_old_blocks += alive * size;
                }
            }

            let young_blocks = std::mem::take(&mut self.blocks.class_mut(size).young);
            let mut kept_young = Vec::with_capacity(young_blocks.len());

            for block in young_blocks {
                let saved_free_list = self.blocks.class_mut(size).free_list;
                let mut old_cells = 0;
                let mut young_cells = 0;

                for offset in self.blocks.cell_offsets(block) {
                    let cell = TermId::new(block, offset);
                    let header = self.blocks.header(cell);

                    if header.is_marked() {
                        if header.is_old() {
                            old_cells += 1;
                        } else {
                            young_cells += 1;
                        }
                        self.blocks.set_header(cell, header.unmarked().aged());
                    } else {
                        if !header.is_free() {
                            self.free_term(cell);
                            reclaimed += 1;
                        }
                        self.blocks.push_free(size, cell);
                    }
                }

                let full = self.blocks.is_full(block);
                if full && old_cells + young_cells == 0 {
                    self.blocks.class_mut(size).free_list = saved_free_list;
                    self.blocks.release_block(block);
                } else if full && 100 * old_cells / self.blocks.capacity(block) >= TO_OLD_RATIO {
                    // Mostly old, so the free cells of this block are not worth reusing.
                    self.blocks.class_mut(size).free_list = saved_free_list;

                    if young_cells == 0 {
                        self.blocks.set_frozen(block, false);
                        kept_old.push(block);
                        old_words_in_old_blocks += old_cells * size;
                    } else {
                        self.blocks.set_frozen(block, true);
                        kept_young.push(block);
                        old_words_in_young_blocks += old_cells * size;
                    }
                } else {
                    self.blocks.set_frozen(block, false);
                    kept_young.push(block);
                    old_words_in_young_blocks += old_cells * size;
                }
            }

            // The demoted blocks go in front of the young blocks, so that the last one keeps the bump pointer.
            for &block in &demoted {
                self.blocks.set_frozen(block, false);

                for offset in self.blocks.cell_offsets(block) {
                    let cell = TermId::new(block, offset);
                    if self.blocks.header(cell).is_free() {
                        self.blocks.push_free(size, cell);
                    }
                }
            }
            demoted.extend(kept_young);

            let class = self.blocks.class_mut(size);
            class.young = demoted;
            class.old = kept_old;
            class.reclaimed_cells_during_last_gc = reclaimed;
        }

        self.sweep_large(Collection::Major);

        self.gc.old_words_in_young_blocks_after_last_major = old_words_in_young_blocks;
        self.gc.old_words_in_old_blocks_after_last_major = old_words_in_old_blocks;
        self.gc.old_words_in_young_blocks_since_last_major = old_words_in_young_blocks;
        self.gc.minor_since_last_major = 0;
        self.gc.major_collections += 1;
    }

    fn sweep_minor(&mut self) {
        let mut old_words_in_young_blocks = 0;

        for size in self.blocks.sizes() {
            self.blocks.class_mut(size).free_list = None;
            let mut reclaimed = 0;

            let young_blocks = std::mem::take(&mut self.blocks.class_mut(size).young);
            for &block in &young_blocks {
                let saved_free_list = self.blocks.class_mut(size).free_list;
                let mut surviving = 0;

                for offset in self.blocks.cell_offsets(block) {
                    let cell = TermId::new(block, offset);
                    let header = self.blocks.header(cell);

                    if header.is_marked() || header.is_old() {
                        self.blocks.set_header(cell, header.unmarked().aged());
                        surviving += 1;
                    } else {
                        if !header.is_free() {
                            self.free_term(cell);
                            reclaimed += 1;
                        }
                        self.blocks.push_free(size, cell);
                    }
                }

                if self.blocks.is_frozen(block) {
                    self.blocks.class_mut(size).free_list = saved_free_list;
                }

                old_words_in_young_blocks += surviving * size;
            }

            let class = self.blocks.class_mut(size);
            class.young = young_blocks;
            class.reclaimed_cells_during_last_gc = reclaimed;
        }

        self.sweep_large(Collection::Minor);

        self.gc.old_words_in_young_blocks_since_last_major = old_words_in_young_blocks;
        self.gc.minor_since_last_major += 1;
        self.gc.minor_collections += 1;
    }

    /// Frees the large cells that were not marked, old cells survive a minor collection.
    fn sweep_large(&mut self, collection: Collection) {
        let large = self.blocks.take_large_blocks();
        let mut kept = Vec::with_capacity(large.len());

        for block in large {
            let cell = TermId::new(block, 0);
            let header = self.blocks.header(cell);

            if header.is_marked() || (collection == Collection::Minor && header.is_old()) {
                self.blocks.set_header(cell, header.unmarked().aged());
                kept.push(block);
            } else {
                self.free_term(cell);
                self.blocks.release_block(block);
            }
        }

        self.blocks.set_large_blocks(kept);
    }

    /// Checks that no cell is marked and that every live cell can be found in the hash-cons table.
    #[cfg(feature = "atlas_debug")]
    fn check_consistency(&self) {
        let mut blocks: Vec<usize> = Vec::new();
        for size in self.blocks.sizes() {
            if let Some(class) = self.blocks.class(size) {
                blocks.extend(class.young.iter().chain(class.old.iter()));
            }
        }

        let large = self.blocks.number_of_large_blocks();
        let mut live = 0;
        for block in blocks {
            for offset in self.blocks.cell_offsets(block) {
                let cell = TermId::new(block, offset);
                let header = self.blocks.header(cell);
                assert!(!header.is_marked(), "Term {cell} is still marked after a collection");

                if !header.is_free() {
                    live += 1;
                    let hash = crate::storage::hash_cell(&self.blocks, cell);
                    assert_eq!(
                        self.table.find(&self.blocks, hash, header, self.blocks.payload(cell)),
                        Some(cell),
                        "Term {cell} cannot be found in the hash-cons table"
                    );
                }
            }
        }

        assert_eq!(live + large, self.table.len(), "The hash-cons table contains freed terms");
    }

    /// Returns the metrics of the storage.
    pub(crate) fn metrics(&self) -> TermPoolMetrics {
        TermPoolMetrics {
            terms: self.len(),
            symbols: self.symbols.len(),
            blocks: self.blocks.number_of_blocks(),
            free_blocks: self.blocks.number_of_free_blocks(),
            large_blocks: self.blocks.number_of_large_blocks(),
            allocated_bytes: self.blocks.allocated_bytes(),
            table_size: self.table.table_size(),
            minor_collections: self.gc.minor_collections,
            major_collections: self.gc.major_collections,
        }
    }
}

/// A snapshot of the state of a [crate::TermPool], can be formatted and written to output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermPoolMetrics {
    pub terms: usize,
    pub symbols: usize,
    /// The number of blocks that hold cells, including the large blocks.
    pub blocks: usize,
    /// The number of empty blocks that are kept for reuse.
    pub free_blocks: usize,
    pub large_blocks: usize,
    pub allocated_bytes: usize,
    pub table_size: usize,
    pub minor_collections: usize,
    pub major_collections: usize,
}

impl fmt::Display for TermPoolMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "There are {} terms, and {} symbols",
            LargeFormatter(self.terms),
            LargeFormatter(self.symbols)
        )?;

        writeln!(
            f,
            "Blocks: {} in use ({} large) and {} empty, {} allocated",
            LargeFormatter(self.blocks),
            LargeFormatter(self.large_blocks),
            LargeFormatter(self.free_blocks),
            BytesFormatter(self.allocated_bytes)
        )?;

        write!(
            f,
            "Hash table: {} buckets, collections: {} minor and {} major",
            LargeFormatter(self.table_size),
            LargeFormatter(self.minor_collections),
            LargeFormatter(self.major_collections)
        )
    }
}
