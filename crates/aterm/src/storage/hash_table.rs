#![forbid(unsafe_code)]

use log::debug;
use log::warn;

use crate::storage::BlockAllocator;
use crate::storage::Header;
use crate::storage::StorageError;
use crate::storage::TermId;
use crate::storage::Word;

/// Folds the high half of a word into the low half.
fn fold(word: Word) -> u64 {
    word ^ (word >> 32)
}

/// Computes the hash of a term from its header shape and the payload words.
pub(crate) fn hash_shape(header: Header, payload: &[Word]) -> u64 {
    let mut hash = fold(header.shape());
    for word in payload {
        hash = (hash << 1) ^ (hash >> 1) ^ fold(*word);
    }

    hash
}

/// Computes the hash of a stored term, which is equal to the hash it was inserted with.
pub(crate) fn hash_cell(blocks: &BlockAllocator, cell: TermId) -> u64 {
    hash_shape(blocks.header(cell), blocks.payload(cell))
}

/// The hash-cons table: a power of two number of buckets that each hold a
/// chain of cells, linked through the `next` word of the cells.
pub(crate) struct HashTable {
    buckets: Vec<Option<TermId>>,
    len: usize,

    /// The percentage of cells per bucket above which the table grows.
    max_load: usize,
}

impl HashTable {
    /// Creates a table with `2^class` buckets.
    pub fn new(class: u32, max_load: usize) -> Result<HashTable, StorageError> {
        Ok(HashTable {
            buckets: allocate_buckets(1 << class)?,
            len: 0,
            max_load,
        })
    }

    /// Returns the number of terms in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn table_size(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the cell that holds the term with the given shape and payload.
    pub fn find(&self, blocks: &BlockAllocator, hash: u64, header: Header, payload: &[Word]) -> Option<TermId> {
        let mut current = self.buckets[self.bucket(hash)];

        while let Some(cell) = current {
            if blocks.header(cell).shape() == header.shape() && blocks.payload(cell) == payload {
                return Some(cell);
            }

            current = blocks.next(cell);
        }

        None
    }

    /// Inserts the cell at the front of the chain of its bucket.
    pub fn insert(&mut self, blocks: &mut BlockAllocator, hash: u64, cell: TermId) {
        let bucket = self.bucket(hash);
        blocks.set_next(cell, self.buckets[bucket]);
        self.buckets[bucket] = Some(cell);
        self.len += 1;
    }

    /// Unlinks the cell from its chain, and returns false when it could not be found.
    pub fn remove(&mut self, blocks: &mut BlockAllocator, cell: TermId) -> bool {
        let bucket = self.bucket(hash_cell(blocks, cell));

        let mut previous: Option<TermId> = None;
        let mut current = self.buckets[bucket];
        while let Some(candidate) = current {
            let next = blocks.next(candidate);

            if candidate == cell {
                match previous {
                    Some(previous) => blocks.set_next(previous, next),
                    None => self.buckets[bucket] = next,
                }

                self.len -= 1;
                return true;
            }

            previous = Some(candidate);
            current = next;
        }

        false
    }

    /// Returns true iff the number of terms exceeds the maximum load.
    pub fn needs_resize(&self) -> bool {
        self.len * 100 > self.max_load.saturating_mul(self.buckets.len())
    }

    /// Doubles the number of buckets and redistributes the cells. When the new
    /// buckets cannot be allocated the table keeps its size and accepts a
    /// higher load instead.
    pub fn resize(&mut self, blocks: &mut BlockAllocator) {
        let size = self.buckets.len() * 2;

        let mut buckets = match allocate_buckets(size) {
            Ok(buckets) => buckets,
            Err(error) => {
                self.max_load = self.max_load.saturating_mul(2);
                warn!("The hash-cons table cannot grow, lookups will be slower: {error}");
                return;
            }
        };

        let mask = size - 1;
        for bucket in std::mem::take(&mut self.buckets) {
            let mut current = bucket;
            while let Some(cell) = current {
                current = blocks.next(cell);

                let index = hash_cell(blocks, cell) as usize & mask;
                blocks.set_next(cell, buckets[index]);
                buckets[index] = Some(cell);
            }
        }

        self.buckets = buckets;
        debug!("Resized the hash-cons table to {size} buckets for {} terms", self.len);
    }

    /// Removes all terms, keeping the buckets.
    pub fn clear(&mut self) {
        self.buckets.fill(None);
        self.len = 0;
    }

    fn bucket(&self, hash: u64) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }
}

fn allocate_buckets(size: usize) -> Result<Vec<Option<TermId>>, StorageError> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(size)
        .map_err(|source| StorageError::HashTable { buckets: size, source })?;
    buckets.resize(size, None);
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use crate::storage::HEADER_WORDS;
    use crate::storage::SymbolId;
    use crate::storage::TermType;

    use super::*;

    /// Creates an integer cell, as the term storage would.
    fn int_cell(blocks: &mut BlockAllocator, table: &mut HashTable, value: i64) -> TermId {
        let header = Header::new(TermType::Int, SymbolId::new(0), 0);
        let payload = [value as Word];
        let hash = hash_shape(header, &payload);

        if let Some(cell) = table.find(blocks, hash, header, &payload) {
            return cell;
        }

        let cell = match blocks.try_allocate(HEADER_WORDS + 1) {
            Some(cell) => cell,
            None => blocks.allocate_block(HEADER_WORDS + 1).unwrap(),
        };
        blocks.write_cell(cell, header, &payload);
        table.insert(blocks, hash, cell);
        cell
    }

    #[test]
    fn test_hash_ignores_gc_bits() {
        let header = Header::new(TermType::Int, SymbolId::new(0), 0);
        assert_eq!(hash_shape(header, &[5]), hash_shape(header.marked().aged(), &[5]));
        assert_ne!(hash_shape(header, &[5]), hash_shape(header, &[6]));
    }

    #[test]
    fn test_find_insert_remove() {
        let mut blocks = BlockAllocator::new(10, None);
        let mut table = HashTable::new(2, 80).unwrap();

        let cells: Vec<TermId> = (0..20).map(|value| int_cell(&mut blocks, &mut table, value)).collect();
        assert_eq!(table.len(), 20);
        assert_eq!(int_cell(&mut blocks, &mut table, 7), cells[7], "Terms are shared");

        assert!(table.remove(&mut blocks, cells[3]));
        assert!(!table.remove(&mut blocks, cells[3]));
        assert_eq!(table.len(), 19);

        let header = Header::new(TermType::Int, SymbolId::new(0), 0);
        assert_eq!(table.find(&blocks, hash_shape(header, &[3]), header, &[3]), None);
        assert_eq!(table.find(&blocks, hash_shape(header, &[4]), header, &[4]), Some(cells[4]));
    }

    #[test]
    fn test_resize() {
        let mut blocks = BlockAllocator::new(10, None);
        let mut table = HashTable::new(1, 100).unwrap();

        let mut cells = Vec::new();
        for value in 0..1000 {
            cells.push(int_cell(&mut blocks, &mut table, value));
            if table.needs_resize() {
                table.resize(&mut blocks);
            }
        }

        assert!(table.table_size() >= 1000);
        for (value, cell) in cells.iter().enumerate() {
            assert_eq!(int_cell(&mut blocks, &mut table, value as i64), *cell);
        }
        assert_eq!(table.len(), 1000);
    }
}
