//! The term storage that underlies the [crate::TermPool].
//!
//! Terms are stored maximally shared: every term lives in exactly one cell,
//! found through the hash-cons table on construction, so that structurally
//! equal terms have equal [TermId]s. Cells are handed out by a block
//! allocator with a free list per cell size, and reclaimed by a generational
//! mark-and-sweep garbage collector that marks from the roots of the pool.
//!
//! Everything is implemented in safe Rust: cells are addressed by index
//! into the blocks rather than by pointer.

mod block_allocator;
mod config;
mod error;
mod gc;
mod hash_table;
mod header;
mod protection;
mod symbol_table;
mod term_pool;
mod term_storage;

pub(crate) use block_allocator::*;
pub use config::*;
pub use error::*;
pub use gc::*;
pub(crate) use hash_table::*;
pub use header::*;
pub use protection::*;
pub use symbol_table::*;
pub use term_pool::*;
pub(crate) use term_storage::*;
