#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod aterm;
mod aterm_blob;
mod aterm_builder;
mod aterm_indexed_set;
mod aterm_int;
mod aterm_list;
mod aterm_placeholder;
mod markable;
mod protected;
mod random_term;
mod symbol;

pub mod storage;

pub use aterm::*;
pub use aterm_blob::*;
pub use aterm_builder::*;
pub use aterm_indexed_set::*;
pub use aterm_int::*;
pub use aterm_list::*;
pub use aterm_placeholder::*;
pub use markable::*;
pub use protected::*;
pub use random_term::*;
pub use storage::*;
pub use symbol::*;
