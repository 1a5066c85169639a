#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod indexed_set;
mod indexed_table;
mod page_vec;
mod protection_set;

pub use indexed_set::*;
pub use indexed_table::*;
pub use page_vec::*;
pub use protection_set::*;
