//! # mvcc-memtable
//!
//! The in-memory write buffer of a log-structured storage engine: a
//! fixed-capacity bump arena plus a multi-version skip list whose nodes live
//! inside that arena.
//!
//! ## Architecture
//!
//! 1. **[`Arena`]**: one contiguous region with a monotonic allocation
//!    cursor, bounds-checked typed reads and writes, and a LEB128 varint
//!    codec. Memory is only reclaimed by dropping the whole arena.
//!
//! 2. **[`SkipList`]**: a probabilistic ordered index. "Pointers" are 32-bit
//!    arena offsets with a null sentinel. Records are ordered by key
//!    ascending, then sequence number descending, and lookups return the
//!    first record at or after the target (MVCC floor semantics).
//!
//! 3. **[`Memtable`]**: snapshot reads (`key` as of sequence number `S`) and
//!    delete markers on top of the raw index.
//!
//! ## Example
//!
//! ```rust
//! use mvcc_memtable::{Config, Footer, Header, SkipList};
//!
//! let list = SkipList::new(Config::with_capacity(1 << 20)).unwrap();
//! list.insert(&Header::put(b"apple", 1), &Footer::new(b"green")).unwrap();
//! list.insert(&Header::put(b"apple", 3), &Footer::new(b"red")).unwrap();
//!
//! // Newest version visible at sequence number 2.
//! let node = list.get(&Header::put(b"apple", 2)).unwrap().unwrap();
//! assert_eq!(node.sequence_number().unwrap(), 1);
//! assert_eq!(node.value().unwrap(), b"green");
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

pub mod arena;
pub mod config;
pub mod encoding;
pub mod error;
pub mod memtable;
pub mod record;
pub mod skiplist;

pub use arena::Arena;
pub use config::Config;
pub use error::{Error, Result};
pub use memtable::{Lookup, Memtable};
pub use record::{compare_records, Footer, Header, MutationType};
pub use skiplist::{Iter, NodeHandle, NodeOffset, SkipList};

#[cfg(test)]
mod proptests;
