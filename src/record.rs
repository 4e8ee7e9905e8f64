//! Borrowed records handed to the index.
//!
//! A record is a [`Header`] (key, sequence number, mutation tag) plus a
//! [`Footer`] (value). Both borrow their bytes from the caller; the index
//! copies them into the arena on insert.

use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Opaque tag describing what a record does to its key.
///
/// The index stores and returns this byte unchanged; only callers give it
/// meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MutationType(pub u8);

impl MutationType {
    pub const PUT: MutationType = MutationType(0);
    pub const DELETE: MutationType = MutationType(1);

    pub fn is_delete(self) -> bool {
        self == Self::DELETE
    }
}

impl From<u8> for MutationType {
    fn from(tag: u8) -> Self {
        Self(tag)
    }
}

impl From<MutationType> for u8 {
    fn from(tag: MutationType) -> Self {
        tag.0
    }
}

/// Key half of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header<'a> {
    pub key: &'a [u8],
    pub sequence_number: i64,
    pub mutation_type: MutationType,
}

impl<'a> Header<'a> {
    pub fn new(key: &'a [u8], sequence_number: i64, mutation_type: MutationType) -> Self {
        Self {
            key,
            sequence_number,
            mutation_type,
        }
    }

    /// A `PUT` header; also the usual shape of a lookup target.
    pub fn put(key: &'a [u8], sequence_number: i64) -> Self {
        Self::new(key, sequence_number, MutationType::PUT)
    }

    pub fn delete(key: &'a [u8], sequence_number: i64) -> Self {
        Self::new(key, sequence_number, MutationType::DELETE)
    }

    /// Key length as stored in the node's length prefix.
    pub fn key_size(&self) -> Result<u32> {
        length_prefix(self.key.len())
    }

    /// Position of this header relative to a stored `(key, sequence_number)`.
    pub fn cmp_to(&self, key: &[u8], sequence_number: i64) -> Ordering {
        compare_records(self.key, self.sequence_number, key, sequence_number)
    }
}

/// Value half of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Footer<'a> {
    pub value: &'a [u8],
}

impl<'a> Footer<'a> {
    pub fn new(value: &'a [u8]) -> Self {
        Self { value }
    }

    pub fn empty() -> Self {
        Self { value: &[] }
    }

    pub fn value_size(&self) -> Result<u32> {
        length_prefix(self.value.len())
    }
}

fn length_prefix(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::PayloadTooLarge { len })
}

/// Total order of records: key ascending (unsigned bytes, shorter prefix
/// first), then sequence number descending, so the newest version of a key
/// comes first.
pub fn compare_records(key_a: &[u8], sn_a: i64, key_b: &[u8], sn_b: i64) -> Ordering {
    key_a.cmp(key_b).then_with(|| sn_b.cmp(&sn_a))
}
