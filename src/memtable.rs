//! Key/value view over the skip list.
//!
//! The raw index answers floor queries over `(key, sequence_number)`. A
//! storage engine usually wants "the value of this key as of snapshot S",
//! which additionally needs the returned key to match and delete markers to
//! be recognized. This module adds exactly that and nothing else.

use crate::config::Config;
use crate::error::Result;
use crate::record::{Footer, Header, MutationType};
use crate::skiplist::node::encoded_len;
use crate::skiplist::{Iter, SkipList};

/// What a snapshot read found for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Value { sequence_number: i64, value: Vec<u8> },
    Deleted { sequence_number: i64 },
}

/// An in-memory write buffer of versioned records.
#[derive(Debug)]
pub struct Memtable {
    list: SkipList,
}

impl Memtable {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            list: SkipList::new(config)?,
        })
    }

    /// Record `key = value` at `sequence_number`.
    ///
    /// Returns `false` if that exact version was already present.
    pub fn put(&self, key: &[u8], sequence_number: i64, value: &[u8]) -> Result<bool> {
        self.list
            .insert(&Header::put(key, sequence_number), &Footer::new(value))
    }

    /// Record a deletion marker for `key` at `sequence_number`.
    pub fn delete(&self, key: &[u8], sequence_number: i64) -> Result<bool> {
        self.list
            .insert(&Header::delete(key, sequence_number), &Footer::empty())
    }

    /// Newest version of `key` with a sequence number `<= snapshot`.
    ///
    /// Any tag other than `DELETE` is reported as a value.
    pub fn get(&self, key: &[u8], snapshot: i64) -> Result<Option<Lookup>> {
        let Some(node) = self.list.get(&Header::put(key, snapshot))? else {
            return Ok(None);
        };
        let header = node.header()?;
        if header.key != key {
            return Ok(None);
        }
        let sequence_number = header.sequence_number;
        Ok(Some(match header.mutation_type {
            MutationType::DELETE => Lookup::Deleted { sequence_number },
            _ => Lookup::Value {
                sequence_number,
                value: node.value()?.to_vec(),
            },
        }))
    }

    /// Every record in order, all versions included.
    pub fn scan(&self) -> Iter<'_> {
        self.list.iter()
    }

    /// Whether a record of this size could still be stored.
    ///
    /// Assumes the tallest possible node plus worst-case alignment padding,
    /// so `false` may be returned for a record that would in fact fit.
    pub fn is_full_for(&self, key_len: usize, value_len: usize) -> bool {
        let (Ok(key_len), Ok(value_len)) = (u32::try_from(key_len), u32::try_from(value_len))
        else {
            return true;
        };
        let needed = encoded_len(self.list.max_level() + 1, key_len, value_len) + 3;
        self.list.remaining() < needed
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.list.memory_usage()
    }

    pub fn skip_list(&self) -> &SkipList {
        &self.list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memtable() -> Memtable {
        Memtable::new(Config {
            arena_capacity: 1 << 16,
            seed: Some(3),
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn test_snapshot_reads() {
        let m = memtable();
        m.put(b"user:1", 100, b"v100").unwrap();
        m.put(b"user:1", 200, b"v200").unwrap();
        m.delete(b"user:1", 300).unwrap();
        m.put(b"user:2", 50, b"other").unwrap();

        assert_eq!(m.get(b"user:1", 99).unwrap(), None);
        assert_eq!(
            m.get(b"user:1", 150).unwrap(),
            Some(Lookup::Value {
                sequence_number: 100,
                value: b"v100".to_vec()
            })
        );
        assert_eq!(
            m.get(b"user:1", 299).unwrap(),
            Some(Lookup::Value {
                sequence_number: 200,
                value: b"v200".to_vec()
            })
        );
        assert_eq!(
            m.get(b"user:1", 1000).unwrap(),
            Some(Lookup::Deleted {
                sequence_number: 300
            })
        );
        assert_eq!(m.get(b"user:0", 1000).unwrap(), None);
        assert_eq!(m.get(b"user:3", 1000).unwrap(), None);
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn test_put_is_first_writer_wins() {
        let m = memtable();
        assert!(m.put(b"k", 1, b"a").unwrap());
        assert!(!m.put(b"k", 1, b"b").unwrap());
        assert!(!m.delete(b"k", 1).unwrap());
        assert_eq!(
            m.get(b"k", 1).unwrap(),
            Some(Lookup::Value {
                sequence_number: 1,
                value: b"a".to_vec()
            })
        );
    }

    #[test]
    fn test_scan_includes_all_versions() {
        let m = memtable();
        m.put(b"b", 1, b"").unwrap();
        m.put(b"a", 1, b"").unwrap();
        m.delete(b"a", 2).unwrap();

        let seen: Vec<(Vec<u8>, i64, bool)> = m
            .scan()
            .map(|n| {
                let h = n.unwrap().header().unwrap();
                (h.key.to_vec(), h.sequence_number, h.mutation_type.is_delete())
            })
            .collect();
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), 2, true),
                (b"a".to_vec(), 1, false),
                (b"b".to_vec(), 1, false),
            ]
        );
    }

    #[test]
    fn test_is_full_for_tracks_configured_height() {
        let config = |max_level| Config {
            arena_capacity: 256,
            max_level,
            seed: Some(3),
            ..Config::default()
        };
        let flat = Memtable::new(config(0)).unwrap();
        let tall = Memtable::new(config(30)).unwrap();
        assert_eq!(tall.skip_list().max_level(), 30);

        // The tall head takes 128 of the 256 bytes, and a worst-case 31-level
        // node with this payload needs more than the 128 left.
        assert!(!flat.is_full_for(4, 16));
        assert!(tall.is_full_for(4, 16));
    }

    #[test]
    fn test_is_full_for() {
        let m = memtable();
        assert!(!m.is_full_for(16, 100));
        assert!(m.is_full_for(16, 1 << 16));

        let mut sn = 0;
        while !m.is_full_for(8, 64) {
            sn += 1;
            m.put(b"filler!!", sn, &[0u8; 64]).unwrap();
        }
        assert!(m.len() > 0);
        assert!(m.memory_usage() <= 1 << 16);
    }
}
