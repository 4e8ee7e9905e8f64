//! MVCC skip list stored entirely inside an [`Arena`].
//!
//! Records are ordered by key (ascending, unsigned bytes) and then by
//! sequence number (descending), so the newest version of a key is met
//! first. Forward pointers are arena offsets; see [`node`] for the byte
//! layout.
//!
//! ## Concurrency
//!
//! Any number of readers may run [`SkipList::get`] and [`SkipList::iter`]
//! while one writer inserts. Inserts are serialized by an internal mutex.
//! A node is fully written before it becomes reachable: at each level the
//! new node's own pointer is set first, then the predecessor's pointer is
//! swung to it with a release store, and readers follow pointers with
//! acquire loads.
//!
//! Record bytes are write-once. The arena is owned by the list and never
//! handed out, so the only way to put bytes into it is [`SkipList::insert`]:
//!
//! ```compile_fail,E0599
//! use mvcc_memtable::{Config, SkipList};
//!
//! let list = SkipList::new(Config::with_capacity(4096)).unwrap();
//! let _ = list.arena();
//! ```

pub mod node;

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as MemOrder};

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::config::{Config, MAX_LEVEL_LIMIT};
use crate::error::Result;
use crate::record::{Footer, Header};

pub use node::{NodeHandle, NodeOffset};

/// Rightmost node left of the insertion point, per level.
type Predecessors = SmallVec<[NodeOffset; MAX_LEVEL_LIMIT + 1]>;

/// Coin-flip level generator; lives behind the writer lock.
struct LevelGenerator {
    rng: SmallRng,
    probability: f64,
    max_level: usize,
}

impl LevelGenerator {
    fn new(config: &Config) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            rng,
            probability: config.promotion_probability,
            max_level: config.max_level,
        }
    }

    /// Highest level index for a new node, in `0..=max_level`.
    fn random_level(&mut self) -> usize {
        let mut level = 0;
        while level < self.max_level && self.rng.gen::<f64>() < self.probability {
            level += 1;
        }
        level
    }
}

/// Ordered multi-version index over arena-resident nodes.
pub struct SkipList {
    arena: Arena,
    head: NodeOffset,
    max_level: usize,
    /// Highest level index currently linked from the head.
    current_level: AtomicUsize,
    len: AtomicUsize,
    writer: Mutex<LevelGenerator>,
}

impl SkipList {
    /// Create an index with its own arena.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let arena = Arena::new(config.arena_capacity)?;
        Self::with_arena(arena, config)
    }

    /// Create an index on top of an existing arena.
    ///
    /// `config.arena_capacity` is ignored; the arena's own size applies.
    pub fn with_arena(arena: Arena, config: Config) -> Result<Self> {
        config.validate()?;
        let mut list = Self {
            arena,
            head: NodeOffset::NULL,
            max_level: config.max_level,
            current_level: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            writer: Mutex::new(LevelGenerator::new(&config)),
        };
        list.init()?;
        debug!(
            capacity = list.arena.capacity(),
            max_level = list.max_level,
            "created skip list"
        );
        Ok(list)
    }

    /// Allocate a fresh head with every pointer null and reset the level.
    ///
    /// Called by the constructors. Calling it again empties the index;
    /// previously inserted nodes stay in the arena but become unreachable.
    pub fn init(&mut self) -> Result<()> {
        // One slot more than max_level so a node drawn at the top level can
        // be linked at every one of its levels.
        self.head = node::alloc_head(&self.arena, self.max_level + 1)?;
        *self.current_level.get_mut() = 0;
        *self.len.get_mut() = 0;
        Ok(())
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Descend from the head towards `target`.
    ///
    /// Returns the last node ordered strictly before `target` at level 0 and
    /// its successor (the first node not before `target`, possibly null).
    /// When `update` is given, it receives the stopping node at each level.
    fn seek(
        &self,
        target: &Header<'_>,
        mut update: Option<&mut Predecessors>,
    ) -> Result<(NodeOffset, NodeOffset)> {
        let arena = &self.arena;
        let mut current = self.head;
        let top = self.current_level.load(MemOrder::Acquire);

        for level in (0..=top).rev() {
            loop {
                let next = node::next(arena, current, level)?;
                if next.is_null()
                    || node::compare_with_target(arena, next, target)? != Ordering::Less
                {
                    break;
                }
                current = next;
            }
            if let Some(update) = update.as_deref_mut() {
                update[level] = current;
            }
        }

        Ok((current, node::next(arena, current, 0)?))
    }

    /// Floor lookup: the first record ordered at or after `target`.
    ///
    /// If the key has a version with sequence number `<= target`'s, that is
    /// the newest such version. Otherwise this is the newest version of the
    /// next greater key, so callers wanting an exact key must compare the
    /// returned key themselves. `None` means every stored record sorts
    /// before `target`.
    pub fn get(&self, target: &Header<'_>) -> Result<Option<NodeHandle<'_>>> {
        let (_, found) = self.seek(target, None)?;
        Ok((!found.is_null()).then(|| NodeHandle::new(&self.arena, found)))
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert a record.
    ///
    /// Returns `false` without touching the index when a record with the
    /// same key and sequence number already exists; the first write wins.
    /// A capacity error leaves the index unchanged.
    pub fn insert(&self, header: &Header<'_>, footer: &Footer<'_>) -> Result<bool> {
        let mut levels = self.writer.lock();
        let arena = &self.arena;

        // Levels above the current top already point at the head.
        let mut update: Predecessors = smallvec![self.head; self.max_level + 1];
        let (_, candidate) = self.seek(header, Some(&mut update))?;
        if !candidate.is_null()
            && node::compare_with_target(arena, candidate, header)? == Ordering::Equal
        {
            trace!(sequence_number = header.sequence_number, "duplicate record ignored");
            return Ok(false);
        }

        let level = levels.random_level();
        let new_node = node::alloc_node(arena, level + 1, header, footer)?;

        for (i, &prev) in update.iter().enumerate().take(level + 1) {
            let successor = node::next(arena, prev, i)?;
            node::set_next(arena, new_node, i, successor)?;
            node::set_next(arena, prev, i, new_node)?;
        }

        if level > self.current_level.load(MemOrder::Relaxed) {
            self.current_level.store(level, MemOrder::Release);
            trace!(level, "skip list grew a level");
        }
        self.len.fetch_add(1, MemOrder::Relaxed);
        Ok(true)
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Walk every record in order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            arena: &self.arena,
            cursor: self.head,
            pending: None,
            finished: false,
        }
    }

    /// Walk records in order, starting at the floor of `target`.
    ///
    /// Records spliced in ahead of the floor after this call are not seen.
    pub fn iter_from(&self, target: &Header<'_>) -> Result<Iter<'_>> {
        let (_, found) = self.seek(target, None)?;
        Ok(Iter {
            arena: &self.arena,
            cursor: found,
            pending: Some(found),
            finished: false,
        })
    }

    /// Call `visitor` on every record in order.
    pub fn for_each<'a, F>(&'a self, mut visitor: F) -> Result<()>
    where
        F: FnMut(NodeHandle<'a>),
    {
        for node in self.iter() {
            visitor(node?);
        }
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of records linked in.
    pub fn len(&self) -> usize {
        self.len.load(MemOrder::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest level index in use (0 when only the bottom level is).
    pub fn current_level(&self) -> usize {
        self.current_level.load(MemOrder::Acquire)
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Size of the backing arena in bytes.
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Arena bytes still free for new records.
    pub fn remaining(&self) -> usize {
        self.arena.remaining()
    }

    /// Arena bytes consumed, head and alignment padding included.
    pub fn memory_usage(&self) -> usize {
        self.arena.used()
    }

    /// Release the arena. Every later call fails with `ArenaReleased`.
    pub fn close(&mut self) {
        self.arena.close();
    }
}

impl fmt::Debug for SkipList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipList")
            .field("len", &self.len())
            .field("current_level", &self.current_level())
            .field("max_level", &self.max_level)
            .field("arena", &self.arena)
            .finish()
    }
}

/// Forward-only, in-order walk over level 0.
///
/// Stops after the first error. Records linked in after the iterator has
/// passed their position are not seen.
pub struct Iter<'a> {
    arena: &'a Arena,
    /// Last node visited (the head before the first step).
    cursor: NodeOffset,
    /// First node to yield, when it is already known.
    pending: Option<NodeOffset>,
    finished: bool,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<NodeHandle<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let step = match self.pending.take() {
            Some(first) => Ok(first),
            None => node::next(self.arena, self.cursor, 0),
        };
        match step {
            Ok(next) if next.is_null() => {
                self.finished = true;
                None
            }
            Ok(next) => {
                self.cursor = next;
                Some(Ok(NodeHandle::new(self.arena, next)))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
