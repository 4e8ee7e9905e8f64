//! Node layout inside the arena.
//!
//! ```text
//! [level_count: u32] [next_0 .. next_{level_count-1}: u32, u32::MAX = null]
//! [key_len: varint] [key]
//! [sequence_number: i64]
//! [mutation_type: u8]
//! [value_len: varint] [value]
//! ```
//!
//! Integers are little endian. Nodes start on a 4-byte boundary so the
//! forward pointers can be loaded and stored atomically. Everything after
//! the pointers is written once, before the node is linked in.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::Ordering as MemOrder;

use crate::arena::Arena;
use crate::encoding::varint_size;
use crate::error::Result;
use crate::record::{Footer, Header, MutationType};

const LEVEL_COUNT_SIZE: usize = 4;
const POINTER_SIZE: usize = 4;
const SEQUENCE_SIZE: usize = 8;
const TYPE_SIZE: usize = 1;
const NODE_ALIGN: usize = 4;

// =============================================================================
// Pointer type
// =============================================================================

/// Arena offset of a node, with a dedicated null value.
///
/// Null is `u32::MAX`, which is the bit pattern of `-1` in the stored slot.
/// Offset zero is a real node (usually the head).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NodeOffset(u32);

impl NodeOffset {
    pub const NULL: NodeOffset = NodeOffset(u32::MAX);

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    fn from_usize(offset: usize) -> Self {
        // Arena capacity is kept below u32::MAX.
        debug_assert!(offset < u32::MAX as usize);
        Self(offset as u32)
    }
}

impl fmt::Debug for NodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("NodeOffset(NULL)")
        } else {
            write!(f, "NodeOffset({})", self.0)
        }
    }
}

// =============================================================================
// Raw node access
// =============================================================================

#[inline]
fn pointers_size(levels: usize) -> usize {
    LEVEL_COUNT_SIZE + levels * POINTER_SIZE
}

#[inline]
fn slot_offset(node: NodeOffset, level: usize) -> usize {
    node.as_usize() + LEVEL_COUNT_SIZE + level * POINTER_SIZE
}

/// Bytes needed for a node with `levels` pointers and the given payload.
pub(crate) fn encoded_len(levels: usize, key_len: u32, value_len: u32) -> usize {
    pointers_size(levels)
        + varint_size(key_len)
        + key_len as usize
        + SEQUENCE_SIZE
        + TYPE_SIZE
        + varint_size(value_len)
        + value_len as usize
}

fn alloc_pointers(arena: &Arena, levels: usize, payload: usize) -> Result<NodeOffset> {
    let offset = arena.allocate_aligned(pointers_size(levels) + payload, NODE_ALIGN)?;
    let node = NodeOffset::from_usize(offset);
    // SAFETY: the reservation was just made and nothing points at it yet.
    unsafe {
        arena.write_u32(offset, levels as u32)?;
        for level in 0..levels {
            arena.store_u32(slot_offset(node, level), NodeOffset::NULL.0, MemOrder::Relaxed)?;
        }
    }
    Ok(node)
}

/// Allocate a payload-free node with every pointer null.
pub(crate) fn alloc_head(arena: &Arena, levels: usize) -> Result<NodeOffset> {
    alloc_pointers(arena, levels, 0)
}

/// Allocate and fill a node in a single arena reservation.
///
/// The node is unreachable until a predecessor is pointed at it.
pub(crate) fn alloc_node(
    arena: &Arena,
    levels: usize,
    header: &Header<'_>,
    footer: &Footer<'_>,
) -> Result<NodeOffset> {
    let key_len = header.key_size()?;
    let value_len = footer.value_size()?;
    let payload = encoded_len(levels, key_len, value_len) - pointers_size(levels);
    let node = alloc_pointers(arena, levels, payload)?;

    let mut cursor = node.as_usize() + pointers_size(levels);
    // SAFETY: the node is still private to the writer; these bytes are never
    // written again once it is linked in.
    unsafe {
        cursor += arena.write_varint(cursor, key_len)?;
        arena.write_bytes(cursor, header.key)?;
        cursor += header.key.len();
        arena.write_i64(cursor, header.sequence_number)?;
        cursor += SEQUENCE_SIZE;
        arena.write_u8(cursor, header.mutation_type.0)?;
        cursor += TYPE_SIZE;
        cursor += arena.write_varint(cursor, value_len)?;
        arena.write_bytes(cursor, footer.value)?;
    }
    debug_assert_eq!(
        cursor + footer.value.len(),
        node.as_usize() + pointers_size(levels) + payload
    );

    Ok(node)
}

/// Follow `node`'s pointer at `level` (acquire).
#[inline]
pub(crate) fn next(arena: &Arena, node: NodeOffset, level: usize) -> Result<NodeOffset> {
    arena
        .load_u32(slot_offset(node, level), MemOrder::Acquire)
        .map(NodeOffset)
}

/// Point `node`'s pointer at `level` to `target` (release).
#[inline]
pub(crate) fn set_next(
    arena: &Arena,
    node: NodeOffset,
    level: usize,
    target: NodeOffset,
) -> Result<()> {
    // SAFETY: pointer slots are only touched through `next`/`set_next`, and
    // `NodeHandle` never borrows them as bytes.
    unsafe { arena.store_u32(slot_offset(node, level), target.0, MemOrder::Release) }
}

fn level_count(arena: &Arena, node: NodeOffset) -> Result<usize> {
    arena.read_u32(node.as_usize()).map(|n| n as usize)
}

/// Returns `(key, offset just past the key)`.
fn read_key(arena: &Arena, node: NodeOffset) -> Result<(&[u8], usize)> {
    let header = node.as_usize() + pointers_size(level_count(arena, node)?);
    let (key_len, prefix) = arena.read_varint(header)?;
    let start = header + prefix;
    let key = arena.read_bytes(start, key_len as usize)?;
    Ok((key, start + key.len()))
}

/// Where `node` sits relative to `target` in record order.
///
/// Works on the arena bytes directly: keys are compared as unsigned byte
/// strings (first mismatch decides, a strict prefix sorts first) and the
/// sequence number is only read when the keys are identical. A larger
/// sequence number sorts earlier.
pub(crate) fn compare_with_target(
    arena: &Arena,
    node: NodeOffset,
    target: &Header<'_>,
) -> Result<Ordering> {
    let (key, after_key) = read_key(arena, node)?;
    match key.cmp(target.key) {
        Ordering::Equal => {
            let sequence_number = arena.read_i64(after_key)?;
            Ok(target.sequence_number.cmp(&sequence_number))
        }
        other => Ok(other),
    }
}

// =============================================================================
// Handle
// =============================================================================

/// A node returned by the index.
///
/// Holds only the node's offset; every accessor decodes its field straight
/// from the arena.
#[derive(Clone, Copy)]
pub struct NodeHandle<'a> {
    arena: &'a Arena,
    offset: NodeOffset,
}

impl<'a> NodeHandle<'a> {
    pub(crate) fn new(arena: &'a Arena, offset: NodeOffset) -> Self {
        debug_assert!(!offset.is_null());
        Self { arena, offset }
    }

    pub fn offset(&self) -> NodeOffset {
        self.offset
    }

    /// Number of forward pointers (the node's height).
    pub fn level_count(&self) -> Result<usize> {
        level_count(self.arena, self.offset)
    }

    pub fn key(&self) -> Result<&'a [u8]> {
        read_key(self.arena, self.offset).map(|(key, _)| key)
    }

    pub fn sequence_number(&self) -> Result<i64> {
        let (_, after_key) = read_key(self.arena, self.offset)?;
        self.arena.read_i64(after_key)
    }

    pub fn mutation_type(&self) -> Result<MutationType> {
        let (_, after_key) = read_key(self.arena, self.offset)?;
        self.arena
            .read_u8(after_key + SEQUENCE_SIZE)
            .map(MutationType)
    }

    pub fn value(&self) -> Result<&'a [u8]> {
        let (_, after_key) = read_key(self.arena, self.offset)?;
        let footer = after_key + SEQUENCE_SIZE + TYPE_SIZE;
        let (value_len, prefix) = self.arena.read_varint(footer)?;
        self.arena.read_bytes(footer + prefix, value_len as usize)
    }

    /// Decode the whole header in one pass.
    pub fn header(&self) -> Result<Header<'a>> {
        let (key, after_key) = read_key(self.arena, self.offset)?;
        Ok(Header {
            key,
            sequence_number: self.arena.read_i64(after_key)?,
            mutation_type: MutationType(self.arena.read_u8(after_key + SEQUENCE_SIZE)?),
        })
    }

    pub fn footer(&self) -> Result<Footer<'a>> {
        self.value().map(Footer::new)
    }

    /// Successor at `level`, or `None` at the end of that level.
    pub fn next(&self, level: usize) -> Result<Option<NodeHandle<'a>>> {
        if level >= self.level_count()? {
            return Ok(None);
        }
        let next = next(self.arena, self.offset, level)?;
        Ok((!next.is_null()).then(|| NodeHandle::new(self.arena, next)))
    }
}

impl fmt::Debug for NodeHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("NodeHandle");
        s.field("offset", &self.offset);
        match self.header() {
            Ok(header) => s
                .field("key", &header.key)
                .field("sequence_number", &header.sequence_number)
                .field("mutation_type", &header.mutation_type),
            Err(err) => s.field("error", &err),
        };
        s.finish()
    }
}
