//! Fixed-capacity bump arena addressed by offsets.
//!
//! The arena is one contiguous, zero-filled mapping with a monotonically
//! advancing allocation cursor. Nothing is ever freed individually; the
//! whole region goes away when the arena is closed or dropped. Every access
//! is bounds checked:
//! - reads may touch anything below the capacity
//! - writes may only touch bytes that have already been allocated
//!
//! Multi-byte integers are stored little endian and need no alignment. The
//! one exception is [`Arena::load_u32`]/[`Arena::store_u32`], which give
//! atomic access to 4-byte-aligned slots so that a writer can publish data
//! to concurrent readers.
//!
//! Reads hand out plain `&[u8]` borrows into the mapping, so every write is
//! `unsafe`: the caller promises the bytes it touches are not visible to any
//! reader yet. Writing through a shared arena without that promise does not
//! compile:
//!
//! ```compile_fail,E0133
//! use mvcc_memtable::Arena;
//!
//! let arena = Arena::new(64).unwrap();
//! let offset = arena.allocate(8).unwrap();
//! arena.write_bytes(offset, b"payload").unwrap();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use memmap2::MmapMut;
use tracing::{debug, warn};

use crate::encoding::{self, VarintError, MAX_VARINT_LEN};
use crate::error::{Error, Result};

/// A fixed-size memory arena with a bump allocator.
pub struct Arena {
    region: Option<MmapMut>,
    base: *mut u8,
    capacity: usize,
    used: AtomicUsize,
}

// SAFETY: `base` points into `region`, which lives as long as `self` (or
// until `close`, which needs `&mut self`). Every write is an `unsafe fn`
// whose contract requires the bytes to be private to the caller, or, for
// pointer slots, to be accessed atomically only.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Map a zero-filled arena of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity >= u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "arena capacity must be in 1..{}, got {}",
                u32::MAX,
                capacity
            )));
        }
        let mut region = MmapMut::map_anon(capacity)?;
        let base = region.as_mut_ptr();
        debug!(capacity, "mapped arena");
        Ok(Self {
            region: Some(region),
            base,
            capacity,
            used: AtomicUsize::new(0),
        })
    }

    /// Total size in bytes; zero once released.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out so far (the allocation cursor).
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Bytes still available for allocation.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    pub fn is_released(&self) -> bool {
        self.region.is_none()
    }

    /// Release the backing memory. Calling this more than once is a no-op.
    pub fn close(&mut self) {
        if let Some(region) = self.region.take() {
            drop(region);
            self.base = std::ptr::null_mut();
            self.capacity = 0;
            debug!(used = self.used.load(Ordering::Relaxed), "released arena");
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Reserve `size` contiguous bytes and return the offset of the first one.
    pub fn allocate(&self, size: usize) -> Result<usize> {
        self.allocate_aligned(size, 1)
    }

    /// Reserve `size` bytes starting at a multiple of `align`.
    ///
    /// `align` must be a power of two. Padding skipped to reach the alignment
    /// is consumed. A refused reservation leaves the cursor untouched.
    pub fn allocate_aligned(&self, size: usize, align: usize) -> Result<usize> {
        if !align.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "allocation alignment must be a power of two, got {align}"
            )));
        }
        self.ensure_live()?;

        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let start = current.checked_add(align - 1).map(|n| n & !(align - 1));
            let end = match start.and_then(|start| start.checked_add(size)) {
                Some(end) if end <= self.capacity => end,
                _ => {
                    warn!(
                        requested = size,
                        used = current,
                        capacity = self.capacity,
                        "arena allocation refused"
                    );
                    return Err(Error::ArenaCapacity {
                        offset: start.unwrap_or(current),
                        len: size,
                        limit: self.capacity,
                    });
                }
            };
            match self.used.compare_exchange_weak(
                current,
                end,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(end - size),
                Err(actual) => current = actual,
            }
        }
    }

    // =========================================================================
    // Bounds checks
    // =========================================================================

    fn ensure_live(&self) -> Result<()> {
        if self.region.is_none() {
            return Err(Error::ArenaReleased);
        }
        Ok(())
    }

    fn check(&self, offset: usize, len: usize, limit: usize) -> Result<()> {
        self.ensure_live()?;
        match offset.checked_add(len) {
            Some(end) if end <= limit => Ok(()),
            _ => Err(Error::ArenaCapacity { offset, len, limit }),
        }
    }

    fn check_read(&self, offset: usize, len: usize) -> Result<()> {
        self.check(offset, len, self.capacity)
    }

    fn check_write(&self, offset: usize, len: usize) -> Result<()> {
        self.check(offset, len, self.used())
    }

    // =========================================================================
    // Raw access
    // =========================================================================

    /// Borrow `len` bytes starting at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.check_read(offset, len)?;
        if len == 0 {
            return Ok(&[]);
        }
        // SAFETY: bounds checked above; the mapping outlives `&self`.
        Ok(unsafe { std::slice::from_raw_parts(self.base.add(offset), len) })
    }

    /// Copy `data` into the arena at `offset`.
    ///
    /// Fails if the range reaches past the allocation cursor.
    ///
    /// # Safety
    ///
    /// `offset..offset + data.len()` must belong to an allocation this caller
    /// made and has not yet published: no other thread may access those
    /// bytes during the call, and no slice returned by [`Arena::read_bytes`]
    /// may overlap them while it is alive.
    pub unsafe fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_write(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        // SAFETY: in bounds (checked above) and unaliased (caller contract).
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base.add(offset), data.len());
        }
        Ok(())
    }

    fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(offset, N)?);
        Ok(out)
    }

    // =========================================================================
    // Fixed-width integers (little endian, unaligned)
    // =========================================================================

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.read_array::<1>(offset)?[0])
    }

    /// # Safety
    ///
    /// Same contract as [`Arena::write_bytes`].
    pub unsafe fn write_u8(&self, offset: usize, value: u8) -> Result<()> {
        // SAFETY: forwarded to the caller.
        unsafe { self.write_bytes(offset, &[value]) }
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        self.read_array(offset).map(i32::from_le_bytes)
    }

    /// # Safety
    ///
    /// Same contract as [`Arena::write_bytes`].
    pub unsafe fn write_i32(&self, offset: usize, value: i32) -> Result<()> {
        // SAFETY: forwarded to the caller.
        unsafe { self.write_bytes(offset, &value.to_le_bytes()) }
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.read_array(offset).map(u32::from_le_bytes)
    }

    /// # Safety
    ///
    /// Same contract as [`Arena::write_bytes`].
    pub unsafe fn write_u32(&self, offset: usize, value: u32) -> Result<()> {
        // SAFETY: forwarded to the caller.
        unsafe { self.write_bytes(offset, &value.to_le_bytes()) }
    }

    pub fn read_i64(&self, offset: usize) -> Result<i64> {
        self.read_array(offset).map(i64::from_le_bytes)
    }

    /// # Safety
    ///
    /// Same contract as [`Arena::write_bytes`].
    pub unsafe fn write_i64(&self, offset: usize, value: i64) -> Result<()> {
        // SAFETY: forwarded to the caller.
        unsafe { self.write_bytes(offset, &value.to_le_bytes()) }
    }

    // =========================================================================
    // Atomic slots
    // =========================================================================

    fn slot(&self, offset: usize) -> Result<&AtomicU32> {
        if offset % std::mem::align_of::<AtomicU32>() != 0 {
            return Err(Error::MisalignedAtomic { offset });
        }
        // SAFETY: in bounds (checked by callers) and aligned (the mapping is
        // page aligned). Concurrent access goes through atomics only, which
        // `store_u32`'s contract guarantees.
        Ok(unsafe { &*(self.base.add(offset) as *const AtomicU32) })
    }

    /// Atomically load the little-endian `u32` at a 4-byte-aligned offset.
    pub fn load_u32(&self, offset: usize, order: Ordering) -> Result<u32> {
        self.check_read(offset, 4)?;
        Ok(u32::from_le(self.slot(offset)?.load(order)))
    }

    /// Atomically store a little-endian `u32` at a 4-byte-aligned offset
    /// inside an allocation.
    ///
    /// # Safety
    ///
    /// The slot must belong to an allocation this caller made. Once other
    /// threads can reach it, it may only be accessed through `load_u32` and
    /// `store_u32`, and no slice from [`Arena::read_bytes`] may cover it.
    pub unsafe fn store_u32(&self, offset: usize, value: u32, order: Ordering) -> Result<()> {
        self.check_write(offset, 4)?;
        self.slot(offset)?.store(value.to_le(), order);
        Ok(())
    }

    // =========================================================================
    // Varints
    // =========================================================================

    /// Encode `value` at `offset`, returning the number of bytes written.
    ///
    /// # Safety
    ///
    /// Same contract as [`Arena::write_bytes`].
    pub unsafe fn write_varint(&self, offset: usize, value: u32) -> Result<usize> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encoding::encode_varint(value, &mut buf);
        // SAFETY: forwarded to the caller.
        unsafe { self.write_bytes(offset, &buf[..len])? };
        Ok(len)
    }

    /// Decode the varint at `offset`, returning `(value, bytes_read)`.
    pub fn read_varint(&self, offset: usize) -> Result<(u32, usize)> {
        self.ensure_live()?;
        let available = self.capacity.saturating_sub(offset).min(MAX_VARINT_LEN);
        let window = if available == 0 {
            &[][..]
        } else {
            self.read_bytes(offset, available)?
        };
        encoding::decode_varint(window).map_err(|err| match err {
            VarintError::Underflow => Error::VarintUnderflow { offset },
            VarintError::TooLarge => Error::VarintTooLarge { offset },
        })
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("used", &self.used())
            .field("released", &self.is_released())
            .finish()
    }
}
