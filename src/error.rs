//! Error types for the memtable core.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the arena and index can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// An allocation, read or write does not fit inside the arena.
    ///
    /// For allocations `limit` is the capacity; for writes it is the
    /// allocated watermark; for reads it is the capacity.
    #[error("arena capacity exceeded: {len} bytes at offset {offset} (limit {limit})")]
    ArenaCapacity {
        offset: usize,
        len: usize,
        limit: usize,
    },

    #[error("arena memory has been released")]
    ArenaReleased,

    #[error("atomic access at offset {offset} is not 4-byte aligned")]
    MisalignedAtomic { offset: usize },

    #[error("varint at offset {offset} is too large for 32 bits")]
    VarintTooLarge { offset: usize },

    #[error("varint at offset {offset} runs past the end of the arena")]
    VarintUnderflow { offset: usize },

    #[error("payload of {len} bytes exceeds the 32-bit length limit")]
    PayloadTooLarge { len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to map arena memory: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error means "this memtable is full".
    ///
    /// Callers use this to rotate to a fresh memtable instead of treating the
    /// failure as corruption.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Error::ArenaCapacity { .. })
    }

    /// True for errors that indicate corrupt node bytes.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::VarintTooLarge { .. } | Error::VarintUnderflow { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let full = Error::ArenaCapacity {
            offset: 10,
            len: 4,
            limit: 12,
        };
        assert!(full.is_capacity());
        assert!(!full.is_corruption());

        let bad = Error::VarintTooLarge { offset: 3 };
        assert!(bad.is_corruption());
        assert!(!bad.is_capacity());

        assert!(!Error::ArenaReleased.is_capacity());
    }

    #[test]
    fn test_display() {
        let err = Error::ArenaCapacity {
            offset: 8,
            len: 16,
            limit: 20,
        };
        assert_eq!(
            err.to_string(),
            "arena capacity exceeded: 16 bytes at offset 8 (limit 20)"
        );
    }
}
