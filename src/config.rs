//! Tunables for the arena and skip list.

use crate::error::{Error, Result};

/// Default arena size (64 MiB).
pub const DEFAULT_ARENA_CAPACITY: usize = 64 * 1024 * 1024;

/// Default highest level index a node may be promoted to.
pub const DEFAULT_MAX_LEVEL: usize = 12;

/// Default chance of promoting a node one level higher.
pub const DEFAULT_PROMOTION_PROBABILITY: f64 = 0.25;

/// Hard ceiling on `max_level`; keeps predecessor arrays on the stack.
pub const MAX_LEVEL_LIMIT: usize = 31;

/// Configuration for a [`SkipList`](crate::SkipList) and its arena.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of the arena in bytes. Offsets are 32-bit, so this must stay
    /// below `u32::MAX`.
    pub arena_capacity: usize,
    /// Highest level index (0-based). Nodes carry between 1 and
    /// `max_level + 1` forward pointers.
    pub max_level: usize,
    /// Promotion probability used by the coin flips in level generation.
    pub promotion_probability: f64,
    /// Fixed RNG seed, for reproducible index shapes.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            max_level: DEFAULT_MAX_LEVEL,
            promotion_probability: DEFAULT_PROMOTION_PROBABILITY,
            seed: None,
        }
    }
}

impl Config {
    /// Default configuration with a different arena size.
    pub fn with_capacity(arena_capacity: usize) -> Self {
        Self {
            arena_capacity,
            ..Self::default()
        }
    }

    /// Check that every field is in range.
    pub fn validate(&self) -> Result<()> {
        if self.arena_capacity == 0 || self.arena_capacity >= u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "arena_capacity must be in 1..{}, got {}",
                u32::MAX,
                self.arena_capacity
            )));
        }
        if self.max_level > MAX_LEVEL_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "max_level must be at most {}, got {}",
                MAX_LEVEL_LIMIT, self.max_level
            )));
        }
        let p = self.promotion_probability;
        if !(p > 0.0 && p < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "promotion_probability must be in (0, 1), got {}",
                p
            )));
        }
        Ok(())
    }
}
