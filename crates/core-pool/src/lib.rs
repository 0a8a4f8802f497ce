//! Arena-backed byte pool for line text.
//!
//! A [`TextPool`] owns zero or more arenas created lazily on demand. Each
//! allocation is a [`PoolBlock`] handle: it cannot be cloned and releasing it
//! consumes it, so a block is returned to the pool at most once. Released
//! bytes are zero-filled and their range is recorded in the arena's free list
//! right away; [`TextPool::garbage_collect`] only merges neighbouring free
//! ranges so larger requests can be met again.

mod arena;

use arena::Arena;
use thiserror::Error;
use tracing::{debug, trace};

/// Allocation granularity in bytes. Every block size and offset is a multiple.
pub const MIN_ELEMENT: usize = 16;

/// Default arena granularity (64KiB).
pub const ARENA_GRANULE: usize = 64 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("No storage")]
    Exhausted { requested: usize },
    #[error("Invalid alignment {0}")]
    BadAlignment(usize),
    #[error("Internal logic error: {0}")]
    Invariant(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Arena granularity. New arenas are sized in multiples of this.
    pub arena_size: usize,
    /// Upper bound on the number of arenas; `None` means unbounded.
    pub max_arenas: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            arena_size: ARENA_GRANULE,
            max_arenas: None,
        }
    }
}

impl PoolConfig {
    fn granule(&self) -> usize {
        self.arena_size.max(MIN_ELEMENT).next_power_of_two()
    }
}

/// Handle to one allocation. Only the pool that produced it can resolve it.
#[derive(Debug, PartialEq, Eq)]
pub struct PoolBlock {
    arena: u32,
    offset: u32,
    size: u32,
}

impl PoolBlock {
    /// Allocated size in bytes (always a multiple of [`MIN_ELEMENT`]).
    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub fn arena(&self) -> usize {
        self.arena as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub arenas: usize,
    pub capacity: usize,
    pub free: usize,
    pub live: usize,
    pub collections: u64,
}

#[derive(Debug, Default)]
pub struct TextPool {
    config: PoolConfig,
    arenas: Vec<Arena>,
    live: usize,
    collections: u64,
}

fn round_up(value: usize, to: usize) -> usize {
    value.div_ceil(to) * to
}

impl TextPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            arenas: Vec::new(),
            live: 0,
            collections: 0,
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Allocate `size` bytes at `align`. The returned bytes are zeroed.
    ///
    /// On a miss every arena is collected and the scan retried; after that a
    /// new arena is added unless `max_arenas` forbids it.
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<PoolBlock, PoolError> {
        if !align.is_power_of_two() {
            return Err(PoolError::BadAlignment(align));
        }
        let align = align.max(MIN_ELEMENT);
        let size = round_up(size.max(1), MIN_ELEMENT);
        if size > u32::MAX as usize - self.config.granule() {
            return Err(PoolError::Exhausted { requested: size });
        }
        if let Some(block) = self.try_allocate(size, align) {
            return Ok(block);
        }
        self.garbage_collect();
        if let Some(block) = self.try_allocate(size, align) {
            return Ok(block);
        }
        self.grow(size, align)?;
        self.try_allocate(size, align)
            .ok_or(PoolError::Invariant("fresh arena cannot satisfy request"))
    }

    /// Allocate a block at minimum alignment and copy `text` into it.
    pub fn store(&mut self, text: &[u8]) -> Result<PoolBlock, PoolError> {
        let block = self.allocate(text.len(), MIN_ELEMENT)?;
        self.bytes_mut(&block)[..text.len()].copy_from_slice(text);
        Ok(block)
    }

    pub fn release(&mut self, block: PoolBlock) {
        let size = block.size();
        self.arenas[block.arena()].release(block.offset(), size);
        self.live -= size;
        trace!(target: "pool", arena = block.arena, offset = block.offset, size, "release");
    }

    /// Merge adjacent free ranges in every arena.
    pub fn garbage_collect(&mut self) {
        let merged: usize = self.arenas.iter_mut().map(Arena::coalesce).sum();
        self.collections += 1;
        debug!(
            target: "pool",
            arenas = self.arenas.len(),
            merged,
            collections = self.collections,
            "garbage_collect"
        );
    }

    /// Panics if `block` was not produced by this pool.
    pub fn bytes(&self, block: &PoolBlock) -> &[u8] {
        self.arenas[block.arena()].bytes(block.offset(), block.size())
    }

    /// Panics if `block` was not produced by this pool.
    pub fn bytes_mut(&mut self, block: &PoolBlock) -> &mut [u8] {
        self.arenas[block.arena()].bytes_mut(block.offset(), block.size())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            arenas: self.arenas.len(),
            capacity: self.arenas.iter().map(Arena::capacity).sum(),
            free: self.arenas.iter().map(Arena::free_bytes).sum(),
            live: self.live,
            collections: self.collections,
        }
    }

    pub fn largest_free(&self) -> usize {
        self.arenas.iter().map(Arena::largest_free).max().unwrap_or(0)
    }

    /// Verify every arena's free list and the free/live accounting.
    pub fn check(&self) -> Result<(), PoolError> {
        for arena in &self.arenas {
            arena.check()?;
        }
        let stats = self.stats();
        if stats.free + stats.live != stats.capacity {
            return Err(PoolError::Invariant("free + live != capacity"));
        }
        Ok(())
    }

    /// Drop every arena. Outstanding blocks must not be used afterwards.
    pub fn reset(&mut self) {
        self.arenas.clear();
        self.live = 0;
    }

    fn try_allocate(&mut self, size: usize, align: usize) -> Option<PoolBlock> {
        self.arenas
            .iter_mut()
            .enumerate()
            .find_map(|(index, arena)| arena.allocate(size, align).map(|offset| (index, offset)))
            .map(|(index, offset)| {
                self.live += size;
                PoolBlock {
                    arena: index as u32,
                    offset: offset as u32,
                    size: size as u32,
                }
            })
    }

    fn grow(&mut self, size: usize, align: usize) -> Result<(), PoolError> {
        if let Some(max) = self.config.max_arenas
            && self.arenas.len() >= max
        {
            debug!(target: "pool", requested = size, arenas = self.arenas.len(), "pool_exhausted");
            return Err(PoolError::Exhausted { requested: size });
        }
        let capacity = round_up(size, self.config.granule()).max(2 * align);
        self.arenas.push(Arena::new(capacity));
        debug!(target: "pool", capacity, arenas = self.arenas.len(), "arena_created");
        Ok(())
    }
}
