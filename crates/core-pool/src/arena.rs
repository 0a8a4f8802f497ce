//! A single fixed-capacity byte block and its free ranges.
//!
//! Free space is tracked out of band as a vector of `(offset, len)` ranges
//! sorted by offset. Ranges never overlap and every boundary sits on a
//! `MIN_ELEMENT` multiple. Released ranges are recorded immediately and may be
//! adjacent to each other until [`Arena::coalesce`] merges them.

use crate::{MIN_ELEMENT, PoolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeRange {
    pub offset: usize,
    pub len: usize,
}

impl FreeRange {
    fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Debug)]
pub(crate) struct Arena {
    bytes: Box<[u8]>,
    free: Vec<FreeRange>,
}

impl Arena {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0 && capacity % MIN_ELEMENT == 0);
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
            free: vec![FreeRange {
                offset: 0,
                len: capacity,
            }],
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn free_bytes(&self) -> usize {
        self.free.iter().map(|r| r.len).sum()
    }

    pub fn largest_free(&self) -> usize {
        self.free.iter().map(|r| r.len).max().unwrap_or(0)
    }

    pub fn free_ranges(&self) -> usize {
        self.free.len()
    }

    /// First fit. The block is carved from the high end of the first range
    /// that can hold `size` bytes at an `align`-truncated offset; whatever is
    /// left in front of or behind it stays free.
    pub fn allocate(&mut self, size: usize, align: usize) -> Option<usize> {
        let index = self.free.iter().position(|range| {
            range.len >= size && ((range.end() - size) & !(align - 1)) >= range.offset
        })?;
        let range = self.free[index];
        let offset = (range.end() - size) & !(align - 1);
        let front = FreeRange {
            offset: range.offset,
            len: offset - range.offset,
        };
        let back = FreeRange {
            offset: offset + size,
            len: range.end() - (offset + size),
        };
        match (front.len > 0, back.len > 0) {
            (true, true) => {
                self.free[index] = front;
                self.free.insert(index + 1, back);
            }
            (true, false) => self.free[index] = front,
            (false, true) => self.free[index] = back,
            (false, false) => {
                self.free.remove(index);
            }
        }
        debug_assert!(self.bytes[offset..offset + size].iter().all(|b| *b == 0));
        Some(offset)
    }

    pub fn release(&mut self, offset: usize, len: usize) {
        self.bytes[offset..offset + len].fill(0);
        let at = self.free.partition_point(|r| r.offset < offset);
        self.free.insert(at, FreeRange { offset, len });
    }

    /// Merge adjacent free ranges. Returns how many ranges disappeared.
    pub fn coalesce(&mut self) -> usize {
        let before = self.free.len();
        let mut merged: Vec<FreeRange> = Vec::with_capacity(before);
        for range in self.free.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end() == range.offset => last.len += range.len,
                _ => merged.push(range),
            }
        }
        self.free = merged;
        before - self.free.len()
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.bytes[offset..offset + len]
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.bytes[offset..offset + len]
    }

    pub fn check(&self) -> Result<(), PoolError> {
        let mut cursor = 0usize;
        for range in &self.free {
            if range.len == 0 {
                return Err(PoolError::Invariant("empty free range"));
            }
            if range.offset % MIN_ELEMENT != 0 || range.len % MIN_ELEMENT != 0 {
                return Err(PoolError::Invariant("free range off element boundary"));
            }
            if range.offset < cursor {
                return Err(PoolError::Invariant("free ranges overlap or are unsorted"));
            }
            cursor = range.end();
        }
        if cursor > self.capacity() {
            return Err(PoolError::Invariant("free range past arena end"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_comes_from_the_back() {
        let mut arena = Arena::new(256);
        assert_eq!(arena.allocate(32, 16), Some(224));
        assert_eq!(arena.allocate(16, 16), Some(208));
        assert_eq!(arena.free_bytes(), 208);
        assert_eq!(arena.free_ranges(), 1);
    }

    #[test]
    fn alignment_splits_front_and_back() {
        let mut arena = Arena::new(256);
        // 256 - 48 = 208, truncated to 64 -> 192, leaving 16 bytes behind.
        assert_eq!(arena.allocate(48, 64), Some(192));
        assert_eq!(arena.free_ranges(), 2);
        assert_eq!(arena.free_bytes(), 208);
        arena.check().unwrap();
    }

    #[test]
    fn release_keeps_ranges_sorted_until_coalesced() {
        let mut arena = Arena::new(128);
        let a = arena.allocate(64, 16).unwrap();
        let b = arena.allocate(64, 16).unwrap();
        arena.bytes_mut(a, 64)[0] = b'x';
        arena.release(a, 64);
        arena.release(b, 64);
        assert_eq!(arena.free_ranges(), 2);
        assert!(arena.bytes(a, 64).iter().all(|v| *v == 0));
        assert_eq!(arena.coalesce(), 1);
        assert_eq!(arena.largest_free(), 128);
        arena.check().unwrap();
    }

    #[test]
    fn full_arena_refuses() {
        let mut arena = Arena::new(64);
        assert!(arena.allocate(64, 16).is_some());
        assert_eq!(arena.allocate(16, 16), None);
    }
}
