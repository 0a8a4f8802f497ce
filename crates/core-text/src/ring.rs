//! The line list for one document.
//!
//! Lines live in a slot vector and link to each other by [`LineId`]. Two
//! read-only sentinels bound the list. Soft removal parks the detached run
//! in a bounded undo log; hard removal frees the slots and their text.

use crate::line::{Delimiter, Line, LineFlags, LineId, LineText};
use crate::{LineObserver, RingError};
use core_pool::{PoolConfig, TextPool};
use std::cell::Cell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// Undo slots kept per ring.
pub const MAX_UNDO: usize = 4;

pub const TOP_OF_FILE: &[u8] = b"* * * * Top of file * * * *";
pub const END_OF_FILE: &[u8] = b"* * * * End of file * * * *";

/// Terminator used by the host platform.
pub const fn platform_delimiter() -> Delimiter {
    if cfg!(windows) {
        Delimiter::Crlf
    } else {
        Delimiter::Lf
    }
}

/// Overall classification of a file's terminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    #[default]
    Reset,
    Unix,
    Dos,
    Mixed,
    Binary,
}

impl FileMode {
    /// Terminator given to newly inserted lines.
    pub const fn default_delimiter(self) -> Delimiter {
        match self {
            FileMode::Unix => Delimiter::Lf,
            FileMode::Dos => Delimiter::Crlf,
            FileMode::Reset | FileMode::Mixed | FileMode::Binary => platform_delimiter(),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FileMode::Reset => "reset",
            FileMode::Unix => "unix",
            FileMode::Dos => "dos",
            FileMode::Mixed => "mixed",
            FileMode::Binary => "binary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RingKind {
    #[default]
    Reset,
    /// Ordinary file content; the only kind that may be saved.
    Data,
    /// Something that is not a file, e.g. a folder.
    Unusable,
    /// Editor-owned rings (history, utility).
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RingId(u32);

static NEXT_RING_ID: AtomicU32 = AtomicU32::new(1);

impl RingId {
    fn next() -> Self {
        RingId(NEXT_RING_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    line: Option<Line>,
}

#[derive(Debug, Clone, Copy)]
struct UndoSlot {
    head: LineId,
    tail: LineId,
    /// Line that preceded `head` when it was detached.
    after: LineId,
    count: usize,
}

#[derive(Debug)]
pub struct Ring {
    id: RingId,
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    top: LineId,
    bottom: LineId,
    pub(crate) pool: TextPool,
    rows: usize,
    cache: Cell<(usize, LineId)>,
    undo: VecDeque<UndoSlot>,
    pub(crate) mode: FileMode,
    pub(crate) kind: RingKind,
    pub(crate) changed: bool,
    pub(crate) damaged: bool,
    pub(crate) incomplete: bool,
    pub(crate) path: Option<PathBuf>,
}

impl Default for Ring {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Ring {
    pub fn new(config: PoolConfig) -> Self {
        let placeholder = LineId {
            slot: 0,
            generation: 0,
        };
        let mut ring = Self {
            id: RingId::next(),
            slots: Vec::new(),
            vacant: Vec::new(),
            top: placeholder,
            bottom: placeholder,
            pool: TextPool::new(config),
            rows: 0,
            cache: Cell::new((0, placeholder)),
            undo: VecDeque::with_capacity(MAX_UNDO),
            mode: FileMode::Reset,
            kind: RingKind::Reset,
            changed: false,
            damaged: false,
            incomplete: false,
            path: None,
        };
        ring.install_sentinels();
        ring
    }

    pub fn with_kind(config: PoolConfig, kind: RingKind) -> Self {
        let mut ring = Self::new(config);
        ring.kind = kind;
        ring
    }

    fn install_sentinels(&mut self) {
        let mut top = Line::new(Delimiter::None, LineFlags::READONLY);
        top.text = LineText::Static(TOP_OF_FILE);
        let mut bottom = Line::new(Delimiter::None, LineFlags::READONLY);
        bottom.text = LineText::Static(END_OF_FILE);
        let top = self.alloc(top);
        let bottom = self.alloc(bottom);
        if let Some(line) = self.slot_line_mut(top) {
            line.next = Some(bottom);
        }
        if let Some(line) = self.slot_line_mut(bottom) {
            line.prev = Some(top);
        }
        self.top = top;
        self.bottom = bottom;
        self.rows = 2;
        self.reset_cache();
    }

    /// Drop every line, the undo log and the pool, leaving an empty ring.
    /// Outstanding [`LineId`]s stop resolving.
    pub fn reset(&mut self) {
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.line.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.vacant.push(index as u32);
            }
        }
        self.undo.clear();
        self.pool.reset();
        self.mode = FileMode::Reset;
        self.kind = RingKind::Reset;
        self.changed = false;
        self.damaged = false;
        self.incomplete = false;
        self.install_sentinels();
    }

    fn alloc(&mut self, line: Line) -> LineId {
        if let Some(slot) = self.vacant.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.line = Some(line);
            LineId {
                slot,
                generation: entry.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                line: Some(line),
            });
            LineId {
                slot: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn free(&mut self, id: LineId) -> Option<Line> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let line = slot.line.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.slot);
        if let LineText::Pooled { block, .. } = line.text {
            self.pool.release(block);
            return Some(Line { text: LineText::Empty, ..line });
        }
        Some(line)
    }

    fn slot_line_mut(&mut self, id: LineId) -> Option<&mut Line> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.line.as_mut())
    }

    pub fn id(&self) -> RingId {
        self.id
    }

    /// Resolve a handle, including lines parked in the undo log.
    pub fn get(&self, id: LineId) -> Option<&Line> {
        self.slots
            .get(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.line.as_ref())
    }

    pub fn line(&self, id: LineId) -> Result<&Line, RingError> {
        self.get(id).ok_or(RingError::StaleLine(id))
    }

    pub(crate) fn line_mut(&mut self, id: LineId) -> Result<&mut Line, RingError> {
        self.slot_line_mut(id).ok_or(RingError::StaleLine(id))
    }

    /// True if `id` is live and linked into the list (not parked for undo).
    pub fn contains_line(&self, id: LineId) -> bool {
        self.get(id).is_some_and(|line| !line.detached)
    }

    fn linked(&self, id: LineId) -> Result<&Line, RingError> {
        match self.get(id) {
            Some(line) if !line.detached => Ok(line),
            _ => Err(RingError::StaleLine(id)),
        }
    }

    pub fn text(&self, id: LineId) -> Result<&[u8], RingError> {
        let line = self.line(id)?;
        Ok(self.text_of(line))
    }

    pub fn text_of<'a>(&'a self, line: &'a Line) -> &'a [u8] {
        match &line.text {
            LineText::Empty => &[],
            LineText::Pooled { block, len } => &self.pool.bytes(block)[..*len],
            LineText::Static(text) => text,
        }
    }

    pub fn next(&self, id: LineId) -> Option<LineId> {
        self.get(id).and_then(|line| line.next)
    }

    pub fn prev(&self, id: LineId) -> Option<LineId> {
        self.get(id).and_then(|line| line.prev)
    }

    pub fn top(&self) -> LineId {
        self.top
    }

    pub fn bottom(&self) -> LineId {
        self.bottom
    }

    /// First data line, if the ring holds any.
    pub fn first(&self) -> Option<LineId> {
        self.next(self.top).filter(|id| *id != self.bottom)
    }

    pub fn last(&self) -> Option<LineId> {
        self.prev(self.bottom).filter(|id| *id != self.top)
    }

    /// Number of lines in the list, sentinels included.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn data_rows(&self) -> usize {
        self.rows - 2
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 2
    }

    pub fn iter(&self) -> Lines<'_> {
        Lines {
            ring: self,
            cursor: Some(self.top),
        }
    }

    /// Lines between the sentinels.
    pub fn data_lines(&self) -> impl Iterator<Item = (LineId, &Line)> + '_ {
        let (top, bottom) = (self.top, self.bottom);
        self.iter().filter(move |(id, _)| *id != top && *id != bottom)
    }

    /// True iff walking forward from `head` reaches `line` no later than `tail`.
    pub fn between(&self, line: LineId, head: LineId, tail: LineId) -> bool {
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            if id == line {
                return true;
            }
            if id == tail {
                return false;
            }
            cursor = self.next(id);
        }
        false
    }

    pub fn is_marked(&self, id: LineId) -> bool {
        self.get(id).is_some_and(Line::is_marked)
    }

    pub fn is_readonly(&self, id: LineId) -> bool {
        self.get(id).is_some_and(Line::is_readonly)
    }

    pub fn set_marked(&mut self, id: LineId, marked: bool) -> Result<(), RingError> {
        self.line_mut(id)?.flags.set(LineFlags::MARKED, marked);
        Ok(())
    }

    pub fn set_hidden(&mut self, id: LineId, hidden: bool) -> Result<(), RingError> {
        self.line_mut(id)?.flags.set(LineFlags::HIDDEN, hidden);
        Ok(())
    }

    pub fn set_readonly(&mut self, id: LineId, readonly: bool) -> Result<(), RingError> {
        if id == self.top || id == self.bottom {
            return Err(RingError::Protected);
        }
        self.line_mut(id)?.flags.set(LineFlags::READONLY, readonly);
        Ok(())
    }

    pub fn set_delimiter(&mut self, id: LineId, delimiter: Delimiter) -> Result<(), RingError> {
        self.line_mut(id)?.delimiter = delimiter;
        self.changed = true;
        Ok(())
    }

    /// Replace a line's text with a pool copy of `text`.
    ///
    /// The new copy is allocated before the old one is released, so on
    /// failure the line is untouched.
    pub fn set_text(&mut self, id: LineId, text: &[u8]) -> Result<(), RingError> {
        if self.line(id)?.is_readonly() {
            return Err(RingError::Protected);
        }
        self.assign_text(id, text)?;
        self.changed = true;
        Ok(())
    }

    pub(crate) fn assign_text(&mut self, id: LineId, text: &[u8]) -> Result<(), RingError> {
        let fresh = if text.is_empty() {
            LineText::Empty
        } else {
            LineText::Pooled {
                block: self.pool.store(text)?,
                len: text.len(),
            }
        };
        let (old, result) = match self.slot_line_mut(id) {
            Some(line) => (std::mem::replace(&mut line.text, fresh), Ok(())),
            None => (fresh, Err(RingError::StaleLine(id))),
        };
        if let LineText::Pooled { block, .. } = old {
            self.pool.release(block);
        }
        result
    }

    /// Insert an empty line after `after`.
    ///
    /// The new line is marked (or hidden) only when both neighbours are, and
    /// takes the mode's default terminator.
    pub fn insert_line(&mut self, after: LineId) -> Result<LineId, RingError> {
        let (flags, next) = {
            let line = self.linked(after)?;
            (line.flags, line.next)
        };
        let next = next.ok_or(RingError::Protected)?;
        let inherited =
            flags & self.line(next)?.flags & (LineFlags::MARKED | LineFlags::HIDDEN);
        let mut line = Line::new(self.mode.default_delimiter(), inherited);
        line.prev = Some(after);
        line.next = Some(next);
        let id = self.alloc(line);
        self.line_mut(after)?.next = Some(id);
        self.line_mut(next)?.prev = Some(id);
        self.rows += 1;
        self.reset_cache();
        self.changed = true;
        Ok(id)
    }

    /// Count `head..=tail`, rejecting broken or read-only ranges.
    fn range_len(&self, head: LineId, tail: LineId) -> Result<usize, RingError> {
        self.linked(head)?;
        self.linked(tail)?;
        let mut count = 0;
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            let line = self.line(id)?;
            if line.is_readonly() {
                return Err(RingError::Protected);
            }
            count += 1;
            if id == tail {
                return Ok(count);
            }
            cursor = line.next;
        }
        Err(RingError::InvalidRange)
    }

    /// Unlink `head..=tail`. Returns the line that preceded the run.
    fn detach(&mut self, head: LineId, tail: LineId, count: usize) -> Result<LineId, RingError> {
        let after = self
            .line(head)?
            .prev
            .ok_or(RingError::Invariant("data line without predecessor"))?;
        let before = self
            .line(tail)?
            .next
            .ok_or(RingError::Invariant("data line without successor"))?;
        self.line_mut(after)?.next = Some(before);
        self.line_mut(before)?.prev = Some(after);
        self.line_mut(tail)?.next = None;
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            let line = self.line_mut(id)?;
            line.detached = true;
            cursor = line.next;
        }
        self.rows -= count;
        self.reset_cache();
        self.changed = true;
        Ok(after)
    }

    fn destroy_chain(&mut self, head: LineId) {
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            cursor = self.free(id).and_then(|line| line.next);
        }
    }

    /// Delete `head..=tail` for good.
    pub fn remove_lines(
        &mut self,
        head: LineId,
        tail: LineId,
        observer: &mut dyn LineObserver,
    ) -> Result<usize, RingError> {
        let count = self.range_len(head, tail)?;
        observer.lines_removing(self, head, tail);
        self.detach(head, tail, count)?;
        self.destroy_chain(head);
        debug!(target: "ring", ring = self.id.0, count, rows = self.rows, "remove_lines");
        Ok(count)
    }

    /// Detach `head..=tail` into the undo log, evicting the oldest slot when full.
    pub fn remove_lines_with_undo(
        &mut self,
        head: LineId,
        tail: LineId,
        observer: &mut dyn LineObserver,
    ) -> Result<usize, RingError> {
        let count = self.range_len(head, tail)?;
        observer.lines_removing(self, head, tail);
        if self.undo.len() >= MAX_UNDO
            && let Some(oldest) = self.undo.pop_front()
        {
            self.destroy_chain(oldest.head);
            debug!(target: "ring.undo", ring = self.id.0, count = oldest.count, "undo_evict");
        }
        let after = self.detach(head, tail, count)?;
        self.undo.push_back(UndoSlot {
            head,
            tail,
            after,
            count,
        });
        debug!(target: "ring.undo", ring = self.id.0, count, depth = self.undo.len(), "undo_push");
        Ok(count)
    }

    /// Re-link the most recently removed run where it came from.
    pub fn undo(&mut self) -> Result<(LineId, LineId), RingError> {
        let slot = self.undo.pop_back().ok_or(RingError::CannotUndo)?;
        let before = match self.get(slot.after) {
            Some(line) if !line.detached => line.next,
            _ => None,
        };
        let Some(before) = before else {
            self.destroy_chain(slot.head);
            warn!(target: "ring.undo", ring = self.id.0, count = slot.count, "undo_anchor_lost");
            return Err(RingError::UndoAnchorLost);
        };
        let marked = self.is_marked(slot.after) && self.is_marked(before);
        let mut cursor = Some(slot.head);
        while let Some(id) = cursor {
            let line = self.line_mut(id)?;
            line.detached = false;
            line.flags.set(LineFlags::MARKED, marked);
            cursor = line.next;
        }
        self.line_mut(slot.head)?.prev = Some(slot.after);
        self.line_mut(slot.tail)?.next = Some(before);
        self.line_mut(slot.after)?.next = Some(slot.head);
        self.line_mut(before)?.prev = Some(slot.tail);
        self.rows += slot.count;
        self.reset_cache();
        self.changed = true;
        debug!(target: "ring.undo", ring = self.id.0, count = slot.count, depth = self.undo.len(), "undo_pop");
        Ok((slot.head, slot.tail))
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Discard the undo log, freeing the parked lines.
    pub fn reset_undo(&mut self) {
        while let Some(slot) = self.undo.pop_front() {
            self.destroy_chain(slot.head);
        }
    }

    /// Relink `first..=last` after `after` within this ring.
    pub fn move_lines(
        &mut self,
        first: LineId,
        last: LineId,
        after: LineId,
    ) -> Result<(), RingError> {
        self.range_len(first, last)?;
        if self.linked(after)?.next.is_none() {
            return Err(RingError::Protected);
        }
        if self.between(after, first, last) {
            return Err(RingError::InvalidRange);
        }
        let prev = self
            .line(first)?
            .prev
            .ok_or(RingError::Invariant("data line without predecessor"))?;
        if prev == after {
            return Ok(());
        }
        let next = self
            .line(last)?
            .next
            .ok_or(RingError::Invariant("data line without successor"))?;
        self.line_mut(prev)?.next = Some(next);
        self.line_mut(next)?.prev = Some(prev);
        let after_next = self
            .line(after)?
            .next
            .ok_or(RingError::Invariant("data line without successor"))?;
        self.line_mut(first)?.prev = Some(after);
        self.line_mut(last)?.next = Some(after_next);
        self.line_mut(after)?.next = Some(first);
        self.line_mut(after_next)?.prev = Some(last);
        self.reset_cache();
        self.changed = true;
        Ok(())
    }

    /// 0-based position of `id`, counting the top sentinel as row 0.
    ///
    /// Tries the cached line's neighbours first, then scans forward from the
    /// cache, then from the top up to the cache.
    pub fn row_number(&self, id: LineId) -> Option<usize> {
        if !self.contains_line(id) {
            return None;
        }
        let (row, cached) = self.cache.get();
        let found = if id == cached {
            Some(row)
        } else if self.prev(cached) == Some(id) {
            Some(row - 1)
        } else if self.next(cached) == Some(id) {
            Some(row + 1)
        } else {
            self.scan_from(cached, row, id)
                .or_else(|| self.scan_to(cached, id))
        };
        if let Some(found) = found {
            self.cache.set((found, id));
        }
        found
    }

    fn scan_from(&self, start: LineId, start_row: usize, id: LineId) -> Option<usize> {
        let mut row = start_row;
        let mut cursor = self.next(start);
        while let Some(current) = cursor {
            row += 1;
            if current == id {
                return Some(row);
            }
            cursor = self.next(current);
        }
        None
    }

    fn scan_to(&self, stop: LineId, id: LineId) -> Option<usize> {
        let mut cursor = Some(self.top);
        let mut row = 0;
        while let Some(current) = cursor {
            if current == id {
                return Some(row);
            }
            if current == stop {
                return None;
            }
            row += 1;
            cursor = self.next(current);
        }
        None
    }

    /// Line at 0-based `row` (row 0 is the top sentinel).
    pub fn line_at(&self, row: usize) -> Option<LineId> {
        self.iter().nth(row).map(|(id, _)| id)
    }

    fn reset_cache(&self) {
        self.cache.set((0, self.top));
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FileMode) {
        self.mode = mode;
    }

    pub fn kind(&self) -> RingKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: RingKind) {
        self.kind = kind;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Sticky failure flag set by I/O or allocation trouble during load/save.
    pub fn is_damaged(&self) -> bool {
        self.damaged
    }

    pub fn set_damaged(&mut self, damaged: bool) {
        self.damaged = damaged;
    }

    /// The last line read had no terminator.
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn pool(&self) -> &TextPool {
        &self.pool
    }

    /// Structural self-check: links, row count, cache, undo log and pool.
    pub fn check(&self) -> Result<(), RingError> {
        if self.prev(self.top).is_some() || self.next(self.bottom).is_some() {
            return Err(RingError::Invariant("sentinel linked outward"));
        }
        let mut rows = 0;
        let mut expected_prev = None;
        let mut cursor = Some(self.top);
        let mut last = self.top;
        while let Some(id) = cursor {
            let line = self.line(id)?;
            if line.detached {
                return Err(RingError::Invariant("detached line in list"));
            }
            if line.prev != expected_prev {
                return Err(RingError::Invariant("prev link mismatch"));
            }
            rows += 1;
            expected_prev = Some(id);
            last = id;
            cursor = line.next;
        }
        if last != self.bottom {
            return Err(RingError::Invariant("list does not end at bottom sentinel"));
        }
        if rows != self.rows {
            return Err(RingError::Invariant("row count mismatch"));
        }
        let (row, cached) = self.cache.get();
        if self.line_at(row) != Some(cached) {
            return Err(RingError::Invariant("row cache out of sync"));
        }
        if self.undo.len() > MAX_UNDO {
            return Err(RingError::Invariant("undo log over capacity"));
        }
        for slot in &self.undo {
            let mut count = 0;
            let mut cursor = Some(slot.head);
            let mut end = slot.head;
            while let Some(id) = cursor {
                let line = self.line(id)?;
                if !line.detached {
                    return Err(RingError::Invariant("undo line still linked"));
                }
                count += 1;
                end = id;
                cursor = line.next;
            }
            if count != slot.count || end != slot.tail {
                return Err(RingError::Invariant("undo slot chain mismatch"));
            }
        }
        self.pool.check()?;
        Ok(())
    }
}

/// Iterator over `(LineId, &Line)` from the top sentinel to the bottom one.
pub struct Lines<'a> {
    ring: &'a Ring,
    cursor: Option<LineId>,
}

impl<'a> Iterator for Lines<'a> {
    type Item = (LineId, &'a Line);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let line = self.ring.get(id)?;
        self.cursor = line.next;
        Some((id, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ring_with(lines: &[&str]) -> (Ring, Vec<LineId>) {
        let mut ring = Ring::default();
        let mut after = ring.top();
        let mut ids = Vec::new();
        for text in lines {
            let id = ring.insert_line(after).unwrap();
            ring.set_text(id, text.as_bytes()).unwrap();
            ids.push(id);
            after = id;
        }
        (ring, ids)
    }

    fn texts(ring: &Ring) -> Vec<String> {
        ring.data_lines()
            .map(|(_, line)| String::from_utf8_lossy(ring.text_of(line)).into_owned())
            .collect()
    }

    #[test]
    fn fresh_ring_has_two_sentinels() {
        let ring = Ring::default();
        assert_eq!(ring.rows(), 2);
        assert!(ring.is_empty());
        assert_eq!(ring.text(ring.top()).unwrap(), TOP_OF_FILE);
        assert_eq!(ring.text(ring.bottom()).unwrap(), END_OF_FILE);
        assert!(ring.line(ring.top()).unwrap().is_readonly());
        ring.check().unwrap();
    }

    #[test]
    fn cannot_insert_past_end_of_file() {
        let mut ring = Ring::default();
        let bottom = ring.bottom();
        assert!(matches!(ring.insert_line(bottom), Err(RingError::Protected)));
    }

    #[test]
    fn insert_inherits_mark_only_between_marked_lines() {
        let (mut ring, ids) = ring_with(&["a", "b"]);
        ring.set_marked(ids[0], true).unwrap();
        let lone = ring.insert_line(ids[1]).unwrap();
        assert!(!ring.is_marked(lone));
        ring.set_marked(ids[1], true).unwrap();
        let inner = ring.insert_line(ids[0]).unwrap();
        assert!(ring.is_marked(inner));
        assert!(ring.is_changed());
    }

    #[test]
    fn new_line_takes_mode_delimiter() {
        let mut ring = Ring::default();
        ring.set_mode(FileMode::Dos);
        let top = ring.top();
        let id = ring.insert_line(top).unwrap();
        assert_eq!(ring.line(id).unwrap().delimiter(), Delimiter::Crlf);
    }

    #[test]
    fn hard_remove_frees_slots_and_text() {
        let (mut ring, ids) = ring_with(&["one", "two", "three"]);
        assert_eq!(ring.remove_lines(ids[0], ids[1], &mut ()).unwrap(), 2);
        assert_eq!(texts(&ring), vec!["three"]);
        assert!(ring.get(ids[0]).is_none());
        assert_eq!(ring.pool().stats().live, 16);
        ring.check().unwrap();
    }

    #[test]
    fn sentinels_cannot_be_removed() {
        let (mut ring, ids) = ring_with(&["one"]);
        let top = ring.top();
        assert!(matches!(
            ring.remove_lines(top, ids[0], &mut ()),
            Err(RingError::Protected)
        ));
        ring.check().unwrap();
    }

    #[test]
    fn soft_remove_then_undo_restores_position() {
        let (mut ring, ids) = ring_with(&["a", "b", "c", "d"]);
        ring.remove_lines_with_undo(ids[1], ids[2], &mut ()).unwrap();
        assert_eq!(texts(&ring), vec!["a", "d"]);
        assert!(!ring.contains_line(ids[1]));
        ring.check().unwrap();
        assert_eq!(ring.undo().unwrap(), (ids[1], ids[2]));
        assert_eq!(texts(&ring), vec!["a", "b", "c", "d"]);
        ring.check().unwrap();
        assert!(matches!(ring.undo(), Err(RingError::CannotUndo)));
    }

    #[test]
    fn undo_after_anchor_deleted_is_reported() {
        let (mut ring, ids) = ring_with(&["a", "b", "c"]);
        ring.remove_lines_with_undo(ids[1], ids[1], &mut ()).unwrap();
        ring.remove_lines(ids[0], ids[0], &mut ()).unwrap();
        assert!(matches!(ring.undo(), Err(RingError::UndoAnchorLost)));
        assert_eq!(ring.undo_depth(), 0);
        ring.check().unwrap();
    }

    #[test]
    fn undo_marks_restored_run_between_marked_neighbours() {
        let (mut ring, ids) = ring_with(&["a", "b", "c"]);
        ring.remove_lines_with_undo(ids[1], ids[1], &mut ()).unwrap();
        ring.set_marked(ids[0], true).unwrap();
        ring.set_marked(ids[2], true).unwrap();
        ring.undo().unwrap();
        assert!(ring.is_marked(ids[1]));
    }

    #[test]
    fn row_numbers_follow_cache() {
        let (ring, ids) = ring_with(&["a", "b", "c", "d", "e"]);
        assert_eq!(ring.row_number(ids[2]), Some(3));
        assert_eq!(ring.row_number(ids[3]), Some(4));
        assert_eq!(ring.row_number(ids[0]), Some(1));
        assert_eq!(ring.row_number(ring.bottom()), Some(6));
        assert_eq!(ring.row_number(ring.top()), Some(0));
        ring.check().unwrap();
    }

    #[test]
    fn row_number_of_removed_line_is_none() {
        let (mut ring, ids) = ring_with(&["a", "b"]);
        ring.remove_lines_with_undo(ids[0], ids[0], &mut ()).unwrap();
        assert_eq!(ring.row_number(ids[0]), None);
        assert_eq!(ring.row_number(ids[1]), Some(1));
    }

    #[test]
    fn between_walks_forward_only() {
        let (ring, ids) = ring_with(&["a", "b", "c", "d"]);
        assert!(ring.between(ids[1], ids[0], ids[2]));
        assert!(ring.between(ids[2], ids[0], ids[2]));
        assert!(!ring.between(ids[3], ids[0], ids[2]));
        assert!(!ring.between(ids[0], ids[1], ids[3]));
    }

    #[test]
    fn move_lines_relinks_run() {
        let (mut ring, ids) = ring_with(&["a", "b", "c", "d", "e"]);
        ring.move_lines(ids[0], ids[1], ids[3]).unwrap();
        assert_eq!(texts(&ring), vec!["c", "d", "a", "b", "e"]);
        ring.move_lines(ids[4], ids[4], ring.top()).unwrap();
        assert_eq!(texts(&ring), vec!["e", "c", "d", "a", "b"]);
        ring.move_lines(ids[0], ids[1], ids[4]).unwrap();
        assert_eq!(texts(&ring), vec!["e", "a", "b", "c", "d"]);
        assert!(matches!(
            ring.move_lines(ids[0], ids[2], ids[1]),
            Err(RingError::InvalidRange)
        ));
        ring.check().unwrap();
    }

    #[test]
    fn set_text_on_sentinel_is_protected() {
        let mut ring = Ring::default();
        let top = ring.top();
        assert!(matches!(ring.set_text(top, b"x"), Err(RingError::Protected)));
    }

    #[test]
    fn reset_invalidates_old_handles() {
        let (mut ring, ids) = ring_with(&["a"]);
        ring.reset();
        assert!(ring.get(ids[0]).is_none());
        assert!(ring.is_empty());
        ring.check().unwrap();
    }
}
