//! The active line: the one staging buffer every text edit goes through.
//!
//! An [`Active`] is bound to one line of one ring at a time. Edits happen on
//! its private copy; [`Active::store`] commits the copy back to the ring and
//! [`Active::undo`] throws it away. Short lines stay in the inline scratch
//! area of the buffer and never touch the heap.

use core_text::{LineId, LineObserver, Ring, RingError, RingId};
use smallvec::SmallVec;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Inline capacity of the working buffer.
pub const SCRATCH_SIZE: usize = 512;

/// Extra room reserved whenever the buffer has to grow.
pub const GROWTH_SLACK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveState {
    /// Buffer mirrors the committed line.
    #[default]
    Reset,
    /// Buffer holds edits not yet stored.
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Data,
    History,
    Work,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub ring: RingId,
    pub line: LineId,
    pub readonly: bool,
}

#[derive(Debug, Error)]
pub enum ActiveError {
    #[error("Protected")]
    Protected,
    #[error("No active line")]
    Unbound,
    #[error("Active line belongs to another ring")]
    WrongRing,
    #[error(transparent)]
    Ring(#[from] RingError),
}

#[derive(Debug)]
pub struct Active {
    role: Role,
    state: ActiveState,
    binding: Option<Binding>,
    text: SmallVec<[u8; SCRATCH_SIZE]>,
}

fn trailing_blanks(text: &[u8]) -> usize {
    text.iter().rev().take_while(|b| **b == b' ').count()
}

fn leading_blanks(text: &[u8]) -> usize {
    text.iter().take_while(|b| **b == b' ').count()
}

impl Active {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: ActiveState::Reset,
            binding: None,
            text: SmallVec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ActiveState {
        self.state
    }

    pub fn is_changed(&self) -> bool {
        self.state == ActiveState::Changed
    }

    pub fn binding(&self) -> Option<Binding> {
        self.binding
    }

    pub fn line(&self) -> Option<LineId> {
        self.binding.map(|b| b.line)
    }

    pub fn ring(&self) -> Option<RingId> {
        self.binding.map(|b| b.ring)
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.text.capacity()
    }

    /// True while the text still lives in the inline scratch area.
    pub fn is_inline(&self) -> bool {
        !self.text.spilled()
    }

    /// Bind to `line`, dropping any pending edit.
    pub fn fetch(&mut self, ring: &Ring, line: LineId) -> Result<(), ActiveError> {
        let record = ring.line(line)?;
        self.text = SmallVec::from_slice(ring.text_of(record));
        self.binding = Some(Binding {
            ring: ring.id(),
            line,
            readonly: record.is_readonly(),
        });
        self.state = ActiveState::Reset;
        trace!(target: "active", role = ?self.role, len = self.text.len(), "fetch");
        Ok(())
    }

    /// Reload the bound line.
    pub fn refetch(&mut self, ring: &Ring) -> Result<(), ActiveError> {
        let binding = self.bound_to(ring.id())?;
        self.fetch(ring, binding.line)
    }

    /// Drop the pending edit and the binding.
    pub fn reset(&mut self) {
        self.state = ActiveState::Reset;
        self.binding = None;
        self.text.clear();
    }

    fn bound_to(&self, ring: RingId) -> Result<Binding, ActiveError> {
        let binding = self.binding.ok_or(ActiveError::Unbound)?;
        if binding.ring != ring {
            return Err(ActiveError::WrongRing);
        }
        Ok(binding)
    }

    fn begin_change(&mut self) -> Result<(), ActiveError> {
        let binding = self.binding.ok_or(ActiveError::Unbound)?;
        if binding.readonly {
            return Err(ActiveError::Protected);
        }
        self.state = ActiveState::Changed;
        Ok(())
    }

    fn reserve_for(&mut self, len: usize) {
        if len > self.text.capacity() {
            self.text.reserve_exact(len - self.text.len() + GROWTH_SLACK);
        }
    }

    fn pad_to(&mut self, len: usize) {
        if self.text.len() < len {
            self.reserve_for(len);
            self.text.resize(len, b' ');
        }
    }

    /// Make sure at least `column + 1` bytes exist, padding with spaces.
    pub fn expand(&mut self, column: usize) -> Result<(), ActiveError> {
        self.begin_change()?;
        self.pad_to(column.saturating_add(1));
        Ok(())
    }

    pub fn insert_char(&mut self, column: usize, byte: u8) -> Result<(), ActiveError> {
        self.begin_change()?;
        if column >= self.text.len() {
            self.pad_to(column);
            self.reserve_for(column.saturating_add(1));
            self.text.push(byte);
        } else {
            self.reserve_for(self.text.len() + 1);
            self.text.insert(column, byte);
        }
        Ok(())
    }

    /// Delete the byte at `column`. Past the end this does nothing.
    pub fn remove_char(&mut self, column: usize) -> Result<(), ActiveError> {
        if column >= self.text.len() {
            return Ok(());
        }
        self.begin_change()?;
        self.text.remove(column);
        Ok(())
    }

    pub fn replace_char(&mut self, column: usize, byte: u8) -> Result<(), ActiveError> {
        self.expand(column)?;
        self.text[column] = byte;
        Ok(())
    }

    /// Truncate at `column`, padding first if the line is shorter.
    pub fn clear(&mut self, column: usize) -> Result<(), ActiveError> {
        self.begin_change()?;
        self.pad_to(column);
        self.text.truncate(column);
        Ok(())
    }

    pub fn append_string(&mut self, bytes: &[u8]) -> Result<(), ActiveError> {
        self.begin_change()?;
        self.reserve_for(self.text.len() + bytes.len());
        self.text.extend_from_slice(bytes);
        Ok(())
    }

    /// Replace `delete` bytes at `column` with `insert`. Deletion stops at the
    /// end of the line.
    pub fn replace_string(
        &mut self,
        column: usize,
        delete: usize,
        insert: &[u8],
    ) -> Result<(), ActiveError> {
        self.begin_change()?;
        let end = column
            .saturating_add(delete)
            .min(self.text.len().max(column));
        let delete = end - column;
        self.pad_to(end);
        match insert.len().cmp(&delete) {
            Ordering::Equal => self.text[column..end].copy_from_slice(insert),
            Ordering::Greater => {
                self.reserve_for(self.text.len() + insert.len() - delete);
                self.text.insert_from_slice(end, &insert[delete..]);
                self.text[column..end].copy_from_slice(&insert[..delete]);
            }
            Ordering::Less => {
                let len = self.text.len();
                let shift = delete - insert.len();
                self.text[column..column + insert.len()].copy_from_slice(insert);
                self.text.copy_within(end..len, end - shift);
                self.text.truncate(len - shift);
            }
        }
        Ok(())
    }

    pub fn replace_line(&mut self, bytes: &[u8]) -> Result<(), ActiveError> {
        self.begin_change()?;
        self.text.clear();
        self.reserve_for(bytes.len());
        self.text.extend_from_slice(bytes);
        Ok(())
    }

    /// Remove trailing blanks.
    pub fn shrink(&mut self) -> Result<(), ActiveError> {
        let trailing = trailing_blanks(&self.text);
        if trailing == 0 {
            return Ok(());
        }
        self.begin_change()?;
        self.text.truncate(self.text.len() - trailing);
        Ok(())
    }

    /// Remove leading and trailing blanks.
    pub fn strip(&mut self) -> Result<(), ActiveError> {
        let leading = leading_blanks(&self.text);
        if leading > 0 {
            self.begin_change()?;
            let len = self.text.len();
            self.text.copy_within(leading..len, 0);
            self.text.truncate(len - leading);
        }
        self.shrink()
    }

    /// Commit a pending edit to `ring` and re-fetch the line.
    ///
    /// Trailing blanks are not stored. The line's read-only flag is checked
    /// as it stands now, not as it was at fetch. If the ring cannot take the
    /// text the buffer keeps its edit and stays Changed.
    pub fn store(&mut self, ring: &mut Ring) -> Result<(), ActiveError> {
        if self.state == ActiveState::Reset {
            return Ok(());
        }
        let binding = self.bound_to(ring.id())?;
        if ring.line(binding.line)?.is_readonly() {
            return Err(ActiveError::Protected);
        }
        let end = self.text.len() - trailing_blanks(&self.text);
        ring.set_text(binding.line, &self.text[..end])?;
        debug!(target: "active", role = ?self.role, len = end, "store");
        self.fetch(ring, binding.line)
    }

    /// Discard the pending edit by re-fetching the bound line.
    pub fn undo(&mut self, ring: &Ring) -> Result<(), ActiveError> {
        self.refetch(ring)
    }
}

impl LineObserver for Active {
    /// Move off a line that is about to disappear, onto the line after the gap.
    fn lines_removing(&mut self, ring: &Ring, head: LineId, tail: LineId) {
        let Some(binding) = self.binding else {
            return;
        };
        if binding.ring != ring.id() || !ring.between(binding.line, head, tail) {
            return;
        }
        let follow = ring.next(tail);
        self.reset();
        if let Some(next) = follow
            && let Err(err) = self.fetch(ring, next)
        {
            warn!(target: "active", role = ?self.role, %err, "refetch_failed");
        }
    }

    fn lines_changed(&mut self, ring: &Ring, head: LineId, tail: LineId) {
        let Some(binding) = self.binding else {
            return;
        };
        if binding.ring == ring.id()
            && ring.between(binding.line, head, tail)
            && let Err(err) = self.fetch(ring, binding.line)
        {
            warn!(target: "active", role = ?self.role, %err, "refetch_failed");
        }
    }

    fn ring_removing(&mut self, ring: &Ring) {
        if self.ring() == Some(ring.id()) {
            self.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ring_with(text: &str) -> (Ring, LineId) {
        let mut ring = Ring::default();
        let top = ring.top();
        let line = ring.insert_line(top).unwrap();
        ring.set_text(line, text.as_bytes()).unwrap();
        (ring, line)
    }

    fn fetched(text: &str) -> (Ring, LineId, Active) {
        let (ring, line) = ring_with(text);
        let mut active = Active::new(Role::Data);
        active.fetch(&ring, line).unwrap();
        (ring, line, active)
    }

    #[test]
    fn insert_and_commit() {
        let (mut ring, line, mut active) = fetched("");
        active.insert_char(0, b'A').unwrap();
        active.insert_char(1, b'B').unwrap();
        assert_eq!(active.state(), ActiveState::Changed);
        active.store(&mut ring).unwrap();
        assert_eq!(ring.text(line).unwrap(), b"AB");
        assert_eq!(active.state(), ActiveState::Reset);
        assert_eq!(active.text(), b"AB");
    }

    #[test]
    fn insert_past_end_pads_with_spaces() {
        let (_ring, _line, mut active) = fetched("ab");
        active.insert_char(5, b'x').unwrap();
        assert_eq!(active.text(), b"ab   x");
        active.insert_char(0, b'>').unwrap();
        assert_eq!(active.text(), b">ab   x");
    }

    #[test]
    fn expand_pads_to_column() {
        let (_ring, _line, mut active) = fetched("ab");
        active.expand(4).unwrap();
        assert_eq!(active.text(), b"ab   ");
        active.expand(1).unwrap();
        assert_eq!(active.len(), 5);
    }

    #[test]
    fn remove_and_replace_char() {
        let (_ring, _line, mut active) = fetched("abc");
        active.remove_char(1).unwrap();
        assert_eq!(active.text(), b"ac");
        active.remove_char(9).unwrap();
        assert_eq!(active.text(), b"ac");
        active.replace_char(3, b'z').unwrap();
        assert_eq!(active.text(), b"ac z");
    }

    #[test]
    fn clear_truncates_or_pads() {
        let (_ring, _line, mut active) = fetched("abcdef");
        active.clear(2).unwrap();
        assert_eq!(active.text(), b"ab");
        active.clear(4).unwrap();
        assert_eq!(active.text(), b"ab  ");
    }

    #[test]
    fn replace_string_three_ways() {
        let (_ring, _line, mut active) = fetched("hello world");
        active.replace_string(0, 5, b"HOWDY").unwrap();
        assert_eq!(active.text(), b"HOWDY world");
        active.replace_string(6, 5, b"everyone").unwrap();
        assert_eq!(active.text(), b"HOWDY everyone");
        active.replace_string(0, 6, b"").unwrap();
        assert_eq!(active.text(), b"everyone");
        active.replace_string(0, 5, b"n").unwrap();
        assert_eq!(active.text(), b"none");
    }

    #[test]
    fn replace_string_past_end_pads() {
        let (_ring, _line, mut active) = fetched("ab");
        active.replace_string(4, 2, b"xyz").unwrap();
        assert_eq!(active.text(), b"ab  xyz");
    }

    #[test]
    fn replace_string_delete_stops_at_line_end() {
        let (_ring, _line, mut active) = fetched("abc");
        active.replace_string(1, usize::MAX, b"Z").unwrap();
        assert_eq!(active.text(), b"aZ");
    }

    #[test]
    fn append_and_replace_line() {
        let (_ring, _line, mut active) = fetched("ab");
        active.append_string(b"cd").unwrap();
        assert_eq!(active.text(), b"abcd");
        active.replace_line(b"new").unwrap();
        assert_eq!(active.text(), b"new");
    }

    #[test]
    fn shrink_and_strip() {
        let (_ring, _line, mut active) = fetched("  mid  ");
        active.shrink().unwrap();
        assert_eq!(active.text(), b"  mid");
        active.strip().unwrap();
        assert_eq!(active.text(), b"mid");
    }

    #[test]
    fn shrink_without_blanks_stays_reset() {
        let (_ring, _line, mut active) = fetched("word");
        active.shrink().unwrap();
        assert_eq!(active.state(), ActiveState::Reset);
    }

    #[test]
    fn blank_line_commits_as_empty() {
        let (mut ring, line, mut active) = fetched("text");
        active.replace_line(b"    ").unwrap();
        active.store(&mut ring).unwrap();
        assert!(ring.line(line).unwrap().is_empty());
        assert_eq!(ring.pool().stats().live, 0);
    }

    #[test]
    fn store_without_change_is_noop() {
        let (mut ring, _line, mut active) = fetched("text");
        ring.set_changed(false);
        active.store(&mut ring).unwrap();
        assert!(!ring.is_changed());
    }

    #[test]
    fn undo_discards_pending_edit() {
        let (ring, _line, mut active) = fetched("keep");
        active.replace_line(b"lose").unwrap();
        active.undo(&ring).unwrap();
        assert_eq!(active.text(), b"keep");
        assert_eq!(active.state(), ActiveState::Reset);
    }

    #[test]
    fn readonly_line_is_protected() {
        let ring = Ring::default();
        let mut active = Active::new(Role::Data);
        active.fetch(&ring, ring.top()).unwrap();
        assert!(matches!(active.insert_char(0, b'x'), Err(ActiveError::Protected)));
        assert!(matches!(active.expand(3), Err(ActiveError::Protected)));
        assert_eq!(active.state(), ActiveState::Reset);
        assert_eq!(active.text(), core_text::ring::TOP_OF_FILE);
    }

    #[test]
    fn unbound_buffer_refuses_edits() {
        let mut active = Active::new(Role::Work);
        assert!(matches!(active.expand(0), Err(ActiveError::Unbound)));
    }

    #[test]
    fn long_lines_spill_and_stay_bounded() {
        let (mut ring, line, mut active) = fetched("");
        assert!(active.is_inline());
        for column in 0..SCRATCH_SIZE + 40 {
            active.insert_char(column, b'x').unwrap();
            assert!(active.len() <= active.capacity());
        }
        assert!(!active.is_inline());
        active.store(&mut ring).unwrap();
        assert_eq!(ring.text(line).unwrap().len(), SCRATCH_SIZE + 40);
        active.fetch(&ring, ring.top()).unwrap();
        assert!(active.is_inline());
    }

    #[test]
    fn follows_removed_line_to_successor() {
        let mut ring = Ring::default();
        let top = ring.top();
        let a = ring.insert_line(top).unwrap();
        let b = ring.insert_line(a).unwrap();
        ring.set_text(b, b"after").unwrap();
        let mut active = Active::new(Role::Data);
        active.fetch(&ring, a).unwrap();
        active.expand(3).unwrap();
        ring.remove_lines_with_undo(a, a, &mut active).unwrap();
        assert_eq!(active.line(), Some(b));
        assert_eq!(active.text(), b"after");
        assert_eq!(active.state(), ActiveState::Reset);
    }
}
