//! The selection ("mark"): a run of whole lines or a column block over a
//! run of lines, plus the operations that act on it.
//!
//! There is one mark per editor. The marked lines carry the
//! [`core_text::LineFlags::MARKED`] bit; the mark itself remembers the first
//! line, the line last touched, and for blocks the `[left, right]` column
//! band and the column last touched.

mod format;
mod ops;

use core_active::ActiveError;
use core_text::{LineId, LineObserver, Ring, RingError, RingId, RingKind, Rings};
use thiserror::Error;
use tracing::debug;

pub use format::{MAX_FORMAT_MARGIN, Margins};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkState {
    #[default]
    Reset,
    Lines,
    Block,
}

#[derive(Debug, Error)]
pub enum MarkError {
    #[error("No mark")]
    NoMark,
    #[error("Protected")]
    Protected,
    #[error("Mark offscreen")]
    Offscreen,
    #[error("Block conflict")]
    Conflict,
    #[error("Improper mark")]
    ImproperMark,
    #[error("Invalid margins")]
    InvalidMargins,
    #[error("Internal logic error: {0}")]
    Invariant(&'static str),
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error(transparent)]
    Active(#[from] ActiveError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mark {
    state: MarkState,
    ring: Option<RingId>,
    first: Option<LineId>,
    touch_line: Option<LineId>,
    left: usize,
    right: usize,
    touch_col: usize,
}

impl Mark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MarkState {
        self.state
    }

    pub fn ring(&self) -> Option<RingId> {
        self.ring
    }

    pub fn first(&self) -> Option<LineId> {
        self.first
    }

    pub fn touch_line(&self) -> Option<LineId> {
        self.touch_line
    }

    /// `(left, touch, right)` column band. Meaningful in Block state.
    pub fn columns(&self) -> (usize, usize, usize) {
        (self.left, self.touch_col, self.right)
    }

    pub fn width(&self) -> usize {
        (self.right - self.left).saturating_add(1)
    }

    /// Forget the selection without touching any line.
    fn clear(&mut self) {
        *self = Mark::default();
    }

    /// Ring, first and last line of the selection.
    pub fn marked_range(&self, rings: &Rings) -> Result<(RingId, LineId, LineId), MarkError> {
        if self.state == MarkState::Reset {
            return Err(MarkError::NoMark);
        }
        let ring_id = self.ring.ok_or(MarkError::Invariant("mark without ring"))?;
        let first = self.first.ok_or(MarkError::Invariant("mark without first line"))?;
        let ring = rings.ring(ring_id)?;
        let mut last = first;
        while let Some(next) = ring.next(last).filter(|id| ring.is_marked(*id)) {
            last = next;
        }
        Ok((ring_id, first, last))
    }

    /// Every selected line, top to bottom.
    pub fn marked_lines(&self, rings: &Rings) -> Result<Vec<LineId>, MarkError> {
        let (ring_id, first, last) = self.marked_range(rings)?;
        let ring = rings.ring(ring_id)?;
        run(ring, first, last)
    }

    /// Extend, contract or start the selection at `line`.
    ///
    /// With a column the selection becomes a block and the column adjusts the
    /// band: outside it widens that side; inside it moves `right` when the
    /// last touch was at `left`, otherwise it moves `left`.
    pub fn mark(
        &mut self,
        rings: &mut Rings,
        ring_id: RingId,
        line: LineId,
        column: Option<usize>,
    ) -> Result<(), MarkError> {
        let ring = rings.ring_mut(ring_id)?;
        if !ring.contains_line(line) {
            return Err(RingError::StaleLine(line).into());
        }
        if ring.kind() == RingKind::Protected || ring.is_readonly(line) {
            return Err(MarkError::Protected);
        }
        match self.state {
            MarkState::Reset => {
                ring.set_marked(line, true)?;
                let column = column.unwrap_or(0);
                *self = Mark {
                    state: MarkState::Lines,
                    ring: Some(ring_id),
                    first: Some(line),
                    touch_line: None,
                    left: column,
                    right: column,
                    touch_col: column,
                };
            }
            MarkState::Lines | MarkState::Block => {
                if self.ring != Some(ring_id) {
                    return Err(MarkError::Offscreen);
                }
                if ring.is_marked(line) {
                    self.contract(ring, line)?;
                } else {
                    self.extend(ring, line)?;
                }
            }
        }
        self.touch_line = Some(line);
        match column {
            None => self.state = MarkState::Lines,
            Some(column) => {
                self.touch_column(column);
                self.state = MarkState::Block;
            }
        }
        debug!(
            target: "mark",
            state = ?self.state,
            left = self.left,
            right = self.right,
            "mark"
        );
        Ok(())
    }

    fn touch_column(&mut self, column: usize) {
        if column < self.left {
            self.left = column;
        } else if column > self.right {
            self.right = column;
        } else if self.left == self.touch_col {
            self.right = column;
        } else {
            self.left = column;
        }
        self.touch_col = column;
    }

    /// Shrink the run so it ends (or starts) at `line`.
    fn contract(&mut self, ring: &mut Ring, line: LineId) -> Result<(), MarkError> {
        let touch = self
            .touch_line
            .or(self.first)
            .ok_or(MarkError::Invariant("mark without touch line"))?;
        let first = self.first.ok_or(MarkError::Invariant("mark without first line"))?;
        let touched_at_top = ring.next(touch).is_some_and(|id| ring.is_marked(id));
        if touched_at_top {
            let mut cursor = ring.next(line);
            while let Some(id) = cursor.filter(|id| ring.is_marked(*id)) {
                ring.set_marked(id, false)?;
                cursor = ring.next(id);
            }
        } else {
            let mut cursor = Some(first);
            while let Some(id) = cursor.filter(|id| *id != line) {
                ring.set_marked(id, false)?;
                cursor = ring.next(id);
            }
            self.first = Some(line);
        }
        Ok(())
    }

    /// Grow the run to reach `line`, from above or below.
    fn extend(&mut self, ring: &mut Ring, line: LineId) -> Result<(), MarkError> {
        let mut below = ring.next(line);
        while let Some(id) = below.filter(|id| !ring.is_marked(*id)) {
            below = ring.next(id);
        }
        let mut cursor = line;
        if below.is_some() {
            while !ring.is_marked(cursor) {
                ring.set_marked(cursor, true)?;
                cursor = ring.next(cursor).ok_or(MarkError::Invariant("No mark found"))?;
            }
            self.first = Some(line);
        } else {
            while !ring.is_marked(cursor) {
                ring.set_marked(cursor, true)?;
                cursor = ring.prev(cursor).ok_or(MarkError::Invariant("No mark found"))?;
            }
        }
        Ok(())
    }

    /// Unmark every selected line and forget the selection.
    pub fn reset(&mut self, rings: &mut Rings) -> Result<(), MarkError> {
        if self.state == MarkState::Reset {
            return Ok(());
        }
        let lines = self.marked_lines(rings)?;
        if let Some(ring) = self.ring.and_then(|id| rings.get_mut(id)) {
            set_marked(ring, &lines, false)?;
        }
        self.clear();
        Ok(())
    }

    /// Lines `head..=tail` of `ring` are about to go away.
    pub fn remove_line(&mut self, ring: &Ring, head: LineId, tail: LineId) {
        if self.state == MarkState::Reset || self.ring != Some(ring.id()) {
            return;
        }
        let after = ring.next(tail);
        let after_marked = after.is_some_and(|id| ring.is_marked(id));
        if let Some(first) = self.first
            && ring.between(first, head, tail)
        {
            if !after_marked {
                debug!(target: "mark", "mark_removed_with_lines");
                self.clear();
                return;
            }
            self.first = after;
        }
        if let Some(touch) = self.touch_line
            && ring.between(touch, head, tail)
        {
            self.touch_line = if after_marked { after } else { ring.prev(head) };
        }
    }

    /// `ring` is about to be destroyed.
    pub fn remove_ring(&mut self, ring: RingId) {
        if self.ring == Some(ring) {
            self.clear();
        }
    }
}

impl LineObserver for Mark {
    fn lines_removing(&mut self, ring: &Ring, head: LineId, tail: LineId) {
        self.remove_line(ring, head, tail);
    }

    fn ring_removing(&mut self, ring: &Ring) {
        self.remove_ring(ring.id());
    }
}

/// Collect `first..=last`.
pub(crate) fn run(ring: &Ring, first: LineId, last: LineId) -> Result<Vec<LineId>, MarkError> {
    let mut lines = Vec::new();
    let mut cursor = Some(first);
    while let Some(id) = cursor {
        lines.push(id);
        if id == last {
            return Ok(lines);
        }
        cursor = ring.next(id);
    }
    Err(RingError::InvalidRange.into())
}

pub(crate) fn set_marked(ring: &mut Ring, lines: &[LineId], marked: bool) -> Result<(), MarkError> {
    for id in lines {
        ring.set_marked(*id, marked)?;
    }
    Ok(())
}

/// Byte length of `text` without trailing blanks.
pub(crate) fn trimmed_len(text: &[u8]) -> usize {
    text.len() - text.iter().rev().take_while(|b| **b == b' ').count()
}
