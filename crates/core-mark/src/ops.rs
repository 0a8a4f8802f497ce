use crate::{Mark, MarkError, MarkState, run, set_marked, trimmed_len};
use core_text::{Delimiter, FileMode, LineId, LineObserver, Ring, RingId, RingKind, Rings};
use tracing::{debug, warn};

/// What a Lines copy carries over: text and, for binary targets, terminator.
type LinePayload = Vec<(Vec<u8>, Delimiter)>;

impl Mark {
    /// Check that the selection can be copied to `target_line` (and `column`
    /// for blocks) without touching anything.
    pub fn verify_copy(
        &self,
        rings: &Rings,
        target_ring: RingId,
        target_line: LineId,
        column: usize,
    ) -> Result<(), MarkError> {
        let (source_ring, first, last) = self.marked_range(rings)?;
        let target = rings.ring(target_ring)?;
        if target.kind() == RingKind::Protected {
            return Err(MarkError::Protected);
        }
        if !target.contains_line(target_line) {
            return Err(core_text::RingError::StaleLine(target_line).into());
        }
        match self.state {
            MarkState::Reset => Err(MarkError::NoMark),
            MarkState::Lines => {
                let next = target.next(target_line).ok_or(MarkError::Protected)?;
                if target.is_marked(target_line) && target.is_marked(next) {
                    return Err(MarkError::Conflict);
                }
                Ok(())
            }
            MarkState::Block => {
                if target.is_readonly(target_line) {
                    return Err(MarkError::Protected);
                }
                if source_ring == target_ring && first == target_line {
                    if column <= self.right && column.saturating_add(self.width()) > self.left {
                        return Err(MarkError::Conflict);
                    }
                    return Ok(());
                }
                let source = rings.ring(source_ring)?;
                let mut into = Some(target_line);
                for _ in run(source, first, last)? {
                    let Some(row) = into else { break };
                    if target.is_marked(row) {
                        return Err(MarkError::Conflict);
                    }
                    into = target.next(row);
                }
                Ok(())
            }
        }
    }

    /// Like [`Mark::verify_copy`], and a Lines target may not be selected.
    pub fn verify_move(
        &self,
        rings: &Rings,
        target_ring: RingId,
        target_line: LineId,
        column: usize,
    ) -> Result<(), MarkError> {
        if self.state == MarkState::Lines && rings.ring(target_ring)?.is_marked(target_line) {
            return Err(MarkError::Conflict);
        }
        self.verify_copy(rings, target_ring, target_line, column)
    }

    /// Duplicate the selection after `target_line` (Lines) or into the band
    /// starting at `column` from `target_line` down (Block). The copy becomes
    /// the selection.
    pub fn copy(
        &mut self,
        rings: &mut Rings,
        target_ring: RingId,
        target_line: LineId,
        column: usize,
        observer: &mut dyn LineObserver,
    ) -> Result<(), MarkError> {
        self.verify_copy(rings, target_ring, target_line, column)?;
        match self.state {
            MarkState::Reset => Err(MarkError::NoMark),
            MarkState::Lines => self.copy_lines(rings, target_ring, target_line, observer),
            MarkState::Block => self.copy_block(rings, target_ring, target_line, column, observer),
        }
    }

    fn copy_lines(
        &mut self,
        rings: &mut Rings,
        target_ring: RingId,
        target_line: LineId,
        observer: &mut dyn LineObserver,
    ) -> Result<(), MarkError> {
        let (source_ring, first, last) = self.marked_range(rings)?;
        let source_rows = {
            let source = rings.ring(source_ring)?;
            run(source, first, last)?
        };
        let payload: LinePayload = {
            let source = rings.ring(source_ring)?;
            source_rows
                .iter()
                .map(|id| {
                    let line = source.line(*id)?;
                    Ok((source.text_of(line).to_vec(), line.delimiter()))
                })
                .collect::<Result<_, MarkError>>()?
        };
        let saved = self.clone();
        set_marked(rings.ring_mut(source_ring)?, &source_rows, false)?;

        let target = rings.ring_mut(target_ring)?;
        let keep_delimiters = target.mode() == FileMode::Binary;
        let mut inserted = Vec::with_capacity(payload.len());
        if let Err(err) = insert_copies(target, target_line, &payload, keep_delimiters, &mut inserted) {
            self.roll_back(rings, saved, &source_rows, target_ring, &inserted);
            return Err(err);
        }
        let (Some(&head), Some(&tail)) = (inserted.first(), inserted.last()) else {
            return Err(MarkError::Invariant("empty line selection"));
        };
        *self = Mark {
            state: MarkState::Lines,
            ring: Some(target_ring),
            first: Some(head),
            touch_line: Some(tail),
            ..saved
        };
        observer.lines_changed(target, head, tail);
        debug!(target: "mark", lines = inserted.len(), "mark_copy_lines");
        Ok(())
    }

    fn copy_block(
        &mut self,
        rings: &mut Rings,
        target_ring: RingId,
        target_line: LineId,
        column: usize,
        observer: &mut dyn LineObserver,
    ) -> Result<(), MarkError> {
        let (source_ring, first, last) = self.marked_range(rings)?;
        let (left, right, width) = (self.left, self.right, self.width());
        let source_rows = run(rings.ring(source_ring)?, first, last)?;
        let bands: Vec<Option<Vec<u8>>> = {
            let source = rings.ring(source_ring)?;
            source_rows
                .iter()
                .map(|id| {
                    let text = source.text(*id)?;
                    Ok((text.len() > left).then(|| text[left..text.len().min(right + 1)].to_vec()))
                })
                .collect::<Result<_, MarkError>>()?
        };
        let saved = self.clone();
        set_marked(rings.ring_mut(source_ring)?, &source_rows, false)?;

        let target = rings.ring_mut(target_ring)?;
        let mut rows = Vec::with_capacity(bands.len());
        let mut extended = Vec::new();
        let mut restore: Vec<(LineId, Vec<u8>)> = Vec::new();
        let result = (|| -> Result<(), MarkError> {
            let mut into = target_line;
            for index in 0..bands.len() {
                if index > 0 {
                    into = match target.next(into) {
                        Some(next) if !target.is_readonly(next) => next,
                        _ => {
                            let fresh = target.insert_line(into)?;
                            extended.push(fresh);
                            fresh
                        }
                    };
                }
                rows.push(into);
            }
            for (row, band) in rows.iter().zip(&bands) {
                let old = target.text(*row)?;
                if old.len() <= column && band.is_none() {
                    continue;
                }
                let spliced = splice_band(old, column, width, band.as_deref());
                let old = old.to_vec();
                target.set_text(*row, &spliced)?;
                restore.push((*row, old));
            }
            Ok(())
        })();
        if let Err(err) = result {
            for (row, old) in restore.iter().rev() {
                if let Err(err) = target.set_text(*row, old) {
                    warn!(target: "mark", error = %err, "block_restore_failed");
                }
            }
            self.roll_back(rings, saved, &source_rows, target_ring, &extended);
            return Err(err);
        }
        set_marked(target, &rows, true)?;
        let (Some(&head), Some(&tail)) = (rows.first(), rows.last()) else {
            return Err(MarkError::Invariant("empty block selection"));
        };
        *self = Mark {
            state: MarkState::Block,
            ring: Some(target_ring),
            first: Some(head),
            touch_line: Some(tail),
            left: column,
            right: column + (right - left),
            touch_col: column,
        };
        observer.lines_changed(target, head, tail);
        debug!(target: "mark", rows = rows.len(), column, width, "mark_copy_block");
        Ok(())
    }

    /// Undo a failed copy: drop lines it inserted, re-mark the source.
    fn roll_back(
        &mut self,
        rings: &mut Rings,
        saved: Mark,
        source_rows: &[LineId],
        target_ring: RingId,
        inserted: &[LineId],
    ) {
        if let (Some(&head), Some(&tail)) = (inserted.first(), inserted.last())
            && let Some(target) = rings.get_mut(target_ring)
            && let Err(err) = target.remove_lines(head, tail, &mut ())
        {
            warn!(target: "mark", error = %err, "rollback_remove_failed");
        }
        if let Some(source) = saved.ring.and_then(|id| rings.get_mut(id))
            && let Err(err) = set_marked(source, source_rows, true)
        {
            warn!(target: "mark", error = %err, "rollback_mark_failed");
        }
        *self = saved;
    }

    /// Copy, then take the original away. Lines within one ring are relinked
    /// in place.
    pub fn move_to(
        &mut self,
        rings: &mut Rings,
        target_ring: RingId,
        target_line: LineId,
        column: usize,
        observer: &mut dyn LineObserver,
    ) -> Result<(), MarkError> {
        self.verify_move(rings, target_ring, target_line, column)?;
        let (source_ring, first, last) = self.marked_range(rings)?;
        match self.state {
            MarkState::Reset => Err(MarkError::NoMark),
            MarkState::Lines if source_ring == target_ring => {
                let ring = rings.ring_mut(target_ring)?;
                ring.move_lines(first, last, target_line)?;
                observer.lines_changed(ring, first, last);
                debug!(target: "mark", "mark_move_lines");
                Ok(())
            }
            MarkState::Lines => {
                self.copy(rings, target_ring, target_line, column, observer)?;
                let source = rings.ring_mut(source_ring)?;
                self.remove_line(source, first, last);
                source.remove_lines_with_undo(first, last, observer)?;
                debug!(target: "mark", "mark_move_lines");
                Ok(())
            }
            MarkState::Block => {
                let source_rows = run(rings.ring(source_ring)?, first, last)?;
                let width = self.width();
                let same_row = source_ring == target_ring && first == target_line;
                let mut cut = self.left;
                if same_row && column < self.left {
                    cut += width;
                }
                let shifted = same_row && column > self.right;
                self.copy(rings, target_ring, target_line, column, observer)?;
                let source = rings.ring_mut(source_ring)?;
                cut_band(source, &source_rows, cut, width)?;
                if shifted {
                    self.left -= width;
                    self.right -= width;
                    self.touch_col = self.left;
                }
                if let (Some(&head), Some(&tail)) = (source_rows.first(), source_rows.last()) {
                    observer.lines_changed(source, head, tail);
                }
                debug!(target: "mark", width, "mark_move_block");
                Ok(())
            }
        }
    }

    /// Delete the selection: whole lines for good, or the band out of each
    /// line. The selection is reset.
    pub fn remove(
        &mut self,
        rings: &mut Rings,
        observer: &mut dyn LineObserver,
    ) -> Result<(), MarkError> {
        let (ring_id, first, last) = self.marked_range(rings)?;
        let ring = rings.ring_mut(ring_id)?;
        let rows = run(ring, first, last)?;
        match self.state {
            MarkState::Reset => return Err(MarkError::NoMark),
            MarkState::Lines => {
                set_marked(ring, &rows, false)?;
                ring.remove_lines(first, last, observer)?;
            }
            MarkState::Block => {
                cut_band(ring, &rows, self.left, self.width())?;
                set_marked(ring, &rows, false)?;
                observer.lines_changed(ring, first, last);
            }
        }
        debug!(target: "mark", state = ?self.state, rows = rows.len(), "mark_remove");
        self.clear();
        Ok(())
    }
}

fn insert_copies(
    target: &mut Ring,
    after: LineId,
    payload: &[(Vec<u8>, Delimiter)],
    keep_delimiters: bool,
    inserted: &mut Vec<LineId>,
) -> Result<(), MarkError> {
    let mut after = after;
    for (text, delimiter) in payload {
        let id = target.insert_line(after)?;
        inserted.push(id);
        target.set_marked(id, true)?;
        target.set_text(id, text)?;
        if keep_delimiters {
            target.set_delimiter(id, *delimiter)?;
        }
        after = id;
    }
    Ok(())
}

/// `old` with `width` columns opened at `column` and `band` written there.
fn splice_band(old: &[u8], column: usize, width: usize, band: Option<&[u8]>) -> Vec<u8> {
    let mut fresh = vec![b' '; old.len().max(column).saturating_add(width)];
    let keep = old.len().min(column);
    fresh[..keep].copy_from_slice(&old[..keep]);
    if let Some(band) = band {
        fresh[column..column + band.len()].copy_from_slice(band);
    }
    if old.len() > column {
        fresh[column + width..].copy_from_slice(&old[column..]);
    }
    fresh.truncate(trimmed_len(&fresh));
    fresh
}

/// Delete columns `left..left + width` from each row.
fn cut_band(ring: &mut Ring, rows: &[LineId], left: usize, width: usize) -> Result<(), MarkError> {
    for row in rows {
        let text = ring.text(*row)?;
        if text.len() <= left {
            continue;
        }
        let mut fresh = text[..left].to_vec();
        if text.len() > left + width {
            fresh.extend_from_slice(&text[left + width..]);
        }
        fresh.truncate(trimmed_len(&fresh));
        ring.set_text(*row, &fresh)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rings_with(lines: &[&str]) -> (Rings, RingId, Vec<LineId>) {
        let mut ring = Ring::default();
        let mut after = ring.top();
        let mut ids = Vec::new();
        for text in lines {
            let id = ring.insert_line(after).unwrap();
            ring.set_text(id, text.as_bytes()).unwrap();
            ids.push(id);
            after = id;
        }
        let mut rings = Rings::new();
        let ring_id = rings.push(ring);
        (rings, ring_id, ids)
    }

    fn texts(rings: &Rings, ring_id: RingId) -> Vec<String> {
        let ring = rings.ring(ring_id).unwrap();
        ring.data_lines()
            .map(|(_, line)| String::from_utf8_lossy(ring.text_of(line)).into_owned())
            .collect()
    }

    #[test]
    fn splice_pads_short_lines() {
        assert_eq!(splice_band(b"ab", 4, 2, Some(b"XY")), b"ab  XY".to_vec());
        assert_eq!(splice_band(b"abcdef", 2, 2, Some(b"XY")), b"abXYcdef".to_vec());
        assert_eq!(splice_band(b"abcdef", 2, 2, None), b"ab  cdef".to_vec());
        assert_eq!(splice_band(b"", 0, 3, Some(b"X")), b"X".to_vec());
    }

    #[test]
    fn cut_trims_and_skips_short_lines() {
        let (mut rings, r, ids) = rings_with(&["abcdef", "ab", "abc  f"]);
        let ring = rings.ring_mut(r).unwrap();
        cut_band(ring, &ids, 2, 3).unwrap();
        assert_eq!(texts(&rings, r), vec!["abf", "ab", "abf"]);
    }

    #[test]
    fn lines_copy_moves_selection_to_copy() {
        let (mut rings, r, ids) = rings_with(&["a", "b", "c"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], None).unwrap();
        mark.mark(&mut rings, r, ids[1], None).unwrap();
        mark.copy(&mut rings, r, ids[2], 0, &mut ()).unwrap();
        assert_eq!(texts(&rings, r), vec!["a", "b", "c", "a", "b"]);
        let ring = rings.ring(r).unwrap();
        assert!(!ring.is_marked(ids[0]));
        let lines = mark.marked_lines(&rings).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(ring.row_number(lines[0]), Some(4));
    }

    #[test]
    fn lines_copy_into_selection_conflicts() {
        let (mut rings, r, ids) = rings_with(&["a", "b", "c"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], None).unwrap();
        mark.mark(&mut rings, r, ids[1], None).unwrap();
        assert!(matches!(
            mark.copy(&mut rings, r, ids[0], 0, &mut ()),
            Err(MarkError::Conflict)
        ));
        // After the last selected line is fine.
        mark.verify_copy(&rings, r, ids[1], 0).unwrap();
        assert!(matches!(
            mark.verify_move(&rings, r, ids[1], 0),
            Err(MarkError::Conflict)
        ));
    }

    #[test]
    fn lines_move_within_ring_relinks() {
        let (mut rings, r, ids) = rings_with(&["a", "b", "c", "d"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], None).unwrap();
        mark.mark(&mut rings, r, ids[1], None).unwrap();
        mark.move_to(&mut rings, r, ids[3], 0, &mut ()).unwrap();
        assert_eq!(texts(&rings, r), vec!["c", "d", "a", "b"]);
        assert_eq!(mark.first(), Some(ids[0]));
        rings.ring(r).unwrap().check().unwrap();
    }

    #[test]
    fn lines_move_across_rings_is_undoable_at_source() {
        let (mut rings, r, ids) = rings_with(&["a", "b", "c"]);
        let mut other = Ring::default();
        let top = other.top();
        let o = rings.push(other);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[1], None).unwrap();
        mark.move_to(&mut rings, o, top, 0, &mut ()).unwrap();
        assert_eq!(texts(&rings, r), vec!["a", "c"]);
        assert_eq!(texts(&rings, o), vec!["b"]);
        assert_eq!(mark.ring(), Some(o));
        let source = rings.ring_mut(r).unwrap();
        source.undo().unwrap();
        assert_eq!(texts(&rings, r), vec!["a", "b", "c"]);
    }

    #[test]
    fn block_copy_extends_short_target() {
        let (mut rings, r, ids) = rings_with(&["abcdef", "ghijkl", "x"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], Some(1)).unwrap();
        mark.mark(&mut rings, r, ids[1], Some(2)).unwrap();
        mark.copy(&mut rings, r, ids[2], 3, &mut ()).unwrap();
        assert_eq!(
            texts(&rings, r),
            vec!["abcdef", "ghijkl", "x  bc", "   hi"]
        );
        assert_eq!(mark.columns(), (3, 3, 4));
        assert_eq!(mark.marked_lines(&rings).unwrap().len(), 2);
    }

    #[test]
    fn block_overlap_on_same_row_conflicts() {
        let (mut rings, r, ids) = rings_with(&["abcdefgh"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], Some(2)).unwrap();
        mark.mark(&mut rings, r, ids[0], Some(4)).unwrap();
        assert_eq!(mark.columns(), (2, 4, 4));
        assert!(matches!(
            mark.copy(&mut rings, r, ids[0], 1, &mut ()),
            Err(MarkError::Conflict)
        ));
        assert_eq!(texts(&rings, r), vec!["abcdefgh"]);
        // Entirely to the left or right is fine.
        mark.verify_copy(&rings, r, ids[0], 5).unwrap();
        assert!(matches!(
            mark.verify_copy(&rings, r, ids[0], 0),
            Err(MarkError::Conflict)
        ));
    }

    #[test]
    fn block_at_far_columns_does_not_overflow() {
        let (mut rings, r, ids) = rings_with(&["abc"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], Some(usize::MAX - 1)).unwrap();
        mark.mark(&mut rings, r, ids[0], Some(usize::MAX)).unwrap();
        assert_eq!(mark.width(), 2);
        assert!(matches!(
            mark.verify_copy(&rings, r, ids[0], usize::MAX - 1),
            Err(MarkError::Conflict)
        ));
        let mut wide = Mark::new();
        let (mut rings, r, ids) = rings_with(&["abc"]);
        wide.mark(&mut rings, r, ids[0], Some(0)).unwrap();
        wide.mark(&mut rings, r, ids[0], Some(usize::MAX)).unwrap();
        assert_eq!(wide.width(), usize::MAX);
        assert!(matches!(
            wide.verify_copy(&rings, r, ids[0], 1),
            Err(MarkError::Conflict)
        ));
    }

    #[test]
    fn block_move_right_on_same_row() {
        let (mut rings, r, ids) = rings_with(&["abcdefgh"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], Some(1)).unwrap();
        mark.mark(&mut rings, r, ids[0], Some(2)).unwrap();
        mark.move_to(&mut rings, r, ids[0], 6, &mut ()).unwrap();
        assert_eq!(texts(&rings, r), vec!["adefbcgh"]);
        let (left, _, right) = mark.columns();
        assert_eq!((left, right), (4, 5));
    }

    #[test]
    fn block_move_left_on_same_row() {
        let (mut rings, r, ids) = rings_with(&["abcdefgh"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], Some(4)).unwrap();
        mark.mark(&mut rings, r, ids[0], Some(5)).unwrap();
        mark.move_to(&mut rings, r, ids[0], 1, &mut ()).unwrap();
        assert_eq!(texts(&rings, r), vec!["aefbcdgh"]);
        let (left, _, right) = mark.columns();
        assert_eq!((left, right), (1, 2));
    }

    #[test]
    fn remove_lines_is_permanent() {
        let (mut rings, r, ids) = rings_with(&["a", "b", "c"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[1], None).unwrap();
        mark.remove(&mut rings, &mut ()).unwrap();
        assert_eq!(texts(&rings, r), vec!["a", "c"]);
        assert_eq!(mark.state(), MarkState::Reset);
        assert_eq!(rings.ring(r).unwrap().undo_depth(), 0);
    }

    #[test]
    fn remove_block_cuts_band() {
        let (mut rings, r, ids) = rings_with(&["abcdef", "gh", "ijklmn"]);
        let mut mark = Mark::new();
        mark.mark(&mut rings, r, ids[0], Some(2)).unwrap();
        mark.mark(&mut rings, r, ids[2], Some(3)).unwrap();
        mark.remove(&mut rings, &mut ()).unwrap();
        assert_eq!(texts(&rings, r), vec!["abef", "gh", "ijmn"]);
        let ring = rings.ring(r).unwrap();
        assert!(ids.iter().all(|id| !ring.is_marked(*id)));
    }

    #[test]
    fn operations_without_mark_fail() {
        let (mut rings, r, ids) = rings_with(&["a"]);
        let mut mark = Mark::new();
        assert!(matches!(
            mark.copy(&mut rings, r, ids[0], 0, &mut ()),
            Err(MarkError::NoMark)
        ));
        assert!(matches!(mark.remove(&mut rings, &mut ()), Err(MarkError::NoMark)));
    }
}
