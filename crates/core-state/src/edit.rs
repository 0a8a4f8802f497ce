use crate::{EditorError, EditorState};
use core_text::{LineId, RingId};
use tracing::debug;

impl EditorState {
    /// Open a new empty line after the data line and move onto it.
    pub fn insert_line(&mut self) -> Result<LineId, EditorError> {
        self.commit()?;
        let (ring_id, line) = self.position()?;
        let ring = self.rings.ring_mut(ring_id)?;
        let fresh = ring.insert_line(line)?;
        self.data.fetch(ring, fresh)?;
        Ok(fresh)
    }

    /// Remove `head..=tail` into the ring's undo log.
    ///
    /// The data line moves to the line after the gap and the mark adjusts.
    pub fn remove_lines(
        &mut self,
        ring_id: RingId,
        head: LineId,
        tail: LineId,
    ) -> Result<usize, EditorError> {
        self.commit()?;
        let ring = self.rings.ring_mut(ring_id)?;
        if ring.is_readonly(head) || ring.is_readonly(tail) {
            return Err(EditorError::Protected);
        }
        let mut observers = (&mut self.data, &mut self.mark);
        let count = ring.remove_lines_with_undo(head, tail, &mut observers)?;
        Ok(count)
    }

    /// Break the data line at `column`; the rest moves to a new line below,
    /// which becomes the data line.
    pub fn line_split(&mut self, column: usize) -> Result<LineId, EditorError> {
        let (ring_id, line) = self.position()?;
        let rest = self
            .data
            .text()
            .get(column..)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        self.data.clear(column)?;
        self.commit()?;
        let ring = self.rings.ring_mut(ring_id)?;
        let fresh = ring.insert_line(line)?;
        ring.set_text(fresh, &rest)?;
        self.data.fetch(ring, fresh)?;
        debug!(target: "state", column, moved = rest.len(), "line_split");
        Ok(fresh)
    }

    /// Append the next line to the data line and remove it.
    pub fn line_join(&mut self) -> Result<(), EditorError> {
        let (ring_id, line) = self.position()?;
        let ring = self.rings.ring(ring_id)?;
        let next = ring
            .next(line)
            .filter(|next| !ring.is_readonly(*next))
            .ok_or(EditorError::Protected)?;
        let tail = ring.text(next)?.to_vec();
        self.data.append_string(&tail)?;
        self.commit()?;
        self.remove_lines(ring_id, next, next)?;
        debug!(target: "state", joined = tail.len(), "line_join");
        Ok(())
    }
}
