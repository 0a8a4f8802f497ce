//! Mark operations aimed at the data line.

use crate::{EditorError, EditorState};

impl EditorState {
    /// Extend or contract the selection to the data line. With a column the
    /// selection is a block.
    pub fn mark_line(&mut self, column: Option<usize>) -> Result<(), EditorError> {
        self.commit()?;
        let (ring, line) = self.position()?;
        self.mark.mark(&mut self.rings, ring, line, column)?;
        Ok(())
    }

    pub fn mark_copy(&mut self, column: usize) -> Result<(), EditorError> {
        self.commit()?;
        let (ring, line) = self.position()?;
        self.mark
            .copy(&mut self.rings, ring, line, column, &mut self.data)?;
        Ok(())
    }

    pub fn mark_move(&mut self, column: usize) -> Result<(), EditorError> {
        self.commit()?;
        let (ring, line) = self.position()?;
        self.mark
            .move_to(&mut self.rings, ring, line, column, &mut self.data)?;
        Ok(())
    }

    /// Reflow the selected lines between the current margins.
    pub fn mark_format(&mut self) -> Result<(), EditorError> {
        self.commit()?;
        self.mark
            .format(&mut self.rings, &mut self.work, self.margins, &mut self.data)?;
        Ok(())
    }

    pub fn mark_remove(&mut self) -> Result<(), EditorError> {
        self.commit()?;
        self.mark.remove(&mut self.rings, &mut self.data)?;
        Ok(())
    }

    pub fn mark_reset(&mut self) -> Result<(), EditorError> {
        self.mark.reset(&mut self.rings)?;
        Ok(())
    }
}
