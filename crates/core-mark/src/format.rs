use crate::{Mark, MarkError, MarkState, run, set_marked};
use core_active::Active;
use core_text::{LineId, LineObserver, Ring};
use tracing::debug;

/// Margins at or beyond this column are refused.
pub const MAX_FORMAT_MARGIN: usize = 256;

/// Columns a reflowed paragraph occupies. Text starts at `left` and no
/// line grows past `right` once it holds a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub left: usize,
    pub right: usize,
}

impl Default for Margins {
    fn default() -> Self {
        Self { left: 0, right: 72 }
    }
}

impl Margins {
    pub fn new(left: usize, right: usize) -> Result<Self, MarkError> {
        let margins = Self { left, right };
        margins.validate()?;
        Ok(margins)
    }

    pub fn validate(&self) -> Result<(), MarkError> {
        if self.right >= MAX_FORMAT_MARGIN || self.left >= self.right {
            return Err(MarkError::InvalidMargins);
        }
        Ok(())
    }
}

impl Mark {
    /// Reflow the selected lines between `margins`, replacing them.
    ///
    /// `work` is the scratch active line used to build each output line; it is
    /// left unbound afterwards. The reflowed lines become the selection and
    /// the originals go to the undo log.
    pub fn format(
        &mut self,
        rings: &mut core_text::Rings,
        work: &mut Active,
        margins: Margins,
        observer: &mut dyn LineObserver,
    ) -> Result<(), MarkError> {
        match self.state {
            MarkState::Reset => return Err(MarkError::NoMark),
            MarkState::Block => return Err(MarkError::ImproperMark),
            MarkState::Lines => {}
        }
        margins.validate()?;
        let (ring_id, first, last) = self.marked_range(rings)?;
        let ring = rings.ring_mut(ring_id)?;
        let source_rows = run(ring, first, last)?;
        let mut words = Vec::new();
        for id in &source_rows {
            words.extend(
                ring.text(*id)?
                    .split(|b| *b == b' ')
                    .filter(|word| !word.is_empty())
                    .map(<[u8]>::to_vec),
            );
        }
        let saved = self.clone();
        set_marked(ring, &source_rows, false)?;

        let mut output = Vec::new();
        let result = reflow(ring, work, last, &words, margins, &mut output);
        work.reset();
        if let Err(err) = result {
            if let (Some(&head), Some(&tail)) = (output.first(), output.last()) {
                ring.remove_lines(head, tail, &mut ())?;
            }
            set_marked(ring, &source_rows, true)?;
            *self = saved;
            return Err(err);
        }
        let (Some(&head), Some(&tail)) = (output.first(), output.last()) else {
            return Err(MarkError::Invariant("format produced no lines"));
        };
        *self = Mark {
            state: MarkState::Lines,
            ring: Some(ring_id),
            first: Some(head),
            touch_line: Some(tail),
            ..saved
        };
        ring.remove_lines_with_undo(first, last, observer)?;
        observer.lines_changed(ring, head, tail);
        debug!(
            target: "mark",
            words = words.len(),
            from = source_rows.len(),
            to = output.len(),
            "mark_format"
        );
        Ok(())
    }
}

fn reflow(
    ring: &mut Ring,
    work: &mut Active,
    after: LineId,
    words: &[Vec<u8>],
    margins: Margins,
    output: &mut Vec<LineId>,
) -> Result<(), MarkError> {
    let mut words = words.iter().peekable();
    let mut after = after;
    loop {
        let line = ring.insert_line(after)?;
        output.push(line);
        ring.set_marked(line, true)?;
        work.fetch(ring, line)?;
        if margins.left > 0 {
            work.expand(margins.left - 1)?;
        }
        while let Some(word) = words.peek() {
            let used = work.len();
            if used > margins.left && used + word.len() >= margins.right {
                break;
            }
            if used > margins.left {
                work.append_string(b" ")?;
            }
            work.append_string(word)?;
            words.next();
        }
        work.store(ring)?;
        after = line;
        if words.peek().is_none() {
            return Ok(());
        }
    }
}
