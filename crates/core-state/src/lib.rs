//! Editor state: the ring collection, the three active lines, the mark and
//! the format margins.
//!
//! Everything that changes text goes through here so the notifications stay
//! consistent: before lines disappear the data line and the mark hear about
//! it, and any pending edit on the data line is committed before an operation
//! that could invalidate it.
//!
//! Protected rings:
//! - the history ring collects previously entered command lines through the
//!   history active line;
//! - the utility ring is scratch space for callers (help text, listings) and
//!   can never be saved or removed.

mod edit;
mod mark;

use core_active::{Active, ActiveError, Role};
use core_mark::{Mark, MarkError, Margins};
use core_pool::PoolConfig;
use core_text::{
    FileSystem, LineId, ReadReport, Ring, RingError, RingId, RingKind, Rings, StdFileSystem,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Protected")]
    Protected,
    #[error("No current document")]
    NoDocument,
    #[error("Document damaged; confirm to save anyway")]
    NeedsConfirmation,
    #[error("Unsaved changes; confirm to discard")]
    ChangesPending,
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error(transparent)]
    Active(#[from] ActiveError),
    #[error(transparent)]
    Mark(#[from] MarkError),
}

#[derive(Debug, Clone, Default)]
pub struct EditorOptions {
    pub pool: PoolConfig,
    pub margins: Margins,
    pub autosave_dir: Option<PathBuf>,
}

/// Result of [`EditorState::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opened {
    pub ring: RingId,
    /// `None` when the path was already loaded and the ring was reused.
    pub report: Option<ReadReport>,
}

impl Opened {
    /// One-line status text for the load, if there is anything to say.
    pub fn status(&self) -> Option<&'static str> {
        let report = self.report?;
        if !report.existed {
            Some("New file")
        } else if report.incomplete_last_line {
            Some("Last line incomplete")
        } else {
            None
        }
    }
}

/// What [`EditorState::undo`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Undone {
    /// A pending edit on the data line was dropped.
    PendingEdit,
    /// The latest removed run was put back; the data line sits on its head.
    Lines(LineId, LineId),
}

pub struct EditorState {
    rings: Rings,
    history: RingId,
    utility: RingId,
    data: Active,
    hist: Active,
    work: Active,
    mark: Mark,
    margins: Margins,
    fs: Box<dyn FileSystem>,
    autosave_dir: Option<PathBuf>,
    pool: PoolConfig,
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new(EditorOptions::default(), Box::new(StdFileSystem))
    }
}

impl EditorState {
    pub fn new(options: EditorOptions, fs: Box<dyn FileSystem>) -> Self {
        let mut rings = Rings::new();
        let history = rings.push(Ring::with_kind(options.pool, RingKind::Protected));
        let utility = rings.push(Ring::with_kind(options.pool, RingKind::Protected));
        Self {
            rings,
            history,
            utility,
            data: Active::new(Role::Data),
            hist: Active::new(Role::History),
            work: Active::new(Role::Work),
            mark: Mark::new(),
            margins: options.margins,
            fs,
            autosave_dir: options.autosave_dir,
            pool: options.pool,
        }
    }

    pub fn rings(&self) -> &Rings {
        &self.rings
    }

    pub fn ring(&self, id: RingId) -> Result<&Ring, EditorError> {
        Ok(self.rings.ring(id)?)
    }

    pub fn history_ring(&self) -> RingId {
        self.history
    }

    pub fn utility_ring(&self) -> RingId {
        self.utility
    }

    /// Ring the data line is bound to.
    pub fn current(&self) -> Option<RingId> {
        self.data.ring()
    }

    pub fn data(&self) -> &Active {
        &self.data
    }

    /// The data line, for text edits. Commit with [`EditorState::commit`].
    pub fn data_mut(&mut self) -> &mut Active {
        &mut self.data
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    pub fn set_margins(&mut self, margins: Margins) -> Result<(), EditorError> {
        margins.validate()?;
        self.margins = margins;
        Ok(())
    }

    /// Ring and line the data line is bound to.
    fn position(&self) -> Result<(RingId, LineId), EditorError> {
        let binding = self.data.binding().ok_or(EditorError::NoDocument)?;
        Ok((binding.ring, binding.line))
    }

    /// Load `path`, or switch to the ring that already holds it.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<Opened, EditorError> {
        let path = path.as_ref();
        if let Some(ring) = self.rings.find_path(self.fs.as_ref(), path) {
            let line = self.start_line(ring)?;
            self.activate(ring, line)?;
            return Ok(Opened { ring, report: None });
        }
        let mut ring = Ring::new(self.pool);
        let report = ring.read(self.fs.as_ref(), path)?;
        let id = match self.current() {
            Some(current) => self.rings.insert_after(current, ring),
            None => self.rings.push(ring),
        };
        let line = self.start_line(id)?;
        self.activate(id, line)?;
        info!(
            target: "state",
            path = %path.display(),
            existed = report.existed,
            lines = report.lines,
            "ring_opened"
        );
        Ok(Opened {
            ring: id,
            report: Some(report),
        })
    }

    fn start_line(&self, ring: RingId) -> Result<LineId, EditorError> {
        let ring = self.rings.ring(ring)?;
        Ok(ring.first().unwrap_or_else(|| ring.top()))
    }

    /// Commit the data line, then bind it to `line`.
    pub fn activate(&mut self, ring: RingId, line: LineId) -> Result<(), EditorError> {
        self.commit()?;
        self.data.fetch(self.rings.ring(ring)?, line)?;
        Ok(())
    }

    /// Store a pending edit on the data line.
    pub fn commit(&mut self) -> Result<(), EditorError> {
        let Some(ring) = self.data.ring() else {
            return Ok(());
        };
        self.data.store(self.rings.ring_mut(ring)?)?;
        Ok(())
    }

    /// Drop a pending edit, or else put back the latest removed lines of the
    /// current ring.
    pub fn undo(&mut self) -> Result<Undone, EditorError> {
        let (ring_id, _) = self.position()?;
        let ring = self.rings.ring_mut(ring_id)?;
        if self.data.is_changed() {
            self.data.undo(ring)?;
            return Ok(Undone::PendingEdit);
        }
        let (head, tail) = ring.undo()?;
        self.data.fetch(ring, head)?;
        Ok(Undone::Lines(head, tail))
    }

    /// Drop a document ring. Protected rings stay.
    pub fn remove_ring(&mut self, id: RingId) -> Result<(), EditorError> {
        if self.rings.ring(id)?.kind() == RingKind::Protected {
            return Err(EditorError::Protected);
        }
        let follow = self.rings.next_after(id);
        let mut observers = (&mut (&mut self.data, &mut self.hist), &mut self.mark);
        self.rings.remove(id, &mut observers);
        if self.data.binding().is_none() {
            let usable = |ring: &Ring| ring.kind() != RingKind::Protected;
            let next = follow
                .filter(|next| self.rings.get(*next).is_some_and(usable))
                .or_else(|| self.rings.iter().find(|ring| usable(ring)).map(Ring::id));
            if let Some(next) = next {
                let line = self.start_line(next)?;
                self.data.fetch(self.rings.ring(next)?, line)?;
            }
        }
        debug!(target: "state", rings = self.rings.len(), "document_closed");
        Ok(())
    }

    /// Write a Data ring to its file. A damaged ring needs `confirmed`.
    pub fn save(&mut self, id: RingId, confirmed: bool) -> Result<(), EditorError> {
        self.commit()?;
        let ring = self.rings.ring_mut(id)?;
        if ring.is_damaged() && !confirmed {
            return Err(EditorError::NeedsConfirmation);
        }
        ring.save(self.fs.as_ref(), self.autosave_dir.as_deref())?;
        Ok(())
    }

    /// Write a ring to some other file. The ring keeps its own path and
    /// changed flag.
    pub fn write_ring(&mut self, id: RingId, path: &Path) -> Result<u64, EditorError> {
        self.commit()?;
        let ring = self.rings.ring_mut(id)?;
        Ok(ring.write_to(self.fs.as_ref(), path)?)
    }

    /// May the ring be dropped? Unsaved, undamaged changes need `confirmed`.
    pub fn exit_check(&mut self, id: RingId, confirmed: bool) -> Result<(), EditorError> {
        self.commit()?;
        let ring = self.rings.ring(id)?;
        if ring.is_changed() && !ring.is_damaged() && !confirmed {
            return Err(EditorError::ChangesPending);
        }
        Ok(())
    }

    /// Append `text` to the history ring.
    pub fn push_history(&mut self, text: &[u8]) -> Result<LineId, EditorError> {
        let ring = self.rings.ring_mut(self.history)?;
        let last = ring.last().unwrap_or_else(|| ring.top());
        let line = ring.insert_line(last)?;
        self.hist.fetch(ring, line)?;
        self.hist.replace_line(text)?;
        self.hist.store(ring)?;
        Ok(line)
    }

    /// Validate every ring.
    pub fn check(&self) -> Result<(), EditorError> {
        for ring in self.rings.iter() {
            ring.check()?;
        }
        Ok(())
    }
}
