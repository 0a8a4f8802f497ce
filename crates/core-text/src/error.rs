use crate::{LineId, RingId};
use core_pool::PoolError;
use std::path::PathBuf;
use thiserror::Error;

/// Which file operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Open,
    Read,
    Write,
    Close,
    Remove,
}

impl IoOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            IoOp::Open => "Open",
            IoOp::Read => "Read",
            IoOp::Write => "Write",
            IoOp::Close => "Close",
            IoOp::Remove => "Remove",
        }
    }
}

#[derive(Debug, Error)]
pub enum RingError {
    #[error("Protected")]
    Protected,
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("Cannot undo")]
    CannotUndo,
    #[error("Cannot undo: anchor line removed")]
    UndoAnchorLost,
    #[error("Ring {0:?} not found")]
    UnknownRing(RingId),
    #[error("Line {0:?} not in ring")]
    StaleLine(LineId),
    #[error("Invalid line range")]
    InvalidRange,
    #[error("Folder: {}", .0.display())]
    Folder(PathBuf),
    #[error("File too large: {} ({size} bytes)", .path.display())]
    FileTooLarge { path: PathBuf, size: u64 },
    #[error("{} failure: {}", .op.as_str(), .path.display())]
    Io {
        op: IoOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No file name")]
    NoPath,
    #[error("Internal logic error: {0}")]
    Invariant(&'static str),
}

impl RingError {
    pub(crate) fn io(op: IoOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RingError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// True for allocation failures coming out of the text pool.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RingError::Pool(PoolError::Exhausted { .. }))
    }
}
