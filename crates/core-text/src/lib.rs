//! Document storage: line records, the ring that links them, and the file
//! codec that loads and saves them byte for byte.

mod error;
pub mod file;
pub mod line;
mod observer;
pub mod ring;
mod rings;

pub use error::{IoOp, RingError};
pub use file::{FileMeta, FileSystem, ReadReport, StdFileSystem};
pub use line::{Delimiter, Line, LineFlags, LineId};
pub use observer::LineObserver;
pub use ring::{FileMode, MAX_UNDO, Ring, RingId, RingKind};
pub use rings::Rings;
