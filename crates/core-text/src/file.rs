//! Byte-exact file load and save.
//!
//! Every terminator is classified into a [`Delimiter`] and stored on its
//! line, so writing a ring back reproduces the bytes it was read from.

use crate::error::IoOp;
use crate::line::{Delimiter, LineId};
use crate::ring::{FileMode, Ring, RingKind, platform_delimiter};
use crate::RingError;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Largest file the ring will load.
pub const MAX_FILE_SIZE: u64 = u32::MAX as u64;

/// Autosave names are `AUTOSAVE.000` through `AUTOSAVE.999`.
const AUTOSAVE_SLOTS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub len: u64,
    pub is_dir: bool,
}

/// The file operations a ring needs.
pub trait FileSystem {
    fn metadata(&self, path: &Path) -> io::Result<FileMeta>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>>;
    fn remove(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    /// Absolute form of `path` used to tell whether two paths name the same
    /// file. The default is purely lexical.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::path::absolute(path)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        let meta = fs::metadata(path)?;
        Ok(FileMeta {
            len: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>> {
        Ok(Box::new(fs::File::create(path)?))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    /// Resolves symlinks when the file exists, else falls back to the
    /// lexical form.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path).or_else(|_| std::path::absolute(path))
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadReport {
    /// False when the path did not exist; the ring is then a new, empty file.
    pub existed: bool,
    pub lines: usize,
    pub bytes: u64,
    pub mode: FileMode,
    /// The final line had no terminator and was kept with [`Delimiter::None`].
    pub incomplete_last_line: bool,
}

/// Lines found in a byte buffer.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SplitLines<'a> {
    pub lines: Vec<(&'a [u8], Delimiter)>,
    pub incomplete: bool,
}

fn cr_run(rest: &[u8]) -> Delimiter {
    if rest.starts_with(b"\r\n") {
        Delimiter::Crlf
    } else if rest.starts_with(b"\r\r\n") {
        Delimiter::CrCrlf
    } else if rest.starts_with(b"\r\r\r\n") {
        Delimiter::CrCrCrlf
    } else {
        Delimiter::Cr
    }
}

fn nul_run(rest: &[u8]) -> Delimiter {
    match rest.iter().take(4).take_while(|b| **b == 0).count() {
        4 => Delimiter::Nul4,
        3 => Delimiter::Nul3,
        2 => Delimiter::Nul2,
        _ => Delimiter::Nul1,
    }
}

/// Split `bytes` at terminators. A trailing unterminated chunk becomes a
/// line with [`Delimiter::None`].
pub fn split_lines(bytes: &[u8]) -> SplitLines<'_> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut index = 0;
    while index < bytes.len() {
        let delimiter = match bytes[index] {
            b'\n' => Delimiter::Lf,
            b'\r' => cr_run(&bytes[index..]),
            0 => nul_run(&bytes[index..]),
            _ => {
                index += 1;
                continue;
            }
        };
        lines.push((&bytes[start..index], delimiter));
        index += delimiter.bytes().len();
        start = index;
    }
    let incomplete = start < bytes.len();
    if incomplete {
        lines.push((&bytes[start..], Delimiter::None));
    }
    SplitLines { lines, incomplete }
}

/// Infer a mode from a sequence of terminators.
///
/// Any binary terminator wins. Otherwise the first terminator picks DOS
/// (CRLF) or Unix, and any line that disagrees makes the result Mixed.
pub fn classify<I>(delimiters: I) -> FileMode
where
    I: IntoIterator<Item = Delimiter>,
{
    let mut expected = None;
    let mut mode = FileMode::Reset;
    for delimiter in delimiters {
        if delimiter.is_binary() {
            return FileMode::Binary;
        }
        match expected {
            None => {
                let (want, found) = if delimiter == Delimiter::Crlf {
                    (Delimiter::Crlf, FileMode::Dos)
                } else {
                    (Delimiter::Lf, FileMode::Unix)
                };
                expected = Some(want);
                mode = if delimiter == want { found } else { FileMode::Mixed };
            }
            Some(want) if delimiter != want => mode = FileMode::Mixed,
            Some(_) => {}
        }
    }
    mode
}

fn damages(err: &RingError) -> bool {
    matches!(
        err,
        RingError::Io { .. }
            | RingError::Folder(_)
            | RingError::FileTooLarge { .. }
            | RingError::Pool(_)
    )
}

impl Ring {
    /// Replace the ring's content with the file at `path`.
    pub fn read(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<ReadReport, RingError> {
        self.reset();
        self.path = Some(path.to_path_buf());
        self.kind = RingKind::Data;
        let top = self.top();
        let result = self.append(fs, path, top);
        self.changed = false;
        result
    }

    /// Insert the lines of `path` after `after`.
    ///
    /// A missing file is not an error: the report says it did not exist.
    /// I/O, size and allocation failures mark the ring damaged.
    pub fn append(
        &mut self,
        fs: &dyn FileSystem,
        path: &Path,
        after: LineId,
    ) -> Result<ReadReport, RingError> {
        let result = self.append_file(fs, path, after);
        match &result {
            Ok(report) => debug!(
                target: "ring.io",
                path = %path.display(),
                existed = report.existed,
                lines = report.lines,
                bytes = report.bytes,
                mode = report.mode.as_str(),
                incomplete = report.incomplete_last_line,
                "file_read"
            ),
            Err(err) => {
                if damages(err) {
                    self.damaged = true;
                }
                error!(target: "ring.io", path = %path.display(), %err, "file_read_error");
            }
        }
        result
    }

    fn append_file(
        &mut self,
        fs: &dyn FileSystem,
        path: &Path,
        after: LineId,
    ) -> Result<ReadReport, RingError> {
        let meta = match fs.metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(target: "ring.io", path = %path.display(), "file_missing");
                return Ok(ReadReport {
                    mode: self.mode,
                    ..ReadReport::default()
                });
            }
            Err(err) => return Err(RingError::io(IoOp::Open, path, err)),
        };
        if meta.is_dir {
            self.kind = RingKind::Unusable;
            return Err(RingError::Folder(path.to_path_buf()));
        }
        if meta.len > MAX_FILE_SIZE {
            return Err(RingError::FileTooLarge {
                path: path.to_path_buf(),
                size: meta.len,
            });
        }
        let bytes = fs
            .read(path)
            .map_err(|err| RingError::io(IoOp::Read, path, err))?;
        let split = split_lines(&bytes);

        let mut cursor = after;
        for (text, delimiter) in &split.lines {
            let id = self.insert_line(cursor)?;
            self.assign_text(id, text)?;
            self.line_mut(id)?.delimiter = *delimiter;
            cursor = id;
        }

        let delimiters = split.lines.iter().map(|(_, d)| *d);
        if split.lines.iter().any(|(_, d)| d.is_binary()) {
            self.mode = FileMode::Binary;
        } else if self.mode == FileMode::Reset {
            self.mode = classify(delimiters);
        }
        if split.incomplete {
            self.incomplete = true;
            warn!(target: "ring.io", path = %path.display(), "last_line_incomplete");
        }
        Ok(ReadReport {
            existed: true,
            lines: split.lines.len(),
            bytes: bytes.len() as u64,
            mode: self.mode,
            incomplete_last_line: split.incomplete,
        })
    }

    /// Write every data line and its terminator to `path`.
    pub fn write_to(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<u64, RingError> {
        let result = self.write_file(fs, path);
        match &result {
            Ok(bytes) => debug!(target: "ring.io", path = %path.display(), bytes, "file_written"),
            Err(err) => {
                self.damaged = true;
                error!(target: "ring.io", path = %path.display(), %err, "file_write_error");
            }
        }
        result
    }

    fn write_file(&self, fs: &dyn FileSystem, path: &Path) -> Result<u64, RingError> {
        let file = fs
            .create(path)
            .map_err(|err| RingError::io(IoOp::Open, path, err))?;
        let mut out = BufWriter::new(file);
        let mut written = 0u64;
        for (_, line) in self.data_lines() {
            let text = self.text_of(line);
            let delimiter = line.delimiter().bytes();
            out.write_all(text)
                .and_then(|_| out.write_all(delimiter))
                .map_err(|err| RingError::io(IoOp::Write, path, err))?;
            written += (text.len() + delimiter.len()) as u64;
        }
        out.flush()
            .map_err(|err| RingError::io(IoOp::Close, path, err))?;
        Ok(written)
    }

    /// Save to the ring's own path through an autosave copy.
    ///
    /// The content is first written to `AUTOSAVE.nnn` in `autosave_dir` (or
    /// the file's directory), then to the real file, after which the copy is
    /// deleted. Success discards the undo log and clears the changed and
    /// damaged flags.
    pub fn save(
        &mut self,
        fs: &dyn FileSystem,
        autosave_dir: Option<&Path>,
    ) -> Result<(), RingError> {
        if self.kind != RingKind::Data {
            return Err(RingError::Protected);
        }
        let path = self.path.clone().ok_or(RingError::NoPath)?;
        let dir = match autosave_dir {
            Some(dir) => dir.to_path_buf(),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let autosave = (0..AUTOSAVE_SLOTS)
            .map(|n| dir.join(format!("AUTOSAVE.{n:03}")))
            .find(|candidate| !fs.exists(candidate))
            .ok_or_else(|| {
                RingError::io(
                    IoOp::Open,
                    dir.clone(),
                    io::Error::new(io::ErrorKind::AlreadyExists, "no free autosave name"),
                )
            })?;

        self.write_to(fs, &autosave)?;
        self.write_to(fs, &path)?;
        if let Err(err) = fs.remove(&autosave) {
            warn!(target: "ring.io", path = %autosave.display(), ?err, "autosave_remove_failed");
        }

        self.reset_undo();
        self.changed = false;
        self.damaged = false;
        if self.mode == FileMode::Reset {
            self.mode = if platform_delimiter() == Delimiter::Crlf {
                FileMode::Dos
            } else {
                FileMode::Unix
            };
        }
        info!(target: "ring.io", path = %path.display(), "file_saved");
        Ok(())
    }

    /// True if this ring was loaded from `path`, as resolved by `fs`.
    pub fn contains(&self, fs: &dyn FileSystem, path: &Path) -> bool {
        let Some(own) = self.path.as_deref() else {
            return false;
        };
        match (fs.canonicalize(own), fs.canonicalize(path)) {
            (Ok(own), Ok(wanted)) => own == wanted,
            _ => false,
        }
    }
}
