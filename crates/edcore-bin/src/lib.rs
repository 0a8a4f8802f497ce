//! The `edcore` subcommands, kept out of `main.rs` so tests can drive them.

use anyhow::{Context, Result};
use core_mark::Margins;
use core_pool::PoolConfig;
use core_state::{EditorOptions, EditorState};
use core_text::{FileMode, Ring, StdFileSystem};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// What `edcore info` prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub path: PathBuf,
    pub existed: bool,
    pub lines: usize,
    pub bytes: u64,
    pub mode: FileMode,
    /// Terminator name to number of lines ending with it.
    pub delimiters: BTreeMap<&'static str, usize>,
    pub incomplete: bool,
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.existed {
            return write!(f, "{}: New file", self.path.display());
        }
        writeln!(
            f,
            "{}: {} lines, {} bytes, {}",
            self.path.display(),
            self.lines,
            self.bytes,
            self.mode.as_str()
        )?;
        for (name, count) in &self.delimiters {
            writeln!(f, "  {name:<10} {count}")?;
        }
        if self.incomplete {
            write!(f, "Last line incomplete")?;
        }
        Ok(())
    }
}

pub fn info(path: &Path, pool: PoolConfig) -> Result<Info> {
    let mut ring = Ring::new(pool);
    let report = ring
        .read(&StdFileSystem, path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut delimiters = BTreeMap::new();
    for (_, line) in ring.data_lines() {
        *delimiters.entry(line.delimiter().as_str()).or_insert(0) += 1;
    }
    Ok(Info {
        path: path.to_path_buf(),
        existed: report.existed,
        lines: report.lines,
        bytes: report.bytes,
        mode: report.mode,
        delimiters,
        incomplete: report.incomplete_last_line,
    })
}

/// Load `src` and write it to `dst` unchanged. Returns the bytes written.
pub fn copy(src: &Path, dst: &Path, pool: PoolConfig) -> Result<u64> {
    let mut ring = Ring::new(pool);
    let report = ring
        .read(&StdFileSystem, src)
        .with_context(|| format!("reading {}", src.display()))?;
    anyhow::ensure!(report.existed, "{} does not exist", src.display());
    let written = ring
        .write_to(&StdFileSystem, dst)
        .with_context(|| format!("writing {}", dst.display()))?;
    info!(target: "runtime", src = %src.display(), dst = %dst.display(), written, "copy_complete");
    Ok(written)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSummary {
    pub lines_before: usize,
    pub lines_after: usize,
}

/// Reflow every line of `path` between `margins`. The result replaces the
/// file unless `output` names another one.
pub fn format(
    path: &Path,
    margins: Margins,
    output: Option<&Path>,
    options: EditorOptions,
) -> Result<FormatSummary> {
    let mut editor = EditorState::new(
        EditorOptions {
            margins,
            ..options
        },
        Box::new(StdFileSystem),
    );
    let opened = editor
        .open(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let ring = editor.ring(opened.ring)?;
    let lines_before = ring.data_rows();
    let (Some(first), Some(last)) = (ring.first(), ring.last()) else {
        return Ok(FormatSummary {
            lines_before,
            lines_after: lines_before,
        });
    };
    editor.activate(opened.ring, first)?;
    editor.mark_line(None)?;
    editor.activate(opened.ring, last)?;
    editor.mark_line(None)?;
    editor.mark_format().context("formatting")?;
    let lines_after = editor.ring(opened.ring)?.data_rows();
    match output {
        Some(output) => {
            editor
                .write_ring(opened.ring, output)
                .with_context(|| format!("writing {}", output.display()))?;
        }
        None => editor
            .save(opened.ring, false)
            .with_context(|| format!("saving {}", path.display()))?,
    }
    info!(target: "runtime", lines_before, lines_after, "format_complete");
    Ok(FormatSummary {
        lines_before,
        lines_after,
    })
}
