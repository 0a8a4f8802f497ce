//! Line records: control bits, terminator kind and a handle to the text.

use core_pool::PoolBlock;

/// Stable handle to a line inside one [`crate::Ring`].
///
/// The generation is bumped every time a slot is reused, so a handle kept
/// across a deletion resolves to nothing instead of to an unrelated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

/// Line terminator as found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delimiter {
    /// No terminator. Only valid for the last line of a file.
    None,
    #[default]
    Lf,
    Cr,
    Crlf,
    CrCrlf,
    CrCrCrlf,
    Nul1,
    Nul2,
    Nul3,
    Nul4,
}

impl Delimiter {
    pub const ALL: [Delimiter; 10] = [
        Delimiter::None,
        Delimiter::Lf,
        Delimiter::Cr,
        Delimiter::Crlf,
        Delimiter::CrCrlf,
        Delimiter::CrCrCrlf,
        Delimiter::Nul1,
        Delimiter::Nul2,
        Delimiter::Nul3,
        Delimiter::Nul4,
    ];

    /// Canonical on-disk bytes.
    pub const fn bytes(self) -> &'static [u8] {
        match self {
            Delimiter::None => b"",
            Delimiter::Lf => b"\n",
            Delimiter::Cr => b"\r",
            Delimiter::Crlf => b"\r\n",
            Delimiter::CrCrlf => b"\r\r\n",
            Delimiter::CrCrCrlf => b"\r\r\r\n",
            Delimiter::Nul1 => b"\0",
            Delimiter::Nul2 => b"\0\0",
            Delimiter::Nul3 => b"\0\0\0",
            Delimiter::Nul4 => b"\0\0\0\0",
        }
    }

    /// Terminators that only show up in binary content.
    pub const fn is_binary(self) -> bool {
        !matches!(self, Delimiter::None | Delimiter::Lf | Delimiter::Crlf)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Delimiter::None => "none",
            Delimiter::Lf => "lf",
            Delimiter::Cr => "cr",
            Delimiter::Crlf => "crlf",
            Delimiter::CrCrlf => "cr-crlf",
            Delimiter::CrCrCrlf => "cr-cr-crlf",
            Delimiter::Nul1 => "nul1",
            Delimiter::Nul2 => "nul2",
            Delimiter::Nul3 => "nul3",
            Delimiter::Nul4 => "nul4",
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LineFlags: u8 {
        const READONLY = 0b0000_0001;
        const MARKED   = 0b0000_0010;
        const HIDDEN   = 0b0000_0100;
    }
}

#[derive(Debug)]
pub(crate) enum LineText {
    Empty,
    Pooled { block: PoolBlock, len: usize },
    Static(&'static [u8]),
}

impl LineText {
    pub fn len(&self) -> usize {
        match self {
            LineText::Empty => 0,
            LineText::Pooled { len, .. } => *len,
            LineText::Static(text) => text.len(),
        }
    }
}

#[derive(Debug)]
pub struct Line {
    pub(crate) text: LineText,
    pub(crate) flags: LineFlags,
    pub(crate) delimiter: Delimiter,
    pub(crate) prev: Option<LineId>,
    pub(crate) next: Option<LineId>,
    /// Set while the line sits in an undo slot.
    pub(crate) detached: bool,
}

impl Line {
    pub(crate) fn new(delimiter: Delimiter, flags: LineFlags) -> Self {
        Self {
            text: LineText::Empty,
            flags,
            delimiter,
            prev: None,
            next: None,
            detached: false,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flags(&self) -> LineFlags {
        self.flags
    }

    pub fn is_readonly(&self) -> bool {
        self.flags.contains(LineFlags::READONLY)
    }

    pub fn is_marked(&self) -> bool {
        self.flags.contains(LineFlags::MARKED)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(LineFlags::HIDDEN)
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn prev(&self) -> Option<LineId> {
        self.prev
    }

    pub fn next(&self) -> Option<LineId> {
        self.next
    }
}
