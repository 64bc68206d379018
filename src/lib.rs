// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Paradigm Entertainment Archive Extractor
//!
//! This crate reads the archive embedded in N64 ROMs built on Paradigm
//! Entertainment's engine (Pilotwings 64, AeroFighters Assault, F-1 World
//! Grand Prix, Beetle Adventure Racing, ...) and decodes the formats stored
//! inside it.
//!
//! # Overview
//!
//! The archive is a sequence of IFF-style `FORM` chunks preceded by a file
//! table. Each file is itself a `FORM` whose sections may be wrapped in
//! MIO0-compressed `GZIP` chunks. Decoding a ROM is a pipeline:
//!
//! - [index] locates and parses the file table
//! - [archive] enumerates every file the table describes
//! - [chunk] splits a file into its tagged sections
//! - [mio0] expands compressed sections
//! - [rsp] turns packed model geometry into triangles
//! - [rdp] replays texture commands into TMEM and tile descriptors
//! - [texels] decodes texel data into RGBA images
//! - [uvtx], [uvbt] and [uvft] cut textures, blits and font glyphs out of
//!   their files
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use paradigmfs::{io, archive::Filesystem};
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let (_, rom) = io::read_rom(Path::new("pilotwings.z64"))?;
//!     let fs = Filesystem::new(&rom)?;
//!
//!     for file in fs.files() {
//!         println!("{:#08x} {}", file.offset(), file.type_name());
//!         for section in file.sections()? {
//!             println!("    {} {} bytes", section.tag(), section.data().len());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Container Format
//!
//! ## FORM
//!
//! | Offset | Type       | Description                              |
//! |--------|------------|------------------------------------------|
//! | 0      | `[u8; 4]`  | Magic - "FORM"                           |
//! | 4      | `u32`      | Length of everything that follows        |
//! | 8      | `[u8; 4]`  | File type, e.g. "UVMD"                   |
//! | 12     | `[Chunk]`  | Sections until the end of the FORM       |
//!
//! ## Chunk
//!
//! | Offset | Type       | Description                              |
//! |--------|------------|------------------------------------------|
//! | 0      | `[u8; 4]`  | Section tag, e.g. "COMM"                 |
//! | 4      | `u32`      | Length of the payload                    |
//! | 8      | `[u8]`     | Payload                                  |
//!
//! All integers are big-endian.

use std::fmt;

use binrw::binrw;

pub mod archive;
pub mod chunk;
pub mod cursor;
pub mod display;
pub mod error;
pub mod index;
pub mod io;
pub mod mio0;
pub mod names;
pub mod rdp;
pub mod rom;
pub mod rsp;
pub mod texels;
pub mod uvbt;
pub mod uvft;
pub mod uvmd;
pub mod uvtx;

pub use error::{Error, FormatError, Result};

/// A four character code identifying a chunk, file type, or magic number.
///
/// Tags are compared bytewise. They are usually, but not always, printable
/// ASCII: AeroFighters Assault has a file type of four spaces, and some
/// files contain runs of zero words where a tag is expected.
#[binrw]
#[brw(big)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag([u8; 4]);

impl Tag {
    pub const FORM: Tag = Tag(*b"FORM");
    pub const PAD: Tag = Tag(*b"PAD ");
    pub const GZIP: Tag = Tag(*b"GZIP");
    pub const MIO0: Tag = Tag(*b"MIO0");
    /// File table, uncompressed offsets.
    pub const UVFT: Tag = Tag(*b"UVFT");
    /// File table, compressed lengths (flight games).
    pub const UVRM: Tag = Tag(*b"UVRM");
    /// Raw file. The only type allowed to appear without a FORM header.
    pub const UVRW: Tag = Tag(*b"UVRW");
    pub const COMM: Tag = Tag(*b"COMM");
    pub const UVTX: Tag = Tag(*b"UVTX");
    pub const UVMD: Tag = Tag(*b"UVMD");
    pub const UVBT: Tag = Tag(*b"UVBT");
    /// Filler found between sections in some files.
    pub const ZERO: Tag = Tag([0; 4]);
    /// Placeholder used when the expected tag is not known.
    pub const UNKNOWN: Tag = Tag(*b"????");

    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Builds a tag from the first four bytes of `bytes`, zero filling if
    /// fewer are available.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut tag = [0u8; 4];
        let len = bytes.len().min(4);
        tag[..len].copy_from_slice(&bytes[..len]);
        Self(tag)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// File name friendly rendering (`.CTL` becomes `_CTL`).
    pub fn to_extension(&self) -> String {
        self.to_string().replace(['.', '\\', '/'], "_")
    }
}

impl From<[u8; 4]> for Tag {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tag(\"{self}\")")
    }
}

/// Rounds `address` up to the next multiple of 16.
pub fn align16(address: usize) -> usize {
    address.next_multiple_of(0x10)
}
