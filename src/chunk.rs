// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Section walking for `FORM` payloads.
//!
//! A payload starts with its own four byte type tag and is followed by a run
//! of chunks. Three kinds of chunk are handled specially:
//!
//! * `PAD ` chunks are skipped
//! * runs of zero words between chunks are skipped
//! * `GZIP` chunks wrap a MIO0 block and yield the decompressed section
//!
//! ## GZIP
//!
//! | Offset | Type      | Description                                   |
//! |--------|-----------|-----------------------------------------------|
//! | 0      | `[u8; 4]` | Magic - "GZIP"                                |
//! | 4      | `u32`     | Length of everything that follows             |
//! | 8      | `[u8; 4]` | Tag of the wrapped section                    |
//! | 12     | `u32`     | Decompressed length of the wrapped section    |
//! | 16     | MIO0      | Compressed section                            |
//!
//! Despite the tag, the data is MIO0 and not gzip.

use std::borrow::Cow;
use std::fmt;

use binrw::binrw;
use log::trace;

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};
use crate::mio0;
use crate::Tag;

/// The header shared by archive files and the file table.
#[binrw]
#[brw(big, magic = b"FORM")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormHeader {
    /// Length of everything after this field, including `kind`.
    pub length: u32,
    pub kind: Tag,
}

impl FormHeader {
    pub const SIZE: usize = 12;

    /// Reads the header at `offset`, checking the magic.
    pub fn parse(buffer: &[u8], offset: usize) -> Result<Self> {
        let mut cursor = ByteCursor::at(buffer, offset);
        cursor.expect_tag(Tag::FORM)?;
        cursor.seek(offset);
        cursor.read_record(Self::SIZE)
    }
}

#[binrw]
#[brw(big, magic = b"GZIP")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct GzipHeader {
    length: u32,
    inner_tag: Tag,
    decompressed_length: u32,
}

impl GzipHeader {
    const SIZE: usize = 16;
}

/// A single section of a file.
#[derive(Clone, PartialEq, Eq)]
pub struct Section<'a> {
    tag: Tag,
    offset: usize,
    compressed: bool,
    data: Cow<'a, [u8]>,
}

impl<'a> Section<'a> {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Offset of the chunk header within the payload it was read from.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether the section was stored inside a `GZIP` chunk.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// The section's payload, decompressed if necessary.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Cow<'a, [u8]> {
        self.data
    }
}

impl fmt::Debug for Section<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Section")
            .field("tag", &self.tag)
            .field("offset", &self.offset)
            .field("compressed", &self.compressed)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Iterator over the sections of a payload.
///
/// Iteration stops after the first error.
#[derive(Clone, Debug)]
pub struct Sections<'a> {
    buffer: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Sections<'a> {
    /// Skips the payload's four byte type tag.
    const START: usize = 4;

    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            pos: Self::START,
            done: false,
        }
    }

    fn skip_zero_words(&mut self) {
        while self.buffer.len().saturating_sub(self.pos) >= 4
            && self.buffer[self.pos..self.pos + 4] == [0; 4]
        {
            self.pos += 4;
        }
    }

    fn next_section(&mut self) -> Result<Option<Section<'a>>> {
        loop {
            let rest = self.buffer.get(self.pos..).unwrap_or_default();
            // a zero tail shorter than a word is filler too
            if rest.len() < 4 && rest.iter().all(|&b| b == 0) {
                self.pos = self.buffer.len();
                return Ok(None);
            }

            let mut cursor = ByteCursor::at(self.buffer, self.pos);
            let tag = cursor.read_tag()?;

            if tag == Tag::ZERO {
                self.skip_zero_words();
                continue;
            }

            let length = cursor.read_u32()? as usize;
            let offset = self.pos;
            let data = cursor.read_bytes(length)?;
            self.pos = cursor.position();

            match tag {
                Tag::PAD => {
                    trace!("skipping {length} bytes of padding at {offset:#x}");
                }
                Tag::GZIP => {
                    let chunk = &self.buffer[offset..self.pos];
                    return decompress_section(chunk, offset).map(Some);
                }
                _ => {
                    trace!("section {tag} at {offset:#x}, {length} bytes");
                    return Ok(Some(Section {
                        tag,
                        offset,
                        compressed: false,
                        data: Cow::Borrowed(data),
                    }));
                }
            }
        }
    }
}

impl<'a> Iterator for Sections<'a> {
    type Item = Result<Section<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_section() {
            Ok(Some(section)) => Some(Ok(section)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Expands a complete `GZIP` chunk.
fn decompress_section<'a>(chunk: &[u8], offset: usize) -> Result<Section<'a>> {
    let header: GzipHeader = ByteCursor::new(chunk).read_record(GzipHeader::SIZE)?;
    let expected = header.decompressed_length as usize;

    let mio0_header = mio0::Header::parse(chunk, GzipHeader::SIZE)?;
    if mio0_header.decompressed_length as usize != expected {
        return Err(FormatError::LengthMismatch {
            what: "GZIP section",
            expected,
            actual: mio0_header.decompressed_length as usize,
        }
        .into());
    }

    let data = mio0::decompress(chunk, GzipHeader::SIZE)?;
    if data.len() != expected {
        return Err(FormatError::LengthMismatch {
            what: "GZIP section",
            expected,
            actual: data.len(),
        }
        .into());
    }

    trace!(
        "section {} at {offset:#x}, {} bytes compressed to {}",
        header.inner_tag,
        expected,
        header.length
    );

    Ok(Section {
        tag: header.inner_tag,
        offset,
        compressed: true,
        data: Cow::Owned(data),
    })
}

/// Lazily walks the sections of `buffer`. The iterator can be recreated at
/// any time and always yields the same sequence.
pub fn sections(buffer: &[u8]) -> Sections<'_> {
    Sections::new(buffer)
}

/// Splits `buffer` into its sections, in on-disk order.
pub fn split_sections(buffer: &[u8]) -> Result<Vec<Section<'_>>> {
    sections(buffer).collect()
}
