// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! The archive's file table.
//!
//! The table is a `FORM` chunk found somewhere before the archive data. Its
//! type tag selects one of two encodings.
//!
//! ## UVFT
//!
//! Used by most games. The payload is a list of chunks, one per file type,
//! each holding packed `i32` offsets relative to the first 16-byte boundary
//! after the table. An offset of `-1` marks an empty slot.
//!
//! | Offset | Type      | Description                                   |
//! |--------|-----------|-----------------------------------------------|
//! | 0      | `[u8; 4]` | File type, e.g. "UVMD"                        |
//! | 4      | `u32`     | Length of the offsets in bytes                |
//! | 8      | `[i32]`   | Relative offsets                              |
//!
//! ## UVRM
//!
//! Used by the flight games (Pilotwings 64, AeroFighters Assault). The
//! payload holds a single section, usually compressed, containing 8 byte
//! records of file type and file length. Files are contiguous, so offsets are
//! the running sum of the lengths.
//!
//! | Offset | Type      | Description                                   |
//! |--------|-----------|-----------------------------------------------|
//! | 0      | `[u8; 4]` | File type                                     |
//! | 4      | `u32`     | Length of the file, `FORM` header included    |

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace};
use winnow::binary::{be_i32, be_u32, length_take};
use winnow::combinator::repeat;
use winnow::token::take;
use winnow::{ModalResult, Parser};

use crate::chunk::{self, FormHeader};
use crate::cursor::{tag_at, u32_at};
use crate::error::{Error, FormatError, Result};
use crate::{align16, Tag};

/// The encoding of a file table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileTableKind {
    /// `UVFT`, explicit offsets.
    Normal,
    /// `UVRM`, compressed cumulative lengths.
    FlightGame,
}

impl FileTableKind {
    pub fn tag(&self) -> Tag {
        match self {
            Self::Normal => Tag::UVFT,
            Self::FlightGame => Tag::UVRM,
        }
    }

    fn from_tag(tag: Tag) -> Option<Self> {
        match tag {
            Tag::UVFT => Some(Self::Normal),
            Tag::UVRM => Some(Self::FlightGame),
            _ => None,
        }
    }
}

impl fmt::Display for FileTableKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::FlightGame => write!(f, "FlightGame"),
        }
    }
}

/// One slot of the file table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub tag: Tag,
    /// Position among the slots with the same tag.
    pub ordinal: usize,
    /// Absolute ROM offset, `None` for an empty slot.
    pub offset: Option<usize>,
}

/// Finds the file table by scanning for a `FORM` whose type is `UVFT` or
/// `UVRM`.
pub fn locate(rom: &[u8]) -> Result<(usize, FileTableKind)> {
    rom.windows(FormHeader::SIZE)
        .enumerate()
        .find_map(|(offset, window)| {
            if &window[0..4] != Tag::FORM.as_bytes() {
                return None;
            }
            FileTableKind::from_tag(Tag::from_slice(&window[8..12])).map(|kind| (offset, kind))
        })
        .ok_or(Error::NotFound)
}

/// A parsed file table.
#[derive(Clone, Debug)]
pub struct FileTable<'a> {
    kind: FileTableKind,
    offset: usize,
    raw: &'a [u8],
    decompressed: Option<Vec<u8>>,
    entries: Vec<IndexEntry>,
}

impl<'a> FileTable<'a> {
    /// Locates, parses, and validates the file table of `rom`.
    pub fn from_rom(rom: &'a [u8]) -> Result<Self> {
        let (offset, kind) = locate(rom)?;
        debug!("found {kind} file table at {offset:#x}");
        let table = Self::parse(rom, offset)?;
        table.validate(rom)?;
        Ok(table)
    }

    /// Parses the table whose `FORM` header is at `offset`.
    pub fn parse(rom: &'a [u8], offset: usize) -> Result<Self> {
        let header = FormHeader::parse(rom, offset)?;
        let kind = FileTableKind::from_tag(header.kind).ok_or(FormatError::BadMagic {
            offset: offset + 8,
            expected: Tag::UVFT,
            found: header.kind,
        })?;

        let raw = crate::cursor::slice_at(rom, offset + 8, header.length as usize)?;
        let start_of_files = align16(offset + 8 + raw.len());

        let (entries, decompressed) = match kind {
            FileTableKind::Normal => (parse_normal(raw, offset + 8, start_of_files)?, None),
            FileTableKind::FlightGame => {
                let (entries, data) = parse_flight_game(raw, start_of_files)?;
                (entries, Some(data))
            }
        };

        debug!(
            "file table has {} slots, {} files",
            entries.len(),
            entries.iter().filter(|e| e.offset.is_some()).count()
        );

        Ok(Self {
            kind,
            offset,
            raw,
            decompressed,
            entries,
        })
    }

    pub fn kind(&self) -> FileTableKind {
        self.kind
    }

    /// Offset of the table's `FORM` header.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The table's payload, type tag included.
    pub fn raw_bytes(&self) -> &'a [u8] {
        self.raw
    }

    /// The expanded records of a `UVRM` table.
    pub fn decompressed_bytes(&self) -> Option<&[u8]> {
        self.decompressed.as_deref()
    }

    /// One past the last byte of the table.
    pub fn end(&self) -> usize {
        self.offset + 8 + self.raw.len()
    }

    /// Where the files begin: the end of the table rounded up to 16 bytes.
    pub fn start_of_files(&self) -> usize {
        align16(self.end())
    }

    /// Every slot, in table order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Resolves the `ordinal`th file of type `tag`. Empty and missing slots
    /// are `None`.
    pub fn location(&self, tag: Tag, ordinal: usize) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.tag == tag && e.ordinal == ordinal)
            .and_then(|e| e.offset)
    }

    /// The occupied slots sorted by offset.
    pub fn locations(&self) -> Vec<IndexEntry> {
        let mut present: Vec<IndexEntry> = self
            .entries
            .iter()
            .filter(|e| e.offset.is_some())
            .copied()
            .collect();
        present.sort_by_key(|e| e.offset);
        present
    }

    /// Checks that the files tile the archive: each `FORM` must end exactly
    /// where the next file starts. Only `UVRW` files may lack a `FORM`
    /// header; their extent is taken from the next file.
    pub fn validate(&self, rom: &[u8]) -> Result<()> {
        let locations = self.locations();
        for pair in locations.windows(2) {
            let (entry, next) = (pair[0], pair[1]);
            let (Some(offset), Some(next_offset)) = (entry.offset, next.offset) else {
                continue;
            };

            if tag_at(rom, offset)? != Tag::FORM {
                if entry.tag != Tag::UVRW {
                    return Err(FormatError::TableInconsistent {
                        offset,
                        reason: format!("{} file does not start with FORM", entry.tag),
                    }
                    .into());
                }
                trace!("headerless {} at {offset:#x}", entry.tag);
                continue;
            }

            let end = offset + 8 + u32_at(rom, offset + 4)? as usize;
            if end != next_offset {
                return Err(FormatError::TableInconsistent {
                    offset,
                    reason: format!(
                        "{} {} ends at {end:#x} but the next file starts at {next_offset:#x}",
                        entry.tag, entry.ordinal
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}

fn parse_tag(input: &mut &[u8]) -> ModalResult<Tag> {
    take(4usize).map(Tag::from_slice).parse_next(input)
}

/// A type tag followed by length-prefixed data.
fn parse_type_section<'i>(input: &mut &'i [u8]) -> ModalResult<(Tag, &'i [u8])> {
    (parse_tag, length_take(be_u32)).parse_next(input)
}

/// A type tag followed by a file length.
fn parse_length_record(input: &mut &[u8]) -> ModalResult<(Tag, u32)> {
    (parse_tag, be_u32).parse_next(input)
}

/// Hands out ordinals per tag in the order slots are seen.
#[derive(Default)]
struct Ordinals(HashMap<Tag, usize>);

impl Ordinals {
    fn next(&mut self, tag: Tag) -> usize {
        let count = self.0.entry(tag).or_default();
        let ordinal = *count;
        *count += 1;
        ordinal
    }
}

fn parse_normal(raw: &[u8], raw_offset: usize, start_of_files: usize) -> Result<Vec<IndexEntry>> {
    let mut input = raw.get(4..).unwrap_or_default();
    let sections: Vec<(Tag, &[u8])> = repeat(0.., parse_type_section)
        .parse_next(&mut input)
        .map_err(|_| truncated(raw, raw_offset, input))?;

    if !input.is_empty() {
        return Err(truncated(raw, raw_offset, input));
    }

    let mut ordinals = Ordinals::default();
    let mut entries = Vec::new();
    for (tag, mut data) in sections {
        if data.len() % 4 != 0 {
            return Err(FormatError::UnexpectedStructure(format!(
                "{tag} offsets are {} bytes, not a multiple of 4",
                data.len()
            ))
            .into());
        }

        let parsed: ModalResult<Vec<i32>> = repeat(data.len() / 4, be_i32).parse_next(&mut data);
        let offsets = parsed.map_err(|_| truncated(raw, raw_offset, data))?;

        trace!("{tag}: {} slots", offsets.len());
        for relative in offsets {
            entries.push(IndexEntry {
                tag,
                ordinal: ordinals.next(tag),
                offset: (relative != -1).then(|| start_of_files + relative as u32 as usize),
            });
        }
    }
    Ok(entries)
}

fn parse_flight_game(raw: &[u8], start_of_files: usize) -> Result<(Vec<IndexEntry>, Vec<u8>)> {
    let sections = chunk::split_sections(raw)?;
    let [section] = sections.as_slice() else {
        return Err(FormatError::UnexpectedStructure(format!(
            "UVRM table has {} sections, expected 1",
            sections.len()
        ))
        .into());
    };

    let data = section.data().to_vec();
    if data.len() % 8 != 0 {
        return Err(FormatError::UnexpectedStructure(format!(
            "UVRM records are {} bytes, not a multiple of 8",
            data.len()
        ))
        .into());
    }

    let mut input = data.as_slice();
    let records: Vec<(Tag, u32)> = repeat(data.len() / 8, parse_length_record)
        .parse_next(&mut input)
        .map_err(|_| truncated(&data, 0, input))?;

    let mut ordinals = Ordinals::default();
    let mut position = start_of_files;
    let mut entries = Vec::with_capacity(records.len());
    for (tag, length) in records {
        entries.push(IndexEntry {
            tag,
            ordinal: ordinals.next(tag),
            offset: Some(position),
        });
        position += length as usize;
    }

    Ok((entries, data))
}

/// Reports the unparsed tail of `whole` as truncated.
fn truncated(whole: &[u8], base: usize, rest: &[u8]) -> Error {
    FormatError::Truncated {
        offset: base + whole.len() - rest.len(),
        need: 8,
        have: rest.len(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = b"FORM".to_vec();
        out.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn offsets(tag: &[u8; 4], offsets: &[i32]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&((offsets.len() * 4) as u32).to_be_bytes());
        for o in offsets {
            out.extend_from_slice(&o.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_locate_finds_first_table() {
        let mut rom = vec![0u8; 6];
        rom.extend(form(b"UVFT", &[]));
        rom.extend(form(b"UVRM", &[]));
        assert_eq!((6, FileTableKind::Normal), locate(&rom).unwrap());
    }

    #[test]
    fn test_locate_without_table() {
        let rom = form(b"UVMD", &[0; 8]);
        assert_eq!(Err(Error::NotFound), locate(&rom));
    }

    #[test]
    fn test_normal_table_skips_empty_slots() {
        let mut body = offsets(b"UVMD", &[0x20, -1, 0x00]);
        body.extend(offsets(b"UVTX", &[0x40]));
        let rom = form(b"UVFT", &body);

        let table = FileTable::parse(&rom, 0).unwrap();
        let start = table.start_of_files();
        assert_eq!(align16(rom.len()), start);
        assert_eq!(4, table.entries().len());
        assert_eq!(Some(start + 0x20), table.location(Tag::UVMD, 0));
        assert_eq!(None, table.location(Tag::UVMD, 1));
        assert_eq!(Some(start), table.location(Tag::UVMD, 2));
        assert_eq!(Some(start + 0x40), table.location(Tag::UVTX, 0));
        assert_eq!(None, table.location(Tag::UVTX, 1));

        let sorted: Vec<Option<usize>> = table.locations().iter().map(|e| e.offset).collect();
        assert_eq!(
            vec![Some(start), Some(start + 0x20), Some(start + 0x40)],
            sorted
        );
    }

    #[test]
    fn test_normal_table_reads_every_offset_word() {
        let slots: Vec<i32> = (0..6).map(|i| if i == 3 { -1 } else { i * 0x10 }).collect();
        let mut body = offsets(b"UVTX", &slots);
        body.extend(offsets(b"UVBT", &[]));
        let rom = form(b"UVFT", &body);

        let table = FileTable::parse(&rom, 0).unwrap();
        let start = table.start_of_files();
        assert_eq!(6, table.entries().len());
        assert_eq!(Some(start + 0x50), table.location(Tag::UVTX, 5));
        assert_eq!(None, table.location(Tag::UVTX, 3));
        assert_eq!(None, table.location(Tag::UVBT, 0));
    }

    #[test]
    fn test_normal_table_offsets_must_be_whole_words() {
        let mut body = b"UVMD".to_vec();
        body.extend_from_slice(&6u32.to_be_bytes());
        body.extend([0; 6]);
        let rom = form(b"UVFT", &body);
        assert!(matches!(
            FileTable::parse(&rom, 0),
            Err(Error::Format(FormatError::UnexpectedStructure(_)))
        ));
    }

    #[test]
    fn test_normal_table_with_ragged_tail_is_truncated() {
        let mut body = offsets(b"UVMD", &[0]);
        body.extend(b"UVT");
        let rom = form(b"UVFT", &body);
        assert!(matches!(
            FileTable::parse(&rom, 0),
            Err(Error::Format(FormatError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_flight_game_offsets_accumulate() {
        let mut records = Vec::new();
        for (tag, len) in [(b"UVMD", 0x30u32), (b"UVTX", 0x10), (b"UVMD", 0x20)] {
            records.extend_from_slice(tag);
            records.extend_from_slice(&len.to_be_bytes());
        }
        let mut body = b"COMM".to_vec();
        body.extend_from_slice(&(records.len() as u32).to_be_bytes());
        body.extend(&records);
        let rom = form(b"UVRM", &body);

        let table = FileTable::parse(&rom, 0).unwrap();
        let start = table.start_of_files();
        assert_eq!(FileTableKind::FlightGame, table.kind());
        assert_eq!(Some(records.as_slice()), table.decompressed_bytes());
        assert_eq!(Some(start), table.location(Tag::UVMD, 0));
        assert_eq!(Some(start + 0x30), table.location(Tag::UVTX, 0));
        assert_eq!(Some(start + 0x40), table.location(Tag::UVMD, 1));
    }

    #[test]
    fn test_flight_game_needs_one_section() {
        let mut body = Vec::new();
        for _ in 0..2 {
            body.extend(b"COMM");
            body.extend_from_slice(&8u32.to_be_bytes());
            body.extend(b"UVMD\0\0\0\x10");
        }
        let rom = form(b"UVRM", &body);
        assert!(matches!(
            FileTable::parse(&rom, 0),
            Err(Error::Format(FormatError::UnexpectedStructure(_)))
        ));
    }

    #[test]
    fn test_validate_rejects_gaps() {
        let table = form(b"UVFT", &offsets(b"UVMD", &[0, 0x20]));
        let mut rom = table.clone();
        rom.resize(align16(rom.len()), 0);
        let start = rom.len();
        rom.extend(form(b"UVMD", &[0; 4]));
        rom.resize(start + 0x20, 0);
        rom.extend(form(b"UVMD", &[0; 4]));

        let parsed = FileTable::parse(&rom, 0).unwrap();
        assert!(matches!(
            parsed.validate(&rom),
            Err(Error::Format(FormatError::TableInconsistent { offset, .. })) if offset == start
        ));
    }
}
