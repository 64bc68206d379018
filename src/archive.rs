// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Enumerating the files of an archive.
//!
//! Every occupied slot of the [FileTable] names a file. Most files are a
//! `FORM` whose payload is split into sections on demand; `UVRW` files may
//! instead be raw data running up to the next file.

use std::fmt;

use log::{debug, warn};

use crate::chunk::{self, FormHeader, Section, Sections};
use crate::cursor::{slice_at, tag_at};
use crate::display::{self, DisplayWithOptions, SectionFormat};
use crate::error::{FormatError, Result};
use crate::index::FileTable;
use crate::{align16, Tag};

/// A single file of the archive.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ArchiveFile<'a> {
    table_tag: Tag,
    ordinal: usize,
    header_tag: Option<Tag>,
    payload: &'a [u8],
    offset: usize,
}

impl<'a> ArchiveFile<'a> {
    /// The type recorded in the file table.
    pub fn table_tag(&self) -> Tag {
        self.table_tag
    }

    /// Position among files of the same table type.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The type recorded in the file's own `FORM` header, `None` for a
    /// headerless file.
    pub fn header_tag(&self) -> Option<Tag> {
        self.header_tag
    }

    pub fn is_headerless(&self) -> bool {
        self.header_tag.is_none()
    }

    /// The `FORM` payload (starting with the header type tag), or the whole
    /// file if it is headerless.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Offset of the file in the ROM.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// One past the last byte of the file.
    pub fn end(&self) -> usize {
        match self.header_tag {
            Some(_) => self.offset + 8 + self.payload.len(),
            None => self.offset + self.payload.len(),
        }
    }

    /// `TABLE`, or `TABLE/HEADER` when the header disagrees with the table.
    /// Headerless files are `raw`.
    pub fn type_name(&self) -> String {
        match self.header_tag {
            None => "raw".to_string(),
            Some(header) if header == self.table_tag => self.table_tag.to_string(),
            Some(header) => format!("{}/{}", self.table_tag, header),
        }
    }

    /// Walks the file's sections. Headerless files have none.
    pub fn iter_sections(&self) -> Sections<'a> {
        match self.header_tag {
            Some(_) => chunk::sections(self.payload),
            None => chunk::sections(&[]),
        }
    }

    /// All sections, in order. Compressed sections are expanded.
    pub fn sections(&self) -> Result<Vec<Section<'a>>> {
        self.iter_sections().collect()
    }

    /// The first section tagged `tag`.
    pub fn section(&self, tag: Tag) -> Result<Section<'a>> {
        for section in self.iter_sections() {
            let section = section?;
            if section.tag() == tag {
                return Ok(section);
            }
        }
        Err(FormatError::UnexpectedStructure(format!(
            "{} at {:#x} has no {tag} section",
            self.type_name(),
            self.offset
        ))
        .into())
    }

    /// Every section tagged `tag`, in order.
    pub fn sections_of_type(&self, tag: Tag) -> Result<Vec<Section<'a>>> {
        self.iter_sections()
            .filter(|s| s.as_ref().map_or(true, |s| s.tag() == tag))
            .collect()
    }

    /// The file's only section.
    pub fn single_section(&self) -> Result<Section<'a>> {
        let mut sections = self.sections()?;
        if sections.len() != 1 {
            return Err(FormatError::UnexpectedStructure(format!(
                "{} at {:#x} has {} sections, expected 1",
                self.type_name(),
                self.offset,
                sections.len()
            ))
            .into());
        }
        Ok(sections.remove(0))
    }
}

impl fmt::Debug for ArchiveFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ArchiveFile")
            .field("table_tag", &self.table_tag)
            .field("ordinal", &self.ordinal)
            .field("header_tag", &self.header_tag)
            .field("offset", &self.offset)
            .field("len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for ArchiveFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_with_options(f, &display::Options::default())
    }
}

impl DisplayWithOptions for ArchiveFile<'_> {
    fn fmt_with_options(&self, f: &mut fmt::Formatter, options: &display::Options) -> fmt::Result {
        writeln!(
            f,
            "{:#010x} {:<10} {:>4} {:#x}",
            self.offset,
            self.type_name(),
            self.ordinal,
            self.payload.len()
        )?;

        if options.section_format == SectionFormat::None {
            return Ok(());
        }

        for section in self.iter_sections() {
            match section {
                Ok(section) => {
                    writeln!(
                        f,
                        "    {:#06x} {} {:#x} bytes{}",
                        section.offset(),
                        section.tag(),
                        section.data().len(),
                        if section.is_compressed() {
                            " (compressed)"
                        } else {
                            ""
                        }
                    )?;
                    if options.section_format == SectionFormat::Hex {
                        display::write_hex(f, "        ", section.data())?;
                    }
                }
                Err(e) => writeln!(f, "    error: {e}")?,
            }
        }
        Ok(())
    }
}

/// Every file of a ROM's archive.
#[derive(Debug)]
pub struct Filesystem<'a> {
    rom: &'a [u8],
    table: FileTable<'a>,
    files: Vec<ArchiveFile<'a>>,
}

impl<'a> Filesystem<'a> {
    /// Locates and validates the file table of `rom` and enumerates its
    /// files in offset order.
    pub fn new(rom: &'a [u8]) -> Result<Self> {
        let table = FileTable::from_rom(rom)?;
        let locations = table.locations();

        let mut files = Vec::with_capacity(locations.len());
        for (i, entry) in locations.iter().enumerate() {
            let Some(offset) = entry.offset else {
                continue;
            };

            if entry.tag == Tag::UVRW && tag_at(rom, offset)? != Tag::FORM {
                let next = locations
                    .get(i + 1)
                    .and_then(|e| e.offset)
                    .ok_or_else(|| FormatError::TableInconsistent {
                        offset,
                        reason: "headerless file has no following file to bound it".into(),
                    })?;
                files.push(ArchiveFile {
                    table_tag: entry.tag,
                    ordinal: entry.ordinal,
                    header_tag: None,
                    payload: slice_at(rom, offset, next - offset)?,
                    offset,
                });
                continue;
            }

            let header = FormHeader::parse(rom, offset)?;
            if header.kind != entry.tag {
                debug!(
                    "{} {} at {offset:#x} has header type {}",
                    entry.tag, entry.ordinal, header.kind
                );
            }
            files.push(ArchiveFile {
                table_tag: entry.tag,
                ordinal: entry.ordinal,
                header_tag: Some(header.kind),
                payload: slice_at(rom, offset + 8, header.length as usize)?,
                offset,
            });
        }

        debug!("enumerated {} files", files.len());
        Ok(Self { rom, table, files })
    }

    pub fn rom(&self) -> &'a [u8] {
        self.rom
    }

    pub fn table(&self) -> &FileTable<'a> {
        &self.table
    }

    /// Files in offset order.
    pub fn files(&self) -> &[ArchiveFile<'a>] {
        &self.files
    }

    /// Files whose table type is `tag`, in offset order.
    pub fn files_of_type(&self, tag: Tag) -> impl Iterator<Item = &ArchiveFile<'a>> {
        self.files.iter().filter(move |f| f.table_tag == tag)
    }

    /// The `ordinal`th file of type `tag`, as the table numbers them.
    pub fn file(&self, tag: Tag, ordinal: usize) -> Option<&ArchiveFile<'a>> {
        let offset = self.table.location(tag, ordinal)?;
        self.files
            .iter()
            .find(|f| f.offset == offset && f.table_tag == tag)
    }

    /// Offset of the file table's `FORM` header.
    pub fn start_of_table(&self) -> usize {
        self.table.offset()
    }

    /// One past the last byte of the last file.
    pub fn end_of_archive(&self) -> usize {
        self.files
            .last()
            .map_or(self.table.start_of_files(), |f| f.end())
    }

    /// Data from the 16-byte boundary after the archive to the end of the
    /// ROM, with its offset, unless it looks like filler: zeros up to the
    /// boundary followed by a run of a single byte value.
    pub fn trailing_data(&self) -> Option<(usize, &'a [u8])> {
        let end = self.end_of_archive().min(self.rom.len());
        let aligned = align16(end).min(self.rom.len());
        let tail = &self.rom[aligned..];

        if self.rom[end..aligned].iter().any(|&b| b != 0) {
            warn!("non-zero alignment bytes after archive end {end:#x}");
            return Some((aligned, tail));
        }

        match tail.first() {
            None => None,
            Some(&fill) if tail.iter().all(|&b| b == fill) => None,
            Some(_) => Some((aligned, tail)),
        }
    }
}

impl fmt::Display for Filesystem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_with_options(f, &display::Options::default())
    }
}

impl DisplayWithOptions for Filesystem<'_> {
    fn fmt_with_options(&self, f: &mut fmt::Formatter, options: &display::Options) -> fmt::Result {
        writeln!(
            f,
            "{} file table at {:#x}, {} bytes",
            self.table.kind(),
            self.table.offset(),
            self.table.raw_bytes().len()
        )?;
        writeln!(f, "Files start at {:#x}", self.table.start_of_files())?;
        writeln!(f)?;
        writeln!(f, "Offset     Type       #    Length")?;
        for file in &self.files {
            file.fmt_with_options(f, options)?;
        }
        writeln!(f)?;
        write!(f, "End of archive {:#x}", self.end_of_archive())?;
        if let Some((offset, data)) = self.trailing_data() {
            write!(f, "\nTrailing data at {offset:#x}, {:#x} bytes", data.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn form(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = b"FORM".to_vec();
        out.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn comm(data: &[u8]) -> Vec<u8> {
        let mut out = b"COMM".to_vec();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    /// Table, then each file placed at the given relative offset.
    fn rom(slots: &[(&[u8; 4], i32)], files: &[(usize, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (tag, offset) in slots {
            body.extend_from_slice(*tag);
            body.extend_from_slice(&4u32.to_be_bytes());
            body.extend_from_slice(&offset.to_be_bytes());
        }
        let mut rom = form(b"UVFT", &body);
        rom.resize(align16(rom.len()), 0);
        let start = rom.len();
        for (offset, data) in files {
            rom.resize(start + offset, 0);
            rom.extend(data);
        }
        rom
    }

    #[test]
    fn test_headerless_raw_file_runs_to_next_file() {
        let model = form(b"UVMD", &comm(&[1, 2, 3, 4]));
        let rom = rom(
            &[(b"UVRW", 0), (b"UVMD", 0x10)],
            &[(0, vec![0xAB; 0x10]), (0x10, model.clone())],
        );

        let fs = Filesystem::new(&rom).unwrap();
        let raw = &fs.files()[0];
        assert!(raw.is_headerless());
        assert_eq!("raw", raw.type_name());
        assert_eq!(&[0xAB; 0x10], raw.payload());
        assert!(raw.sections().unwrap().is_empty());

        let md = &fs.files()[1];
        assert_eq!(Some(Tag::UVMD), md.header_tag());
        assert_eq!(&model[8..], md.payload());
        assert_eq!(md.end(), fs.end_of_archive());
        assert_eq!(Some(md), fs.file(Tag::UVMD, 0));
    }

    #[test]
    fn test_compound_type_name() {
        let rom = rom(&[(b"UVTS", 0)], &[(0, form(b"UVSQ", &comm(&[0; 4])))]);
        let fs = Filesystem::new(&rom).unwrap();
        assert_eq!("UVTS/UVSQ", fs.files()[0].type_name());
    }

    #[test]
    fn test_section_lookup() {
        let mut body = comm(&[1]);
        body.extend(b"DATA\0\0\0\x02\x07\x08");
        body.extend(comm(&[2]));
        let rom = rom(&[(b"UVMD", 0)], &[(0, form(b"UVMD", &body))]);
        let fs = Filesystem::new(&rom).unwrap();
        let file = &fs.files()[0];

        assert_eq!(&[1], file.section(Tag::COMM).unwrap().data());
        assert_eq!(2, file.sections_of_type(Tag::COMM).unwrap().len());
        assert!(matches!(
            file.section(Tag::UVTX),
            Err(Error::Format(FormatError::UnexpectedStructure(_)))
        ));
        assert!(file.single_section().is_err());
    }

    #[test]
    fn test_trailing_filler_is_not_data() {
        let mut image = rom(&[(b"UVMD", 0)], &[(0, form(b"UVMD", &comm(&[1])))]);
        let end = image.len();
        image.resize(align16(end), 0);
        image.extend([0xFF; 0x40]);
        let fs = Filesystem::new(&image).unwrap();
        assert_eq!(end, fs.end_of_archive());
        assert_eq!(None, fs.trailing_data());
    }

    #[test]
    fn test_trailing_data_after_alignment() {
        let mut image = rom(&[(b"UVMD", 0)], &[(0, form(b"UVMD", &comm(&[1])))]);
        image.resize(align16(image.len()), 0);
        let aligned = image.len();
        image.extend(b"interesting");
        let fs = Filesystem::new(&image).unwrap();
        assert_eq!(
            Some((aligned, b"interesting".as_slice())),
            fs.trailing_data()
        );
    }

    #[test]
    fn test_trailing_data_with_dirty_alignment() {
        let mut image = rom(&[(b"UVMD", 0)], &[(0, form(b"UVMD", &comm(&[1])))]);
        let end = image.len();
        image.push(0x5A);
        image.resize(align16(end), 0);
        let aligned = image.len();
        image.extend([0xFF; 0x20]);
        let fs = Filesystem::new(&image).unwrap();
        assert_ne!(end, aligned);
        assert_eq!(Some((aligned, [0xFF; 0x20].as_slice())), fs.trailing_data());
    }
}
