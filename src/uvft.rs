// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! `UVFT` fonts.
//!
//! A font file (not to be confused with the file table, which shares its
//! tag) packs its glyphs into one or more texel sheets. Each character is a
//! rectangle cut out of a sheet.
//!
//! | Section | Contents                                            |
//! |---------|-----------------------------------------------------|
//! | `FRMT`  | `u32` color format, `u32` texel size (RDP codes)    |
//! | `IMAG`  | Texel sheet, one section per sheet                  |
//! | `STRG`  | One byte per character: its ASCII code              |
//! | `BITM`  | One 16 byte descriptor per character                |
//!
//! ## Character descriptor
//!
//! | Offset | Type  | Description                                       |
//! |--------|-------|---------------------------------------------------|
//! | 0      | `u16` | Width                                             |
//! | 2      | `u16` | Texels per line of the sheet                      |
//! | 4      | `u16` | First texel of the character within the sheet     |
//! | 6      | `u32` | Zero                                              |
//! | 10     | `u16` | Sheet index                                       |
//! | 12     | `u16` | Height                                            |
//! | 14     | `u16` | Zero                                              |

use binrw::binrw;
use image::RgbaImage;
use log::trace;

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};
use crate::texels::{self, BitSize, ColorFormat, Layout};

#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FormatRecord {
    format: u32,
    size: u32,
}

impl FormatRecord {
    const SIZE: usize = 8;
}

#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CharacterRecord {
    width: u16,
    texels_per_line: u16,
    start_texel: u16,
    reserved: u32,
    image: u16,
    height: u16,
    padding: u16,
}

impl CharacterRecord {
    const SIZE: usize = 16;
}

/// One glyph of a [Font].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Character {
    /// Position in `BITM`, and in `STRG`.
    pub index: usize,
    pub width: u16,
    pub height: u16,
    pub texels_per_line: u16,
    pub start_texel: u16,
    /// Which `IMAG` section holds the texels.
    pub image: u16,
}

/// A parsed `UVFT` font.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Font<'a> {
    pub format: ColorFormat,
    pub size: BitSize,
    pub characters: Vec<Character>,
    ascii: &'a [u8],
    images: Vec<&'a [u8]>,
}

fn code<T: TryFrom<u8, Error = FormatError>>(value: u32, what: &str) -> Result<T> {
    let value = u8::try_from(value)
        .map_err(|_| FormatError::UnexpectedStructure(format!("unknown {what} {value}")))?;
    Ok(T::try_from(value)?)
}

impl<'a> Font<'a> {
    /// Parses a font from its `FRMT`, `BITM` and `STRG` sections and its
    /// `IMAG` sections in order.
    pub fn parse(
        frmt: &[u8],
        bitm: &[u8],
        ascii: &'a [u8],
        images: Vec<&'a [u8]>,
    ) -> Result<Self> {
        if frmt.len() != FormatRecord::SIZE {
            return Err(FormatError::LengthMismatch {
                what: "FRMT section",
                expected: FormatRecord::SIZE,
                actual: frmt.len(),
            }
            .into());
        }
        let record: FormatRecord = ByteCursor::new(frmt).read_record(FormatRecord::SIZE)?;
        let format = code::<ColorFormat>(record.format, "color format")?;
        let size = code::<BitSize>(record.size, "texel size")?;

        let mut cursor = ByteCursor::new(bitm);
        let mut characters = Vec::with_capacity(bitm.len() / CharacterRecord::SIZE);
        while cursor.remaining() >= CharacterRecord::SIZE {
            let offset = cursor.position();
            let record: CharacterRecord = cursor.read_record(CharacterRecord::SIZE)?;
            if record.reserved != 0 || record.padding != 0 {
                return Err(FormatError::UnexpectedStructure(format!(
                    "character descriptor at {offset:#x} has non-zero reserved fields"
                ))
                .into());
            }
            if record.image as usize >= images.len() {
                return Err(FormatError::UnexpectedStructure(format!(
                    "character {} is on sheet {} of {}",
                    characters.len(),
                    record.image,
                    images.len()
                ))
                .into());
            }
            characters.push(Character {
                index: characters.len(),
                width: record.width,
                height: record.height,
                texels_per_line: record.texels_per_line,
                start_texel: record.start_texel,
                image: record.image,
            });
        }
        if cursor.remaining() != 0 {
            return Err(FormatError::Truncated {
                offset: cursor.position(),
                need: CharacterRecord::SIZE,
                have: cursor.remaining(),
            }
            .into());
        }

        Ok(Self {
            format,
            size,
            characters,
            ascii,
            images,
        })
    }

    /// The ASCII character `character` draws, if `STRG` names one.
    pub fn ascii(&self, character: &Character) -> Option<char> {
        self.ascii.get(character.index).map(|&b| char::from(b))
    }

    /// A file name for `character`: its two digit index, followed by the
    /// character in parentheses when it is allowed in a file name.
    pub fn file_name(&self, character: &Character) -> String {
        let mut name = format!("{:02}", character.index);
        if let Some(c) = self.ascii(character).filter(|&c| is_file_name_char(c)) {
            name.push_str(&format!(" ({c})"));
        }
        name
    }

    /// Cuts `character` out of its sheet.
    pub fn to_image(&self, character: &Character) -> Result<RgbaImage> {
        let sheet = self.images[character.image as usize];
        let start = character.start_texel as usize;
        let mut data = match self.size {
            BitSize::Bits4 if start % 2 == 1 => nibbles_from(sheet, start)?,
            _ => sheet
                .get(self.size.bytes_for(start)..)
                .ok_or(FormatError::Truncated {
                    offset: self.size.bytes_for(start),
                    need: 1,
                    have: 0,
                })?
                .to_vec(),
        };

        let width = character.width as u32;
        let height = character.height as u32;
        let bytes_per_line = self.size.bytes_for(character.texels_per_line as usize);
        // the last row of a character may end before the sheet's last row
        let needed = bytes_per_line * height as usize;
        if data.len() < needed {
            data.resize(needed, 0);
        }

        trace!(
            "character {} {width}x{height} from texel {start} of sheet {}",
            character.index,
            character.image
        );
        texels::decode(
            &data,
            self.format,
            self.size,
            &Layout {
                width,
                height,
                bytes_per_line,
                flip: false,
                deinterleave: false,
            },
            None,
        )
    }

    /// Every character with its file name.
    pub fn to_images(&self) -> Result<Vec<(String, RgbaImage)>> {
        self.characters
            .iter()
            .map(|c| Ok((self.file_name(c), self.to_image(c)?)))
            .collect()
    }
}

/// Re-aligns 4-bit texel data so that the texel at `start`, an odd nibble,
/// becomes the high nibble of the first byte.
fn nibbles_from(data: &[u8], start: usize) -> Result<Vec<u8>> {
    let first = start / 2;
    let Some(&last) = data.get(first..).and_then(|rest| rest.last()) else {
        return Err(FormatError::Truncated {
            offset: first,
            need: 1,
            have: data.len().saturating_sub(first),
        }
        .into());
    };
    let mut out: Vec<u8> = data[first..]
        .windows(2)
        .map(|pair| (pair[0] << 4) | (pair[1] >> 4))
        .collect();
    out.push(last << 4);
    Ok(out)
}

fn is_file_name_char(c: char) -> bool {
    !c.is_control() && !matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?' | '\\' | '/')
}
