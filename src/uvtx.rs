// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! `UVTX` texture files.
//!
//! A texture file holds a single section laid out as:
//!
//! | Offset | Type         | Description                                |
//! |--------|--------------|--------------------------------------------|
//! | 0      | `i16`        | Texel data length                          |
//! | 2      | `i16`        | Command count                              |
//! | 4      | `[f32; 6]`   | Unknown                                    |
//! | 0x1C   | `[u8]`       | Texel data                                 |
//! |        | `[u64]`      | Texture display list, see [crate::rdp]     |
//! |        | `u16`        | Width                                      |
//! |        | `u16`        | Height                                     |
//! |        | `[u8; 0x15]` | Unknown                                    |
//! |        | `u8`         | Mip map count                              |
//! |        | `[[u16; 16]]`| RGBA5551 palettes                          |
//! |        | `u16`        | Always zero                                |


use binrw::binrw;
use image::RgbaImage;

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};
use crate::rdp::{TextureOp, TextureState};
use crate::texels::Palette;

#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq)]
struct Header {
    data_size: i16,
    command_count: i16,
    unknown: [f32; 6],
}

impl Header {
    const SIZE: usize = 0x1C;
}

#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Footer {
    width: u16,
    height: u16,
    unknown: [u8; 0x15],
    mip_map_count: u8,
}

impl Footer {
    const SIZE: usize = 0x1A;
}

const PALETTE_SIZE: usize = 32;

/// A parsed `UVTX` section.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    unknown_floats: [f32; 6],
    texels: Vec<u8>,
    commands: Vec<u64>,
    width: u16,
    height: u16,
    unknown: [u8; 0x15],
    mip_map_count: u8,
    palettes: Vec<Palette>,
}

impl Texture {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let header: Header = cursor.read_record(Header::SIZE)?;

        let data_size = usize::try_from(header.data_size).map_err(|_| {
            FormatError::UnexpectedStructure(format!("texel length {}", header.data_size))
        })?;
        let command_count = usize::try_from(header.command_count).map_err(|_| {
            FormatError::UnexpectedStructure(format!("command count {}", header.command_count))
        })?;

        let texels = cursor.read_bytes(data_size)?.to_vec();
        let commands = (0..command_count)
            .map(|_| cursor.read_u64())
            .collect::<Result<Vec<_>>>()?;
        let footer: Footer = cursor.read_record(Footer::SIZE)?;

        let palette_end = data.len().checked_sub(2).filter(|&end| end >= cursor.position());
        let Some(palette_end) = palette_end else {
            return Err(FormatError::Truncated {
                offset: cursor.position(),
                need: 2,
                have: cursor.remaining(),
            }
            .into());
        };

        let palette_count = (palette_end - cursor.position()) / PALETTE_SIZE;
        let mut palettes = Vec::with_capacity(palette_count);
        for _ in 0..palette_count {
            let mut palette = [0u16; 16];
            for entry in palette.iter_mut() {
                *entry = cursor.read_u16()?;
            }
            palettes.push(palette);
        }

        cursor.seek(palette_end);
        let trailer = cursor.read_u16()?;
        if trailer != 0 {
            return Err(FormatError::UnexpectedStructure(format!(
                "texture ends with {trailer:#06x} instead of zero"
            ))
            .into());
        }

        Ok(Self {
            unknown_floats: header.unknown,
            texels,
            commands,
            width: footer.width,
            height: footer.height,
            unknown: footer.unknown,
            mip_map_count: footer.mip_map_count,
            palettes,
        })
    }

    pub fn texels(&self) -> &[u8] {
        &self.texels
    }

    pub fn commands(&self) -> &[u64] {
        &self.commands
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// 1 for a texture without mip maps.
    pub fn mip_map_count(&self) -> u8 {
        self.mip_map_count
    }

    pub fn palettes(&self) -> &[Palette] {
        &self.palettes
    }

    pub fn unknown_floats(&self) -> &[f32; 6] {
        &self.unknown_floats
    }

    pub fn unknown_bytes(&self) -> &[u8] {
        &self.unknown
    }

    /// Runs the display list against the texel data.
    pub fn replay(&self) -> Result<TextureState> {
        TextureState::run(&self.commands, &self.texels)
    }

    /// Decodes the tile the display list selects for drawing, returning the
    /// tile number alongside the image. Mip map levels are not decoded.
    pub fn to_image(&self) -> Result<(u8, RgbaImage)> {
        let state = self.replay()?;
        let image = state.render(self.width, self.height, &self.palettes)?;
        let tile = state.render_tile().unwrap_or_default();
        Ok((tile, image))
    }

    /// A disassembly of the display list, one command per line.
    pub fn listing(&self) -> Result<String> {
        let mut listing = String::new();
        for &word in &self.commands {
            let op = TextureOp::decode(word)?;
            listing.push_str(&format!("{word:016X} | {op}\n"));
        }
        Ok(listing)
    }
}
