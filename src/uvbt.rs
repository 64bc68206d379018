// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! `UVBT` blit images.
//!
//! Blits are screen images too large for TMEM, stored as a grid of tiles the
//! game loads one at a time.
//!
//! | Offset | Type  | Description                                       |
//! |--------|-------|---------------------------------------------------|
//! | 0      | `u16` | Color format                                      |
//! | 2      | `u16` | Bits per texel                                    |
//! | 4      | `u16` | Width                                             |
//! | 6      | `u16` | Texels per line                                   |
//! | 8      | `u16` | Height                                            |
//! | 10     | `u16` | Tile width                                        |
//! | 12     | `u16` | Tile height                                       |
//! | 14     | `[u8]`| Tiles, left to right then top to bottom           |
//!
//! Tiles in the last row are only as tall as the rows left in the image.
//! The final tile may be cut short by the end of the data.

use binrw::binrw;
use image::{imageops, RgbaImage};
use log::trace;

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};
use crate::texels::{self, BitSize, ColorFormat, Layout};

#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Header {
    format: u16,
    bits: u16,
    width: u16,
    texels_per_line: u16,
    height: u16,
    tile_width: u16,
    tile_height: u16,
}

impl Header {
    const SIZE: usize = 14;
}

/// A parsed `UVBT` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blit<'a> {
    pub format: ColorFormat,
    pub size: BitSize,
    pub width: u16,
    pub texels_per_line: u16,
    pub height: u16,
    pub tile_width: u16,
    pub tile_height: u16,
    data: &'a [u8],
}

impl<'a> Blit<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let header: Header = cursor.read_record(Header::SIZE)?;

        let format = u8::try_from(header.format)
            .map_err(|_| {
                FormatError::UnexpectedStructure(format!("unknown color format {}", header.format))
            })
            .and_then(ColorFormat::try_from)?;
        let size = BitSize::from_bits(header.bits as u32)?;

        if header.tile_width == 0 || header.tile_height == 0 {
            return Err(FormatError::InvalidLayout(format!(
                "{}x{} tiles",
                header.tile_width, header.tile_height
            ))
            .into());
        }

        Ok(Self {
            format,
            size,
            width: header.width,
            texels_per_line: header.texels_per_line,
            height: header.height,
            tile_width: header.tile_width,
            tile_height: header.tile_height,
            data: &data[Header::SIZE..],
        })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Assembles the tiles into a single image.
    pub fn to_image(&self) -> Result<RgbaImage> {
        let (width, height) = (self.width as u32, self.height as u32);
        let tile_width = self.tile_width as u32;
        let bytes_per_line = self.size.bytes_for(tile_width as usize);
        let deinterleave = self.size != BitSize::Bits32;

        let mut image = RgbaImage::new(width, height);
        let mut tile_height = self.tile_height as u32;
        let (mut x, mut y) = (0u32, 0u32);
        let mut offset = 0;

        while offset < self.data.len() && y < height {
            tile_height = tile_height.min(height - y);
            let tile_bytes = bytes_per_line * tile_height as usize;

            let end = (offset + tile_bytes).min(self.data.len());
            let mut tile_data = self.data[offset..end].to_vec();
            tile_data.resize(tile_bytes, 0);

            trace!("tile at ({x}, {y}) from {offset:#x}");
            let tile = texels::decode(
                &tile_data,
                self.format,
                self.size,
                &Layout {
                    width: tile_width,
                    height: tile_height,
                    bytes_per_line,
                    flip: false,
                    deinterleave,
                },
                None,
            )?;
            imageops::replace(&mut image, &tile, x as i64, y as i64);

            offset += tile_bytes;
            x += tile_width;
            if x >= width {
                x = 0;
                y += tile_height;
            }
        }

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn blit_bytes(header: [u16; 7], data: &[u8]) -> Vec<u8> {
        let mut bytes: Vec<u8> = header.iter().flat_map(|v| v.to_be_bytes()).collect();
        bytes.extend(data);
        bytes
    }

    #[test]
    fn test_parse_header() {
        let bytes = blit_bytes([4, 8, 10, 16, 6, 8, 4], &[0xAA; 4]);
        let blit = Blit::parse(&bytes).expect("parse");
        assert_eq!(ColorFormat::I, blit.format);
        assert_eq!(BitSize::Bits8, blit.size);
        assert_eq!((10, 16, 6), (blit.width, blit.texels_per_line, blit.height));
        assert_eq!((8, 4), (blit.tile_width, blit.tile_height));
        assert_eq!(&[0xAA; 4], blit.data());
    }

    #[test]
    fn test_tiles_are_placed_and_clipped() {
        // 10x3 8-bit intensity image in 8x2 tiles: two tiles per row, the
        // second clipped to 2 columns, and a last row one texel tall.
        let mut data = Vec::new();
        for tile in 0..4u8 {
            let rows = if tile < 2 { 2 } else { 1 };
            for row in 0..rows {
                let mut line = [tile * 0x10 + row; 8];
                if row % 2 == 1 {
                    line.rotate_left(4);
                }
                data.extend(line);
            }
        }
        let bytes = blit_bytes([4, 8, 10, 10, 3, 8, 2], &data);
        let image = Blit::parse(&bytes)
            .and_then(|b| b.to_image())
            .expect("image");

        assert_eq!((10, 3), image.dimensions());
        assert_eq!(0x00, image.get_pixel(0, 0).0[0]);
        assert_eq!(0x01, image.get_pixel(7, 1).0[0]);
        assert_eq!(0x10, image.get_pixel(8, 0).0[0]);
        assert_eq!(0x11, image.get_pixel(9, 1).0[0]);
        assert_eq!(0x20, image.get_pixel(0, 2).0[0]);
        assert_eq!(0x30, image.get_pixel(9, 2).0[0]);
    }

    #[test]
    fn test_short_final_tile_is_padded() {
        // one 8x2 tile with only the first row present
        let bytes = blit_bytes([4, 8, 8, 8, 2, 8, 2], &[0x7F; 8]);
        let image = Blit::parse(&bytes)
            .and_then(|b| b.to_image())
            .expect("image");
        assert_eq!(0x7F, image.get_pixel(3, 0).0[0]);
        assert_eq!(0x00, image.get_pixel(3, 1).0[0]);
    }

    #[test]
    fn test_thirty_two_bit_rows_are_not_swapped() {
        let mut data = Vec::new();
        for texel in 0..4u8 {
            data.extend([texel, 0, 0, 0xFF]);
        }
        let bytes = blit_bytes([0, 32, 2, 2, 2, 2, 2], &data);
        let image = Blit::parse(&bytes)
            .and_then(|b| b.to_image())
            .expect("image");
        assert_eq!([2, 0, 0, 0xFF], image.get_pixel(0, 1).0);
        assert_eq!([3, 0, 0, 0xFF], image.get_pixel(1, 1).0);
    }

    #[test]
    fn test_bad_bit_depth() {
        let bytes = blit_bytes([0, 12, 8, 8, 8, 8, 8], &[]);
        assert!(matches!(
            Blit::parse(&bytes),
            Err(Error::Format(FormatError::UnexpectedStructure(_)))
        ));
    }

    #[test]
    fn test_empty_tiles() {
        let bytes = blit_bytes([0, 16, 8, 8, 8, 0, 8], &[]);
        assert!(matches!(
            Blit::parse(&bytes),
            Err(Error::Format(FormatError::InvalidLayout(_)))
        ));
    }
}
