// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Texel decoding.
//!
//! Converts texel data in any of the RDP's texture formats to RGBA8.
//!
//! | Format | 4-bit | 8-bit | 16-bit | 32-bit |
//! |--------|-------|-------|--------|--------|
//! | RGBA   |       |       | 5551   | 8888   |
//! | CI     | ✓     |       |        |        |
//! | IA     | 3+1   | 4+4   | 8+8    |        |
//! | I      | ✓     | ✓     |        |        |
//!
//! Color indexed texels look up a 16 entry RGBA5551 palette.

use std::fmt;

use image::{Rgba, RgbaImage};

use crate::error::{FormatError, Result};

/// The `fmt` field of a tile descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorFormat {
    Rgba = 0,
    Yuv = 1,
    Ci = 2,
    Ia = 3,
    I = 4,
}

impl TryFrom<u8> for ColorFormat {
    type Error = FormatError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Rgba),
            1 => Ok(Self::Yuv),
            2 => Ok(Self::Ci),
            3 => Ok(Self::Ia),
            4 => Ok(Self::I),
            _ => Err(FormatError::UnexpectedStructure(format!(
                "unknown color format {value}"
            ))),
        }
    }
}

impl fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Rgba => write!(f, "RGBA"),
            Self::Yuv => write!(f, "YUV"),
            Self::Ci => write!(f, "CI"),
            Self::Ia => write!(f, "IA"),
            Self::I => write!(f, "I"),
        }
    }
}

/// The `siz` field of a tile descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitSize {
    Bits4 = 0,
    Bits8 = 1,
    Bits16 = 2,
    Bits32 = 3,
}

impl BitSize {
    /// Converts a texel width in bits.
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            4 => Ok(Self::Bits4),
            8 => Ok(Self::Bits8),
            16 => Ok(Self::Bits16),
            32 => Ok(Self::Bits32),
            _ => Err(FormatError::UnexpectedStructure(format!("{bits}-bit texels")).into()),
        }
    }

    pub fn bits(&self) -> u32 {
        4 << (*self as u32)
    }

    /// Whole bytes per texel, `None` for 4-bit texels.
    pub fn bytes_per_texel(&self) -> Option<usize> {
        match self {
            Self::Bits4 => None,
            _ => Some(self.bits() as usize / 8),
        }
    }

    /// Bytes occupied by `texels` texels, rounded up.
    pub fn bytes_for(&self, texels: usize) -> usize {
        (texels * self.bits() as usize).div_ceil(8)
    }
}

impl TryFrom<u8> for BitSize {
    type Error = FormatError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Bits4),
            1 => Ok(Self::Bits8),
            2 => Ok(Self::Bits16),
            3 => Ok(Self::Bits32),
            _ => Err(FormatError::UnexpectedStructure(format!(
                "unknown texel size {value}"
            ))),
        }
    }
}

/// A 16 entry RGBA5551 palette.
pub type Palette = [u16; 16];

/// Shape of the texel data handed to [decode].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    /// Stride between rows. Must be a multiple of 8.
    pub bytes_per_line: usize,
    /// Write the first row at the bottom of the image.
    pub flip: bool,
    /// Undo TMEM's odd row word swapping.
    pub deinterleave: bool,
}

/// Expands an RGBA5551 texel.
pub fn rgba16(texel: u16) -> [u8; 4] {
    let expand = |v: u16| ((v << 3) | (v >> 2)) as u8;
    let r = expand(texel >> 11);
    let g = expand((texel >> 6) & 0x1F);
    let b = expand((texel >> 1) & 0x1F);
    let a = if texel & 1 != 0 { 0xFF } else { 0x00 };
    [r, g, b, a]
}

fn unsupported(format: ColorFormat, size: BitSize) -> FormatError {
    FormatError::UnsupportedTexelFormat {
        format: format.to_string(),
        bits: size.bits(),
    }
}

fn nibble(line: &[u8], x: usize) -> u8 {
    let byte = line[x / 2];
    if x % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0F
    }
}

fn texel(
    line: &[u8],
    x: usize,
    format: ColorFormat,
    size: BitSize,
    palette: Option<&Palette>,
) -> Result<[u8; 4]> {
    let rgba = match (format, size) {
        (ColorFormat::Ci, BitSize::Bits4) => {
            let palette = palette.ok_or(FormatError::MissingPalette)?;
            rgba16(palette[nibble(line, x) as usize])
        }
        (ColorFormat::I, BitSize::Bits4) => {
            let v = nibble(line, x);
            let i = v | v << 4;
            [i, i, i, i]
        }
        (ColorFormat::I, BitSize::Bits8) => {
            let i = line[x];
            [i, i, i, i]
        }
        (ColorFormat::Ia, BitSize::Bits4) => {
            let v = nibble(line, x);
            let i3 = v >> 1;
            let i = (i3 << 5) | (i3 << 2) | (i3 >> 1);
            let a = if v & 1 != 0 { 0xFF } else { 0x00 };
            [i, i, i, a]
        }
        (ColorFormat::Ia, BitSize::Bits8) => {
            let v = line[x];
            let (i, a) = (v >> 4, v & 0x0F);
            let i = i | i << 4;
            [i, i, i, a | a << 4]
        }
        (ColorFormat::Ia, BitSize::Bits16) => {
            let (i, a) = (line[x * 2], line[x * 2 + 1]);
            [i, i, i, a]
        }
        (ColorFormat::Rgba, BitSize::Bits16) => {
            rgba16(u16::from_be_bytes([line[x * 2], line[x * 2 + 1]]))
        }
        (ColorFormat::Rgba, BitSize::Bits32) => {
            let p = &line[x * 4..x * 4 + 4];
            [p[0], p[1], p[2], p[3]]
        }
        _ => return Err(unsupported(format, size).into()),
    };
    Ok(rgba)
}

/// Decodes `data` into an RGBA8 image.
///
/// Color indexed data must be 4-bit and requires a palette. Rows narrower
/// than `width` texels or data shorter than `height` rows are errors.
pub fn decode(
    data: &[u8],
    format: ColorFormat,
    size: BitSize,
    layout: &Layout,
    palette: Option<&Palette>,
) -> Result<RgbaImage> {
    let Layout {
        width,
        height,
        bytes_per_line,
        flip,
        deinterleave,
    } = *layout;

    if bytes_per_line % 8 != 0 {
        return Err(FormatError::InvalidLayout(format!(
            "{bytes_per_line} bytes per line is not a multiple of 8"
        ))
        .into());
    }

    match (format, size) {
        (ColorFormat::Ci, BitSize::Bits4) if palette.is_none() => {
            return Err(FormatError::MissingPalette.into())
        }
        (ColorFormat::Ci, BitSize::Bits4)
        | (ColorFormat::I, BitSize::Bits4 | BitSize::Bits8)
        | (ColorFormat::Ia, BitSize::Bits4 | BitSize::Bits8 | BitSize::Bits16)
        | (ColorFormat::Rgba, BitSize::Bits16 | BitSize::Bits32) => {}
        _ => return Err(unsupported(format, size).into()),
    }

    if size.bytes_for(width as usize) > bytes_per_line {
        return Err(FormatError::InvalidLayout(format!(
            "{width} {}-bit texels do not fit in {bytes_per_line} bytes",
            size.bits()
        ))
        .into());
    }

    let needed = bytes_per_line * height as usize;
    if data.len() < needed {
        return Err(FormatError::Truncated {
            offset: 0,
            need: needed,
            have: data.len(),
        }
        .into());
    }

    let mut image = RgbaImage::new(width, height);
    let mut line = vec![0u8; bytes_per_line];
    for row in 0..height {
        let start = row as usize * bytes_per_line;
        line.copy_from_slice(&data[start..start + bytes_per_line]);

        if deinterleave && row % 2 == 1 {
            for word in line.chunks_exact_mut(8) {
                word.rotate_left(4);
            }
        }

        let y = if flip { height - 1 - row } else { row };
        for x in 0..width {
            let rgba = texel(&line, x as usize, format, size, palette)?;
            image.put_pixel(x, y, Rgba(rgba));
        }
    }

    Ok(image)
}
