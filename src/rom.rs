// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Cartridge image byte order.
//!
//! Dumps circulate in three byte orders, told apart by the first word of the
//! cartridge header:
//!
//! | Format | Magic         | Layout                    |
//! |--------|---------------|---------------------------|
//! | `.z64` | `80 37 12 40` | big-endian                |
//! | `.v64` | `37 80 40 12` | 16-bit words byte swapped |
//! | `.n64` | `40 12 37 80` | 32-bit words little-endian|
//!
//! Everything else in this crate expects `.z64` order.

use std::fmt;

use log::debug;

/// The byte order of a cartridge image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RomFormat {
    Z64,
    V64,
    N64,
    /// No recognized cartridge header; used as is.
    Unknown,
}

impl RomFormat {
    const MAGIC_Z64: [u8; 4] = [0x80, 0x37, 0x12, 0x40];
    const MAGIC_V64: [u8; 4] = [0x37, 0x80, 0x40, 0x12];
    const MAGIC_N64: [u8; 4] = [0x40, 0x12, 0x37, 0x80];

    pub fn detect(rom: &[u8]) -> Self {
        match rom.get(0..4) {
            Some(m) if m == Self::MAGIC_Z64 => Self::Z64,
            Some(m) if m == Self::MAGIC_V64 => Self::V64,
            Some(m) if m == Self::MAGIC_N64 => Self::N64,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RomFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Z64 => write!(f, "z64"),
            Self::V64 => write!(f, "v64"),
            Self::N64 => write!(f, "n64"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Converts `rom` to big-endian order in place, returning the detected
/// format.
pub fn normalize(rom: &mut [u8]) -> RomFormat {
    let format = RomFormat::detect(rom);
    match format {
        RomFormat::Z64 | RomFormat::Unknown => {}
        RomFormat::V64 => {
            for pair in rom.chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }
        RomFormat::N64 => {
            for word in rom.chunks_exact_mut(4) {
                word.reverse();
            }
        }
    }
    debug!("ROM byte order {format}");
    format
}
