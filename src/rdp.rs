// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Texture setup as RDP display list commands.
//!
//! Texture files carry the short F3DEX2 display list the game runs to load
//! the texture into TMEM and configure the tile used for drawing. Replaying
//! it is the only reliable way to recover the image's format, stride and
//! visible bounds.
//!
//! Each command is one big-endian 64-bit word whose top byte is the opcode.
//! Operands are bit fields numbered from the least significant bit of the
//! whole word:
//!
//! | Opcode | Command            | Operands                                        |
//! |--------|--------------------|-------------------------------------------------|
//! | `D7`   | `G_TEXTURE`        | level 43:3, tile 40:3, on 33, s 16:16, t 0:16   |
//! | `E3`   | `G_SETOTHERMODE_H` | shift 40:8, length 32:8, value in 0:32          |
//! | `E6`   | `G_RDPLOADSYNC`    |                                                 |
//! | `E8`   | `G_RDPTILESYNC`    |                                                 |
//! | `F2`   | `G_SETTILESIZE`    | sl 44:12, tl 32:12, tile 24:3, sh 12:12, th 0:12|
//! | `F3`   | `G_LOADBLOCK`      | sl 44:12, tl 32:12, tile 24:3, sh 12:12, dxt 0:12|
//! | `F5`   | `G_SETTILE`        | fmt 53:3, siz 51:2, line 41:9, tmem 32:9, ...   |
//! | `FA`   | `G_SETPRIMCOLOR`   | min level 40:8, fraction 32:8, rgba 0:32        |
//! | `FB`   | `G_SETENVCOLOR`    | rgba 0:32                                       |
//! | `FC`   | `G_SETCOMBINE`     |                                                 |
//! | `FD`   | `G_SETTIMG`        | fmt 53:3, siz 51:2, address 0:25                |
//! | `DF`   | `G_ENDDL`          |                                                 |

use std::fmt;

use image::RgbaImage;
use log::{trace, warn};

use crate::error::{FormatError, Result};
use crate::texels::{self, BitSize, ColorFormat, Layout, Palette};

pub const G_TEXTURE: u8 = 0xD7;
pub const G_ENDDL: u8 = 0xDF;
pub const G_SETOTHERMODE_H: u8 = 0xE3;
pub const G_RDPLOADSYNC: u8 = 0xE6;
pub const G_RDPTILESYNC: u8 = 0xE8;
pub const G_SETTILESIZE: u8 = 0xF2;
pub const G_LOADBLOCK: u8 = 0xF3;
pub const G_SETTILE: u8 = 0xF5;
pub const G_SETPRIMCOLOR: u8 = 0xFA;
pub const G_SETENVCOLOR: u8 = 0xFB;
pub const G_SETCOMBINE: u8 = 0xFC;
pub const G_SETTIMG: u8 = 0xFD;

/// Size of texture memory in bytes.
pub const TMEM_SIZE: usize = 4096;

/// Number of tile descriptors.
pub const TILE_COUNT: usize = 8;

fn bits(word: u64, shift: u32, width: u32) -> u64 {
    (word >> shift) & ((1 << width) - 1)
}

fn bit(word: u64, shift: u32) -> bool {
    bits(word, shift, 1) != 0
}

/// A field of the high half of the RDP other modes word, named by its
/// shift.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtherModeH {
    BlendMask,
    AlphaDither,
    RgbDither,
    CombKey,
    TextConv,
    TextFilt,
    TextLut,
    TextLod,
    TextDetail,
    TextPersp,
    CycleType,
    ColorDither,
    Pipeline,
}

impl OtherModeH {
    fn from_shift(shift: u32) -> Option<Self> {
        Some(match shift {
            0 => Self::BlendMask,
            4 => Self::AlphaDither,
            6 => Self::RgbDither,
            8 => Self::CombKey,
            9 => Self::TextConv,
            12 => Self::TextFilt,
            14 => Self::TextLut,
            16 => Self::TextLod,
            17 => Self::TextDetail,
            19 => Self::TextPersp,
            20 => Self::CycleType,
            22 => Self::ColorDither,
            23 => Self::Pipeline,
            _ => return None,
        })
    }

    pub fn shift(&self) -> u32 {
        match self {
            Self::BlendMask => 0,
            Self::AlphaDither => 4,
            Self::RgbDither => 6,
            Self::CombKey => 8,
            Self::TextConv => 9,
            Self::TextFilt => 12,
            Self::TextLut => 14,
            Self::TextLod => 16,
            Self::TextDetail => 17,
            Self::TextPersp => 19,
            Self::CycleType => 20,
            Self::ColorDither => 22,
            Self::Pipeline => 23,
        }
    }
}

impl fmt::Display for OtherModeH {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::BlendMask => "G_MDSFT_BLENDMASK",
            Self::AlphaDither => "G_MDSFT_ALPHADITHER",
            Self::RgbDither => "G_MDSFT_RGBDITHER",
            Self::CombKey => "G_MDSFT_COMBKEY",
            Self::TextConv => "G_MDSFT_TEXTCONV",
            Self::TextFilt => "G_MDSFT_TEXTFILT",
            Self::TextLut => "G_MDSFT_TEXTLUT",
            Self::TextLod => "G_MDSFT_TEXTLOD",
            Self::TextDetail => "G_MDSFT_TEXTDETAIL",
            Self::TextPersp => "G_MDSFT_TEXTPERSP",
            Self::CycleType => "G_MDSFT_CYCLETYPE",
            Self::ColorDither => "G_MDSFT_COLORDITHER",
            Self::Pipeline => "G_MDSFT_PIPELINE",
        };
        write!(f, "{name}")
    }
}

/// Texture coordinate addressing for one axis of a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileAxis {
    pub clamp: bool,
    pub mirror: bool,
    pub mask: u8,
    pub shift: u8,
}

impl fmt::Display for TileAxis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "clamp={} mirror={} mask={} shift={}",
            self.clamp, self.mirror, self.mask, self.shift
        )
    }
}

/// A tile descriptor as written by `G_SETTILE` and sized by
/// `G_SETTILESIZE` or `G_LOADBLOCK`.
///
/// Bounds are 10.2 fixed point texel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileDescriptor {
    pub format: ColorFormat,
    pub size: BitSize,
    /// Row stride in 64-bit words.
    pub words_per_line: u16,
    /// Start of the tile in TMEM in 64-bit words.
    pub tmem_words: u16,
    /// Palette number for color indexed tiles, 0 for none.
    pub palette: u8,
    pub s: TileAxis,
    pub t: TileAxis,
    pub s_lo: u32,
    pub t_lo: u32,
    pub s_hi: u32,
    pub t_hi: u32,
}

impl Default for TileDescriptor {
    fn default() -> Self {
        Self {
            format: ColorFormat::Rgba,
            size: BitSize::Bits16,
            words_per_line: 0,
            tmem_words: 0,
            palette: 0,
            s: TileAxis::default(),
            t: TileAxis::default(),
            s_lo: 0,
            t_lo: 0,
            s_hi: 0,
            t_hi: 0,
        }
    }
}

impl TileDescriptor {
    fn decode(word: u64) -> std::result::Result<Self, FormatError> {
        Ok(Self {
            format: ColorFormat::try_from(bits(word, 53, 3) as u8)?,
            size: BitSize::try_from(bits(word, 51, 2) as u8)?,
            words_per_line: bits(word, 41, 9) as u16,
            tmem_words: bits(word, 32, 9) as u16,
            palette: bits(word, 20, 4) as u8,
            t: TileAxis {
                clamp: bit(word, 19),
                mirror: bit(word, 18),
                mask: bits(word, 14, 4) as u8,
                shift: bits(word, 10, 4) as u8,
            },
            s: TileAxis {
                clamp: bit(word, 9),
                mirror: bit(word, 8),
                mask: bits(word, 4, 4) as u8,
                shift: bits(word, 0, 4) as u8,
            },
            ..Default::default()
        })
    }

    /// Visible width and height in texels. Bounds that do not describe a
    /// whole number of texels are an error.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let span = |lo: u32, hi: u32, axis: &str| {
            let diff = hi.checked_sub(lo).filter(|d| d % 4 == 0).ok_or_else(|| {
                FormatError::InvalidLayout(format!(
                    "tile {axis} bounds {}..{} are not a whole number of texels",
                    quarters(lo),
                    quarters(hi)
                ))
            })?;
            Ok::<u32, FormatError>(diff / 4 + 1)
        };
        Ok((
            span(self.s_lo, self.s_hi, "s")?,
            span(self.t_lo, self.t_hi, "t")?,
        ))
    }
}

/// Formats a 10.2 fixed point value.
fn quarters(value: u32) -> String {
    match value % 4 {
        0 => format!("{}", value / 4),
        1 => format!("{}.25", value / 4),
        2 => format!("{}.5", value / 4),
        _ => format!("{}.75", value / 4),
    }
}

/// A decoded texture command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureOp {
    Texture {
        mip_levels: u8,
        tile: u8,
        on: bool,
        scale_s: f32,
        scale_t: f32,
    },
    SetOtherModeH {
        mode: OtherModeH,
        length: u32,
        value: u32,
    },
    LoadSync,
    TileSync,
    SetCombine(u64),
    SetTileSize {
        tile: u8,
        s_lo: u16,
        t_lo: u16,
        s_hi: u16,
        t_hi: u16,
    },
    LoadBlock {
        tile: u8,
        s_lo: u16,
        t_lo: u16,
        s_hi: u16,
        dxt: u16,
    },
    SetTile {
        tile: u8,
        descriptor: TileDescriptor,
    },
    SetPrimColor {
        min_level: f32,
        level_fraction: f32,
        rgba: [u8; 4],
    },
    SetEnvColor([u8; 4]),
    SetTextureImage {
        format: ColorFormat,
        size: BitSize,
        address: u32,
    },
    EndDl,
}

impl TextureOp {
    pub fn decode(word: u64) -> Result<Self> {
        let opcode = (word >> 56) as u8;
        let tile = bits(word, 24, 3) as u8;
        let rgba = (word as u32).to_be_bytes();

        let op = match opcode {
            G_TEXTURE => Self::Texture {
                mip_levels: bits(word, 43, 3) as u8 + 1,
                tile: bits(word, 40, 3) as u8,
                on: bit(word, 33),
                scale_s: bits(word, 16, 16) as f32 / 65536.0,
                scale_t: bits(word, 0, 16) as f32 / 65536.0,
            },
            G_SETOTHERMODE_H => {
                let length = bits(word, 32, 8) as u32 + 1;
                let offset = bits(word, 40, 8) as u32;
                let mode = 32u32
                    .checked_sub(length + offset)
                    .and_then(OtherModeH::from_shift)
                    .ok_or_else(|| FormatError::InvalidOperand {
                        opcode,
                        reason: format!("no other mode field at offset {offset} length {length}"),
                    })?;
                Self::SetOtherModeH {
                    mode,
                    length,
                    value: bits(word, mode.shift(), length) as u32,
                }
            }
            G_RDPLOADSYNC => Self::LoadSync,
            G_RDPTILESYNC => Self::TileSync,
            G_SETCOMBINE => Self::SetCombine(word & 0x00FF_FFFF_FFFF_FFFF),
            G_SETTILESIZE => Self::SetTileSize {
                tile,
                s_lo: bits(word, 44, 12) as u16,
                t_lo: bits(word, 32, 12) as u16,
                s_hi: bits(word, 12, 12) as u16,
                t_hi: bits(word, 0, 12) as u16,
            },
            G_LOADBLOCK => Self::LoadBlock {
                tile,
                s_lo: bits(word, 44, 12) as u16,
                t_lo: bits(word, 32, 12) as u16,
                s_hi: bits(word, 12, 12) as u16,
                dxt: bits(word, 0, 12) as u16,
            },
            G_SETTILE => Self::SetTile {
                tile,
                descriptor: TileDescriptor::decode(word)?,
            },
            G_SETPRIMCOLOR => Self::SetPrimColor {
                min_level: bits(word, 40, 8) as f32 / 256.0,
                level_fraction: bits(word, 32, 8) as f32 / 256.0,
                rgba,
            },
            G_SETENVCOLOR => Self::SetEnvColor(rgba),
            G_SETTIMG => Self::SetTextureImage {
                format: ColorFormat::try_from(bits(word, 53, 3) as u8)?,
                size: BitSize::try_from(bits(word, 51, 2) as u8)?,
                address: bits(word, 0, 25) as u32,
            },
            G_ENDDL => Self::EndDl,
            _ => {
                return Err(FormatError::UnknownOpcode {
                    stream: "texture",
                    opcode,
                }
                .into())
            }
        };
        Ok(op)
    }
}

impl fmt::Display for TextureOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Texture {
                mip_levels,
                tile,
                on,
                scale_s,
                scale_t,
            } => write!(
                f,
                "G_TEXTURE        tile {tile} scale=<{scale_s}, {scale_t}> levels={mip_levels} on={on}"
            ),
            Self::SetOtherModeH {
                mode,
                length,
                value,
            } => write!(
                f,
                "G_SETOTHERMODE_H {mode} = {value:0width$b}",
                width = *length as usize
            ),
            Self::LoadSync => write!(f, "G_RDPLOADSYNC"),
            Self::TileSync => write!(f, "G_RDPTILESYNC"),
            Self::SetCombine(mux) => write!(f, "G_SETCOMBINE     {mux:#016x}"),
            Self::SetTileSize {
                tile,
                s_lo,
                t_lo,
                s_hi,
                t_hi,
            } => write!(
                f,
                "G_SETTILESIZE    tile {tile} lo=({}, {}) hi=({}, {})",
                quarters(*s_lo as u32),
                quarters(*t_lo as u32),
                quarters(*s_hi as u32),
                quarters(*t_hi as u32)
            ),
            Self::LoadBlock {
                tile,
                s_lo,
                t_lo,
                s_hi,
                dxt,
            } => write!(
                f,
                "G_LOADBLOCK      tile {tile} sl={s_lo} tl={t_lo} sh={s_hi} dxt={dxt}"
            ),
            Self::SetTile { tile, descriptor: d } => write!(
                f,
                "G_SETTILE        tile {tile} fmt={}-bit {} line={} tmem={} palette={} s({}) t({})",
                d.size.bits(),
                d.format,
                d.words_per_line,
                d.tmem_words,
                d.palette,
                d.s,
                d.t
            ),
            Self::SetPrimColor {
                min_level,
                level_fraction,
                rgba: [r, g, b, a],
            } => write!(
                f,
                "G_SETPRIMCOLOR   rgba({r}, {g}, {b}, {a}) min level={min_level} fraction={level_fraction}"
            ),
            Self::SetEnvColor([r, g, b, a]) => {
                write!(f, "G_SETENVCOLOR    rgba({r}, {g}, {b}, {a})")
            }
            Self::SetTextureImage {
                format,
                size,
                address,
            } => write!(
                f,
                "G_SETTIMG        {address:#010x} fmt={}-bit {format}",
                size.bits()
            ),
            Self::EndDl => write!(f, "G_ENDDL"),
        }
    }
}

/// Image source set by `G_SETTIMG` and consumed by `G_LOADBLOCK`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TextureImage {
    format: ColorFormat,
    size: BitSize,
    address: usize,
}

/// RDP state accumulated while replaying a texture display list.
#[derive(Clone, Debug)]
pub struct TextureState {
    tiles: [TileDescriptor; TILE_COUNT],
    sized: [bool; TILE_COUNT],
    tmem: Vec<u8>,
    image: Option<TextureImage>,
    render_tile: Option<u8>,
    mip_levels: u8,
    texturing: bool,
    scale: (f32, f32),
    other_mode_h: u32,
    prim_color: [u8; 4],
    env_color: [u8; 4],
    min_level: f32,
    level_fraction: f32,
}

impl Default for TextureState {
    fn default() -> Self {
        Self {
            tiles: [TileDescriptor::default(); TILE_COUNT],
            sized: [false; TILE_COUNT],
            tmem: vec![0; TMEM_SIZE],
            image: None,
            render_tile: None,
            mip_levels: 0,
            texturing: false,
            scale: (0.0, 0.0),
            other_mode_h: 0,
            prim_color: [0; 4],
            env_color: [0; 4],
            min_level: 0.0,
            level_fraction: 0.0,
        }
    }
}

impl TextureState {
    /// Replays `commands` against `texels`, the image data the commands'
    /// addresses refer to. Replay stops at `G_ENDDL`.
    pub fn run(commands: &[u64], texels: &[u8]) -> Result<Self> {
        let mut state = Self::default();
        for &word in commands {
            let op = TextureOp::decode(word)?;
            trace!("{word:016X} {op}");
            if op == TextureOp::EndDl {
                break;
            }
            state = state.apply(op, texels)?;
        }
        Ok(state)
    }

    pub fn apply(mut self, op: TextureOp, texels: &[u8]) -> Result<Self> {
        match op {
            TextureOp::Texture {
                mip_levels,
                tile,
                on,
                scale_s,
                scale_t,
            } => {
                self.render_tile = Some(tile);
                self.mip_levels = mip_levels;
                self.texturing = on;
                self.scale = (scale_s, scale_t);
            }
            TextureOp::SetOtherModeH {
                mode,
                length,
                value,
            } => {
                let mask = ((1u64 << length) - 1) as u32;
                self.other_mode_h &= !(mask << mode.shift());
                self.other_mode_h |= (value & mask) << mode.shift();
            }
            TextureOp::LoadSync
            | TextureOp::TileSync
            | TextureOp::SetCombine(_)
            | TextureOp::EndDl => {}
            TextureOp::SetTileSize {
                tile,
                s_lo,
                t_lo,
                s_hi,
                t_hi,
            } => {
                let t = &mut self.tiles[tile as usize];
                t.s_lo = s_lo as u32;
                t.t_lo = t_lo as u32;
                t.s_hi = s_hi as u32;
                t.t_hi = t_hi as u32;
                self.sized[tile as usize] = true;
            }
            TextureOp::LoadBlock {
                tile,
                s_lo,
                t_lo,
                s_hi,
                dxt,
            } => self.load_block(tile, s_lo, t_lo, s_hi, dxt, texels)?,
            TextureOp::SetTile { tile, descriptor } => {
                self.tiles[tile as usize] = descriptor;
            }
            TextureOp::SetPrimColor {
                min_level,
                level_fraction,
                rgba,
            } => {
                self.prim_color = rgba;
                self.min_level = min_level;
                self.level_fraction = level_fraction;
            }
            TextureOp::SetEnvColor(rgba) => self.env_color = rgba,
            TextureOp::SetTextureImage {
                format,
                size,
                address,
            } => {
                self.image = Some(TextureImage {
                    format,
                    size,
                    address: address as usize,
                });
            }
        }
        Ok(self)
    }

    fn load_block(
        &mut self,
        tile: u8,
        s_lo: u16,
        t_lo: u16,
        s_hi: u16,
        dxt: u16,
        texels: &[u8],
    ) -> Result<()> {
        let invalid = |reason: String| FormatError::InvalidOperand {
            opcode: G_LOADBLOCK,
            reason,
        };

        if dxt != 0 {
            return Err(invalid(format!("dxt {dxt} is not supported")).into());
        }
        if s_lo != 0 || t_lo != 0 {
            return Err(invalid(format!("load starts at ({s_lo}, {t_lo})")).into());
        }
        let image = self
            .image
            .ok_or_else(|| invalid("no texture image set".to_string()))?;
        let bytes_per_texel = image
            .size
            .bytes_per_texel()
            .ok_or_else(|| invalid("4-bit texels cannot be block loaded".to_string()))?;

        let t = &mut self.tiles[tile as usize];
        t.s_lo = 0;
        t.t_lo = 0;
        t.s_hi = s_hi as u32 * 4;
        t.t_hi = dxt as u32 * 4;

        let length = ((s_hi as usize + 1) * bytes_per_texel).next_multiple_of(8);
        let dest = t.tmem_words as usize * 8;

        if image.address > texels.len() {
            return Err(FormatError::Truncated {
                offset: image.address,
                need: length,
                have: 0,
            }
            .into());
        }
        let available = texels.len() - image.address;
        let copied = length.min(available);
        if copied < length {
            warn!(
                "load of {length} bytes at {:#x} clamped to {copied} bytes",
                image.address
            );
        }
        if dest + copied > TMEM_SIZE {
            return Err(invalid(format!(
                "{copied} bytes at TMEM {dest:#x} overflow texture memory"
            ))
            .into());
        }

        self.tmem[dest..dest + copied]
            .copy_from_slice(&texels[image.address..image.address + copied]);
        Ok(())
    }

    pub fn tile(&self, index: u8) -> &TileDescriptor {
        &self.tiles[index as usize & (TILE_COUNT - 1)]
    }

    /// The tile selected by `G_TEXTURE`.
    pub fn render_tile(&self) -> Option<u8> {
        self.render_tile
    }

    pub fn tmem(&self) -> &[u8] {
        &self.tmem
    }

    pub fn mip_levels(&self) -> u8 {
        self.mip_levels
    }

    pub fn texturing(&self) -> bool {
        self.texturing
    }

    pub fn scale(&self) -> (f32, f32) {
        self.scale
    }

    pub fn other_mode_h(&self) -> u32 {
        self.other_mode_h
    }

    pub fn prim_color(&self) -> [u8; 4] {
        self.prim_color
    }

    pub fn env_color(&self) -> [u8; 4] {
        self.env_color
    }

    /// Minimum level of detail and level of detail fraction from
    /// `G_SETPRIMCOLOR`.
    pub fn level_of_detail(&self) -> (f32, f32) {
        (self.min_level, self.level_fraction)
    }

    /// The render tile's descriptor. A tile never sized by `G_SETTILESIZE`
    /// covers the centers of a `width` by `height` image.
    pub fn display_tile(&self, width: u16, height: u16) -> Result<TileDescriptor> {
        let index = self.render_tile.ok_or_else(|| {
            FormatError::UnexpectedStructure("no G_TEXTURE command selects a tile".to_string())
        })?;
        let mut tile = self.tiles[index as usize];
        if !self.sized[index as usize] {
            tile.s_lo = 2;
            tile.t_lo = 2;
            tile.s_hi = (width as u32 * 4).saturating_sub(2);
            tile.t_hi = (height as u32 * 4).saturating_sub(2);
        }
        Ok(tile)
    }

    /// Decodes the render tile from TMEM.
    pub fn render(&self, width: u16, height: u16, palettes: &[Palette]) -> Result<RgbaImage> {
        let tile = self.display_tile(width, height)?;
        let (width, height) = tile.dimensions()?;

        let bytes_per_line = tile.words_per_line as usize * 8;
        let start = tile.tmem_words as usize * 8;
        let end = start + bytes_per_line * height as usize;
        let data = self.tmem.get(start..end).ok_or_else(|| {
            FormatError::InvalidLayout(format!(
                "tile at TMEM {start:#x}..{end:#x} exceeds texture memory"
            ))
        })?;

        let palette = match tile.palette {
            0 => None,
            n => Some(palettes.get(n as usize - 1).ok_or_else(|| {
                FormatError::InvalidOperand {
                    opcode: G_SETTILE,
                    reason: format!("palette {n} of {}", palettes.len()),
                }
            })?),
        };

        texels::decode(
            data,
            tile.format,
            tile.size,
            &Layout {
                width,
                height,
                bytes_per_line,
                flip: true,
                deinterleave: true,
            },
            palette,
        )
    }
}
