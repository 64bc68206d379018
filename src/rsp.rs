// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Model geometry as RSP display list commands.
//!
//! Models store their triangles in a packed 16-bit form that the game
//! expands into F3DEX commands at load time. [unpack_triangle_commands]
//! performs the same expansion and [interpret] replays the result against a
//! vertex cache to produce a flat triangle list.
//!
//! ## Packed shorts
//!
//! A short with the high bit set is half of a triangle command:
//!
//! ```text
//! Bits:  15   14-10   9-5   4-0
//!        1    v0      v1    v2
//! ```
//!
//! Two consecutive halves become one `G_TRI2`; a half followed by anything
//! else becomes a `G_TRI1`. A short with the high bit clear is followed by a
//! byte and together they describe a vertex load:
//!
//! ```text
//! short: Bits:  15   14-13       12-0
//!               0    count_hi    first vertex
//! byte:  Bits:  7-5        4-0
//!               count_lo   cache slot
//! ```
//!
//! where the number of vertices loaded is `(count_hi << 3 | count_lo) + 1`.
//!
//! ## Vertex
//!
//! | Offset | Type      | Description                                   |
//! |--------|-----------|-----------------------------------------------|
//! | 0      | `[i16; 3]`| Position                                      |
//! | 6      | `u16`     | Index                                         |
//! | 8      | `[i16; 2]`| Texture coordinates, 1/32 texel units         |
//! | 12     | `[u8; 4]` | Color, or a normal for lit materials          |

use std::fmt;

use binrw::binrw;
use log::trace;

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};

/// `G_VTX`
pub const G_VTX: u8 = 0x01;
/// `G_TRI1`
pub const G_TRI1: u8 = 0x05;
/// `G_TRI2`
pub const G_TRI2: u8 = 0x06;
/// `G_ENDDL`
pub const G_ENDDL: u8 = 0xDF;

/// Number of slots in the vertex cache addressable by a triangle command.
const CACHE_SLOTS: usize = 128;

/// A model vertex.
#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Vertex {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub index: u16,
    /// Raw texture coordinates. Kept as stored; see [Vertex::st].
    pub s: i16,
    pub t: i16,
    pub rgba: [u8; 4],
}

impl Vertex {
    pub const SIZE: usize = 16;

    /// Reads `count` consecutive vertices.
    pub fn read_many(cursor: &mut ByteCursor, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| cursor.read_record(Self::SIZE)).collect()
    }

    pub fn position(&self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }

    /// Texture coordinates in texels.
    pub fn st(&self) -> (f32, f32) {
        (self.s as f32 / 32.0, self.t as f32 / 32.0)
    }

    /// Texture coordinates as stored.
    pub fn raw_st(&self) -> (i16, i16) {
        (self.s, self.t)
    }

    /// The shade color of an unlit vertex.
    pub fn color(&self) -> [u8; 4] {
        self.rgba
    }

    /// The normal of a lit vertex, packed into the color bytes.
    pub fn normal(&self) -> [i8; 3] {
        [self.rgba[0] as i8, self.rgba[1] as i8, self.rgba[2] as i8]
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (s, t) = self.st();
        write!(
            f,
            "({}, {}, {}) [{}] {s} {t} 0x{:02X}{:02X}{:02X}{:02X}",
            self.x, self.y, self.z, self.index, self.rgba[0], self.rgba[1], self.rgba[2], self.rgba[3]
        )
    }
}

/// A column-major 4x4 transform.
#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix(pub [f32; 16]);

impl Matrix {
    pub const SIZE: usize = 64;

    #[rustfmt::skip]
    pub const IDENTITY: Matrix = Matrix([
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Transforms the position of `v`. Results are truncated back to
    /// `i16`; every other field is unchanged.
    pub fn transform(&self, v: Vertex) -> Vertex {
        let m = &self.0;
        let (x, y, z) = (v.x as f32, v.y as f32, v.z as f32);
        Vertex {
            x: (x * m[0] + y * m[4] + z * m[8] + m[12]) as i16,
            y: (x * m[1] + y * m[5] + z * m[9] + m[13]) as i16,
            z: (x * m[2] + y * m[6] + z * m[10] + m[14]) as i16,
            ..v
        }
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let e = &self.0;
        for row in 0..4 {
            writeln!(
                f,
                "[{:>10.4} {:>10.4} {:>10.4} {:>10.4}]",
                e[row],
                e[row + 4],
                e[row + 8],
                e[row + 12]
            )?;
        }
        Ok(())
    }
}

/// A 64-bit display list command as two words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RspCommand {
    pub w0: u32,
    pub w1: u32,
}

impl RspCommand {
    pub const END: RspCommand = RspCommand {
        w0: (G_ENDDL as u32) << 24,
        w1: 0,
    };

    pub fn new(w0: u32, w1: u32) -> Self {
        Self { w0, w1 }
    }

    pub fn opcode(&self) -> u8 {
        (self.w0 >> 24) as u8
    }

    /// Builds a triangle command from packed halves. A zero `second` makes
    /// a single triangle.
    pub fn from_shorts(first: u16, second: u16) -> Self {
        fn spread(half: u16) -> u32 {
            let half = half as u32;
            (((half & 0x7C00) >> 10) << 17) | (((half & 0x03E0) >> 5) << 9) | ((half & 0x001F) << 1)
        }

        if second != 0 {
            Self::new(spread(first) | (G_TRI2 as u32) << 24, spread(second))
        } else {
            Self::new(spread(first) | (G_TRI1 as u32) << 24, 0)
        }
    }

    /// Builds a vertex load from a packed short and its trailing byte.
    fn load_from_packed(short: u16, byte: u8) -> Self {
        let count = 1 + ((((short & 0x6000) >> 10) as u32) | ((byte & 0xE0) >> 5) as u32);
        let slot = (byte & 0x1F) as u32;
        let first = (short & 0x1FFF) as u32;

        let w0 = (G_VTX as u32) << 24 | (count & 0xFF) << 12 | ((slot + count) & 0x7F) << 1;
        // vertex buffers are addressed as if each model's vertices start at 0
        let w1 = first * Vertex::SIZE as u32;
        Self::new(w0, w1)
    }

    pub fn decode(&self) -> Result<GeometryOp> {
        fn triangle(word: u32) -> [usize; 3] {
            [
                ((word >> 16) & 0xFF) as usize / 2,
                ((word >> 8) & 0xFF) as usize / 2,
                (word & 0xFF) as usize / 2,
            ]
        }

        match self.opcode() {
            G_VTX => {
                let count = ((self.w0 >> 12) & 0xFF) as usize;
                let end = ((self.w0 & 0xFF) >> 1) as usize;
                let slot = end.checked_sub(count).ok_or_else(|| FormatError::InvalidOperand {
                    opcode: G_VTX,
                    reason: format!("{count} vertices do not fit below slot {end}"),
                })?;
                Ok(GeometryOp::LoadVertices {
                    count,
                    slot,
                    first: self.w1 as usize / Vertex::SIZE,
                })
            }
            G_TRI1 => Ok(GeometryOp::Triangle(triangle(self.w0))),
            G_TRI2 => Ok(GeometryOp::Triangles(triangle(self.w0), triangle(self.w1))),
            G_ENDDL => Ok(GeometryOp::End),
            opcode => Err(FormatError::UnknownOpcode {
                stream: "geometry",
                opcode,
            }
            .into()),
        }
    }
}

impl fmt::Display for RspCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08X} {:08X}", self.w0, self.w1)
    }
}

/// A decoded geometry command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryOp {
    /// Copy `count` model vertices starting at `first` into the cache
    /// starting at `slot`.
    LoadVertices {
        count: usize,
        slot: usize,
        first: usize,
    },
    Triangle([usize; 3]),
    Triangles([usize; 3], [usize; 3]),
    End,
}

/// Expands `shorts_count` packed shorts (plus the bytes trailing each vertex
/// load) into display list commands, ending with `G_ENDDL`. The result must
/// hold exactly `command_count` commands.
pub fn unpack_triangle_commands(
    cursor: &mut ByteCursor,
    shorts_count: usize,
    command_count: usize,
) -> Result<Vec<RspCommand>> {
    let mut commands = Vec::with_capacity(command_count);
    let mut pending: Option<u16> = None;

    for _ in 0..shorts_count {
        let short = cursor.read_u16()?;

        if short & 0x8000 != 0 {
            match pending.take() {
                Some(first) => commands.push(RspCommand::from_shorts(first, short)),
                None => pending = Some(short),
            }
            continue;
        }

        if let Some(first) = pending.take() {
            commands.push(RspCommand::from_shorts(first, 0));
        }
        let byte = cursor.read_u8()?;
        commands.push(RspCommand::load_from_packed(short, byte));
    }

    if let Some(first) = pending {
        commands.push(RspCommand::from_shorts(first, 0));
    }
    commands.push(RspCommand::END);

    if commands.len() != command_count {
        return Err(FormatError::LengthMismatch {
            what: "triangle commands",
            expected: command_count,
            actual: commands.len(),
        }
        .into());
    }

    Ok(commands)
}

/// Vertex cache and output of one command stream.
struct Assembler<'v> {
    vertices: &'v [Vertex],
    cache: [Option<Vertex>; CACHE_SLOTS],
    triangles: Vec<Vertex>,
}

impl<'v> Assembler<'v> {
    fn new(vertices: &'v [Vertex]) -> Self {
        Self {
            vertices,
            cache: [None; CACHE_SLOTS],
            triangles: Vec::new(),
        }
    }

    fn cached(&self, opcode: u8, slot: usize) -> Result<Vertex> {
        self.cache
            .get(slot)
            .copied()
            .flatten()
            .ok_or_else(|| {
                FormatError::InvalidOperand {
                    opcode,
                    reason: format!("vertex cache slot {slot} is empty"),
                }
                .into()
            })
    }

    fn emit(mut self, opcode: u8, slots: [usize; 3]) -> Result<Self> {
        for slot in slots {
            let v = self.cached(opcode, slot)?;
            self.triangles.push(v);
        }
        Ok(self)
    }

    fn apply(mut self, op: GeometryOp) -> Result<Self> {
        match op {
            GeometryOp::LoadVertices { count, slot, first } => {
                let source = first
                    .checked_add(count)
                    .and_then(|end| self.vertices.get(first..end))
                    .ok_or_else(|| FormatError::InvalidOperand {
                        opcode: G_VTX,
                        reason: format!(
                            "vertices {first}..{} of {}",
                            first.saturating_add(count),
                            self.vertices.len()
                        ),
                    })?;
                for (i, v) in source.iter().enumerate() {
                    self.cache[slot + i] = Some(*v);
                }
                Ok(self)
            }
            GeometryOp::Triangle(a) => self.emit(G_TRI1, a),
            GeometryOp::Triangles(a, b) => self.emit(G_TRI2, a)?.emit(G_TRI2, b),
            GeometryOp::End => Ok(self),
        }
    }
}

/// Runs `commands` against `vertices`, returning three vertices per
/// triangle with `matrix` applied to each. Interpretation stops at the
/// first `G_ENDDL`.
pub fn interpret(vertices: &[Vertex], commands: &[RspCommand], matrix: &Matrix) -> Result<Vec<Vertex>> {
    let mut state = Assembler::new(vertices);
    for command in commands {
        let op = command.decode()?;
        trace!("{command} {op:?}");
        if op == GeometryOp::End {
            break;
        }
        state = state.apply(op)?;
    }

    Ok(state
        .triangles
        .into_iter()
        .map(|v| matrix.transform(v))
        .collect())
}
