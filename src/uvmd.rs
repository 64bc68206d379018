// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! `UVMD` models.
//!
//! A model is a list of levels of detail, each split into parts that share
//! one transform per part index. Parts are made of materials, and each
//! material owns its vertices and a packed triangle stream (see
//! [crate::rsp]).
//!
//! ```text
//! header
//! [extra header]          when flags & 0x80
//! f32 f32 f32
//! lod * lod_count
//!     part * part_count
//!         material * material_count
//!             vertices, packed triangles
//! matrix * parts_per_lod
//! zero padding to 8 bytes
//! ```

use binrw::binrw;
use log::{debug, trace};

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};
use crate::rsp::{self, Matrix, RspCommand, Vertex};

#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Header {
    lod_count: u8,
    parts_per_lod: u8,
    flags: u8,
    zero: u8,
    vertex_count: u16,
    total_materials: u16,
    total_commands: u16,
}

impl Header {
    const SIZE: usize = 10;
    const HAS_EXTRA: u8 = 0x80;
}

/// Optional header block present when the model's flags have the high bit
/// set. Its meaning is unknown.
#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtraHeader {
    pub floats: [f32; 10],
    pub shorts: [i16; 3],
    pub byte: u8,
}

impl ExtraHeader {
    pub const SIZE: usize = 0x2F;
}

#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq)]
struct PartHeader {
    unknown: [u8; 3],
    bounds: [f32; 6],
    stack: [u8; 2],
    material_count: u8,
}

impl PartHeader {
    const SIZE: usize = 30;
}

#[binrw]
#[brw(big)]
#[derive(Clone, Copy, Debug, PartialEq)]
struct MaterialHeader {
    flags: u32,
    floats: [f32; 3],
    vertex_count: u16,
    unknown: [u16; 3],
    shorts_count: u16,
    command_count: u16,
}

impl MaterialHeader {
    const SIZE: usize = 28;
}

/// Vertices and triangles drawn with one texture.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub flags: u32,
    pub floats: [f32; 3],
    pub unknown: [u16; 3],
    pub vertices: Vec<Vertex>,
    pub commands: Vec<RspCommand>,
}

impl Material {
    const NO_TEXTURE: u32 = 0xFFF;
    const LIT: u32 = 1 << 18;

    fn parse(cursor: &mut ByteCursor) -> Result<Self> {
        let header: MaterialHeader = cursor.read_record(MaterialHeader::SIZE)?;
        let vertices = Vertex::read_many(cursor, header.vertex_count as usize)?;
        let commands = rsp::unpack_triangle_commands(
            cursor,
            header.shorts_count as usize,
            header.command_count as usize,
        )?;
        trace!(
            "material {:08X}: {} vertices, {} commands",
            header.flags,
            vertices.len(),
            commands.len()
        );
        Ok(Self {
            flags: header.flags,
            floats: header.floats,
            unknown: header.unknown,
            vertices,
            commands,
        })
    }

    /// The `UVTX` ordinal used by this material, if any.
    pub fn texture_index(&self) -> Option<u16> {
        match self.flags & 0xFFF {
            Self::NO_TEXTURE => None,
            index => Some(index as u16),
        }
    }

    /// Lit materials store normals in place of vertex colors.
    pub fn is_lit(&self) -> bool {
        self.flags & Self::LIT != 0
    }

    /// The material's triangles with `matrix` applied.
    pub fn triangles(&self, matrix: &Matrix) -> Result<Vec<Vertex>> {
        rsp::interpret(&self.vertices, &self.commands, matrix)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub unknown: [u8; 3],
    /// Unscaled; multiply by [Model::scale].
    pub bounds: [f32; 6],
    pub stack: [u8; 2],
    pub materials: Vec<Material>,
}

impl Part {
    const FLAGGED_MATERIAL: u32 = 0x0800_0000;

    fn parse(cursor: &mut ByteCursor) -> Result<Self> {
        let header: PartHeader = cursor.read_record(PartHeader::SIZE)?;
        let materials = (0..header.material_count)
            .map(|_| Material::parse(cursor))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            unknown: header.unknown,
            bounds: header.bounds,
            stack: header.stack,
            materials,
        })
    }

    /// Whether any material sets flag bit 27.
    pub fn has_flagged_material(&self) -> bool {
        self.materials
            .iter()
            .any(|m| m.flags & Self::FLAGGED_MATERIAL != 0)
    }
}

/// One level of detail.
#[derive(Clone, Debug, PartialEq)]
pub struct Lod {
    pub flags: u8,
    /// Switch distance as stored.
    pub distance: f32,
    pub parts: Vec<Part>,
}

impl Lod {
    fn parse(cursor: &mut ByteCursor) -> Result<Self> {
        let part_count = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        let distance = cursor.read_f32()?;
        let parts = (0..part_count)
            .map(|_| Part::parse(cursor))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            flags,
            distance,
            parts,
        })
    }

    /// The switch distance squared, as the game compares it.
    pub fn distance_squared(&self) -> f32 {
        self.distance * self.distance
    }
}

/// A parsed `UVMD` section.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub flags: u8,
    pub vertex_count: u16,
    pub total_materials: u16,
    pub total_commands: u16,
    pub extra: Option<ExtraHeader>,
    pub floats: [f32; 3],
    pub lods: Vec<Lod>,
    /// One transform per part index, shared by every level of detail.
    pub matrices: Vec<Matrix>,
}

impl Model {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let header: Header = cursor.read_record(Header::SIZE)?;
        if header.zero != 0 {
            return Err(FormatError::UnexpectedStructure(format!(
                "model header byte 3 is {:#04x}",
                header.zero
            ))
            .into());
        }

        let extra = if header.flags & Header::HAS_EXTRA != 0 {
            Some(cursor.read_record::<ExtraHeader>(ExtraHeader::SIZE)?)
        } else {
            None
        };
        let floats = [cursor.read_f32()?, cursor.read_f32()?, cursor.read_f32()?];

        let lods = (0..header.lod_count)
            .map(|_| Lod::parse(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        let matrices = (0..header.parts_per_lod)
            .map(|_| cursor.read_record::<Matrix>(Matrix::SIZE))
            .collect::<Result<Vec<_>>>()?;

        let expected = cursor.position().next_multiple_of(8);
        if data.len() != expected {
            return Err(FormatError::LengthMismatch {
                what: "UVMD section",
                expected,
                actual: data.len(),
            }
            .into());
        }

        debug!(
            "model: {} lods, {} parts per lod, {} vertices",
            lods.len(),
            matrices.len(),
            header.vertex_count
        );

        Ok(Self {
            flags: header.flags,
            vertex_count: header.vertex_count,
            total_materials: header.total_materials,
            total_commands: header.total_commands,
            extra,
            floats,
            lods,
            matrices,
        })
    }

    /// Scale applied to part bounds.
    pub fn scale(&self) -> f32 {
        self.floats[1]
    }

    /// Every triangle of level of detail `lod`, each part transformed by the
    /// matrix for its index.
    pub fn lod_triangles(&self, lod: usize) -> Result<Vec<Vertex>> {
        let lod = self.lods.get(lod).ok_or_else(|| {
            FormatError::UnexpectedStructure(format!("model has {} lods", self.lods.len()))
        })?;

        let mut triangles = Vec::new();
        for (i, part) in lod.parts.iter().enumerate() {
            let matrix = self.matrices.get(i).ok_or_else(|| {
                FormatError::UnexpectedStructure(format!(
                    "part {i} has no matrix ({} parts per lod)",
                    self.matrices.len()
                ))
            })?;
            for material in &part.materials {
                triangles.extend(material.triangles(matrix)?);
            }
        }
        Ok(triangles)
    }
}
