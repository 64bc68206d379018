// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Builders for synthetic ROM images.

#![allow(dead_code)]

/// A cartridge header: big-endian magic followed by zeros.
pub const CART_HEADER_LEN: usize = 0x40;

pub fn cart_header() -> Vec<u8> {
    let mut header = vec![0x80, 0x37, 0x12, 0x40];
    header.resize(CART_HEADER_LEN, 0);
    header
}

/// `tag`, a big-endian length, and `data`.
pub fn chunk(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend((data.len() as u32).to_be_bytes());
    out.extend(data);
    out
}

/// A `FORM` of type `kind` holding `sections`.
pub fn form(kind: &[u8; 4], sections: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = kind.to_vec();
    for section in sections {
        payload.extend(section);
    }
    chunk(b"FORM", &payload)
}

/// One step of a MIO0 schedule.
pub enum Op {
    Literal(u8),
    Copy { run: usize, distance: usize },
}

/// Encodes a MIO0 block from an explicit schedule.
pub fn mio0(length: u32, ops: &[Op]) -> Vec<u8> {
    let mut control = Vec::new();
    let mut tokens = Vec::new();
    let mut literals = Vec::new();
    for (i, op) in ops.iter().enumerate() {
        if i % 8 == 0 {
            control.push(0u8);
        }
        match op {
            Op::Literal(b) => {
                *control.last_mut().unwrap() |= 0x80 >> (i % 8);
                literals.push(*b);
            }
            Op::Copy { run, distance } => {
                let token = (((run - 3) as u16) << 12) | ((distance - 1) as u16);
                tokens.extend(token.to_be_bytes());
            }
        }
    }
    let compressed_offset = 16 + control.len();
    let raw_offset = compressed_offset + tokens.len();

    let mut out = b"MIO0".to_vec();
    out.extend(length.to_be_bytes());
    out.extend((compressed_offset as u32).to_be_bytes());
    out.extend((raw_offset as u32).to_be_bytes());
    out.extend(control);
    out.extend(tokens);
    out.extend(literals);
    out
}

/// A MIO0 block storing `data` as literals.
pub fn mio0_literals(data: &[u8]) -> Vec<u8> {
    let ops: Vec<Op> = data.iter().map(|&b| Op::Literal(b)).collect();
    mio0(data.len() as u32, &ops)
}

/// A `GZIP` chunk wrapping a `tag` section.
pub fn gzip(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut payload = tag.to_vec();
    payload.extend((data.len() as u32).to_be_bytes());
    payload.extend(mio0_literals(data));
    chunk(b"GZIP", &payload)
}

fn align16(n: usize) -> usize {
    n.next_multiple_of(16)
}

/// Lays out `table` after a cartridge header and `files` contiguously from
/// the next 16-byte boundary.
fn assemble(table: Vec<u8>, files: &[Vec<u8>]) -> Vec<u8> {
    let mut rom = cart_header();
    rom.extend(table);
    rom.resize(align16(rom.len()), 0);
    for file in files {
        rom.extend(file);
    }
    rom
}

/// The offset of the first file in a ROM built with a table of
/// `table_len` bytes.
pub fn start_of_files(table_len: usize) -> usize {
    align16(CART_HEADER_LEN + table_len)
}

/// A `UVFT` table describing `files` in order, grouped by table type.
pub fn normal_table(files: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut types: Vec<(&[u8; 4], Vec<u8>)> = Vec::new();
    let mut relative = 0u32;
    for (tag, file) in files {
        let index = match types.iter().position(|(t, _)| t == tag) {
            Some(index) => index,
            None => {
                types.push((*tag, Vec::new()));
                types.len() - 1
            }
        };
        types[index].1.extend(relative.to_be_bytes());
        relative += file.len() as u32;
    }
    let sections: Vec<Vec<u8>> = types
        .iter()
        .map(|(tag, offsets)| chunk(tag, offsets))
        .collect();
    form(b"UVFT", &sections)
}

/// A ROM with a `UVFT` table.
pub fn normal_rom(files: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let table = normal_table(files);
    let data: Vec<Vec<u8>> = files.iter().map(|(_, f)| f.clone()).collect();
    assemble(table, &data)
}

/// A `UVRM` table with compressed length records.
pub fn flight_game_table(files: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut records = Vec::new();
    for (tag, file) in files {
        records.extend(tag.as_slice());
        records.extend((file.len() as u32).to_be_bytes());
    }
    form(b"UVRM", &[gzip(b"FTBL", &records)])
}

/// A ROM with a `UVRM` table.
pub fn flight_game_rom(files: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let table = flight_game_table(files);
    let data: Vec<Vec<u8>> = files.iter().map(|(_, f)| f.clone()).collect();
    assemble(table, &data)
}

/// A `UVTX` section: 16-bit RGBA texels loaded with `G_LOADBLOCK` and drawn
/// from tile 0 without an explicit tile size.
pub fn texture_section(width: u16, height: u16, texels: &[u16]) -> Vec<u8> {
    let words_per_line = (width as u64 * 2).div_ceil(8);
    let texel_count = texels.len() as u64;
    let commands: [u64; 6] = [
        0xD700_0002_FFFF_FFFF,
        0xFD10_0000_0000_0000,
        0xF510_0000_0700_0000,
        0xF300_0000_0700_0000 | (texel_count - 1) << 12,
        0xF510_0000_0000_0000 | words_per_line << 41,
        0xDF00_0000_0000_0000,
    ];

    let mut data = Vec::new();
    data.extend(((texels.len() * 2) as i16).to_be_bytes());
    data.extend((commands.len() as i16).to_be_bytes());
    data.extend([0u8; 24]);
    for texel in texels {
        data.extend(texel.to_be_bytes());
    }
    for command in commands {
        data.extend(command.to_be_bytes());
    }
    data.extend(width.to_be_bytes());
    data.extend(height.to_be_bytes());
    data.extend([0u8; 0x15]);
    data.push(1);
    data.extend([0, 0]);
    data
}

/// A `UVBT` section.
pub fn blit_section(header: [u16; 7], data: &[u8]) -> Vec<u8> {
    let mut bytes: Vec<u8> = header.iter().flat_map(|v| v.to_be_bytes()).collect();
    bytes.extend(data);
    bytes
}

fn f32s(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// A `UVMD` section with one lod and part holding a single untextured
/// triangle over vertices at x = 1, 2, 3, translated by `dx`.
pub fn model_section(dx: f32) -> Vec<u8> {
    let mut data = vec![1, 1, 0, 0, 0, 3, 0, 1, 0, 3];
    data.extend(f32s(&[0.0, 1.0, 0.0]));
    data.extend([1, 0]);
    data.extend(f32s(&[10.0]));
    data.extend([0, 0, 0]);
    data.extend(f32s(&[0.0; 6]));
    data.extend([0, 0, 1]);
    data.extend(0x0000_0FFFu32.to_be_bytes());
    data.extend(f32s(&[0.0; 3]));
    data.extend([0, 3, 0, 0, 0, 0, 0, 0, 0, 2, 0, 3]);
    for x in [1i16, 2, 3] {
        let mut vertex = [0u8; 16];
        vertex[0..2].copy_from_slice(&x.to_be_bytes());
        vertex[8..10].copy_from_slice(&(x * 32).to_be_bytes());
        vertex[12..16].copy_from_slice(&[0xFF; 4]);
        data.extend(vertex);
    }
    data.extend([0x00, 0x00, 0x40, 0x80, 0x22]);
    let mut matrix = [0f32; 16];
    matrix[0] = 1.0;
    matrix[5] = 1.0;
    matrix[10] = 1.0;
    matrix[15] = 1.0;
    matrix[12] = dx;
    data.extend(f32s(&matrix));
    data.resize(data.len().next_multiple_of(8), 0);
    data
}

/// A `UVFT` font file of 4-bit intensity characters cut from one sheet.
/// Each character is `(width, height, start_texel)`.
pub fn font_file(
    sheet: &[u8],
    texels_per_line: u16,
    characters: &[(u16, u16, u16)],
    ascii: &[u8],
) -> Vec<u8> {
    let mut frmt = 4u32.to_be_bytes().to_vec();
    frmt.extend(0u32.to_be_bytes());

    let mut bitm = Vec::new();
    for &(width, height, start) in characters {
        for v in [width, texels_per_line, start, 0, 0, 0, height, 0] {
            bitm.extend(v.to_be_bytes());
        }
    }

    form(
        b"UVFT",
        &[
            chunk(b"FRMT", &frmt),
            chunk(b"IMAG", sheet),
            chunk(b"STRG", ascii),
            chunk(b"BITM", &bitm),
        ],
    )
}
