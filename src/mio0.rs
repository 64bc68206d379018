// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! MIO0 decompression.
//!
//! MIO0 is Nintendo's byte-oriented LZ77 variant. A block is laid out as:
//!
//! | Offset | Type      | Description                                   |
//! |--------|-----------|-----------------------------------------------|
//! | 0      | `[u8; 4]` | Magic - "MIO0"                                |
//! | 4      | `u32`     | Decompressed length                           |
//! | 8      | `u32`     | Offset of the back-reference stream           |
//! | 12     | `u32`     | Offset of the literal stream                  |
//! | 16     | `[u8]`    | Control bytes                                 |
//!
//! Offsets are relative to the start of the header. Each control byte holds
//! eight flags, most significant first. A set flag copies one byte from the
//! literal stream; a clear flag reads a two byte token from the
//! back-reference stream:
//!
//! ```text
//! Bits:  15-12    11-0
//!        Length   Distance
//! ```
//!
//! which copies `Length + 3` bytes starting `Distance + 1` bytes back in the
//! output. Copies may overlap the bytes they produce.

use binrw::binrw;
use log::trace;

use crate::cursor::ByteCursor;
use crate::error::{FormatError, Result};
use crate::Tag;

/// The fixed 16-byte MIO0 header.
#[binrw]
#[brw(big, magic = b"MIO0")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub decompressed_length: u32,
    pub compressed_offset: u32,
    pub raw_offset: u32,
}

impl Header {
    pub const SIZE: usize = 16;

    /// Reads the header at `offset`, checking the magic.
    pub fn parse(buffer: &[u8], offset: usize) -> Result<Self> {
        let mut cursor = ByteCursor::at(buffer, offset);
        cursor.expect_tag(Tag::MIO0)?;
        cursor.seek(offset);
        cursor.read_record(Self::SIZE)
    }
}

/// Decompresses the MIO0 block whose header starts at `header_offset`.
///
/// Returns exactly `decompressed_length` bytes. A back-reference reaching
/// before the start of the output, a stream running off the end of `buffer`,
/// or a final copy overshooting the declared length are all errors.
pub fn decompress(buffer: &[u8], header_offset: usize) -> Result<Vec<u8>> {
    let header = Header::parse(buffer, header_offset)?;
    let length = header.decompressed_length as usize;

    let stream_start = |relative: u32| {
        header_offset
            .checked_add(relative as usize)
            .ok_or(FormatError::Truncated {
                offset: header_offset,
                need: relative as usize,
                have: buffer.len().saturating_sub(header_offset),
            })
    };

    let mut control = ByteCursor::at(buffer, header_offset + Header::SIZE);
    let mut compressed = ByteCursor::at(buffer, stream_start(header.compressed_offset)?);
    let mut raw = ByteCursor::at(buffer, stream_start(header.raw_offset)?);

    trace!(
        "MIO0 at {header_offset:#x}: {length} bytes, tokens at +{:#x}, literals at +{:#x}",
        header.compressed_offset,
        header.raw_offset
    );

    let mut output: Vec<u8> = Vec::with_capacity(length);
    while output.len() < length {
        let flags = control.read_u8()?;
        for bit in (0..8).rev() {
            if output.len() >= length {
                break;
            }

            if flags & (1 << bit) != 0 {
                output.push(raw.read_u8()?);
                continue;
            }

            let token = compressed.read_u16()?;
            let run = 3 + (token >> 12) as usize;
            let distance = 1 + (token & 0x0FFF) as usize;
            if distance > output.len() {
                return Err(FormatError::UnexpectedStructure(format!(
                    "MIO0 back-reference {distance} bytes back with only {} bytes decoded",
                    output.len()
                ))
                .into());
            }

            let start = output.len() - distance;
            for i in 0..run {
                output.push(output[start + i]);
            }
        }
    }

    if output.len() != length {
        return Err(FormatError::LengthMismatch {
            what: "MIO0 output",
            expected: length,
            actual: output.len(),
        }
        .into());
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    enum Op {
        Literal(u8),
        Copy { run: usize, distance: usize },
    }

    fn block(length: u32, ops: &[Op]) -> Vec<u8> {
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
                    tokens.extend_from_slice(&token.to_be_bytes());
                }
            }
        }
        let compressed_offset = 16 + control.len();
        let raw_offset = compressed_offset + tokens.len();

        let mut out = b"MIO0".to_vec();
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&(compressed_offset as u32).to_be_bytes());
        out.extend_from_slice(&(raw_offset as u32).to_be_bytes());
        out.extend(control);
        out.extend(tokens);
        out.extend(literals);
        out
    }

    #[test]
    fn test_literals_only() {
        let data = block(3, &[Op::Literal(1), Op::Literal(2), Op::Literal(3)]);
        assert_eq!(vec![1, 2, 3], decompress(&data, 0).unwrap());
    }

    #[test]
    fn test_distance_one_repeats_previous_byte() {
        let data = block(
            19,
            &[
                Op::Literal(0xAA),
                Op::Copy {
                    run: 18,
                    distance: 1,
                },
            ],
        );
        assert_eq!(vec![0xAA; 19], decompress(&data, 0).unwrap());
    }

    #[test]
    fn test_overlapping_pattern_copy() {
        let data = block(
            9,
            &[
                Op::Literal(b'a'),
                Op::Literal(b'b'),
                Op::Literal(b'c'),
                Op::Copy {
                    run: 6,
                    distance: 3,
                },
            ],
        );
        assert_eq!(b"abcabcabc".to_vec(), decompress(&data, 0).unwrap());
    }

    #[test]
    fn test_header_offset_is_relative() {
        let mut data = vec![0xEE; 5];
        data.extend(block(2, &[Op::Literal(7), Op::Literal(8)]));
        assert_eq!(vec![7, 8], decompress(&data, 5).unwrap());
    }

    #[test]
    fn test_back_reference_before_start_fails() {
        let data = block(
            4,
            &[
                Op::Literal(1),
                Op::Copy {
                    run: 3,
                    distance: 2,
                },
            ],
        );
        assert!(matches!(
            decompress(&data, 0),
            Err(Error::Format(FormatError::UnexpectedStructure(_)))
        ));
    }

    #[test]
    fn test_overshooting_copy_is_length_mismatch() {
        let data = block(
            3,
            &[
                Op::Literal(1),
                Op::Copy {
                    run: 4,
                    distance: 1,
                },
            ],
        );
        assert_eq!(
            Err(Error::Format(FormatError::LengthMismatch {
                what: "MIO0 output",
                expected: 3,
                actual: 5
            })),
            decompress(&data, 0)
        );
    }

    #[test]
    fn test_bad_magic() {
        let mut data = block(1, &[Op::Literal(1)]);
        data[3] = b'1';
        assert!(matches!(
            decompress(&data, 0),
            Err(Error::Format(FormatError::BadMagic { offset: 0, .. }))
        ));
    }

    #[test]
    fn test_truncated_literal_stream() {
        let mut data = block(3, &[Op::Literal(1), Op::Literal(2), Op::Literal(3)]);
        data.pop();
        assert!(matches!(
            decompress(&data, 0),
            Err(Error::Format(FormatError::Truncated { .. }))
        ));
    }
}
