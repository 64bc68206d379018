// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

mod common;

use paradigmfs::chunk;
use paradigmfs::error::{Error, FormatError};
use paradigmfs::mio0;

use common::{gzip, mio0 as block, Op};

#[test]
fn test_block_inside_buffer() {
    let mut buffer = vec![0xEE; 5];
    buffer.extend(block(
        10,
        &[
            Op::Literal(b'a'),
            Op::Literal(b'b'),
            Op::Copy {
                run: 4,
                distance: 2,
            },
            Op::Literal(b'c'),
            Op::Copy {
                run: 3,
                distance: 3,
            },
        ],
    ));
    assert_eq!(b"abababcabc".to_vec(), mio0::decompress(&buffer, 5).unwrap());
}

#[test]
fn test_header_offset_without_magic() {
    let buffer = block(1, &[Op::Literal(1)]);
    assert!(matches!(
        mio0::decompress(&buffer, 1),
        Err(Error::Format(FormatError::BadMagic { .. }))
    ));
}

#[test]
fn test_gzip_section_expands() {
    let mut payload = b"UVTX".to_vec();
    payload.extend(gzip(b"COMM", b"hello, world"));

    let sections = chunk::split_sections(&payload).unwrap();
    assert_eq!(1, sections.len());
    assert!(sections[0].is_compressed());
    assert_eq!(b"hello, world", sections[0].data());
}

#[test]
fn test_gzip_length_disagrees_with_block() {
    let mut payload = b"UVTX".to_vec();
    let mut section = gzip(b"COMM", b"hello");
    // declared decompressed length
    section[15] = 6;
    payload.extend(section);

    assert!(matches!(
        chunk::split_sections(&payload),
        Err(Error::Format(FormatError::LengthMismatch { .. }))
    ));
}
