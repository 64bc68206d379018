// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

mod common;

use paradigmfs::archive::Filesystem;
use paradigmfs::error::{Error, FormatError};
use paradigmfs::index::FileTableKind;
use paradigmfs::io::extract_to_folder;
use paradigmfs::rom::{self, RomFormat};
use paradigmfs::Tag;

use common::{chunk, flight_game_rom, form, gzip, normal_rom, normal_table, start_of_files};

fn two_files() -> Vec<(&'static [u8; 4], Vec<u8>)> {
    vec![
        (b"UVMD", form(b"UVMD", &[chunk(b"COMM", &[1, 2, 3, 4])])),
        (b"UVTX", form(b"UVTX", &[chunk(b"COMM", &[5, 6, 7, 8, 9, 10, 11, 12])])),
    ]
}

#[test]
fn test_normal_archive() {
    let files = two_files();
    let rom = normal_rom(&files);
    let fs = Filesystem::new(&rom).expect("filesystem");

    let table = fs.table();
    assert_eq!(FileTableKind::Normal, table.kind());
    assert_eq!(common::CART_HEADER_LEN, fs.start_of_table());
    assert_eq!(
        start_of_files(normal_table(&files).len()),
        table.start_of_files()
    );

    assert_eq!(2, fs.files().len());
    let model = fs.file(Tag::UVMD, 0).expect("model");
    assert_eq!(table.start_of_files(), model.offset());
    assert_eq!(Some(Tag::UVMD), model.header_tag());
    assert_eq!(&[1, 2, 3, 4], model.single_section().unwrap().data());

    let texture = fs.file(Tag::UVTX, 0).expect("texture");
    assert_eq!(model.end(), texture.offset());
    assert_eq!(
        &[5, 6, 7, 8, 9, 10, 11, 12],
        texture.section(Tag::COMM).unwrap().data()
    );

    assert_eq!(rom.len(), fs.end_of_archive());
    assert_eq!(None, fs.trailing_data());
}

#[test]
fn test_byte_swapped_rom() {
    let mut rom = normal_rom(&two_files());
    for pair in rom.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
    assert_eq!(RomFormat::V64, rom::normalize(&mut rom));
    assert_eq!(2, Filesystem::new(&rom).expect("filesystem").files().len());
}

#[test]
fn test_filler_after_archive_is_ignored() {
    let mut rom = normal_rom(&two_files());
    let end = rom.len();
    rom.resize(end.next_multiple_of(16), 0);
    rom.extend([0xFF; 64]);
    let fs = Filesystem::new(&rom).expect("filesystem");
    assert_eq!(end, fs.end_of_archive());
    assert_eq!(None, fs.trailing_data());
}

#[test]
fn test_trailing_data_is_reported() {
    let mut rom = normal_rom(&two_files());
    let end = rom.len();
    rom.resize(end.next_multiple_of(16), 0);
    let aligned = rom.len();
    rom.extend(b"not filler");
    let fs = Filesystem::new(&rom).expect("filesystem");
    assert_eq!(
        Some((aligned, b"not filler".as_slice())),
        fs.trailing_data()
    );
}

#[test]
fn test_dirty_alignment_reports_from_boundary() {
    let mut rom = normal_rom(&two_files());
    let end = rom.len();
    rom.extend([0xEE, 0xEE]);
    rom.resize(end.next_multiple_of(16), 0);
    let aligned = rom.len();
    rom.extend([0u8; 32]);
    let fs = Filesystem::new(&rom).expect("filesystem");
    assert_eq!(Some((aligned, [0u8; 32].as_slice())), fs.trailing_data());

    let dir = tempfile::tempdir().expect("tempdir");
    extract_to_folder(&rom, dir.path()).expect("extract");
    let written = dir
        .path()
        .join(format!("[{aligned:#08x}] Data after all files.bin"));
    assert_eq!(vec![0u8; 32], std::fs::read(written).expect("trailing data"));
}

#[test]
fn test_many_files_of_one_type() {
    let files: Vec<(&[u8; 4], Vec<u8>)> = (0..5u8)
        .map(|i| (b"UVMD", form(b"UVMD", &[chunk(b"COMM", &[i; 4])])))
        .collect();
    let rom = normal_rom(&files);
    let fs = Filesystem::new(&rom).expect("filesystem");

    assert_eq!(5, fs.table().entries().len());
    assert_eq!(5, fs.files_of_type(Tag::UVMD).count());
    let last = fs.file(Tag::UVMD, 4).expect("fifth model");
    assert_eq!(&[4; 4], last.single_section().unwrap().data());
    assert_eq!(rom.len(), last.end());
}

#[test]
fn test_missing_table() {
    let rom = form(b"UVMD", &[chunk(b"COMM", &[0; 4])]);
    assert_eq!(Some(Error::NotFound), Filesystem::new(&rom).err());
}

#[test]
fn test_misplaced_file_is_inconsistent() {
    let mut files = two_files();
    // shorten the first file so it no longer meets the second
    let short = form(b"UVMD", &[chunk(b"COMM", &[1, 2])]);
    let padding = files[0].1.len() - short.len();
    let mut first = short;
    first.extend(vec![0; padding]);
    files[0].1 = first;

    let rom = normal_rom(&files);
    assert!(matches!(
        Filesystem::new(&rom),
        Err(Error::Format(FormatError::TableInconsistent { .. }))
    ));
}

#[test]
fn test_truncated_section() {
    // the section claims more data than its FORM holds
    let mut section = chunk(b"COMM", &[1, 2, 3, 4]);
    section[7] = 0x40;
    let files = vec![(b"UVMD", form(b"UVMD", &[section]))];
    let rom = normal_rom(&files);

    let fs = Filesystem::new(&rom).expect("filesystem");
    assert!(matches!(
        fs.files()[0].sections(),
        Err(Error::Format(FormatError::Truncated { .. }))
    ));
}

#[test]
fn test_compressed_section() {
    let data: Vec<u8> = (0..40).collect();
    let files = vec![(b"UVMD", form(b"UVMD", &[gzip(b"COMM", &data)]))];
    let rom = normal_rom(&files);

    let fs = Filesystem::new(&rom).expect("filesystem");
    let section = fs.files()[0].single_section().expect("section");
    assert_eq!(Tag::COMM, section.tag());
    assert!(section.is_compressed());
    assert_eq!(data.as_slice(), section.data());
}

#[test]
fn test_flight_game_archive() {
    let files = vec![
        (b"UVMD", form(b"UVMD", &[chunk(b"COMM", &[1, 2, 3, 4])])),
        (b"UVTX", form(b"UVTX", &[chunk(b"COMM", &[5, 6])])),
        (b"UVMD", form(b"UVMD", &[chunk(b"COMM", &[7; 12])])),
    ];
    let rom = flight_game_rom(&files);
    let fs = Filesystem::new(&rom).expect("filesystem");

    let table = fs.table();
    assert_eq!(FileTableKind::FlightGame, table.kind());
    assert_eq!(Some(24), table.decompressed_bytes().map(|d| d.len()));

    let offsets: Vec<usize> = fs.files().iter().map(|f| f.offset()).collect();
    let start = table.start_of_files();
    assert_eq!(
        vec![
            start,
            start + files[0].1.len(),
            start + files[0].1.len() + files[1].1.len()
        ],
        offsets
    );
    assert_eq!(
        &[7; 12],
        fs.file(Tag::UVMD, 1).unwrap().single_section().unwrap().data()
    );
    assert_eq!(2, fs.files_of_type(Tag::UVMD).count());
}
