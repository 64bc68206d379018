// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Human readable names for archive file types.
//!
//! Folder names follow the names the games' own loaders use where one is
//! known, and the type tag otherwise.

use crate::archive::ArchiveFile;
use crate::error::Result;
use crate::Tag;

/// Folder for `UVRW` files, with or without a header.
pub const RAW_FOLDER: &str = "_raw";

/// Extension for `UVRW` files without a `FORM` header.
pub const HEADERLESS_EXTENSION: &str = "headerless_file";

const FOLDER_NAMES: &[(&str, &str)] = &[
    // AeroFighters Assault
    ("    ", "BLANK_FILETYPE"),
    ("3VUE", "3VUE"),
    ("ADAT", "ADAT"),
    ("CNMA", "cinema"),
    ("DEMO", "DEMO"),
    ("FTKL", "itrack"),
    ("LART", "LART"),
    ("PDAT", "PDAT"),
    ("SDOC", "SDOC"),
    ("SHAN", "SHAN"),
    ("SLAN", "SLAN"),
    ("SPTH", "SPTH"),
    ("SRED", "SRED"),
    ("SSHT", "SSHT"),
    ("STRY", "f1story"),
    ("Trai", "Trai"),
    ("UPWL", "UPWL"),
    ("UPWT", "UPWT"),
    ("UVAN", "janim"),
    ("UVBT", "blit"),
    ("UVCT", "contour"),
    ("UVDS", "dset"),
    ("UVEN", "env"),
    ("UVFT", "font"),
    ("UVLT", "UVLT"),
    ("UVLV", "UVLV"),
    ("UVMB", "UVMB"),
    ("UVMD", "uvmodel"),
    ("UVMO/MODU", "MODU"),
    ("UVMS", "UVMS"),
    ("UVPX", "pfx"),
    ("UVSX", "UVSX"),
    ("UVSY", "UVSY"),
    ("UVTR", "terra"),
    ("UVTP", "texturexref"),
    ("UVTS/UVSQ", "tseq"),
    ("UVSQ", "tseq"),
    ("UVTT", "track"),
    ("UVTX", "texture"),
    ("UVVL", "volume"),
];

/// Maps a type name as produced by [ArchiveFile::type_name] to a folder
/// name. Unknown types map to themselves.
pub fn folder_name(type_name: &str) -> &str {
    FOLDER_NAMES
        .iter()
        .find(|(name, _)| *name == type_name)
        .map_or(type_name, |(_, folder)| folder)
}

/// The folder and file extension used when extracting `file`.
pub fn output_folder(file: &ArchiveFile) -> (String, String) {
    if file.table_tag() == Tag::UVRW {
        let extension = match file.header_tag() {
            Some(tag) => tag.to_extension(),
            None => HEADERLESS_EXTENSION.to_string(),
        };
        return (RAW_FOLDER.to_string(), extension);
    }

    let folder = folder_name(&file.type_name()).replace('/', "_");
    (folder.clone(), folder)
}

/// The base name used when extracting `file`: its offset, followed by the
/// model name for `UVMO` files.
pub fn file_stem(file: &ArchiveFile) -> Result<String> {
    let mut stem = format!("[{:#08x}]", file.offset());
    if file.table_tag() == Tag::new(*b"UVMO") {
        let debug = file.section(Tag::new(*b"MDBG"))?;
        let name: String = debug
            .data()
            .iter()
            .filter(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();
        stem.push(' ');
        stem.push_str(&name);
    }
    Ok(stem)
}
