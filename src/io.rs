// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Reading ROMs and writing extracted files.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info};

use crate::archive::{ArchiveFile, Filesystem};
use crate::index::FileTableKind;
use crate::names;
use crate::rom::{self, RomFormat};
use crate::rsp::Vertex;
use crate::uvbt::Blit;
use crate::uvft::Font;
use crate::uvmd::Model;
use crate::uvtx::Texture;
use crate::Tag;

const ORIGINAL_DIR: &str = "Original";
const UNPACKED_DIR: &str = "Unpacked";
const CONVERTED_DIR: &str = "Converted";

pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    if !Path::exists(path) {
        bail!(format!("File not found: {}", path.display()));
    }

    Ok(std::fs::read(path)?)
}

/// Reads a cartridge image and converts it to big-endian byte order.
pub fn read_rom(path: &Path) -> Result<(RomFormat, Vec<u8>)> {
    let mut bytes = read_bytes(path)?;
    let format = rom::normalize(&mut bytes);
    Ok((format, bytes))
}

fn write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

/// Writes the payload of `file` under `Original/` and its sections under
/// `Unpacked/`.
fn extract_file(file: &ArchiveFile, dir: &Path) -> Result<()> {
    let (folder, extension) = names::output_folder(file);
    let stem = names::file_stem(file)?;
    let name = format!("{stem}.{extension}");

    write(&dir.join(ORIGINAL_DIR).join(&folder).join(&name), file.payload())?;

    let unpacked = dir.join(UNPACKED_DIR).join(&folder);
    if file.is_headerless() {
        return write(&unpacked.join(&name), file.payload());
    }

    let sections = file.sections()?;
    if let [section] = sections.as_slice() {
        return write(&unpacked.join(&name), section.data());
    }
    for (i, section) in sections.iter().enumerate() {
        let section_name = format!("{:03}.{}", i + 1, section.tag().to_extension());
        write(&unpacked.join(&stem).join(section_name), section.data())?;
    }
    Ok(())
}

/// Extracts every file of the archive in `rom` into `dir`, along with the
/// data before the file table, the table itself, any gaps between files and
/// unusual data after the last file.
///
/// Returns the number of files of each table type.
pub fn extract_to_folder(rom: &[u8], dir: &Path) -> Result<BTreeMap<Tag, usize>> {
    let filesystem = Filesystem::new(rom)?;
    let table = filesystem.table();
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    write(
        &dir.join("[0x00000] Data before file table.bin"),
        &rom[..filesystem.start_of_table()],
    )?;
    write(
        &dir.join(format!("[{:#08x}] File Table.bin", table.offset())),
        table.raw_bytes(),
    )?;
    if let (FileTableKind::FlightGame, Some(decompressed)) =
        (table.kind(), table.decompressed_bytes())
    {
        write(
            &dir.join(format!("[{:#08x}] File Table (decompressed).bin", table.offset())),
            decompressed,
        )?;
    }
    info!("file table saved");

    let mut counts = BTreeMap::new();
    let mut previous_end = table.start_of_files();
    for file in filesystem.files() {
        if file.offset() > previous_end {
            debug!("gap {previous_end:#x}..{:#x}", file.offset());
            write(
                &dir.join(format!("[{previous_end:#08x}].bin")),
                &rom[previous_end..file.offset()],
            )?;
        }
        extract_file(file, dir)
            .with_context(|| format!("extracting {} at {:#x}", file.type_name(), file.offset()))?;
        *counts.entry(file.table_tag()).or_insert(0) += 1;
        previous_end = previous_end.max(file.end());
    }

    if let Some((offset, data)) = filesystem.trailing_data() {
        write(
            &dir.join(format!("[{offset:#08x}] Data after all files.bin")),
            data,
        )?;
    }

    Ok(counts)
}

/// Paths written by [convert_textures].
pub struct Converted {
    pub path: PathBuf,
    /// Display list disassembly for `UVTX` files.
    pub listing: Option<String>,
}

/// Decodes every `UVTX`, `UVBT` and `UVFT` file to PNG under
/// `dir/Converted`. Fonts get a folder per file with one PNG per character.
pub fn convert_textures(filesystem: &Filesystem, dir: &Path) -> Result<Vec<Converted>> {
    let mut converted = Vec::new();
    for file in filesystem.files() {
        let context = || format!("converting {} at {:#x}", file.type_name(), file.offset());
        match file.header_tag() {
            Some(Tag::UVTX) => {
                let section = file.single_section().with_context(context)?;
                let texture = Texture::parse(section.data()).with_context(context)?;
                let (tile, image) = texture.to_image().with_context(context)?;
                let path = dir
                    .join(CONVERTED_DIR)
                    .join(names::folder_name("UVTX"))
                    .join(format!("{}-{tile}.png", names::file_stem(file)?));
                save_png(&image, &path)?;
                converted.push(Converted {
                    path,
                    listing: Some(texture.listing()?),
                });
            }
            Some(Tag::UVBT) => {
                let section = file.single_section().with_context(context)?;
                let image = Blit::parse(section.data())
                    .and_then(|b| b.to_image())
                    .with_context(context)?;
                let path = dir
                    .join(CONVERTED_DIR)
                    .join(names::folder_name("UVBT"))
                    .join(format!("{}.png", names::file_stem(file)?));
                save_png(&image, &path)?;
                converted.push(Converted {
                    path,
                    listing: None,
                });
            }
            Some(Tag::UVFT) => {
                let folder = dir
                    .join(CONVERTED_DIR)
                    .join(names::folder_name("UVFT"))
                    .join(names::file_stem(file)?);
                for (name, image) in convert_font(file).with_context(context)? {
                    let path = folder.join(format!("{name}.png"));
                    save_png(&image, &path)?;
                    converted.push(Converted {
                        path,
                        listing: None,
                    });
                }
                info!("converted font at {:#x}", file.offset());
            }
            _ => {}
        }
    }
    Ok(converted)
}

fn convert_font(file: &ArchiveFile) -> crate::Result<Vec<(String, image::RgbaImage)>> {
    let frmt = file.section(Tag::new(*b"FRMT"))?;
    let bitm = file.section(Tag::new(*b"BITM"))?;
    let strg = file.section(Tag::new(*b"STRG"))?;
    let sheets = file.sections_of_type(Tag::new(*b"IMAG"))?;
    let images = sheets.iter().map(|s| s.data()).collect();
    Font::parse(frmt.data(), bitm.data(), strg.data(), images)?.to_images()
}

fn save_png(image: &image::RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))
}

/// Writes every level of detail of every `UVMD` file as a Wavefront OBJ
/// under `dir/Converted`.
pub fn convert_models(filesystem: &Filesystem, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for file in filesystem.files() {
        if file.header_tag() != Some(Tag::UVMD) {
            continue;
        }
        let context = || format!("converting {} at {:#x}", file.type_name(), file.offset());
        let section = file.single_section().with_context(context)?;
        let model = Model::parse(section.data()).with_context(context)?;

        let stem = names::file_stem(file)?;
        for lod in 0..model.lods.len() {
            let triangles = model.lod_triangles(lod).with_context(context)?;
            let path = dir
                .join(CONVERTED_DIR)
                .join(names::folder_name("UVMD"))
                .join(format!("{stem}-lod{lod}.obj"));
            let mut obj = Vec::new();
            write_obj(&triangles, &mut obj)?;
            write(&path, &obj)?;
            written.push(path);
        }
    }
    Ok(written)
}

/// Writes a triangle list as Wavefront OBJ text: one `v` and `vt` per
/// vertex and one `f` per triangle.
pub fn write_obj(triangles: &[Vertex], out: &mut impl Write) -> Result<()> {
    for v in triangles {
        let [r, g, b, _] = v.color();
        writeln!(
            out,
            "v {} {} {} {:.4} {:.4} {:.4}",
            v.x,
            v.y,
            v.z,
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0
        )?;
    }
    for v in triangles {
        let (s, t) = v.st();
        writeln!(out, "vt {s} {t}")?;
    }
    for i in (1..=triangles.len()).step_by(3) {
        writeln!(out, "f {0}/{0} {1}/{1} {2}/{2}", i, i + 1, i + 2)?;
    }
    Ok(())
}
