// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{crate_version, CommandFactory, Parser, Subcommand};

use paradigmfs::archive::Filesystem;
use paradigmfs::display::{ArchiveDisplayable, Options, SectionFormat};
use paradigmfs::io::{convert_models, convert_textures, extract_to_folder, read_rom};

/// Inspect and extract Paradigm Entertainment N64 archives.
#[derive(Debug, Parser)]
#[clap(name = env!("CARGO_CRATE_NAME"), version)]
#[command(version, about, long_about = None)]
pub struct App {
    #[arg(required = false)]
    rom: Option<PathBuf>,

    #[clap(subcommand)]
    command: Option<CLICommand>,
}

#[derive(Debug, Subcommand)]
enum CLICommand {
    /// lists the files in the archive
    Info {
        /// a ROM image (.z64, .v64, or .n64)
        #[arg(required = true)]
        rom: PathBuf,

        /// list the sections of each file
        #[clap(short, long)]
        sections: bool,

        /// include a hex dump of each section
        #[clap(short = 'x', long)]
        hex: bool,
    },

    /// writes every file in the archive to disk
    Extract {
        /// a ROM image (.z64, .v64, or .n64)
        #[arg(required = true)]
        rom: PathBuf,

        /// the output directory, named after the ROM by default
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// converts UVTX textures, UVBT blits and UVFT font characters to PNG
    Textures {
        /// a ROM image (.z64, .v64, or .n64)
        #[arg(required = true)]
        rom: PathBuf,

        /// the output directory, named after the ROM by default
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// print the texture display lists
        #[clap(short, long)]
        commands: bool,
    },

    /// converts UVMD models to Wavefront OBJ
    Models {
        /// a ROM image (.z64, .v64, or .n64)
        #[arg(required = true)]
        rom: PathBuf,

        /// the output directory, named after the ROM by default
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = App::parse();

    match args.command {
        Some(command) => match command {
            CLICommand::Info { rom, sections, hex } => info(rom, sections, hex)?,
            CLICommand::Extract { rom, output } => extract(rom, output)?,
            CLICommand::Textures {
                rom,
                output,
                commands,
            } => textures(rom, output, commands)?,
            CLICommand::Models { rom, output } => models(rom, output)?,
        },
        None => match args.rom {
            Some(rom) => info(rom, false, false)?,
            None => {
                let a = App::command().render_help();
                eprintln!("{}", a);
            }
        },
    }

    Ok(())
}

fn output_dir(rom: &Path, output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| {
        rom.file_stem()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("out"))
    })
}

fn info(rom_path: PathBuf, sections: bool, hex: bool) -> Result<()> {
    let (format, rom) = read_rom(&rom_path)?;
    let filesystem = Filesystem::new(&rom)?;

    let section_format = if hex {
        SectionFormat::Hex
    } else if sections {
        SectionFormat::List
    } else {
        SectionFormat::None
    };

    println!("{} ({format})", rom_path.display());
    println!(
        "{}",
        ArchiveDisplayable::wrap(&filesystem, Options { section_format })
    );
    Ok(())
}

fn extract(rom_path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let dir = output_dir(&rom_path, output);
    let (_, rom) = read_rom(&rom_path)?;

    println!("paradigmfs version {}\n", crate_version!());
    let counts = extract_to_folder(&rom, &dir)?;
    println!("Extracted archive to {}", dir.display());
    println!();
    for (tag, count) in counts {
        println!("{tag}: {count} files");
    }
    Ok(())
}

fn textures(rom_path: PathBuf, output: Option<PathBuf>, commands: bool) -> Result<()> {
    let dir = output_dir(&rom_path, output);
    let (_, rom) = read_rom(&rom_path)?;
    let filesystem = Filesystem::new(&rom)?;

    for converted in convert_textures(&filesystem, &dir)? {
        println!("{}", converted.path.display());
        if commands {
            if let Some(listing) = converted.listing {
                print!("{listing}");
            }
        }
    }
    Ok(())
}

fn models(rom_path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let dir = output_dir(&rom_path, output);
    let (_, rom) = read_rom(&rom_path)?;
    let filesystem = Filesystem::new(&rom)?;

    for path in convert_models(&filesystem, &dir)? {
        println!("{}", path.display());
    }
    Ok(())
}
