// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

use std::default::Default;
use std::fmt::{Display, Formatter, Result};

/// How the sections of each file are shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SectionFormat {
    #[default]
    None,
    /// One line per section.
    List,
    /// One line per section followed by a hex dump of its data.
    Hex,
}

/// Options for displaying a [Filesystem](super::archive::Filesystem).
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    /// The section format to emit
    pub section_format: SectionFormat,
}

/// Display something with options.
pub trait DisplayWithOptions: Display {
    fn fmt_with_options(&self, f: &mut Formatter<'_>, _options: &Options) -> Result {
        self.fmt(f)
    }
}

pub struct ArchiveDisplayable<'a, P: DisplayWithOptions> {
    p: &'a P,
    options: Options,
}

impl<'a, P> ArchiveDisplayable<'a, P>
where
    P: DisplayWithOptions,
{
    pub fn wrap(p: &'a P, options: Options) -> ArchiveDisplayable<'a, P> {
        Self { p, options }
    }
}

impl<P> Display for ArchiveDisplayable<'_, P>
where
    P: DisplayWithOptions,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.p.fmt_with_options(f, &self.options)
    }
}

/// Writes `data` as rows of 16 bytes prefixed by their offset.
pub(crate) fn write_hex(f: &mut Formatter<'_>, indent: &str, data: &[u8]) -> Result {
    for (i, chunk) in data.chunks(16).enumerate() {
        write!(f, "{indent}{:04x}:", i * 16)?;
        for byte in chunk {
            write!(f, " {:02x}", byte)?;
        }
        writeln!(f)?;
    }
    Ok(())
}
