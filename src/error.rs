// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Errors raised while decoding an archive.
//!
//! Every error is fatal. The formats handled here form a closed set, so any
//! deviation means either a corrupt dump or a parser bug; nothing is retried
//! or downgraded.

use thiserror::Error;

use crate::Tag;

/// Structural violations found while decoding archive data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad magic at offset {offset:#x}: expected {expected}, found {found}")]
    BadMagic {
        offset: usize,
        expected: Tag,
        found: Tag,
    },

    #[error("{what}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("truncated data at offset {offset:#x} (need {need} bytes, have {have})")]
    Truncated {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("file table inconsistent at offset {offset:#x}: {reason}")]
    TableInconsistent { offset: usize, reason: String },

    #[error("unexpected structure: {0}")]
    UnexpectedStructure(String),

    #[error("unknown opcode {opcode:#04x} in {stream}")]
    UnknownOpcode { stream: &'static str, opcode: u8 },

    #[error("invalid operand for opcode {opcode:#04x}: {reason}")]
    InvalidOperand { opcode: u8, reason: String },

    #[error("unsupported texel format {format} with {bits}-bit texels")]
    UnsupportedTexelFormat { format: String, bits: u32 },

    #[error("color-indexed texels require a palette")]
    MissingPalette,

    #[error("invalid texel layout: {0}")]
    InvalidLayout(String),
}

impl FormatError {
    /// Converts a binrw failure on a fixed-layout record of `size` bytes read
    /// from `bytes` at `offset`.
    pub(crate) fn from_binrw(offset: usize, size: usize, bytes: &[u8], err: binrw::Error) -> Self {
        match err {
            binrw::Error::BadMagic { .. } => FormatError::BadMagic {
                offset,
                expected: Tag::UNKNOWN,
                found: Tag::from_slice(bytes),
            },
            binrw::Error::Io(_) => FormatError::Truncated {
                offset,
                need: size,
                have: bytes.len(),
            },
            other => FormatError::UnexpectedStructure(format!("at {offset:#x}: {other}")),
        }
    }
}

/// Top level error type for the library.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("no file table (FORM + UVFT/UVRM) found in ROM")]
    NotFound,

    #[error(transparent)]
    Format(#[from] FormatError),
}

pub type Result<T> = std::result::Result<T, Error>;
