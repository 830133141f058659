use thiserror::Error;

use crate::platform::Platform;

/// Everything that can go wrong while decoding an archive or one of its entries.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("truncated input at 0x{offset:x}: wanted {wanted} bytes, {available} available")]
    TruncatedInput {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("seek to {position} outside of buffer of {len} bytes")]
    OutOfBounds { position: i64, len: usize },

    #[error("unknown {kind} version tag 0x{raw:08x}")]
    UnknownFormatVersion { kind: &'static str, raw: u32 },

    #[error("malformed directory: {0}")]
    MalformedDirectory(String),

    #[error("bad archive magic 0x{0:08x}")]
    BadMagic(u32),

    #[error("archive is block compressed (magic 0x{0:08x}), inflate it first")]
    CompressedArchive(u32),

    #[error("no {kind} layout for version {version} on {platform}")]
    UnsupportedLayout {
        kind: &'static str,
        version: u32,
        platform: Platform,
    },

    #[error("invalid string at 0x{offset:x}")]
    InvalidString { offset: usize },

    #[error("unresolved {kind} reference {name:?}")]
    UnresolvedReference { kind: &'static str, name: String },

    #[error("cannot export texture {name:?}: {reason}")]
    Export { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binary read error: {0}")]
    Binrw(#[from] binrw::Error),

    #[error("bad name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl DecodeError {
    /// Errors after which no later entry of the same archive can be trusted.
    pub fn is_archive_fatal(&self) -> bool {
        matches!(
            self,
            Self::BadMagic(_)
                | Self::CompressedArchive(_)
                | Self::MalformedDirectory(_)
                | Self::Io(_)
                | Self::Pattern(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
