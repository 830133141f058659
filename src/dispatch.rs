//! Version-tag sniffing and routing of directory entries to decoders.

use enum_iterator::Sequence;
use log::warn;
use rhexdump::rhexdumps;
use serde::Serialize;

use crate::{
    archive::DirectoryLayout,
    cursor::{ByteCursor, ByteOrder},
    error::{DecodeError, Result},
};

/// Every tagged format the decoder knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Serialize)]
pub enum FormatKind {
    Directory,
    Mesh,
    Tex,
    Trans,
    TransAnim,
    PropAnim,
    CharClipSamples,
    Mat,
}

impl FormatKind {
    pub fn allowlist(self) -> &'static [u32] {
        match self {
            FormatKind::Directory => &[6, 10, 24, 25, 28, 32],
            FormatKind::Mesh => &[10, 13, 14, 22, 25, 28, 29, 34, 36, 37, 38],
            FormatKind::Tex => &[5, 7, 8, 10, 11],
            FormatKind::Trans => &[5, 8, 9],
            FormatKind::TransAnim => &[4, 6, 7],
            FormatKind::PropAnim => &[7, 11, 12],
            FormatKind::CharClipSamples => &[11, 12, 13, 16],
            FormatKind::Mat => &[21, 25, 27, 28, 55, 56, 68],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FormatKind::Directory => "directory",
            FormatKind::Mesh => "Mesh",
            FormatKind::Tex => "Tex",
            FormatKind::Trans => "Trans",
            FormatKind::TransAnim => "TransAnim",
            FormatKind::PropAnim => "PropAnim",
            FormatKind::CharClipSamples => "CharClipSamples",
            FormatKind::Mat => "Mat",
        }
    }

    pub fn accepts(self, version: u32) -> bool {
        self.allowlist().contains(&version)
    }
}

/// A version tag together with the byte order it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatTag {
    pub raw: u32,
    pub version: u32,
    pub order: ByteOrder,
}

/// Interprets the leading 4 bytes of a payload. The big-endian reading wins
/// if it is on the allowlist, then the little-endian one. With an override
/// only that order is tried.
pub fn sniff(payload: &[u8], kind: FormatKind, order_override: Option<ByteOrder>) -> Result<FormatTag> {
    let mut cur = ByteCursor::new(payload);
    let raw = cur.read_u32(ByteOrder::Big)?;
    let candidates: &[ByteOrder] = match order_override {
        Some(ByteOrder::Big) => &[ByteOrder::Big],
        Some(ByteOrder::Little) => &[ByteOrder::Little],
        None => &[ByteOrder::Big, ByteOrder::Little],
    };
    for &order in candidates {
        let version = match order {
            ByteOrder::Big => raw,
            ByteOrder::Little => raw.swap_bytes(),
        };
        if kind.accepts(version) {
            return Ok(FormatTag { raw, version, order });
        }
    }
    let head = &payload[..payload.len().min(0x40)];
    warn!(
        "Unknown {} version tag 0x{raw:08x}, payload head:\n{}",
        kind.name(),
        rhexdumps!(head)
    );
    Err(DecodeError::UnknownFormatVersion {
        kind: kind.name(),
        raw,
    })
}

/// Which decoder a directory entry goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryRoute {
    Texture,
    Material,
    Mesh,
    Transform,
    TransAnim,
    PropAnim,
    ClipSamples,
    Ignored,
}

impl EntryRoute {
    pub fn classify(kind: &str, name: &str, layout: DirectoryLayout) -> Self {
        match kind {
            k if k.contains("TexBlend") => EntryRoute::Ignored,
            "Tex" => EntryRoute::Texture,
            "Mat" => EntryRoute::Material,
            // the oldest archives keep their bones as Mesh objects
            "Mesh" if layout == DirectoryLayout::Flat && name.contains("bone") => EntryRoute::Transform,
            "Mesh" => EntryRoute::Mesh,
            "Trans" => EntryRoute::Transform,
            "TransAnim" => EntryRoute::TransAnim,
            "PropAnim" => EntryRoute::PropAnim,
            "CharClipSamples" => EntryRoute::ClipSamples,
            _ => EntryRoute::Ignored,
        }
    }

    pub fn format(self) -> Option<FormatKind> {
        Some(match self {
            EntryRoute::Texture => FormatKind::Tex,
            EntryRoute::Material => FormatKind::Mat,
            EntryRoute::Mesh => FormatKind::Mesh,
            EntryRoute::Transform => FormatKind::Trans,
            EntryRoute::TransAnim => FormatKind::TransAnim,
            EntryRoute::PropAnim => FormatKind::PropAnim,
            EntryRoute::ClipSamples => FormatKind::CharClipSamples,
            EntryRoute::Ignored => return None,
        })
    }

    /// Decode pass this route belongs to. Materials resolve textures by name
    /// and everything else resolves materials, so textures come first.
    pub fn phase(self) -> usize {
        match self {
            EntryRoute::Texture => 0,
            EntryRoute::Material => 1,
            _ => 2,
        }
    }
}
