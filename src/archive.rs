use std::path::{Path, PathBuf};

use binrw::{binread, BinReaderExt};
use fs_err as fs;
use log::{debug, info, warn};
use memmap2::Mmap;
use serde::Serialize;
use walkdir::WalkDir;

use crate::{
    cursor::{ByteCursor, ByteOrder},
    dispatch::{sniff, FormatKind},
    error::{DecodeError, Result},
    platform::Platform,
};

pub const MAGIC_UNCOMPRESSED: u32 = 0xCABE_DEAF;
pub const MAGIC_ZLIB: u32 = 0xCBBE_DEAF;
pub const MAGIC_GZIP: u32 = 0xCCBE_DEAF;
pub const MAGIC_ZLIB_SIZED: u32 = 0xCDBE_DEAF;

/// Separator between the serialized objects of an archive.
pub const SENTINEL: [u8; 4] = [0xAD, 0xDE, 0xAD, 0xDE];

#[binread]
#[br(little)]
#[derive(Debug, Serialize, Clone)]
pub struct MiloHeader {
    pub magic: u32,
    pub start_offset: u32,
    #[br(temp)]
    block_count: u32,
    pub max_block_size: u32,
    #[br(count = block_count)]
    pub block_sizes: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DirectoryLayout {
    /// Entry list only, followed by external paths.
    Flat,
    /// Self record, 8 bytes, then the children.
    Nested,
    /// Self record, 9 bytes, then the children.
    Nested9,
}

impl DirectoryLayout {
    pub fn for_version(version: u32) -> Self {
        match version {
            0..=10 => DirectoryLayout::Flat,
            11..=31 => DirectoryLayout::Nested,
            _ => DirectoryLayout::Nested9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub kind: String,
    pub name: String,
}

impl DirectoryEntry {
    fn read(cur: &mut ByteCursor, order: ByteOrder) -> Result<Self> {
        Ok(Self {
            kind: cur.read_string(order)?,
            name: cur.read_string(order)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Directory {
    pub version: u32,
    #[serde(skip)]
    pub order: ByteOrder,
    pub layout: DirectoryLayout,
    /// The directory's own record, also present as `entries[0]`.
    pub root: Option<DirectoryEntry>,
    pub entries: Vec<DirectoryEntry>,
    pub external_paths: Vec<String>,
}

impl Directory {
    fn read(cur: &mut ByteCursor, order_override: Option<ByteOrder>) -> Result<Self> {
        let tag = sniff(cur.peek_rest(), FormatKind::Directory, order_override)?;
        cur.skip(4)?;
        let order = tag.order;
        let layout = DirectoryLayout::for_version(tag.version);
        let mut entries = vec![];
        let mut root = None;
        let mut external_paths = vec![];
        match layout {
            DirectoryLayout::Flat => {
                let count = cur.read_u32(order)?;
                for _ in 0..count {
                    entries.push(DirectoryEntry::read(cur, order)?);
                }
                external_paths = cur.read_string_list(order)?;
            }
            DirectoryLayout::Nested | DirectoryLayout::Nested9 => {
                let this = DirectoryEntry::read(cur, order)?;
                entries.push(this.clone());
                root = Some(this);
                cur.skip(if layout == DirectoryLayout::Nested { 8 } else { 9 })?;
                let count = cur.read_u32(order)?;
                for _ in 0..count {
                    entries.push(DirectoryEntry::read(cur, order)?);
                }
            }
        }
        debug!(
            "Directory v{} ({layout:?}, {order:?}) with {} entries",
            tag.version,
            entries.len()
        );
        Ok(Self {
            version: tag.version,
            order,
            layout,
            root,
            entries,
            external_paths,
        })
    }
}

/// One directory entry with the bytes that belong to it.
#[derive(Debug, Clone)]
pub struct ArchiveEntry<'a> {
    pub kind: String,
    pub name: String,
    pub payload: &'a [u8],
}

#[derive(Debug)]
pub struct Archive<'a> {
    pub header: MiloHeader,
    pub platform: Platform,
    pub directory: Directory,
    pub entries: Vec<ArchiveEntry<'a>>,
    /// Payloads past the last directory entry.
    pub surplus: Vec<&'a [u8]>,
}

fn check_magic(magic: u32) -> Result<()> {
    match magic {
        MAGIC_UNCOMPRESSED => Ok(()),
        MAGIC_ZLIB | MAGIC_GZIP | MAGIC_ZLIB_SIZED => Err(DecodeError::CompressedArchive(magic)),
        other => Err(DecodeError::BadMagic(other)),
    }
}

/// Splits on every non-overlapping occurrence of [`SENTINEL`].
pub fn split_payloads(data: &[u8]) -> Vec<&[u8]> {
    let mut parts = vec![];
    let mut start = 0;
    let mut pos = 0;
    while pos + SENTINEL.len() <= data.len() {
        if data[pos..pos + SENTINEL.len()] == SENTINEL {
            parts.push(&data[start..pos]);
            pos += SENTINEL.len();
            start = pos;
        } else {
            pos += 1;
        }
    }
    parts.push(&data[start..]);
    parts
}

impl<'a> Archive<'a> {
    pub fn parse(data: &'a [u8], platform: Platform, order_override: Option<ByteOrder>) -> Result<Self> {
        let mut cur = ByteCursor::new(data);
        check_magic(cur.read_u32(ByteOrder::Little)?)?;
        let mut reader = std::io::Cursor::new(data);
        let header: MiloHeader = reader.read_le().map_err(|err| {
            if err.is_eof() {
                DecodeError::MalformedDirectory("archive header is truncated".into())
            } else {
                err.into()
            }
        })?;
        cur.seek_absolute(header.start_offset as usize)
            .map_err(|_| DecodeError::MalformedDirectory(format!("start offset 0x{:x} past end of file", header.start_offset)))?;
        let directory = Directory::read(&mut cur, order_override).map_err(|err| match err {
            err @ DecodeError::UnknownFormatVersion { .. } => {
                DecodeError::MalformedDirectory(err.to_string())
            }
            DecodeError::TruncatedInput { offset, .. } => {
                DecodeError::MalformedDirectory(format!("directory truncated at 0x{offset:x}"))
            }
            other => other,
        })?;
        let mut payloads = split_payloads(cur.rest());
        let expected = directory.entries.len();
        if payloads.len() > expected && payloads.last().is_some_and(|p| p.is_empty()) {
            // terminator after the last object
            payloads.pop();
        }
        if payloads.len() < expected {
            return Err(DecodeError::MalformedDirectory(format!(
                "{expected} directory entries but only {} payloads",
                payloads.len()
            )));
        }
        let surplus = payloads.split_off(expected);
        if !surplus.is_empty() {
            warn!(
                "{} payloads beyond the {expected} directory entries, directory layout may not match this archive",
                surplus.len()
            );
        }
        let entries = directory
            .entries
            .iter()
            .zip(payloads)
            .map(|(entry, payload)| ArchiveEntry {
                kind: entry.kind.clone(),
                name: entry.name.clone(),
                payload,
            })
            .collect();
        Ok(Self {
            header,
            platform,
            directory,
            entries,
            surplus,
        })
    }

    pub fn root_kind(&self) -> Option<&str> {
        self.directory.root.as_ref().map(|r| r.kind.as_str())
    }
}

/// A memory-mapped archive on disk.
#[derive(Debug)]
pub struct ArchiveFile {
    _fh: fs::File,
    mm: Mmap,
    path: PathBuf,
    platform: Platform,
}

impl ArchiveFile {
    pub fn open<P: AsRef<Path>>(path: P, platform: Platform) -> Result<Self> {
        let fh = fs::File::open(path.as_ref())?;
        let mm = unsafe { Mmap::map(&fh)? };
        info!("Opened {} ({} bytes, {platform})", path.as_ref().display(), mm.len());
        Ok(Self {
            _fh: fh,
            mm,
            path: path.as_ref().to_owned(),
            platform,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mm
    }

    pub fn parse(&self, order_override: Option<ByteOrder>) -> Result<Archive<'_>> {
        Archive::parse(&self.mm, self.platform, order_override)
    }
}

/// Every file below `root` whose extension names a platform.
pub fn find_archives<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let mut files = vec![];
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if entry.file_type().is_file() && Platform::from_path(path).is_some() {
            files.push(path.to_owned());
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_empty_parts() {
        let data = [1, 0xAD, 0xDE, 0xAD, 0xDE, 0xAD, 0xDE, 0xAD, 0xDE, 2, 0xAD, 0xDE, 0xAD, 0xDE];
        let parts = split_payloads(&data);
        assert_eq!(parts, vec![&[1u8][..], &[][..], &[2u8][..], &[][..]]);
    }

    #[test]
    fn split_without_sentinel() {
        assert_eq!(split_payloads(&[1, 2, 3]), vec![&[1u8, 2, 3][..]]);
        assert_eq!(split_payloads(&[]), vec![&[0u8; 0][..]]);
    }

    #[test]
    fn layout_thresholds() {
        assert_eq!(DirectoryLayout::for_version(10), DirectoryLayout::Flat);
        assert_eq!(DirectoryLayout::for_version(25), DirectoryLayout::Nested);
        assert_eq!(DirectoryLayout::for_version(28), DirectoryLayout::Nested);
        assert_eq!(DirectoryLayout::for_version(32), DirectoryLayout::Nested9);
    }

    #[test]
    fn magic_classes() {
        assert!(check_magic(MAGIC_UNCOMPRESSED).is_ok());
        assert!(matches!(check_magic(MAGIC_ZLIB), Err(DecodeError::CompressedArchive(_))));
        assert!(matches!(check_magic(0x1234), Err(DecodeError::BadMagic(0x1234))));
    }
}
