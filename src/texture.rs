//! Bitmap payloads and their DDS / TPL re-encoding.

use std::{
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use binrw::BinWrite;
use fs_err as fs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    cursor::ByteCursor,
    dispatch::FormatTag,
    error::{DecodeError, Result},
    platform::Platform,
};

/// Which game family's header layout to assume for non-DC3 textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureProfile {
    #[default]
    Auto,
    Lrb,
    Gdrb,
    Rb3,
}

impl std::str::FromStr for TextureProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(TextureProfile::Auto),
            "lrb" => Ok(TextureProfile::Lrb),
            "gdrb" => Ok(TextureProfile::Gdrb),
            "rb3" => Ok(TextureProfile::Rb3),
            other => Err(format!("unknown texture profile {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TexLayout {
    width_at: usize,
    before_name: usize,
    before_encoding: usize,
    before_pixels: usize,
    swapped: bool,
}

impl TexLayout {
    const STANDARD: Self = Self {
        width_at: 17,
        before_name: 4,
        before_encoding: 11,
        before_pixels: 25,
        swapped: false,
    };
    const LRB: Self = Self {
        before_name: 8,
        ..Self::STANDARD
    };
    const GDRB: Self = Self {
        width_at: 18,
        ..Self::STANDARD
    };
    const RB3: Self = Self {
        before_encoding: 12,
        ..Self::STANDARD
    };
    const DC3: Self = Self {
        before_encoding: 16,
        before_pixels: 21,
        swapped: true,
        ..Self::STANDARD
    };

    fn select(version: u32, profile: TextureProfile) -> Self {
        if version == 11 {
            return Self::DC3;
        }
        match profile {
            TextureProfile::Auto => Self::STANDARD,
            TextureProfile::Lrb => Self::LRB,
            TextureProfile::Gdrb => Self::GDRB,
            TextureProfile::Rb3 => Self::RB3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelEncoding {
    Dxt1,
    Dxt5,
    Ati2,
    Unknown(u32),
}

impl From<u32> for PixelEncoding {
    fn from(raw: u32) -> Self {
        match raw {
            8 => PixelEncoding::Dxt1,
            24 => PixelEncoding::Dxt5,
            32 => PixelEncoding::Ati2,
            other => PixelEncoding::Unknown(other),
        }
    }
}

impl PixelEncoding {
    /// Unknown encodings get an all-zero code and are written uncompressed.
    pub fn four_cc(self) -> [u8; 4] {
        match self {
            PixelEncoding::Dxt1 => *b"DXT1",
            PixelEncoding::Dxt5 => *b"DXT5",
            PixelEncoding::Ati2 => *b"ATI2",
            PixelEncoding::Unknown(_) => [0; 4],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureAsset {
    pub name: String,
    pub source_path: String,
    pub width: u32,
    pub height: u32,
    pub mip_count: u8,
    pub encoding: PixelEncoding,
    #[serde(skip)]
    pub pixels: Vec<u8>,
}

/// Swaps the two bytes of every 16-bit word; an odd last byte stays put.
pub fn swap_words(data: &mut [u8]) {
    for pair in data.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

fn clean_source_path(raw: &str) -> String {
    raw.trim_start_matches("../").replace('/', "_")
}

pub fn decode_texture(
    name: &str,
    payload: &[u8],
    tag: FormatTag,
    platform: Platform,
    profile: TextureProfile,
) -> Result<TextureAsset> {
    let order = tag.order;
    let layout = TexLayout::select(tag.version, profile);
    let mut cur = ByteCursor::new(payload);
    cur.seek_absolute(layout.width_at)?;
    let width = cur.read_u32(order)?;
    let height = cur.read_u32(order)?;
    cur.skip(layout.before_name)?;
    let source_path = clean_source_path(&cur.read_string(order)?);
    cur.skip(layout.before_encoding)?;
    let encoding = PixelEncoding::from(cur.read_u32(order)?);
    let mip_count = cur.read_u8()?;
    cur.skip(layout.before_pixels)?;
    let mut pixels = cur.rest().to_vec();
    if layout.swapped || platform == Platform::Xbox360 {
        swap_words(&mut pixels);
    }
    debug!(
        "Tex {name} v{}: {width}x{height} {encoding:?}, {mip_count} mips, {} bytes",
        tag.version,
        pixels.len()
    );
    Ok(TextureAsset {
        name: name.to_owned(),
        source_path,
        width,
        height,
        mip_count,
        encoding,
        pixels,
    })
}

#[derive(BinWrite)]
#[bw(little, magic = b"DDS ")]
struct DdsHeader {
    size: u32,
    flags: u32,
    height: u32,
    width: u32,
    pitch: u32,
    depth: u32,
    mip_count: u32,
    reserved: [u32; 11],
    pf_size: u32,
    pf_flags: u32,
    four_cc: [u8; 4],
    pf_masks: [u32; 5],
    caps: u32,
    caps_rest: [u32; 4],
}

pub const DDS_HEADER_LEN: usize = 128;

pub fn write_dds<W: Write>(tex: &TextureAsset, mut out: W) -> Result<()> {
    let header = DdsHeader {
        size: 124,
        flags: 0x81007,
        height: tex.height,
        width: tex.width,
        pitch: 0,
        depth: 0,
        mip_count: u32::from(tex.mip_count),
        reserved: [0; 11],
        pf_size: 32,
        pf_flags: 4,
        four_cc: tex.encoding.four_cc(),
        pf_masks: [0; 5],
        caps: 0x1000,
        caps_rest: [0; 4],
    };
    let mut buf = Cursor::new(Vec::with_capacity(DDS_HEADER_LEN));
    header.write(&mut buf)?;
    out.write_all(buf.get_ref())?;
    out.write_all(&tex.pixels)?;
    Ok(())
}

#[derive(BinWrite)]
#[bw(big, magic = b"\x00\x20\xAF\x30")]
struct TplHeader {
    image_count: u32,
    table_offset: u32,
    header_offset: u32,
    palette_offset: u32,
    height: u16,
    width: u16,
    format: u32,
    data_offset: u32,
    wrap: [u32; 2],
    filter: [u32; 2],
    lod_bias: f32,
    flags: [u8; 4],
    padding: [u32; 2],
}

pub const TPL_HEADER_LEN: usize = 64;
const TPL_CMPR: u32 = 14;

/// Fails for textures wider or taller than a TPL header can describe.
pub fn write_tpl<W: Write>(tex: &TextureAsset, mut out: W) -> Result<()> {
    let (Ok(width), Ok(height)) = (u16::try_from(tex.width), u16::try_from(tex.height)) else {
        return Err(DecodeError::Export {
            name: tex.name.clone(),
            reason: format!("{}x{} does not fit a TPL header", tex.width, tex.height),
        });
    };
    let header = TplHeader {
        image_count: 1,
        table_offset: 12,
        header_offset: 20,
        palette_offset: 0,
        height,
        width,
        format: TPL_CMPR,
        data_offset: TPL_HEADER_LEN as u32,
        wrap: [0; 2],
        filter: [1; 2],
        lod_bias: 0.0,
        flags: [0; 4],
        padding: [0; 2],
    };
    let mut buf = Cursor::new(Vec::with_capacity(TPL_HEADER_LEN));
    header.write(&mut buf)?;
    out.write_all(buf.get_ref())?;
    out.write_all(&tex.pixels)?;
    Ok(())
}

/// Entry name without its four-character extension.
fn stem(name: &str) -> &str {
    let cut = name.len().saturating_sub(4);
    if name.len() > 4 && name.is_char_boundary(cut) {
        &name[..cut]
    } else {
        name
    }
}

/// File stem for an exported texture. Any directory part of the entry name is
/// dropped so the image always lands directly in the output directory.
fn export_stem(name: &str) -> Option<&str> {
    let file = name.rsplit(['/', '\\']).next()?;
    match stem(file) {
        "" | "." | ".." => None,
        s => Some(s),
    }
}

fn write_image(tex: &TextureAsset, platform: Platform, path: &Path) -> Result<()> {
    let mut fh = std::io::BufWriter::new(fs::File::create(path)?);
    match platform {
        Platform::Wii => write_tpl(tex, &mut fh)?,
        _ => write_dds(tex, &mut fh)?,
    }
    fh.flush()?;
    Ok(())
}

/// Writes the texture into `dir` through a temporary `.part` file that is
/// renamed on success and removed on failure.
pub fn export_texture(tex: &TextureAsset, platform: Platform, dir: &Path) -> Result<PathBuf> {
    let stem = export_stem(&tex.name).ok_or_else(|| DecodeError::Export {
        name: tex.name.clone(),
        reason: "entry name has no usable file name".into(),
    })?;
    let ext = platform.texture_extension();
    let path = dir.join(format!("{stem}.{ext}"));
    let tmp = dir.join(format!(".{stem}.{ext}.part"));
    if let Err(err) = write_image(tex, platform, &tmp) {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            warn!("Leaving {} behind: {cleanup}", tmp.display());
        }
        return Err(err);
    }
    fs::rename(&tmp, &path)?;
    info!("Wrote {}", path.display());
    Ok(path)
}
