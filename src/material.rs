//! Material records: shader parameters and texture slot references.

use enum_iterator::Sequence;
use indexmap::IndexMap;
use log::{debug, trace};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::Serialize;

use crate::{
    cursor::{ByteCursor, MAX_NAME_LEN},
    dispatch::FormatTag,
    error::Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum BlendMode {
    Dest = 0,
    Src = 1,
    Add = 2,
    SrcAlpha = 3,
    SrcAlphaAdd = 4,
    Subtract = 5,
    Multiply = 6,
    PremultAlpha = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum ZMode {
    Disable = 0,
    Normal = 1,
    Transparent = 2,
    Force = 3,
    Decal = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize)]
pub enum AlphaMode {
    Opaque = 0,
    Cutout = 1,
    Blend = 2,
}

/// An enumerated field that keeps values outside the known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Param<T> {
    Known(T),
    Other(u32),
}

impl<T: FromPrimitive> Param<T> {
    pub fn from_raw(raw: u32) -> Self {
        T::from_u32(raw).map_or(Param::Other(raw), Param::Known)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Serialize)]
pub enum TextureSlot {
    Diffuse,
    Normal,
    Emissive,
    Specular,
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaterialParams {
    pub diffuse_color: [f32; 4],
    pub blend: Param<BlendMode>,
    pub z_mode: Param<ZMode>,
    pub alpha: Param<AlphaMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialAsset {
    pub name: String,
    pub version: u32,
    pub params: MaterialParams,
    /// Texture names as written, before resolution.
    pub texture_refs: IndexMap<TextureSlot, String>,
}

/// Offsets from the end of the object header.
struct OffsetTable {
    color: usize,
    blend: usize,
    z_mode: usize,
    alpha: usize,
    textures: usize,
}

const LEGACY: OffsetTable = OffsetTable {
    color: 8,
    blend: 24,
    z_mode: 32,
    alpha: 40,
    textures: 88,
};

const REV2: OffsetTable = OffsetTable {
    color: 8,
    blend: 24,
    z_mode: 36,
    alpha: 44,
    textures: 92,
};

fn skip_object_header(cur: &mut ByteCursor, tag: FormatTag) -> Result<usize> {
    let order = tag.order;
    cur.seek_absolute(12)?;
    if cur.read_u8()? == 1 {
        let children = cur.read_u16(order)?;
        let id = cur.read_u32(order)?;
        for _ in 0..children {
            let node_type = cur.read_u32(order)?;
            let child = cur.read_string(order)?;
            trace!("tree {id}: {node_type} {child:?}");
        }
    }
    Ok(cur.position())
}

pub fn decode_material(name: &str, payload: &[u8], tag: FormatTag) -> Result<MaterialAsset> {
    let order = tag.order;
    let mut cur = ByteCursor::new(payload);
    let base = skip_object_header(&mut cur, tag)?;
    let table = if tag.version <= 28 { &LEGACY } else { &REV2 };

    cur.seek_absolute(base + table.color)?;
    let diffuse_color = cur.read_f32s::<4>(order)?;
    cur.seek_absolute(base + table.blend)?;
    let blend = Param::from_raw(cur.read_u32(order)?);
    cur.seek_absolute(base + table.z_mode)?;
    let z_mode = Param::from_raw(cur.read_u32(order)?);
    cur.seek_absolute(base + table.alpha)?;
    let alpha = Param::from_raw(cur.read_u32(order)?);

    let mut texture_refs = IndexMap::new();
    if cur.seek_absolute(base + table.textures).is_ok() {
        for slot in enum_iterator::all::<TextureSlot>() {
            let Some(texture) = cur.try_read_string(order, MAX_NAME_LEN) else {
                break;
            };
            if !texture.is_empty() {
                texture_refs.insert(slot, texture);
            }
        }
    }
    debug!(
        "Mat {name} v{}: {blend:?} {z_mode:?} {alpha:?}, {} texture refs",
        tag.version,
        texture_refs.len()
    );
    Ok(MaterialAsset {
        name: name.to_owned(),
        version: tag.version,
        params: MaterialParams {
            diffuse_color,
            blend,
            z_mode,
            alpha,
        },
        texture_refs,
    })
}
