//! Mesh payloads.
//!
//! Every supported `(version, platform)` pair maps to a [`MeshLayout`]: a list
//! of header steps, an optional vertex-block prefix, a [`VertexFormat`] and
//! whether an inline bone table follows the faces. Adding a version means
//! adding a row in [`MeshLayout::select`].

use log::{debug, trace, warn};
use serde::Serialize;

use crate::{
    archive::DirectoryLayout,
    cursor::{ByteCursor, ByteOrder},
    dispatch::FormatTag,
    error::{DecodeError, Result},
    packed::{unorm8, unpack_normal, unpack_signed_10_10_10_2},
    platform::Platform,
    skeleton::Matrix34,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    At(usize),
    Skip(usize),
    /// Local then world matrix.
    Matrices,
    TransList,
    DrawList,
    BoneNames,
    Target,
    /// A target slot that only holds a 4-byte word.
    TargetWord,
    Parent,
    Material,
    Name,
    /// A string nobody needs.
    Extra,
    /// BSP tree marker, nonzero means the mesh carries a tree we can't read.
    TreeFlag,
}

use Step::*;

const LEGACY_A: &[Step] = &[
    At(8), Matrices, TransList, Skip(16), Skip(5), DrawList, Skip(4), BoneNames, Skip(8), Material,
    Name, Parent, Skip(16), Extra, Skip(5),
];
const LEGACY_B: &[Step] = &[
    At(8), Matrices, TransList, Skip(4), Target, Skip(1), Parent, Skip(5), DrawList, Skip(16),
    Material, Name, Skip(8), TreeFlag,
];
const GH2: &[Step] = &[
    At(8), Matrices, TransList, Skip(4), Target, Skip(1), Parent, Skip(5), DrawList, Skip(16),
    Material, Name, Skip(9),
];
const GH2X_XBOX: &[Step] = &[
    At(21), Matrices, Skip(4), TargetWord, Skip(1), Parent, Skip(25), Material, Name, Skip(9),
];
const GH2X: &[Step] = &[
    At(17), Matrices, Skip(4), TargetWord, Skip(1), Parent, Skip(25), Material, Name, Skip(9),
];
const RB: &[Step] = &[
    At(21), Matrices, Skip(4), Target, Skip(1), Parent, Skip(25), Material, Name, Skip(9),
];
const RB_WIDE: &[Step] = &[
    At(21), Matrices, Skip(4), Target, Skip(1), Parent, Skip(29), Material, Name, Skip(9),
];

/// Per-vertex record layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VertexFormat {
    /// pos, bones u16×4, normal, weights, uv.
    Legacy56,
    /// pos, normal, weights, uv.
    Float48,
    /// pos ×4, normal ×4, weights, uv, bones u16×4, 16 reserved.
    Float80,
    /// pos, normal, weights, uv, bones u16×4, 16 reserved.
    Wii72,
    /// pos, uv f16, packed normal, packed tangent, weights u8, bones u8, then padding.
    XboxPacked { reserved: usize },
    /// pos, uv f16, normal f16×4, weights u8, bones u8, then padding.
    Ps3Half { reserved: usize },
    /// pos, packed normal, uv f16, packed tangent, weights u8, bones u8, 4 reserved.
    Dc3Packed,
}

impl VertexFormat {
    pub fn stride(self) -> usize {
        match self {
            VertexFormat::Legacy56 => 56,
            VertexFormat::Float48 => 48,
            VertexFormat::Float80 => 80,
            VertexFormat::Wii72 => 72,
            VertexFormat::XboxPacked { reserved } => 32 + reserved,
            VertexFormat::Ps3Half { reserved } => 32 + reserved,
            VertexFormat::Dc3Packed => 36,
        }
    }

    /// The format of the same family with `stride` bytes per vertex.
    fn with_stride(self, stride: usize) -> Option<Self> {
        match self {
            VertexFormat::XboxPacked { .. } if matches!(stride, 32 | 36) => {
                Some(VertexFormat::XboxPacked { reserved: stride - 32 })
            }
            VertexFormat::Ps3Half { .. } if matches!(stride, 36 | 40) => {
                Some(VertexFormat::Ps3Half { reserved: stride - 32 })
            }
            _ => None,
        }
    }

    fn read(self, cur: &mut ByteCursor, order: ByteOrder) -> Result<Vertex> {
        let start = cur.position();
        let mut v = Vertex::default();
        let bones_u16 = |cur: &mut ByteCursor| -> Result<[u16; 4]> {
            Ok([
                cur.read_u16(order)?,
                cur.read_u16(order)?,
                cur.read_u16(order)?,
                cur.read_u16(order)?,
            ])
        };
        let bytes4 = |cur: &mut ByteCursor| -> Result<[u8; 4]> {
            let mut out = [0; 4];
            out.copy_from_slice(cur.take(4)?);
            Ok(out)
        };
        let uv_half = |cur: &mut ByteCursor| -> Result<[f32; 2]> {
            Ok([cur.read_f16(order)?, cur.read_f16(order)?])
        };
        match self {
            VertexFormat::Legacy56 => {
                v.position = cur.read_f32s(order)?;
                v.bones = Some(bones_u16(cur)?);
                v.normal = Some(cur.read_f32s(order)?);
                v.weights = Some(cur.read_f32s(order)?);
                v.uv = cur.read_f32s(order)?;
            }
            VertexFormat::Float48 => {
                v.position = cur.read_f32s(order)?;
                v.normal = Some(cur.read_f32s(order)?);
                v.weights = Some(cur.read_f32s(order)?);
                v.uv = cur.read_f32s(order)?;
            }
            VertexFormat::Float80 => {
                let [x, y, z, _] = cur.read_f32s::<4>(order)?;
                v.position = [x, y, z];
                let [nx, ny, nz, _] = cur.read_f32s::<4>(order)?;
                v.normal = Some([nx, ny, nz]);
                v.weights = Some(cur.read_f32s(order)?);
                v.uv = cur.read_f32s(order)?;
                v.bones = Some(bones_u16(cur)?);
            }
            VertexFormat::Wii72 => {
                v.position = cur.read_f32s(order)?;
                v.normal = Some(cur.read_f32s(order)?);
                v.weights = Some(cur.read_f32s(order)?);
                v.uv = cur.read_f32s(order)?;
                v.bones = Some(bones_u16(cur)?);
            }
            VertexFormat::XboxPacked { .. } => {
                v.position = cur.read_f32s(order)?;
                v.uv = uv_half(cur)?;
                v.normal = Some(unpack_normal(cur.read_u32(order)?));
                v.tangent = Some(unpack_signed_10_10_10_2(cur.read_u32(order)?));
                v.weights = Some(unorm8(bytes4(cur)?));
                v.bones = Some(bytes4(cur)?.map(u16::from));
            }
            VertexFormat::Ps3Half { .. } => {
                v.position = cur.read_f32s(order)?;
                v.uv = uv_half(cur)?;
                let n = [cur.read_f16(order)?, cur.read_f16(order)?, cur.read_f16(order)?];
                cur.skip(2)?;
                v.normal = Some(n);
                v.weights = Some(unorm8(bytes4(cur)?));
                v.bones = Some(bytes4(cur)?.map(u16::from));
            }
            VertexFormat::Dc3Packed => {
                v.position = cur.read_f32s(order)?;
                v.normal = Some(unpack_normal(cur.read_u32(order)?));
                v.uv = uv_half(cur)?;
                v.tangent = Some(unpack_signed_10_10_10_2(cur.read_u32(order)?));
                v.weights = Some(unorm8(bytes4(cur)?));
                v.bones = Some(bytes4(cur)?.map(u16::from));
            }
        }
        // reserved tail
        cur.seek_absolute(start + self.stride())?;
        Ok(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    None,
    /// One opaque byte.
    Byte,
    /// `u8` flag, `u32` declared stride, `u32` reserved.
    Declared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MeshLayout {
    header: &'static [Step],
    prefix: Prefix,
    format: VertexFormat,
    bone_table: bool,
}

impl MeshLayout {
    fn select(version: u32, platform: Platform, generation: DirectoryLayout) -> Result<Self> {
        let unsupported = || DecodeError::UnsupportedLayout {
            kind: "Mesh",
            version,
            platform,
        };
        let plain = |header, format| MeshLayout {
            header,
            prefix: Prefix::None,
            format,
            bone_table: false,
        };
        Ok(match version {
            14 => plain(LEGACY_A, VertexFormat::Legacy56),
            22 => plain(LEGACY_B, VertexFormat::Legacy56),
            25 => plain(GH2, VertexFormat::Float48),
            28 if platform == Platform::Xbox360 => plain(GH2X_XBOX, VertexFormat::Float48),
            28 => plain(GH2X, VertexFormat::Float48),
            34 => MeshLayout {
                bone_table: true,
                ..plain(RB, VertexFormat::Float80)
            },
            38 if generation == DirectoryLayout::Nested9 => MeshLayout {
                header: RB_WIDE,
                prefix: Prefix::Declared,
                format: VertexFormat::Dc3Packed,
                bone_table: true,
            },
            36..=38 => {
                let header = if version == 37 { RB_WIDE } else { RB };
                let (prefix, format) = match platform {
                    Platform::Wii => (Prefix::Byte, VertexFormat::Wii72),
                    Platform::Xbox360 => (
                        Prefix::Declared,
                        VertexFormat::XboxPacked {
                            reserved: if version == 38 { 4 } else { 0 },
                        },
                    ),
                    Platform::Ps3 => (
                        Prefix::Declared,
                        VertexFormat::Ps3Half {
                            reserved: if version == 38 { 8 } else { 4 },
                        },
                    ),
                    Platform::Ps2 => return Err(unsupported()),
                };
                MeshLayout {
                    header,
                    prefix,
                    format,
                    bone_table: true,
                }
            }
            _ => return Err(unsupported()),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: Option<[f32; 3]>,
    pub tangent: Option<[f32; 4]>,
    /// As stored; see [`Vertex::flipped_uv`].
    pub uv: [f32; 2],
    pub weights: Option<[f32; 4]>,
    pub bones: Option<[u16; 4]>,
}

impl Vertex {
    /// UV in the scene's convention, V pointing up.
    pub fn flipped_uv(&self) -> [f32; 2] {
        [self.uv[0], 1.0 - self.uv[1]]
    }
}

/// One vertex's weight against one vertex group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupWeight {
    pub group: usize,
    pub vertex: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshAsset {
    pub name: String,
    pub version: u32,
    pub format: VertexFormat,
    pub material: String,
    pub target: String,
    pub parent: String,
    pub local: Matrix34,
    pub world: Matrix34,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<[u16; 3]>,
    pub bone_names: Vec<String>,
    pub bone_transforms: Vec<Matrix34>,
}

impl MeshAsset {
    /// Vertex-group assignments, plus how many referenced a bone past the table.
    pub fn group_weights(&self) -> (Vec<GroupWeight>, usize) {
        let mut out = vec![];
        let mut clamped = 0;
        if self.bone_names.is_empty() {
            return (out, clamped);
        }
        for (vertex, v) in self.vertices.iter().enumerate() {
            let (Some(bones), Some(weights)) = (v.bones, v.weights) else {
                continue;
            };
            for (&bone, &weight) in bones.iter().zip(weights.iter()) {
                if weight <= 0.0 {
                    continue;
                }
                let vertex = vertex as u32;
                if usize::from(bone) < self.bone_names.len() {
                    out.push(GroupWeight {
                        group: usize::from(bone),
                        vertex,
                        weight,
                    });
                } else {
                    clamped += 1;
                    out.push(GroupWeight {
                        group: 0,
                        vertex,
                        weight: 0.0,
                    });
                }
            }
        }
        (out, clamped)
    }

    pub fn normals(&self) -> Option<Vec<[f32; 3]>> {
        self.vertices.iter().map(|v| v.normal).collect()
    }
}

#[derive(Default)]
struct Header {
    local: Matrix34,
    world: Matrix34,
    bone_names: Vec<String>,
    target: String,
    parent: String,
    material: String,
    name: String,
}

fn read_header(cur: &mut ByteCursor, order: ByteOrder, steps: &[Step], version: u32, platform: Platform) -> Result<Header> {
    let mut h = Header::default();
    for &step in steps {
        match step {
            At(pos) => cur.seek_absolute(pos)?,
            Skip(n) => cur.skip(n)?,
            Matrices => {
                h.local = cur.read(order)?;
                h.world = cur.read(order)?;
            }
            TransList | DrawList => {
                let list = cur.read_string_list(order)?;
                trace!("{step:?}: {list:?}");
            }
            BoneNames => h.bone_names = cur.read_string_list(order)?,
            Target => h.target = cur.read_string(order)?,
            TargetWord => {
                let word = cur.read_u32(order)?;
                trace!("target word 0x{word:08x}");
            }
            Parent => h.parent = cur.read_string(order)?,
            Material => h.material = cur.read_string(order)?,
            Name => h.name = cur.read_string(order)?,
            Extra => {
                cur.read_string(order)?;
            }
            TreeFlag => {
                if cur.read_u8()? != 0 {
                    warn!("Mesh {:?} carries a BSP tree", h.name);
                    return Err(DecodeError::UnsupportedLayout {
                        kind: "Mesh",
                        version,
                        platform,
                    });
                }
            }
        }
    }
    Ok(h)
}

fn ensure_room(cur: &ByteCursor, count: usize, size: usize) -> Result<()> {
    let wanted = count.saturating_mul(size);
    if wanted > cur.remaining_bytes() {
        return Err(DecodeError::TruncatedInput {
            offset: cur.position(),
            wanted,
            available: cur.remaining_bytes(),
        });
    }
    Ok(())
}

pub fn decode_mesh(
    name: &str,
    payload: &[u8],
    tag: FormatTag,
    platform: Platform,
    generation: DirectoryLayout,
) -> Result<MeshAsset> {
    let order = tag.order;
    let layout = MeshLayout::select(tag.version, platform, generation)?;
    let mut cur = ByteCursor::new(payload);
    let header = read_header(&mut cur, order, layout.header, tag.version, platform)?;

    let vertex_count = cur.read_u32(order)? as usize;
    let mut format = layout.format;
    match layout.prefix {
        Prefix::None => {}
        Prefix::Byte => cur.skip(1)?,
        Prefix::Declared => {
            let _flag = cur.read_u8()?;
            let declared = cur.read_u32(order)? as usize;
            let _reserved = cur.read_u32(order)?;
            if declared != format.stride() {
                if let Some(alt) = format.with_stride(declared) {
                    debug!("{name}: declared stride {declared} selects {alt:?}");
                    format = alt;
                }
            }
        }
    }
    ensure_room(&cur, vertex_count, format.stride())?;
    let vertices = (0..vertex_count)
        .map(|_| format.read(&mut cur, order))
        .collect::<Result<Vec<_>>>()?;

    let face_count = cur.read_u32(order)? as usize;
    ensure_room(&cur, face_count, 6)?;
    let mut faces = Vec::with_capacity(face_count);
    let mut dropped = 0;
    for _ in 0..face_count {
        let face = [cur.read_u16(order)?, cur.read_u16(order)?, cur.read_u16(order)?];
        if face.iter().all(|&i| usize::from(i) < vertex_count) {
            faces.push(face);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!("{name}: dropped {dropped} faces indexing past {vertex_count} vertices");
    }

    let mut bone_names = header.bone_names;
    let mut bone_transforms = vec![];
    if layout.bone_table {
        let group_sizes = cur.read_u32(order)? as usize;
        cur.skip(group_sizes)?;
        let bone_count = cur.read_u32(order)? as usize;
        ensure_room(&cur, bone_count, 4 + 48)?;
        for _ in 0..bone_count {
            bone_names.push(cur.read_string(order)?);
            bone_transforms.push(cur.read(order)?);
        }
    }

    debug!(
        "Mesh {name} v{} {format:?}: {} vertices, {} faces, {} bones, material {:?}",
        tag.version,
        vertices.len(),
        faces.len(),
        bone_names.len(),
        header.material
    );
    Ok(MeshAsset {
        name: name.to_owned(),
        version: tag.version,
        format,
        material: header.material,
        target: header.target,
        parent: header.parent,
        local: header.local,
        world: header.world,
        vertices,
        faces,
        bone_names,
        bone_transforms,
    })
}
