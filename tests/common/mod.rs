// Synthetic archive and payload builders shared by the integration tests.
#![allow(dead_code)]

use half::f16;
use milo_import::{
    archive::{DirectoryLayout, MAGIC_UNCOMPRESSED, SENTINEL},
    cursor::ByteOrder,
    mesh::{Vertex, VertexFormat},
    packed::pack_signed_10_10_10_2,
    skeleton::Matrix34,
};

/// Byte sink that writes every scalar in one fixed order.
pub struct Writer {
    pub order: ByteOrder,
    pub buf: Vec<u8>,
}

impl Writer {
    pub fn new(order: ByteOrder) -> Self {
        Self { order, buf: vec![] }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        match self.order {
            ByteOrder::Big => self.buf.extend(v.to_be_bytes()),
            ByteOrder::Little => self.buf.extend(v.to_le_bytes()),
        }
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.u16(v as u16)
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        match self.order {
            ByteOrder::Big => self.buf.extend(v.to_be_bytes()),
            ByteOrder::Little => self.buf.extend(v.to_le_bytes()),
        }
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.u32(v.to_bits())
    }

    pub fn f32s(&mut self, values: &[f32]) -> &mut Self {
        for &v in values {
            self.f32(v);
        }
        self
    }

    pub fn f16(&mut self, v: f32) -> &mut Self {
        self.u16(f16::from_f32(v).to_bits())
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.u32(s.len() as u32);
        self.buf.extend(s.as_bytes());
        self
    }

    pub fn strings(&mut self, list: &[&str]) -> &mut Self {
        self.u32(list.len() as u32);
        for s in list {
            self.string(s);
        }
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    /// Zero-pads up to absolute offset `at`.
    pub fn pad_to(&mut self, at: usize) -> &mut Self {
        assert!(self.buf.len() <= at, "already past 0x{at:x}");
        self.buf.resize(at, 0);
        self
    }

    pub fn matrix(&mut self, m: &Matrix34) -> &mut Self {
        for column in &m.basis {
            self.f32s(column);
        }
        self.f32s(&m.translation)
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

pub struct Entry {
    pub kind: String,
    pub name: String,
    pub payload: Vec<u8>,
}

pub fn entry(kind: &str, name: &str, payload: Vec<u8>) -> Entry {
    Entry {
        kind: kind.into(),
        name: name.into(),
        payload,
    }
}

pub struct ArchiveSpec {
    pub order: ByteOrder,
    pub dir_version: u32,
    /// Type of the directory's own record for nested layouts.
    pub root_kind: String,
    pub entries: Vec<Entry>,
    /// Payloads to leave out at the end, to fake a short archive.
    pub missing_payloads: usize,
}

impl ArchiveSpec {
    pub fn new(order: ByteOrder, dir_version: u32) -> Self {
        Self {
            order,
            dir_version,
            root_kind: "ObjectDir".into(),
            entries: vec![],
            missing_payloads: 0,
        }
    }

    pub fn with(mut self, e: Entry) -> Self {
        self.entries.push(e);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let layout = DirectoryLayout::for_version(self.dir_version);
        let mut w = Writer::new(self.order);
        w.u32(self.dir_version);
        let mut payloads: Vec<&[u8]> = vec![];
        match layout {
            DirectoryLayout::Flat => {
                w.u32(self.entries.len() as u32);
                for e in &self.entries {
                    w.string(&e.kind).string(&e.name);
                }
                w.u32(0);
            }
            DirectoryLayout::Nested | DirectoryLayout::Nested9 => {
                w.string(&self.root_kind).string("root");
                w.zeros(if layout == DirectoryLayout::Nested { 8 } else { 9 });
                w.u32(self.entries.len() as u32);
                for e in &self.entries {
                    w.string(&e.kind).string(&e.name);
                }
                payloads.push(&[]);
            }
        }
        payloads.extend(self.entries.iter().map(|e| e.payload.as_slice()));
        payloads.truncate(payloads.len() - self.missing_payloads);
        let mut body = w.finish();
        for p in payloads {
            body.extend_from_slice(p);
            body.extend_from_slice(&SENTINEL);
        }
        if self.missing_payloads > 0 {
            // drop the terminator so nothing pads the count back up
            body.truncate(body.len() - SENTINEL.len());
        }

        let start_offset = 20u32;
        let mut out = vec![];
        out.extend(MAGIC_UNCOMPRESSED.to_le_bytes());
        out.extend(start_offset.to_le_bytes());
        out.extend(1u32.to_le_bytes());
        out.extend((body.len() as u32).to_le_bytes());
        out.extend((body.len() as u32).to_le_bytes());
        out.extend(body);
        out
    }
}

/// Writes `v` back in `format`, the inverse of the mesh decoder's vertex read.
pub fn encode_vertex(w: &mut Writer, format: VertexFormat, v: &Vertex) {
    let normal = v.normal.unwrap_or_default();
    let tangent = v.tangent.unwrap_or_default();
    let weights = v.weights.unwrap_or_default();
    let bones = v.bones.unwrap_or_default();
    let unorm = |w: &mut Writer| {
        for x in weights {
            w.u8((x * 255.0).round() as u8);
        }
    };
    let bytes = |w: &mut Writer| {
        for b in bones {
            w.u8(b as u8);
        }
    };
    let wide_bones = |w: &mut Writer| {
        for b in bones {
            w.u16(b);
        }
    };
    let packed = |n: [f32; 3]| pack_signed_10_10_10_2([n[0], n[1], n[2], 0.0]);
    match format {
        VertexFormat::Legacy56 => {
            w.f32s(&v.position);
            wide_bones(w);
            w.f32s(&normal).f32s(&weights).f32s(&v.uv);
        }
        VertexFormat::Float48 => {
            w.f32s(&v.position).f32s(&normal).f32s(&weights).f32s(&v.uv);
        }
        VertexFormat::Float80 => {
            w.f32s(&v.position).f32(1.0);
            w.f32s(&normal).f32(0.0);
            w.f32s(&weights).f32s(&v.uv);
            wide_bones(w);
            w.zeros(16);
        }
        VertexFormat::Wii72 => {
            w.f32s(&v.position).f32s(&normal).f32s(&weights).f32s(&v.uv);
            wide_bones(w);
            w.zeros(16);
        }
        VertexFormat::XboxPacked { reserved } => {
            w.f32s(&v.position).f16(v.uv[0]).f16(v.uv[1]);
            w.u32(packed(normal));
            w.u32(pack_signed_10_10_10_2(tangent));
            unorm(w);
            bytes(w);
            w.zeros(reserved);
        }
        VertexFormat::Ps3Half { reserved } => {
            w.f32s(&v.position).f16(v.uv[0]).f16(v.uv[1]);
            w.f16(normal[0]).f16(normal[1]).f16(normal[2]).f16(0.0);
            unorm(w);
            bytes(w);
            w.zeros(reserved);
        }
        VertexFormat::Dc3Packed => {
            w.f32s(&v.position);
            w.u32(packed(normal));
            w.f16(v.uv[0]).f16(v.uv[1]);
            w.u32(pack_signed_10_10_10_2(tangent));
            unorm(w);
            bytes(w);
            w.zeros(4);
        }
    }
}

pub fn vertex_block(order: ByteOrder, format: VertexFormat, vertices: &[Vertex]) -> Vec<u8> {
    let mut w = Writer::new(order);
    for v in vertices {
        encode_vertex(&mut w, format, v);
    }
    w.finish()
}

pub struct MeshFixture {
    pub version: u32,
    pub order: ByteOrder,
    pub material: String,
    pub world: Matrix34,
    pub vertices: Vec<Vertex>,
    pub format: VertexFormat,
    /// Declared stride written in the vertex-block prefix, where there is one.
    pub declared_stride: Option<u32>,
    pub wii_prefix: bool,
    /// Version 38 as written by archives with the 9-byte directory record.
    pub nested9: bool,
    /// Version 28 as laid out on Xbox 360, with the matrices at 21 rather than 17.
    pub xbox: bool,
    /// BSP-tree byte closing the version 22 header.
    pub tree_flag: u8,
    pub parent: String,
    pub faces: Vec<[u16; 3]>,
    pub bones: Vec<&'static str>,
}

impl MeshFixture {
    pub fn new(version: u32, order: ByteOrder, format: VertexFormat) -> Self {
        Self {
            version,
            order,
            material: String::new(),
            world: Matrix34::IDENTITY,
            vertices: vec![],
            format,
            declared_stride: None,
            wii_prefix: false,
            nested9: false,
            xbox: false,
            tree_flag: 0,
            parent: String::new(),
            faces: vec![],
            bones: vec![],
        }
    }

    /// Header for the versions that keep their matrices at 21 (34 and up).
    fn modern_header(&self, w: &mut Writer, material_skip: usize) {
        w.u32(self.version).pad_to(21);
        w.matrix(&Matrix34::IDENTITY).matrix(&self.world);
        w.zeros(4).string("").zeros(1).string(&self.parent);
        w.zeros(material_skip);
        w.string(&self.material).string("payload_name");
        w.zeros(9);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = Writer::new(self.order);
        let bone_table = match self.version {
            14 => {
                w.u32(14).pad_to(8);
                w.matrix(&Matrix34::IDENTITY).matrix(&self.world);
                w.strings(&[]).zeros(21).strings(&[]).zeros(4);
                w.strings(&self.bones).zeros(8);
                w.string(&self.material).string("payload_name").string(&self.parent);
                w.zeros(16).string("").zeros(5);
                false
            }
            22 | 25 => {
                w.u32(self.version).pad_to(8);
                w.matrix(&Matrix34::IDENTITY).matrix(&self.world);
                w.strings(&[]).zeros(4).string("").zeros(1).string(&self.parent);
                w.zeros(5).strings(&[]).zeros(16);
                w.string(&self.material).string("payload_name");
                if self.version == 22 {
                    w.zeros(8).u8(self.tree_flag);
                } else {
                    w.zeros(9);
                }
                false
            }
            28 => {
                w.u32(28).pad_to(if self.xbox { 21 } else { 17 });
                w.matrix(&Matrix34::IDENTITY).matrix(&self.world);
                // the target slot is a bare word in this version
                w.zeros(4).u32(0xdead_beef).zeros(1).string(&self.parent);
                w.zeros(25);
                w.string(&self.material).string("payload_name").zeros(9);
                false
            }
            38 if self.nested9 => {
                self.modern_header(&mut w, 29);
                true
            }
            34 | 36 | 38 => {
                self.modern_header(&mut w, 25);
                true
            }
            37 => {
                self.modern_header(&mut w, 29);
                true
            }
            v => panic!("no fixture header for mesh v{v}"),
        };
        w.u32(self.vertices.len() as u32);
        if self.wii_prefix {
            w.u8(0);
        } else if let Some(stride) = self.declared_stride {
            w.u8(1).u32(stride).u32(0);
        }
        for v in &self.vertices {
            encode_vertex(&mut w, self.format, v);
        }
        w.u32(self.faces.len() as u32);
        for f in &self.faces {
            w.u16(f[0]).u16(f[1]).u16(f[2]);
        }
        if bone_table {
            w.u32(0);
            w.u32(self.bones.len() as u32);
            for b in &self.bones {
                w.string(b).matrix(&Matrix34::IDENTITY);
            }
        }
        w.finish()
    }
}

/// Where a texture header puts its fields, per game family.
#[derive(Debug, Clone, Copy)]
pub struct TexGaps {
    pub width_at: usize,
    pub before_name: usize,
    pub before_encoding: usize,
    pub before_pixels: usize,
}

impl TexGaps {
    pub const STANDARD: Self = Self {
        width_at: 17,
        before_name: 4,
        before_encoding: 11,
        before_pixels: 25,
    };
    pub const LRB: Self = Self {
        before_name: 8,
        ..Self::STANDARD
    };
    pub const GDRB: Self = Self {
        width_at: 18,
        ..Self::STANDARD
    };
    pub const RB3: Self = Self {
        before_encoding: 12,
        ..Self::STANDARD
    };
    pub const DC3: Self = Self {
        before_encoding: 16,
        before_pixels: 21,
        ..Self::STANDARD
    };
}

pub struct TexFixture<'p> {
    pub order: ByteOrder,
    pub version: u32,
    pub gaps: TexGaps,
    pub width: u32,
    pub height: u32,
    pub encoding: u32,
    pub mips: u8,
    pub pixels: &'p [u8],
}

impl TexFixture<'_> {
    pub fn build(&self) -> Vec<u8> {
        let g = self.gaps;
        let mut w = Writer::new(self.order);
        w.u32(self.version).pad_to(g.width_at);
        w.u32(self.width).u32(self.height).zeros(g.before_name);
        w.string("../../gen/wood.bmp").zeros(g.before_encoding);
        w.u32(self.encoding).u8(self.mips).zeros(g.before_pixels);
        w.buf.extend_from_slice(self.pixels);
        w.finish()
    }
}

/// Standard-layout texture payload.
pub fn tex_payload(order: ByteOrder, version: u32, width: u32, height: u32, encoding: u32, mips: u8, pixels: &[u8]) -> Vec<u8> {
    TexFixture {
        order,
        version,
        gaps: TexGaps::STANDARD,
        width,
        height,
        encoding,
        mips,
        pixels,
    }
    .build()
}

/// Version 9 transform with its matrices and names at the given offsets.
pub fn trans_v9_at(order: ByteOrder, matrices: usize, names: usize, local: &Matrix34, parent: &str) -> Vec<u8> {
    let mut w = Writer::new(order);
    w.u32(9).pad_to(matrices);
    w.matrix(local).matrix(&Matrix34::IDENTITY);
    w.pad_to(names).string("").zeros(1).string(parent);
    w.finish()
}

/// Version 9 transform for platforms other than PS2.
pub fn trans_v9(order: ByteOrder, local: &Matrix34, parent: &str) -> Vec<u8> {
    trans_v9_at(order, 17, 117, local, parent)
}

pub fn trans_v9_ps2(order: ByteOrder, local: &Matrix34, parent: &str) -> Vec<u8> {
    trans_v9_at(order, 13, 113, local, parent)
}

pub fn trans_v8(order: ByteOrder, local: &Matrix34, parent: &str) -> Vec<u8> {
    let mut w = Writer::new(order);
    w.u32(8).pad_to(8);
    w.matrix(local).matrix(&Matrix34::IDENTITY);
    w.strings(&[]).zeros(4).string("").zeros(1).string(parent);
    w.finish()
}

/// Rev2 material with a diffuse texture reference.
pub fn mat_v68(order: ByteOrder, diffuse: &str) -> Vec<u8> {
    let mut w = Writer::new(order);
    w.u32(68).pad_to(12).u8(0);
    let base = w.buf.len();
    w.pad_to(base + 8).f32s(&[1.0, 0.5, 0.25, 1.0]);
    w.pad_to(base + 24).u32(1);
    w.pad_to(base + 36).u32(1);
    w.pad_to(base + 44).u32(0);
    w.pad_to(base + 92).string(diffuse);
    w.finish()
}

/// TransAnim v7 with one rotation key and one position key.
pub fn trans_anim_v7(order: ByteOrder, target: &str, xyzw: [f32; 4], frame: f32) -> Vec<u8> {
    let mut w = Writer::new(order);
    w.u32(7).pad_to(29).string(target);
    w.u32(1).f32s(&xyzw).f32(frame);
    w.u32(1).f32s(&[1.0, 2.0, 3.0]).f32(frame);
    w.string("").zeros(2).u32(0);
    w.finish()
}

/// TransAnim v4: an entry table of `(name, start, end)` ahead of the target.
pub fn trans_anim_v4(order: ByteOrder, entries: &[(&str, f32, f32)], target: &str, xyzw: [f32; 4], frame: f32) -> Vec<u8> {
    let mut w = Writer::new(order);
    w.u32(4).pad_to(8).u32(entries.len() as u32);
    for &(name, start, end) in entries {
        w.string(name).f32(start).f32(end);
    }
    w.u32(entries.len() as u32).zeros(25).string(target);
    w.u32(1).f32s(&xyzw).f32(frame);
    w.u32(1).f32s(&[1.0, 2.0, 3.0]).f32(frame);
    w.string("").zeros(2);
    w.u32(1).f32s(&[2.0, 2.0, 2.0]).f32(frame);
    w.finish()
}
