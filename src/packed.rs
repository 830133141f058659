//! Unpacking of the compressed vertex attribute encodings.

use bilge::prelude::*;

/// 10-10-10-2 word, first field in the low bits.
#[bitsize(32)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq, Eq)]
pub struct Dec3N {
    pub x: u10,
    pub y: u10,
    pub z: u10,
    pub w: u2,
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Sign-extends the four fields of a 10-10-10-2 word and scales them by their
/// field maximum (1023 for the wide fields, 3 for the narrow one), clamped to
/// [-1, 1].
pub fn unpack_signed_10_10_10_2(word: u32) -> [f32; 4] {
    let packed = Dec3N::from(word);
    let wide = |v: u10| (sign_extend(u32::from(v.value()), 10) as f32 / 1023.0).clamp(-1.0, 1.0);
    let narrow = (sign_extend(u32::from(packed.w().value()), 2) as f32 / 3.0).clamp(-1.0, 1.0);
    [wide(packed.x()), wide(packed.y()), wide(packed.z()), narrow]
}

/// Unit normal from a packed word; a zero vector stays zero.
pub fn unpack_normal(word: u32) -> [f32; 3] {
    let [x, y, z, _] = unpack_signed_10_10_10_2(word);
    normalize([x, y, z])
}

pub fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        return v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

pub fn unorm8(values: [u8; 4]) -> [f32; 4] {
    values.map(|v| f32::from(v) / 255.0)
}

/// Inverse of the wide-field scaling, used by fixtures that build packed words.
pub fn pack_signed_10_10_10_2(v: [f32; 4]) -> u32 {
    let wide = |f: f32| ((f.clamp(-1.0, 1.0) * 1023.0).round() as i32).clamp(-512, 511) as u32 & 0x3ff;
    let narrow = ((v[3].clamp(-1.0, 1.0) * 3.0).round() as i32).clamp(-2, 1) as u32 & 0x3;
    wide(v[0]) | (wide(v[1]) << 10) | (wide(v[2]) << 20) | (narrow << 30)
}
