//! Keyframed transform and property animation, and quantised sample clips.

use binrw::{binread, BinRead};
use log::{debug, trace};
use serde::Serialize;

use crate::{
    cursor::{ByteCursor, ByteOrder},
    dispatch::FormatTag,
    error::{DecodeError, Result},
};

pub const CHANNEL_ROTATION: &str = "rotation_quaternion";
pub const CHANNEL_LOCATION: &str = "location";
pub const CHANNEL_SCALE: &str = "scale";

/// Frames per second of the receiving scene.
pub const SCENE_FPS: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum KeyValue {
    /// `(w, x, y, z)`
    Quat([f32; 4]),
    Vec3([f32; 3]),
    Scalar(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyframe {
    pub channel: String,
    pub frame: f32,
    pub value: KeyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub target: String,
    pub keys: Vec<Keyframe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClipKind {
    TransformKeyed,
    PropertyKeyed,
    SampleCompressed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationClip {
    pub name: String,
    pub kind: ClipKind,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    pub fn key_count(&self) -> usize {
        self.tracks.iter().map(|t| t.keys.len()).sum()
    }
}

/// Stored `(x, y, z, w)`, handed out `(w, x, y, z)`.
pub fn quat_wxyz([x, y, z, w]: [f32; 4]) -> [f32; 4] {
    [w, x, y, z]
}

/// Sample clips are authored Y-up.
pub fn remap_clip_position([x, y, z]: [f32; 3]) -> [f32; 3] {
    [x, -z, y]
}

pub fn remap_clip_rotation([x, y, z, w]: [f32; 4]) -> [f32; 4] {
    [w, x, -z, y]
}

#[binread]
#[derive(Debug, Clone, Copy)]
struct QuatKey {
    xyzw: [f32; 4],
    frame: f32,
}

#[binread]
#[derive(Debug, Clone, Copy)]
struct Vec3Key {
    xyz: [f32; 3],
    frame: f32,
}

#[binread]
#[derive(Debug, Clone, Copy)]
struct ScalarKey {
    value: f32,
    frame: f32,
}

fn read_keys<T>(cur: &mut ByteCursor, order: ByteOrder) -> Result<Vec<T>>
where
    T: for<'b> BinRead<Args<'b> = ()>,
{
    let count = cur.read_u32(order)? as usize;
    let wanted = count.saturating_mul(std::mem::size_of::<T>());
    if wanted > cur.remaining_bytes() {
        return Err(DecodeError::TruncatedInput {
            offset: cur.position(),
            wanted,
            available: cur.remaining_bytes(),
        });
    }
    (0..count).map(|_| cur.read(order)).collect()
}

pub fn decode_trans_anim(name: &str, payload: &[u8], tag: FormatTag) -> Result<AnimationClip> {
    let order = tag.order;
    let mut cur = ByteCursor::new(payload);
    if tag.version == 4 {
        cur.seek_absolute(8)?;
        let entries = cur.read_u32(order)?;
        for _ in 0..entries {
            let entry = cur.read_string(order)?;
            let range = cur.read_f32s::<2>(order)?;
            trace!("anim entry {entry:?} {range:?}");
        }
        let _anim_count = cur.read_u32(order)?;
        cur.skip(25)?;
    } else {
        cur.seek_absolute(29)?;
    }
    let target = cur.read_string(order)?;

    let mut keys = vec![];
    for k in read_keys::<QuatKey>(&mut cur, order)? {
        keys.push(Keyframe {
            channel: CHANNEL_ROTATION.into(),
            frame: k.frame,
            value: KeyValue::Quat(quat_wxyz(k.xyzw)),
        });
    }
    for k in read_keys::<Vec3Key>(&mut cur, order)? {
        keys.push(Keyframe {
            channel: CHANNEL_LOCATION.into(),
            frame: k.frame,
            value: KeyValue::Vec3(k.xyz),
        });
    }
    let owner = cur.read_string(order)?;
    cur.skip(2)?;
    for k in read_keys::<Vec3Key>(&mut cur, order)? {
        keys.push(Keyframe {
            channel: CHANNEL_SCALE.into(),
            frame: k.frame,
            value: KeyValue::Vec3(k.xyz),
        });
    }
    debug!("TransAnim {name} -> {target:?} (owner {owner:?}): {} keys", keys.len());
    Ok(AnimationClip {
        name: name.to_owned(),
        kind: ClipKind::TransformKeyed,
        tracks: vec![Track { target, keys }],
    })
}

pub fn decode_prop_anim(name: &str, payload: &[u8], tag: FormatTag) -> Result<AnimationClip> {
    let order = tag.order;
    let mut cur = ByteCursor::new(payload);
    cur.seek_absolute(if tag.version == 7 { 8 } else { 29 })?;
    let target = cur.read_string(order)?;
    let property = cur.read_string(order)?;
    let channel = format!("property:{property}");
    let keys = read_keys::<ScalarKey>(&mut cur, order)?
        .into_iter()
        .map(|k| Keyframe {
            channel: channel.clone(),
            frame: k.frame,
            value: KeyValue::Scalar(k.value),
        })
        .collect::<Vec<_>>();
    debug!("PropAnim {name} -> {target:?} {channel}: {} keys", keys.len());
    Ok(AnimationClip {
        name: name.to_owned(),
        kind: ClipKind::PropertyKeyed,
        tracks: vec![Track { target, keys }],
    })
}

const HAS_POSITION: u32 = 1;
const HAS_ROTATION: u32 = 2;

fn dequantize(q: i16) -> f32 {
    f32::from(q) / 32767.0
}

fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let len = q.iter().map(|c| c * c).sum::<f32>().sqrt();
    if len <= f32::EPSILON {
        return [0.0, 0.0, 0.0, 1.0];
    }
    q.map(|c| c / len)
}

/// Per-frame samples for every bone; a bone only stores the tracks its flags name.
pub fn decode_clip_samples(name: &str, payload: &[u8], tag: FormatTag) -> Result<AnimationClip> {
    let order = tag.order;
    let mut cur = ByteCursor::new(payload);
    cur.seek_absolute(29)?;
    let frame_count = cur.read_u32(order)? as usize;
    if frame_count.saturating_mul(4) > cur.remaining_bytes() {
        return Err(DecodeError::TruncatedInput {
            offset: cur.position(),
            wanted: frame_count * 4,
            available: cur.remaining_bytes(),
        });
    }
    let frame_times = (0..frame_count)
        .map(|_| cur.read_f32(order))
        .collect::<Result<Vec<_>>>()?;
    let position_scale = cur.read_f32(order)?;
    let bone_count = cur.read_u32(order)?;
    let mut tracks = vec![];
    let mut flags = vec![];
    for _ in 0..bone_count {
        let target = cur.read_string(order)?;
        flags.push(cur.read_u32(order)?);
        tracks.push(Track { target, keys: vec![] });
    }
    let per_frame: usize = flags
        .iter()
        .map(|f| {
            (if f & HAS_POSITION != 0 { 6 } else { 0 }) + (if f & HAS_ROTATION != 0 { 8 } else { 0 })
        })
        .sum();
    let wanted = per_frame.saturating_mul(frame_count);
    if wanted > cur.remaining_bytes() {
        return Err(DecodeError::TruncatedInput {
            offset: cur.position(),
            wanted,
            available: cur.remaining_bytes(),
        });
    }
    for &time in &frame_times {
        let frame = time * SCENE_FPS;
        for (track, &f) in tracks.iter_mut().zip(&flags) {
            if f & HAS_POSITION != 0 {
                let mut p = [0.0; 3];
                for c in &mut p {
                    *c = dequantize(cur.read_i16(order)?) * position_scale;
                }
                track.keys.push(Keyframe {
                    channel: CHANNEL_LOCATION.into(),
                    frame,
                    value: KeyValue::Vec3(remap_clip_position(p)),
                });
            }
            if f & HAS_ROTATION != 0 {
                let mut q = [0.0; 4];
                for c in &mut q {
                    *c = dequantize(cur.read_i16(order)?);
                }
                track.keys.push(Keyframe {
                    channel: CHANNEL_ROTATION.into(),
                    frame,
                    value: KeyValue::Quat(remap_clip_rotation(normalize_quat(q))),
                });
            }
        }
    }
    debug!(
        "CharClipSamples {name}: {frame_count} frames, {} bones",
        tracks.len()
    );
    Ok(AnimationClip {
        name: name.to_owned(),
        kind: ClipKind::SampleCompressed,
        tracks,
    })
}
