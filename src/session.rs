//! One decode pass over one archive.
//!
//! Textures are decoded first, then materials, so materials and meshes can
//! find them by name; everything else follows in directory order. A failing entry
//! is logged and counted, never fatal for its siblings.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::{
    anim::{decode_clip_samples, decode_prop_anim, decode_trans_anim, AnimationClip},
    archive::{Archive, ArchiveEntry, DirectoryLayout},
    config::ImportOptions,
    dispatch::{sniff, EntryRoute},
    error::{DecodeError, Result},
    material::{decode_material, MaterialAsset},
    mesh::{decode_mesh, MeshAsset},
    platform::Platform,
    sink::{MeshData, SceneSink},
    skeleton::{decode_transform, Matrix34, Skeleton},
    texture::{decode_texture, export_texture, TextureAsset},
};

/// Root directory type of venue archives.
pub const VENUE_ROOT: &str = "WorldDir";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub kind: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    pub decoded: usize,
    pub skipped: usize,
    pub failed: Vec<EntryFailure>,
    pub surplus_payloads: usize,
}

impl fmt::Display for DecodeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} decoded, {} skipped, {} failed",
            self.decoded,
            self.skipped,
            self.failed.len()
        )?;
        if self.surplus_payloads > 0 {
            write!(f, ", {} surplus payloads", self.surplus_payloads)?;
        }
        Ok(())
    }
}

struct SkipRules {
    low_lod: Regex,
    any_lod: Regex,
    shadow: Regex,
}

impl SkipRules {
    fn new() -> Result<Self> {
        Ok(Self {
            low_lod: Regex::new(r"(?i)lod0[12]")?,
            any_lod: Regex::new(r"(?i)lod")?,
            shadow: Regex::new(r"(?i)shadow")?,
        })
    }
}

enum Outcome {
    Decoded,
    Skipped,
}

pub struct DecodeSession<'s, S: SceneSink> {
    options: &'s ImportOptions,
    sink: &'s mut S,
    rules: SkipRules,
    platform: Platform,
    generation: DirectoryLayout,
    textures: IndexMap<String, TextureAsset>,
    materials: IndexMap<String, MaterialAsset>,
    meshes: IndexSet<String>,
    skeleton: Skeleton,
}

impl<'s, S: SceneSink> DecodeSession<'s, S> {
    pub fn new(options: &'s ImportOptions, sink: &'s mut S) -> Result<Self> {
        Ok(Self {
            options,
            sink,
            rules: SkipRules::new()?,
            platform: Platform::Ps2,
            generation: DirectoryLayout::Nested,
            textures: IndexMap::new(),
            materials: IndexMap::new(),
            meshes: IndexSet::new(),
            skeleton: Skeleton::default(),
        })
    }

    pub fn textures(&self) -> &IndexMap<String, TextureAsset> {
        &self.textures
    }

    pub fn materials(&self) -> &IndexMap<String, MaterialAsset> {
        &self.materials
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// Parses `data` and decodes every entry. Only archive-level failures are errors.
    pub fn decode_archive(&mut self, data: &[u8], platform: Platform) -> Result<DecodeReport> {
        let archive = Archive::parse(data, platform, self.options.byte_order_override)?;
        Ok(self.decode_entries(&archive))
    }

    pub fn decode_entries(&mut self, archive: &Archive<'_>) -> DecodeReport {
        self.platform = archive.platform;
        self.generation = archive.directory.layout;
        let venue = archive.root_kind() == Some(VENUE_ROOT);
        if venue && !self.options.import_venue {
            info!("Venue archive, only textures will be imported");
        }
        let mut report = DecodeReport {
            surplus_payloads: archive.surplus.len(),
            ..Default::default()
        };
        let routed: Vec<_> = archive
            .entries
            .iter()
            .map(|entry| {
                let route = EntryRoute::classify(&entry.kind, &entry.name, self.generation);
                (route, entry)
            })
            .collect();
        for phase in 0..3 {
            for &(route, entry) in routed.iter().filter(|(r, _)| r.phase() == phase) {
                if let Some(reason) = self.skip_reason(route, entry, venue) {
                    debug!("Skipping {} {:?}: {reason}", entry.kind, entry.name);
                    report.skipped += 1;
                    continue;
                }
                match self.decode_entry(route, entry) {
                    Ok(Outcome::Decoded) => report.decoded += 1,
                    Ok(Outcome::Skipped) => report.skipped += 1,
                    Err(err @ DecodeError::UnresolvedReference { .. }) => {
                        warn!("Skipping {} {:?}: {err}", entry.kind, entry.name);
                        report.skipped += 1;
                    }
                    Err(err) => {
                        warn!("Failed to decode {} {:?}: {err}", entry.kind, entry.name);
                        report.failed.push(EntryFailure {
                            kind: entry.kind.clone(),
                            name: entry.name.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
        report
    }

    fn skip_reason(&self, route: EntryRoute, entry: &ArchiveEntry<'_>, venue: bool) -> Option<&'static str> {
        if route == EntryRoute::Ignored {
            return Some("not an importable type");
        }
        if venue && !self.options.import_venue && route != EntryRoute::Texture {
            return Some("venue import is off");
        }
        if route == EntryRoute::Mesh {
            let name = entry.name.as_str();
            if self.options.skip_low_lod {
                if self.rules.low_lod.is_match(name) {
                    return Some("low LOD");
                }
                if self.generation == DirectoryLayout::Nested9 && self.rules.any_lod.is_match(name) {
                    return Some("LOD mesh");
                }
            }
            if self.options.skip_shadow_mesh && self.rules.shadow.is_match(name) {
                return Some("shadow mesh");
            }
        }
        None
    }

    fn decode_entry(&mut self, route: EntryRoute, entry: &ArchiveEntry<'_>) -> Result<Outcome> {
        let Some(format) = route.format() else {
            return Ok(Outcome::Skipped);
        };
        let tag = sniff(entry.payload, format, self.options.byte_order_override)?;
        let name = entry.name.as_str();
        match route {
            EntryRoute::Texture => {
                let tex = decode_texture(name, entry.payload, tag, self.platform, self.options.texture_profile)?;
                self.texture(tex)?;
            }
            EntryRoute::Material => {
                let mat = decode_material(name, entry.payload, tag)?;
                self.material(mat);
            }
            EntryRoute::Mesh => {
                let mesh = decode_mesh(name, entry.payload, tag, self.platform, self.generation)?;
                self.mesh(&mesh);
            }
            EntryRoute::Transform => {
                let node = decode_transform(name, entry.payload, tag, self.platform)?;
                let outcome = self.skeleton.link(&node);
                if let Some(parent) = &outcome.placeholder_parent {
                    self.placeholder_bone(parent);
                }
                self.sink.create_or_get_bone(&node.name, outcome.parent.as_deref());
                self.sink.set_bone_local_pose(&node.name, &node.local);
            }
            EntryRoute::TransAnim => {
                let clip = decode_trans_anim(name, entry.payload, tag)?;
                self.keyed_clip(&clip)?;
            }
            EntryRoute::PropAnim => {
                let clip = decode_prop_anim(name, entry.payload, tag)?;
                self.keyed_clip(&clip)?;
            }
            EntryRoute::ClipSamples => {
                let clip = decode_clip_samples(name, entry.payload, tag)?;
                for track in &clip.tracks {
                    if self.skeleton.ensure_bone(&track.target) {
                        self.placeholder_bone(&track.target);
                    }
                }
                self.emit_keys(&clip);
            }
            EntryRoute::Ignored => return Ok(Outcome::Skipped),
        }
        Ok(Outcome::Decoded)
    }

    fn texture(&mut self, tex: TextureAsset) -> Result<()> {
        if self.options.export_textures {
            if let Some(dir) = &self.options.output_dir {
                export_texture(&tex, self.platform, dir)?;
            }
        }
        self.textures.insert(tex.name.clone(), tex);
        Ok(())
    }

    fn material(&mut self, mat: MaterialAsset) {
        self.sink.create_or_get_material(&mat.name);
        self.sink.set_material_params(&mat.name, &mat.params);
        for (&slot, texture) in &mat.texture_refs {
            if self.textures.contains_key(texture) {
                self.sink.bind_material_texture_slot(&mat.name, slot, texture);
            } else {
                debug!("{}: no texture {texture:?} for {slot:?}", mat.name);
            }
        }
        self.materials.insert(mat.name.clone(), mat);
    }

    fn mesh(&mut self, mesh: &MeshAsset) {
        let positions: Vec<_> = mesh.vertices.iter().map(|v| v.position).collect();
        let uvs: Vec<_> = mesh.vertices.iter().map(|v| v.flipped_uv()).collect();
        let normals = mesh.normals();
        let groups = (!mesh.bone_names.is_empty()).then_some(mesh.bone_names.as_slice());
        self.sink.create_mesh(
            &mesh.name,
            MeshData {
                positions: &positions,
                faces: &mesh.faces,
                uvs: &uvs,
                normals: normals.as_deref(),
                groups,
            },
        );
        self.sink.set_world_transform(&mesh.name, &mesh.world);
        if !mesh.material.is_empty() {
            if !self.materials.contains_key(&mesh.material) {
                debug!("{}: material {:?} not decoded, creating it empty", mesh.name, mesh.material);
                self.sink.create_or_get_material(&mesh.material);
            }
            self.sink.assign_material(&mesh.name, &mesh.material);
        }
        let (weights, clamped) = mesh.group_weights();
        if clamped > 0 {
            warn!(
                "{}: {clamped} skin weights reference bones past the {}-entry bone table",
                mesh.name,
                mesh.bone_names.len()
            );
        }
        for w in weights {
            self.sink
                .add_vertex_group_weight(&mesh.name, &mesh.bone_names[w.group], w.vertex, w.weight);
        }
        self.meshes.insert(mesh.name.clone());
    }

    fn placeholder_bone(&mut self, name: &str) {
        self.sink.create_or_get_bone(name, None);
        self.sink.set_bone_local_pose(name, &Matrix34::IDENTITY);
    }

    fn keyed_clip(&mut self, clip: &AnimationClip) -> Result<()> {
        for track in &clip.tracks {
            if !self.meshes.contains(&track.target) && !self.skeleton.contains(&track.target) {
                return Err(DecodeError::UnresolvedReference {
                    kind: "animation target",
                    name: track.target.clone(),
                });
            }
        }
        self.emit_keys(clip);
        Ok(())
    }

    fn emit_keys(&mut self, clip: &AnimationClip) {
        for track in &clip.tracks {
            for key in &track.keys {
                self.sink
                    .insert_keyframe(&track.target, &key.channel, key.frame, key.value);
            }
        }
        debug!("{}: {} keys", clip.name, clip.key_count());
    }
}
