//! The receiving end of a decode: anything that can build a scene.

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    anim::KeyValue,
    material::{MaterialParams, TextureSlot},
    skeleton::Matrix34,
};

/// Geometry handed to [`SceneSink::create_mesh`].
#[derive(Debug, Clone, Copy)]
pub struct MeshData<'m> {
    pub positions: &'m [[f32; 3]],
    pub faces: &'m [[u16; 3]],
    /// Already flipped to V-up.
    pub uvs: &'m [[f32; 2]],
    pub normals: Option<&'m [[f32; 3]]>,
    /// Vertex group names, in bone-index order.
    pub groups: Option<&'m [String]>,
}

pub trait SceneSink {
    fn create_mesh(&mut self, name: &str, mesh: MeshData<'_>);
    fn set_world_transform(&mut self, object: &str, matrix: &Matrix34);
    fn assign_material(&mut self, mesh: &str, material: &str);
    fn add_vertex_group_weight(&mut self, mesh: &str, group: &str, vertex: u32, weight: f32);

    fn create_or_get_bone(&mut self, name: &str, parent: Option<&str>);
    fn set_bone_local_pose(&mut self, name: &str, matrix: &Matrix34);

    fn create_or_get_material(&mut self, name: &str);
    fn set_material_params(&mut self, name: &str, params: &MaterialParams);
    fn bind_material_texture_slot(&mut self, material: &str, slot: TextureSlot, texture: &str);

    fn insert_keyframe(&mut self, target: &str, channel: &str, frame: f32, value: KeyValue);
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RecordedMesh {
    pub positions: Vec<[f32; 3]>,
    pub faces: Vec<[u16; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub material: Option<String>,
    pub world: Option<Matrix34>,
    /// group name -> (vertex, weight)
    pub groups: IndexMap<String, Vec<(u32, f32)>>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RecordedBone {
    pub parent: Option<String>,
    pub pose: Option<Matrix34>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RecordedMaterial {
    pub params: Option<MaterialParams>,
    pub slots: IndexMap<TextureSlot, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedKey {
    pub target: String,
    pub channel: String,
    pub frame: f32,
    pub value: KeyValue,
}

/// A sink that only remembers what it was told, for dumping and for tests.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SceneRecorder {
    pub meshes: IndexMap<String, RecordedMesh>,
    /// Transforms set on objects that aren't meshes.
    pub objects: IndexMap<String, Matrix34>,
    pub bones: IndexMap<String, RecordedBone>,
    pub materials: IndexMap<String, RecordedMaterial>,
    pub keyframes: Vec<RecordedKey>,
}

impl SceneRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys_for<'r>(&'r self, target: &'r str) -> impl Iterator<Item = &'r RecordedKey> + 'r {
        self.keyframes.iter().filter(move |k| k.target == target)
    }
}

impl SceneSink for SceneRecorder {
    fn create_mesh(&mut self, name: &str, mesh: MeshData<'_>) {
        let groups = mesh
            .groups
            .unwrap_or_default()
            .iter()
            .map(|g| (g.clone(), vec![]))
            .collect();
        self.meshes.insert(
            name.to_owned(),
            RecordedMesh {
                positions: mesh.positions.to_vec(),
                faces: mesh.faces.to_vec(),
                uvs: mesh.uvs.to_vec(),
                normals: mesh.normals.map(<[_]>::to_vec),
                material: None,
                world: None,
                groups,
            },
        );
    }

    fn set_world_transform(&mut self, object: &str, matrix: &Matrix34) {
        match self.meshes.get_mut(object) {
            Some(mesh) => mesh.world = Some(*matrix),
            None => {
                self.objects.insert(object.to_owned(), *matrix);
            }
        }
    }

    fn assign_material(&mut self, mesh: &str, material: &str) {
        if let Some(m) = self.meshes.get_mut(mesh) {
            m.material = Some(material.to_owned());
        }
    }

    fn add_vertex_group_weight(&mut self, mesh: &str, group: &str, vertex: u32, weight: f32) {
        if let Some(m) = self.meshes.get_mut(mesh) {
            m.groups
                .entry(group.to_owned())
                .or_default()
                .push((vertex, weight));
        }
    }

    fn create_or_get_bone(&mut self, name: &str, parent: Option<&str>) {
        let bone = self.bones.entry(name.to_owned()).or_default();
        if let Some(parent) = parent {
            bone.parent = Some(parent.to_owned());
        }
    }

    fn set_bone_local_pose(&mut self, name: &str, matrix: &Matrix34) {
        self.bones.entry(name.to_owned()).or_default().pose = Some(*matrix);
    }

    fn create_or_get_material(&mut self, name: &str) {
        self.materials.entry(name.to_owned()).or_default();
    }

    fn set_material_params(&mut self, name: &str, params: &MaterialParams) {
        self.materials.entry(name.to_owned()).or_default().params = Some(*params);
    }

    fn bind_material_texture_slot(&mut self, material: &str, slot: TextureSlot, texture: &str) {
        self.materials
            .entry(material.to_owned())
            .or_default()
            .slots
            .insert(slot, texture.to_owned());
    }

    fn insert_keyframe(&mut self, target: &str, channel: &str, frame: f32, value: KeyValue) {
        self.keyframes.push(RecordedKey {
            target: target.to_owned(),
            channel: channel.to_owned(),
            frame,
            value,
        });
    }
}
