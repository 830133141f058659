//! Rigid transforms and the single bone forest they are folded into.

use binrw::binread;
use indexmap::IndexMap;
use log::{debug, warn};
use petgraph::{
    algo::has_path_connecting,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
    Direction,
};
use serde::Serialize;

use crate::{
    cursor::{ByteCursor, ByteOrder},
    dispatch::FormatTag,
    error::{DecodeError, Result},
    platform::Platform,
};

pub const ARMATURE: &str = "Armature";

/// Three basis columns followed by the translation.
#[binread]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Matrix34 {
    pub basis: [[f32; 3]; 3],
    pub translation: [f32; 3],
}

impl Matrix34 {
    pub const IDENTITY: Self = Self {
        basis: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.0, 0.0, 0.0],
    };

    /// Row-major 4x4 with the basis columns placed as columns.
    pub fn to_rows(&self) -> [[f32; 4]; 4] {
        let [c0, c1, c2] = self.basis;
        let t = self.translation;
        [
            [c0[0], c1[0], c2[0], t[0]],
            [c0[1], c1[1], c2[1], t[1]],
            [c0[2], c1[2], c2[2], t[2]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

impl Default for Matrix34 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformNode {
    pub name: String,
    pub target: String,
    pub parent: String,
    pub local: Matrix34,
    pub world: Matrix34,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransLayout {
    /// Matrices at 8, then an inline trans list before the names.
    Inline,
    /// Matrices and names at fixed offsets.
    Fixed { matrices: usize, names: usize },
}

impl TransLayout {
    fn select(version: u32, platform: Platform) -> Result<Self> {
        Ok(match (version, platform) {
            (8, _) => TransLayout::Inline,
            (9, Platform::Ps2) => TransLayout::Fixed {
                matrices: 13,
                names: 113,
            },
            (9, _) => TransLayout::Fixed {
                matrices: 17,
                names: 117,
            },
            (version, platform) => {
                return Err(DecodeError::UnsupportedLayout {
                    kind: "Trans",
                    version,
                    platform,
                })
            }
        })
    }
}

pub fn decode_transform(name: &str, payload: &[u8], tag: FormatTag, platform: Platform) -> Result<TransformNode> {
    let order = tag.order;
    let layout = TransLayout::select(tag.version, platform)?;
    let mut cur = ByteCursor::new(payload);
    let read_matrices = |cur: &mut ByteCursor, at: usize| -> Result<(Matrix34, Matrix34)> {
        cur.seek_absolute(at)?;
        Ok((cur.read(order)?, cur.read(order)?))
    };
    let (local, world) = match layout {
        TransLayout::Inline => {
            let matrices = read_matrices(&mut cur, 8)?;
            let trans = cur.read_string_list(order)?;
            debug!("{name}: {} inline trans objects", trans.len());
            cur.skip(4)?;
            matrices
        }
        TransLayout::Fixed { matrices, names } => {
            let matrices = read_matrices(&mut cur, matrices)?;
            cur.seek_absolute(names)?;
            matrices
        }
    };
    let target = cur.read_string(order)?;
    cur.skip(1)?;
    let parent = cur.read_string(order)?;
    Ok(TransformNode {
        name: name.to_owned(),
        target,
        parent,
        local,
        world,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bone {
    pub name: String,
    pub pose: Matrix34,
    /// Created because a child named it before it was seen.
    pub placeholder: bool,
}

/// What [`Skeleton::link`] changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub placeholder_parent: Option<String>,
    pub parent: Option<String>,
}

/// The bone forest of one decode session.
#[derive(Debug)]
pub struct Skeleton {
    pub name: String,
    graph: DiGraph<Bone, ()>,
    index: IndexMap<String, NodeIndex>,
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new(ARMATURE)
    }
}

impl Skeleton {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            graph: DiGraph::new(),
            index: IndexMap::new(),
        }
    }

    fn get_or_insert(&mut self, name: &str) -> (NodeIndex, bool) {
        if let Some(&idx) = self.index.get(name) {
            return (idx, false);
        }
        let idx = self.graph.add_node(Bone {
            name: name.to_owned(),
            pose: Matrix34::IDENTITY,
            placeholder: true,
        });
        self.index.insert(name.to_owned(), idx);
        (idx, true)
    }

    /// Inserts or updates the bone for `node`, creating its parent when missing.
    pub fn link(&mut self, node: &TransformNode) -> LinkOutcome {
        let mut outcome = LinkOutcome::default();
        let (idx, _) = self.get_or_insert(&node.name);
        {
            let bone = &mut self.graph[idx];
            bone.pose = node.local;
            bone.placeholder = false;
        }
        if node.parent.is_empty() || node.parent == node.name {
            return outcome;
        }
        let (parent_idx, created) = self.get_or_insert(&node.parent);
        if created {
            debug!("Placeholder bone {:?} for {:?}", node.parent, node.name);
            outcome.placeholder_parent = Some(node.parent.clone());
        }
        if has_path_connecting(&self.graph, idx, parent_idx, None) {
            warn!(
                "Not parenting {:?} to its own descendant {:?}",
                node.name, node.parent
            );
            return outcome;
        }
        let old: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        for edge in old {
            self.graph.remove_edge(edge);
        }
        self.graph.add_edge(parent_idx, idx, ());
        outcome.parent = Some(node.parent.clone());
        outcome
    }

    /// Makes sure `name` exists, as an identity placeholder if it's new.
    pub fn ensure_bone(&mut self, name: &str) -> bool {
        self.get_or_insert(name).1
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.index.get(name).map(|&idx| &self.graph[idx])
    }

    pub fn parent_of(&self, name: &str) -> Option<&str> {
        let idx = *self.index.get(name)?;
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .next()
            .map(|p| self.graph[p].name.as_str())
    }

    pub fn roots(&self) -> Vec<&str> {
        self.index
            .iter()
            .filter(|(_, &idx)| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
