//! Immutable model asset

use glam::Mat4;
use hashbrown::HashMap;

use crate::animation::AnimationClip;
use crate::bone::Bone;
use crate::error::{ModelError, Result};
use crate::mesh::{BoundingBox, Material, Mesh};
use crate::skin::Skin;

/// Bone hierarchy with meshes, skins, materials and clips.
///
/// Never mutated after [`ModelBuilder::build`](crate::ModelBuilder::build);
/// any number of [`ModelInstance`](crate::ModelInstance)s may read it at once.
#[derive(Debug, Clone)]
pub struct Model<M = Mesh> {
    pub(crate) bones: Vec<Bone<M>>,
    pub(crate) bone_lookup: HashMap<String, usize>,
    pub(crate) mesh_bones: Vec<usize>,
    pub(crate) skins: Vec<Skin>,
    pub(crate) materials: Vec<Material>,
    pub(crate) animations: Vec<AnimationClip>,
    pub(crate) animation_lookup: HashMap<String, usize>,
    pub(crate) default_world: Vec<Mat4>,
    pub(crate) bounds: BoundingBox,
}

impl<M> Model<M> {
    pub fn root(&self) -> &Bone<M> {
        &self.bones[0]
    }

    /// All bones in depth-first pre-order; `bones()[i].index() == i`
    pub fn bones(&self) -> &[Bone<M>] {
        &self.bones
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bone(&self, index: usize) -> Result<&Bone<M>> {
        self.bones.get(index).ok_or(ModelError::BoneIndexOutOfRange {
            index,
            count: self.bones.len(),
        })
    }

    /// First bone with this name in traversal order
    pub fn bone_by_name(&self, name: &str) -> Option<&Bone<M>> {
        self.bone_lookup.get(name).map(|&i| &self.bones[i])
    }

    /// Bones carrying a mesh, in traversal order
    pub fn mesh_bones(&self) -> impl Iterator<Item = &Bone<M>> + '_ {
        self.mesh_bones.iter().map(|&i| &self.bones[i])
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn animations(&self) -> &[AnimationClip] {
        &self.animations
    }

    pub fn clip(&self, name: &str) -> Result<&AnimationClip> {
        self.animation_lookup
            .get(name)
            .map(|&i| &self.animations[i])
            .ok_or_else(|| ModelError::MissingClip(name.to_string()))
    }

    /// World transform of every bone in the default pose
    pub fn default_world_transforms(&self) -> &[Mat4] {
        &self.default_world
    }

    /// Bounds of all meshes placed by the default pose
    pub fn bounds_in_default_pose(&self) -> BoundingBox {
        self.bounds
    }

    /// Convert the mesh representation, e.g. to GPU handles, keeping
    /// the hierarchy, skins and clips as they are
    pub fn map_meshes<N>(self, mut f: impl FnMut(M) -> N) -> Model<N> {
        Model {
            bones: self.bones.into_iter().map(|b| b.map_mesh(&mut f)).collect(),
            bone_lookup: self.bone_lookup,
            mesh_bones: self.mesh_bones,
            skins: self.skins,
            materials: self.materials,
            animations: self.animations,
            animation_lookup: self.animation_lookup,
            default_world: self.default_world,
            bounds: self.bounds,
        }
    }
}
