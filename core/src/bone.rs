//! Bones of a built model
//!
//! Bones live in a flat arena ([`Model::bones`](crate::Model::bones)) in
//! depth-first pre-order. Links are indices into that arena: a parent is
//! always stored before its children.

use crate::transform::SrtTransform;

#[derive(Debug, Clone)]
pub struct Bone<M> {
    pub(crate) name: String,
    pub(crate) index: usize,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) default_pose: SrtTransform,
    pub(crate) mesh: Option<M>,
    pub(crate) skin: Option<usize>,
}

impl<M> Bone<M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the model's bone array
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn default_pose(&self) -> &SrtTransform {
        &self.default_pose
    }

    pub fn mesh(&self) -> Option<&M> {
        self.mesh.as_ref()
    }

    /// Skin used by one of this bone's mesh parts
    pub fn skin(&self) -> Option<usize> {
        self.skin
    }

    pub(crate) fn map_mesh<N>(self, f: &mut impl FnMut(M) -> N) -> Bone<N> {
        Bone {
            name: self.name,
            index: self.index,
            parent: self.parent,
            children: self.children,
            default_pose: self.default_pose,
            mesh: self.mesh.map(f),
            skin: self.skin,
        }
    }
}
