//! Intermediate model content produced by the loaders
//!
//! Loaders fill a [`ModelContent`] with buffers, a bone tree, skins and clips
//! that all reference each other by index. [`ModelBuilder`](crate::ModelBuilder)
//! turns it into an immutable [`Model`](crate::Model).
//!
//! Index values in a mesh part are relative to the part's `vertex_offset`.

use drm_common::{VertexDeclaration, VertexElement, VertexElementFormat, VertexElementUsage};
use glam::{Mat4, Vec2, Vec3, Vec4};
use hashbrown::HashSet;
use tracing::debug;

use crate::animation::AnimationClip;
use crate::error::{ModelError, Result};
use crate::mesh::{IndexBuffer, Material, PrimitiveType, VertexBuffer};
use crate::transform::SrtTransform;

/// One node of the content bone tree
#[derive(Debug, Clone, PartialEq)]
pub struct BoneContent {
    pub name: String,
    pub default_pose: SrtTransform,
    /// Index into [`ModelContent::meshes`]
    pub mesh: Option<usize>,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl BoneContent {
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshPartContent {
    /// Index into [`ModelContent::vertex_buffers`]
    pub vertex_buffer: usize,
    pub vertex_offset: u32,
    pub num_vertices: u32,
    /// Index into [`ModelContent::index_buffers`]
    pub index_buffer: usize,
    pub start_index: u32,
    pub primitive_count: u32,
    pub primitive_type: PrimitiveType,
    /// Index into [`ModelContent::materials`]
    pub material: Option<usize>,
    /// Index into [`ModelContent::skins`]
    pub skin: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshContent {
    pub name: String,
    pub parts: Vec<MeshPartContent>,
}

/// Joints by content bone index, paired positionally with inverse binds
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkinContent {
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

/// Everything a loader extracted, cross-referenced by index.
///
/// Animation channels target content bone indices.
#[derive(Debug, Clone, Default)]
pub struct ModelContent {
    bones: Vec<BoneContent>,
    root: Option<usize>,
    pub vertex_buffers: Vec<VertexBuffer>,
    pub index_buffers: Vec<IndexBuffer>,
    pub meshes: Vec<MeshContent>,
    pub skins: Vec<SkinContent>,
    pub materials: Vec<Material>,
    pub animations: Vec<AnimationClip>,
}

impl ModelContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached bone and return its content index
    pub fn add_bone(&mut self, name: impl Into<String>, default_pose: SrtTransform) -> usize {
        self.bones.push(BoneContent {
            name: name.into(),
            default_pose,
            mesh: None,
            parent: None,
            children: Vec::new(),
        });
        self.bones.len() - 1
    }

    pub fn bones(&self) -> &[BoneContent] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&BoneContent> {
        self.bones.get(index)
    }

    pub fn bone_mut(&mut self, index: usize) -> Option<&mut BoneContent> {
        self.bones.get_mut(index)
    }

    /// Explicit root, or the first bone without a parent
    pub fn root(&self) -> Option<usize> {
        self.root
            .or_else(|| self.bones.iter().position(|b| b.parent.is_none()))
    }

    pub fn set_root(&mut self, root: usize) -> Result<()> {
        self.check_bone(root)?;
        self.root = Some(root);
        Ok(())
    }

    /// Append `child` to `parent`, taking it away from any previous parent
    pub fn add_child(&mut self, parent: usize, child: usize) -> Result<()> {
        self.check_bone(parent)?;
        self.check_bone(child)?;
        if parent == child {
            return Err(ModelError::invalid_argument(format!(
                "bone {parent} cannot be its own child"
            )));
        }
        self.detach(child);
        self.bones[child].parent = Some(parent);
        self.bones[parent].children.push(child);
        Ok(())
    }

    /// Replace the children of `parent`. Old children become detached.
    pub fn set_children(&mut self, parent: usize, children: Vec<usize>) -> Result<()> {
        self.check_bone(parent)?;
        for &child in &children {
            self.check_bone(child)?;
            if child == parent {
                return Err(ModelError::invalid_argument(format!(
                    "bone {parent} cannot be its own child"
                )));
            }
        }
        for old in std::mem::take(&mut self.bones[parent].children) {
            self.bones[old].parent = None;
        }
        for child in children {
            self.add_child(parent, child)?;
        }
        Ok(())
    }

    fn detach(&mut self, child: usize) {
        if let Some(old) = self.bones[child].parent.take() {
            self.bones[old].children.retain(|&c| c != child);
        }
    }

    fn check_bone(&self, index: usize) -> Result<()> {
        if index < self.bones.len() {
            Ok(())
        } else {
            Err(ModelError::BoneIndexOutOfRange {
                index,
                count: self.bones.len(),
            })
        }
    }

    /// Bone tree roots in content order
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Reverse the winding of every triangle-list part
    pub fn flip_winding(&mut self) -> Result<()> {
        let mut windows = HashSet::new();
        for part in self.meshes.iter().flat_map(|m| &m.parts) {
            if part.primitive_type == PrimitiveType::TriangleList {
                windows.insert((part.index_buffer, part.start_index, part.primitive_count));
            }
        }
        for (buffer, start, count) in windows {
            let indices = self.index_buffers.get_mut(buffer).ok_or_else(|| {
                ModelError::format(format!("mesh part references missing index buffer {buffer}"))
            })?;
            let end = start as usize + count as usize * 3;
            if end > indices.index_count() {
                return Err(ModelError::format(format!(
                    "triangle window {start}..{end} overruns index buffer {buffer}"
                )));
            }
            for tri in (start as usize..end).step_by(3) {
                indices.swap(tri, tri + 2);
            }
        }
        Ok(())
    }

    /// Add a `Tangent` element to every vertex buffer that has positions,
    /// normals and first-set texture coordinates but no tangents.
    pub fn generate_tangents(&mut self) -> Result<()> {
        for buffer_index in 0..self.vertex_buffers.len() {
            let decl = self.vertex_buffers[buffer_index].declaration();
            if decl.contains(VertexElementUsage::Tangent)
                || decl.find(VertexElementUsage::Position, 0).is_none()
                || !matches!(
                    decl.find(VertexElementUsage::Normal, 0).map(|e| e.format),
                    Some(VertexElementFormat::Vector3 | VertexElementFormat::Vector4)
                )
                || decl
                    .find(VertexElementUsage::TextureCoordinate, 0)
                    .map(|e| e.format)
                    != Some(VertexElementFormat::Vector2)
            {
                continue;
            }

            let triangles = self.triangles_for(buffer_index)?;
            let tangents = compute_tangents(&self.vertex_buffers[buffer_index], &triangles);
            self.vertex_buffers[buffer_index] =
                append_tangents(&self.vertex_buffers[buffer_index], &tangents)?;
            debug!(
                "generated {} tangents for vertex buffer {}",
                tangents.len(),
                buffer_index
            );
        }
        Ok(())
    }

    /// Absolute vertex indices of every triangle drawn from `vertex_buffer`
    fn triangles_for(&self, vertex_buffer: usize) -> Result<Vec<[usize; 3]>> {
        let mut triangles = Vec::new();
        for part in self.meshes.iter().flat_map(|m| &m.parts) {
            if part.vertex_buffer != vertex_buffer
                || part.primitive_type != PrimitiveType::TriangleList
            {
                continue;
            }
            let indices = self.index_buffers.get(part.index_buffer).ok_or_else(|| {
                ModelError::format(format!(
                    "mesh part references missing index buffer {}",
                    part.index_buffer
                ))
            })?;
            let base = part.vertex_offset as usize;
            for tri in 0..part.primitive_count as usize {
                let at = part.start_index as usize + tri * 3;
                let (Some(a), Some(b), Some(c)) =
                    (indices.get(at), indices.get(at + 1), indices.get(at + 2))
                else {
                    return Err(ModelError::format(format!(
                        "triangle {tri} overruns index buffer {}",
                        part.index_buffer
                    )));
                };
                triangles.push([base + a as usize, base + b as usize, base + c as usize]);
            }
        }
        Ok(triangles)
    }
}

fn read_floats<const N: usize>(buffer: &VertexBuffer, element: &VertexElement, vertex: usize) -> [f32; N] {
    let start = vertex * buffer.declaration().stride() as usize + element.offset as usize;
    let mut out = [0.0; N];
    if let Some(bytes) = buffer.data().get(start..start + N * 4) {
        for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }
    out
}

/// Per-vertex tangents with handedness in `w`
fn compute_tangents(buffer: &VertexBuffer, triangles: &[[usize; 3]]) -> Vec<Vec4> {
    let decl = buffer.declaration();
    let count = buffer.vertex_count() as usize;
    let (Some(normal), Some(uv)) = (
        decl.find(VertexElementUsage::Normal, 0),
        decl.find(VertexElementUsage::TextureCoordinate, 0),
    ) else {
        return Vec::new();
    };

    let position = |v: usize| buffer.position(v).unwrap_or(Vec3::ZERO);
    let texcoord = |v: usize| Vec2::from(read_floats::<2>(buffer, uv, v));

    let mut tan = vec![Vec3::ZERO; count];
    let mut bitan = vec![Vec3::ZERO; count];
    for &[a, b, c] in triangles {
        if a.max(b).max(c) >= count {
            continue;
        }
        let e1 = position(b) - position(a);
        let e2 = position(c) - position(a);
        let d1 = texcoord(b) - texcoord(a);
        let d2 = texcoord(c) - texcoord(a);
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let sdir = (e1 * d2.y - e2 * d1.y) * r;
        let tdir = (e2 * d1.x - e1 * d2.x) * r;
        for v in [a, b, c] {
            tan[v] += sdir;
            bitan[v] += tdir;
        }
    }

    (0..count)
        .map(|v| {
            let n = Vec3::from_slice(&read_floats::<3>(buffer, normal, v)).normalize_or_zero();
            // Gram-Schmidt against the normal
            let t = (tan[v] - n * n.dot(tan[v])).normalize_or_zero();
            let t = if t != Vec3::ZERO {
                t
            } else if n != Vec3::ZERO {
                n.any_orthonormal_vector()
            } else {
                Vec3::X
            };
            let w = if n.cross(t).dot(bitan[v]) < 0.0 { -1.0 } else { 1.0 };
            t.extend(w)
        })
        .collect()
}

fn append_tangents(buffer: &VertexBuffer, tangents: &[Vec4]) -> Result<VertexBuffer> {
    let decl = buffer.declaration();
    let old_stride = decl.stride() as usize;
    let mut elements = decl.elements().to_vec();
    elements.push(VertexElement::new(
        decl.stride(),
        VertexElementFormat::Vector4,
        VertexElementUsage::Tangent,
        0,
    ));
    let new_decl =
        VertexDeclaration::with_stride(decl.stride() + VertexElementFormat::Vector4.size(), elements);

    let mut data = Vec::with_capacity(tangents.len() * new_decl.stride() as usize);
    for (vertex, tangent) in buffer.data().chunks_exact(old_stride).zip(tangents) {
        data.extend_from_slice(vertex);
        data.extend_from_slice(bytemuck::cast_slice(&tangent.to_array()));
    }
    VertexBuffer::new(new_decl, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_children_transfers_ownership() {
        let mut content = ModelContent::new();
        let root = content.add_bone("root", SrtTransform::IDENTITY);
        let a = content.add_bone("a", SrtTransform::IDENTITY);
        let b = content.add_bone("b", SrtTransform::IDENTITY);
        let c = content.add_bone("c", SrtTransform::IDENTITY);

        content.set_children(root, vec![a, b]).unwrap();
        assert_eq!(content.bone(a).unwrap().parent(), Some(root));

        // b moves under a; the old list of root loses it
        content.add_child(a, b).unwrap();
        assert_eq!(content.bone(root).unwrap().children(), &[a]);
        assert_eq!(content.bone(b).unwrap().parent(), Some(a));

        content.set_children(root, vec![c]).unwrap();
        assert_eq!(content.bone(a).unwrap().parent(), None);
        assert_eq!(content.bone(c).unwrap().parent(), Some(root));
        assert_eq!(content.root(), Some(root));
    }

    #[test]
    fn test_failed_set_children_leaves_tree_intact() {
        let mut content = ModelContent::new();
        let root = content.add_bone("root", SrtTransform::IDENTITY);
        let a = content.add_bone("a", SrtTransform::IDENTITY);
        content.add_child(root, a).unwrap();

        assert!(matches!(
            content.set_children(root, vec![root]),
            Err(ModelError::InvalidArgument(_))
        ));
        assert!(content.set_children(root, vec![a, 9]).is_err());
        assert_eq!(content.bone(root).unwrap().children(), &[a]);
        assert_eq!(content.bone(a).unwrap().parent(), Some(root));
    }

    #[test]
    fn test_out_of_range_child() {
        let mut content = ModelContent::new();
        let root = content.add_bone("root", SrtTransform::IDENTITY);
        assert!(matches!(
            content.add_child(root, 5),
            Err(ModelError::BoneIndexOutOfRange { index: 5, count: 1 })
        ));
    }

    fn quad_content() -> ModelContent {
        let decl = VertexDeclaration::from_elements([
            (VertexElementUsage::Position, VertexElementFormat::Vector3, 0),
            (VertexElementUsage::Normal, VertexElementFormat::Vector3, 0),
            (VertexElementUsage::TextureCoordinate, VertexElementFormat::Vector2, 0),
        ]);
        let verts: [[f32; 8]; 3] = [
            [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0],
        ];
        let mut content = ModelContent::new();
        content.vertex_buffers.push(
            VertexBuffer::new(decl, bytemuck::cast_slice(&verts).to_vec()).unwrap(),
        );
        content.index_buffers.push(IndexBuffer::from_indices(&[0, 1, 2]));
        content.meshes.push(MeshContent {
            name: "tri".to_string(),
            parts: vec![MeshPartContent {
                vertex_buffer: 0,
                vertex_offset: 0,
                num_vertices: 3,
                index_buffer: 0,
                start_index: 0,
                primitive_count: 1,
                primitive_type: PrimitiveType::TriangleList,
                material: None,
                skin: None,
            }],
        });
        content
    }

    #[test]
    fn test_flip_winding_reverses_triangles() {
        let mut content = quad_content();
        content.flip_winding().unwrap();
        assert_eq!(content.index_buffers[0].indices(), vec![2, 1, 0]);
    }

    #[test]
    fn test_generate_tangents_follows_u_axis() {
        let mut content = quad_content();
        content.generate_tangents().unwrap();

        let vb = &content.vertex_buffers[0];
        let tangent = vb
            .declaration()
            .find(VertexElementUsage::Tangent, 0)
            .copied()
            .unwrap();
        assert_eq!(vb.declaration().stride(), 48);
        let t = read_floats::<4>(vb, &tangent, 1);
        assert!(Vec4::from(t).abs_diff_eq(Vec4::new(1.0, 0.0, 0.0, 1.0), 1e-5));

        // Already present: left alone
        content.generate_tangents().unwrap();
        assert_eq!(content.vertex_buffers[0].declaration().stride(), 48);
    }
}
