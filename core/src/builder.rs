//! Two-phase model construction
//!
//! Loaders assemble a complete [`ModelContent`] first. The builder then walks
//! the bone tree depth-first in pre-order from the root, assigning each bone
//! its visit order as index, so a parent always precedes its children. Skin
//! joints and animation targets are remapped to those indices once, here.

use std::sync::Arc;

use glam::Mat4;
use hashbrown::HashMap;
use tracing::{info, warn};

use crate::animation::AnimationClip;
use crate::bone::Bone;
use crate::content::{MeshContent, ModelContent};
use crate::error::{ModelError, Result};
use crate::mesh::{BoundingBox, IndexBuffer, Mesh, MeshData, MeshPart, VertexBuffer};
use crate::model::Model;
use crate::skin::{Joint, Skin};

pub struct ModelBuilder {
    content: ModelContent,
    /// Content bone index -> model bone index
    remap: Vec<Option<usize>>,
    order: Vec<usize>,
}

impl ModelBuilder {
    pub fn new(content: ModelContent) -> Self {
        let bone_count = content.bones().len();
        Self {
            content,
            remap: vec![None; bone_count],
            order: Vec::with_capacity(bone_count),
        }
    }

    pub fn build(mut self) -> Result<Model> {
        let root = self
            .content
            .root()
            .ok_or_else(|| ModelError::invalid_argument("model has no bones"))?;
        self.visit(root)?;

        let dropped = self.content.bones().len() - self.order.len();
        if dropped > 0 {
            warn!("{} bone(s) not reachable from the root were dropped", dropped);
        }

        let vertex_buffers: Vec<Arc<VertexBuffer>> = std::mem::take(&mut self.content.vertex_buffers)
            .into_iter()
            .map(Arc::new)
            .collect();
        let index_buffers: Vec<Arc<IndexBuffer>> = std::mem::take(&mut self.content.index_buffers)
            .into_iter()
            .map(Arc::new)
            .collect();

        let skins = self.resolve_skins()?;
        let meshes = self
            .content
            .meshes
            .iter()
            .map(|m| self.build_mesh(m, &vertex_buffers, &index_buffers, skins.len()))
            .collect::<Result<Vec<_>>>()?;

        let mut bones = Vec::with_capacity(self.order.len());
        for (index, &content_index) in self.order.iter().enumerate() {
            let source = &self.content.bones()[content_index];
            let mesh = match source.mesh {
                Some(m) => Some(meshes.get(m).cloned().ok_or_else(|| {
                    ModelError::format(format!("bone '{}' references missing mesh {m}", source.name))
                })?),
                None => None,
            };
            let skin = mesh
                .as_ref()
                .and_then(|m: &Mesh| m.parts.iter().find_map(|p| p.skin));
            bones.push(Bone {
                name: source.name.clone(),
                index,
                parent: source.parent().and_then(|p| self.remap[p]),
                children: source
                    .children()
                    .iter()
                    .filter_map(|&c| self.remap[c])
                    .collect(),
                default_pose: source.default_pose,
                mesh,
                skin,
            });
        }

        let mut bone_lookup = HashMap::with_capacity(bones.len());
        for bone in &bones {
            bone_lookup.entry(bone.name.clone()).or_insert(bone.index);
        }
        let mesh_bones: Vec<usize> = bones
            .iter()
            .filter(|b| b.mesh.is_some())
            .map(|b| b.index)
            .collect();

        let default_world = default_world_transforms(&bones);
        let bounds = mesh_bones
            .iter()
            .filter_map(|&i| {
                let mesh = bones[i].mesh.as_ref()?;
                Some(mesh.bounding_box().transform(&default_world[i]))
            })
            .fold(BoundingBox::EMPTY, |acc, bb| acc.union(&bb));

        let animations = self.remap_animations()?;
        let mut animation_lookup = HashMap::with_capacity(animations.len());
        for (i, clip) in animations.iter().enumerate() {
            if animation_lookup.insert(clip.name().to_string(), i).is_some() {
                warn!("duplicate animation clip '{}', keeping the last", clip.name());
            }
        }

        info!(
            "built model: {} bones, {} meshes, {} skins, {} materials, {} clips",
            bones.len(),
            mesh_bones.len(),
            skins.len(),
            self.content.materials.len(),
            animations.len()
        );

        Ok(Model {
            bones,
            bone_lookup,
            mesh_bones,
            skins,
            materials: std::mem::take(&mut self.content.materials),
            animations,
            animation_lookup,
            default_world,
            bounds,
        })
    }

    fn visit(&mut self, root: usize) -> Result<()> {
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if self.remap[current].is_some() {
                return Err(ModelError::format(format!(
                    "bone '{}' is reachable more than once",
                    self.content.bones()[current].name
                )));
            }
            self.remap[current] = Some(self.order.len());
            self.order.push(current);
            // Reversed so the first child is popped first
            stack.extend(self.content.bones()[current].children().iter().rev());
        }
        Ok(())
    }

    fn resolve_skins(&self) -> Result<Vec<Skin>> {
        self.content
            .skins
            .iter()
            .enumerate()
            .map(|(index, skin)| {
                if skin.joints.len() != skin.inverse_bind_matrices.len() {
                    return Err(ModelError::format(format!(
                        "skin {index} has {} joints but {} inverse bind matrices",
                        skin.joints.len(),
                        skin.inverse_bind_matrices.len()
                    )));
                }
                let joints = skin
                    .joints
                    .iter()
                    .zip(&skin.inverse_bind_matrices)
                    .map(|(&bone, &inverse_bind)| {
                        let resolved = self.remap.get(bone).copied().flatten().ok_or_else(|| {
                            ModelError::format(format!(
                                "skin {index} joint references unreachable bone {bone}"
                            ))
                        })?;
                        Ok(Joint::new(resolved, inverse_bind))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Skin::new(index, joints)
            })
            .collect()
    }

    fn build_mesh(
        &self,
        mesh: &MeshContent,
        vertex_buffers: &[Arc<VertexBuffer>],
        index_buffers: &[Arc<IndexBuffer>],
        skin_count: usize,
    ) -> Result<Mesh> {
        let mut parts = Vec::with_capacity(mesh.parts.len());
        for part in &mesh.parts {
            let vertex_buffer = vertex_buffers.get(part.vertex_buffer).ok_or_else(|| {
                ModelError::format(format!(
                    "mesh '{}' references missing vertex buffer {}",
                    mesh.name, part.vertex_buffer
                ))
            })?;
            let index_buffer = index_buffers.get(part.index_buffer).ok_or_else(|| {
                ModelError::format(format!(
                    "mesh '{}' references missing index buffer {}",
                    mesh.name, part.index_buffer
                ))
            })?;
            let vertex_end = u64::from(part.vertex_offset) + u64::from(part.num_vertices);
            if vertex_end > u64::from(vertex_buffer.vertex_count()) {
                return Err(ModelError::format(format!(
                    "mesh '{}' vertex window ends at {vertex_end} past {} vertices",
                    mesh.name,
                    vertex_buffer.vertex_count()
                )));
            }
            let index_count = part
                .primitive_type
                .index_count(part.primitive_count)
                .ok_or_else(|| {
                    ModelError::format(format!(
                        "mesh '{}' primitive count {} overflows",
                        mesh.name, part.primitive_count
                    ))
                })?;
            let index_end = u64::from(part.start_index) + u64::from(index_count);
            if index_end > index_buffer.index_count() as u64 {
                return Err(ModelError::format(format!(
                    "mesh '{}' index window ends at {index_end} past {} indices",
                    mesh.name,
                    index_buffer.index_count()
                )));
            }
            if let Some(material) = part.material
                && material >= self.content.materials.len()
            {
                return Err(ModelError::format(format!(
                    "mesh '{}' references missing material {material}",
                    mesh.name
                )));
            }
            if let Some(skin) = part.skin
                && skin >= skin_count
            {
                return Err(ModelError::format(format!(
                    "mesh '{}' references missing skin {skin}",
                    mesh.name
                )));
            }

            let bounding_box = BoundingBox::from_points(
                (part.vertex_offset as usize..vertex_end as usize).filter_map(|v| vertex_buffer.position(v)),
            );
            parts.push(MeshPart {
                vertex_buffer: Arc::clone(vertex_buffer),
                vertex_offset: part.vertex_offset,
                num_vertices: part.num_vertices,
                index_buffer: Arc::clone(index_buffer),
                start_index: part.start_index,
                primitive_count: part.primitive_count,
                primitive_type: part.primitive_type,
                bounding_box,
                material: part.material,
                skin: part.skin,
            });
        }
        Ok(Mesh::new(mesh.name.clone(), parts))
    }

    fn remap_animations(&mut self) -> Result<Vec<AnimationClip>> {
        let mut clips = std::mem::take(&mut self.content.animations);
        for clip in &mut clips {
            let name = clip.name().to_string();
            let mut kept = Vec::with_capacity(clip.channels().len());
            for mut channel in std::mem::take(clip.channels_mut()) {
                match self.remap.get(channel.bone()) {
                    Some(Some(bone)) => {
                        channel.set_bone(*bone);
                        kept.push(channel);
                    }
                    Some(None) => warn!(
                        "clip '{}' animates unreachable bone {}; channel dropped",
                        name,
                        channel.bone()
                    ),
                    None => {
                        return Err(ModelError::BoneIndexOutOfRange {
                            index: channel.bone(),
                            count: self.remap.len(),
                        });
                    }
                }
            }
            *clip.channels_mut() = kept;
        }
        Ok(clips)
    }
}

/// Single forward sweep; relies on parents preceding children
pub(crate) fn default_world_transforms<M>(bones: &[Bone<M>]) -> Vec<Mat4> {
    let mut world: Vec<Mat4> = Vec::with_capacity(bones.len());
    for bone in bones {
        let local = bone.default_pose.to_matrix();
        let transform = match bone.parent {
            Some(parent) => world[parent] * local,
            None => local,
        };
        world.push(transform);
    }
    world
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationChannel, Keyframe};
    use crate::content::SkinContent;
    use crate::transform::SrtTransform;
    use glam::Vec3;

    fn tree() -> ModelContent {
        // Declared out of order on purpose: hips is added last
        let mut content = ModelContent::new();
        let spine = content.add_bone("spine", SrtTransform::from_translation(Vec3::Y));
        let head = content.add_bone("head", SrtTransform::from_translation(Vec3::Y));
        let leg = content.add_bone("leg", SrtTransform::from_translation(-Vec3::Y));
        let hips = content.add_bone("hips", SrtTransform::IDENTITY);
        content.set_children(hips, vec![spine, leg]).unwrap();
        content.add_child(spine, head).unwrap();
        content.set_root(hips).unwrap();
        content
    }

    #[test]
    fn test_pre_order_indices() {
        let model = ModelBuilder::new(tree()).build().unwrap();
        let names: Vec<_> = model.bones().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["hips", "spine", "head", "leg"]);
        for (i, bone) in model.bones().iter().enumerate() {
            assert_eq!(bone.index(), i);
            if let Some(parent) = bone.parent() {
                assert!(parent < i);
                assert!(model.bones()[parent].children().contains(&i));
            }
        }
        assert!(model.root().is_root());
        assert_eq!(model.bone_by_name("head").unwrap().index(), 2);
    }

    #[test]
    fn test_default_world_transforms() {
        let model = ModelBuilder::new(tree()).build().unwrap();
        let head = model.default_world_transforms()[2];
        assert!(
            head.transform_point3(Vec3::ZERO)
                .abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-6)
        );
    }

    #[test]
    fn test_unreachable_bones_dropped() {
        let mut content = tree();
        let orphan = content.add_bone("orphan", SrtTransform::IDENTITY);
        content.animations.push(AnimationClip::from_channels(
            "wave",
            vec![
                AnimationChannel::new(orphan, vec![Keyframe::new(0.0, SrtTransform::IDENTITY)])
                    .unwrap(),
                AnimationChannel::new(1, vec![Keyframe::new(1.0, SrtTransform::IDENTITY)])
                    .unwrap(),
            ],
        ));
        let model = ModelBuilder::new(content).build().unwrap();
        assert_eq!(model.bone_count(), 4);
        assert!(model.bone_by_name("orphan").is_none());

        // content bone 1 ("head") is model bone 2
        let clip = model.clip("wave").unwrap();
        assert_eq!(clip.channels().len(), 1);
        assert_eq!(clip.channels()[0].bone(), 2);
        assert!(matches!(model.clip("run"), Err(ModelError::MissingClip(_))));
    }

    #[test]
    fn test_skin_joints_resolved() {
        let mut content = tree();
        content.skins.push(SkinContent {
            joints: vec![3, 1],
            inverse_bind_matrices: vec![Mat4::IDENTITY, Mat4::IDENTITY],
        });
        let model = ModelBuilder::new(content).build().unwrap();
        let joints: Vec<_> = model.skins()[0].joints().iter().map(|j| j.bone).collect();
        assert_eq!(joints, vec![0, 2]);
        assert_eq!(model.skins()[0].index(), 0);
    }

    #[test]
    fn test_skin_length_mismatch() {
        let mut content = tree();
        content.skins.push(SkinContent {
            joints: vec![0, 1],
            inverse_bind_matrices: vec![Mat4::IDENTITY],
        });
        assert!(matches!(
            ModelBuilder::new(content).build(),
            Err(ModelError::Format(_))
        ));
    }

    #[test]
    fn test_empty_content_rejected() {
        assert!(matches!(
            ModelBuilder::new(ModelContent::new()).build(),
            Err(ModelError::InvalidArgument(_))
        ));
    }
}
