//! Per-entity pose evaluation over a shared model
//!
//! Pose writes only touch the local transform array and raise a dirty flag.
//! World and skin matrices are recomputed in one forward sweep the next time
//! any of them is read, then served from cache until the next write.

use glam::Mat4;

use crate::animation::AnimationClip;
use crate::error::{ModelError, Result};
use crate::mesh::{BoundingBox, Mesh};
use crate::model::Model;
use crate::transform::SrtTransform;

/// What an external pose driver (animation player, ragdoll, editor) needs
pub trait Skeleton {
    fn bone_count(&self) -> usize;

    /// Reload every local transform from the default pose
    fn reset_transforms(&mut self);

    fn clip(&self, name: &str) -> Result<&AnimationClip>;

    fn default_pose(&self, bone: usize) -> Result<SrtTransform>;

    fn set_pose(&mut self, bone: usize, pose: SrtTransform) -> Result<()>;
}

/// Mutable pose over a borrowed [`Model`]. Not shared between threads.
#[derive(Debug, Clone)]
pub struct ModelInstance<'a, M = Mesh> {
    model: &'a Model<M>,
    root_transform: Mat4,
    local: Vec<Mat4>,
    world: Vec<Mat4>,
    skin: Vec<Vec<Mat4>>,
    dirty: bool,
    bounds: BoundingBox,
}

impl<'a, M> ModelInstance<'a, M> {
    pub fn new(model: &'a Model<M>) -> Self {
        let bone_count = model.bone_count();
        Self {
            model,
            root_transform: Mat4::IDENTITY,
            local: model
                .bones()
                .iter()
                .map(|b| b.default_pose().to_matrix())
                .collect(),
            world: vec![Mat4::IDENTITY; bone_count],
            skin: model
                .skins()
                .iter()
                .map(|s| vec![Mat4::IDENTITY; s.joint_count()])
                .collect(),
            dirty: true,
            // Rest-pose bounds; not refreshed as the pose changes
            bounds: model.bounds_in_default_pose(),
        }
    }

    pub fn model(&self) -> &'a Model<M> {
        self.model
    }

    fn check_bone(&self, index: usize) -> Result<()> {
        if index < self.local.len() {
            Ok(())
        } else {
            Err(ModelError::BoneIndexOutOfRange {
                index,
                count: self.local.len(),
            })
        }
    }

    pub fn set_bone_local_transform(&mut self, index: usize, transform: Mat4) -> Result<()> {
        self.check_bone(index)?;
        self.local[index] = transform;
        self.dirty = true;
        Ok(())
    }

    pub fn bone_local_transform(&self, index: usize) -> Result<Mat4> {
        self.check_bone(index)?;
        Ok(self.local[index])
    }

    pub fn bone_global_transform(&mut self, index: usize) -> Result<Mat4> {
        self.check_bone(index)?;
        self.update();
        Ok(self.world[index])
    }

    /// Joint matrices of skin `skin_index`, in joint order
    pub fn skin_transforms(&mut self, skin_index: usize) -> Result<&[Mat4]> {
        if skin_index >= self.skin.len() {
            return Err(ModelError::invalid_argument(format!(
                "skin index {skin_index} out of range ({} skins)",
                self.skin.len()
            )));
        }
        self.update();
        Ok(&self.skin[skin_index])
    }

    pub fn root_transform(&self) -> Mat4 {
        self.root_transform
    }

    /// Place the whole instance in the world
    pub fn set_root_transform(&mut self, transform: Mat4) {
        self.root_transform = transform;
        self.dirty = true;
    }

    /// Bounds captured from the default pose when the instance was created
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    /// Write every world transform into `out`, which must hold one per bone
    pub fn copy_absolute_bone_transforms_to(&mut self, out: &mut [Mat4]) -> Result<()> {
        if out.len() != self.world.len() {
            return Err(ModelError::invalid_argument(format!(
                "destination holds {} transforms, model has {} bones",
                out.len(),
                self.world.len()
            )));
        }
        self.update();
        out.copy_from_slice(&self.world);
        Ok(())
    }

    fn update(&mut self) {
        if !self.dirty {
            return;
        }
        for (i, bone) in self.model.bones().iter().enumerate() {
            let parent = match bone.parent() {
                Some(p) => self.world[p],
                None => self.root_transform,
            };
            self.world[i] = parent * self.local[i];
        }
        for (skin, out) in self.model.skins().iter().zip(&mut self.skin) {
            for (joint, matrix) in skin.joints().iter().zip(out.iter_mut()) {
                *matrix = self.world[joint.bone] * joint.inverse_bind;
            }
        }
        self.dirty = false;
    }
}

impl<M> Skeleton for ModelInstance<'_, M> {
    fn bone_count(&self) -> usize {
        self.local.len()
    }

    fn reset_transforms(&mut self) {
        for (local, bone) in self.local.iter_mut().zip(self.model.bones()) {
            *local = bone.default_pose().to_matrix();
        }
        self.dirty = true;
    }

    fn clip(&self, name: &str) -> Result<&AnimationClip> {
        self.model.clip(name)
    }

    fn default_pose(&self, bone: usize) -> Result<SrtTransform> {
        Ok(*self.model.bone(bone)?.default_pose())
    }

    fn set_pose(&mut self, bone: usize, pose: SrtTransform) -> Result<()> {
        self.set_bone_local_transform(bone, pose.to_matrix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationChannel, Keyframe};
    use crate::builder::ModelBuilder;
    use crate::content::{ModelContent, SkinContent};
    use glam::{Quat, Vec3};

    fn chain(child_pose: SrtTransform) -> Model {
        let mut content = ModelContent::new();
        let root = content.add_bone("root", SrtTransform::IDENTITY);
        let child = content.add_bone("child", child_pose);
        content.add_child(root, child).unwrap();
        ModelBuilder::new(content).build().unwrap()
    }

    #[test]
    fn test_two_bone_chain() {
        let model = chain(SrtTransform::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let mut instance = ModelInstance::new(&model);
        let world = instance.bone_global_transform(1).unwrap();
        assert!(world.abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)), 1e-6));
    }

    #[test]
    fn test_world_cache_is_stable() {
        let model = chain(SrtTransform::from_translation(Vec3::X));
        let mut instance = ModelInstance::new(&model);

        let root_before = instance.bone_global_transform(0).unwrap();
        let pose = Mat4::from_rotation_translation(Quat::from_rotation_z(0.3), Vec3::new(0.1, 2.0, 0.0));
        instance.set_bone_local_transform(1, pose).unwrap();

        let first = instance.bone_global_transform(1).unwrap();
        let second = instance.bone_global_transform(1).unwrap();
        assert_eq!(first.to_cols_array(), second.to_cols_array());

        // Writing a child never moves its parent
        let root_after = instance.bone_global_transform(0).unwrap();
        assert_eq!(root_before.to_cols_array(), root_after.to_cols_array());
    }

    #[test]
    fn test_skin_is_identity_in_bind_pose() {
        let child_pose = SrtTransform::new(
            Vec3::new(0.0, 1.5, 0.2),
            Quat::from_rotation_x(0.4),
            Vec3::splat(1.2),
        );
        let mut content = ModelContent::new();
        let root = content.add_bone(
            "root",
            SrtTransform::new(Vec3::new(3.0, 0.0, 0.0), Quat::from_rotation_y(1.0), Vec3::ONE),
        );
        let child = content.add_bone("child", child_pose);
        content.add_child(root, child).unwrap();
        let bind_world = content.bone(root).unwrap().default_pose.to_matrix() * child_pose.to_matrix();
        content.skins.push(SkinContent {
            joints: vec![child],
            inverse_bind_matrices: vec![bind_world.inverse()],
        });
        let model = ModelBuilder::new(content).build().unwrap();

        let mut instance = ModelInstance::new(&model);
        let skin = instance.skin_transforms(0).unwrap();
        assert!(skin[0].abs_diff_eq(Mat4::IDENTITY, 1e-5));
        assert!(instance.skin_transforms(1).is_err());
    }

    #[test]
    fn test_reset_and_root_transform() {
        let model = chain(SrtTransform::from_translation(Vec3::X));
        let mut instance = ModelInstance::new(&model);
        instance
            .set_pose(1, SrtTransform::from_translation(Vec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        instance.set_root_transform(Mat4::from_translation(Vec3::Z));

        let world = instance.bone_global_transform(1).unwrap();
        assert!(
            world
                .transform_point3(Vec3::ZERO)
                .abs_diff_eq(Vec3::new(5.0, 0.0, 1.0), 1e-6)
        );

        instance.reset_transforms();
        let world = instance.bone_global_transform(1).unwrap();
        assert!(
            world
                .transform_point3(Vec3::ZERO)
                .abs_diff_eq(Vec3::new(1.0, 0.0, 1.0), 1e-6)
        );
        assert_eq!(instance.root_transform(), Mat4::from_translation(Vec3::Z));
    }

    #[test]
    fn test_out_of_range_bone() {
        let model = chain(SrtTransform::IDENTITY);
        let mut instance = ModelInstance::new(&model);
        assert!(matches!(
            instance.bone_global_transform(2),
            Err(ModelError::BoneIndexOutOfRange { index: 2, count: 2 })
        ));
        assert!(instance.set_bone_local_transform(9, Mat4::IDENTITY).is_err());
        assert!(instance.default_pose(9).is_err());
    }

    #[test]
    fn test_copy_absolute_transforms() {
        let model = chain(SrtTransform::from_translation(Vec3::Y));
        let mut instance = ModelInstance::new(&model);
        let mut out = [Mat4::ZERO; 2];
        instance.copy_absolute_bone_transforms_to(&mut out).unwrap();
        assert_eq!(out[0], Mat4::IDENTITY);
        assert_eq!(out[1], Mat4::from_translation(Vec3::Y));
        assert!(instance.copy_absolute_bone_transforms_to(&mut [Mat4::ZERO; 1]).is_err());
    }

    #[test]
    fn test_clip_apply_poses_bones() {
        let mut content = ModelContent::new();
        let root = content.add_bone("root", SrtTransform::IDENTITY);
        let arm = content.add_bone("arm", SrtTransform::IDENTITY);
        content.add_child(root, arm).unwrap();
        content.animations.push(AnimationClip::from_channels(
            "raise",
            vec![
                AnimationChannel::new(
                    arm,
                    vec![
                        Keyframe::new(0.0, SrtTransform::IDENTITY),
                        Keyframe::new(2.0, SrtTransform::from_translation(Vec3::new(0.0, 4.0, 0.0))),
                    ],
                )
                .unwrap(),
            ],
        ));
        let model = ModelBuilder::new(content).build().unwrap();
        let mut instance = ModelInstance::new(&model);

        let clip = instance.clip("raise").unwrap().clone();
        assert_eq!(clip.duration(), 2.0);
        clip.apply(1.0, &mut instance).unwrap();
        let world = instance.bone_global_transform(1).unwrap();
        assert!(
            world
                .transform_point3(Vec3::ZERO)
                .abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-6)
        );
    }
}
