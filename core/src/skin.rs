//! Skins: ordered joints with inverse bind matrices

use glam::Mat4;

use crate::error::{ModelError, Result};

/// One joint of a skin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    /// Index of the driving bone in [`Model::bones`](crate::Model::bones)
    pub bone: usize,
    /// Maps bind-pose model space into the joint's local space
    pub inverse_bind: Mat4,
}

impl Joint {
    pub const fn new(bone: usize, inverse_bind: Mat4) -> Self {
        Self { bone, inverse_bind }
    }
}

/// Ordered joint list shared by every mesh part that references it
#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    index: usize,
    joints: Vec<Joint>,
}

impl Skin {
    /// `index` is the dense skin index (0..K-1) within the owning model
    pub fn new(index: usize, joints: Vec<Joint>) -> Result<Self> {
        if joints.is_empty() {
            return Err(ModelError::invalid_argument("skin has no joints"));
        }
        Ok(Self { index, joints })
    }

    /// Key for the per-instance joint matrix buffer
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }
}
