//! Scale/rotation/translation transform

use glam::{Mat3, Mat4, Quat, Vec3};

/// Bone transform (TRS) in decomposed form
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SrtTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for SrtTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SrtTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub const fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Decompose an affine matrix. Shear is lost.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Compose to a matrix: scale along the local axes, then rotate, then translate.
    pub fn to_matrix(&self) -> Mat4 {
        let rotation = Mat3::from_quat(self.rotation);
        Mat4::from_cols(
            (rotation.x_axis * self.scale.x).extend(0.0),
            (rotation.y_axis * self.scale.y).extend(0.0),
            (rotation.z_axis * self.scale.z).extend(0.0),
            self.translation.extend(1.0),
        )
    }

    /// Component-wise interpolation: lerp translation and scale, slerp rotation
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }

    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, max_abs_diff)
            && self.scale.abs_diff_eq(other.scale, max_abs_diff)
            // q and -q are the same rotation
            && (self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
                || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff))
    }
}

impl From<SrtTransform> for Mat4 {
    fn from(srt: SrtTransform) -> Self {
        srt.to_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity_matrix() {
        assert_eq!(SrtTransform::IDENTITY.to_matrix(), Mat4::IDENTITY);
        assert_eq!(SrtTransform::default(), SrtTransform::IDENTITY);
    }

    #[test]
    fn test_to_matrix_matches_glam_trs() {
        let srt = SrtTransform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.7),
            Vec3::new(2.0, 0.5, 1.5),
        );
        let expected = Mat4::from_scale_rotation_translation(srt.scale, srt.rotation, srt.translation);
        assert!(srt.to_matrix().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_scale_is_innermost() {
        // Scale x by 2, then rotate 90 degrees about z: +x ends up on +y with length 2
        let srt = SrtTransform::new(
            Vec3::new(0.0, 0.0, 5.0),
            Quat::from_rotation_z(FRAC_PI_2),
            Vec3::new(2.0, 1.0, 1.0),
        );
        let p = srt.to_matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 2.0, 5.0), 1e-5));
    }

    #[test]
    fn test_matrix_roundtrip() {
        let srt = SrtTransform::new(
            Vec3::new(-4.0, 0.25, 9.0),
            Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 0.4),
            Vec3::new(1.0, 3.0, 0.5),
        );
        let back = SrtTransform::from_matrix(&srt.to_matrix());
        assert!(back.abs_diff_eq(&srt, 1e-5));
    }

    #[test]
    fn test_lerp_midpoint() {
        let a = SrtTransform::from_translation(Vec3::ZERO);
        let b = SrtTransform {
            translation: Vec3::new(2.0, 0.0, 0.0),
            rotation: Quat::from_rotation_y(FRAC_PI_2),
            scale: Vec3::splat(3.0),
        };
        let mid = a.lerp(&b, 0.5);
        assert!(mid.translation.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
        assert!(mid.scale.abs_diff_eq(Vec3::splat(2.0), 1e-6));
        assert!(
            mid.rotation
                .abs_diff_eq(Quat::from_rotation_y(FRAC_PI_2 / 2.0), 1e-5)
        );
    }
}
