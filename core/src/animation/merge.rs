//! Sparse-fill-forward merge of per-component animation tracks
//!
//! glTF and G3D sample translation, rotation and scale independently. The
//! runtime wants one composite keyframe per time, so the tracks for a bone are
//! merged on the union of their sample times. A component with no sample at a
//! given time keeps its most recent earlier sample, or the bone's default pose
//! before its first sample. No interpolation happens here.

use glam::{Quat, Vec3};

use super::channel::{AnimationChannel, Keyframe, RotationInterpolation, VectorInterpolation};
use crate::error::Result;
use crate::transform::SrtTransform;

/// Independent sample tracks collected for one bone
#[derive(Debug, Clone, Default)]
pub struct SparseTracks {
    pub translation: Vec<(f32, Vec3)>,
    pub rotation: Vec<(f32, Quat)>,
    pub scale: Vec<(f32, Vec3)>,
    pub translation_mode: VectorInterpolation,
    pub rotation_mode: RotationInterpolation,
    pub scale_mode: VectorInterpolation,
}

impl SparseTracks {
    pub fn is_empty(&self) -> bool {
        self.translation.is_empty() && self.rotation.is_empty() && self.scale.is_empty()
    }

    /// Latest sample time over all three tracks
    pub fn end_time(&self) -> f32 {
        self.translation
            .iter()
            .map(|s| s.0)
            .chain(self.rotation.iter().map(|s| s.0))
            .chain(self.scale.iter().map(|s| s.0))
            .fold(0.0, f32::max)
    }

    /// Merge into a channel, or `None` when no track has samples
    pub fn into_channel(self, bone: usize, default: &SrtTransform) -> Result<Option<AnimationChannel>> {
        if self.is_empty() {
            return Ok(None);
        }
        let keyframes = merge_sparse_tracks(default, &self.translation, &self.rotation, &self.scale);
        let channel = AnimationChannel::new(bone, keyframes)?.with_modes(
            self.translation_mode,
            self.rotation_mode,
            self.scale_mode,
        );
        Ok(Some(channel))
    }
}

/// Merge sparse tracks into composite keyframes on the union of their times
pub fn merge_sparse_tracks(
    default: &SrtTransform,
    translations: &[(f32, Vec3)],
    rotations: &[(f32, Quat)],
    scales: &[(f32, Vec3)],
) -> Vec<Keyframe> {
    let mut times: Vec<f32> = translations
        .iter()
        .map(|s| s.0)
        .chain(rotations.iter().map(|s| s.0))
        .chain(scales.iter().map(|s| s.0))
        .collect();
    times.sort_by(f32::total_cmp);
    times.dedup();

    let mut translation = FillForward::new(translations, default.translation);
    let mut rotation = FillForward::new(rotations, default.rotation);
    let mut scale = FillForward::new(scales, default.scale);

    times
        .into_iter()
        .map(|time| {
            Keyframe::new(
                time,
                SrtTransform::new(
                    translation.at(time),
                    rotation.at(time),
                    scale.at(time),
                ),
            )
        })
        .collect()
}

/// Cursor over one sorted track, queried with non-decreasing times
struct FillForward<T> {
    samples: Vec<(f32, T)>,
    next: usize,
    current: T,
}

impl<T: Copy> FillForward<T> {
    fn new(samples: &[(f32, T)], initial: T) -> Self {
        let mut samples = samples.to_vec();
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            samples,
            next: 0,
            current: initial,
        }
    }

    fn at(&mut self, time: f32) -> T {
        while let Some(&(t, value)) = self.samples.get(self.next) {
            if t > time {
                break;
            }
            self.current = value;
            self.next += 1;
        }
        self.current
    }
}
