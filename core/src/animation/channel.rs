//! Per-bone keyframe tracks and their evaluation

use std::str::FromStr;

use glam::{Quat, Vec3};

use crate::error::{ModelError, Result};
use crate::transform::SrtTransform;

/// Interpolation for translation and scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorInterpolation {
    /// Hold the earlier keyframe until the next one
    None,
    #[default]
    Linear,
    /// Catmull-Rom through the neighbouring keyframes
    Cubic,
}

/// Interpolation for rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationInterpolation {
    /// Hold the earlier keyframe until the next one
    None,
    /// Normalised lerp
    Linear,
    #[default]
    Spherical,
}

impl VectorInterpolation {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Linear => "Linear",
            Self::Cubic => "Cubic",
        }
    }
}

impl RotationInterpolation {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Linear => "Linear",
            Self::Spherical => "Spherical",
        }
    }
}

impl FromStr for VectorInterpolation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "None" => Ok(Self::None),
            "Linear" => Ok(Self::Linear),
            "Cubic" => Ok(Self::Cubic),
            other => Err(ModelError::not_supported(format!(
                "vector interpolation '{other}'"
            ))),
        }
    }
}

impl FromStr for RotationInterpolation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "None" => Ok(Self::None),
            "Linear" => Ok(Self::Linear),
            "Spherical" => Ok(Self::Spherical),
            other => Err(ModelError::not_supported(format!(
                "rotation interpolation '{other}'"
            ))),
        }
    }
}

/// Composite pose of one bone at one time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub transform: SrtTransform,
}

impl Keyframe {
    pub const fn new(time: f32, transform: SrtTransform) -> Self {
        Self { time, transform }
    }
}

/// Keyframe track driving a single bone
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    bone: usize,
    keyframes: Vec<Keyframe>,
    pub translation_mode: VectorInterpolation,
    pub rotation_mode: RotationInterpolation,
    pub scale_mode: VectorInterpolation,
}

impl AnimationChannel {
    /// Keyframes must be non-empty, finite and sorted by time
    pub fn new(bone: usize, keyframes: Vec<Keyframe>) -> Result<Self> {
        if keyframes.is_empty() {
            return Err(ModelError::invalid_argument(format!(
                "channel for bone {bone} has no keyframes"
            )));
        }
        if let Some(key) = keyframes.iter().find(|k| !k.time.is_finite()) {
            return Err(ModelError::invalid_argument(format!(
                "channel for bone {bone} has keyframe time {}",
                key.time
            )));
        }
        if keyframes.windows(2).any(|w| w[1].time < w[0].time) {
            return Err(ModelError::invalid_argument(format!(
                "channel for bone {bone} has unsorted keyframes"
            )));
        }
        Ok(Self {
            bone,
            keyframes,
            translation_mode: VectorInterpolation::default(),
            rotation_mode: RotationInterpolation::default(),
            scale_mode: VectorInterpolation::default(),
        })
    }

    pub fn with_modes(
        mut self,
        translation: VectorInterpolation,
        rotation: RotationInterpolation,
        scale: VectorInterpolation,
    ) -> Self {
        self.translation_mode = translation;
        self.rotation_mode = rotation;
        self.scale_mode = scale;
        self
    }

    /// Target bone index
    pub fn bone(&self) -> usize {
        self.bone
    }

    pub(crate) fn set_bone(&mut self, bone: usize) {
        self.bone = bone;
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Time of the last keyframe
    pub fn end_time(&self) -> f32 {
        self.keyframes.last().map_or(0.0, |k| k.time)
    }

    /// Evaluate the track at `time`, clamping outside the keyframe range.
    /// A NaN time yields the first keyframe.
    pub fn sample(&self, time: f32) -> SrtTransform {
        let keys = &self.keyframes;
        let (first, last) = (keys[0], keys[keys.len() - 1]);
        if time.is_nan() || time <= first.time {
            return first.transform;
        }
        if time >= last.time {
            return last.transform;
        }

        // keys[i].time <= time < keys[i + 1].time
        let i = keys.partition_point(|k| k.time <= time) - 1;
        let (k0, k1) = (&keys[i], &keys[i + 1]);
        let t = (time - k0.time) / (k1.time - k0.time);

        SrtTransform {
            translation: self.sample_vector(self.translation_mode, i, t, |k| k.transform.translation),
            rotation: sample_rotation(
                self.rotation_mode,
                k0.transform.rotation,
                k1.transform.rotation,
                t,
            ),
            scale: self.sample_vector(self.scale_mode, i, t, |k| k.transform.scale),
        }
    }

    fn sample_vector(
        &self,
        mode: VectorInterpolation,
        i: usize,
        t: f32,
        component: impl Fn(&Keyframe) -> Vec3,
    ) -> Vec3 {
        let keys = &self.keyframes;
        let p1 = component(&keys[i]);
        let p2 = component(&keys[i + 1]);
        match mode {
            VectorInterpolation::None => p1,
            VectorInterpolation::Linear => p1.lerp(p2, t),
            VectorInterpolation::Cubic => {
                let p0 = if i > 0 { component(&keys[i - 1]) } else { p1 };
                let p3 = keys.get(i + 2).map_or(p2, &component);
                catmull_rom(p0, p1, p2, p3, t)
            }
        }
    }
}

fn sample_rotation(mode: RotationInterpolation, q0: Quat, q1: Quat, t: f32) -> Quat {
    match mode {
        RotationInterpolation::None => q0,
        // glam's lerp takes the short path and normalises
        RotationInterpolation::Linear => q0.lerp(q1, t),
        RotationInterpolation::Spherical => q0.slerp(q1, t),
    }
}

fn catmull_rom(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}
