//! Animation clips
//!
//! A clip is a set of per-bone channels. Playback policy (looping, blending,
//! crossfades) belongs to the caller; [`AnimationClip::apply`] only writes one
//! sampled pose per channel through the [`Skeleton`] interface.

mod channel;
mod merge;

pub use channel::{AnimationChannel, Keyframe, RotationInterpolation, VectorInterpolation};
pub use merge::{SparseTracks, merge_sparse_tracks};

use crate::error::Result;
use crate::instance::Skeleton;

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    name: String,
    duration: f32,
    channels: Vec<AnimationChannel>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32, channels: Vec<AnimationChannel>) -> Self {
        Self {
            name: name.into(),
            duration,
            channels,
        }
    }

    /// Clip whose duration is the last keyframe time over all channels
    pub fn from_channels(name: impl Into<String>, channels: Vec<AnimationChannel>) -> Self {
        let duration = channels.iter().map(AnimationChannel::end_time).fold(0.0, f32::max);
        Self::new(name, duration, channels)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn channels(&self) -> &[AnimationChannel] {
        &self.channels
    }

    pub fn channel_for_bone(&self, bone: usize) -> Option<&AnimationChannel> {
        self.channels.iter().find(|c| c.bone() == bone)
    }

    pub(crate) fn channels_mut(&mut self) -> &mut Vec<AnimationChannel> {
        &mut self.channels
    }

    /// Pose every animated bone of `skeleton` at `time`
    pub fn apply(&self, time: f32, skeleton: &mut impl Skeleton) -> Result<()> {
        for channel in &self.channels {
            skeleton.set_pose(channel.bone(), channel.sample(time))?;
        }
        Ok(())
    }
}
