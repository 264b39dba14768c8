//! Bundles in, assets out: the data that crosses the decode boundary

use crate::error::ViewerError;
use crate::scene::{BoundingBox, SceneNode, Transform};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Immutable, cheaply shared file contents
pub type BinaryBlob = Arc<[u8]>;

/// Logical reference name → file contents
pub type BlobMap = BTreeMap<String, BinaryBlob>;

/// A primary document plus the files it references, as harvested from a
/// drop or file picker
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub primary: String,
    pub blobs: BlobMap,
}

impl Bundle {
    pub fn new(primary: impl Into<String>, blobs: BlobMap) -> Result<Self, ViewerError> {
        let primary = primary.into();
        if primary.trim().is_empty() {
            return Err(ViewerError::invalid("primary", "document name is empty"));
        }
        Ok(Self { primary, blobs })
    }

    /// Load straight from a locator with nothing held in memory
    pub fn url(locator: impl Into<String>) -> Result<Self, ViewerError> {
        Self::new(locator, BlobMap::new())
    }

    /// Convenience for building a blob map entry
    pub fn blob(bytes: impl Into<Vec<u8>>) -> BinaryBlob {
        Arc::from(bytes.into().into_boxed_slice())
    }
}

/// Keyframe times (seconds, ascending) and the value at each
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframes<T> {
    pub times: Vec<f32>,
    pub values: Vec<T>,
}

impl<T: Copy> Keyframes<T> {
    pub fn new(times: Vec<f32>, values: Vec<T>) -> Self {
        Self { times, values }
    }

    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// Sample at `t`, holding the first/last key outside the keyed range
    fn sample(&self, t: f32, interpolate: impl Fn(T, T, f32) -> T) -> Option<T> {
        let len = self.times.len().min(self.values.len());
        if len == 0 {
            return None;
        }
        if t <= self.times[0] {
            return Some(self.values[0]);
        }
        if t >= self.times[len - 1] {
            return Some(self.values[len - 1]);
        }
        let next = self.times[..len].partition_point(|&k| k <= t);
        // unordered or NaN keys can leave t outside every bracket
        if next == 0 || next >= len {
            return Some(self.values[0]);
        }
        let (t0, t1) = (self.times[next - 1], self.times[next]);
        let span = t1 - t0;
        let f = if span > 0.0 { (t - t0) / span } else { 0.0 };
        Some(interpolate(self.values[next - 1], self.values[next], f))
    }
}

/// Which property of a node a track drives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Channel {
    Translation(Keyframes<Vec3>),
    Rotation(Keyframes<Quat>),
    Scale(Keyframes<Vec3>),
}

impl Channel {
    pub fn end_time(&self) -> f32 {
        match self {
            Channel::Translation(k) | Channel::Scale(k) => k.end_time(),
            Channel::Rotation(k) => k.end_time(),
        }
    }

    /// Write the sampled value at `t` into `transform`
    pub fn apply(&self, t: f32, transform: &mut Transform) {
        match self {
            Channel::Translation(k) => {
                if let Some(v) = k.sample(t, |a, b, f| a.lerp(b, f)) {
                    transform.translation = v;
                }
            }
            Channel::Rotation(k) => {
                if let Some(q) = k.sample(t, |a, b, f| a.slerp(b, f)) {
                    transform.rotation = q.normalize();
                }
            }
            Channel::Scale(k) => {
                if let Some(v) = k.sample(t, |a, b, f| a.lerp(b, f)) {
                    transform.scale = v;
                }
            }
        }
    }
}

/// One channel aimed at one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// [`SceneNode::id`] of the driven node
    pub target: u32,
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds; the longest track end time
    pub duration: f32,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    /// Build a clip whose duration spans its longest track
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        let duration = tracks
            .iter()
            .map(|t| t.channel.end_time())
            .fold(0.0_f32, f32::max);
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }
}

/// What a decoder hands back
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAsset {
    pub root: SceneNode,
    pub animations: Vec<AnimationClip>,
}

/// Identifies one attached asset for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset-{}", self.0)
    }
}

/// A decoded asset owned by a viewer session
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: AssetId,
    /// Primary document name the asset was loaded from
    pub source: String,
    pub root: SceneNode,
    pub clips: Vec<AnimationClip>,
}

impl Asset {
    pub fn new(id: AssetId, source: impl Into<String>, decoded: DecodedAsset) -> Self {
        Self {
            id,
            source: source.into(),
            root: decoded.root,
            clips: decoded.animations,
        }
    }

    pub fn clip(&self, name: &str) -> Option<&AnimationClip> {
        self.clips.iter().find(|c| c.name == name)
    }

    pub fn clip_names(&self) -> Vec<String> {
        self.clips.iter().map(|c| c.name.clone()).collect()
    }

    pub fn world_bounds(&self) -> BoundingBox {
        self.root.world_bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bundle_rejects_empty_primary() {
        assert!(matches!(
            Bundle::new("  ", BlobMap::new()),
            Err(ViewerError::InvalidParameter { name: "primary", .. })
        ));
        let bundle = Bundle::url("https://example.com/a.glb").unwrap();
        assert!(bundle.blobs.is_empty());
    }

    #[test]
    fn test_translation_sampling_clamps_and_lerps() {
        let keys = Keyframes::new(
            vec![1.0, 2.0],
            vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)],
        );
        let channel = Channel::Translation(keys);
        let mut transform = Transform::default();

        channel.apply(0.0, &mut transform);
        assert_eq!(transform.translation, Vec3::ZERO);
        channel.apply(1.25, &mut transform);
        assert_abs_diff_eq!(transform.translation.x, 2.5, epsilon = 1e-5);
        channel.apply(5.0, &mut transform);
        assert_eq!(transform.translation.x, 10.0);
    }

    #[test]
    fn test_rotation_slerps_halfway() {
        let channel = Channel::Rotation(Keyframes::new(
            vec![0.0, 1.0],
            vec![Quat::IDENTITY, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)],
        ));
        let mut transform = Transform::default();
        channel.apply(0.5, &mut transform);
        let (axis, angle) = transform.rotation.to_axis_angle();
        assert_abs_diff_eq!(angle, std::f32::consts::FRAC_PI_4, epsilon = 1e-4);
        assert_abs_diff_eq!(axis.y, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_nan_key_times_hold_first_value() {
        let channel = Channel::Translation(Keyframes::new(
            vec![f32::NAN, 1.0],
            vec![Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO],
        ));
        let mut transform = Transform::default();
        channel.apply(0.5, &mut transform);
        assert_eq!(transform.translation.x, 3.0);
        channel.apply(2.0, &mut transform);
        assert_eq!(transform.translation, Vec3::ZERO);
    }

    #[test]
    fn test_empty_channel_leaves_transform() {
        let channel = Channel::Scale(Keyframes::new(Vec::new(), Vec::new()));
        let mut transform = Transform::default();
        channel.apply(0.3, &mut transform);
        assert_eq!(transform, Transform::default());
    }

    #[test]
    fn test_clip_duration_is_longest_track() {
        let clip = AnimationClip::new(
            "Walk",
            vec![
                Track {
                    target: 0,
                    channel: Channel::Translation(Keyframes::new(vec![0.0, 0.5], vec![Vec3::ZERO; 2])),
                },
                Track {
                    target: 1,
                    channel: Channel::Scale(Keyframes::new(vec![0.0, 1.5], vec![Vec3::ONE; 2])),
                },
            ],
        );
        assert_eq!(clip.duration, 1.5);
    }
}
