//! Clip playback for the currently attached asset

use crate::asset::{Asset, AssetId};
use crate::error::ViewerError;
use std::collections::HashMap;
use tracing::debug;

/// A playing clip and its local time
#[derive(Debug, Clone, PartialEq)]
struct Action {
    clip: usize,
    name: String,
    time: f32,
}

/// Mixer bound to one asset
///
/// Several clips may play at once. Actions are kept in play order and applied
/// in that order each update, so when two clips drive the same node the most
/// recently played one wins.
#[derive(Debug, Clone)]
pub struct AnimationController {
    asset: AssetId,
    /// node id → child path from the asset root
    bindings: HashMap<u32, Vec<usize>>,
    actions: Vec<Action>,
    speed: f32,
}

impl AnimationController {
    /// Create a controller for `asset`, or `None` if it has no clips
    pub fn bind(asset: &Asset) -> Option<Self> {
        if asset.clips.is_empty() {
            return None;
        }
        let mut bindings = HashMap::new();
        for track in asset.clips.iter().flat_map(|c| c.tracks.iter()) {
            if bindings.contains_key(&track.target) {
                continue;
            }
            if let Some(path) = asset.root.find_path(track.target) {
                bindings.insert(track.target, path);
            }
        }
        debug!(
            asset = %asset.id,
            clips = asset.clips.len(),
            bound_nodes = bindings.len(),
            "Animation controller bound"
        );
        Some(Self {
            asset: asset.id,
            bindings,
            actions: Vec::new(),
            speed: 1.0,
        })
    }

    pub fn asset(&self) -> AssetId {
        self.asset
    }

    fn check_asset(&self, asset: &Asset) -> Result<(), ViewerError> {
        if asset.id == self.asset {
            Ok(())
        } else {
            Err(ViewerError::ForeignAsset)
        }
    }

    /// Restart `name` from time zero; other playing clips are untouched
    pub fn play(&mut self, asset: &Asset, name: &str) -> Result<(), ViewerError> {
        self.check_asset(asset)?;
        let clip = asset
            .clips
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ViewerError::ClipNotFound(name.to_string()))?;
        self.actions.retain(|a| a.clip != clip);
        self.actions.push(Action {
            clip,
            name: name.to_string(),
            time: 0.0,
        });
        debug!(asset = %self.asset, clip = %name, "Clip playing");
        Ok(())
    }

    /// Stop and forget the action for `name`. Returns false if it was not playing.
    pub fn stop(&mut self, name: &str) -> bool {
        let before = self.actions.len();
        self.actions.retain(|a| a.name != name);
        before != self.actions.len()
    }

    /// Playback rate for every action; zero pauses
    pub fn set_speed(&mut self, speed: f32) -> Result<(), ViewerError> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(ViewerError::invalid(
                "animationSpeed",
                format!("must be a non-negative number, got {speed}"),
            ));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Names of playing clips in play order
    pub fn active_clips(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn is_playing(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Advance every action by `delta` seconds and pose the asset's nodes
    pub fn update(&mut self, asset: &mut Asset, delta: f32) -> Result<(), ViewerError> {
        self.check_asset(asset)?;
        let delta = if delta.is_finite() { delta.max(0.0) } else { 0.0 };
        let step = delta * self.speed;
        let clips = &asset.clips;
        let root = &mut asset.root;

        for action in &mut self.actions {
            let Some(clip) = clips.get(action.clip) else {
                continue;
            };
            action.time = if clip.duration > 0.0 {
                (action.time + step) % clip.duration
            } else {
                0.0
            };
            for track in &clip.tracks {
                let Some(path) = self.bindings.get(&track.target) else {
                    continue;
                };
                if let Some(node) = root.node_at_mut(path) {
                    track.channel.apply(action.time, &mut node.transform);
                }
            }
        }
        Ok(())
    }

    /// Stop everything and drop node bindings. Returns how many actions were playing.
    pub fn destroy(mut self) -> usize {
        let stopped = self.actions.len();
        self.actions.clear();
        self.bindings.clear();
        debug!(asset = %self.asset, stopped, "Animation controller destroyed");
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AnimationClip, Channel, DecodedAsset, Keyframes, Track};
    use crate::scene::SceneNode;
    use approx::assert_abs_diff_eq;
    use glam::Vec3;

    fn slide(name: &str, target: u32, to: Vec3) -> AnimationClip {
        AnimationClip::new(
            name,
            vec![Track {
                target,
                channel: Channel::Translation(Keyframes::new(vec![0.0, 1.0], vec![Vec3::ZERO, to])),
            }],
        )
    }

    fn rig(id: u64) -> Asset {
        let root = SceneNode::root(vec![
            SceneNode::new(0).with_name("Hips").with_child(SceneNode::new(1).with_name("Leg")),
        ]);
        Asset::new(
            AssetId(id),
            "rig.gltf",
            DecodedAsset {
                root,
                animations: vec![
                    slide("Walk", 1, Vec3::new(4.0, 0.0, 0.0)),
                    slide("Idle", 1, Vec3::new(0.0, 2.0, 0.0)),
                ],
            },
        )
    }

    fn leg(asset: &Asset) -> Vec3 {
        asset.root.find(1).map(|n| n.transform.translation).unwrap()
    }

    #[test]
    fn test_walk_idle_scenario() {
        let asset = rig(1);
        let mut controller = AnimationController::bind(&asset).unwrap();
        controller.play(&asset, "Walk").unwrap();
        controller.play(&asset, "Idle").unwrap();
        assert_eq!(controller.active_clips(), vec!["Walk", "Idle"]);

        assert!(controller.stop("Walk"));
        assert_eq!(controller.active_clips(), vec!["Idle"]);

        let err = controller.play(&asset, "Run").unwrap_err();
        assert_eq!(err, ViewerError::ClipNotFound("Run".into()));
        assert_eq!(controller.active_clips(), vec!["Idle"]);
        assert!(!controller.stop("Walk"));
    }

    #[test]
    fn test_update_poses_nodes_and_loops() {
        let mut asset = rig(1);
        let mut controller = AnimationController::bind(&asset).unwrap();
        controller.play(&asset, "Walk").unwrap();

        controller.update(&mut asset, 0.0).unwrap();
        assert_eq!(leg(&asset), Vec3::ZERO);
        controller.update(&mut asset, 0.5).unwrap();
        assert_abs_diff_eq!(leg(&asset).x, 2.0, epsilon = 1e-5);
        // wraps past the one-second duration
        controller.update(&mut asset, 0.75).unwrap();
        assert_abs_diff_eq!(leg(&asset).x, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_most_recent_play_wins() {
        let mut asset = rig(1);
        let mut controller = AnimationController::bind(&asset).unwrap();
        controller.play(&asset, "Idle").unwrap();
        controller.play(&asset, "Walk").unwrap();
        controller.update(&mut asset, 0.5).unwrap();
        assert_abs_diff_eq!(leg(&asset).x, 2.0, epsilon = 1e-5);
        assert_eq!(leg(&asset).y, 0.0);

        // replaying Idle moves it to the back of the order
        controller.play(&asset, "Idle").unwrap();
        controller.update(&mut asset, 0.5).unwrap();
        assert_abs_diff_eq!(leg(&asset).y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_speed_scales_and_validates() {
        let mut asset = rig(1);
        let mut controller = AnimationController::bind(&asset).unwrap();
        assert!(controller.set_speed(-1.0).is_err());
        assert!(controller.set_speed(f32::INFINITY).is_err());
        controller.set_speed(0.5).unwrap();
        controller.play(&asset, "Walk").unwrap();
        controller.update(&mut asset, 1.0).unwrap();
        assert_abs_diff_eq!(leg(&asset).x, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_foreign_asset_rejected() {
        let asset = rig(1);
        let mut other = rig(2);
        let mut controller = AnimationController::bind(&asset).unwrap();
        assert_eq!(controller.play(&other, "Walk"), Err(ViewerError::ForeignAsset));
        assert_eq!(controller.update(&mut other, 0.1), Err(ViewerError::ForeignAsset));
    }

    #[test]
    fn test_no_clips_no_controller() {
        let asset = Asset::new(
            AssetId(3),
            "static.glb",
            DecodedAsset {
                root: SceneNode::root(Vec::new()),
                animations: Vec::new(),
            },
        );
        assert!(AnimationController::bind(&asset).is_none());
    }

    #[test]
    fn test_destroy_reports_stopped_actions() {
        let asset = rig(1);
        let mut controller = AnimationController::bind(&asset).unwrap();
        controller.play(&asset, "Walk").unwrap();
        controller.play(&asset, "Idle").unwrap();
        assert_eq!(controller.destroy(), 2);
    }
}
