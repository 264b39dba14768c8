//! Headless renderer: records what would have been drawn

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;
use vitrine_core::{
    AmbientLight, Asset, AssetId, Background, BoundingBoxOverlay, Frame, PerspectiveCamera,
    Renderer, Viewport,
};

/// Summary of the asset visible in a frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSummary {
    pub id: AssetId,
    pub source: String,
    pub nodes: usize,
    pub clips: Vec<String>,
}

/// One captured draw
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub captured_at: DateTime<Utc>,
    pub timestamp: f64,
    pub delta: f32,
    pub viewport: Viewport,
    pub camera: PerspectiveCamera,
    pub background: Background,
    pub light: AmbientLight,
    pub overlay: Option<BoundingBoxOverlay>,
    pub asset: Option<AssetSummary>,
}

impl FrameSnapshot {
    fn capture(frame: &Frame<'_>) -> Self {
        Self {
            captured_at: Utc::now(),
            timestamp: frame.timestamp,
            delta: frame.delta,
            viewport: frame.viewport,
            camera: *frame.camera,
            background: frame.background,
            light: frame.light,
            overlay: frame.overlay.copied(),
            asset: frame.asset.map(|asset| AssetSummary {
                id: asset.id,
                source: asset.source.clone(),
                // the synthetic scene root is not part of the asset
                nodes: asset.root.node_count().saturating_sub(1),
                clips: asset.clip_names(),
            }),
        }
    }
}

/// Last snapshot, shared with post-draw hooks
pub type SnapshotSlot = Rc<RefCell<Option<FrameSnapshot>>>;

#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    last: SnapshotSlot,
    draws: u64,
    released: Vec<AssetId>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_slot(&self) -> SnapshotSlot {
        self.last.clone()
    }

    pub fn last_snapshot(&self) -> Option<FrameSnapshot> {
        self.last.borrow().clone()
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn released(&self) -> &[AssetId] {
        &self.released
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, frame: &Frame<'_>) {
        self.draws += 1;
        debug!(
            draw = self.draws,
            timestamp = frame.timestamp,
            delta = frame.delta,
            asset = ?frame.asset.map(|a| a.id),
            overlay = frame.overlay.is_some(),
            "Rendered frame"
        );
        *self.last.borrow_mut() = Some(FrameSnapshot::capture(frame));
    }

    fn release(&mut self, asset: &Asset) {
        debug!(asset = %asset.id, "Released renderer resources");
        self.released.push(asset.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_core::{CameraConfig, Color, DecodedAsset, SceneNode};

    #[test]
    fn test_records_frames_and_releases() {
        let camera = PerspectiveCamera::new(&CameraConfig::default());
        let asset = Asset::new(
            AssetId(7),
            "cube.gltf",
            DecodedAsset {
                root: SceneNode::root(vec![SceneNode::new(0)]),
                animations: Vec::new(),
            },
        );
        let frame = Frame {
            timestamp: 16.0,
            delta: 0.0,
            viewport: Viewport::new(640, 480),
            camera: &camera,
            background: Background::default(),
            light: AmbientLight::default(),
            asset: Some(&asset),
            overlay: None,
        };

        let mut renderer = HeadlessRenderer::new();
        let slot = renderer.snapshot_slot();
        renderer.render(&frame);
        renderer.release(&asset);

        assert_eq!(renderer.draws(), 1);
        assert_eq!(renderer.released(), &[AssetId(7)]);
        let snapshot = slot.borrow().clone().unwrap();
        assert_eq!(snapshot.asset.as_ref().unwrap().nodes, 1);
        assert_eq!(snapshot.background.color, Color::WHITE);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["viewport"]["width"], 640);
        assert_eq!(json["asset"]["source"], "cube.gltf");
    }
}
