//! Camera framing from a model's bounding box
//!
//! Everything scales with the box diagonal so that a millimeter prop and a
//! building-sized scene both land fully in view with usable clip planes.

use crate::camera::{OrbitControls, PerspectiveCamera};
use crate::error::ViewerError;
use crate::scene::BoundingBox;
use glam::Vec3;
use serde::Serialize;

/// Zoom and vertical offset divisors for the camera offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FramingParams {
    zoom: f32,
    vertical_offset: f32,
}

impl Default for FramingParams {
    fn default() -> Self {
        Self {
            zoom: 2.0,
            vertical_offset: 5.0,
        }
    }
}

fn check_positive(name: &'static str, value: f32) -> Result<f32, ViewerError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ViewerError::invalid(name, format!("must be positive, got {value}")))
    }
}

impl FramingParams {
    pub fn new(zoom: f32, vertical_offset: f32) -> Result<Self, ViewerError> {
        Ok(Self {
            zoom: check_positive("zoom", zoom)?,
            vertical_offset: check_positive("verticalOffset", vertical_offset)?,
        })
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn vertical_offset(&self) -> f32 {
        self.vertical_offset
    }
}

/// Camera and controls configuration derived from one bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraPlacement {
    pub near: f32,
    pub far: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl CameraPlacement {
    pub fn apply(&self, camera: &mut PerspectiveCamera, controls: &mut OrbitControls) {
        camera.near = self.near;
        camera.far = self.far;
        camera.position = self.position;
        camera.target = self.target;
        controls.min_distance = self.min_distance;
        controls.max_distance = self.max_distance;
        controls.target = self.target;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Framing {
    Placed(CameraPlacement),
    /// Nothing to frame: no asset, or an asset without geometry
    NotApplicable,
}

impl Framing {
    pub fn placement(&self) -> Option<&CameraPlacement> {
        match self {
            Framing::Placed(p) => Some(p),
            Framing::NotApplicable => None,
        }
    }
}

/// Place the camera so the whole box is visible from an elevated oblique angle
pub fn frame(bounds: Option<&BoundingBox>, params: FramingParams) -> Framing {
    let Some(bounds) = bounds.filter(|b| !b.is_empty()) else {
        return Framing::NotApplicable;
    };
    let center = bounds.center();
    let diag = bounds.diagonal();
    if !diag.is_finite() || !center.is_finite() {
        return Framing::NotApplicable;
    }

    Framing::Placed(CameraPlacement {
        near: diag / 100.0,
        far: diag * 100.0,
        min_distance: diag / 100.0,
        max_distance: diag * 10.0,
        position: center
            + Vec3::new(
                diag / params.zoom,
                diag / params.vertical_offset,
                diag / params.zoom,
            ),
        target: center,
    })
}
