//! Camera and orbit navigation

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Polar angle is kept this far away from the poles so the view never flips
const POLAR_EPSILON: f32 = 1e-6;

/// Perspective camera looking at `target`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            fov: config.fov,
            aspect: 2.0,
            near: config.near,
            far: config.far,
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
        }
    }

    /// Match the aspect ratio to the drawing surface. Returns true if it changed.
    pub fn fit_viewport(&mut self, viewport: Viewport) -> bool {
        match viewport.aspect() {
            Some(aspect) if aspect != self.aspect => {
                self.aspect = aspect;
                true
            }
            _ => false,
        }
    }
}

/// Drawing surface size in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> Option<f32> {
        (self.width > 0 && self.height > 0).then(|| self.width as f32 / self.height as f32)
    }
}

/// Initial camera parameters, before any asset frames it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

fn default_fov() -> f32 {
    75.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    10000.0
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
        }
    }
}

/// Orbit navigation around a target point (Y up)
///
/// User input is accumulated by [`rotate`](Self::rotate) and
/// [`dolly`](Self::dolly) and consumed on the next [`update`](Self::update).
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    pub target: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub enabled: bool,
    pub auto_rotate: bool,
    /// Turns per minute; 2.0 is one turn every 30 s
    pub auto_rotate_speed: f32,
    pending_azimuth: f32,
    pending_polar: f32,
    pending_scale: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            enabled: true,
            auto_rotate: false,
            auto_rotate_speed: 2.0,
            pending_azimuth: 0.0,
            pending_polar: 0.0,
            pending_scale: 1.0,
        }
    }
}

impl OrbitControls {
    /// Queue a rotation in radians; ignored while disabled
    pub fn rotate(&mut self, d_azimuth: f32, d_polar: f32) {
        if self.enabled && d_azimuth.is_finite() && d_polar.is_finite() {
            self.pending_azimuth += d_azimuth;
            self.pending_polar += d_polar;
        }
    }

    /// Queue a distance scale (< 1 moves closer); ignored while disabled
    pub fn dolly(&mut self, scale: f32) {
        if self.enabled && scale.is_finite() && scale > 0.0 {
            self.pending_scale *= scale;
        }
    }

    pub fn has_pending_input(&self) -> bool {
        self.pending_azimuth != 0.0 || self.pending_polar != 0.0 || self.pending_scale != 1.0
    }

    fn is_auto_rotating(&self) -> bool {
        self.auto_rotate && self.auto_rotate_speed != 0.0
    }

    /// Advance the camera by `delta` seconds
    ///
    /// Returns true when the camera moved or will keep moving (auto-rotate),
    /// i.e. when another frame is wanted. With no input and no auto-rotate the
    /// camera is left untouched.
    pub fn update(&mut self, camera: &mut PerspectiveCamera, delta: f32) -> bool {
        let mut d_azimuth = 0.0;
        let mut d_polar = 0.0;
        let mut scale = 1.0;
        if self.enabled {
            d_azimuth = self.pending_azimuth;
            d_polar = self.pending_polar;
            scale = self.pending_scale;
        }
        self.pending_azimuth = 0.0;
        self.pending_polar = 0.0;
        self.pending_scale = 1.0;

        let auto = self.is_auto_rotating();
        if auto {
            d_azimuth -= TAU / 60.0 * self.auto_rotate_speed * delta.max(0.0);
        }

        let mut changed = false;
        if camera.target != self.target {
            camera.target = self.target;
            changed = true;
        }

        let offset = camera.position - self.target;
        let radius = offset.length();
        let out_of_range = radius < self.min_distance || radius > self.max_distance;
        if d_azimuth == 0.0 && d_polar == 0.0 && scale == 1.0 && !out_of_range {
            return changed || auto;
        }
        if radius <= f32::EPSILON {
            return changed || auto;
        }

        let azimuth = offset.x.atan2(offset.z) + d_azimuth;
        let polar = ((offset.y / radius).clamp(-1.0, 1.0).acos() + d_polar)
            .clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        let distance = (radius * scale).clamp(self.min_distance, self.max_distance);

        let position = self.target
            + Vec3::new(
                distance * polar.sin() * azimuth.sin(),
                distance * polar.cos(),
                distance * polar.sin() * azimuth.cos(),
            );
        if position.distance_squared(camera.position) > 1e-12 {
            camera.position = position;
            changed = true;
        }
        changed || auto
    }
}
