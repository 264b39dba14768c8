//! The boundary to whatever actually puts pixels on screen

use crate::asset::Asset;
use crate::camera::{PerspectiveCamera, Viewport};
use crate::scene::{AmbientLight, Background, BoundingBoxOverlay};

/// Everything one draw needs, borrowed from the session
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Refresh timestamp in milliseconds
    pub timestamp: f64,
    /// Seconds since the previous draw (0 after an idle period)
    pub delta: f32,
    pub viewport: Viewport,
    pub camera: &'a PerspectiveCamera,
    pub background: Background,
    pub light: AmbientLight,
    pub asset: Option<&'a Asset>,
    pub overlay: Option<&'a BoundingBoxOverlay>,
}

pub trait Renderer {
    fn render(&mut self, frame: &Frame<'_>);

    /// Free GPU-side resources held for `asset`. Called exactly once per asset,
    /// when it is unloaded or replaced.
    fn release(&mut self, asset: &Asset) {
        let _ = asset;
    }
}
